//! Domain model types for the version-control layer around the engine.
//!
//! Branches, commits and merge requests only carry document text; the
//! section engine is what interprets that text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conflict::Resolution;

// ---------------------------------------------------------------------------
// Branch / Commit
// ---------------------------------------------------------------------------

/// A named line of document history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub head_commit_id: String,
    pub created_at: DateTime<Utc>,
}

/// A full document snapshot on a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub branch_id: String,
    pub parent_id: Option<String>,
    pub message: String,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Commit {
    /// First 8 characters of the id, for display.
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// First 8 characters of an id, for display.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

// ---------------------------------------------------------------------------
// Merge requests
// ---------------------------------------------------------------------------

/// Lifecycle status of a merge request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRequestStatus {
    Open,
    Merged,
    Closed,
}

impl MergeRequestStatus {
    /// Parse a stored status string.
    pub fn from_str_val(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "merged" => Some(Self::Merged),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for MergeRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Merged => write!(f, "merged"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A proposal to integrate the source branch head into the target branch.
///
/// `base_commit_id`, `source_head` and `target_head` record the snapshot the
/// conflict list was computed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub id: String,
    pub source_branch_id: String,
    pub target_branch_id: String,
    pub title: String,
    pub author: String,
    pub status: MergeRequestStatus,
    pub base_commit_id: String,
    pub source_head: String,
    pub target_head: String,
    pub merge_commit_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One conflicting section of a merge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: String,
    pub merge_request_id: String,
    pub section_key: String,
    /// Content on the source ("left") branch.
    pub source_content: String,
    /// Content on the target ("right") branch.
    pub target_content: String,
    pub resolution: Option<Resolution>,
    pub resolved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ConflictRecord {
    /// The resolution the merge will use: the recorded one, else right.
    pub fn effective_resolution(&self) -> Resolution {
        self.resolution.unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// An audit-log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub action: String,
    pub actor: Option<String>,
    pub details: Option<String>,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}
