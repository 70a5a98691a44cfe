//! Conflict resolution choices and their bookkeeping.
//!
//! A [`Resolution`] is the caller's explicit choice for one conflicting
//! section key. [`ConflictResolver`] records those choices against the
//! conflict snapshot of a merge request and turns them back into the
//! [`ResolutionMap`] the merger consumes.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::Database;
use crate::errors::ConflictError;

/// Which side a conflicting section is taken from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// The source side.
    Left,
    /// The target side. Used for every key without an explicit choice.
    #[default]
    Right,
    /// Both sides, wrapped in conflict markers.
    Both,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
            Self::Both => write!(f, "both"),
        }
    }
}

impl FromStr for Resolution {
    type Err = ConflictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "both" => Ok(Self::Both),
            _ => Err(ConflictError::InvalidResolution(s.to_string())),
        }
    }
}

/// Section key to resolution. Absent keys resolve to [`Resolution::Right`].
pub type ResolutionMap = HashMap<String, Resolution>;

/// Parse a `KEY=left|right|both` assignment. The key may itself contain `=`;
/// the split happens at the last one.
pub fn parse_assignment(arg: &str) -> Result<(String, Resolution), ConflictError> {
    let (key, value) = arg
        .rsplit_once('=')
        .ok_or_else(|| ConflictError::InvalidResolution(arg.to_string()))?;
    Ok((key.to_string(), value.parse()?))
}

/// Stateless resolution operations over a merge request's conflict records.
pub struct ConflictResolver;

impl ConflictResolver {
    /// Record `resolution` for the conflict on `section_key`.
    ///
    /// Re-resolving an already resolved key replaces the earlier choice.
    pub fn resolve(
        db: &Database,
        merge_request_id: &str,
        section_key: &str,
        resolution: Resolution,
        resolved_by: &str,
    ) -> Result<(), ConflictError> {
        info!(merge_request_id, section_key, %resolution, resolved_by, "resolving conflict");

        let updated = db.set_conflict_resolution(
            merge_request_id,
            section_key,
            Some(resolution),
            Some(resolved_by),
        )?;
        if !updated {
            return Err(ConflictError::NotFound {
                merge_request: merge_request_id.to_string(),
                key: section_key.to_string(),
            });
        }

        let details = format!(
            "Resolved section '{}' of merge request {} as '{}'",
            section_key, merge_request_id, resolution
        );
        let _ = db.insert_audit_log("conflict_resolved", Some(resolved_by), Some(&details), true);

        debug!(merge_request_id, section_key, "conflict resolution stored");
        Ok(())
    }

    /// The resolution map recorded so far for a merge request.
    ///
    /// Unresolved conflicts are left out, so they fall back to the default.
    pub fn resolution_map(
        db: &Database,
        merge_request_id: &str,
    ) -> Result<ResolutionMap, ConflictError> {
        let map: ResolutionMap = db
            .list_merge_conflicts(merge_request_id)?
            .into_iter()
            .filter_map(|c| c.resolution.map(|r| (c.section_key, r)))
            .collect();
        debug!(merge_request_id, resolved = map.len(), "built resolution map");
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::SectionConflict;
    use crate::section::{Section, SectionLevel};

    fn section(key: &str, content: &str) -> Section {
        Section {
            key: key.to_string(),
            title: key.split_once(':').map(|(_, t)| t).unwrap_or(key).to_string(),
            level: SectionLevel::Section,
            content: content.to_string(),
            line_start: 2,
            line_end: 2,
        }
    }

    fn setup_db_with_conflict() -> (Database, String) {
        let db = Database::in_memory().unwrap();
        let mr_id = "mr-1".to_string();
        let conflict = SectionConflict {
            key: "1:Intro".to_string(),
            left: section("1:Intro", "source text"),
            right: section("1:Intro", "target text"),
        };
        db.replace_merge_conflicts(&mr_id, &[conflict]).unwrap();
        (db, mr_id)
    }

    #[test]
    fn test_parse_resolution() {
        assert_eq!("left".parse::<Resolution>().unwrap(), Resolution::Left);
        assert_eq!(" BOTH ".parse::<Resolution>().unwrap(), Resolution::Both);
        assert!(matches!(
            "theirs".parse::<Resolution>(),
            Err(ConflictError::InvalidResolution(_))
        ));
        assert_eq!(Resolution::default(), Resolution::Right);
    }

    #[test]
    fn test_serde_lowercase() {
        let map: ResolutionMap = serde_json::from_str(r#"{"1:Intro": "both"}"#).unwrap();
        assert_eq!(map["1:Intro"], Resolution::Both);
        assert_eq!(serde_json::to_string(&Resolution::Left).unwrap(), "\"left\"");
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("1.2:a=b=left").unwrap(),
            ("1.2:a=b".to_string(), Resolution::Left)
        );
        assert!(parse_assignment("1:Intro").is_err());
        assert!(parse_assignment("1:Intro=maybe").is_err());
    }

    #[test]
    fn test_resolve_and_build_map() {
        let (db, mr_id) = setup_db_with_conflict();
        assert!(ConflictResolver::resolution_map(&db, &mr_id).unwrap().is_empty());

        ConflictResolver::resolve(&db, &mr_id, "1:Intro", Resolution::Both, "alice").unwrap();
        let map = ConflictResolver::resolution_map(&db, &mr_id).unwrap();
        assert_eq!(map.get("1:Intro"), Some(&Resolution::Both));

        ConflictResolver::resolve(&db, &mr_id, "1:Intro", Resolution::Left, "bob").unwrap();
        let records = db.list_merge_conflicts(&mr_id).unwrap();
        assert_eq!(records[0].resolution, Some(Resolution::Left));
        assert_eq!(records[0].resolved_by.as_deref(), Some("bob"));
    }

    #[test]
    fn test_resolve_unknown_key() {
        let (db, mr_id) = setup_db_with_conflict();
        let result = ConflictResolver::resolve(&db, &mr_id, "9:Nope", Resolution::Left, "alice");
        assert!(matches!(result, Err(ConflictError::NotFound { .. })));
    }
}
