//! Typed query helpers for every table in the texmerge database.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use super::Database;
use crate::conflict::{Resolution, SectionConflict};
use crate::errors::DatabaseError;
use crate::models::{AuditEntry, Branch, Commit, ConflictRecord, MergeRequest, MergeRequestStatus};

const BRANCH_COLUMNS: &str = "id, name, parent_id, head_commit_id, created_at";
const COMMIT_COLUMNS: &str = "id, branch_id, parent_id, message, author, content, created_at";
const MERGE_REQUEST_COLUMNS: &str = "id, source_branch_id, target_branch_id, title, author, status,
     base_commit_id, source_head, target_head, merge_commit_id, created_at, updated_at";
const CONFLICT_COLUMNS: &str = "id, merge_request_id, section_key, source_content, target_content,
     resolution, resolved_by, created_at, resolved_at";

// ---------------------------------------------------------------------------
// Query implementations
// ---------------------------------------------------------------------------

impl Database {
    // -- branches -----------------------------------------------------------

    /// Insert a branch. A root branch passes its initial commit, which is
    /// written in the same transaction.
    pub fn insert_branch(
        &self,
        branch: &Branch,
        initial_commit: Option<&Commit>,
    ) -> Result<(), DatabaseError> {
        self.transaction(|conn| {
            if let Some(commit) = initial_commit {
                insert_commit_row(conn, commit)?;
            }
            conn.execute(
                "INSERT INTO branches (id, name, parent_id, head_commit_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    branch.id,
                    branch.name,
                    branch.parent_id,
                    branch.head_commit_id,
                    branch.created_at.to_rfc3339()
                ],
            )?;
            Ok(())
        })?;
        debug!(id = %branch.id, name = %branch.name, "inserted branch");
        Ok(())
    }

    /// Get a branch by id (returns an error if not found).
    pub fn get_branch(&self, id: &str) -> Result<Branch, DatabaseError> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE id = ?1"),
            params![id],
            branch_from_row,
        )
        .map_err(|e| not_found(e, "branch", id))
    }

    /// Look up a branch by its unique name.
    pub fn get_branch_by_name(&self, name: &str) -> Result<Option<Branch>, DatabaseError> {
        let conn = self.conn();
        let branch = conn
            .query_row(
                &format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE name = ?1"),
                params![name],
                branch_from_row,
            )
            .optional()?;
        Ok(branch)
    }

    /// All branches, oldest first.
    pub fn list_branches(&self) -> Result<Vec<Branch>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BRANCH_COLUMNS} FROM branches ORDER BY created_at, name"
        ))?;
        let branches = stmt
            .query_map([], branch_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(branches)
    }

    // -- commits ------------------------------------------------------------

    /// Get a commit by id (returns an error if not found).
    pub fn get_commit(&self, id: &str) -> Result<Commit, DatabaseError> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {COMMIT_COLUMNS} FROM commits WHERE id = ?1"),
            params![id],
            commit_from_row,
        )
        .map_err(|e| not_found(e, "commit", id))
    }

    /// Append `commit` to a branch if its head is still `expected_head`.
    ///
    /// Returns `false`, writing nothing, when another writer moved the head.
    pub fn advance_branch_head(
        &self,
        branch_id: &str,
        expected_head: &str,
        commit: &Commit,
    ) -> Result<bool, DatabaseError> {
        let advanced = self.transaction(|conn| swap_head(conn, branch_id, expected_head, commit))?;
        debug!(branch_id, commit_id = %commit.id, advanced, "advance branch head");
        Ok(advanced)
    }

    // -- merge requests -----------------------------------------------------

    /// Insert a merge request together with its conflict snapshot.
    pub fn insert_merge_request(
        &self,
        mr: &MergeRequest,
        conflicts: &[SectionConflict],
    ) -> Result<(), DatabaseError> {
        self.transaction(|conn| {
            conn.execute(
                "INSERT INTO merge_requests (id, source_branch_id, target_branch_id, title, author,
                 status, base_commit_id, source_head, target_head, merge_commit_id, created_at,
                 updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    mr.id,
                    mr.source_branch_id,
                    mr.target_branch_id,
                    mr.title,
                    mr.author,
                    mr.status.to_string(),
                    mr.base_commit_id,
                    mr.source_head,
                    mr.target_head,
                    mr.merge_commit_id,
                    mr.created_at.to_rfc3339(),
                    mr.updated_at.to_rfc3339()
                ],
            )?;
            write_conflict_rows(conn, &mr.id, conflicts)
        })?;
        debug!(id = %mr.id, conflicts = conflicts.len(), "inserted merge request");
        Ok(())
    }

    /// Get a merge request by id (returns an error if not found).
    pub fn get_merge_request(&self, id: &str) -> Result<MergeRequest, DatabaseError> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {MERGE_REQUEST_COLUMNS} FROM merge_requests WHERE id = ?1"),
            params![id],
            merge_request_from_row,
        )
        .map_err(|e| not_found(e, "merge request", id))
    }

    /// List merge requests, optionally filtered by status, newest first.
    pub fn list_merge_requests(
        &self,
        status: Option<MergeRequestStatus>,
    ) -> Result<Vec<MergeRequest>, DatabaseError> {
        let conn = self.conn();
        let requests = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MERGE_REQUEST_COLUMNS} FROM merge_requests
                     WHERE status = ?1 ORDER BY created_at DESC"
                ))?;
                let rows = stmt
                    .query_map(params![status.to_string()], merge_request_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MERGE_REQUEST_COLUMNS} FROM merge_requests ORDER BY created_at DESC"
                ))?;
                let rows = stmt
                    .query_map([], merge_request_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(requests)
    }

    /// Replace the snapshot heads, merge base and conflict list of an open
    /// merge request. Every stored resolution is dropped with the old
    /// conflicts.
    ///
    /// Returns `false`, writing nothing, when the merge request is missing or
    /// no longer open.
    pub fn refresh_merge_request_snapshot(
        &self,
        id: &str,
        base_commit_id: &str,
        source_head: &str,
        target_head: &str,
        conflicts: &[SectionConflict],
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let refreshed = self.transaction(|conn| {
            let changed = conn.execute(
                "UPDATE merge_requests SET base_commit_id = ?1, source_head = ?2, target_head = ?3,
                 updated_at = ?4 WHERE id = ?5 AND status = 'open'",
                params![base_commit_id, source_head, target_head, now, id],
            )?;
            if changed == 0 {
                return Ok(false);
            }
            write_conflict_rows(conn, id, conflicts)?;
            Ok(true)
        })?;
        debug!(id, conflicts = conflicts.len(), refreshed, "refresh merge request snapshot");
        Ok(refreshed)
    }

    /// Close an open merge request. Returns `false` when it is missing or was
    /// already merged or closed.
    pub fn close_merge_request(&self, id: &str) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE merge_requests SET status = 'closed', updated_at = ?1
             WHERE id = ?2 AND status = 'open'",
            params![now, id],
        )?;
        debug!(id, closed = changed > 0, "close merge request");
        Ok(changed > 0)
    }

    /// Append the merge commit built from `snapshot` to the target branch and
    /// mark the merge request merged, in one transaction.
    ///
    /// Every part of the snapshot is re-checked under the write lock: the
    /// merge request must still be open with the same recorded heads, and
    /// both branches must still point at them. Returns `false`, writing
    /// nothing, if any of that changed.
    pub fn complete_merge_request(
        &self,
        snapshot: &MergeRequest,
        merge_commit: &Commit,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let superseded = |entity: &str, id: &str| DatabaseError::Superseded {
            entity: entity.to_string(),
            id: id.to_string(),
        };

        let result = self.transaction(|conn| {
            let source_head = branch_head(conn, &snapshot.source_branch_id)?;
            if source_head.as_deref() != Some(snapshot.source_head.as_str()) {
                return Err(superseded("branch", &snapshot.source_branch_id));
            }
            if !swap_head(conn, &snapshot.target_branch_id, &snapshot.target_head, merge_commit)? {
                return Err(superseded("branch", &snapshot.target_branch_id));
            }
            let changed = conn.execute(
                "UPDATE merge_requests SET status = 'merged', merge_commit_id = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'open' AND source_head = ?4 AND target_head = ?5",
                params![
                    merge_commit.id,
                    now,
                    snapshot.id,
                    snapshot.source_head,
                    snapshot.target_head
                ],
            )?;
            if changed == 0 {
                return Err(superseded("merge request", &snapshot.id));
            }
            Ok(())
        });

        let merged = match result {
            Ok(()) => true,
            Err(DatabaseError::Superseded { entity, id }) => {
                debug!(%entity, %id, "merge snapshot superseded");
                false
            }
            Err(e) => return Err(e),
        };
        debug!(id = %snapshot.id, commit_id = %merge_commit.id, merged, "complete merge request");
        Ok(merged)
    }

    // -- conflicts ----------------------------------------------------------

    /// Replace the conflict list of a merge request.
    pub fn replace_merge_conflicts(
        &self,
        merge_request_id: &str,
        conflicts: &[SectionConflict],
    ) -> Result<(), DatabaseError> {
        self.transaction(|conn| write_conflict_rows(conn, merge_request_id, conflicts))?;
        debug!(merge_request_id, conflicts = conflicts.len(), "replaced merge conflicts");
        Ok(())
    }

    /// Conflicts of a merge request, in the order they were classified.
    pub fn list_merge_conflicts(
        &self,
        merge_request_id: &str,
    ) -> Result<Vec<ConflictRecord>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE merge_request_id = ?1 ORDER BY rowid"
        ))?;
        let records = stmt
            .query_map(params![merge_request_id], conflict_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Record (or clear, with `None`) the resolution of one conflict.
    ///
    /// Returns `false` when the merge request has no conflict on that key.
    pub fn set_conflict_resolution(
        &self,
        merge_request_id: &str,
        section_key: &str,
        resolution: Option<Resolution>,
        resolved_by: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let resolved_at = resolution.map(|_| Utc::now().to_rfc3339());
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE conflicts SET resolution = ?1, resolved_by = ?2, resolved_at = ?3
             WHERE merge_request_id = ?4 AND section_key = ?5",
            params![
                resolution.map(|r| r.to_string()),
                resolved_by,
                resolved_at,
                merge_request_id,
                section_key
            ],
        )?;
        debug!(merge_request_id, section_key, changed, "set conflict resolution");
        Ok(changed > 0)
    }

    // -- audit_log ----------------------------------------------------------

    /// Insert an audit-log entry.
    pub fn insert_audit_log(
        &self,
        action: &str,
        actor: Option<&str>,
        details: Option<&str>,
        success: bool,
    ) -> Result<i64, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO audit_log (action, actor, details, success, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![action, actor, details, success, now],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, action, "inserted audit_log entry");
        Ok(id)
    }

    /// List recent audit-log entries, newest first.
    pub fn list_audit_log(&self, limit: u32) -> Result<Vec<AuditEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, action, actor, details, success, created_at
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    action: row.get(1)?,
                    actor: row.get(2)?,
                    details: row.get(3)?,
                    success: row.get(4)?,
                    created_at: parse_datetime(&row.get::<_, String>(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Count all audit-log entries.
    pub fn count_audit_log(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Connection-level helpers (usable inside a transaction)
// ---------------------------------------------------------------------------

fn insert_commit_row(conn: &Connection, commit: &Commit) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO commits (id, branch_id, parent_id, message, author, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            commit.id,
            commit.branch_id,
            commit.parent_id,
            commit.message,
            commit.author,
            commit.content,
            commit.created_at.to_rfc3339()
        ],
    )?;
    Ok(())
}

fn branch_head(conn: &Connection, branch_id: &str) -> Result<Option<String>, DatabaseError> {
    let head = conn
        .query_row(
            "SELECT head_commit_id FROM branches WHERE id = ?1",
            params![branch_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(head)
}

/// Compare-and-swap the head of `branch_id` to `commit`, inserting the commit
/// only when the swap succeeded.
fn swap_head(
    conn: &Connection,
    branch_id: &str,
    expected_head: &str,
    commit: &Commit,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE branches SET head_commit_id = ?1 WHERE id = ?2 AND head_commit_id = ?3",
        params![commit.id, branch_id, expected_head],
    )?;
    if changed == 0 {
        return Ok(false);
    }
    insert_commit_row(conn, commit)?;
    Ok(true)
}

fn write_conflict_rows(
    conn: &Connection,
    merge_request_id: &str,
    conflicts: &[SectionConflict],
) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "DELETE FROM conflicts WHERE merge_request_id = ?1",
        params![merge_request_id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO conflicts (id, merge_request_id, section_key, source_content,
         target_content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for conflict in conflicts {
        stmt.execute(params![
            Uuid::new_v4().to_string(),
            merge_request_id,
            conflict.key,
            conflict.left.content,
            conflict.right.content,
            now
        ])?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn branch_from_row(row: &Row<'_>) -> rusqlite::Result<Branch> {
    Ok(Branch {
        id: row.get(0)?,
        name: row.get(1)?,
        parent_id: row.get(2)?,
        head_commit_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn commit_from_row(row: &Row<'_>) -> rusqlite::Result<Commit> {
    Ok(Commit {
        id: row.get(0)?,
        branch_id: row.get(1)?,
        parent_id: row.get(2)?,
        message: row.get(3)?,
        author: row.get(4)?,
        content: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn merge_request_from_row(row: &Row<'_>) -> rusqlite::Result<MergeRequest> {
    let status: String = row.get(5)?;
    let status = MergeRequestStatus::from_str_val(&status)
        .ok_or_else(|| invalid_column(5, "merge_requests.status", &status))?;
    Ok(MergeRequest {
        id: row.get(0)?,
        source_branch_id: row.get(1)?,
        target_branch_id: row.get(2)?,
        title: row.get(3)?,
        author: row.get(4)?,
        status,
        base_commit_id: row.get(6)?,
        source_head: row.get(7)?,
        target_head: row.get(8)?,
        merge_commit_id: row.get(9)?,
        created_at: parse_datetime(&row.get::<_, String>(10)?),
        updated_at: parse_datetime(&row.get::<_, String>(11)?),
    })
}

fn conflict_from_row(row: &Row<'_>) -> rusqlite::Result<ConflictRecord> {
    let resolution = match row.get::<_, Option<String>>(5)? {
        Some(value) => Some(
            value
                .parse::<Resolution>()
                .map_err(|_| invalid_column(5, "conflicts.resolution", &value))?,
        ),
        None => None,
    };
    Ok(ConflictRecord {
        id: row.get(0)?,
        merge_request_id: row.get(1)?,
        section_key: row.get(2)?,
        source_content: row.get(3)?,
        target_content: row.get(4)?,
        resolution,
        resolved_by: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        resolved_at: row.get::<_, Option<String>>(8)?.map(|s| parse_datetime(&s)),
    })
}

fn invalid_column(index: usize, column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        Type::Text,
        Box::new(DatabaseError::InvalidValue {
            column: column.to_string(),
            value: value.to_string(),
        }),
    )
}

fn not_found(err: rusqlite::Error, entity: &str, id: &str) -> DatabaseError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        },
        other => other.into(),
    }
}

/// Parse a datetime string, returning Utc::now() as a fallback if parsing fails.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
