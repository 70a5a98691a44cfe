//! Database schema definitions and migration runner.
//!
//! Migrations are simple SQL strings applied in order. The `schema_version`
//! user-version pragma tracks which migrations have already been applied.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
/// Versions start at 1. The current schema version is stored in the SQLite
/// `user_version` pragma.
static MIGRATIONS: &[(u32, &str, &str)] = &[
    (
        1,
        "initial schema",
        r#"
        CREATE TABLE IF NOT EXISTS branches (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL UNIQUE,
            parent_id       TEXT,
            head_commit_id  TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS commits (
            id          TEXT PRIMARY KEY,
            branch_id   TEXT NOT NULL,
            parent_id   TEXT,
            message     TEXT NOT NULL DEFAULT '',
            author      TEXT NOT NULL DEFAULT '',
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_commits_branch ON commits (branch_id);

        CREATE TABLE IF NOT EXISTS merge_requests (
            id                TEXT PRIMARY KEY,
            source_branch_id  TEXT NOT NULL,
            target_branch_id  TEXT NOT NULL,
            title             TEXT NOT NULL DEFAULT '',
            author            TEXT NOT NULL DEFAULT '',
            status            TEXT NOT NULL DEFAULT 'open'
                              CHECK (status IN ('open', 'merged', 'closed')),
            base_commit_id    TEXT NOT NULL,
            source_head       TEXT NOT NULL,
            target_head       TEXT NOT NULL,
            merge_commit_id   TEXT,
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_merge_requests_status ON merge_requests (status);

        CREATE TABLE IF NOT EXISTS conflicts (
            id                TEXT PRIMARY KEY,
            merge_request_id  TEXT NOT NULL,
            section_key       TEXT NOT NULL,
            source_content    TEXT NOT NULL,
            target_content    TEXT NOT NULL,
            resolution        TEXT CHECK (resolution IN ('left', 'right', 'both')),
            resolved_by       TEXT,
            created_at        TEXT NOT NULL,
            resolved_at       TEXT,
            UNIQUE (merge_request_id, section_key)
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            action      TEXT NOT NULL,
            actor       TEXT,
            details     TEXT,
            success     INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_log_created_at ON audit_log (created_at);
        CREATE INDEX IF NOT EXISTS idx_audit_log_action ON audit_log (action);
        "#,
    ),
];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_schema_version(conn)?;
    info!(
        current_version,
        target_version = MIGRATIONS.last().map(|m| m.0).unwrap_or(0),
        "checking database migrations"
    );

    for &(version, description, sql) in MIGRATIONS {
        if version > current_version {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied successfully");
        }
    }

    Ok(())
}

/// Read the current schema version from the SQLite `user_version` pragma.
fn get_schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Set the schema version via the SQLite `user_version` pragma.
fn set_schema_version(conn: &Connection, version: u32) -> Result<(), DatabaseError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_idempotently() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };

        for table in ["branches", "commits", "merge_requests", "conflicts", "audit_log"] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }
}
