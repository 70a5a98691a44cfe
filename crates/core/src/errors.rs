//! Error types for the texmerge core library.
//!
//! The section engine (normalize, parse, outline, diff, merge) is total and
//! has no error type. Everything around it that touches storage or
//! configuration gets its own `thiserror` enum, and [`CoreError`] unifies
//! them for callers that want a single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Repository errors
// ---------------------------------------------------------------------------

/// Errors from the branch / commit / merge-request service.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A branch with this name already exists.
    #[error("branch '{0}' already exists")]
    BranchExists(String),

    /// No branch with this name.
    #[error("branch '{0}' not found")]
    BranchNotFound(String),

    /// A commit id referenced by a branch or merge request is missing.
    #[error("commit '{0}' not found")]
    CommitNotFound(String),

    /// No merge request with this id.
    #[error("merge request '{0}' not found")]
    MergeRequestNotFound(String),

    /// Source and target of a merge request are the same branch.
    #[error("cannot merge branch '{0}' into itself")]
    SameBranch(String),

    /// The merge request was already merged or closed.
    #[error("merge request '{id}' is {status}, not open")]
    MergeRequestNotOpen {
        id: String,
        status: String,
    },

    /// Another writer advanced the branch head first.
    #[error("branch '{branch}' head moved: expected {expected}, found {actual}")]
    StaleHead {
        branch: String,
        expected: String,
        actual: String,
    },

    /// A branch advanced after the merge request's conflicts were computed.
    #[error("merge request '{0}' is stale: a branch moved since its conflicts were computed")]
    StaleMergeRequest(String),

    /// Conflict bookkeeping failed.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Database error while reading or writing repository state.
    #[error("repository database error: {0}")]
    DatabaseError(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Conflict errors
// ---------------------------------------------------------------------------

/// Errors from conflict resolution bookkeeping.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The merge request has no conflict on this section key.
    #[error("no conflict on section '{key}' in merge request '{merge_request}'")]
    NotFound {
        merge_request: String,
        key: String,
    },

    /// A resolution string other than `left`, `right` or `both`.
    #[error("invalid resolution '{0}': expected left, right or both")]
    InvalidResolution(String),

    /// Database error when persisting conflict data.
    #[error("conflict database error: {0}")]
    DatabaseError(#[from] DatabaseError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors when loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing {
        var: String,
        field: String,
    },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue {
        field: String,
        detail: String,
    },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed {
        version: u32,
        detail: String,
    },

    /// A record was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// A guarded write found the row changed by another writer; the
    /// transaction was rolled back.
    #[error("{entity} {id} changed concurrently")]
    Superseded {
        entity: String,
        id: String,
    },

    /// A stored value could not be decoded.
    #[error("corrupt {column} value in database: {value}")]
    InvalidValue {
        column: String,
        value: String,
    },

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = RepositoryError::BranchNotFound("draft".into());
        assert_eq!(err.to_string(), "branch 'draft' not found");

        let err = RepositoryError::StaleHead {
            branch: "main".into(),
            expected: "abc".into(),
            actual: "def".into(),
        };
        assert!(err.to_string().contains("expected abc, found def"));

        let err = ConflictError::InvalidResolution("theirs".into());
        assert!(err.to_string().contains("left, right or both"));

        let err = ConfigError::EnvVarMissing {
            var: "TEXMERGE_AUTHOR".into(),
            field: "repository.author_env".into(),
        };
        assert!(err.to_string().contains("TEXMERGE_AUTHOR"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let repo_err = RepositoryError::MergeRequestNotFound("mr-1".into());
        let core_err: CoreError = repo_err.into();
        assert!(matches!(core_err, CoreError::Repository(_)));

        let db_err = DatabaseError::NotFound {
            entity: "commit".into(),
            id: "abc".into(),
        };
        let core_err: CoreError = CoreError::Database(db_err);
        assert!(matches!(core_err, CoreError::Database(_)));
    }

    #[test]
    fn test_repository_error_wraps_conflict_error() {
        let err: RepositoryError = ConflictError::NotFound {
            merge_request: "mr".into(),
            key: "1:Intro".into(),
        }
        .into();
        assert!(err.to_string().contains("1:Intro"));
    }
}
