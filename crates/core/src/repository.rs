//! Branches, commits and merge requests over the section engine.
//!
//! The [`Repository`] owns a [`Database`] and implements the document
//! workflow around the engine:
//!
//! 1. Branches hold a head commit; each commit is a full document snapshot.
//! 2. Committing is a compare-and-swap on the branch head, so concurrent
//!    writers to one branch cannot both win.
//! 3. A merge request snapshots both heads and their merge base, and stores
//!    the sections changed on both sides as conflicts.
//! 4. Applying merges the snapshot with the recorded resolutions, but only
//!    if neither head moved since the snapshot was taken.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conflict::{merge_latex, ConflictClassifier, ConflictResolver, Resolution};
use crate::db::Database;
use crate::errors::{DatabaseError, RepositoryError};
use crate::models::{short_id, Branch, Commit, ConflictRecord, MergeRequest, MergeRequestStatus};

/// Commit message used for the empty first commit of a root branch.
const INITIAL_COMMIT_MESSAGE: &str = "Initial empty document";

/// The document repository service.
pub struct Repository {
    db: Database,
}

impl Repository {
    /// Wrap an already initialized database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open (or create) the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Open (or create) the store kept in `data_dir`.
    pub fn open_store<P: AsRef<Path>>(data_dir: P) -> Result<Self, RepositoryError> {
        Ok(Self::new(Database::open_store(data_dir)?))
    }

    /// Return a reference to the database.
    pub fn db(&self) -> &Database {
        &self.db
    }

    // -----------------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------------

    /// Create a branch.
    ///
    /// A root branch (no `parent`) starts with an empty-content commit; a
    /// child branch starts at its parent's head commit.
    pub fn create_branch(
        &self,
        name: &str,
        parent: Option<&str>,
        author: &str,
    ) -> Result<Branch, RepositoryError> {
        if self.db.get_branch_by_name(name)?.is_some() {
            return Err(RepositoryError::BranchExists(name.to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let (branch, initial_commit) = match parent {
            Some(parent_name) => {
                let parent = self.get_branch(parent_name)?;
                let branch = Branch {
                    id,
                    name: name.to_string(),
                    parent_id: Some(parent.id),
                    head_commit_id: parent.head_commit_id,
                    created_at: now,
                };
                (branch, None)
            }
            None => {
                let commit = Commit {
                    id: Uuid::new_v4().to_string(),
                    branch_id: id.clone(),
                    parent_id: None,
                    message: INITIAL_COMMIT_MESSAGE.to_string(),
                    author: author.to_string(),
                    content: String::new(),
                    created_at: now,
                };
                let branch = Branch {
                    id,
                    name: name.to_string(),
                    parent_id: None,
                    head_commit_id: commit.id.clone(),
                    created_at: now,
                };
                (branch, Some(commit))
            }
        };

        self.db.insert_branch(&branch, initial_commit.as_ref())?;
        info!(name, parent = parent.unwrap_or("-"), "created branch");
        self.audit("branch_created", author, &format!("Created branch '{}'", name));
        Ok(branch)
    }

    /// Look up a branch by name.
    pub fn get_branch(&self, name: &str) -> Result<Branch, RepositoryError> {
        self.db
            .get_branch_by_name(name)?
            .ok_or_else(|| RepositoryError::BranchNotFound(name.to_string()))
    }

    /// All branches, oldest first.
    pub fn list_branches(&self) -> Result<Vec<Branch>, RepositoryError> {
        Ok(self.db.list_branches()?)
    }

    /// The head commit of a branch.
    pub fn head_commit(&self, name: &str) -> Result<Commit, RepositoryError> {
        let branch = self.get_branch(name)?;
        self.load_commit(&branch.head_commit_id)
    }

    /// The document text at a branch head.
    pub fn head_content(&self, name: &str) -> Result<String, RepositoryError> {
        Ok(self.head_commit(name)?.content)
    }

    /// Up to `limit` commits reachable from the branch head, newest first.
    pub fn history(&self, name: &str, limit: usize) -> Result<Vec<Commit>, RepositoryError> {
        let branch = self.get_branch(name)?;
        let mut commits = Vec::new();
        let mut next = Some(branch.head_commit_id);
        while let Some(id) = next {
            if commits.len() >= limit {
                break;
            }
            let commit = self.load_commit(&id)?;
            next = commit.parent_id.clone();
            commits.push(commit);
        }
        Ok(commits)
    }

    // -----------------------------------------------------------------------
    // Commits
    // -----------------------------------------------------------------------

    /// Commit a new document snapshot onto `branch_name`.
    ///
    /// When `expected_head` is given it must match the current head. The head
    /// update itself is a compare-and-swap, so a writer that raced ahead
    /// between the read and the write is also reported as
    /// [`RepositoryError::StaleHead`], and nothing is written.
    pub fn commit(
        &self,
        branch_name: &str,
        content: &str,
        message: &str,
        author: &str,
        expected_head: Option<&str>,
    ) -> Result<Commit, RepositoryError> {
        let branch = self.get_branch(branch_name)?;
        let expected = expected_head
            .unwrap_or(branch.head_commit_id.as_str())
            .to_string();
        if expected != branch.head_commit_id {
            return Err(RepositoryError::StaleHead {
                branch: branch_name.to_string(),
                expected,
                actual: branch.head_commit_id,
            });
        }

        let commit = Commit {
            id: Uuid::new_v4().to_string(),
            branch_id: branch.id.clone(),
            parent_id: Some(expected.clone()),
            message: message.to_string(),
            author: author.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };

        if !self.db.advance_branch_head(&branch.id, &expected, &commit)? {
            let actual = self.db.get_branch(&branch.id)?.head_commit_id;
            warn!(branch = branch_name, %expected, %actual, "lost commit race");
            return Err(RepositoryError::StaleHead {
                branch: branch_name.to_string(),
                expected,
                actual,
            });
        }

        info!(branch = branch_name, commit = commit.short_id(), "committed");
        Ok(commit)
    }

    /// Nearest common ancestor of two commits, following parent links.
    ///
    /// Falls back to `target_head` when the histories share no commit.
    pub fn merge_base(
        &self,
        source_head: &str,
        target_head: &str,
    ) -> Result<String, RepositoryError> {
        let mut source_ancestors = HashSet::new();
        let mut next = Some(source_head.to_string());
        while let Some(id) = next {
            next = self.load_commit(&id)?.parent_id;
            source_ancestors.insert(id);
        }

        let mut next = Some(target_head.to_string());
        while let Some(id) = next {
            if source_ancestors.contains(&id) {
                debug!(source_head, target_head, base = %id, "found merge base");
                return Ok(id);
            }
            next = self.load_commit(&id)?.parent_id;
        }

        debug!(source_head, target_head, "no common ancestor, using target head");
        Ok(target_head.to_string())
    }

    // -----------------------------------------------------------------------
    // Merge requests
    // -----------------------------------------------------------------------

    /// Open a merge request of `source` into `target` and record the
    /// sections changed on both sides as conflicts.
    pub fn open_merge_request(
        &self,
        source: &str,
        target: &str,
        title: &str,
        author: &str,
    ) -> Result<MergeRequest, RepositoryError> {
        if source == target {
            return Err(RepositoryError::SameBranch(source.to_string()));
        }
        let source_branch = self.get_branch(source)?;
        let target_branch = self.get_branch(target)?;

        let base_commit_id =
            self.merge_base(&source_branch.head_commit_id, &target_branch.head_commit_id)?;
        let conflicts = self.classify(
            &base_commit_id,
            &source_branch.head_commit_id,
            &target_branch.head_commit_id,
        )?;

        let now = Utc::now();
        let mr = MergeRequest {
            id: Uuid::new_v4().to_string(),
            source_branch_id: source_branch.id,
            target_branch_id: target_branch.id,
            title: title.to_string(),
            author: author.to_string(),
            status: MergeRequestStatus::Open,
            base_commit_id,
            source_head: source_branch.head_commit_id,
            target_head: target_branch.head_commit_id,
            merge_commit_id: None,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_merge_request(&mr, &conflicts)?;

        info!(id = %mr.id, source, target, conflicts = conflicts.len(), "opened merge request");
        self.audit(
            "merge_request_opened",
            author,
            &format!(
                "Opened merge request {} ({} -> {}) with {} conflict(s)",
                mr.id,
                source,
                target,
                conflicts.len()
            ),
        );
        Ok(mr)
    }

    /// Look up a merge request by id.
    pub fn get_merge_request(&self, id: &str) -> Result<MergeRequest, RepositoryError> {
        self.db.get_merge_request(id).map_err(|e| match e {
            DatabaseError::NotFound { .. } => RepositoryError::MergeRequestNotFound(id.to_string()),
            other => other.into(),
        })
    }

    /// Merge requests, optionally filtered by status, newest first.
    pub fn list_merge_requests(
        &self,
        status: Option<MergeRequestStatus>,
    ) -> Result<Vec<MergeRequest>, RepositoryError> {
        Ok(self.db.list_merge_requests(status)?)
    }

    /// The conflict records of a merge request.
    pub fn conflicts(
        &self,
        merge_request_id: &str,
    ) -> Result<Vec<ConflictRecord>, RepositoryError> {
        self.get_merge_request(merge_request_id)?;
        Ok(self.db.list_merge_conflicts(merge_request_id)?)
    }

    /// Record a resolution for one conflicting section of an open merge request.
    pub fn resolve_conflict(
        &self,
        merge_request_id: &str,
        section_key: &str,
        resolution: Resolution,
        resolved_by: &str,
    ) -> Result<(), RepositoryError> {
        let mr = self.get_merge_request(merge_request_id)?;
        require_open(&mr)?;
        ConflictResolver::resolve(
            &self.db,
            merge_request_id,
            section_key,
            resolution,
            resolved_by,
        )?;
        Ok(())
    }

    /// Recompute the snapshot heads, merge base and conflicts of an open
    /// merge request against the current branch heads.
    ///
    /// Every earlier resolution is discarded, since it was chosen against
    /// content that may have changed.
    pub fn refresh_merge_request(
        &self,
        merge_request_id: &str,
    ) -> Result<MergeRequest, RepositoryError> {
        let mr = self.get_merge_request(merge_request_id)?;
        require_open(&mr)?;
        let source_branch = self.branch_by_id(&mr.source_branch_id)?;
        let target_branch = self.branch_by_id(&mr.target_branch_id)?;

        let base_commit_id =
            self.merge_base(&source_branch.head_commit_id, &target_branch.head_commit_id)?;
        let conflicts = self.classify(
            &base_commit_id,
            &source_branch.head_commit_id,
            &target_branch.head_commit_id,
        )?;

        if !self.db.refresh_merge_request_snapshot(
            merge_request_id,
            &base_commit_id,
            &source_branch.head_commit_id,
            &target_branch.head_commit_id,
            &conflicts,
        )? {
            return Err(self.not_open(merge_request_id));
        }
        info!(
            id = merge_request_id,
            source_head = short_id(&source_branch.head_commit_id),
            target_head = short_id(&target_branch.head_commit_id),
            conflicts = conflicts.len(),
            "refreshed merge request"
        );
        self.get_merge_request(merge_request_id)
    }

    /// Merge the snapshot of an open merge request into its target branch.
    ///
    /// Unresolved conflicts take the target side. Fails with
    /// [`RepositoryError::StaleMergeRequest`] if either branch head moved
    /// since the snapshot.
    pub fn apply_merge_request(
        &self,
        merge_request_id: &str,
        author: &str,
    ) -> Result<Commit, RepositoryError> {
        let mr = self.get_merge_request(merge_request_id)?;
        require_open(&mr)?;
        let source_branch = self.branch_by_id(&mr.source_branch_id)?;
        let target_branch = self.branch_by_id(&mr.target_branch_id)?;

        if source_branch.head_commit_id != mr.source_head
            || target_branch.head_commit_id != mr.target_head
        {
            warn!(id = merge_request_id, "merge request snapshot is stale");
            return Err(RepositoryError::StaleMergeRequest(merge_request_id.to_string()));
        }

        let base = self.load_commit(&mr.base_commit_id)?;
        let source = self.load_commit(&mr.source_head)?;
        let target = self.load_commit(&mr.target_head)?;
        let resolutions = ConflictResolver::resolution_map(&self.db, merge_request_id)?;
        let merged = merge_latex(&base.content, &source.content, &target.content, &resolutions);

        let commit = Commit {
            id: Uuid::new_v4().to_string(),
            branch_id: target_branch.id.clone(),
            parent_id: Some(mr.target_head.clone()),
            message: format!(
                "Merge '{}' into '{}': {}",
                source_branch.name, target_branch.name, mr.title
            ),
            author: author.to_string(),
            content: merged,
            created_at: Utc::now(),
        };

        // The checks above ran outside the write lock; the store repeats all
        // of them while appending the merge commit.
        if !self.db.complete_merge_request(&mr, &commit)? {
            let current = self.get_merge_request(merge_request_id)?;
            require_open(&current)?;
            warn!(id = merge_request_id, "merge request snapshot changed during apply");
            return Err(RepositoryError::StaleMergeRequest(merge_request_id.to_string()));
        }

        info!(
            id = merge_request_id,
            target = %target_branch.name,
            commit = commit.short_id(),
            resolved = resolutions.len(),
            "applied merge request"
        );
        self.audit(
            "merge_request_applied",
            author,
            &format!("Merged {} into '{}' as {}", merge_request_id, target_branch.name, commit.id),
        );
        Ok(commit)
    }

    /// Close an open merge request without merging.
    pub fn close_merge_request(
        &self,
        merge_request_id: &str,
        actor: &str,
    ) -> Result<MergeRequest, RepositoryError> {
        let mr = self.get_merge_request(merge_request_id)?;
        require_open(&mr)?;
        if !self.db.close_merge_request(merge_request_id)? {
            return Err(self.not_open(merge_request_id));
        }
        info!(id = merge_request_id, "closed merge request");
        self.audit(
            "merge_request_closed",
            actor,
            &format!("Closed merge request {}", merge_request_id),
        );
        self.get_merge_request(merge_request_id)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn classify(
        &self,
        base_id: &str,
        source_id: &str,
        target_id: &str,
    ) -> Result<Vec<crate::conflict::SectionConflict>, RepositoryError> {
        let base = self.load_commit(base_id)?;
        let source = self.load_commit(source_id)?;
        let target = self.load_commit(target_id)?;
        Ok(ConflictClassifier::three_way(
            &base.content,
            &source.content,
            &target.content,
        ))
    }

    fn load_commit(&self, id: &str) -> Result<Commit, RepositoryError> {
        self.db.get_commit(id).map_err(|e| match e {
            DatabaseError::NotFound { .. } => RepositoryError::CommitNotFound(id.to_string()),
            other => other.into(),
        })
    }

    fn branch_by_id(&self, id: &str) -> Result<Branch, RepositoryError> {
        self.db.get_branch(id).map_err(|e| match e {
            DatabaseError::NotFound { .. } => RepositoryError::BranchNotFound(id.to_string()),
            other => other.into(),
        })
    }

    /// The error for a guarded write that found the merge request no longer
    /// open, carrying its current status.
    fn not_open(&self, merge_request_id: &str) -> RepositoryError {
        match self.get_merge_request(merge_request_id) {
            Ok(mr) => RepositoryError::MergeRequestNotOpen {
                id: mr.id,
                status: mr.status.to_string(),
            },
            Err(e) => e,
        }
    }

    fn audit(&self, action: &str, actor: &str, details: &str) {
        if let Err(e) = self.db.insert_audit_log(action, Some(actor), Some(details), true) {
            warn!(action, error = %e, "failed to write audit log");
        }
    }
}

fn require_open(mr: &MergeRequest) -> Result<(), RepositoryError> {
    if mr.status != MergeRequestStatus::Open {
        return Err(RepositoryError::MergeRequestNotOpen {
            id: mr.id.clone(),
            status: mr.status.to_string(),
        });
    }
    Ok(())
}
