//! End-to-end tests for the document repository.
//!
//! These tests exercise the real `Repository` with a SQLite database file in
//! a temporary directory, reopening it between steps to check that branch,
//! commit and merge-request state is persisted.

use std::path::PathBuf;

use tempfile::TempDir;

use texmerge_core::config::AppConfig;
use texmerge_core::errors::RepositoryError;
use texmerge_core::models::MergeRequestStatus;
use texmerge_core::{parse_sections, Repository, Resolution};

// ===========================================================================
// Helpers
// ===========================================================================

const PAPER_V1: &str = "\\documentclass{article}
\\begin{document}
\\section{Introduction}
We study $a  +  b$.
\\section{Method}
\\subsection{Setup}
Run it.
\\section{Results}
Good.";

struct Workspace {
    _dir: TempDir,
    config: AppConfig,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("texmerge.toml");
        let data_dir = dir.path().join(".texmerge");
        std::fs::write(
            &config_path,
            format!(
                "[store]\ndata_dir = {:?}\n\n[repository]\nauthor = \"alice\"\n",
                data_dir.display().to_string()
            ),
        )
        .unwrap();
        let config = AppConfig::load_and_resolve(&config_path).unwrap();
        Self { _dir: dir, config }
    }

    fn db_path(&self) -> PathBuf {
        self.config.database_path()
    }

    fn open(&self) -> Repository {
        Repository::open(self.db_path()).unwrap()
    }
}

fn edit(source: &str, from: &str, to: &str) -> String {
    assert!(source.contains(from), "fixture does not contain {from:?}");
    source.replacen(from, to, 1)
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn state_survives_reopen() {
    let ws = Workspace::new();
    let author = ws.config.repository.author.clone();
    {
        let repo = ws.open();
        repo.create_branch(&ws.config.repository.default_branch, None, &author)
            .unwrap();
        repo.commit("main", PAPER_V1, "first draft", &author, None)
            .unwrap();
    }
    assert!(ws.db_path().exists());

    let repo = ws.open();
    assert_eq!(repo.head_content("main").unwrap(), PAPER_V1);
    let history = repo.history("main", 10).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].author, "alice");
    assert_eq!(history[0].message, "first draft");
}

#[test]
fn full_merge_request_workflow() {
    let ws = Workspace::new();
    let repo = ws.open();
    repo.create_branch("main", None, "alice").unwrap();
    repo.commit("main", PAPER_V1, "v1", "alice", None).unwrap();
    repo.create_branch("review", Some("main"), "bob").unwrap();

    // Both sides touch Results; only the source touches Setup; the target
    // only respaces math, which is not a change.
    let source = edit(&edit(PAPER_V1, "Run it.", "Run it twice."), "Good.", "Very good.");
    repo.commit("review", &source, "bob's edits", "bob", None).unwrap();
    let target = edit(&edit(PAPER_V1, "Good.", "Good enough."), "$a  +  b$", "$a + b$");
    repo.commit("main", &target, "alice's edits", "alice", None).unwrap();

    let mr = repo
        .open_merge_request("review", "main", "Review pass", "bob")
        .unwrap();
    let keys: Vec<String> = repo
        .conflicts(&mr.id)
        .unwrap()
        .into_iter()
        .map(|c| c.section_key)
        .collect();
    assert_eq!(keys, vec!["2.1:Setup", "3:Results"]);

    // Resolutions persist across reopen.
    drop(repo);
    let repo = ws.open();
    repo.resolve_conflict(&mr.id, "2.1:Setup", Resolution::Left, "alice")
        .unwrap();
    repo.resolve_conflict(&mr.id, "3:Results", Resolution::Both, "alice")
        .unwrap();

    let commit = repo.apply_merge_request(&mr.id, "alice").unwrap();
    assert_eq!(
        commit.content,
        "\\section{Introduction}\nWe study $a + b$.\n\n\
         \\section{Method}\n\n\n\
         \\subsection{Setup}\nRun it twice.\n\n\
         \\section{Results}\n% >>>>>> SOURCE\nVery good.\n% ======\nGood enough.\n% <<<<<< TARGET"
    );

    let sections = parse_sections(&repo.head_content("main").unwrap());
    let keys: Vec<&str> = sections.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, vec!["1:Introduction", "2:Method", "2.1:Setup", "3:Results"]);

    let mr = repo.get_merge_request(&mr.id).unwrap();
    assert_eq!(mr.status, MergeRequestStatus::Merged);
    assert_eq!(
        repo.list_merge_requests(Some(MergeRequestStatus::Open))
            .unwrap()
            .len(),
        0
    );
}

#[test]
fn concurrent_writer_loses_compare_and_swap() {
    let ws = Workspace::new();
    let first = ws.open();
    let second = ws.open();
    first.create_branch("main", None, "alice").unwrap();

    let head = first.get_branch("main").unwrap().head_commit_id;
    first
        .commit("main", "\\section{A}\none", "a", "alice", Some(&head))
        .unwrap();
    let err = second
        .commit("main", "\\section{A}\ntwo", "b", "bob", Some(&head))
        .unwrap_err();
    assert!(matches!(err, RepositoryError::StaleHead { .. }));
    assert_eq!(second.head_content("main").unwrap(), "\\section{A}\none");
}

#[test]
fn apply_after_target_moves_requires_refresh() {
    let ws = Workspace::new();
    let repo = ws.open();
    repo.create_branch("main", None, "alice").unwrap();
    repo.commit("main", PAPER_V1, "v1", "alice", None).unwrap();
    repo.create_branch("review", Some("main"), "bob").unwrap();
    repo.commit("review", &edit(PAPER_V1, "Good.", "Great."), "s", "bob", None)
        .unwrap();

    let mr = repo.open_merge_request("review", "main", "Results", "bob").unwrap();
    assert_eq!(repo.conflicts(&mr.id).unwrap().len(), 1);

    repo.commit("main", &edit(PAPER_V1, "Good.", "Fine."), "t", "alice", None)
        .unwrap();
    let err = repo.apply_merge_request(&mr.id, "alice").unwrap_err();
    assert!(matches!(err, RepositoryError::StaleMergeRequest(_)));

    repo.refresh_merge_request(&mr.id).unwrap();
    repo.resolve_conflict(&mr.id, "3:Results", Resolution::Left, "alice")
        .unwrap();
    let commit = repo.apply_merge_request(&mr.id, "alice").unwrap();
    assert!(commit.content.ends_with("\\section{Results}\nGreat."));
}

#[test]
fn apply_after_source_moves_requires_refresh() {
    let ws = Workspace::new();
    let repo = ws.open();
    repo.create_branch("main", None, "alice").unwrap();
    repo.commit("main", PAPER_V1, "v1", "alice", None).unwrap();
    repo.create_branch("review", Some("main"), "bob").unwrap();
    repo.commit("review", &edit(PAPER_V1, "Good.", "Great."), "s", "bob", None)
        .unwrap();

    let mr = repo.open_merge_request("review", "main", "Results", "bob").unwrap();
    repo.resolve_conflict(&mr.id, "3:Results", Resolution::Left, "alice")
        .unwrap();

    // Bob keeps editing from another process after the request was opened.
    let other = Repository::open_store(&ws.config.store.data_dir).unwrap();
    other
        .commit("review", &edit(PAPER_V1, "Good.", "Greater."), "s2", "bob", None)
        .unwrap();

    let err = repo.apply_merge_request(&mr.id, "alice").unwrap_err();
    assert!(matches!(err, RepositoryError::StaleMergeRequest(_)));
    assert_eq!(repo.head_content("main").unwrap(), PAPER_V1);
    assert_eq!(
        repo.get_merge_request(&mr.id).unwrap().status,
        MergeRequestStatus::Open
    );

    repo.refresh_merge_request(&mr.id).unwrap();
    let conflicts = repo.conflicts(&mr.id).unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].source_content, "Greater.");
    assert!(conflicts[0].resolution.is_none());

    repo.resolve_conflict(&mr.id, "3:Results", Resolution::Left, "alice")
        .unwrap();
    let commit = repo.apply_merge_request(&mr.id, "alice").unwrap();
    assert!(commit.content.ends_with("\\section{Results}\nGreater."));
}

#[test]
fn close_from_another_handle_blocks_apply() {
    let ws = Workspace::new();
    let repo = ws.open();
    repo.create_branch("main", None, "alice").unwrap();
    repo.commit("main", PAPER_V1, "v1", "alice", None).unwrap();
    repo.create_branch("review", Some("main"), "bob").unwrap();
    repo.commit("review", &edit(PAPER_V1, "Good.", "Great."), "s", "bob", None)
        .unwrap();
    let mr = repo.open_merge_request("review", "main", "Results", "bob").unwrap();

    let other = Repository::open_store(&ws.config.store.data_dir).unwrap();
    other.close_merge_request(&mr.id, "bob").unwrap();

    let err = repo.apply_merge_request(&mr.id, "alice").unwrap_err();
    assert!(matches!(err, RepositoryError::MergeRequestNotOpen { .. }));
    assert_eq!(repo.head_content("main").unwrap(), PAPER_V1);
    assert_eq!(
        repo.get_merge_request(&mr.id).unwrap().status,
        MergeRequestStatus::Closed
    );
}
