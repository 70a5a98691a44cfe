//! Subcommands over the branch / commit / merge-request store.

use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use texmerge_core::errors::RepositoryError;
use texmerge_core::models::{short_id, MergeRequestStatus};
use texmerge_core::{Repository, Resolution};

use crate::style;

const PREVIEW_LIMIT: usize = 400;

// ---------------------------------------------------------------------------
// Branches and commits
// ---------------------------------------------------------------------------

pub fn cmd_branch_create(
    repo: &Repository,
    name: &str,
    from: Option<&str>,
    author: &str,
) -> Result<()> {
    let branch = repo
        .create_branch(name, from, author)
        .context("failed to create branch")?;
    println!(
        "{}",
        style::success(&format!(
            "Created branch '{}' at {}",
            branch.name,
            short_id(&branch.head_commit_id)
        ))
    );
    Ok(())
}

pub fn cmd_branch_list(repo: &Repository) -> Result<()> {
    let branches = repo.list_branches().context("failed to list branches")?;
    if branches.is_empty() {
        println!("No branches yet. Run `texmerge init` first.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Name", "Head", "Created"]);
    for b in &branches {
        table.add_row(vec![
            Cell::new(&b.name),
            Cell::new(short_id(&b.head_commit_id)),
            Cell::new(b.created_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    println!("{}", table);
    Ok(())
}

pub fn cmd_commit(
    repo: &Repository,
    branch: &str,
    file: &Path,
    message: &str,
    author: &str,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let commit = repo
        .commit(branch, &content, message, author, None)
        .context("failed to commit")?;
    println!(
        "{}",
        style::success(&format!("[{} {}] {}", branch, commit.short_id(), commit.message))
    );
    Ok(())
}

pub fn cmd_log(repo: &Repository, branch: &str, limit: usize) -> Result<()> {
    let commits = repo.history(branch, limit).context("failed to read history")?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Commit", "Author", "Date", "Message"]);
    for c in &commits {
        table.add_row(vec![
            Cell::new(c.short_id()),
            Cell::new(&c.author),
            Cell::new(c.created_at.format("%Y-%m-%d %H:%M")),
            Cell::new(&c.message),
        ]);
    }
    println!("{}", style::header(&format!("History of '{}'", branch)));
    println!("{}", table);
    Ok(())
}

pub fn cmd_show(repo: &Repository, branch: &str) -> Result<()> {
    let content = repo.head_content(branch).context("failed to read branch head")?;
    print!("{}", content);
    Ok(())
}

// ---------------------------------------------------------------------------
// Merge requests
// ---------------------------------------------------------------------------

pub fn cmd_mr_open(
    repo: &Repository,
    source: &str,
    target: &str,
    title: &str,
    author: &str,
) -> Result<()> {
    let mr = repo
        .open_merge_request(source, target, title, author)
        .context("failed to open merge request")?;
    let conflicts = repo.conflicts(&mr.id)?;
    println!(
        "{}",
        style::success(&format!("Opened merge request {} ({} -> {})", mr.id, source, target))
    );
    if conflicts.is_empty() {
        println!("No conflicting sections.");
    } else {
        println!(
            "{}",
            style::warn(&format!(
                "{} conflicting section(s); unresolved ones will take '{}'",
                conflicts.len(),
                target
            ))
        );
    }
    Ok(())
}

pub fn cmd_mr_list(repo: &Repository, status: Option<&str>) -> Result<()> {
    let status = status
        .map(|s| {
            MergeRequestStatus::from_str_val(s).ok_or_else(|| {
                anyhow::anyhow!("invalid status '{}': use open, merged or closed", s)
            })
        })
        .transpose()?;
    let requests = repo
        .list_merge_requests(status)
        .context("failed to list merge requests")?;

    if requests.is_empty() {
        println!("No merge requests found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ID", "Status", "Title", "Author", "Created"]);
    for mr in &requests {
        table.add_row(vec![
            Cell::new(&mr.id),
            Cell::new(style::status(mr.status)),
            Cell::new(&mr.title),
            Cell::new(&mr.author),
            Cell::new(mr.created_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    println!("{}", table);
    Ok(())
}

pub fn cmd_mr_show(repo: &Repository, id: &str) -> Result<()> {
    let mr = repo.get_merge_request(id).context("failed to load merge request")?;
    let conflicts = repo.conflicts(id)?;

    println!("{}", style::header(&format!("Merge request: {}", mr.title)));
    println!();
    println!("  ID          : {}", mr.id);
    println!("  Status      : {}", style::status(mr.status));
    println!("  Author      : {}", mr.author);
    println!("  Base        : {}", short_id(&mr.base_commit_id));
    println!("  Source head : {}", short_id(&mr.source_head));
    println!("  Target head : {}", short_id(&mr.target_head));
    if let Some(ref commit) = mr.merge_commit_id {
        println!("  Merged as   : {}", short_id(commit));
    }
    println!();

    if conflicts.is_empty() {
        println!("{}", style::success("No conflicting sections"));
        return Ok(());
    }

    for c in &conflicts {
        println!(
            "{} {}{}",
            style::header(&c.section_key),
            style::resolution(c),
            c.resolved_by
                .as_deref()
                .map(|by| style::dim(&format!(" by {}", by)))
                .unwrap_or_default()
        );
        println!("{}", style::dim("  source:"));
        println!("{}", indent(&preview(&c.source_content)));
        println!("{}", style::dim("  target:"));
        println!("{}", indent(&preview(&c.target_content)));
        println!();
    }
    Ok(())
}

pub fn cmd_mr_resolve(
    repo: &Repository,
    id: &str,
    key: &str,
    accept: &str,
    author: &str,
) -> Result<()> {
    let resolution: Resolution = accept.parse()?;
    repo.resolve_conflict(id, key, resolution, author)
        .context("failed to resolve conflict")?;
    println!(
        "{}",
        style::success(&format!("Section {} resolved (accepted {})", key, resolution))
    );
    Ok(())
}

pub fn cmd_mr_refresh(repo: &Repository, id: &str) -> Result<()> {
    let mr = repo
        .refresh_merge_request(id)
        .context("failed to refresh merge request")?;
    let conflicts = repo.conflicts(&mr.id)?;
    println!(
        "{}",
        style::success(&format!(
            "Refreshed {}: {} conflicting section(s), previous resolutions cleared",
            mr.id,
            conflicts.len()
        ))
    );
    Ok(())
}

pub fn cmd_mr_apply(repo: &Repository, id: &str, author: &str) -> Result<()> {
    match repo.apply_merge_request(id, author) {
        Ok(commit) => {
            println!(
                "{}",
                style::success(&format!("Merged {} as commit {}", id, commit.short_id()))
            );
            Ok(())
        }
        Err(e @ RepositoryError::StaleMergeRequest(_)) => {
            println!("{}", style::error("A branch moved since the conflicts were computed"));
            println!("Run `texmerge mr refresh {}` and review the conflicts again.", id);
            Err(e).context("failed to apply merge request")
        }
        Err(e) => Err(e).context("failed to apply merge request"),
    }
}

pub fn cmd_mr_close(repo: &Repository, id: &str, author: &str) -> Result<()> {
    let mr = repo
        .close_merge_request(id, author)
        .context("failed to close merge request")?;
    println!("{}", style::success(&format!("Closed merge request {}", mr.id)));
    Ok(())
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

pub fn cmd_audit(repo: &Repository, limit: u32) -> Result<()> {
    let entries = repo
        .db()
        .list_audit_log(limit)
        .context("failed to list audit entries")?;

    if entries.is_empty() {
        println!("No audit log entries found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Timestamp", "Action", "Actor", "Details"]);
    for entry in &entries {
        table.add_row(vec![
            Cell::new(entry.created_at.format("%Y-%m-%d %H:%M:%S")),
            Cell::new(&entry.action),
            Cell::new(entry.actor.as_deref().unwrap_or("-")),
            Cell::new(entry.details.as_deref().unwrap_or("")),
        ]);
    }
    println!("{}", table);
    println!("{} entries shown", entries.len());
    Ok(())
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn preview(content: &str) -> String {
    if content.len() <= PREVIEW_LIMIT {
        return content.to_string();
    }
    let mut end = PREVIEW_LIMIT;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...\n[truncated, {} bytes total]", &content[..end], content.len())
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("    {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}
