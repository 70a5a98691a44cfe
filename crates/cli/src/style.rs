//! Shared styling utilities for CLI output.

use console::Style;

use texmerge_core::models::{ConflictRecord, MergeRequestStatus};

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold, white).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Merge-request status label: open (green), merged (blue), closed (dim).
pub fn status(status: MergeRequestStatus) -> String {
    let style = match status {
        MergeRequestStatus::Open => Style::new().green().bold(),
        MergeRequestStatus::Merged => Style::new().blue().bold(),
        MergeRequestStatus::Closed => Style::new().dim(),
    };
    style.apply_to(status.to_string()).to_string()
}

/// The side a conflict will take on apply; yellow while it is only the
/// default.
pub fn resolution(conflict: &ConflictRecord) -> String {
    let side = conflict.effective_resolution();
    match conflict.resolution {
        Some(_) => Style::new().cyan().apply_to(side.to_string()).to_string(),
        None => Style::new()
            .yellow()
            .apply_to(format!("{} (unresolved)", side))
            .to_string(),
    }
}
