//! texmerge core library.
//!
//! This crate provides section-addressable comparison and merging of LaTeX
//! documents: math-whitespace normalization, section parsing and outlines,
//! section diffs, conflict classification and three-way merging. Around that
//! engine it keeps a small version-control store (branches, commits, merge
//! requests) in SQLite, plus configuration and error types.

pub mod config;
pub mod conflict;
pub mod db;
pub mod diff;
pub mod errors;
pub mod models;
pub mod normalize;
pub mod repository;
pub mod section;

// Re-exports for convenience.
pub use config::AppConfig;
pub use conflict::{
    merge_latex, ConflictClassifier, MergeOutcome, Resolution, ResolutionMap, SectionConflict,
    ThreeWayMerger,
};
pub use db::Database;
pub use diff::{diff_sections, SectionDiffResult};
pub use normalize::normalize_math_whitespace;
pub use repository::Repository;
pub use section::{build_outline_tree, parse_sections, OutlineNode, Section, SectionLevel};
