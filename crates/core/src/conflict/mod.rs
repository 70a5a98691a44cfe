//! Conflict classification, three-way section merging, and resolution.
//!
//! The conflict subsystem is responsible for:
//! 1. **Classification** -- promoting sections changed on both sides to conflicts.
//! 2. **Merging** -- rebuilding one document from two sides and per-key choices.
//! 3. **Resolution** -- recording those per-key choices for a merge request.

pub mod detector;
pub mod merger;
pub mod resolver;

pub use detector::{ConflictClassifier, SectionConflict};
pub use merger::{merge_latex, MergeOutcome, ThreeWayMerger};
pub use resolver::{ConflictResolver, Resolution, ResolutionMap};
