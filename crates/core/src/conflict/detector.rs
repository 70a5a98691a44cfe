//! Conflict classification.
//!
//! In a plain two-way comparison a modified section is informational. In a
//! three-way comparison every modified key is a conflict: the same section
//! was changed differently on both sides. The two call sites stay separate
//! even though both currently reduce to the modified set.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diff::{diff_sections, ModifiedSection};
use crate::section::Section;

/// A section key whose content diverged between the two merge sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionConflict {
    pub key: String,
    /// The source ("left") side.
    pub left: Section,
    /// The target ("right") side.
    pub right: Section,
}

impl From<ModifiedSection> for SectionConflict {
    fn from(pair: ModifiedSection) -> Self {
        Self {
            key: pair.right.key.clone(),
            left: pair.left,
            right: pair.right,
        }
    }
}

/// Stateless classifier promoting modified keys to conflicts.
pub struct ConflictClassifier;

impl ConflictClassifier {
    /// Conflict candidates of a two-way diff: every modified pair.
    pub fn candidates(modified: &[ModifiedSection]) -> Vec<ModifiedSection> {
        modified.to_vec()
    }

    /// Conflicts of a three-way comparison.
    ///
    /// `base` is accepted so a base-aware comparison (left vs base and right
    /// vs base) can distinguish one-sided edits later; it does not influence
    /// the result today.
    pub fn three_way(base: &str, left: &str, right: &str) -> Vec<SectionConflict> {
        debug!(base_len = base.len(), "base revision not consulted for classification");
        let diff = diff_sections(left, right);
        let conflicts: Vec<SectionConflict> = diff
            .modified
            .into_iter()
            .map(SectionConflict::from)
            .collect();
        info!(count = conflicts.len(), "three-way conflict classification complete");
        conflicts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_conflicts_when_identical() {
        let doc = "\\section{A}\nsame";
        assert!(ConflictClassifier::three_way(doc, doc, doc).is_empty());
    }

    #[test]
    fn test_modified_key_is_conflict() {
        let conflicts = ConflictClassifier::three_way(
            "\\section{A}\nbase",
            "\\section{A}\nleft edit",
            "\\section{A}\nright edit",
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].key, "1:A");
        assert_eq!(conflicts[0].left.content, "left edit");
        assert_eq!(conflicts[0].right.content, "right edit");
    }

    #[test]
    fn test_one_sided_additions_are_not_conflicts() {
        let conflicts = ConflictClassifier::three_way(
            "\\section{A}\nx",
            "\\section{A}\nx\n\\section{B}\nonly left",
            "\\section{A}\nx",
        );
        assert!(conflicts.is_empty());
    }

    #[test]
    fn test_base_does_not_change_result() {
        let left = "\\section{A}\nleft";
        let right = "\\section{A}\nright";
        assert_eq!(
            ConflictClassifier::three_way("", left, right),
            ConflictClassifier::three_way("\\section{A}\nleft", left, right)
        );
    }

    #[test]
    fn test_candidates_mirror_modified() {
        let diff = diff_sections(
            "\\section{A}\n1\n\\section{B}\n2",
            "\\section{A}\n9\n\\section{B}\n2",
        );
        let candidates = ConflictClassifier::candidates(&diff.modified);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].key(), "1:A");
    }
}
