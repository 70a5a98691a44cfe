//! Section-level comparison of two document revisions.
//!
//! Sections are matched by key, never by position. Content is compared after
//! math-whitespace normalization and trimming, so spacing-only edits inside
//! math or at the edges of a section body never count as modifications.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conflict::ConflictClassifier;
use crate::normalize::normalize_math_whitespace;
use crate::section::{parse_sections, Section};

/// A key present on both sides with differing normalized content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedSection {
    pub left: Section,
    pub right: Section,
}

impl ModifiedSection {
    pub fn key(&self) -> &str {
        &self.right.key
    }
}

/// Classification of every key of a left/right comparison.
///
/// Each key present on either side lands in exactly one of `added`,
/// `removed`, `modified` or `unchanged`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDiffResult {
    /// Right-only sections, in right order.
    pub added: Vec<Section>,
    /// Left-only sections, in left order.
    pub removed: Vec<Section>,
    /// `(left, right)` pairs, in right order.
    pub modified: Vec<ModifiedSection>,
    /// Right-side sections whose content matches the left, in right order.
    pub unchanged: Vec<Section>,
    /// Keys whose position differs between sides. Only computed when both
    /// sides have the same number of sections.
    pub reordered: Vec<String>,
    /// Conflict candidates for three-way use.
    pub conflicts: Vec<ModifiedSection>,
}

/// Per-class counts of a [`SectionDiffResult`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub reordered: usize,
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} modified, {} unchanged, {} reordered",
            self.added, self.removed, self.modified, self.unchanged, self.reordered
        )
    }
}

impl SectionDiffResult {
    /// True when nothing was added, removed, modified or moved.
    pub fn is_identical(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
            && self.reordered.is_empty()
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            added: self.added.len(),
            removed: self.removed.len(),
            modified: self.modified.len(),
            unchanged: self.unchanged.len(),
            reordered: self.reordered.len(),
        }
    }
}

/// Parse both sources and compare their sections.
pub fn diff_sections(left_source: &str, right_source: &str) -> SectionDiffResult {
    compare_sections(&parse_sections(left_source), &parse_sections(right_source))
}

/// Compare two already-parsed section lists.
pub fn compare_sections(left: &[Section], right: &[Section]) -> SectionDiffResult {
    let left_by_key: HashMap<&str, &Section> =
        left.iter().map(|s| (s.key.as_str(), s)).collect();
    let right_by_key: HashMap<&str, &Section> =
        right.iter().map(|s| (s.key.as_str(), s)).collect();

    let mut result = SectionDiffResult::default();

    for section in right {
        match left_by_key.get(section.key.as_str()) {
            None => result.added.push(section.clone()),
            Some(&old) if same_content(&old.content, &section.content) => {
                result.unchanged.push(section.clone());
            }
            Some(&old) => result.modified.push(ModifiedSection {
                left: old.clone(),
                right: section.clone(),
            }),
        }
    }

    result.removed = left
        .iter()
        .filter(|s| !right_by_key.contains_key(s.key.as_str()))
        .cloned()
        .collect();

    if left.len() == right.len() {
        let right_pos: HashMap<&str, usize> = right
            .iter()
            .enumerate()
            .map(|(i, s)| (s.key.as_str(), i))
            .collect();
        result.reordered = left
            .iter()
            .enumerate()
            .filter(|(i, s)| right_pos.get(s.key.as_str()).is_some_and(|j| j != i))
            .map(|(_, s)| s.key.clone())
            .collect();
    }

    result.conflicts = ConflictClassifier::candidates(&result.modified);

    debug!(summary = %result.summary(), "compared sections");
    result
}

/// Content equality used by the differ: normalized, then trimmed.
pub fn same_content(left: &str, right: &str) -> bool {
    normalize_math_whitespace(left).trim() == normalize_math_whitespace(right).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(sections: &[Section]) -> Vec<&str> {
        sections.iter().map(|s| s.key.as_str()).collect()
    }

    #[test]
    fn test_identical_sources() {
        let source = "\\section{A}\none\n\\subsection{B}\ntwo";
        let diff = diff_sections(source, source);
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert!(diff.modified.is_empty());
        assert!(diff.reordered.is_empty());
        assert_eq!(keys(&diff.unchanged), vec!["1:A", "1.1:B"]);
        assert!(diff.is_identical());
    }

    #[test]
    fn test_added_section() {
        let diff = diff_sections(
            "\\section{Intro}\nHello.",
            "\\section{Intro}\nHello.\n\\section{Methods}\nNew.",
        );
        assert_eq!(keys(&diff.added), vec!["2:Methods"]);
        assert!(diff.removed.is_empty());
        assert_eq!(keys(&diff.unchanged), vec!["1:Intro"]);
    }

    #[test]
    fn test_removed_section() {
        let diff = diff_sections("\\section{A}\nx\n\\section{B}\ny", "\\section{A}\nx");
        assert_eq!(keys(&diff.removed), vec!["2:B"]);
        assert!(diff.added.is_empty());
    }

    #[test]
    fn test_math_spacing_is_unchanged() {
        let diff = diff_sections(
            "\\section{Intro}\nLet $a+b  = c$ hold.",
            "\\section{Intro}\nLet $a+b = c$ hold.",
        );
        assert!(diff.modified.is_empty());
        assert_eq!(diff.unchanged.len(), 1);
    }

    #[test]
    fn test_edge_whitespace_is_unchanged() {
        let diff = diff_sections("\\section{A}\ntext\n\n", "\\section{A}\n  text");
        assert!(diff.modified.is_empty());
    }

    #[test]
    fn test_modified_pairs_are_left_then_right() {
        let diff = diff_sections("\\section{A}\nold", "\\section{A}\nnew");
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].left.content, "old");
        assert_eq!(diff.modified[0].right.content, "new");
        assert_eq!(diff.modified[0].key(), "1:A");
        assert_eq!(diff.conflicts, diff.modified);
    }

    #[test]
    fn test_swap_sides_swaps_added_and_removed() {
        let left = "\\section{A}\nx\n\\section{B}\ny";
        let right = "\\section{A}\nx";
        let forward = diff_sections(left, right);
        let backward = diff_sections(right, left);
        assert_eq!(keys(&forward.removed), keys(&backward.added));
        assert_eq!(keys(&forward.unchanged), keys(&backward.unchanged));
    }

    #[test]
    fn test_title_change_is_add_and_remove() {
        let diff = diff_sections("\\section{Old}\nx", "\\section{New}\nx");
        assert_eq!(keys(&diff.added), vec!["1:New"]);
        assert_eq!(keys(&diff.removed), vec!["1:Old"]);
        assert!(diff.reordered.is_empty());
    }

    #[test]
    fn test_reordered_keys_with_equal_counts() {
        let left = vec![section("1:A", "a"), section("2:B", "b"), section("3:C", "c")];
        let right = vec![section("2:B", "b"), section("1:A", "a"), section("3:C", "c")];
        let diff = compare_sections(&left, &right);
        assert_eq!(diff.reordered, vec!["1:A".to_string(), "2:B".to_string()]);
        assert_eq!(diff.unchanged.len(), 3);
        assert!(!diff.is_identical());
    }

    #[test]
    fn test_reorder_skipped_when_counts_differ() {
        let left = vec![section("1:A", "a"), section("2:B", "b")];
        let right = vec![section("2:B", "b"), section("1:A", "a"), section("3:C", "c")];
        assert!(compare_sections(&left, &right).reordered.is_empty());
    }

    #[test]
    fn test_summary_display() {
        let diff = diff_sections("\\section{A}\nx", "\\section{A}\ny\n\\section{B}\nz");
        assert_eq!(
            diff.summary().to_string(),
            "1 added, 0 removed, 1 modified, 0 unchanged, 0 reordered"
        );
    }

    fn section(key: &str, content: &str) -> Section {
        let (_, title) = key.split_once(':').unwrap();
        Section {
            key: key.to_string(),
            title: title.to_string(),
            level: crate::section::SectionLevel::Section,
            content: content.to_string(),
            line_start: 1,
            line_end: 1,
        }
    }
}
