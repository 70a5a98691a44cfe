//! Section-level three-way merge engine.
//!
//! Both sides are parsed independently and the union of their section keys
//! is written back in outline order. Keys present on one side only are
//! carried over as-is; keys present on both sides take the side named in the
//! [`ResolutionMap`] (right when absent), or both sides wrapped in conflict
//! markers for [`Resolution::Both`].

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::resolver::{Resolution, ResolutionMap};
use crate::section::{parse_sections, Section};

/// Opens a keep-both block; the left (source) content follows.
pub const MARKER_SOURCE: &str = "% >>>>>> SOURCE";
/// Separates left content from right content.
pub const MARKER_SEPARATOR: &str = "% ======";
/// Closes a keep-both block after the right (target) content.
pub const MARKER_TARGET: &str = "% <<<<<< TARGET";

/// The merged document plus where each section came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// The reconstructed document.
    pub merged_content: String,
    /// Keys written with conflict markers.
    pub conflict_keys: Vec<String>,
    /// Keys whose section was taken from the left side.
    pub from_left: Vec<String>,
    /// Keys whose section was taken from the right side.
    pub from_right: Vec<String>,
}

impl MergeOutcome {
    /// Whether the output contains conflict marker blocks.
    pub fn has_conflicts(&self) -> bool {
        !self.conflict_keys.is_empty()
    }
}

/// Stateless section merge engine.
pub struct ThreeWayMerger;

impl ThreeWayMerger {
    /// Merge `left` and `right` into one document.
    ///
    /// `base` does not affect the output; content selection uses only the
    /// two sides and `resolutions`.
    pub fn merge_detailed(
        base: &str,
        left: &str,
        right: &str,
        resolutions: &ResolutionMap,
    ) -> MergeOutcome {
        info!(
            base_len = base.len(),
            resolutions = resolutions.len(),
            "performing section merge"
        );

        let left_sections = parse_sections(left);
        let right_sections = parse_sections(right);
        let left_by_key: HashMap<&str, &Section> =
            left_sections.iter().map(|s| (s.key.as_str(), s)).collect();
        let right_by_key: HashMap<&str, &Section> =
            right_sections.iter().map(|s| (s.key.as_str(), s)).collect();

        let mut keys: Vec<&str> = left_sections.iter().map(|s| s.key.as_str()).collect();
        keys.extend(
            right_sections
                .iter()
                .map(|s| s.key.as_str())
                .filter(|k| !left_by_key.contains_key(k)),
        );
        sort_by_leading_numeral(&mut keys);

        let mut outcome = MergeOutcome::default();
        let mut blocks = Vec::with_capacity(keys.len());

        for key in keys {
            match (left_by_key.get(key), right_by_key.get(key)) {
                (Some(&l), None) => {
                    blocks.push(section_block(l));
                    outcome.from_left.push(key.to_string());
                }
                (None, Some(&r)) => {
                    blocks.push(section_block(r));
                    outcome.from_right.push(key.to_string());
                }
                (Some(&l), Some(&r)) => match resolution_for(resolutions, key) {
                    Resolution::Left => {
                        blocks.push(section_block(l));
                        outcome.from_left.push(key.to_string());
                    }
                    Resolution::Right => {
                        blocks.push(section_block(r));
                        outcome.from_right.push(key.to_string());
                    }
                    Resolution::Both => {
                        debug!(key, "keeping both sides with conflict markers");
                        blocks.push(conflict_block(l, r));
                        outcome.conflict_keys.push(key.to_string());
                    }
                },
                (None, None) => {}
            }
        }

        outcome.merged_content = blocks.join("\n\n");
        let sections =
            outcome.from_left.len() + outcome.from_right.len() + outcome.conflict_keys.len();
        info!(
            sections,
            conflicts = outcome.conflict_keys.len(),
            "section merge complete"
        );
        outcome
    }

    /// Merge and return only the document text.
    pub fn merge(base: &str, left: &str, right: &str, resolutions: &ResolutionMap) -> String {
        Self::merge_detailed(base, left, right, resolutions).merged_content
    }
}

/// Three-way section merge returning the merged document text.
pub fn merge_latex(base: &str, left: &str, right: &str, resolutions: &ResolutionMap) -> String {
    ThreeWayMerger::merge(base, left, right, resolutions)
}

/// The resolution for `key`, defaulting to the right side.
pub fn resolution_for(resolutions: &ResolutionMap, key: &str) -> Resolution {
    resolutions.get(key).copied().unwrap_or_default()
}

fn section_block(section: &Section) -> String {
    format!("{}\n{}", section.heading(), section.content)
}

/// The right heading followed by both bodies between the conflict markers.
fn conflict_block(left: &Section, right: &Section) -> String {
    [
        right.heading().as_str(),
        MARKER_SOURCE,
        left.content.as_str(),
        MARKER_SEPARATOR,
        right.content.as_str(),
        MARKER_TARGET,
    ]
    .join("\n")
}

/// Stable sort on the number the key starts with.
///
/// The numeral path is read as a single decimal number, so `1.10` sorts
/// together with `1.1` and before `1.2`. Documents with ten or more
/// subsections under one section therefore merge out of outline order.
fn sort_by_leading_numeral(keys: &mut [&str]) {
    keys.sort_by(|a, b| {
        leading_number(a)
            .partial_cmp(&leading_number(b))
            .unwrap_or(Ordering::Equal)
    });
}

/// Parse the longest `digits[.digits]` prefix of `key`; NaN when absent.
fn leading_number(key: &str) -> f64 {
    let bytes = key.as_bytes();
    let mut end = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if bytes.get(end) == Some(&b'.') {
        let fraction = bytes[end + 1..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if fraction > 0 {
            end += 1 + fraction;
        }
    }
    key[..end].parse().unwrap_or(f64::NAN)
}
