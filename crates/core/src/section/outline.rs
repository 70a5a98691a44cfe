//! Outline tree built from a flat, level-tagged section list.
//!
//! Nesting comes from the level sequence alone, so any document-ordered list
//! of sections works, whether or not it came from [`super::parse_sections`].

use serde::{Deserialize, Serialize};

use super::{Section, SectionLevel};

/// A navigation node: one section plus the sections nested under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineNode {
    pub key: String,
    pub title: String,
    pub level: SectionLevel,
    pub line_start: usize,
    pub line_end: usize,
    /// Nested sections, in document order.
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    fn leaf(section: &Section) -> Self {
        Self {
            key: section.key.clone(),
            title: section.title.clone(),
            level: section.level,
            line_start: section.line_start,
            line_end: section.line_end,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(OutlineNode::node_count).sum::<usize>()
    }
}

/// Reshape `sections` into a forest; roots are returned in document order.
pub fn build_outline_tree(sections: &[Section]) -> Vec<OutlineNode> {
    let mut roots = Vec::new();
    // Open ancestors, innermost last. A node is attached to its parent only
    // once it is closed, so its own children are complete by then.
    let mut open: Vec<OutlineNode> = Vec::new();

    for section in sections {
        while open.last().is_some_and(|top| top.level >= section.level) {
            close_top(&mut open, &mut roots);
        }
        open.push(OutlineNode::leaf(section));
    }
    while !open.is_empty() {
        close_top(&mut open, &mut roots);
    }

    roots
}

fn close_top(open: &mut Vec<OutlineNode>, roots: &mut Vec<OutlineNode>) {
    let Some(node) = open.pop() else {
        return;
    };
    match open.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}
