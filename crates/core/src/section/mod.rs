//! Section parsing for LaTeX sources.
//!
//! A document is split into [`Section`]s at `\section`, `\subsection` and
//! `\subsubsection` headings. Each section is addressed by a key built from
//! its outline numeral path and its title (`1.2:Background`); the numeral
//! path comes from heading nesting and sibling order alone, so it is the real
//! identity of a section across revisions.

pub mod outline;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use outline::{build_outline_tree, OutlineNode};

/// Key of the synthetic section emitted for a document without headings.
pub const SYNTHETIC_KEY: &str = "0:Document";

/// Title of the synthetic section.
pub const SYNTHETIC_TITLE: &str = "Document";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Heading depth. Serialized as its number (1, 2 or 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SectionLevel {
    /// `\section`
    Section,
    /// `\subsection`
    Subsection,
    /// `\subsubsection`
    Subsubsection,
}

impl SectionLevel {
    /// All levels, in heading match order.
    pub const ALL: [SectionLevel; 3] = [Self::Section, Self::Subsection, Self::Subsubsection];

    /// 1-based nesting depth.
    pub fn depth(self) -> usize {
        match self {
            Self::Section => 1,
            Self::Subsection => 2,
            Self::Subsubsection => 3,
        }
    }

    /// The LaTeX command name, without the backslash.
    pub fn command(self) -> &'static str {
        match self {
            Self::Section => "section",
            Self::Subsection => "subsection",
            Self::Subsubsection => "subsubsection",
        }
    }

    /// Reconstruct a heading line for `title` at this level.
    pub fn heading(self, title: &str) -> String {
        format!("\\{}{{{}}}", self.command(), title)
    }
}

impl From<SectionLevel> for u8 {
    fn from(level: SectionLevel) -> Self {
        level.depth() as u8
    }
}

impl TryFrom<u8> for SectionLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Section),
            2 => Ok(Self::Subsection),
            3 => Ok(Self::Subsubsection),
            other => Err(format!("section level must be 1, 2 or 3, got {other}")),
        }
    }
}

impl fmt::Display for SectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.depth())
    }
}

/// One addressable section of a parsed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// `<numeral path>:<title>`, unique within one parse.
    pub key: String,
    /// Heading text, trimmed.
    pub title: String,
    pub level: SectionLevel,
    /// Raw text between this heading line and the next heading line.
    pub content: String,
    /// First body line (1-based), the line after the heading.
    pub line_start: usize,
    /// Last body line (1-based). `line_start - 1` for an empty body.
    pub line_end: usize,
}

impl Section {
    /// The dotted numeral component of the key (`"1.2"` for `"1.2:Background"`).
    pub fn numeral_path(&self) -> &str {
        self.key.split_once(':').map_or(self.key.as_str(), |(path, _)| path)
    }

    /// True for the fallback section of a document with no headings.
    pub fn is_synthetic(&self) -> bool {
        self.key == SYNTHETIC_KEY
    }

    /// The heading line this section would be written back with.
    pub fn heading(&self) -> String {
        self.level.heading(&self.title)
    }
}

// ---------------------------------------------------------------------------
// Numbering state
// ---------------------------------------------------------------------------

/// Per-parse outline counters; index 0 is the `\section` counter.
#[derive(Debug, Default)]
struct Numbering {
    counters: [usize; 3],
}

impl Numbering {
    /// Advance for a heading at `level` and return its numeral path.
    fn advance(&mut self, level: SectionLevel) -> String {
        let depth = level.depth();
        self.counters[depth - 1] += 1;
        for counter in &mut self.counters[depth..] {
            *counter = 0;
        }
        self.counters[..depth]
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// A section whose body is still being accumulated.
struct PendingSection<'a> {
    key: String,
    title: String,
    level: SectionLevel,
    line_start: usize,
    lines: Vec<&'a str>,
}

impl PendingSection<'_> {
    fn finish(self) -> Section {
        Section {
            key: self.key,
            title: self.title,
            level: self.level,
            content: self.lines.join("\n"),
            line_start: self.line_start,
            line_end: self.line_start + self.lines.len() - 1,
        }
    }
}

/// Split `source` into sections in document order.
///
/// Text before the first heading is dropped. A source with no heading at all
/// yields a single synthetic [`SYNTHETIC_KEY`] section holding the whole text.
pub fn parse_sections(source: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut numbering = Numbering::default();
    let mut current: Option<PendingSection<'_>> = None;
    let mut line_count = 0;

    for (idx, line) in source.split('\n').enumerate() {
        line_count = idx + 1;
        match match_heading(line) {
            Some((level, title)) => {
                if let Some(pending) = current.take() {
                    sections.push(pending.finish());
                }
                let path = numbering.advance(level);
                current = Some(PendingSection {
                    key: format!("{path}:{title}"),
                    title,
                    level,
                    line_start: line_count + 1,
                    lines: Vec::new(),
                });
            }
            None => {
                if let Some(pending) = current.as_mut() {
                    pending.lines.push(line);
                }
            }
        }
    }

    if let Some(pending) = current.take() {
        sections.push(pending.finish());
    }

    if sections.is_empty() {
        sections.push(Section {
            key: SYNTHETIC_KEY.to_string(),
            title: SYNTHETIC_TITLE.to_string(),
            level: SectionLevel::Section,
            content: source.to_string(),
            line_start: 1,
            line_end: line_count,
        });
    }

    debug!(count = sections.len(), "parsed sections");
    sections
}

/// Test `line` against each heading form in level order; first match wins.
fn match_heading(line: &str) -> Option<(SectionLevel, String)> {
    SectionLevel::ALL
        .iter()
        .find_map(|&level| heading_title(line, level.command()).map(|title| (level, title)))
}

/// Find the first `\<command>{title}` on the line with a non-empty brace body.
fn heading_title(line: &str, command: &str) -> Option<String> {
    let opener = format!("\\{command}{{");
    line.match_indices(&opener).find_map(|(pos, _)| {
        let rest = &line[pos + opener.len()..];
        match rest.find('}') {
            Some(end) if end > 0 => Some(rest[..end].trim().to_string()),
            _ => None,
        }
    })
}

// ---------------------------------------------------------------------------
// Line-based navigation and replacement
// ---------------------------------------------------------------------------

/// The section whose heading or body covers the 1-based `line`.
pub fn section_at_line(sections: &[Section], line: usize) -> Option<&Section> {
    sections.iter().find(|s| {
        let heading_line = s.line_start.saturating_sub(1);
        heading_line <= line && line <= s.line_end.max(heading_line)
    })
}

/// Replace the body lines of `section` inside `source` with `new_content`.
///
/// The heading line and every line outside the section body are kept
/// verbatim. `section` must come from a parse of `source`.
pub fn replace_section_content(source: &str, section: &Section, new_content: &str) -> String {
    let mut lines: Vec<&str> = source.split('\n').collect();
    let start = section.line_start.saturating_sub(1).min(lines.len());
    let end = section.line_end.min(lines.len()).max(start);

    let body_was_empty = section.line_end < section.line_start;
    let replacement: Vec<&str> = if new_content.is_empty() && body_was_empty {
        Vec::new()
    } else {
        new_content.split('\n').collect()
    };

    lines.splice(start..end, replacement);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAPER: &str = "\\documentclass{article}\n\
\\begin{document}\n\
\\section{Intro}\n\
Hello.\n\
\\subsection{Background}\n\
Prior work.\n\
\\subsubsection{Details}\n\
Fine print.\n\
\\subsection{Scope}\n\
\\section{Methods}\n\
We did things.\n\
\\end{document}";

    fn keys(sections: &[Section]) -> Vec<&str> {
        sections.iter().map(|s| s.key.as_str()).collect()
    }

    #[test]
    fn test_empty_source_yields_synthetic_section() {
        let sections = parse_sections("");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].key, SYNTHETIC_KEY);
        assert_eq!(sections[0].level, SectionLevel::Section);
        assert_eq!(sections[0].content, "");
        assert!(sections[0].is_synthetic());
    }

    #[test]
    fn test_headingless_source_kept_whole() {
        let source = "just text\n$x$\n";
        let sections = parse_sections(source);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, source);
        assert_eq!(sections[0].line_start, 1);
        assert_eq!(sections[0].line_end, 3);
    }

    #[test]
    fn test_numbering_follows_nesting() {
        let sections = parse_sections(PAPER);
        assert_eq!(
            keys(&sections),
            vec![
                "1:Intro",
                "1.1:Background",
                "1.1.1:Details",
                "1.2:Scope",
                "2:Methods"
            ]
        );
        assert_eq!(sections[2].level, SectionLevel::Subsubsection);
        assert_eq!(sections[4].numeral_path(), "2");
    }

    #[test]
    fn test_preamble_dropped_and_content_raw() {
        let sections = parse_sections(PAPER);
        assert_eq!(sections[0].content, "Hello.");
        assert_eq!(sections[4].content, "We did things.\n\\end{document}");
        assert!(sections.iter().all(|s| !s.content.contains("documentclass")));
    }

    #[test]
    fn test_line_bounds() {
        let sections = parse_sections(PAPER);
        // \section{Intro} is line 3, its body is line 4.
        assert_eq!((sections[0].line_start, sections[0].line_end), (4, 4));
        // \subsection{Scope} on line 9 has an empty body.
        assert_eq!((sections[3].line_start, sections[3].line_end), (10, 9));
        assert_eq!(sections[3].content, "");
        assert_eq!((sections[4].line_start, sections[4].line_end), (11, 12));
    }

    #[test]
    fn test_title_trimmed_and_heading_anywhere_on_line() {
        let sections = parse_sections("  \\section{  Spaced Title } % note\nbody");
        assert_eq!(sections[0].key, "1:Spaced Title");
        assert_eq!(sections[0].title, "Spaced Title");
    }

    #[test]
    fn test_empty_braces_are_not_a_heading() {
        let sections = parse_sections("\\section{}\ntext");
        assert_eq!(sections.len(), 1);
        assert!(sections[0].is_synthetic());
    }

    #[test]
    fn test_section_preferred_over_subsection_on_same_line() {
        let sections = parse_sections("\\subsection{B} \\section{A}\nx");
        assert_eq!(sections[0].key, "1:A");
        assert_eq!(sections[0].level, SectionLevel::Section);
    }

    #[test]
    fn test_counters_reset_below_new_heading() {
        let source = concat!(
            "\\section{A}\n\\subsection{A1}\n\\subsection{A2}\n",
            "\\section{B}\n\\subsection{B1}",
        );
        assert_eq!(
            keys(&parse_sections(source)),
            vec!["1:A", "1.1:A1", "1.2:A2", "2:B", "2.1:B1"]
        );
    }

    #[test]
    fn test_subsection_before_any_section() {
        let sections = parse_sections("\\subsection{Orphan}\ntext");
        assert_eq!(sections[0].key, "0.1:Orphan");
    }

    #[test]
    fn test_level_serializes_as_number() {
        let sections = parse_sections("\\subsection{X}\ny");
        let json = serde_json::to_value(&sections[0]).unwrap();
        assert_eq!(json["level"], 2);
        assert_eq!(json["lineStart"], 2);
        let back: Section = serde_json::from_value(json).unwrap();
        assert_eq!(back, sections[0]);
    }

    #[test]
    fn test_heading_reconstruction() {
        assert_eq!(SectionLevel::Subsection.heading("Data"), "\\subsection{Data}");
        assert!(SectionLevel::try_from(4).is_err());
    }

    #[test]
    fn test_section_at_line() {
        let sections = parse_sections(PAPER);
        assert_eq!(section_at_line(&sections, 3).unwrap().key, "1:Intro");
        assert_eq!(section_at_line(&sections, 6).unwrap().key, "1.1:Background");
        assert_eq!(section_at_line(&sections, 9).unwrap().key, "1.2:Scope");
        assert_eq!(section_at_line(&sections, 12).unwrap().key, "2:Methods");
        assert!(section_at_line(&sections, 1).is_none());
        assert!(section_at_line(&sections, 40).is_none());
    }

    #[test]
    fn test_replace_section_content() {
        let sections = parse_sections(PAPER);
        let updated = replace_section_content(PAPER, &sections[1], "New work.\nMore.");
        let reparsed = parse_sections(&updated);
        assert_eq!(reparsed[1].content, "New work.\nMore.");
        assert_eq!(reparsed[0].content, "Hello.");
        assert_eq!(reparsed[2].content, "Fine print.");
        assert_eq!(reparsed.len(), sections.len());
    }

    #[test]
    fn test_replace_empty_body() {
        let sections = parse_sections(PAPER);
        let updated = replace_section_content(PAPER, &sections[3], "Filled in.");
        assert_eq!(parse_sections(&updated)[3].content, "Filled in.");
        assert_eq!(replace_section_content(PAPER, &sections[3], ""), PAPER);
    }

    #[test]
    fn test_replace_with_own_content_is_identity() {
        let sections = parse_sections(PAPER);
        for section in &sections {
            if section.line_end >= section.line_start {
                assert_eq!(
                    replace_section_content(PAPER, section, &section.content),
                    PAPER
                );
            }
        }
    }
}
