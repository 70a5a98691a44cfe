//! Whitespace canonicalization inside math spans.
//!
//! Spacing inside `$…$`, `\[…\]` and the display-math environments has no
//! effect on typeset output, so comparisons run on text where every
//! whitespace run inside such a span is collapsed to a single space. Text
//! outside math spans is returned untouched, which keeps paragraph structure
//! intact for display.
//!
//! The scanner is a single forward pass with no backtracking. A math opener
//! without a matching closer stops normalization: everything from the
//! unmatched opener to the end of the input is copied verbatim.

use tracing::trace;

/// Block environments treated as math. Each may also appear starred.
const MATH_ENVIRONMENTS: &[&str] = &["equation", "align", "gather", "multline"];

/// Byte offsets of one recognized math span within the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MathSpan {
    /// First byte of the body (just past the opening delimiter).
    body_start: usize,
    /// One past the last byte of the body (start of the closing delimiter).
    body_end: usize,
    /// One past the closing delimiter.
    end: usize,
}

/// Collapse whitespace runs inside every recognized math span of `text`.
///
/// Total and idempotent; the identity on text without math spans.
pub fn normalize_math_whitespace(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        let span = match bytes[i] {
            b'$' => Some(inline_span(text, i)),
            b'\\' if text[i..].starts_with("\\[") => Some(display_span(text, i)),
            b'\\' => match environment_span(text, i) {
                Some(span) => Some(span),
                None => {
                    // Control symbol such as `\$` or `\\`: never an opener.
                    i += 2;
                    continue;
                }
            },
            _ => None,
        };

        match span {
            None => i += 1,
            Some(None) => {
                trace!(offset = i, "unterminated math span, leaving remainder as-is");
                break;
            }
            Some(Some(span)) => {
                out.push_str(&text[copied..span.body_start]);
                out.push_str(&collapse(&text[span.body_start..span.body_end]));
                out.push_str(&text[span.body_end..span.end]);
                copied = span.end;
                i = span.end;
            }
        }
    }

    out.push_str(&text[copied..]);
    out
}

/// Match `$…$` starting at the `$` at `open`. `\$` inside does not close.
fn inline_span(text: &str, open: usize) -> Option<MathSpan> {
    let bytes = text.as_bytes();
    let mut j = open + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'$' => {
                return Some(MathSpan {
                    body_start: open + 1,
                    body_end: j,
                    end: j + 1,
                })
            }
            _ => j += 1,
        }
    }
    None
}

/// Match `\[…\]` starting at the backslash at `open`.
fn display_span(text: &str, open: usize) -> Option<MathSpan> {
    let bytes = text.as_bytes();
    let body_start = open + 2;
    let mut j = body_start;
    while j < bytes.len() {
        if bytes[j] == b'\\' {
            if bytes.get(j + 1) == Some(&b']') {
                return Some(MathSpan {
                    body_start,
                    body_end: j,
                    end: j + 2,
                });
            }
            j += 2;
        } else {
            j += 1;
        }
    }
    None
}

/// Match `\begin{env}…\end{env}` for a math environment at `open`.
///
/// Returns `None` when the text at `open` is not a math environment opener,
/// `Some(None)` when it is one but the matching `\end{env}` never appears.
fn environment_span(text: &str, open: usize) -> Option<Option<MathSpan>> {
    let rest = text[open..].strip_prefix("\\begin{")?;
    let name_len = rest.find('}')?;
    let name = &rest[..name_len];
    let base = name.strip_suffix('*').unwrap_or(name);
    if !MATH_ENVIRONMENTS.contains(&base) {
        return None;
    }

    let body_start = open + "\\begin{".len() + name_len + 1;
    let closer = format!("\\end{{{name}}}");
    Some(text[body_start..].find(&closer).map(|rel| MathSpan {
        body_start,
        body_end: body_start + rel,
        end: body_start + rel + closer.len(),
    }))
}

/// Join the whitespace-separated tokens of a math body with single spaces.
///
/// A body ending in a backslash followed by whitespace keeps one trailing
/// space, otherwise the backslash would swallow the closing delimiter.
fn collapse(body: &str) -> String {
    let mut collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    let trailing_ws = body.ends_with(char::is_whitespace);
    if trailing_ws && collapsed.ends_with('\\') {
        collapsed.push(' ');
    }
    collapsed
}
