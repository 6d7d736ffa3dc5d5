//! Turns segments into the content string stored on a bot message.
//!
//! Math is re-wrapped in `$…$` (inline) or `$$…$$` (display) so that a
//! KaTeX-style renderer can typeset it; prose gets `**bold**` converted to
//! `<strong>` and a little spacing so paragraphs do not run together.

use crate::segment::{Segment, SegmentKind};

/// Math longer than this many characters is always displayed as a block.
pub const DISPLAY_MATH_MIN_LEN: usize = 40;

/// Rendering treatment for a math segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum MathLayout {
    Inline,
    Display,
}

/// Block math contains `=`, a literal `\\` line break, or is longer than
/// [`DISPLAY_MATH_MIN_LEN`] characters.
pub fn classify(math: &str) -> MathLayout {
    let math = math.trim();
    if math.contains('=') || math.contains("\\\\") || math.chars().count() > DISPLAY_MATH_MIN_LEN {
        MathLayout::Display
    } else {
        MathLayout::Inline
    }
}

/// Compose segments into one message body.
pub fn compose(segments: &[Segment]) -> String {
    let mut out = String::new();
    let mut glue_next_block = false;

    for (index, segment) in segments.iter().enumerate() {
        let is_last = index + 1 == segments.len();
        let glue = std::mem::take(&mut glue_next_block);
        match segment.kind {
            SegmentKind::Text => {
                let text = segment.content.trim();
                if text.is_empty() {
                    continue;
                }
                let text = embolden(text);
                if !out.is_empty() && !out.ends_with(' ') && !out.ends_with('\n') {
                    out.push(' ');
                }
                out.push_str(&text);
                if (text.ends_with(':') || opens_numbered_heading(&text)) && !is_last {
                    out.push_str("\n\n");
                }
            }
            SegmentKind::Math => {
                let math = segment.content.trim();
                if math.is_empty() {
                    continue;
                }
                match classify(math) {
                    MathLayout::Display => {
                        if glue {
                            out.push('\n');
                        } else if !out.is_empty() && !out.ends_with("\n\n") {
                            out.push_str("\n\n");
                        }
                        out.push_str("$$");
                        out.push_str(math);
                        out.push_str("$$");
                        // A following block only gets its own paragraph when
                        // it is an equation too.
                        match segments.get(index + 1) {
                            Some(next) if next.is_math() => {
                                if next.content.contains('=') {
                                    out.push_str("\n\n");
                                } else {
                                    glue_next_block = true;
                                }
                            }
                            _ => out.push_str("\n\n"),
                        }
                    }
                    MathLayout::Inline => {
                        if !out.is_empty() && !out.ends_with(' ') {
                            out.push(' ');
                        }
                        out.push('$');
                        out.push_str(math);
                        out.push('$');
                    }
                }
            }
        }
    }

    out.trim().to_owned()
}

/// Replace every `**x**` with `<strong>x</strong>`.
fn embolden(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(open) = rest.find("**") else { break };
        let body_start = open + 2;
        let Some(first) = rest[body_start..].chars().next() else { break };
        let search_from = body_start + first.len_utf8();
        let Some(close) = rest[search_from..].find("**").map(|i| search_from + i) else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str("<strong>");
        out.push_str(&rest[body_start..close]);
        out.push_str("</strong>");
        rest = &rest[close + 2..];
    }
    out.push_str(rest);
    out
}

/// `1. <strong>Heading</strong> …`
fn opens_numbered_heading(text: &str) -> bool {
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return false;
    }
    let Some(rest) = text[digits..].strip_prefix('.') else {
        return false;
    };
    let trimmed = rest.trim_start();
    trimmed.len() < rest.len() && trimmed.starts_with("<strong>")
}
