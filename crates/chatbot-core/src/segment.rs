//! Response segmentation.
//!
//! Splits the raw text returned by the model into an ordered list of
//! [`Segment`]s so that math notation can be typeset separately from prose.
//!
//! Precedence:
//! 1. Every newline is a paragraph boundary.  Paragraphs are trimmed and blank
//!    ones are dropped.
//! 2. Inside a paragraph, `$$` opens a span that closes at the next `$$`.
//!    Otherwise a single `$` opens a span that closes at the next `$`, so the
//!    closing delimiter never takes more `$` than the opening one.  The
//!    interior becomes a `math` segment; the trimmed text on either side
//!    becomes `text` segments.  A blank interior is dropped.
//! 3. A `$` without a closing `$` is ordinary text.
//!
//! No LaTeX validation happens here: whatever sits between the delimiters is
//! passed through verbatim.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The rendering treatment a segment asks for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SegmentKind {
    Text,
    Math,
}

/// A typed span of a model response, serialized as `{"type": "...", "content": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    pub content: String,
}

impl Segment {
    pub fn text(content: impl Into<String>) -> Self {
        Self { kind: SegmentKind::Text, content: content.into() }
    }

    pub fn math(content: impl Into<String>) -> Self {
        Self { kind: SegmentKind::Math, content: content.into() }
    }

    pub fn is_math(&self) -> bool {
        self.kind == SegmentKind::Math
    }
}

/// Output of [`Segmenter::split`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmentation {
    /// All-caps first line, only populated when logo detection is enabled.
    pub logo: Option<String>,
    pub segments: Vec<Segment>,
}

/// Configurable front end to the segmentation rules.
///
/// The default configuration never emits a logo; see
/// [`Segmenter::with_logo_detection`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Segmenter {
    detect_logo: bool,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat a first paragraph made only of uppercase ASCII letters and
    /// whitespace as a logo label instead of a text segment.
    pub fn with_logo_detection() -> Self {
        Self { detect_logo: true }
    }

    pub fn detects_logo(&self) -> bool {
        self.detect_logo
    }

    pub fn split(&self, raw: &str) -> Segmentation {
        let mut out = Segmentation::default();
        for (index, paragraph) in paragraphs(raw).enumerate() {
            if self.detect_logo && index == 0 && is_logo_line(paragraph) {
                out.logo = Some(paragraph.to_owned());
                continue;
            }
            split_paragraph(paragraph, &mut out.segments);
        }
        out
    }
}

/// Segment `raw` with the default rules.
pub fn segment(raw: &str) -> Vec<Segment> {
    Segmenter::new().split(raw).segments
}

/// Like [`segment`], but a missing response yields no segments.
pub fn segment_opt(raw: Option<&str>) -> Vec<Segment> {
    raw.map(segment).unwrap_or_default()
}

// ── private helpers ──────────────────────────────────────────────────────────

fn paragraphs(raw: &str) -> impl Iterator<Item = &str> {
    raw.split('\n').map(str::trim).filter(|p| !p.is_empty())
}

fn is_logo_line(paragraph: &str) -> bool {
    paragraph.chars().any(|c| c.is_ascii_uppercase())
        && paragraph
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_whitespace())
}

/// Byte offsets of one `$…$` span inside a paragraph.
struct MathSpan {
    open: usize,
    body_start: usize,
    body_end: usize,
    end: usize,
}

fn find_math_span(s: &str) -> Option<MathSpan> {
    let open = s.find('$')?;
    if s[open..].starts_with("$$") {
        let body_start = open + 2;
        if let Some(offset) = s[body_start..].find("$$") {
            let body_end = body_start + offset;
            return Some(MathSpan { open, body_start, body_end, end: body_end + 2 });
        }
    }
    let body_start = open + 1;
    let body_end = body_start + s[body_start..].find('$')?;
    Some(MathSpan { open, body_start, body_end, end: body_end + 1 })
}

fn split_paragraph(paragraph: &str, out: &mut Vec<Segment>) {
    let mut rest = paragraph;
    while let Some(span) = find_math_span(rest) {
        push_text(&rest[..span.open], out);
        let body = &rest[span.body_start..span.body_end];
        if !body.trim().is_empty() {
            out.push(Segment::math(body));
        }
        rest = &rest[span.end..];
    }
    push_text(rest, out);
}

fn push_text(text: &str, out: &mut Vec<Segment>) {
    let text = text.trim();
    if !text.is_empty() {
        out.push(Segment::text(text));
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plain_line_is_one_text_segment() {
        for input in ["hello", "  padded text  ", "no math, just 5 dollars", "\tTabs\t"] {
            assert_eq!(segment(input), vec![Segment::text(input.trim())], "input {input:?}");
        }
    }

    #[test]
    fn inline_math_is_split_out() {
        assert_eq!(
            segment("Energy: $E=mc^2$ is famous"),
            vec![
                Segment::text("Energy:"),
                Segment::math("E=mc^2"),
                Segment::text("is famous"),
            ]
        );
    }

    #[test]
    fn unterminated_dollar_is_text() {
        assert_eq!(segment("cost is $5 dollars"), vec![Segment::text("cost is $5 dollars")]);
    }

    #[test]
    fn empty_and_missing_input_yield_nothing() {
        assert!(segment("").is_empty());
        assert!(segment("\n\n   \n").is_empty());
        assert!(segment_opt(None).is_empty());
    }

    #[test]
    fn every_newline_starts_a_paragraph() {
        assert_eq!(
            segment("first line\nsecond line\n\n\nthird"),
            vec![
                Segment::text("first line"),
                Segment::text("second line"),
                Segment::text("third"),
            ]
        );
    }

    #[test]
    fn shortest_span_wins() {
        assert_eq!(
            segment("$a$ and $b$"),
            vec![Segment::math("a"), Segment::text("and"), Segment::math("b")]
        );
    }

    #[test]
    fn math_interior_is_verbatim() {
        assert_eq!(
            segment("see $ \\frac{1}{2 $ here"),
            vec![
                Segment::text("see"),
                Segment::math(" \\frac{1}{2 "),
                Segment::text("here"),
            ]
        );
    }

    #[test]
    fn doubled_delimiters_act_as_one() {
        assert_eq!(
            segment("$$x^2 + y^2 = z^2$$"),
            vec![Segment::math("x^2 + y^2 = z^2")]
        );
    }

    #[test]
    fn blank_math_span_is_dropped() {
        assert_eq!(segment("a $ $ b"), vec![Segment::text("a"), Segment::text("b")]);
        assert!(segment("$$").is_empty());
    }

    #[test]
    fn adjacent_spans_keep_their_delimiters() {
        assert_eq!(segment("$a$$b$"), vec![Segment::math("a"), Segment::math("b")]);
        assert_eq!(
            segment("$a$ $$b = c$$ $d$"),
            vec![Segment::math("a"), Segment::math("b = c"), Segment::math("d")]
        );
    }

    #[test]
    fn unmatched_double_delimiter_falls_back_to_single() {
        assert_eq!(
            segment("cost $$5 and $x$"),
            vec![Segment::text("cost"), Segment::text("5 and"), Segment::math("x")]
        );
    }

    #[test]
    fn no_text_segment_carries_a_paired_delimiter() {
        for input in ["$a$$b$", "cost $$5 and $x$", "$$x$$ then $y$", "$p$$$q$$"] {
            for s in segment(input) {
                if s.kind == SegmentKind::Text {
                    assert!(!s.content.contains('$'), "{input:?} leaked into {s:?}");
                }
            }
        }
    }

    #[test]
    fn trailing_unclosed_delimiter_after_span() {
        assert_eq!(
            segment("$x$ costs $3"),
            vec![Segment::math("x"), Segment::text("costs $3")]
        );
    }

    #[test]
    fn no_segment_is_blank() {
        let input = "  $a$  \n $ b $ c \n\n $$ \n end $";
        for s in segment(input) {
            assert!(!s.content.trim().is_empty(), "blank segment {s:?}");
        }
    }

    #[test]
    fn logo_only_when_enabled() {
        let raw = "QUADRATIC FORMULA\nRoots: $x = 1$";
        assert_eq!(segment(raw)[0], Segment::text("QUADRATIC FORMULA"));

        let split = Segmenter::with_logo_detection().split(raw);
        assert_eq!(split.logo.as_deref(), Some("QUADRATIC FORMULA"));
        assert_eq!(split.segments, vec![Segment::text("Roots:"), Segment::math("x = 1")]);
    }

    #[test]
    fn logo_must_be_first_and_uppercase() {
        let split = Segmenter::with_logo_detection().split("Intro line\nHEADING");
        assert!(split.logo.is_none());
        assert_eq!(split.segments.len(), 2);

        let split = Segmenter::with_logo_detection().split("NOT A LOGO 2");
        assert!(split.logo.is_none());
    }

    #[test]
    fn segment_wire_shape() {
        let json = serde_json::to_value(Segment::math("x")).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "math", "content": "x" }));
    }
}
