use std::ops::Range;

use once_cell::sync::Lazy;
use ratatui::style::Style;
use ratatui::text::{Line, Span, Text};
use regex::Regex;

use crate::config::themes::Palette;

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(#{1,6})[ \t]+([^\r\n]*)").expect("valid heading regex"));
static INLINE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`]+?)`").expect("valid inline code regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStyle {
    Plain,
    HeadingMarker,
    Heading(u8),
    Code,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSegment {
    pub range: Range<usize>,
    pub style: SpanStyle,
}

/// Styles a Markdown body for the edit surface. The returned segments are
/// contiguous and cover the whole input. Inline code is painted after
/// headings, so a code span inside a heading keeps the code style.
pub fn highlight_markdown(body: &str) -> Vec<StyledSegment> {
    let mut styles = vec![SpanStyle::Plain; body.len()];

    for caps in HEADING.captures_iter(body) {
        let (Some(marker), Some(text)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let level = marker.len() as u8;
        styles[marker.range()].fill(SpanStyle::HeadingMarker);
        styles[text.range()].fill(SpanStyle::Heading(level));
    }

    for caps in INLINE_CODE.captures_iter(body) {
        if let Some(inner) = caps.get(1) {
            styles[inner.range()].fill(SpanStyle::Code);
        }
    }

    let mut segments: Vec<StyledSegment> = Vec::new();
    for (idx, style) in styles.into_iter().enumerate() {
        match segments.last_mut() {
            Some(last) if last.style == style => last.range.end = idx + 1,
            _ => segments.push(StyledSegment {
                range: idx..idx + 1,
                style,
            }),
        }
    }
    segments
}

pub fn style_for(style: SpanStyle, palette: &Palette) -> Style {
    match style {
        SpanStyle::Plain => palette.base(),
        SpanStyle::HeadingMarker => palette.heading_marker(),
        SpanStyle::Heading(level) => palette.heading(level),
        SpanStyle::Code => palette.code(),
    }
}

/// Converts highlighted segments into terminal lines, splitting on newlines.
pub fn to_text(body: &str, segments: &[StyledSegment], palette: &Palette) -> Text<'static> {
    let mut lines = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    for segment in segments {
        let style = style_for(segment.style, palette);
        let mut pieces = body[segment.range.clone()].split('\n').peekable();
        while let Some(piece) = pieces.next() {
            if !piece.is_empty() {
                current.push(Span::styled(piece.to_string(), style));
            }
            if pieces.peek().is_some() {
                lines.push(Line::from(std::mem::take(&mut current)));
            }
        }
    }
    lines.push(Line::from(current));
    Text::from(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style_of(body: &str, segments: &[StyledSegment], needle: &str) -> SpanStyle {
        let start = body.find(needle).expect("needle present");
        let segment = segments
            .iter()
            .find(|seg| seg.range.contains(&start))
            .expect("covered");
        assert!(
            segment.range.end >= start + needle.len(),
            "{needle:?} split across segments: {segments:?}"
        );
        segment.style
    }

    fn covered(segments: &[StyledSegment], len: usize) -> bool {
        segments.first().map(|s| s.range.start) == Some(0)
            && segments.last().map(|s| s.range.end) == Some(len)
            && segments.windows(2).all(|w| w[0].range.end == w[1].range.start)
    }

    #[test]
    fn heading_and_inline_code_get_their_styles() {
        let body = "# Title\nSome `code` here";
        let segments = highlight_markdown(body);
        assert!(covered(&segments, body.len()));
        assert_eq!(
            segments,
            vec![
                StyledSegment {
                    range: 0..1,
                    style: SpanStyle::HeadingMarker
                },
                StyledSegment {
                    range: 1..2,
                    style: SpanStyle::Plain
                },
                StyledSegment {
                    range: 2..7,
                    style: SpanStyle::Heading(1)
                },
                StyledSegment {
                    range: 7..14,
                    style: SpanStyle::Plain
                },
                StyledSegment {
                    range: 14..18,
                    style: SpanStyle::Code
                },
                StyledSegment {
                    range: 18..body.len(),
                    style: SpanStyle::Plain
                },
            ]
        );
        assert_eq!(&body[2..7], "Title");
        assert_eq!(&body[14..18], "code");
    }

    #[test]
    fn crlf_line_endings_stay_outside_the_heading() {
        let body = "# Title\r\nbody";
        let segments = highlight_markdown(body);
        assert!(covered(&segments, body.len()));
        assert_eq!(style_of(body, &segments, "Title"), SpanStyle::Heading(1));
        let heading = segments
            .iter()
            .find(|seg| seg.style == SpanStyle::Heading(1))
            .map(|seg| seg.range.clone());
        assert_eq!(heading, Some(2..7));
        assert_eq!(style_of(body, &segments, "\r\nbody"), SpanStyle::Plain);
    }

    #[test]
    fn heading_levels_stop_at_six_and_need_whitespace() {
        let body = "###### six\n####### seven\n#tag\n  # indented";
        let segments = highlight_markdown(body);
        assert_eq!(style_of(body, &segments, "six"), SpanStyle::Heading(6));
        assert_eq!(style_of(body, &segments, "####### seven"), SpanStyle::Plain);
        assert_eq!(style_of(body, &segments, "#tag"), SpanStyle::Plain);
        assert_eq!(style_of(body, &segments, "# indented"), SpanStyle::Plain);
    }

    #[test]
    fn code_inside_heading_overrides_heading_style() {
        let body = "## Using `grep` daily";
        let segments = highlight_markdown(body);
        assert_eq!(style_of(body, &segments, "Using "), SpanStyle::Heading(2));
        assert_eq!(style_of(body, &segments, "grep"), SpanStyle::Code);
        assert_eq!(style_of(body, &segments, " daily"), SpanStyle::Heading(2));
    }

    #[test]
    fn inline_code_is_non_greedy_and_ignores_unclosed_ticks() {
        let body = "`a` and `b` but `open";
        let segments = highlight_markdown(body);
        assert_eq!(style_of(body, &segments, "a"), SpanStyle::Code);
        assert_eq!(style_of(body, &segments, " and "), SpanStyle::Plain);
        assert_eq!(style_of(body, &segments, "b"), SpanStyle::Code);
        assert_eq!(style_of(body, &segments, "open"), SpanStyle::Plain);
        assert!(segments
            .iter()
            .filter(|seg| seg.style == SpanStyle::Code)
            .all(|seg| !body[seg.range.clone()].contains('`')));
    }

    #[test]
    fn multibyte_text_keeps_char_boundaries() {
        let body = "# Café ☕\n`naïve` ok";
        let segments = highlight_markdown(body);
        assert!(covered(&segments, body.len()));
        for segment in &segments {
            assert!(body.is_char_boundary(segment.range.start));
            assert!(body.is_char_boundary(segment.range.end));
        }
        assert_eq!(style_of(body, &segments, "naïve"), SpanStyle::Code);
    }

    #[test]
    fn empty_body_has_no_segments_and_one_line() {
        assert!(highlight_markdown("").is_empty());
        let text = to_text("", &[], &Palette::for_theme(Default::default()));
        assert_eq!(text.lines.len(), 1);
    }

    #[test]
    fn to_text_splits_lines_and_keeps_all_characters() {
        let body = "# Title\nSome `code`\n\nend";
        let segments = highlight_markdown(body);
        let text = to_text(body, &segments, &Palette::for_theme(Default::default()));
        let rendered: Vec<String> = text
            .lines
            .iter()
            .map(|line| line.spans.iter().map(|span| span.content.as_ref()).collect())
            .collect();
        assert_eq!(rendered, vec!["# Title", "Some `code`", "", "end"]);
    }
}
