use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use thiserror::Error;

use crate::config::themes::Palette;
use crate::config::PreviewOptions;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("document is {len} bytes; the preview limit is {limit}")]
    TooLarge { len: usize, limit: usize },
}

/// Markdown to styled text. Implementations must be pure: the same input
/// always produces the same output or the same error.
pub trait Renderer {
    fn render(&self, markdown: &str) -> Result<Text<'static>, RenderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Preview {
    Rendered(Text<'static>),
    Fallback {
        text: Text<'static>,
        error: RenderError,
    },
}

impl Preview {
    pub fn text(&self) -> &Text<'static> {
        match self {
            Preview::Rendered(text) => text,
            Preview::Fallback { text, .. } => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Preview::Fallback { .. })
    }
}

/// Renders `body`, showing the raw source in the muted style if rendering fails.
pub fn render_preview(renderer: &dyn Renderer, body: &str, palette: &Palette) -> Preview {
    match renderer.render(body) {
        Ok(text) => Preview::Rendered(text),
        Err(error) => {
            tracing::debug!(%error, "preview fell back to raw text");
            let muted = palette.muted();
            let lines = body
                .split('\n')
                .map(|line| Line::from(Span::styled(line.to_string(), muted)))
                .collect::<Vec<_>>();
            Preview::Fallback {
                text: Text::from(lines),
                error,
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CmarkRenderer {
    palette: Palette,
    max_bytes: usize,
}

impl CmarkRenderer {
    pub fn new(palette: Palette, options: &PreviewOptions) -> Self {
        Self {
            palette,
            max_bytes: options.max_bytes,
        }
    }
}

impl Renderer for CmarkRenderer {
    fn render(&self, markdown: &str) -> Result<Text<'static>, RenderError> {
        if markdown.len() > self.max_bytes {
            return Err(RenderError::TooLarge {
                len: markdown.len(),
                limit: self.max_bytes,
            });
        }
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_FOOTNOTES);

        let mut builder = TextBuilder::new(self.palette);
        for event in Parser::new_ext(markdown, options) {
            builder.push_event(event);
        }
        Ok(builder.finish())
    }
}

struct TextBuilder {
    palette: Palette,
    lines: Vec<Line<'static>>,
    current: Vec<Span<'static>>,
    styles: Vec<Style>,
    lists: Vec<Option<u64>>,
    quote_depth: usize,
    in_code_block: bool,
}

impl TextBuilder {
    fn new(palette: Palette) -> Self {
        Self {
            palette,
            lines: Vec::new(),
            current: Vec::new(),
            styles: Vec::new(),
            lists: Vec::new(),
            quote_depth: 0,
            in_code_block: false,
        }
    }

    fn style(&self) -> Style {
        self.styles
            .last()
            .copied()
            .unwrap_or_else(|| self.palette.base())
    }

    fn push_style(&mut self, style: Style) {
        let next = self.style().patch(style);
        self.styles.push(next);
    }

    fn push_span(&mut self, content: impl Into<String>, style: Style) {
        let content = content.into();
        if !content.is_empty() {
            self.current.push(Span::styled(content, style));
        }
    }

    fn flush(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let mut spans = Vec::with_capacity(self.current.len() + 1);
        if self.quote_depth > 0 {
            spans.push(Span::styled("│ ".repeat(self.quote_depth), self.palette.muted()));
        }
        spans.append(&mut self.current);
        self.lines.push(Line::from(spans));
    }

    fn blank_line(&mut self) {
        self.flush();
        if self.lines.last().is_some_and(|line| !line.spans.is_empty()) {
            self.lines.push(Line::default());
        }
    }

    fn push_event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) if self.in_code_block => {
                let style = self.style();
                let mut pieces = text.split('\n').peekable();
                while let Some(piece) = pieces.next() {
                    if piece.is_empty() && pieces.peek().is_none() {
                        break;
                    }
                    self.push_span(format!("  {piece}"), style);
                    self.flush();
                }
            }
            Event::Text(text) => {
                let style = self.style();
                self.push_span(text.into_string(), style);
            }
            Event::Code(code) => {
                let style = self.style().patch(self.palette.code());
                self.push_span(code.into_string(), style);
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                let style = self.palette.muted();
                self.push_span(html.trim_end_matches('\n').to_string(), style);
                if html.ends_with('\n') {
                    self.flush();
                }
            }
            Event::FootnoteReference(label) => {
                let style = self.palette.link();
                self.push_span(format!("[^{label}]"), style);
            }
            Event::SoftBreak => {
                let style = self.style();
                self.push_span(" ", style);
            }
            Event::HardBreak => self.flush(),
            Event::Rule => {
                self.flush();
                let style = self.palette.muted();
                self.push_span("─".repeat(24), style);
                self.blank_line();
            }
            Event::TaskListMarker(checked) => {
                let marker = if checked { "[x] " } else { "[ ] " };
                let style = Style::default().fg(self.palette.accent);
                self.push_span(marker, style);
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.flush();
                self.push_style(self.palette.heading(level as u8));
            }
            Tag::BlockQuote { .. } => {
                self.flush();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(_) => {
                self.flush();
                self.in_code_block = true;
                self.push_style(self.palette.code());
            }
            Tag::List(start) => {
                self.flush();
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush();
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let bullet = match self.lists.last_mut() {
                    Some(Some(number)) => {
                        let label = format!("{indent}{number}. ");
                        *number += 1;
                        label
                    }
                    _ => format!("{indent}• "),
                };
                let style = Style::default().fg(self.palette.accent);
                self.push_span(bullet, style);
            }
            Tag::Emphasis => self.push_style(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => {
                self.push_style(Style::default().add_modifier(Modifier::CROSSED_OUT))
            }
            Tag::Link { .. } | Tag::Image { .. } => self.push_style(self.palette.link()),
            Tag::FootnoteDefinition(label) => {
                self.flush();
                let style = self.palette.link();
                self.push_span(format!("[^{label}]: "), style);
            }
            Tag::TableCell => {
                if !self.current.is_empty() {
                    let style = self.palette.muted();
                    self.push_span(" │ ", style);
                }
            }
            Tag::TableHead => self.push_style(Style::default().add_modifier(Modifier::BOLD)),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                if self.lists.is_empty() {
                    self.blank_line();
                } else {
                    self.flush();
                }
            }
            TagEnd::Heading(_) => {
                self.styles.pop();
                self.blank_line();
            }
            TagEnd::BlockQuote { .. } => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
                if self.quote_depth == 0 {
                    self.blank_line();
                }
            }
            TagEnd::CodeBlock => {
                self.styles.pop();
                self.in_code_block = false;
                self.blank_line();
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank_line();
                }
            }
            TagEnd::Item | TagEnd::TableRow => self.flush(),
            TagEnd::TableHead => {
                self.styles.pop();
                self.flush();
                let style = self.palette.muted();
                self.push_span("─".repeat(24), style);
                self.flush();
            }
            TagEnd::Table | TagEnd::FootnoteDefinition => self.blank_line(),
            TagEnd::Emphasis
            | TagEnd::Strong
            | TagEnd::Strikethrough
            | TagEnd::Link
            | TagEnd::Image => {
                self.styles.pop();
            }
            _ => {}
        }
    }

    fn finish(mut self) -> Text<'static> {
        self.flush();
        while self.lines.last().is_some_and(|line| line.spans.is_empty()) {
            self.lines.pop();
        }
        Text::from(self.lines)
    }
}
