use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use regex::Regex;
use time::{macros::format_description, OffsetDateTime};
use unicode_width::UnicodeWidthStr;

use crate::app::{
    AppState, CommitStatus, EditorField, EditorPane, NoteEditorController, Overlay, Screen,
};
use crate::config::themes::Palette;
use crate::highlight;
use crate::storage::Note;

pub fn draw_app(frame: &mut Frame, state: &AppState, list_state: &mut ListState) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(2)])
        .split(frame.size());

    match state.editor() {
        Some(editor) => draw_editor(frame, vertical[0], state, editor),
        None => draw_list(frame, vertical[0], state, list_state),
    }

    let status = Paragraph::new(build_status_line(state)).style(state.palette().base());
    frame.render_widget(status, vertical[1]);

    render_overlay(frame, state);
}

fn draw_list(frame: &mut Frame, area: Rect, state: &AppState, list_state: &mut ListState) {
    let palette = state.palette();
    let constraints = if state.is_wide(area.width) {
        vec![Constraint::Percentage(40), Constraint::Percentage(60)]
    } else {
        vec![Constraint::Percentage(100)]
    };
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(columns[0]);

    frame.render_widget(Paragraph::new(render_tag_strip(state)), left[0]);

    let search_regex = build_search_regex(&state.list.filter().search_text);
    let match_style = Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD);

    let visible = state.list.visible_notes();
    let mut items: Vec<ListItem> = visible
        .iter()
        .map(|note| {
            let mut title_spans = Vec::new();
            if note.is_pinned {
                title_spans.push(Span::styled(
                    "★ ",
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                ));
            }
            title_spans.extend(highlight_line(
                &note.title,
                search_regex.as_ref(),
                match_style,
                palette.base().add_modifier(Modifier::BOLD),
            ));
            let mut meta = vec![Span::styled(
                format!("Updated {}", format_timestamp(note.updated_at)),
                palette.muted(),
            )];
            for tag in &note.tags {
                meta.push(Span::raw(" "));
                meta.push(Span::styled(format!("#{tag}"), Style::default().fg(Color::Green)));
            }
            ListItem::new(vec![Line::from(title_spans), Line::from(meta)])
        })
        .collect();
    if items.is_empty() {
        let message = if state.list.filter().is_active() {
            "No notes match the current filters."
        } else {
            "No notes yet. Press `a` to create one or `S` for samples."
        };
        items.push(ListItem::new(Span::styled(message, palette.muted())));
    }

    let list = List::new(items)
        .block(
            Block::default()
                .title("Notes")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.accent)),
        )
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, left[1], list_state);

    if let Some(detail_area) = columns.get(1) {
        let detail = state
            .list
            .selected_note()
            .map(|note| note_detail(note, palette))
            .unwrap_or_else(|| Text::from("Select a note to see its contents."));
        let paragraph = Paragraph::new(detail)
            .block(Block::default().title("Note").borders(Borders::ALL))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, *detail_area);
    }
}

fn note_detail(note: &Note, palette: &Palette) -> Text<'static> {
    let mut lines = vec![
        Line::from(Span::styled(
            note.title.clone(),
            palette.base().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!(
                "Created {} • Updated {}",
                format_timestamp(note.created_at),
                format_timestamp(note.updated_at)
            ),
            palette.muted(),
        )),
        Line::from(""),
    ];
    let body = note.body();
    let segments = highlight::highlight_markdown(body);
    lines.extend(highlight::to_text(body, &segments, palette).lines);
    Text::from(lines)
}

fn render_tag_strip(state: &AppState) -> Line<'static> {
    let palette = state.palette();
    let selected = state.list.filter().selected_tag.as_deref();
    let active = Style::default()
        .fg(Color::Black)
        .bg(palette.accent)
        .add_modifier(Modifier::BOLD);
    let inactive = Style::default().fg(Color::Green);

    let mut spans = vec![
        Span::styled("Tags: ", palette.muted()),
        Span::styled(
            "all",
            if selected.is_none() { active } else { inactive },
        ),
    ];
    for tag in state.list.unique_tags() {
        let style = if selected == Some(tag.as_str()) {
            active
        } else {
            inactive
        };
        spans.push(Span::raw(" "));
        spans.push(Span::styled(format!("#{tag}"), style));
    }
    Line::from(spans)
}

fn draw_editor(frame: &mut Frame, area: Rect, state: &AppState, editor: &NoteEditorController) {
    let palette = state.palette();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .split(area);

    let title_label = if editor.is_pinned() { "Title ★" } else { "Title" };
    let title = Paragraph::new(editor.title_draft().to_string())
        .block(field_block(title_label, editor.focus() == EditorField::Title, palette));
    frame.render_widget(title, rows[0]);

    let (source_area, preview_area) = if state.is_wide(area.width) {
        let halves = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[1]);
        (Some(halves[0]), Some(halves[1]))
    } else {
        match state.pane() {
            EditorPane::Source => (Some(rows[1]), None),
            EditorPane::Preview => (None, Some(rows[1])),
        }
    };

    let body = editor.field(EditorField::Body);
    let (caret_line, caret_col) = caret_offset(body.text(), body.cursor());
    if let Some(source_area) = source_area {
        let visible_rows = source_area.height.saturating_sub(2).max(1) as usize;
        let scroll = caret_line.saturating_sub(visible_rows - 1);
        let source = Paragraph::new(editor.highlighted_body())
            .block(field_block(
                "Markdown",
                editor.focus() == EditorField::Body,
                palette,
            ))
            .scroll((scroll as u16, 0));
        frame.render_widget(source, source_area);
        if editor.focus() == EditorField::Body {
            place_cursor(frame, source_area, caret_line - scroll, caret_col);
        }
    }

    if let Some(preview_area) = preview_area {
        let label = if editor.preview().is_fallback() {
            "Preview (raw)"
        } else {
            "Preview"
        };
        let preview = Paragraph::new(editor.preview().text().clone())
            .block(Block::default().title(label).borders(Borders::ALL))
            .wrap(Wrap { trim: false });
        frame.render_widget(preview, preview_area);
    }

    let tags = Paragraph::new(editor.tag_field_draft().to_string()).block(field_block(
        "Tags (comma separated, Enter applies)",
        editor.focus() == EditorField::Tags,
        palette,
    ));
    frame.render_widget(tags, rows[2]);

    match editor.focus() {
        EditorField::Title => {
            let field = editor.field(EditorField::Title);
            let (_, col) = caret_offset(field.text(), field.cursor());
            place_cursor(frame, rows[0], 0, col);
        }
        EditorField::Tags => {
            let field = editor.field(EditorField::Tags);
            let (_, col) = caret_offset(field.text(), field.cursor());
            place_cursor(frame, rows[2], 0, col);
        }
        EditorField::Body => {}
    }
}

fn field_block(title: &str, focused: bool, palette: &Palette) -> Block<'static> {
    let border_style = if focused {
        Style::default().fg(palette.accent)
    } else {
        Style::default()
    };
    Block::default()
        .title(title.to_string())
        .borders(Borders::ALL)
        .border_style(border_style)
}

fn place_cursor(frame: &mut Frame, area: Rect, row: usize, col: usize) {
    let inner_width = area.width.saturating_sub(2);
    let inner_height = area.height.saturating_sub(2);
    if inner_width == 0 || inner_height == 0 {
        return;
    }
    let col = (col as u16).min(inner_width - 1);
    let row = (row as u16).min(inner_height - 1);
    frame.set_cursor(area.x + 1 + col, area.y + 1 + row);
}

/// Line index and display column of `cursor` within `text`.
fn caret_offset(text: &str, cursor: usize) -> (usize, usize) {
    let before = &text[..cursor.min(text.len())];
    let line = before.matches('\n').count();
    let line_start = before.rfind('\n').map(|idx| idx + 1).unwrap_or(0);
    (line, UnicodeWidthStr::width(&before[line_start..]))
}

fn build_status_line(state: &AppState) -> Text<'static> {
    let palette = state.palette();
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let mut spans = Vec::new();

    match state.editor() {
        None => {
            let visible = state.list.visible_notes().len();
            let total = state.list.notes().len();
            spans.push(Span::raw("Notes: "));
            spans.push(Span::styled(format!("{visible}/{total}"), bold));
            let filter = state.list.filter();
            if state.is_search_active() || !filter.search_text.is_empty() {
                let label_style = if state.is_search_active() {
                    Style::default()
                        .fg(palette.accent)
                        .add_modifier(Modifier::BOLD)
                } else {
                    palette.muted()
                };
                spans.push(Span::raw(" | Search "));
                spans.push(Span::styled("/", label_style));
                spans.push(Span::styled(filter.search_text.clone(), bold));
                if state.is_search_active() {
                    spans.push(Span::styled("▌", Style::default().fg(palette.accent)));
                }
            }
            for chip in filter.chips() {
                spans.push(Span::raw(" "));
                spans.push(Span::styled(
                    format!("[{chip}]"),
                    Style::default().fg(Color::Green),
                ));
            }
        }
        Some(editor) => {
            spans.push(Span::raw("Focus: "));
            spans.push(Span::styled(editor.focus().to_string(), bold));
            let field = editor.field(editor.focus());
            if field.has_selection() {
                spans.push(Span::raw(format!(" | {} bytes selected", field.selection().len())));
            }
            spans.push(Span::raw(" | "));
            spans.extend(commit_status_spans(&editor.commit_status()));
        }
    }

    if let Some(message) = state.status_message() {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            message.to_string(),
            Style::default().fg(palette.accent),
        ));
    }

    let keys = match state.screen() {
        Screen::List => {
            "a new • Enter open • / search • t tag • P pinned only • p pin • d delete • S samples • D delete all • q quit"
        }
        Screen::Editor => {
            "Tab focus • Ctrl-p pin • Ctrl-t template • Ctrl-v preview • Ctrl-s save • Ctrl-d delete • Esc close"
        }
    };
    Text::from(vec![
        Line::from(spans),
        Line::from(Span::styled(keys, Style::default().fg(Color::DarkGray))),
    ])
}

fn commit_status_spans(status: &CommitStatus) -> Vec<Span<'static>> {
    match status {
        CommitStatus::Idle {
            last_saved_at: Some(ts),
        } => vec![
            Span::raw("Saved "),
            Span::styled(format_time_short(*ts), Style::default().fg(Color::Gray)),
        ],
        CommitStatus::Idle {
            last_saved_at: None,
        } => vec![Span::raw("No changes")],
        CommitStatus::Pending { since } => vec![
            Span::styled(
                "Pending",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" since "),
            Span::styled(format_time_short(*since), Style::default().fg(Color::Gray)),
        ],
        CommitStatus::Error { message, .. } => vec![Span::styled(
            format!("Not saved ({message})"),
            Style::default().fg(Color::Red),
        )],
    }
}

fn format_time_short(dt: OffsetDateTime) -> String {
    dt.format(&format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| dt.unix_timestamp().to_string())
}

fn format_timestamp(dt: OffsetDateTime) -> String {
    dt.format(&format_description!("[year]-[month]-[day] [hour]:[minute]"))
        .unwrap_or_else(|_| dt.unix_timestamp().to_string())
}

/// Case-insensitive literal matcher for the current search text.
fn build_search_regex(search_text: &str) -> Option<Regex> {
    if search_text.is_empty() {
        return None;
    }
    Regex::new(&format!("(?i){}", regex::escape(search_text))).ok()
}

fn highlight_line(
    text: &str,
    regex: Option<&Regex>,
    highlight_style: Style,
    base_style: Style,
) -> Vec<Span<'static>> {
    let Some(re) = regex else {
        return vec![Span::styled(text.to_string(), base_style)];
    };
    let mut spans = Vec::new();
    let mut last = 0;
    for mat in re.find_iter(text) {
        if mat.start() > last {
            spans.push(Span::styled(text[last..mat.start()].to_string(), base_style));
        }
        spans.push(Span::styled(mat.as_str().to_string(), highlight_style));
        last = mat.end();
    }
    if last < text.len() {
        spans.push(Span::styled(text[last..].to_string(), base_style));
    }
    if spans.is_empty() {
        spans.push(Span::styled(text.to_string(), base_style));
    }
    spans
}

fn render_overlay(frame: &mut Frame, state: &AppState) {
    let Some(overlay) = state.overlay() else {
        return;
    };
    let (title, question) = match overlay {
        Overlay::ConfirmDeleteAll { count } => (
            "Delete All Notes",
            format!("Delete all {count} notes? This cannot be undone."),
        ),
        Overlay::ConfirmDeleteNote { title } => ("Delete Note", format!("Delete \"{title}\"?")),
    };
    let area = centered_rect(60, 30, frame.size());
    frame.render_widget(Clear, area);
    let paragraph = Paragraph::new(vec![
        Line::from(Span::styled(
            question,
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "y / Enter to delete • n / Esc to cancel",
            Style::default().fg(Color::Gray),
        )),
    ])
    .block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red)),
    )
    .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
