use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;
use ratatui::Terminal;

use crate::config::themes::Palette;
use crate::config::AppConfig;
use crate::preview::{CmarkRenderer, Renderer};
use crate::storage::{Note, StorageHandle, UNTITLED};
use crate::ui;

pub mod autosave;
pub mod editor;
pub mod list;
pub mod state;
pub mod text_field;

pub use autosave::CommitStatus;
pub use editor::{EditorField, NoteEditorController};
pub use list::NoteListController;
pub use state::{AppState, EditorPane, Overlay, Screen};
pub use text_field::TextField;

enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    OpenSelected,
    NewNote,
    StartSearch,
    CycleTag,
    TogglePinnedOnly,
    TogglePin,
    DeleteNote,
    SeedSamples,
    DeleteAll,
    Refresh,
}

pub struct App {
    pub config: Arc<AppConfig>,
    pub storage: StorageHandle,
    state: AppState,
    renderer: Arc<dyn Renderer + Send + Sync>,
    list_state: ListState,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(config: Arc<AppConfig>, storage: StorageHandle) -> Result<Self> {
        let palette = Palette::for_theme(config.theme);
        let list = NoteListController::new(&storage).context("loading notes for the list")?;
        let state = AppState::new(list, palette, config.preview.wide_layout_min_width);
        let renderer = Arc::new(CmarkRenderer::new(palette, &config.preview));
        Ok(Self {
            config,
            storage,
            state,
            renderer,
            list_state: ListState::default(),
            should_quit: false,
            tick_rate: Duration::from_millis(250),
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        self.close_editor();
        restore_terminal(&mut terminal)?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            terminal
                .draw(|frame| {
                    let selected = (!self.state.list.visible_notes().is_empty())
                        .then(|| self.state.list.selected_index());
                    self.list_state.select(selected);
                    ui::draw_app(frame, &self.state, &mut self.list_state);
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    fn on_tick(&mut self) {
        if let Some(editor) = self.state.editor_mut() {
            editor.poll(&self.storage);
        }
        self.state.list.sync(&self.storage);
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        if self.state.overlay().is_some() {
            self.handle_overlay_key(key);
        } else if self.state.is_editing() {
            self.handle_editor_key(key);
        } else if !(self.state.is_search_active() && self.handle_search_key(key)) {
            if let Some(action) = list_action(key) {
                self.state.list.clear_status();
                self.handle_action(action);
            }
        }
        self.state.list.sync(&self.storage);
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => self.state.cancel_search(),
            KeyCode::Enter => self.state.finish_search(),
            KeyCode::Backspace => self.state.list.pop_search_char(),
            KeyCode::Char(ch) if is_plain(&key) => self.state.list.push_search_char(ch),
            _ => return false,
        }
        true
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::SelectNext => self.state.list.move_selection(1),
            Action::SelectPrevious => self.state.list.move_selection(-1),
            Action::OpenSelected => {
                if let Some(note) = self.state.list.selected_note().cloned() {
                    self.open_note(&note);
                }
            }
            Action::NewNote => {
                if let Some(note) = self.state.list.new_note(&self.storage) {
                    self.open_note(&note);
                    self.state.set_status_message("New note");
                }
            }
            Action::StartSearch => self.state.begin_search(),
            Action::CycleTag => {
                self.state.list.cycle_tag();
                let message = match &self.state.list.filter().selected_tag {
                    Some(tag) => format!("Showing #{tag}"),
                    None => "Showing all tags".to_string(),
                };
                self.state.set_status_message(message);
            }
            Action::TogglePinnedOnly => {
                self.state.list.toggle_pinned_only();
                let message = if self.state.list.filter().pinned_only {
                    "Showing pinned notes"
                } else {
                    "Showing all notes"
                };
                self.state.set_status_message(message);
            }
            Action::TogglePin => self.state.list.toggle_pin_selected(&self.storage),
            Action::DeleteNote => self.state.list.delete_selected(&self.storage),
            Action::SeedSamples => self.state.list.seed_sample_data(&self.storage),
            Action::DeleteAll => {
                let count = self.state.list.notes().len();
                if count == 0 {
                    self.state.set_status_message("No notes to delete");
                } else {
                    self.state.open_overlay(Overlay::ConfirmDeleteAll { count });
                }
            }
            Action::Refresh => {
                if let Err(err) = self.state.list.refresh(&self.storage) {
                    tracing::error!(?err, "failed to refresh notes from storage");
                    self.state.set_status_message("Could not refresh notes");
                }
            }
        }
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) {
        let confirmed = match key.code {
            KeyCode::Char('y') | KeyCode::Enter => true,
            KeyCode::Char('n') | KeyCode::Esc => false,
            _ => return,
        };
        let Some(overlay) = self.state.close_overlay() else {
            return;
        };
        match (overlay, confirmed) {
            (Overlay::ConfirmDeleteAll { .. }, true) => self.state.list.delete_all(&self.storage),
            (Overlay::ConfirmDeleteNote { title }, true) => self.delete_open_note(&title),
            (_, false) => self.state.set_status_message("Canceled"),
        }
    }

    fn handle_editor_key(&mut self, key: KeyEvent) {
        let storage = &self.storage;
        let Some(editor) = self.state.editor_mut() else {
            return;
        };

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('p') => {
                    if let Some(note) = editor.toggle_pin(storage) {
                        let message = if note.is_pinned { "Pinned" } else { "Unpinned" };
                        self.state.set_status_message(message);
                    }
                }
                KeyCode::Char('t') => {
                    editor.insert_template(storage);
                    self.state.set_status_message("Inserted template");
                }
                KeyCode::Char('d') => {
                    let title = match editor.title_draft() {
                        "" => UNTITLED.to_string(),
                        title => title.to_string(),
                    };
                    self.state.open_overlay(Overlay::ConfirmDeleteNote { title });
                }
                KeyCode::Char('v') => {
                    let pane = self.state.toggle_pane();
                    self.state.set_status_message(format!("Showing {pane}"));
                }
                KeyCode::Char('s') => {
                    editor.flush(storage);
                    if matches!(editor.commit_status(), CommitStatus::Idle { .. }) {
                        self.state.set_status_message("Saved");
                    }
                }
                _ => {}
            }
            return;
        }

        let extend = key.modifiers.contains(KeyModifiers::SHIFT);
        match key.code {
            KeyCode::Esc => self.close_editor(),
            KeyCode::Tab => editor.set_focus(editor.focus().next()),
            KeyCode::BackTab => editor.set_focus(editor.focus().prev()),
            KeyCode::Enter => match editor.focus() {
                EditorField::Title => editor.set_focus(EditorField::Body),
                EditorField::Body => {
                    editor.edit_focused(storage, |field| {
                        field.insert_char('\n');
                        true
                    });
                }
                EditorField::Tags => {
                    if editor.apply_tags(storage).is_some() {
                        self.state.set_status_message("Tags applied");
                    }
                }
            },
            KeyCode::Backspace => {
                editor.edit_focused(storage, TextField::backspace);
            }
            KeyCode::Delete => {
                editor.edit_focused(storage, TextField::delete);
            }
            KeyCode::Char(ch) if is_plain(&key) => {
                editor.edit_focused(storage, |field| {
                    field.insert_char(ch);
                    true
                });
            }
            KeyCode::Left => {
                editor.navigate(|field| field.move_left(extend));
            }
            KeyCode::Right => {
                editor.navigate(|field| field.move_right(extend));
            }
            KeyCode::Up => {
                editor.navigate(|field| field.move_up(extend));
            }
            KeyCode::Down => {
                editor.navigate(|field| field.move_down(extend));
            }
            KeyCode::Home => {
                editor.navigate(|field| field.move_home(extend));
            }
            KeyCode::End => {
                editor.navigate(|field| field.move_end(extend));
            }
            _ => {}
        }
    }

    fn open_note(&mut self, note: &Note) {
        self.close_editor();
        let editor = NoteEditorController::open(
            note,
            Arc::clone(&self.renderer),
            *self.state.palette(),
            self.config.editor.commit_debounce,
        );
        self.state.open_editor(editor);
    }

    /// Flushes pending edits and returns to the list with the note selected.
    fn close_editor(&mut self) {
        let Some(mut editor) = self.state.close_editor() else {
            return;
        };
        editor.flush(&self.storage);
        if let CommitStatus::Error { message, .. } = editor.commit_status() {
            self.state
                .set_status_message(format!("Last change was not saved: {message}"));
        }
        self.state.list.sync(&self.storage);
        self.state.list.select_id(editor.note_id());
    }

    fn delete_open_note(&mut self, title: &str) {
        let Some(editor) = self.state.editor_mut() else {
            return;
        };
        match editor.delete(&self.storage) {
            Ok(()) => {
                self.state.close_editor();
                self.state.set_status_message(format!("Deleted \"{title}\""));
            }
            Err(err) if err.is_not_found() => {
                self.state.close_editor();
                self.state.set_status_message("Note was already deleted");
            }
            Err(err) => {
                tracing::error!(?err, "failed to delete note");
                self.state.set_status_message(format!("Deleting the note failed: {err}"));
            }
        }
    }
}

fn is_plain(key: &KeyEvent) -> bool {
    !key
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER)
}

fn list_action(key: KeyEvent) -> Option<Action> {
    if key.code == KeyCode::Char('r') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::Refresh);
    }
    if !is_plain(&key) {
        return None;
    }
    let action = match key.code {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Char('j') | KeyCode::Down => Action::SelectNext,
        KeyCode::Char('k') | KeyCode::Up => Action::SelectPrevious,
        KeyCode::Enter => Action::OpenSelected,
        KeyCode::Char('a') => Action::NewNote,
        KeyCode::Char('/') => Action::StartSearch,
        KeyCode::Char('t') => Action::CycleTag,
        KeyCode::Char('P') => Action::TogglePinnedOnly,
        KeyCode::Char('p') => Action::TogglePin,
        KeyCode::Char('d') => Action::DeleteNote,
        KeyCode::Char('S') => Action::SeedSamples,
        KeyCode::Char('D') => Action::DeleteAll,
        _ => return None,
    };
    Some(action)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen).context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).context("restoring screen state")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigPaths, StorageOptions};
    use crate::storage::{self, NewNote};
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn app() -> anyhow::Result<(TempDir, App)> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::under(temp.path());
        let storage = storage::init(&StorageOptions::for_paths(&paths))?;
        let app = App::new(Arc::new(AppConfig::default()), storage)?;
        Ok((temp, app))
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn ctrl(app: &mut App, ch: char) {
        app.handle_key(KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL));
    }

    fn type_text(app: &mut App, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    fn only_note(app: &App) -> anyhow::Result<Note> {
        let mut notes = app.storage.fetch_all()?;
        anyhow::ensure!(notes.len() == 1, "expected one note, found {}", notes.len());
        Ok(notes.remove(0))
    }

    #[test]
    fn new_note_is_edited_and_listed_after_close() -> anyhow::Result<()> {
        let (_temp, mut app) = app()?;
        press(&mut app, KeyCode::Char('a'));
        assert_eq!(app.state().screen(), Screen::Editor);

        type_text(&mut app, "Hi");
        assert_eq!(only_note(&app)?.body(), "Hi");

        press(&mut app, KeyCode::BackTab);
        app.handle_key(KeyEvent::new(KeyCode::Home, KeyModifiers::SHIFT));
        type_text(&mut app, "Greeting");
        assert_eq!(only_note(&app)?.title, "Greeting");

        press(&mut app, KeyCode::Esc);
        assert_eq!(app.state().screen(), Screen::List);
        let selected = app.state().list.selected_note().map(|note| note.title.clone());
        assert_eq!(selected.as_deref(), Some("Greeting"));
        Ok(())
    }

    #[test]
    fn tag_field_applies_on_enter() -> anyhow::Result<()> {
        let (_temp, mut app) = app()?;
        press(&mut app, KeyCode::Char('a'));
        press(&mut app, KeyCode::Tab);
        type_text(&mut app, "work, , rust");
        assert!(only_note(&app)?.tags.is_empty());
        press(&mut app, KeyCode::Enter);
        assert_eq!(only_note(&app)?.tags, vec!["work", "rust"]);
        assert_eq!(app.state().status_message(), Some("Tags applied"));
        Ok(())
    }

    #[test]
    fn delete_all_requires_confirmation() -> anyhow::Result<()> {
        let (_temp, mut app) = app()?;
        press(&mut app, KeyCode::Char('S'));
        assert!(!app.state().list.notes().is_empty());

        press(&mut app, KeyCode::Char('D'));
        assert_matches!(app.state().overlay(), Some(Overlay::ConfirmDeleteAll { .. }));
        press(&mut app, KeyCode::Char('n'));
        assert!(app.state().overlay().is_none());
        assert!(!app.state().list.notes().is_empty());

        press(&mut app, KeyCode::Char('D'));
        press(&mut app, KeyCode::Char('y'));
        assert!(app.state().list.notes().is_empty());
        assert!(app.storage.fetch_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn list_keys_replace_the_previous_status() -> anyhow::Result<()> {
        let (_temp, mut app) = app()?;
        press(&mut app, KeyCode::Char('S'));
        assert_matches!(app.state().status_message(), Some(message) if message.starts_with("Added"));
        press(&mut app, KeyCode::Char('j'));
        assert_eq!(app.state().status_message(), None);
        Ok(())
    }

    #[test]
    fn search_mode_filters_until_cancelled() -> anyhow::Result<()> {
        let (_temp, mut app) = app()?;
        app.storage.create(NewNote {
            content: Some("Apples\nMilk".into()),
            ..NewNote::titled("Groceries")
        })?;
        app.storage.create(NewNote::titled("Journal"))?;
        app.on_tick();

        press(&mut app, KeyCode::Char('/'));
        type_text(&mut app, "milk");
        let visible: Vec<_> = app
            .state()
            .list
            .visible_notes()
            .into_iter()
            .map(|note| note.title.clone())
            .collect();
        assert_eq!(visible, vec!["Groceries"]);
        assert_eq!(app.state().screen(), Screen::List);

        press(&mut app, KeyCode::Esc);
        assert_eq!(app.state().list.visible_notes().len(), 2);
        Ok(())
    }

    #[test]
    fn editor_shortcuts_pin_template_and_delete() -> anyhow::Result<()> {
        let (_temp, mut app) = app()?;
        press(&mut app, KeyCode::Char('a'));
        ctrl(&mut app, 'p');
        assert!(only_note(&app)?.is_pinned);
        ctrl(&mut app, 't');
        assert_eq!(only_note(&app)?.body(), editor::TEMPLATE);

        ctrl(&mut app, 'd');
        assert_matches!(app.state().overlay(), Some(Overlay::ConfirmDeleteNote { title }) if title == UNTITLED);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.state().screen(), Screen::List);
        assert!(app.storage.fetch_all()?.is_empty());
        Ok(())
    }
}
