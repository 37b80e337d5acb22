use strum::Display;

use super::editor::NoteEditorController;
use super::list::NoteListController;
use crate::config::themes::Palette;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    List,
    Editor,
}

/// Which half of the editor is shown when the terminal is too narrow for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EditorPane {
    Source,
    Preview,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlay {
    ConfirmDeleteAll { count: usize },
    ConfirmDeleteNote { title: String },
}

pub struct AppState {
    pub list: NoteListController,
    editor: Option<NoteEditorController>,
    overlay: Option<Overlay>,
    search_active: bool,
    pane: EditorPane,
    palette: Palette,
    wide_layout_min_width: u16,
}

impl AppState {
    pub fn new(list: NoteListController, palette: Palette, wide_layout_min_width: u16) -> Self {
        Self {
            list,
            editor: None,
            overlay: None,
            search_active: false,
            pane: EditorPane::Source,
            palette,
            wide_layout_min_width,
        }
    }

    pub fn screen(&self) -> Screen {
        if self.editor.is_some() {
            Screen::Editor
        } else {
            Screen::List
        }
    }

    pub fn is_editing(&self) -> bool {
        self.editor.is_some()
    }

    pub fn editor(&self) -> Option<&NoteEditorController> {
        self.editor.as_ref()
    }

    pub fn editor_mut(&mut self) -> Option<&mut NoteEditorController> {
        self.editor.as_mut()
    }

    pub fn open_editor(&mut self, editor: NoteEditorController) {
        self.search_active = false;
        self.pane = EditorPane::Source;
        self.editor = Some(editor);
    }

    pub fn close_editor(&mut self) -> Option<NoteEditorController> {
        self.editor.take()
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn open_overlay(&mut self, overlay: Overlay) {
        self.overlay = Some(overlay);
    }

    pub fn close_overlay(&mut self) -> Option<Overlay> {
        self.overlay.take()
    }

    pub fn is_search_active(&self) -> bool {
        self.search_active
    }

    pub fn begin_search(&mut self) {
        self.search_active = true;
    }

    /// Leaves search input mode, keeping the query as the active filter.
    pub fn finish_search(&mut self) {
        self.search_active = false;
    }

    pub fn cancel_search(&mut self) {
        self.search_active = false;
        self.list.set_search_text("");
    }

    pub fn pane(&self) -> EditorPane {
        self.pane
    }

    pub fn toggle_pane(&mut self) -> EditorPane {
        self.pane = match self.pane {
            EditorPane::Source => EditorPane::Preview,
            EditorPane::Preview => EditorPane::Source,
        };
        self.pane
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Wide terminals show the edit and preview panes side by side.
    pub fn is_wide(&self, width: u16) -> bool {
        width >= self.wide_layout_min_width
    }

    pub fn status_message(&self) -> Option<&str> {
        self.list.status()
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.list.set_status(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigPaths, StorageOptions, ThemeName};
    use crate::storage;
    use tempfile::TempDir;

    fn state() -> anyhow::Result<(TempDir, AppState)> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::under(temp.path());
        let storage = storage::init(&StorageOptions::for_paths(&paths))?;
        let list = NoteListController::new(&storage)?;
        Ok((temp, AppState::new(list, Palette::for_theme(ThemeName::Dark), 100)))
    }

    #[test]
    fn cancel_search_clears_the_query() -> anyhow::Result<()> {
        let (_temp, mut state) = state()?;
        state.begin_search();
        state.list.push_search_char('m');
        state.finish_search();
        assert!(!state.is_search_active());
        assert_eq!(state.list.filter().search_text, "m");

        state.begin_search();
        state.cancel_search();
        assert!(state.list.filter().search_text.is_empty());
        Ok(())
    }

    #[test]
    fn layout_width_threshold_and_pane_toggle() -> anyhow::Result<()> {
        let (_temp, mut state) = state()?;
        assert!(state.is_wide(100));
        assert!(!state.is_wide(99));
        assert_eq!(state.pane(), EditorPane::Source);
        assert_eq!(state.toggle_pane(), EditorPane::Preview);
        assert_eq!(state.toggle_pane(), EditorPane::Source);
        assert_eq!(state.screen(), Screen::List);
        Ok(())
    }
}
