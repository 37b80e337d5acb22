use crossbeam_channel::Receiver;

use crate::search::{self, NoteFilter};
use crate::storage::{NewNote, Note, StorageHandle, StoreEvent, StoreResult};

/// Snapshot of the store plus the list filters and selection. The snapshot
/// only changes through [`NoteListController::sync`] or
/// [`NoteListController::refresh`].
pub struct NoteListController {
    notes: Vec<Note>,
    filter: NoteFilter,
    selected: usize,
    events: Receiver<StoreEvent>,
    status: Option<String>,
}

impl NoteListController {
    pub fn new(storage: &StorageHandle) -> StoreResult<Self> {
        let events = storage.subscribe();
        let notes = storage.fetch_all()?;
        Ok(Self {
            notes,
            filter: NoteFilter::default(),
            selected: 0,
            events,
            status: None,
        })
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn filter(&self) -> &NoteFilter {
        &self.filter
    }

    pub fn visible_notes(&self) -> Vec<&Note> {
        self.filter.apply(&self.notes)
    }

    pub fn unique_tags(&self) -> Vec<String> {
        search::unique_tags(&self.notes)
    }

    /// Drains pending store events and reloads the snapshot if any arrived.
    pub fn sync(&mut self, storage: &StorageHandle) -> bool {
        let mut changed = false;
        for event in self.events.try_iter() {
            tracing::trace!(?event, "store event");
            changed = true;
        }
        if changed {
            if let Err(err) = self.refresh(storage) {
                self.report("Refreshing notes", &err);
            }
        }
        changed
    }

    pub fn refresh(&mut self, storage: &StorageHandle) -> StoreResult<()> {
        let selected_id = self.selected_note().map(|note| note.id.clone());
        self.notes = storage.fetch_all()?;
        match selected_id {
            Some(id) => {
                if !self.select_id(&id) {
                    self.clamp_selection();
                }
            }
            None => self.clamp_selection(),
        }
        Ok(())
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_note(&self) -> Option<&Note> {
        self.visible_notes().into_iter().nth(self.selected)
    }

    pub fn move_selection(&mut self, delta: isize) {
        let len = self.visible_notes().len();
        if len == 0 {
            self.selected = 0;
            return;
        }
        let next = self.selected as isize + delta;
        self.selected = next.clamp(0, len as isize - 1) as usize;
    }

    pub fn select_id(&mut self, id: &str) -> bool {
        match self.visible_notes().iter().position(|note| note.id == id) {
            Some(idx) => {
                self.selected = idx;
                true
            }
            None => false,
        }
    }

    pub fn push_search_char(&mut self, ch: char) {
        self.filter.search_text.push(ch);
        self.selected = 0;
    }

    pub fn pop_search_char(&mut self) {
        self.filter.search_text.pop();
        self.selected = 0;
    }

    pub fn set_search_text(&mut self, text: impl Into<String>) {
        self.filter.search_text = text.into();
        self.selected = 0;
    }

    pub fn select_tag(&mut self, tag: Option<String>) {
        self.filter.selected_tag = tag;
        self.selected = 0;
    }

    /// Steps the tag filter through `unique_tags()` in order, then back to none.
    pub fn cycle_tag(&mut self) {
        let tags = self.unique_tags();
        let next = match &self.filter.selected_tag {
            None => tags.first().cloned(),
            Some(current) => tags
                .iter()
                .position(|tag| tag == current)
                .and_then(|idx| tags.get(idx + 1))
                .cloned(),
        };
        self.select_tag(next);
    }

    pub fn toggle_pinned_only(&mut self) {
        self.filter.pinned_only = !self.filter.pinned_only;
        self.selected = 0;
    }

    pub fn new_note(&mut self, storage: &StorageHandle) -> Option<Note> {
        match storage.create(NewNote::default()) {
            Ok(note) => Some(note),
            Err(err) => {
                self.report("Creating a note", &err);
                None
            }
        }
    }

    pub fn toggle_pin_selected(&mut self, storage: &StorageHandle) {
        let Some((id, pinned)) = self
            .selected_note()
            .map(|note| (note.id.clone(), !note.is_pinned))
        else {
            return;
        };
        match storage.set_pinned(&id, pinned) {
            Ok(note) => {
                let state = if note.is_pinned { "Pinned" } else { "Unpinned" };
                self.set_status(format!("{state} \"{}\"", note.title));
            }
            Err(err) => self.report("Pinning the note", &err),
        }
    }

    pub fn delete_selected(&mut self, storage: &StorageHandle) {
        let Some((id, title)) = self
            .selected_note()
            .map(|note| (note.id.clone(), note.title.clone()))
        else {
            return;
        };
        match storage.delete(&id) {
            Ok(()) => self.set_status(format!("Deleted \"{title}\"")),
            Err(err) => self.report("Deleting the note", &err),
        }
    }

    pub fn seed_sample_data(&mut self, storage: &StorageHandle) {
        match storage.seed_sample_notes() {
            Ok(notes) => self.set_status(format!("Added {} sample notes", notes.len())),
            Err(err) => self.report("Adding sample notes", &err),
        }
    }

    pub fn delete_all(&mut self, storage: &StorageHandle) {
        match storage.delete_all() {
            Ok(removed) => self.set_status(format!("Deleted {removed} notes")),
            Err(err) => self.report("Deleting all notes", &err),
        }
    }

    fn report(&mut self, action: &str, err: &dyn std::error::Error) {
        tracing::error!(%err, "{action} failed");
        self.set_status(format!("{action} failed: {err}"));
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_notes().len();
        self.selected = self.selected.min(len.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigPaths, StorageOptions};
    use crate::storage;
    use tempfile::TempDir;

    fn init_storage() -> anyhow::Result<(TempDir, StorageHandle)> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::under(temp.path());
        let storage = storage::init(&StorageOptions::for_paths(&paths))?;
        Ok((temp, storage))
    }

    fn visible_titles(list: &NoteListController) -> Vec<String> {
        list.visible_notes()
            .into_iter()
            .map(|note| note.title.clone())
            .collect()
    }

    #[test]
    fn snapshot_follows_store_events() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut list = NoteListController::new(&storage)?;
        assert!(list.notes().is_empty());
        assert!(!list.sync(&storage));

        storage.create(NewNote::titled("Outside"))?;
        assert!(list.notes().is_empty());
        assert!(list.sync(&storage));
        assert_eq!(visible_titles(&list), vec!["Outside"]);
        Ok(())
    }

    #[test]
    fn search_scenario_finds_apples() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.create(NewNote {
            content: Some("Apples\nMilk".into()),
            ..NewNote::titled("Groceries")
        })?;
        storage.create(NewNote {
            content: Some("Felt good".into()),
            ..NewNote::titled("Journal")
        })?;
        let mut list = NoteListController::new(&storage)?;
        list.set_search_text("apples");
        assert_eq!(visible_titles(&list), vec!["Groceries"]);
        list.set_search_text("");
        assert_eq!(visible_titles(&list), vec!["Journal", "Groceries"]);
        Ok(())
    }

    #[test]
    fn pinning_moves_a_note_ahead_of_newer_ones() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.create(NewNote::titled("B"))?;
        storage.create(NewNote::titled("A"))?;
        let mut list = NoteListController::new(&storage)?;
        assert_eq!(visible_titles(&list), vec!["A", "B"]);

        list.move_selection(1);
        list.toggle_pin_selected(&storage);
        list.sync(&storage);
        assert_eq!(visible_titles(&list), vec!["B", "A"]);
        assert_eq!(list.selected_note().map(|note| note.title.as_str()), Some("B"));
        assert_eq!(list.status(), Some("Pinned \"B\""));

        list.toggle_pinned_only();
        assert_eq!(visible_titles(&list), vec!["B"]);

        list.toggle_pin_selected(&storage);
        list.sync(&storage);
        assert!(list.visible_notes().is_empty());
        assert_eq!(list.status(), Some("Unpinned \"B\""));
        Ok(())
    }

    #[test]
    fn cycle_tag_walks_unique_tags_then_clears() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.create(NewNote {
            tags: vec!["work".into(), "rust".into()],
            ..NewNote::titled("Roadmap")
        })?;
        storage.create(NewNote {
            tags: vec!["life".into()],
            ..NewNote::titled("Journal")
        })?;
        let mut list = NoteListController::new(&storage)?;
        assert_eq!(list.unique_tags(), vec!["life", "rust", "work"]);

        let mut seen = Vec::new();
        for _ in 0..4 {
            list.cycle_tag();
            seen.push(list.filter().selected_tag.clone());
        }
        assert_eq!(
            seen,
            vec![
                Some("life".to_string()),
                Some("rust".to_string()),
                Some("work".to_string()),
                None
            ]
        );
        Ok(())
    }

    #[test]
    fn list_actions_update_the_snapshot() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut list = NoteListController::new(&storage)?;

        list.seed_sample_data(&storage);
        list.sync(&storage);
        let seeded = list.notes().len();
        assert!(seeded > 0);
        assert_eq!(list.status(), Some(format!("Added {seeded} sample notes").as_str()));

        let created = list.new_note(&storage).map(|note| note.id);
        list.sync(&storage);
        assert_eq!(list.notes().len(), seeded + 1);
        let created = created.ok_or_else(|| anyhow::anyhow!("note not created"))?;
        assert!(list.select_id(&created));

        list.delete_selected(&storage);
        list.sync(&storage);
        assert_eq!(list.notes().len(), seeded);
        assert!(list.notes().iter().all(|note| note.id != created));

        list.delete_all(&storage);
        list.sync(&storage);
        assert!(list.notes().is_empty());
        assert!(list.unique_tags().is_empty());
        assert!(list.selected_note().is_none());
        Ok(())
    }

    #[test]
    fn selection_stays_in_bounds() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        for title in ["one", "two", "three"] {
            storage.create(NewNote::titled(title))?;
        }
        let mut list = NoteListController::new(&storage)?;
        list.move_selection(10);
        assert_eq!(list.selected_index(), 2);
        list.move_selection(-10);
        assert_eq!(list.selected_index(), 0);

        list.set_search_text("nothing matches");
        assert!(list.selected_note().is_none());
        list.move_selection(1);
        assert_eq!(list.selected_index(), 0);
        Ok(())
    }
}
