use std::sync::Arc;
use std::time::Duration;

use ratatui::text::Text;
use strum::{Display, EnumIter, IntoEnumIterator};

use super::autosave::{CommitScheduler, CommitStatus};
use super::text_field::TextField;
use crate::config::themes::Palette;
use crate::highlight::{self, StyledSegment};
use crate::preview::{self, Preview, Renderer};
use crate::search::{format_tag_field, parse_tag_field};
use crate::storage::{Note, StorageHandle, StoreResult};

/// Appended to the body by `insert_template`.
pub const TEMPLATE: &str = "## Section

- [ ] Task
- Item

**Bold**, *italic* and `code`.

```
code block
```

> Quote

[Link](https://example.com)
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum EditorField {
    Title,
    Body,
    Tags,
}

impl EditorField {
    pub fn next(self) -> Self {
        Self::iter()
            .cycle()
            .skip_while(|field| *field != self)
            .nth(1)
            .unwrap_or(self)
    }

    pub fn prev(self) -> Self {
        Self::iter()
            .rev()
            .cycle()
            .skip_while(|field| *field != self)
            .nth(1)
            .unwrap_or(self)
    }
}

/// Draft state for the note being edited. The store is written through
/// [`StorageHandle`]; drafts are never rewritten from the store after `load`.
pub struct NoteEditorController {
    note_id: String,
    is_pinned: bool,
    title: TextField,
    body: TextField,
    tags: TextField,
    focus: EditorField,
    segments: Vec<StyledSegment>,
    preview: Preview,
    renderer: Arc<dyn Renderer + Send + Sync>,
    palette: Palette,
    commits: CommitScheduler,
}

impl NoteEditorController {
    pub fn open(
        note: &Note,
        renderer: Arc<dyn Renderer + Send + Sync>,
        palette: Palette,
        debounce: Duration,
    ) -> Self {
        let mut editor = Self {
            note_id: String::new(),
            is_pinned: false,
            title: TextField::default(),
            body: TextField::default(),
            tags: TextField::default(),
            focus: EditorField::Body,
            segments: Vec::new(),
            preview: Preview::Rendered(Text::default()),
            renderer,
            palette,
            commits: CommitScheduler::new(debounce),
        };
        editor.load(note);
        editor
    }

    /// Replaces every draft with the note's stored fields. Callers flush the
    /// previous note first.
    pub fn load(&mut self, note: &Note) {
        self.note_id = note.id.clone();
        self.is_pinned = note.is_pinned;
        self.title = TextField::new(note.title.clone());
        self.body = TextField::new(note.body());
        self.tags = TextField::new(format_tag_field(&note.tags));
        self.focus = EditorField::Body;
        self.commits.reset();
        self.restyle();
    }

    pub fn note_id(&self) -> &str {
        &self.note_id
    }

    pub fn is_pinned(&self) -> bool {
        self.is_pinned
    }

    pub fn title_draft(&self) -> &str {
        self.title.text()
    }

    pub fn body_draft(&self) -> &str {
        self.body.text()
    }

    pub fn tag_field_draft(&self) -> &str {
        self.tags.text()
    }

    pub fn field(&self, field: EditorField) -> &TextField {
        match field {
            EditorField::Title => &self.title,
            EditorField::Body => &self.body,
            EditorField::Tags => &self.tags,
        }
    }

    pub fn focus(&self) -> EditorField {
        self.focus
    }

    pub fn set_focus(&mut self, field: EditorField) {
        self.focus = field;
    }

    pub fn segments(&self) -> &[StyledSegment] {
        &self.segments
    }

    pub fn highlighted_body(&self) -> Text<'static> {
        highlight::to_text(self.body.text(), &self.segments, &self.palette)
    }

    pub fn preview(&self) -> &Preview {
        &self.preview
    }

    pub fn commit_status(&self) -> CommitStatus {
        self.commits.status()
    }

    /// Runs `edit` against the focused field. Title and body changes go
    /// through [`Self::on_title_or_body_change`]; the tag field only reaches
    /// the store through [`Self::apply_tags`].
    pub fn edit_focused<F>(&mut self, storage: &StorageHandle, edit: F) -> bool
    where
        F: FnOnce(&mut TextField) -> bool,
    {
        let changed = edit(self.focused_field_mut());
        if changed && self.focus != EditorField::Tags {
            self.on_title_or_body_change(storage);
        }
        changed
    }

    /// Caret and selection movement in the focused field. Never schedules a commit.
    pub fn navigate<F>(&mut self, motion: F) -> bool
    where
        F: FnOnce(&mut TextField) -> bool,
    {
        motion(self.focused_field_mut())
    }

    pub fn set_title_draft(&mut self, storage: &StorageHandle, title: &str) {
        self.title.set_text(title);
        self.on_title_or_body_change(storage);
    }

    pub fn set_body_draft(&mut self, storage: &StorageHandle, body: &str) {
        self.body.set_text(body);
        self.on_title_or_body_change(storage);
    }

    pub fn set_tag_field_draft(&mut self, tags: &str) {
        self.tags.set_text(tags);
    }

    pub fn on_title_or_body_change(&mut self, storage: &StorageHandle) {
        self.restyle();
        self.commits.mark_dirty();
        if self.commits.is_immediate() {
            self.commit(storage);
        }
    }

    /// Commits a deferred draft once its debounce window has passed.
    pub fn poll(&mut self, storage: &StorageHandle) {
        if self.commits.is_due() {
            self.commit(storage);
        }
    }

    /// Forces any pending draft commit.
    pub fn flush(&mut self, storage: &StorageHandle) {
        if self.commits.is_dirty() {
            self.commit(storage);
        }
    }

    pub fn apply_tags(&mut self, storage: &StorageHandle) -> Option<Note> {
        self.flush(storage);
        let tags = parse_tag_field(self.tags.text());
        self.write(storage, "applying tags", move |note| note.tags = tags)
    }

    pub fn toggle_pin(&mut self, storage: &StorageHandle) -> Option<Note> {
        self.flush(storage);
        let pinned = !self.is_pinned;
        self.write(storage, "toggling pin", move |note| note.is_pinned = pinned)
    }

    pub fn insert_template(&mut self, storage: &StorageHandle) {
        let body = if self.body.text().is_empty() {
            TEMPLATE.to_string()
        } else {
            format!("{}\n\n{TEMPLATE}", self.body.text())
        };
        self.body.set_text(body);
        self.body.move_to_end();
        self.on_title_or_body_change(storage);
    }

    /// Removes the note. Pending drafts are discarded; the caller closes the editor.
    pub fn delete(&mut self, storage: &StorageHandle) -> StoreResult<()> {
        self.commits.reset();
        storage.delete(&self.note_id)
    }

    fn focused_field_mut(&mut self) -> &mut TextField {
        match self.focus {
            EditorField::Title => &mut self.title,
            EditorField::Body => &mut self.body,
            EditorField::Tags => &mut self.tags,
        }
    }

    fn restyle(&mut self) {
        self.segments = highlight::highlight_markdown(self.body.text());
        self.preview =
            preview::render_preview(self.renderer.as_ref(), self.body.text(), &self.palette);
    }

    fn commit(&mut self, storage: &StorageHandle) -> Option<Note> {
        let title = self.title.text().to_string();
        let body = self.body.text().to_string();
        self.write(storage, "committing draft", move |note| {
            note.title = title;
            note.content = if body.is_empty() && note.content.is_none() {
                None
            } else {
                Some(body)
            };
        })
    }

    fn write<F>(&mut self, storage: &StorageHandle, action: &'static str, mutator: F) -> Option<Note>
    where
        F: FnOnce(&mut Note),
    {
        match storage.update(&self.note_id, mutator) {
            Ok(note) => {
                self.is_pinned = note.is_pinned;
                self.commits.mark_saved(note.updated_at);
                Some(note)
            }
            Err(err) => {
                tracing::warn!(?err, note_id = %self.note_id, "{action} failed");
                self.commits.record_failure(err.to_string());
                None
            }
        }
    }
}
