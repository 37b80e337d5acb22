use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use rusqlite::config::DbConfig;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::StorageOptions;

mod errors;
mod schema;

pub use errors::{StoreError, StoreResult};
use errors::{query_error, write_error};

/// Title stored for notes whose title is blank.
pub const UNTITLED: &str = "Untitled";

const NOTE_COLUMNS: &str = "id, title, content, created_at, updated_at, pinned";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub tags: Vec<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub is_pinned: bool,
}

impl Note {
    pub fn body(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// Field values for a note that does not exist yet.
#[derive(Debug, Clone, Default)]
pub struct NewNote {
    pub title: String,
    pub content: Option<String>,
    pub tags: Vec<String>,
    pub pinned: bool,
}

impl NewNote {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Created { id: String },
    Updated { id: String },
    Deleted { id: String },
    Cleared { removed: usize },
    Seeded { count: usize },
}

#[derive(Clone)]
pub struct StorageHandle {
    conn: Arc<Mutex<Connection>>,
    subscribers: Arc<Mutex<Vec<Sender<StoreEvent>>>>,
    last_stamp: Arc<Mutex<i64>>,
}

impl StorageHandle {
    pub fn with_connection<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Every committed mutation is delivered to each receiver, in commit order.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn fetch_all(&self) -> StoreResult<Vec<Note>> {
        self.with_connection(|conn| {
            let sql = format!(
                "SELECT {NOTE_COLUMNS}
                 FROM notes
                 ORDER BY pinned DESC, updated_at DESC, rowid DESC"
            );
            let mut stmt = conn.prepare(&sql).map_err(query_error("listing notes"))?;
            let mut notes = stmt
                .query_map([], note_from_row)
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                .map_err(query_error("listing notes"))?;
            let mut tags = load_tags(conn, None)?;
            for note in &mut notes {
                note.tags = tags.remove(&note.id).unwrap_or_default();
            }
            Ok(notes)
        })
    }

    pub fn fetch(&self, id: &str) -> StoreResult<Option<Note>> {
        self.with_connection(|conn| fetch_note(conn, id))
    }

    pub fn create(&self, fields: NewNote) -> StoreResult<Note> {
        self.mutate("inserting note", |conn, stamp| {
            let now = stamp();
            let note = Note {
                id: Uuid::new_v4().to_string(),
                title: normalize_title(fields.title),
                content: fields.content,
                tags: fields.tags,
                created_at: now,
                updated_at: now,
                is_pinned: fields.pinned,
            };
            insert_note(conn, &note)?;
            let event = StoreEvent::Created {
                id: note.id.clone(),
            };
            Ok((note, event))
        })
    }

    /// Applies `mutator` to the stored note and persists the result. The id and
    /// creation time are kept regardless of what the mutator does to them.
    pub fn update<F>(&self, id: &str, mutator: F) -> StoreResult<Note>
    where
        F: FnOnce(&mut Note),
    {
        self.mutate("updating note", |conn, stamp| {
            let current = fetch_note(conn, id)?.ok_or_else(|| StoreError::NotFound {
                id: id.to_string(),
            })?;
            let mut next = current.clone();
            mutator(&mut next);
            next.id = current.id;
            next.created_at = current.created_at;
            next.title = normalize_title(next.title);
            next.updated_at = stamp();

            conn.execute(
                "UPDATE notes
                 SET title = ?1, content = ?2, pinned = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![
                    next.title,
                    next.content,
                    next.is_pinned,
                    to_nanos(next.updated_at),
                    next.id
                ],
            )
            .map_err(write_error("updating note"))?;
            replace_tags(conn, &next.id, &next.tags)?;
            let event = StoreEvent::Updated {
                id: next.id.clone(),
            };
            Ok((next, event))
        })
    }

    pub fn set_pinned(&self, id: &str, pinned: bool) -> StoreResult<Note> {
        self.update(id, |note| note.is_pinned = pinned)
    }

    pub fn toggle_pinned(&self, id: &str) -> StoreResult<Note> {
        self.update(id, |note| note.is_pinned = !note.is_pinned)
    }

    pub fn delete(&self, id: &str) -> StoreResult<()> {
        self.mutate("deleting note", |conn, _| {
            let removed = conn
                .execute("DELETE FROM notes WHERE id = ?1", params![id])
                .map_err(write_error("deleting note"))?;
            if removed == 0 {
                return Err(StoreError::NotFound { id: id.to_string() });
            }
            prune_orphan_tags(conn)?;
            Ok(((), StoreEvent::Deleted { id: id.to_string() }))
        })
    }

    pub fn delete_all(&self) -> StoreResult<usize> {
        self.mutate("deleting all notes", |conn, _| {
            let removed = conn
                .execute("DELETE FROM notes", [])
                .map_err(write_error("deleting all notes"))?;
            prune_orphan_tags(conn)?;
            Ok((removed, StoreEvent::Cleared { removed }))
        })
    }

    pub fn seed_sample_notes(&self) -> StoreResult<Vec<Note>> {
        self.mutate("seeding sample notes", |conn, stamp| {
            let mut created = Vec::with_capacity(SAMPLE_NOTES.len());
            for sample in SAMPLE_NOTES {
                let now = stamp();
                let note = Note {
                    id: Uuid::new_v4().to_string(),
                    title: sample.title.to_string(),
                    content: Some(sample.body.to_string()),
                    tags: sample.tags.iter().map(|tag| tag.to_string()).collect(),
                    created_at: now,
                    updated_at: now,
                    is_pinned: sample.pinned,
                };
                insert_note(conn, &note)?;
                created.push(note);
            }
            tracing::info!(count = created.len(), "seeded sample notes");
            let count = created.len();
            Ok((created, StoreEvent::Seeded { count }))
        })
    }

    pub fn list_tags(&self) -> StoreResult<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT name FROM tags ORDER BY name")
                .map_err(query_error("listing tags"))?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
                .map_err(query_error("listing tags"))?;
            Ok(rows)
        })
    }

    /// Runs `f` inside one transaction under the connection lock, then publishes
    /// its event while the lock is still held so delivery order matches commit order.
    fn mutate<F, T>(&self, action: &'static str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection, &mut dyn FnMut() -> OffsetDateTime) -> StoreResult<(T, StoreEvent)>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(write_error(action))?;
        let mut stamp = || self.next_timestamp();
        let (value, event) = f(&tx, &mut stamp)?;
        tx.commit().map_err(write_error(action))?;
        tracing::debug!(?event, "committed {action}");
        self.publish(event);
        Ok(value)
    }

    fn publish(&self, event: StoreEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Timestamps from one handle are strictly increasing, so edit order
    /// survives clocks coarser than the edit rate.
    fn next_timestamp(&self) -> OffsetDateTime {
        let mut last = self.last_stamp.lock();
        let now = to_nanos(OffsetDateTime::now_utc());
        let stamp = now.max(last.saturating_add(1));
        *last = stamp;
        from_nanos(stamp).unwrap_or_else(|_| OffsetDateTime::now_utc())
    }
}

/// Opens (creating when needed) the database named by `options`. Failure here
/// is unrecoverable for the application.
pub fn init(options: &StorageOptions) -> StoreResult<StorageHandle> {
    let db_path = &options.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let open_error = |source| StoreError::Open {
        path: db_path.clone(),
        source,
    };
    let conn = Connection::open(db_path).map_err(open_error)?;
    prepare_connection(&conn, options).map_err(open_error)?;
    schema::apply(&conn).map_err(open_error)?;
    let last_stamp: Option<i64> = conn
        .query_row("SELECT MAX(updated_at) FROM notes", [], |row| row.get(0))
        .map_err(open_error)?;
    tracing::info!(path = %db_path.display(), "note store opened");
    Ok(StorageHandle {
        conn: Arc::new(Mutex::new(conn)),
        subscribers: Arc::new(Mutex::new(Vec::new())),
        last_stamp: Arc::new(Mutex::new(last_stamp.unwrap_or_default())),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> rusqlite::Result<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "wal_autocheckpoint", storage.wal_autocheckpoint)?;
    Ok(())
}

fn normalize_title(title: String) -> String {
    if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

fn to_nanos(ts: OffsetDateTime) -> i64 {
    ts.unix_timestamp_nanos() as i64
}

fn from_nanos(raw: i64) -> Result<OffsetDateTime, time::error::ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(raw))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    from_nanos(row.get(idx)?)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(err)))
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        tags: Vec::new(),
        created_at: timestamp_column(row, 3)?,
        updated_at: timestamp_column(row, 4)?,
        is_pinned: row.get::<_, i64>(5)? != 0,
    })
}

fn fetch_note(conn: &Connection, id: &str) -> StoreResult<Option<Note>> {
    let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1");
    let note = conn
        .query_row(&sql, params![id], note_from_row)
        .optional()
        .map_err(query_error("fetching note"))?;
    let Some(mut note) = note else {
        return Ok(None);
    };
    note.tags = load_tags(conn, Some(id))?.remove(id).unwrap_or_default();
    Ok(Some(note))
}

fn load_tags(conn: &Connection, note_id: Option<&str>) -> StoreResult<HashMap<String, Vec<String>>> {
    let mut stmt = conn
        .prepare(
            "SELECT nt.note_id, t.name
             FROM note_tags nt
             INNER JOIN tags t ON t.id = nt.tag_id
             WHERE ?1 IS NULL OR nt.note_id = ?1
             ORDER BY nt.note_id, nt.position",
        )
        .map_err(query_error("loading tags"))?;
    let rows = stmt
        .query_map(params![note_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(query_error("loading tags"))?;
    let mut tags: HashMap<String, Vec<String>> = HashMap::new();
    for (note_id, name) in rows {
        tags.entry(note_id).or_default().push(name);
    }
    Ok(tags)
}

fn insert_note(conn: &Connection, note: &Note) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO notes (id, title, content, created_at, updated_at, pinned)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            note.id,
            note.title,
            note.content,
            to_nanos(note.created_at),
            to_nanos(note.updated_at),
            note.is_pinned
        ],
    )
    .map_err(write_error("inserting note"))?;
    replace_tags(conn, &note.id, &note.tags)
}

fn replace_tags(conn: &Connection, note_id: &str, tags: &[String]) -> StoreResult<()> {
    conn.execute("DELETE FROM note_tags WHERE note_id = ?1", params![note_id])
        .map_err(write_error("clearing note tags"))?;
    for (position, tag) in tags.iter().enumerate() {
        let tag_id = match conn
            .query_row("SELECT id FROM tags WHERE name = ?1", params![tag], |row| {
                row.get::<_, i64>(0)
            })
            .optional()
            .map_err(query_error("looking up tag"))?
        {
            Some(id) => id,
            None => {
                conn.execute("INSERT INTO tags (name) VALUES (?1)", params![tag])
                    .map_err(write_error("inserting tag"))?;
                conn.last_insert_rowid()
            }
        };
        conn.execute(
            "INSERT INTO note_tags (note_id, position, tag_id) VALUES (?1, ?2, ?3)",
            params![note_id, position as i64, tag_id],
        )
        .map_err(write_error("linking tag to note"))?;
    }
    prune_orphan_tags(conn)
}

fn prune_orphan_tags(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM tags WHERE id NOT IN (SELECT DISTINCT tag_id FROM note_tags)",
        [],
    )
    .map_err(write_error("pruning unused tags"))?;
    Ok(())
}

struct SampleNote {
    title: &'static str,
    body: &'static str,
    tags: &'static [&'static str],
    pinned: bool,
}

const SAMPLE_NOTES: &[SampleNote] = &[
    SampleNote {
        title: "Welcome to mdnotes",
        body: r#"# Welcome to mdnotes

Notes are written in **Markdown**. The editor highlights headings and `inline code`
while the preview pane renders the full document.

- Press `/` in the list to search titles and bodies
- Press `t` to step through tags, `P` to show pinned notes only
- Press `Ctrl-t` in the editor to insert a template
"#,
        tags: &["guide"],
        pinned: true,
    },
    SampleNote {
        title: "Groceries",
        body: "## This week\n\n- Apples\n- Milk\n- Coffee beans\n",
        tags: &["personal", "shopping"],
        pinned: false,
    },
    SampleNote {
        title: "Journal",
        body: "Felt good today. Finished the `storage` refactor and went for a long walk.\n",
        tags: &["journal", "life"],
        pinned: false,
    },
    SampleNote {
        title: "Rust snippets",
        body: r#"# Iterators

Use `iter().rev()` to walk backwards.

```rust
let evens: Vec<_> = (0..10).filter(|n| n % 2 == 0).collect();
```
"#,
        tags: &["code", "rust"],
        pinned: false,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigPaths, StorageOptions};
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn init_storage() -> anyhow::Result<(TempDir, StorageHandle)> {
        let temp = TempDir::new()?;
        let paths = ConfigPaths::under(temp.path());
        let storage = init(&StorageOptions::for_paths(&paths))?;
        Ok((temp, storage))
    }

    fn assert_listing_order(notes: &[Note]) {
        for pair in notes.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.is_pinned >= b.is_pinned, "pinned notes must lead");
            if a.is_pinned == b.is_pinned {
                assert!(a.updated_at >= b.updated_at, "newer notes must lead");
            }
        }
    }

    #[test]
    fn create_applies_defaults() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let note = storage.create(NewNote::default())?;
        assert_eq!(note.title, UNTITLED);
        assert_eq!(note.content, None);
        assert!(note.tags.is_empty());
        assert!(!note.is_pinned);
        assert_eq!(note.created_at, note.updated_at);
        assert_eq!(storage.fetch(&note.id)?, Some(note));
        Ok(())
    }

    #[test]
    fn only_an_empty_title_gets_the_placeholder() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let spaces = storage.create(NewNote::titled("   "))?;
        assert_eq!(spaces.title, "   ");
        let empty = storage.create(NewNote::titled(""))?;
        assert_eq!(empty.title, UNTITLED);
        Ok(())
    }

    #[test]
    fn pinned_note_sorts_ahead_of_newer_note() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let b = storage.create(NewNote {
            title: "B".into(),
            pinned: true,
            ..NewNote::default()
        })?;
        let a = storage.create(NewNote::titled("A"))?;
        assert!(b.updated_at < a.updated_at);

        let ids: Vec<_> = storage.fetch_all()?.into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
        Ok(())
    }

    #[test]
    fn updates_move_notes_to_the_front() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let first = storage.create(NewNote::titled("first"))?;
        let _second = storage.create(NewNote::titled("second"))?;
        let _pinned = storage.create(NewNote {
            title: "pinned".into(),
            pinned: true,
            ..NewNote::default()
        })?;
        storage.update(&first.id, |note| note.content = Some("edited".into()))?;

        let notes = storage.fetch_all()?;
        assert_listing_order(&notes);
        let titles: Vec<_> = notes.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["pinned", "first", "second"]);
        Ok(())
    }

    #[test]
    fn update_keeps_identity_and_refreshes_updated_at() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let note = storage.create(NewNote::titled("Draft"))?;
        let updated = storage.update(&note.id, |draft| {
            draft.id = "hijacked".into();
            draft.created_at = OffsetDateTime::UNIX_EPOCH;
            draft.title = "   ".into();
            draft.tags = vec!["b".into(), "a".into(), "b".into()];
        })?;
        assert_eq!(updated.id, note.id);
        assert_eq!(updated.created_at, note.created_at);
        assert!(updated.updated_at > note.updated_at);
        assert_eq!(updated.title, "   ");

        let stored = storage.fetch(&note.id)?.expect("note present");
        assert_eq!(stored.tags, vec!["b", "a", "b"]);
        assert_eq!(stored, updated);
        Ok(())
    }

    #[test]
    fn missing_ids_report_not_found() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        assert_matches!(
            storage.update("nope", |note| note.is_pinned = true),
            Err(StoreError::NotFound { ref id }) if id == "nope"
        );
        assert_matches!(storage.delete("nope"), Err(StoreError::NotFound { .. }));
        Ok(())
    }

    #[test]
    fn delete_and_delete_all_remove_notes_and_unused_tags() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let keep = storage.create(NewNote {
            title: "keep".into(),
            tags: vec!["shared".into()],
            ..NewNote::default()
        })?;
        let drop = storage.create(NewNote {
            title: "drop".into(),
            tags: vec!["shared".into(), "only-drop".into()],
            ..NewNote::default()
        })?;

        storage.delete(&drop.id)?;
        assert_eq!(storage.fetch(&drop.id)?, None);
        assert_eq!(storage.list_tags()?, vec!["shared"]);

        storage.create(NewNote::titled("another"))?;
        assert_eq!(storage.delete_all()?, 2);
        assert!(storage.fetch_all()?.is_empty());
        assert!(storage.list_tags()?.is_empty());
        assert_eq!(storage.fetch(&keep.id)?, None);
        Ok(())
    }

    #[test]
    fn subscribers_see_events_in_mutation_order() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let events = storage.subscribe();
        let note = storage.create(NewNote::titled("watched"))?;
        storage.toggle_pinned(&note.id)?;
        let _ = storage.delete("missing");
        storage.delete(&note.id)?;
        let seeded = storage.seed_sample_notes()?;
        storage.delete_all()?;

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                StoreEvent::Created { id: note.id.clone() },
                StoreEvent::Updated { id: note.id.clone() },
                StoreEvent::Deleted { id: note.id },
                StoreEvent::Seeded {
                    count: seeded.len()
                },
                StoreEvent::Cleared {
                    removed: seeded.len()
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn seeded_notes_are_listed_in_order() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let seeded = storage.seed_sample_notes()?;
        assert_eq!(seeded.len(), SAMPLE_NOTES.len());
        let notes = storage.fetch_all()?;
        assert_eq!(notes.len(), seeded.len());
        assert_listing_order(&notes);
        assert!(notes[0].is_pinned);
        Ok(())
    }

    #[test]
    fn reopening_preserves_notes() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let options = StorageOptions::for_paths(&ConfigPaths::under(temp.path()));
        let created = {
            let storage = init(&options)?;
            storage.create(NewNote {
                title: "durable".into(),
                content: Some("body".into()),
                tags: vec!["x".into()],
                pinned: true,
            })?
        };
        let storage = init(&options)?;
        assert_eq!(storage.fetch_all()?, vec![created.clone()]);
        let touched = storage.toggle_pinned(&created.id)?;
        assert!(touched.updated_at > created.updated_at);
        Ok(())
    }
}
