use std::fmt::Write as _;
use std::io::{self, Read};

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::app::App;
use crate::config::themes::Palette;
use crate::config::AppConfig;
use crate::preview::{self, CmarkRenderer, Preview};
use crate::search::{parse_tag_field, NoteFilter};
use crate::storage::{NewNote, Note, StorageHandle};

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Title for the note (prompted if omitted)
    #[arg()]
    pub title: Option<String>,
    /// Provide the note body inline. If omitted, reads from stdin.
    #[arg(long)]
    pub body: Option<String>,
    /// Comma separated tags
    #[arg(long)]
    pub tags: Option<String>,
    /// Pin the new note
    #[arg(long)]
    pub pin: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Case-insensitive text that must appear in the title or content
    #[arg(long)]
    pub search: Option<String>,
    /// Only notes carrying this exact tag
    #[arg(long)]
    pub tag: Option<String>,
    /// Only pinned notes
    #[arg(long)]
    pub pinned: bool,
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct NoteIdArgs {
    /// Note identifier
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteAllArgs {
    /// Confirm deleting every note
    #[arg(long)]
    pub yes: bool,
}

#[derive(Serialize)]
struct NoteJson<'a> {
    id: &'a str,
    title: &'a str,
    content: Option<&'a str>,
    tags: &'a [String],
    pinned: bool,
    created_at: String,
    updated_at: String,
}

impl<'a> From<&'a Note> for NoteJson<'a> {
    fn from(note: &'a Note) -> Self {
        Self {
            id: &note.id,
            title: &note.title,
            content: note.content.as_deref(),
            tags: &note.tags,
            pinned: note.is_pinned,
            created_at: format_timestamp(note.created_at),
            updated_at: format_timestamp(note.updated_at),
        }
    }
}

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

pub fn new_note(storage: &StorageHandle, args: NewArgs) -> Result<()> {
    let title = match args.title {
        Some(title) => title,
        None => prompt("Title")?,
    };
    let content = match args.body {
        Some(body) => Some(body),
        None => read_stdin()?,
    };
    let note = storage
        .create(NewNote {
            title,
            content,
            tags: args.tags.as_deref().map(parse_tag_field).unwrap_or_default(),
            pinned: args.pin,
        })
        .context("creating note")?;
    println!(
        "Created note {}{}",
        note.id,
        if note.is_pinned { " (pinned)" } else { "" }
    );
    Ok(())
}

pub fn list_notes(storage: &StorageHandle, args: &ListArgs) -> Result<()> {
    print!("{}", run_list(storage, args)?);
    Ok(())
}

fn run_list(storage: &StorageHandle, args: &ListArgs) -> Result<String> {
    let filter = NoteFilter {
        search_text: args.search.clone().unwrap_or_default(),
        selected_tag: args.tag.clone(),
        pinned_only: args.pinned,
    };
    let notes = storage.fetch_all().context("loading notes")?;
    let visible = filter.apply(&notes);
    if args.json {
        format_notes_json(&visible)
    } else {
        Ok(format_note_list(&visible))
    }
}

fn format_note_list(notes: &[&Note]) -> String {
    if notes.is_empty() {
        return "No notes found.\n".to_string();
    }
    let mut out = String::new();
    for (idx, note) in notes.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        let mut headline = format!("{}  {}", note.id, note.title);
        if note.is_pinned {
            headline.push_str("  [PINNED]");
        }
        let _ = writeln!(&mut out, "{headline}");
        let _ = writeln!(&mut out, "    updated {}", format_timestamp(note.updated_at));
        if !note.tags.is_empty() {
            let _ = writeln!(&mut out, "    tags    {}", format_tags(&note.tags));
        }
    }
    out
}

fn format_notes_json(notes: &[&Note]) -> Result<String> {
    let payload: Vec<NoteJson> = notes.iter().map(|note| NoteJson::from(*note)).collect();
    let mut out = serde_json::to_string_pretty(&payload).context("encoding notes as JSON")?;
    out.push('\n');
    Ok(out)
}

pub fn list_tags(storage: &StorageHandle) -> Result<()> {
    let tags = storage.list_tags().context("listing tags")?;
    if tags.is_empty() {
        println!("No tags yet.");
    }
    for tag in tags {
        println!("{tag}");
    }
    Ok(())
}

pub fn show_note(config: &AppConfig, storage: &StorageHandle, args: &NoteIdArgs) -> Result<()> {
    print!("{}", run_show(config, storage, args)?);
    Ok(())
}

fn run_show(config: &AppConfig, storage: &StorageHandle, args: &NoteIdArgs) -> Result<String> {
    let Some(note) = storage.fetch(&args.id).context("loading note")? else {
        bail!("note {} not found", args.id);
    };
    let palette = Palette::for_theme(config.theme);
    let renderer = CmarkRenderer::new(palette, &config.preview);
    let preview = preview::render_preview(&renderer, note.body(), &palette);

    let mut out = String::new();
    let pinned = if note.is_pinned { "  [PINNED]" } else { "" };
    let _ = writeln!(&mut out, "{}{pinned}", note.title);
    let _ = writeln!(&mut out, "id:      {}", note.id);
    if !note.tags.is_empty() {
        let _ = writeln!(&mut out, "tags:    {}", format_tags(&note.tags));
    }
    let _ = writeln!(&mut out, "updated: {}", format_timestamp(note.updated_at));
    out.push('\n');
    if let Preview::Fallback { error, .. } = &preview {
        let _ = writeln!(&mut out, "(preview unavailable: {error}; showing raw text)");
    }
    for line in &preview.text().lines {
        let text: String = line.spans.iter().map(|span| span.content.as_ref()).collect();
        let _ = writeln!(&mut out, "{text}");
    }
    Ok(out)
}

pub fn toggle_pin(storage: &StorageHandle, args: &NoteIdArgs) -> Result<()> {
    let note = storage
        .toggle_pinned(&args.id)
        .with_context(|| format!("toggling pin on note {}", args.id))?;
    let state = if note.is_pinned { "Pinned" } else { "Unpinned" };
    println!("{state} \"{}\"", note.title);
    Ok(())
}

pub fn delete_note(storage: &StorageHandle, args: &NoteIdArgs) -> Result<()> {
    storage
        .delete(&args.id)
        .with_context(|| format!("deleting note {}", args.id))?;
    println!("Deleted note {}", args.id);
    Ok(())
}

pub fn seed(storage: &StorageHandle) -> Result<()> {
    let notes = storage.seed_sample_notes().context("adding sample notes")?;
    println!("Added {} sample notes", notes.len());
    Ok(())
}

pub fn delete_all(storage: &StorageHandle, args: &DeleteAllArgs) -> Result<()> {
    if !args.yes {
        bail!("refusing to delete every note without --yes");
    }
    let removed = storage.delete_all().context("deleting all notes")?;
    println!("Deleted {removed} notes");
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;
    let mut stdout = io::stdout();
    write!(stdout, "{}: ", label)?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_owned())
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

fn format_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}
