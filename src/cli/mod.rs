use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::storage;

pub mod commands;

use self::commands::{DeleteAllArgs, ListArgs, NewArgs, NoteIdArgs};

const LOG_FILE: &str = "mdnotes.log";

#[derive(Parser, Debug)]
#[command(
    name = "mdnotes",
    version,
    about = "Markdown notes with tags, pinning and a live preview"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over MDNOTES_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over MDNOTES_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive TUI (default)
    Tui,
    /// Create a note from the command line
    New(NewArgs),
    /// Print notes, newest first with pinned notes on top
    List(ListArgs),
    /// Print every tag in use
    Tags,
    /// Print one note with its Markdown rendered
    Show(NoteIdArgs),
    /// Toggle the pinned flag of a note
    Pin(NoteIdArgs),
    /// Delete a note
    Delete(NoteIdArgs),
    /// Add the sample notes
    Seed,
    /// Delete every note
    DeleteAll(DeleteAllArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let command = cli.command.unwrap_or(Commands::Tui);
    let log_file = matches!(command, Commands::Tui).then(|| loader.paths().log_dir.join(LOG_FILE));
    init_tracing(&cli.log_level, log_file.as_deref())
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let storage = storage::init(&config.storage).context("opening the note store")?;

    let config = Arc::new(config);
    match command {
        Commands::Tui => {
            let mut app = App::new(config, storage)?;
            commands::run_tui(&mut app)
        }
        Commands::New(args) => commands::new_note(&storage, args),
        Commands::List(args) => commands::list_notes(&storage, &args),
        Commands::Tags => commands::list_tags(&storage),
        Commands::Show(args) => commands::show_note(&config, &storage, &args),
        Commands::Pin(args) => commands::toggle_pin(&storage, &args),
        Commands::Delete(args) => commands::delete_note(&storage, &args),
        Commands::Seed => commands::seed(&storage),
        Commands::DeleteAll(args) => commands::delete_all(&storage, &args),
    }
}

/// The TUI owns the terminal, so it logs to a file; other commands log to stderr.
fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| -> Result<()> {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = fmt().with_env_filter(env_filter);
        match log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {}", path.display()))?;
                builder.with_ansi(false).with_writer(Mutex::new(file)).init();
            }
            None => builder.with_writer(std::io::stderr).init(),
        }
        Ok(())
    })
    .map(|_| ())
}
