//! Command-line front end for an etikonotes notebook.

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use etikonotes::db::backup::BackupManager;
use etikonotes::db::lock::OwnerLock;
use etikonotes::naming::derive_title;
use etikonotes::{AppError, Config, Database, NoteMetadata, Notebook, NotebookOptions, UpdateStore};
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "etikonotes", about = "Local CRDT notebook", version)]
struct Cli {
    /// Notebook directory (overrides DB_PATH)
    #[arg(short, long)]
    db_path: Option<String>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
    /// List notes, newest first
    List {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Create a note, optionally seeded from a file
    New {
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Print a note's markdown
    Show { id: String },
    /// Replace a note's markdown from a file or stdin
    Edit {
        id: String,
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Erase a note
    Delete { id: String },
    /// Copy the notebook data file to a timestamped backup
    Backup,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "etikonotes=info,etikonotes_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let Cli {
        db_path,
        json,
        command,
    } = Cli::parse();

    if let Commands::Completions { shell } = &command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(*shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let mut config = Config::from_env();
    if let Some(path) = db_path {
        config.db_path = path;
    }

    if let Commands::Backup = command {
        return run_backup(&config);
    }
    if config.auto_backup {
        if let Err(err) = run_backup(&config) {
            tracing::warn!("Failed to create auto-backup: {}", err);
        }
    }

    let database = Database::new(&config.db_path)
        .with_context(|| format!("failed to open notebook at {}", config.db_path))?;
    let store: Arc<dyn UpdateStore> = Arc::new(database);
    let notebook = Notebook::new(store, NotebookOptions::from_config(&config))?;

    let outcome = run(&notebook, command, json).await;
    let shutdown = notebook.shutdown().await;
    outcome?;
    shutdown?;
    Ok(())
}

async fn run(notebook: &Notebook, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Completions { .. } | Commands::Backup => {
            unreachable!("handled before the notebook is opened")
        }
        Commands::List { limit } => {
            let notes: Vec<NoteMetadata> = notebook
                .list_notes()
                .await?
                .into_iter()
                .take(limit)
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&notes)?);
            } else if notes.is_empty() {
                println!("No notes yet");
            } else {
                for note in notes {
                    let modified = note
                        .last_modified_at()
                        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("{:<34} {:<17} {}", note.id, modified, note.title);
                }
            }
        }
        Commands::New { file } => {
            let mut created = notebook.create_note().await?;
            if let Some(path) = file {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path))?;
                if let Some((_, body)) = notebook.active_note() {
                    body.replace_markdown(&content);
                    notebook.on_content_changed()?;
                }
                created.title = derive_title(&content);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&created)?);
            } else {
                println!("Created: {} ({})", created.title, created.id);
            }
        }
        Commands::Show { id } => {
            let body = notebook.open_note(&id).await?;
            let content = body.text();
            if json {
                let title = derive_title(&content);
                let value = serde_json::json!({ "id": id, "title": title, "content": content });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{}", content);
            }
        }
        Commands::Edit { id, file } => {
            let content = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path))?,
                None => {
                    let mut buffer = String::new();
                    io::stdin().read_to_string(&mut buffer)?;
                    buffer
                }
            };
            let body = notebook.open_note(&id).await?;
            if body.replace_markdown(&content) {
                notebook.on_content_changed()?;
                println!("Updated: {}", id);
            } else {
                println!("Unchanged: {}", id);
            }
        }
        Commands::Delete { id } => {
            if notebook.index().get(&id).await?.is_none() {
                return Err(AppError::NotFound(id).into());
            }
            notebook.delete_note(&id).await?;
            println!("Deleted note: {}", id);
        }
    }
    Ok(())
}

fn run_backup(config: &Config) -> anyhow::Result<()> {
    let db_path = Path::new(&config.db_path);
    if !db_path.exists() {
        println!("No existing notebook to back up");
        return Ok(());
    }

    let _owner = OwnerLock::acquire(db_path)?;
    match BackupManager::new(&config.db_path).create_backup()? {
        Some(backup_dir) => println!("Notebook backed up to: {}", backup_dir.display()),
        None => println!("No existing notebook to back up"),
    }
    Ok(())
}
