//! Core domain library for etikonotes (config, CRDT stores, notebook context).

/// Configuration loading and defaults.
pub mod config;
/// Shared constants.
pub mod constants;
/// Durable update-log storage (redb and in-memory).
pub mod db;
/// Application error types.
pub mod error;
/// Metadata directory of every note.
pub mod index;
/// Data models for note metadata.
pub mod models;
/// Note id generation and title derivation.
pub mod naming;
/// Per-note CRDT bodies and their open/close lifecycle.
pub mod note_store;
/// Process-wide notebook context and top-level operations.
pub mod notebook;
/// Bindings between CRDT documents and durable update stores.
pub mod persistence;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use constants::*;
pub use db::{memory::MemoryStore, Database};
pub use error::{AppError, PersistenceOp};
pub use index::MetadataIndex;
pub use models::metadata::NoteMetadata;
pub use note_store::{NoteBody, NoteHandle, NoteState, NoteStore};
pub use notebook::{EditorEvent, Notebook, NotebookEvent, NotebookOptions};
pub use persistence::{Persistence, PersistenceOptions, SyncTransport, UpdateStore};
