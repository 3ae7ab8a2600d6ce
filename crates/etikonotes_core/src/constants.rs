//! Shared constants used across etikonotes crates.

/// Store name of the metadata index document.
pub const METADATA_STORE_NAME: &str = "notes-list";

/// Prefix of per-note body store names (`note|<id>`).
pub const NOTE_STORE_PREFIX: &str = "note|";

/// Root map of the metadata index document.
pub const NOTES_MAP_NAME: &str = "notes";

/// Text container holding a note's markdown body.
pub const NOTE_CONTENT_TEXT_NAME: &str = "content";

/// Title used when no title can be derived from note content.
pub const DEFAULT_TITLE: &str = "Untitled Note";

/// Maximum derived title length in characters (before the ellipsis).
pub const MAX_TITLE_LENGTH: usize = 50;

/// Marker appended to truncated titles.
pub const TITLE_ELLIPSIS: &str = "...";

/// Default debounce window for derived-title writes in milliseconds.
pub const DEFAULT_TITLE_DEBOUNCE_MS: u64 = 200;

/// Stored update count above which a store is compacted on load.
pub const DEFAULT_COMPACT_THRESHOLD: usize = 500;

/// Length of generated note identifiers.
pub const NOTE_ID_LENGTH: usize = 32;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Owner lock file held for the lifetime of a writer process.
pub const DB_OWNER_LOCK_FILE_NAME: &str = "db.owner.lock";

/// Build the durable store name of a note body.
///
/// # Returns
/// `note|<id>`.
pub fn note_store_name(note_id: &str) -> String {
    format!("{}{}", NOTE_STORE_PREFIX, note_id)
}
