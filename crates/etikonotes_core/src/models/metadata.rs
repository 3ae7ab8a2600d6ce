//! Lightweight per-note metadata kept in the metadata index.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Metadata row rendered by list views; one per existing note.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteMetadata {
    pub id: String,
    pub title: String,
    /// Unix timestamp in milliseconds.
    pub last_modified: i64,
}

impl NoteMetadata {
    /// Create metadata for an existing id.
    ///
    /// # Returns
    /// A new [`NoteMetadata`] with the given fields.
    pub fn new(id: impl Into<String>, title: impl Into<String>, last_modified: i64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            last_modified,
        }
    }

    /// Modification time as a UTC datetime.
    ///
    /// # Returns
    /// `None` when `last_modified` is outside chrono's representable range.
    pub fn last_modified_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.last_modified).single()
    }
}

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Sort metadata rows newest first.
///
/// Ties keep their relative input order.
pub fn sort_by_recency(rows: &mut [NoteMetadata]) {
    rows.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
}
