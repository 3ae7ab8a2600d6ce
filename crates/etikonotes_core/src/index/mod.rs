//! Metadata directory of every note, kept in a single CRDT document.
//!
//! The root map `notes` holds one nested map `{id, title, lastModified}` per
//! note id. List views read this document only; note bodies stay on disk until
//! opened.

use crate::constants::{DEFAULT_TITLE, METADATA_STORE_NAME, NOTES_MAP_NAME};
use crate::error::AppError;
use crate::models::metadata::{sort_by_recency, NoteMetadata};
use crate::persistence::{Persistence, PersistenceOptions, SyncTransport, UpdateStore};
use std::sync::Arc;
use yrs::{Any, Doc, Map, MapPrelim, MapRef, Out, ReadTxn, Transact};

#[cfg(test)]
mod tests;

const FIELD_ID: &str = "id";
const FIELD_TITLE: &str = "title";
const FIELD_LAST_MODIFIED: &str = "lastModified";

/// Process-lifetime index of note metadata.
pub struct MetadataIndex {
    doc: Doc,
    notes: MapRef,
    persistence: Persistence,
}

impl MetadataIndex {
    /// Bind the index document to `store` under the `notes-list` store name.
    ///
    /// Loading starts lazily on the first read or write.
    ///
    /// # Errors
    /// Returns an error when the persistence binding cannot be created.
    pub fn new(store: Arc<dyn UpdateStore>, options: PersistenceOptions) -> Result<Self, AppError> {
        let doc = Doc::new();
        let notes = doc.get_or_insert_map(NOTES_MAP_NAME);
        let persistence = Persistence::new(METADATA_STORE_NAME, &doc, store, options)?;
        Ok(Self {
            doc,
            notes,
            persistence,
        })
    }

    /// Wait for the initial load of the index.
    ///
    /// # Errors
    /// Propagates the binding's sync failure; a later call retries.
    pub async fn when_synced(&self) -> Result<(), AppError> {
        self.persistence.when_synced().await
    }

    /// List every note, newest first.
    ///
    /// # Returns
    /// All metadata rows sorted by `last_modified` descending; empty when the
    /// notebook holds no notes.
    ///
    /// # Errors
    /// Returns an error when the index cannot be loaded.
    pub async fn list(&self) -> Result<Vec<NoteMetadata>, AppError> {
        self.when_synced().await?;
        let txn = self.doc.transact();
        let mut rows: Vec<NoteMetadata> = self
            .notes
            .iter(&txn)
            .filter_map(|(key, value)| read_entry(key, &value, &txn))
            .collect();
        sort_by_recency(&mut rows);
        Ok(rows)
    }

    /// Look up one note's metadata.
    ///
    /// # Returns
    /// `None` when no entry exists for `id`.
    ///
    /// # Errors
    /// Returns an error when the index cannot be loaded.
    pub async fn get(&self, id: &str) -> Result<Option<NoteMetadata>, AppError> {
        self.when_synced().await?;
        let txn = self.doc.transact();
        Ok(self
            .notes
            .get(&txn, id)
            .and_then(|value| read_entry(id, &value, &txn)))
    }

    /// Insert or update the entry for `metadata.id`.
    ///
    /// An existing nested entry is updated in place (`title` and
    /// `lastModified`); otherwise a new nested entry is inserted.
    ///
    /// # Errors
    /// Returns an error when the index cannot be loaded.
    pub async fn save(&self, metadata: &NoteMetadata) -> Result<(), AppError> {
        self.when_synced().await?;
        self.save_loaded(metadata)
    }

    /// Synchronous [`MetadataIndex::save`] for callers that already awaited
    /// [`MetadataIndex::when_synced`] and must not suspend.
    ///
    /// # Errors
    /// Returns [`AppError::Internal`] when the index has not been loaded yet.
    pub(crate) fn save_loaded(&self, metadata: &NoteMetadata) -> Result<(), AppError> {
        if !self.persistence.is_synced() {
            return Err(AppError::Internal(
                "metadata index written before its initial load".to_string(),
            ));
        }

        let mut txn = self.doc.transact_mut();
        match self.notes.get(&txn, metadata.id.as_str()) {
            Some(Out::YMap(entry)) => {
                entry.insert(
                    &mut txn,
                    FIELD_TITLE,
                    Any::String(metadata.title.as_str().into()),
                );
                entry.insert(
                    &mut txn,
                    FIELD_LAST_MODIFIED,
                    Any::Number(metadata.last_modified as f64),
                );
            }
            _ => {
                let entry: MapPrelim = [
                    (FIELD_ID, Any::String(metadata.id.as_str().into())),
                    (FIELD_TITLE, Any::String(metadata.title.as_str().into())),
                    (
                        FIELD_LAST_MODIFIED,
                        Any::Number(metadata.last_modified as f64),
                    ),
                ]
                .into_iter()
                .collect();
                self.notes.insert(&mut txn, metadata.id.as_str(), entry);
            }
        }
        Ok(())
    }

    /// Remove the entry for `id`.
    ///
    /// # Returns
    /// `true` when an entry was removed, `false` when none existed.
    ///
    /// # Errors
    /// Returns an error when the index cannot be loaded.
    pub async fn delete(&self, id: &str) -> Result<bool, AppError> {
        self.when_synced().await?;
        let mut txn = self.doc.transact_mut();
        Ok(self.notes.remove(&mut txn, id).is_some())
    }

    /// Attach a remote transport to the index document.
    ///
    /// # Errors
    /// Returns an error when the transport rejects the document.
    pub fn connect(&self, transport: Arc<dyn SyncTransport>) -> Result<(), AppError> {
        self.persistence.connect(transport)
    }

    /// Flush pending writes and release the binding.
    ///
    /// # Errors
    /// Returns an error when queued updates could not be written.
    pub async fn close(&self) -> Result<(), AppError> {
        self.persistence.destroy().await
    }
}

fn read_entry<T: ReadTxn>(key: &str, value: &Out, txn: &T) -> Option<NoteMetadata> {
    match value {
        Out::YMap(entry) => {
            let id = match entry.get(txn, FIELD_ID) {
                Some(Out::Any(Any::String(id))) => id.to_string(),
                _ => key.to_string(),
            };
            let title = match entry.get(txn, FIELD_TITLE) {
                Some(Out::Any(Any::String(title))) => title.to_string(),
                _ => DEFAULT_TITLE.to_string(),
            };
            let last_modified = match entry.get(txn, FIELD_LAST_MODIFIED) {
                Some(Out::Any(any)) => millis_from_any(&any),
                _ => None,
            }
            .unwrap_or(0);
            Some(NoteMetadata::new(id, title, last_modified))
        }
        Out::Any(Any::Map(fields)) => {
            let id = match fields.get(FIELD_ID) {
                Some(Any::String(id)) => id.to_string(),
                _ => key.to_string(),
            };
            let title = match fields.get(FIELD_TITLE) {
                Some(Any::String(title)) => title.to_string(),
                _ => DEFAULT_TITLE.to_string(),
            };
            let last_modified = fields
                .get(FIELD_LAST_MODIFIED)
                .and_then(millis_from_any)
                .unwrap_or(0);
            Some(NoteMetadata::new(id, title, last_modified))
        }
        other => {
            tracing::warn!("Ignoring malformed index entry '{}': {:?}", key, other);
            None
        }
    }
}

fn millis_from_any(value: &Any) -> Option<i64> {
    match value {
        Any::Number(ms) if ms.is_finite() => Some(*ms as i64),
        Any::BigInt(ms) => Some(*ms),
        _ => None,
    }
}
