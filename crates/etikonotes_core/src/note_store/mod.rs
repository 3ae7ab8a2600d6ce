//! Per-note CRDT bodies and their open/close lifecycle.
//!
//! Each note body is a separate document with one text container, persisted
//! under `note|<id>`. Bodies are loaded only when opened and released as soon
//! as the caller closes the handle.

mod registry;

pub use registry::NoteState;

use crate::constants::{note_store_name, NOTE_CONTENT_TEXT_NAME};
use crate::error::AppError;
use crate::persistence::{self, Persistence, PersistenceOptions, SyncTransport, UpdateStore};
use registry::{NoteRegistration, OpenNoteRegistry};
use similar::{DiffTag, TextDiff};
use std::sync::Arc;
use std::time::Duration;
use yrs::{Doc, GetString, Text, TextRef, Transact};

#[cfg(test)]
mod tests;

/// Upper bound on diff computation before falling back to a coarser edit.
const DIFF_TIMEOUT: Duration = Duration::from_millis(250);

/// Live CRDT body of one note.
///
/// Offsets are UTF-8 byte offsets into the markdown.
#[derive(Clone)]
pub struct NoteBody {
    doc: Doc,
    content: TextRef,
}

impl NoteBody {
    fn new() -> Self {
        let doc = Doc::new();
        let content = doc.get_or_insert_text(NOTE_CONTENT_TEXT_NAME);
        Self { doc, content }
    }

    /// Underlying document, for editor bindings and transports.
    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    /// Current markdown.
    pub fn text(&self) -> String {
        self.content.get_string(&self.doc.transact())
    }

    /// Length of the markdown in bytes.
    pub fn len(&self) -> u32 {
        self.content.len(&self.doc.transact())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `chunk` at byte offset `index`.
    pub fn insert(&self, index: u32, chunk: &str) {
        self.content.insert(&mut self.doc.transact_mut(), index, chunk);
    }

    /// Remove `len` bytes starting at byte offset `index`.
    pub fn remove_range(&self, index: u32, len: u32) {
        self.content
            .remove_range(&mut self.doc.transact_mut(), index, len);
    }

    /// Replace the whole body with `markdown` using minimal edits.
    ///
    /// Unchanged runs keep their CRDT identity, so concurrent edits from
    /// other peers merge instead of being overwritten.
    ///
    /// # Returns
    /// `true` when the body changed.
    pub fn replace_markdown(&self, markdown: &str) -> bool {
        let current = self.text();
        if current == markdown {
            return false;
        }

        let diff = TextDiff::configure()
            .timeout(DIFF_TIMEOUT)
            .diff_chars(current.as_str(), markdown);
        let old_offsets = char_byte_offsets(&current);
        let new_offsets = char_byte_offsets(markdown);

        let mut txn = self.doc.transact_mut();
        // Back to front so earlier offsets stay valid.
        for op in diff.ops().iter().rev() {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            if tag == DiffTag::Equal {
                continue;
            }
            let start = old_offsets[old_range.start];
            let removed = old_offsets[old_range.end] - start;
            if removed > 0 {
                self.content
                    .remove_range(&mut txn, start as u32, removed as u32);
            }
            let inserted = &markdown[new_offsets[new_range.start]..new_offsets[new_range.end]];
            if !inserted.is_empty() {
                self.content.insert(&mut txn, start as u32, inserted);
            }
        }
        true
    }
}

/// Byte offset of every char boundary, including the end of the string.
fn char_byte_offsets(value: &str) -> Vec<usize> {
    value
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(value.len()))
        .collect()
}

/// Caller-owned handle to one open note body.
///
/// Handles are consumed by [`NoteStore::close`] and [`NoteStore::delete`].
pub struct NoteHandle {
    note_id: String,
    body: NoteBody,
    persistence: Persistence,
    registration: NoteRegistration,
}

impl NoteHandle {
    pub fn note_id(&self) -> &str {
        &self.note_id
    }

    pub fn body(&self) -> &NoteBody {
        &self.body
    }

    /// Lifecycle state of this handle.
    pub fn state(&self) -> NoteState {
        self.registration.state()
    }

    /// `true` once the stored body has been loaded.
    pub fn is_synced(&self) -> bool {
        self.persistence.is_synced()
    }

    /// Wait for the stored body to load.
    ///
    /// # Errors
    /// Propagates the binding's sync failure.
    pub async fn when_synced(&self) -> Result<(), AppError> {
        self.persistence.when_synced().await
    }
}

/// Opens, closes, and deletes note bodies against one [`UpdateStore`].
pub struct NoteStore {
    store: Arc<dyn UpdateStore>,
    options: PersistenceOptions,
    registry: OpenNoteRegistry,
}

impl NoteStore {
    pub fn new(store: Arc<dyn UpdateStore>, options: PersistenceOptions) -> Self {
        Self {
            store,
            options,
            registry: OpenNoteRegistry::default(),
        }
    }

    /// Open the body of `note_id` and wait for its stored content.
    ///
    /// Does not consult the metadata index; an id with no stored body opens
    /// as an empty document.
    ///
    /// # Returns
    /// An open [`NoteHandle`] owned by the caller.
    ///
    /// # Errors
    /// Returns [`AppError::AlreadyOpen`] when the id already has a live handle,
    /// or a persistence error when the stored body cannot be loaded.
    pub async fn open(&self, note_id: &str) -> Result<NoteHandle, AppError> {
        let handle = self.open_unsynced(note_id)?;
        if let Err(err) = handle.persistence.when_synced().await {
            tracing::warn!("Failed to load note '{}': {}", note_id, err);
            self.close(handle).await;
            return Err(err);
        }
        handle.registration.set_state(NoteState::Open);
        tracing::debug!(note = %note_id, "opened note body");
        Ok(handle)
    }

    /// Create a handle for `note_id` without waiting for the stored body.
    ///
    /// # Errors
    /// Returns [`AppError::AlreadyOpen`] when the id already has a live handle.
    pub fn open_unsynced(&self, note_id: &str) -> Result<NoteHandle, AppError> {
        let registration = self.registry.register(note_id)?;
        let body = NoteBody::new();
        let persistence = Persistence::new(
            note_store_name(note_id),
            body.doc(),
            Arc::clone(&self.store),
            self.options.clone(),
        )?;
        Ok(NoteHandle {
            note_id: note_id.to_string(),
            body,
            persistence,
            registration,
        })
    }

    /// Flush and release a handle. Stored bytes are kept.
    ///
    /// Flush failures are logged; the body is released regardless.
    pub async fn close(&self, handle: NoteHandle) {
        handle.registration.set_state(NoteState::Closing);
        if let Err(err) = handle.persistence.destroy().await {
            tracing::warn!("Failed to flush note '{}' on close: {}", handle.note_id, err);
        }
        Self::release(handle);
    }

    /// Erase the stored body of a handle, then release it.
    ///
    /// The handle is released even when the erase fails.
    ///
    /// # Errors
    /// Returns the erase failure.
    pub async fn delete(&self, handle: NoteHandle) -> Result<(), AppError> {
        handle.registration.set_state(NoteState::Closing);
        let result = handle.persistence.clear_data().await;
        if let Err(err) = &result {
            tracing::error!("Failed to erase note '{}': {}", handle.note_id, err);
        }
        Self::release(handle);
        result
    }

    fn release(handle: NoteHandle) {
        let NoteHandle {
            note_id,
            body,
            persistence,
            registration,
        } = handle;
        registration.set_state(NoteState::Closed);
        drop(persistence);
        drop(body);
        drop(registration);
        tracing::debug!(note = %note_id, "released note body");
    }

    /// Attach a remote transport to an open handle's document.
    ///
    /// # Errors
    /// Returns an error when the transport rejects the document.
    pub fn connect(
        &self,
        handle: &mut NoteHandle,
        transport: Arc<dyn SyncTransport>,
    ) -> Result<(), AppError> {
        handle.persistence.connect(transport)
    }

    /// Lifecycle state of `note_id` in this store.
    pub fn state(&self, note_id: &str) -> NoteState {
        self.registry.state(note_id)
    }

    /// Ids that currently hold a live handle.
    pub fn open_ids(&self) -> Vec<String> {
        self.registry.live_ids()
    }

    /// Bytes currently stored for the body of `note_id`.
    ///
    /// # Errors
    /// Propagates store read failures.
    pub async fn stored_bytes(&self, note_id: &str) -> Result<u64, AppError> {
        persistence::stored_bytes(Arc::clone(&self.store), note_store_name(note_id)).await
    }
}
