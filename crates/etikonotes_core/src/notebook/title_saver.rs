//! Debounced write-back of derived titles into the metadata index.

use super::events::NotebookEvent;
use crate::error::AppError;
use crate::index::MetadataIndex;
use crate::models::metadata::{now_millis, NoteMetadata};
use crate::naming::derive_title;
use crate::note_store::NoteBody;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

struct PendingTitle {
    generation: u64,
    note_id: String,
    body: NoteBody,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct SaverState {
    generation: u64,
    pending: Option<PendingTitle>,
}

type SharedState = Arc<Mutex<SaverState>>;

fn lock_state(state: &SharedState) -> Result<MutexGuard<'_, SaverState>, AppError> {
    state
        .lock()
        .map_err(|_| AppError::Internal("title saver state is poisoned".to_string()))
}

/// Single-slot debouncer for derived-title saves.
///
/// Every schedule, cancel, and write happens under one lock together with the
/// generation counter, so a save that lost its generation is never applied.
pub(crate) struct TitleDebouncer {
    delay: Duration,
    index: Arc<MetadataIndex>,
    events: broadcast::Sender<NotebookEvent>,
    state: SharedState,
}

impl TitleDebouncer {
    pub(crate) fn new(
        delay: Duration,
        index: Arc<MetadataIndex>,
        events: broadcast::Sender<NotebookEvent>,
    ) -> Self {
        Self {
            delay,
            index,
            events,
            state: Arc::new(Mutex::new(SaverState::default())),
        }
    }

    /// Restart the debounce window for `note_id`, replacing any pending save.
    pub(crate) fn schedule(&self, note_id: &str, body: NoteBody) -> Result<(), AppError> {
        let mut state = lock_state(&self.state)?;
        state.generation += 1;
        let generation = state.generation;
        if let Some(previous) = state.pending.take() {
            previous.timer.abort();
        }

        let delay = self.delay;
        let index = Arc::clone(&self.index);
        let events = self.events.clone();
        let shared = Arc::clone(&self.state);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire(shared, index, events, generation).await;
        });
        state.pending = Some(PendingTitle {
            generation,
            note_id: note_id.to_string(),
            body,
            timer,
        });
        Ok(())
    }

    /// Drop the pending save, if any.
    pub(crate) fn cancel(&self) -> Result<(), AppError> {
        let mut state = lock_state(&self.state)?;
        state.generation += 1;
        if let Some(pending) = state.pending.take() {
            pending.timer.abort();
            tracing::debug!(note = %pending.note_id, "dropped pending title save");
        }
        Ok(())
    }

    /// `true` while a save is waiting for its window to elapse.
    pub(crate) fn has_pending(&self) -> bool {
        lock_state(&self.state)
            .map(|state| state.pending.is_some())
            .unwrap_or(false)
    }

    /// `true` while a save for `note_id` is waiting for its window to elapse.
    pub(crate) fn has_pending_for(&self, note_id: &str) -> bool {
        lock_state(&self.state)
            .map(|state| {
                state
                    .pending
                    .as_ref()
                    .is_some_and(|pending| pending.note_id == note_id)
            })
            .unwrap_or(false)
    }

    /// Write the pending save now instead of waiting for the window.
    ///
    /// # Errors
    /// Returns the index failure; the failure is also broadcast.
    pub(crate) async fn flush(&self) -> Result<(), AppError> {
        let generation = {
            let state = lock_state(&self.state)?;
            match &state.pending {
                Some(pending) => {
                    pending.timer.abort();
                    pending.generation
                }
                None => return Ok(()),
            }
        };
        match write_pending(&self.state, &self.index, &self.events, generation).await {
            Some(Err(err)) => Err(err),
            _ => Ok(()),
        }
    }
}

async fn fire(
    state: SharedState,
    index: Arc<MetadataIndex>,
    events: broadcast::Sender<NotebookEvent>,
    generation: u64,
) {
    // Failures are already logged and broadcast.
    let _ = write_pending(&state, &index, &events, generation).await;
}

/// Apply the pending save if it still belongs to `generation`.
///
/// # Returns
/// `None` when the save was superseded, otherwise the write outcome.
async fn write_pending(
    state: &SharedState,
    index: &MetadataIndex,
    events: &broadcast::Sender<NotebookEvent>,
    generation: u64,
) -> Option<Result<(), AppError>> {
    let synced = index.when_synced().await;

    let (metadata, result) = {
        let mut guard = match lock_state(state) {
            Ok(guard) => guard,
            Err(err) => return Some(Err(err)),
        };
        let current = guard
            .pending
            .as_ref()
            .is_some_and(|pending| pending.generation == generation);
        if !current {
            return None;
        }
        let pending = guard.pending.take()?;
        let metadata = NoteMetadata::new(
            pending.note_id,
            derive_title(&pending.body.text()),
            now_millis(),
        );
        let result = synced.and_then(|()| index.save_loaded(&metadata));
        (metadata, result)
    };

    match &result {
        Ok(()) => {
            tracing::debug!(note = %metadata.id, title = %metadata.title, "saved derived title");
            let _ = events.send(NotebookEvent::TitleSaved { metadata });
        }
        Err(err) => {
            tracing::error!("Failed to save title for note '{}': {}", metadata.id, err);
            let _ = events.send(NotebookEvent::TitleSaveFailed {
                id: metadata.id,
                message: err.to_string(),
            });
        }
    }
    Some(result)
}
