//! Registry of note ids that currently have a live handle.

use crate::error::AppError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lifecycle of one note body.
///
/// `Unopened -> Opening -> Open -> Closing -> Closed`. A record leaves the
/// registry once its handle is released, so an id with no record reads as
/// [`NoteState::Unopened`] again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteState {
    Unopened,
    Opening,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for NoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unopened => "unopened",
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

type States = Arc<Mutex<HashMap<String, NoteState>>>;

fn lock_states(states: &States) -> Result<MutexGuard<'_, HashMap<String, NoteState>>, AppError> {
    states
        .lock()
        .map_err(|_| AppError::Internal("open-note registry is poisoned".to_string()))
}

/// Tracks which note ids are resident and in which lifecycle state.
#[derive(Default, Clone)]
pub(crate) struct OpenNoteRegistry {
    states: States,
}

impl OpenNoteRegistry {
    /// Claim `note_id` for a new handle.
    ///
    /// # Returns
    /// A registration in [`NoteState::Opening`] that releases the claim when
    /// dropped.
    ///
    /// # Errors
    /// Returns [`AppError::AlreadyOpen`] when a live handle already exists.
    pub(crate) fn register(&self, note_id: &str) -> Result<NoteRegistration, AppError> {
        let mut states = lock_states(&self.states)?;
        if let Some(state) = states.get(note_id) {
            tracing::error!("Refusing second handle for note '{}' ({})", note_id, state);
            return Err(AppError::AlreadyOpen(note_id.to_string()));
        }
        states.insert(note_id.to_string(), NoteState::Opening);
        Ok(NoteRegistration {
            states: Arc::clone(&self.states),
            note_id: note_id.to_string(),
        })
    }

    /// Current state of `note_id`.
    pub(crate) fn state(&self, note_id: &str) -> NoteState {
        lock_states(&self.states)
            .ok()
            .and_then(|states| states.get(note_id).copied())
            .unwrap_or(NoteState::Unopened)
    }

    /// Ids that currently hold a registration.
    pub(crate) fn live_ids(&self) -> Vec<String> {
        lock_states(&self.states)
            .map(|states| states.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Claim on one note id, released on drop.
pub(crate) struct NoteRegistration {
    states: States,
    note_id: String,
}

impl NoteRegistration {
    pub(crate) fn set_state(&self, state: NoteState) {
        match lock_states(&self.states) {
            Ok(mut states) => {
                states.insert(self.note_id.clone(), state);
            }
            Err(err) => tracing::error!("Failed to move '{}' to {}: {}", self.note_id, state, err),
        }
    }

    pub(crate) fn state(&self) -> NoteState {
        lock_states(&self.states)
            .ok()
            .and_then(|states| states.get(&self.note_id).copied())
            .unwrap_or(NoteState::Closed)
    }
}

impl Drop for NoteRegistration {
    fn drop(&mut self) {
        match self.states.lock() {
            Ok(mut states) => {
                states.remove(&self.note_id);
            }
            Err(_) => {
                tracing::error!(
                    "Failed to release registration for '{}': registry poisoned",
                    self.note_id
                );
            }
        }
    }
}
