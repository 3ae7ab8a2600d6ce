//! Events exchanged between the notebook and its front ends.

use crate::models::metadata::NoteMetadata;

/// Lifecycle events reported by the editor surface bound to the active note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorEvent {
    /// The editor finished mounting against the active body. Sent once per mount.
    Mounted,
    /// The body changed. Sent per keystroke batch, without debouncing.
    Updated,
}

/// Notifications broadcast to every [`crate::Notebook::subscribe`] receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotebookEvent {
    /// A note was created and saved to the index.
    NoteCreated { metadata: NoteMetadata },
    /// A note body became the active note.
    NoteOpened { id: String },
    /// A debounced title write reached the index.
    TitleSaved { metadata: NoteMetadata },
    /// A debounced title write failed.
    TitleSaveFailed { id: String, message: String },
    /// A note's body was erased and its index entry removed.
    NoteDeleted { id: String },
}
