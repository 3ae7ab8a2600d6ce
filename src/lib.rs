//! Root crate facade for the etikonotes notebook store.

pub use etikonotes_core::{
    config, constants, db, error, index, models, naming, note_store, notebook, persistence,
    AppError, Config, Database, EditorEvent, MemoryStore, MetadataIndex, NoteBody, NoteHandle,
    NoteMetadata, NoteState, NoteStore, Notebook, NotebookEvent, NotebookOptions, Persistence,
    PersistenceOp, PersistenceOptions, SyncTransport, UpdateStore,
};
