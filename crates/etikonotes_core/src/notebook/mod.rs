//! Process-wide notebook context and the operations front ends call.
//!
//! A [`Notebook`] owns one [`MetadataIndex`] and one [`NoteStore`] and keeps at
//! most one note body resident. Navigation never waits on the previous body's
//! flush: the old handle closes in the background while the next one opens.

mod events;
mod title_saver;

pub use events::{EditorEvent, NotebookEvent};

use crate::config::Config;
use crate::constants::{DEFAULT_TITLE, DEFAULT_TITLE_DEBOUNCE_MS};
use crate::error::AppError;
use crate::index::MetadataIndex;
use crate::models::metadata::{now_millis, NoteMetadata};
use crate::naming::generate_note_id;
use crate::note_store::{NoteBody, NoteHandle, NoteStore};
use crate::persistence::{PersistenceOptions, SyncTransport, UpdateStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use title_saver::TitleDebouncer;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;


const EVENT_CHANNEL_CAPACITY: usize = 64;

type IdGenerator = Box<dyn Fn() -> String + Send + Sync>;

/// Tuning for a [`Notebook`].
#[derive(Debug, Clone)]
pub struct NotebookOptions {
    /// Quiet period after the last content change before the title is saved.
    pub title_debounce: Duration,
    pub persistence: PersistenceOptions,
}

impl Default for NotebookOptions {
    fn default() -> Self {
        Self {
            title_debounce: Duration::from_millis(DEFAULT_TITLE_DEBOUNCE_MS),
            persistence: PersistenceOptions::default(),
        }
    }
}

impl NotebookOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            title_debounce: config.title_debounce(),
            persistence: PersistenceOptions {
                compact_threshold: config.compact_threshold,
            },
        }
    }
}

#[derive(Clone)]
struct ActiveNote {
    id: String,
    body: NoteBody,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, AppError> {
    mutex
        .lock()
        .map_err(|_| AppError::Internal(format!("notebook {} is poisoned", what)))
}

/// Explicit application context composing the index and the note store.
pub struct Notebook {
    index: Arc<MetadataIndex>,
    notes: Arc<NoteStore>,
    /// Serializes navigation; holds the caller-owned handle of the active note.
    handle: tokio::sync::Mutex<Option<NoteHandle>>,
    /// Synchronous view of the active note for editor callbacks.
    active: Mutex<Option<ActiveNote>>,
    pending_closes: Mutex<HashMap<String, JoinHandle<()>>>,
    focus_request: Mutex<Option<String>>,
    remotes: Mutex<Vec<Arc<dyn SyncTransport>>>,
    titles: TitleDebouncer,
    events: broadcast::Sender<NotebookEvent>,
    id_generator: IdGenerator,
}

impl Notebook {
    /// Build a notebook over `store`.
    ///
    /// Nothing is loaded yet; the index syncs on first use.
    ///
    /// # Errors
    /// Returns an error outside a Tokio runtime.
    pub fn new(store: Arc<dyn UpdateStore>, options: NotebookOptions) -> Result<Self, AppError> {
        let index = Arc::new(MetadataIndex::new(
            Arc::clone(&store),
            options.persistence.clone(),
        )?);
        let notes = Arc::new(NoteStore::new(store, options.persistence));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let titles = TitleDebouncer::new(options.title_debounce, Arc::clone(&index), events.clone());
        Ok(Self {
            index,
            notes,
            handle: tokio::sync::Mutex::new(None),
            active: Mutex::new(None),
            pending_closes: Mutex::new(HashMap::new()),
            focus_request: Mutex::new(None),
            remotes: Mutex::new(Vec::new()),
            titles,
            events,
            id_generator: Box::new(generate_note_id),
        })
    }

    /// Replace the note id generator. Generated ids are trusted to be unique.
    pub fn with_id_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.id_generator = Box::new(generator);
        self
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    pub fn note_store(&self) -> &NoteStore {
        &self.notes
    }

    /// Receive every [`NotebookEvent`] emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<NotebookEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: NotebookEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// All notes, newest first.
    ///
    /// # Errors
    /// Returns an error when the index cannot be loaded.
    pub async fn list_notes(&self) -> Result<Vec<NoteMetadata>, AppError> {
        self.index.list().await
    }

    /// Id and body of the active note, if any.
    pub fn active_note(&self) -> Option<(String, NoteBody)> {
        lock(&self.active, "active note")
            .ok()
            .and_then(|active| active.clone())
            .map(|active| (active.id, active.body))
    }

    /// Create a note with the default title and make it active.
    ///
    /// The new note asks the editor for focus once; see
    /// [`Notebook::take_focus_request`].
    ///
    /// # Returns
    /// Metadata of the created note.
    ///
    /// # Errors
    /// Returns an error when the index write or the body open fails.
    pub async fn create_note(&self) -> Result<NoteMetadata, AppError> {
        let mut handle = self.handle.lock().await;
        self.create_locked(&mut handle).await
    }

    async fn create_locked(&self, handle: &mut Option<NoteHandle>) -> Result<NoteMetadata, AppError> {
        let metadata = NoteMetadata::new((self.id_generator)(), DEFAULT_TITLE, now_millis());
        self.index.save(&metadata).await?;
        tracing::info!(note = %metadata.id, "created note");
        self.emit(NotebookEvent::NoteCreated {
            metadata: metadata.clone(),
        });

        self.open_locked(handle, &metadata.id).await?;
        *lock(&self.focus_request, "focus request")? = Some(metadata.id.clone());
        Ok(metadata)
    }

    /// Make `id` the active note.
    ///
    /// The previous note starts closing in the background and any pending
    /// title save for it is dropped. Opening the already active note returns
    /// its body unchanged.
    ///
    /// # Returns
    /// The loaded body of `id`.
    ///
    /// # Errors
    /// Returns [`AppError::NotFound`] when the index has no entry for `id`
    /// (the active note is left untouched), or a persistence error when the
    /// body cannot be loaded.
    pub async fn open_note(&self, id: &str) -> Result<NoteBody, AppError> {
        let mut handle = self.handle.lock().await;
        self.open_locked(&mut handle, id).await
    }

    async fn open_locked(&self, handle: &mut Option<NoteHandle>, id: &str) -> Result<NoteBody, AppError> {
        if self.index.get(id).await?.is_none() {
            return Err(AppError::NotFound(id.to_string()));
        }
        if let Some(current) = handle.as_ref().filter(|current| current.note_id() == id) {
            return Ok(current.body().clone());
        }

        self.deactivate()?;
        if let Some(previous) = handle.take() {
            self.spawn_close(previous)?;
        }
        self.await_pending_close(id).await?;

        let mut opened = self.notes.open(id).await?;
        let remotes = lock(&self.remotes, "remote list")?.clone();
        for transport in remotes {
            if let Err(err) = self.notes.connect(&mut opened, transport) {
                tracing::warn!("Failed to connect note '{}' to remote: {}", id, err);
            }
        }

        let body = opened.body().clone();
        *lock(&self.active, "active note")? = Some(ActiveNote {
            id: id.to_string(),
            body: body.clone(),
        });
        *handle = Some(opened);
        tracing::debug!(note = %id, "activated note");
        self.emit(NotebookEvent::NoteOpened { id: id.to_string() });
        Ok(body)
    }

    /// Forget the active note and drop its pending title save.
    fn deactivate(&self) -> Result<(), AppError> {
        let mut active = lock(&self.active, "active note")?;
        *active = None;
        self.titles.cancel()
    }

    fn spawn_close(&self, handle: NoteHandle) -> Result<(), AppError> {
        let note_id = handle.note_id().to_string();
        let notes = Arc::clone(&self.notes);
        let task = tokio::spawn(async move { notes.close(handle).await });
        let mut pending = lock(&self.pending_closes, "pending closes")?;
        pending.retain(|_, task| !task.is_finished());
        pending.insert(note_id, task);
        Ok(())
    }

    async fn await_pending_close(&self, id: &str) -> Result<(), AppError> {
        let task = lock(&self.pending_closes, "pending closes")?.remove(id);
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::warn!("Background close of note '{}' failed: {}", id, err);
            }
        }
        Ok(())
    }

    /// Erase a note's body, then remove its index entry.
    ///
    /// Deleting the active note activates the most recent remaining note, or
    /// a new one when none remain. Deleting an unknown id is a no-op.
    ///
    /// # Errors
    /// Returns the erase failure. The index entry is kept in that case and an
    /// active note is reopened.
    pub async fn delete_note(&self, id: &str) -> Result<(), AppError> {
        let mut handle = self.handle.lock().await;
        let was_active = handle
            .as_ref()
            .is_some_and(|current| current.note_id() == id);

        let title_pending = was_active && self.titles.has_pending_for(id);
        let target = if was_active {
            self.deactivate()?;
            match handle.take() {
                Some(target) => target,
                None => return Err(AppError::Internal("active handle vanished".to_string())),
            }
        } else {
            if self.index.get(id).await?.is_none() {
                tracing::debug!(note = %id, "ignored delete of unknown note");
                return Ok(());
            }
            self.await_pending_close(id).await?;
            self.notes.open_unsynced(id)?
        };

        if let Err(err) = self.notes.delete(target).await {
            if was_active {
                match self.open_locked(&mut handle, id).await {
                    Ok(body) if title_pending => self.titles.schedule(id, body)?,
                    Ok(_) => {}
                    Err(reopen) => {
                        tracing::warn!("Failed to reactivate note '{}': {}", id, reopen);
                    }
                }
            }
            return Err(err);
        }
        let removed = self.index.delete(id).await?;
        {
            let mut focus = lock(&self.focus_request, "focus request")?;
            if focus.as_deref() == Some(id) {
                *focus = None;
            }
        }
        if removed {
            tracing::info!(note = %id, "deleted note");
            self.emit(NotebookEvent::NoteDeleted { id: id.to_string() });
        } else {
            tracing::debug!(note = %id, "deleted body of note missing from the index");
        }

        if was_active {
            let remaining = self.index.list().await?;
            match remaining.first() {
                Some(next) => {
                    self.open_locked(&mut handle, &next.id).await?;
                }
                None => {
                    self.create_locked(&mut handle).await?;
                }
            }
        }
        Ok(())
    }

    /// Report that the active note's body changed.
    ///
    /// Restarts the title debounce window; the derived title is saved once
    /// no change has arrived for the configured period. Without an active
    /// note this does nothing.
    ///
    /// # Errors
    /// Returns an error when internal state is poisoned.
    pub fn on_content_changed(&self) -> Result<(), AppError> {
        let active = lock(&self.active, "active note")?;
        match active.as_ref() {
            Some(note) => self.titles.schedule(&note.id, note.body.clone()),
            None => Ok(()),
        }
    }

    /// `true` when a title save is waiting for its debounce window.
    pub fn has_pending_title_save(&self) -> bool {
        self.titles.has_pending()
    }

    /// Open the most recent note, or create one when the notebook is empty.
    ///
    /// Safe to call repeatedly; an already active note is kept.
    ///
    /// # Returns
    /// Metadata of the active note.
    ///
    /// # Errors
    /// Returns an error when the index cannot be loaded or the note cannot
    /// be opened or created.
    pub async fn ensure_initial_note(&self) -> Result<NoteMetadata, AppError> {
        let mut handle = self.handle.lock().await;
        if let Some(current) = handle.as_ref() {
            if let Some(metadata) = self.index.get(current.note_id()).await? {
                return Ok(metadata);
            }
        }

        let notes = self.index.list().await?;
        match notes.into_iter().next() {
            Some(latest) => {
                self.open_locked(&mut handle, &latest.id).await?;
                Ok(latest)
            }
            None => self.create_locked(&mut handle).await,
        }
    }

    /// Consume the focus request of a freshly created note.
    ///
    /// # Returns
    /// `true` exactly once after [`Notebook::create_note`], while the created
    /// note is still active.
    pub fn take_focus_request(&self) -> bool {
        let requested = match lock(&self.focus_request, "focus request") {
            Ok(mut focus) => focus.take(),
            Err(_) => None,
        };
        let Some(requested) = requested else {
            return false;
        };
        lock(&self.active, "active note")
            .map(|active| active.as_ref().is_some_and(|note| note.id == requested))
            .unwrap_or(false)
    }

    /// Feed an editor lifecycle event.
    ///
    /// # Returns
    /// `true` when the editor should take input focus.
    ///
    /// # Errors
    /// Returns an error when scheduling the title save fails.
    pub fn on_editor_event(&self, event: EditorEvent) -> Result<bool, AppError> {
        match event {
            EditorEvent::Mounted => Ok(self.take_focus_request()),
            EditorEvent::Updated => {
                self.on_content_changed()?;
                Ok(false)
            }
        }
    }

    /// Attach a remote transport to the index and to every note opened from
    /// now on, including the active one.
    ///
    /// # Errors
    /// Returns an error when the transport rejects the index; nothing is
    /// attached then. A rejected active note is also an error, but the
    /// transport stays attached to the index and to notes opened later.
    pub async fn connect_remote(&self, transport: Arc<dyn SyncTransport>) -> Result<(), AppError> {
        let mut handle = self.handle.lock().await;
        self.index.connect(Arc::clone(&transport))?;
        lock(&self.remotes, "remote list")?.push(Arc::clone(&transport));
        if let Some(active) = handle.as_mut() {
            self.notes.connect(active, transport)?;
        }
        Ok(())
    }

    /// Flush the pending title save, close the active note, wait for
    /// background closes, and close the index.
    ///
    /// # Errors
    /// Returns the first flush failure; teardown runs to completion first.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        let flushed = self.titles.flush().await;
        let mut handle = self.handle.lock().await;
        self.deactivate()?;
        if let Some(active) = handle.take() {
            self.notes.close(active).await;
        }

        let pending: Vec<(String, JoinHandle<()>)> =
            lock(&self.pending_closes, "pending closes")?.drain().collect();
        for (id, task) in pending {
            if let Err(err) = task.await {
                tracing::warn!("Background close of note '{}' failed: {}", id, err);
            }
        }

        let closed = self.index.close().await;
        tracing::info!("notebook shut down");
        flushed?;
        closed
    }
}
