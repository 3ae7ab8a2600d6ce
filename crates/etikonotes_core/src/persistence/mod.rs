//! Bindings between in-memory CRDT documents and durable update stores.
//!
//! A [`Persistence`] observes every local update of its document and hands the
//! encoded bytes to a background writer task, so callers never wait on disk
//! for an edit. The initial load happens once, behind [`Persistence::when_synced`].

use crate::constants::DEFAULT_COMPACT_THRESHOLD;
use crate::error::{AppError, PersistenceOp};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use yrs::updates::decoder::Decode;
use yrs::{Doc, Origin, ReadTxn, StateVector, Subscription, Transact, Update};


/// Transaction origin used when replaying stored updates.
const PERSISTENCE_ORIGIN: &str = "etikonotes-persistence";

/// Raw log entries read back from a store.
#[derive(Debug, Default, Clone)]
pub struct StoredUpdates {
    pub updates: Vec<Vec<u8>>,
    /// Sequence number of the newest entry, if any.
    pub last_seq: Option<u64>,
}

/// Durable backing store for CRDT update logs, addressed by store name.
///
/// Calls are blocking; bindings run them on Tokio's blocking pool.
pub trait UpdateStore: Send + Sync {
    /// Read every stored update for `name`.
    fn load(&self, name: &str) -> Result<StoredUpdates, AppError>;

    /// Append updates to the end of the log for `name`.
    fn append(&self, name: &str, updates: &[Vec<u8>]) -> Result<(), AppError>;

    /// Replace every entry up to and including `through_seq` with `snapshot`.
    fn compact(&self, name: &str, through_seq: u64, snapshot: &[u8]) -> Result<(), AppError>;

    /// Erase every stored byte for `name`.
    fn clear(&self, name: &str) -> Result<(), AppError>;

    /// Total size of the stored log for `name`.
    fn stored_bytes(&self, name: &str) -> Result<u64, AppError>;
}

/// Remote synchronization transport attached to an already-open document.
///
/// Implementations own the network side; the store only hands over the
/// document and tells the transport when it goes away.
pub trait SyncTransport: Send + Sync {
    /// Start syncing `doc`, known locally as `store_name`.
    fn attach(&self, store_name: &str, doc: &Doc) -> Result<(), AppError>;

    /// Stop syncing `store_name`.
    fn detach(&self, store_name: &str);
}

/// Tuning for persistence bindings.
#[derive(Debug, Clone)]
pub struct PersistenceOptions {
    /// Compact a store on load once it holds at least this many log entries.
    pub compact_threshold: usize,
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self {
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
        }
    }
}

struct Writer {
    subscription: Subscription,
    task: JoinHandle<Result<usize, AppError>>,
}

/// Association between one CRDT document and its durable log.
pub struct Persistence {
    name: String,
    doc: Doc,
    store: Arc<dyn UpdateStore>,
    options: PersistenceOptions,
    synced: OnceCell<()>,
    writer: Mutex<Option<Writer>>,
    transports: Mutex<Vec<Arc<dyn SyncTransport>>>,
}

impl Persistence {
    /// Bind `doc` to the log stored under `name`.
    ///
    /// Local updates start streaming to the store immediately; stored content
    /// is not loaded until [`Persistence::when_synced`] is awaited.
    ///
    /// # Errors
    /// Returns an error outside a Tokio runtime or when the document refuses
    /// a new observer.
    pub fn new(
        name: impl Into<String>,
        doc: &Doc,
        store: Arc<dyn UpdateStore>,
        options: PersistenceOptions,
    ) -> Result<Self, AppError> {
        let name = name.into();
        let runtime = Handle::try_current().map_err(|err| {
            AppError::Internal(format!(
                "persistence for '{}' requires a Tokio runtime: {}",
                name, err
            ))
        })?;

        let (update_tx, update_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let replay_origin = Origin::from(PERSISTENCE_ORIGIN);
        let subscription = doc
            .observe_update_v1(move |txn, event| {
                if txn.origin() == Some(&replay_origin) {
                    return;
                }
                // The receiver lives until this subscription is dropped.
                let _ = update_tx.send(event.update.clone());
            })
            .map_err(|err| AppError::Crdt(format!("failed to observe '{}': {}", name, err)))?;

        let task = runtime.spawn(run_writer(name.clone(), Arc::clone(&store), update_rx));

        Ok(Self {
            name,
            doc: doc.clone(),
            store,
            options,
            synced: OnceCell::new(),
            writer: Mutex::new(Some(Writer { subscription, task })),
            transports: Mutex::new(Vec::new()),
        })
    }

    /// Store name this binding persists under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Document this binding persists.
    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    /// `true` once the initial load has completed.
    pub fn is_synced(&self) -> bool {
        self.synced.initialized()
    }

    /// `true` after [`Persistence::destroy`] or [`Persistence::clear_data`].
    pub fn is_destroyed(&self) -> bool {
        self.writer
            .lock()
            .map(|writer| writer.is_none())
            .unwrap_or(true)
    }

    /// Wait until stored updates have been loaded into the document.
    ///
    /// The load runs once; concurrent callers wait on the same load, and later
    /// callers return immediately. A failed load is not cached, so the next
    /// call tries again.
    ///
    /// # Errors
    /// Returns [`AppError::Persistence`] with [`PersistenceOp::Sync`] when the
    /// store cannot be read or the binding is already destroyed.
    pub async fn when_synced(&self) -> Result<(), AppError> {
        self.synced.get_or_try_init(|| self.load()).await?;
        Ok(())
    }

    async fn load(&self) -> Result<(), AppError> {
        if self.is_destroyed() {
            return Err(AppError::persistence(
                &self.name,
                PersistenceOp::Sync,
                "binding already destroyed",
            ));
        }

        let store = Arc::clone(&self.store);
        let name = self.name.clone();
        let stored = tokio::task::spawn_blocking(move || store.load(&name))
            .await
            .map_err(|err| AppError::persistence(&self.name, PersistenceOp::Sync, err))?
            .map_err(|err| AppError::persistence(&self.name, PersistenceOp::Sync, err))?;

        let applied = self.replay(&stored.updates);
        tracing::debug!(
            store = %self.name,
            stored = stored.updates.len(),
            applied,
            "persistence synced"
        );

        if let Some(through_seq) = stored.last_seq {
            if stored.updates.len() >= self.options.compact_threshold {
                self.compact(through_seq).await;
            }
        }
        Ok(())
    }

    fn replay(&self, updates: &[Vec<u8>]) -> usize {
        let mut txn = self.doc.transact_mut_with(PERSISTENCE_ORIGIN);
        let mut applied = 0;
        for (index, bytes) in updates.iter().enumerate() {
            let update = match Update::decode_v1(bytes) {
                Ok(update) => update,
                Err(err) => {
                    tracing::warn!(
                        "Skipping undecodable update #{} for '{}': {}",
                        index,
                        self.name,
                        err
                    );
                    continue;
                }
            };
            if let Err(err) = txn.apply_update(update) {
                tracing::warn!(
                    "Failed to apply stored update #{} for '{}': {}",
                    index,
                    self.name,
                    err
                );
                continue;
            }
            applied += 1;
        }
        applied
    }

    async fn compact(&self, through_seq: u64) {
        let snapshot = {
            let txn = self.doc.transact();
            txn.encode_state_as_update_v1(&StateVector::default())
        };
        let store = Arc::clone(&self.store);
        let name = self.name.clone();
        let outcome =
            tokio::task::spawn_blocking(move || store.compact(&name, through_seq, &snapshot)).await;
        match outcome {
            Ok(Ok(())) => tracing::debug!(store = %self.name, through_seq, "compacted update log"),
            Ok(Err(err)) => tracing::warn!("Failed to compact '{}': {}", self.name, err),
            Err(err) => tracing::warn!("Compaction task for '{}' failed: {}", self.name, err),
        }
    }

    /// Attach a remote transport to the live document.
    ///
    /// # Errors
    /// Returns an error when the binding is destroyed or the transport
    /// rejects the document.
    pub fn connect(&self, transport: Arc<dyn SyncTransport>) -> Result<(), AppError> {
        if self.is_destroyed() {
            return Err(AppError::StorageMessage(format!(
                "cannot connect '{}': binding already destroyed",
                self.name
            )));
        }
        transport.attach(&self.name, &self.doc)?;
        self.transports
            .lock()
            .map_err(|_| AppError::Internal("transport list poisoned".to_string()))?
            .push(transport);
        Ok(())
    }

    fn detach_transports(&self) {
        let transports = match self.transports.lock() {
            Ok(mut transports) => std::mem::take(&mut *transports),
            Err(_) => {
                tracing::error!("Transport list for '{}' is poisoned", self.name);
                return;
            }
        };
        for transport in transports {
            transport.detach(&self.name);
        }
    }

    fn take_writer(&self) -> Result<Option<Writer>, AppError> {
        Ok(self
            .writer
            .lock()
            .map_err(|_| AppError::Internal("persistence writer state poisoned".to_string()))?
            .take())
    }

    /// Stop observing the document, flush queued updates, and release the
    /// binding. Stored bytes are kept. Calling it again is a no-op.
    ///
    /// # Errors
    /// Returns [`AppError::Persistence`] with [`PersistenceOp::Destroy`] when
    /// any queued update could not be written.
    pub async fn destroy(&self) -> Result<(), AppError> {
        let Some(Writer { subscription, task }) = self.take_writer()? else {
            return Ok(());
        };
        self.detach_transports();
        // Dropping the observer closes the channel; the writer drains and exits.
        drop(subscription);

        match task.await {
            Ok(Ok(written)) => {
                tracing::debug!(store = %self.name, written, "persistence destroyed");
                Ok(())
            }
            Ok(Err(err)) => Err(AppError::persistence(
                &self.name,
                PersistenceOp::Destroy,
                err,
            )),
            Err(err) => Err(AppError::persistence(
                &self.name,
                PersistenceOp::Destroy,
                err,
            )),
        }
    }

    /// Destroy the binding and erase every stored byte for this store.
    ///
    /// # Errors
    /// Returns [`AppError::Persistence`] with [`PersistenceOp::Clear`] when the
    /// erase fails. Flush failures are irrelevant here and only logged.
    pub async fn clear_data(&self) -> Result<(), AppError> {
        if let Err(err) = self.destroy().await {
            tracing::warn!(
                "Discarding unflushed updates for '{}' before erase: {}",
                self.name,
                err
            );
        }

        let store = Arc::clone(&self.store);
        let name = self.name.clone();
        tokio::task::spawn_blocking(move || store.clear(&name))
            .await
            .map_err(|err| AppError::persistence(&self.name, PersistenceOp::Clear, err))?
            .map_err(|err| AppError::persistence(&self.name, PersistenceOp::Clear, err))?;
        tracing::info!(store = %self.name, "erased stored document");
        Ok(())
    }

    /// Bytes currently stored for this binding's log.
    ///
    /// # Errors
    /// Propagates store read failures.
    pub async fn stored_bytes(&self) -> Result<u64, AppError> {
        stored_bytes(Arc::clone(&self.store), self.name.clone()).await
    }
}

impl Drop for Persistence {
    fn drop(&mut self) {
        let still_bound = self
            .writer
            .get_mut()
            .map(|writer| writer.is_some())
            .unwrap_or(false);
        if still_bound {
            tracing::warn!(
                "Persistence for '{}' dropped without destroy; queued updates flush in the background",
                self.name
            );
            self.detach_transports();
        }
    }
}

/// Read the stored size of `name` on the blocking pool.
pub(crate) async fn stored_bytes(store: Arc<dyn UpdateStore>, name: String) -> Result<u64, AppError> {
    let label = name.clone();
    tokio::task::spawn_blocking(move || store.stored_bytes(&name))
        .await
        .map_err(|err| AppError::Internal(format!("stored_bytes task for '{}': {}", label, err)))?
}

async fn run_writer(
    name: String,
    store: Arc<dyn UpdateStore>,
    mut updates: UnboundedReceiver<Vec<u8>>,
) -> Result<usize, AppError> {
    let mut written = 0usize;
    let mut first_error: Option<AppError> = None;

    while let Some(update) = updates.recv().await {
        let mut batch = vec![update];
        while let Ok(next) = updates.try_recv() {
            batch.push(next);
        }
        let count = batch.len();

        let batch_store = Arc::clone(&store);
        let batch_name = name.clone();
        let outcome =
            tokio::task::spawn_blocking(move || batch_store.append(&batch_name, &batch)).await;
        match outcome {
            Ok(Ok(())) => written += count,
            Ok(Err(err)) => {
                tracing::error!("Failed to persist {} update(s) for '{}': {}", count, name, err);
                first_error.get_or_insert(err);
            }
            Err(err) => {
                tracing::error!("Writer task for '{}' failed: {}", name, err);
                first_error.get_or_insert(AppError::Internal(err.to_string()));
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(written),
    }
}
