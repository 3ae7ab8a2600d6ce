//! In-process [`UpdateStore`] with injectable failures.

use crate::error::AppError;
use crate::persistence::{StoredUpdates, UpdateStore};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Store operation that can be forced to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Load,
    Append,
    Compact,
    Clear,
}

#[derive(Default)]
struct MemoryState {
    logs: HashMap<String, BTreeMap<u64, Vec<u8>>>,
    failing: HashSet<StoreOp>,
}

/// Update logs kept in memory; nothing survives the process.
///
/// Useful for tests (see [`MemoryStore::fail`]) and for throwaway notebooks.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::StorageMessage("memory store state is poisoned".to_string()))
    }

    fn check(state: &MemoryState, op: StoreOp, name: &str) -> Result<(), AppError> {
        if state.failing.contains(&op) {
            return Err(AppError::StorageMessage(format!(
                "injected {:?} failure for '{}'",
                op, name
            )));
        }
        Ok(())
    }

    /// Make every future `op` fail until [`MemoryStore::heal`] is called.
    pub fn fail(&self, op: StoreOp) {
        if let Ok(mut state) = self.state() {
            state.failing.insert(op);
        }
    }

    /// Stop failing `op`.
    pub fn heal(&self, op: StoreOp) {
        if let Ok(mut state) = self.state() {
            state.failing.remove(&op);
        }
    }

    /// Number of log entries currently stored under `name`.
    pub fn update_count(&self, name: &str) -> usize {
        self.state()
            .map(|state| state.logs.get(name).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }
}

impl UpdateStore for MemoryStore {
    fn load(&self, name: &str) -> Result<StoredUpdates, AppError> {
        let state = self.state()?;
        Self::check(&state, StoreOp::Load, name)?;
        let Some(log) = state.logs.get(name) else {
            return Ok(StoredUpdates::default());
        };
        Ok(StoredUpdates {
            updates: log.values().cloned().collect(),
            last_seq: log.keys().next_back().copied(),
        })
    }

    fn append(&self, name: &str, updates: &[Vec<u8>]) -> Result<(), AppError> {
        let mut state = self.state()?;
        Self::check(&state, StoreOp::Append, name)?;
        let log = state.logs.entry(name.to_string()).or_default();
        let mut next_seq = log.keys().next_back().map_or(0, |seq| seq + 1);
        for update in updates {
            log.insert(next_seq, update.clone());
            next_seq += 1;
        }
        Ok(())
    }

    fn compact(&self, name: &str, through_seq: u64, snapshot: &[u8]) -> Result<(), AppError> {
        let mut state = self.state()?;
        Self::check(&state, StoreOp::Compact, name)?;
        let log = state.logs.entry(name.to_string()).or_default();
        log.retain(|seq, _| *seq > through_seq);
        log.insert(through_seq, snapshot.to_vec());
        Ok(())
    }

    fn clear(&self, name: &str) -> Result<(), AppError> {
        let mut state = self.state()?;
        Self::check(&state, StoreOp::Clear, name)?;
        state.logs.remove(name);
        Ok(())
    }

    fn stored_bytes(&self, name: &str) -> Result<u64, AppError> {
        let state = self.state()?;
        Ok(state
            .logs
            .get(name)
            .map(|log| log.values().map(|update| update.len() as u64).sum())
            .unwrap_or(0))
    }
}
