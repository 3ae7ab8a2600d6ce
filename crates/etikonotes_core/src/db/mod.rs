//! Durable update-log storage for CRDT documents.
//!
//! Every document (the metadata index and each note body) is stored as an
//! append-only log of encoded CRDT updates under its store name. Replaying
//! the log in any order reconstructs the document, so compaction may replace a
//! prefix of the log with one snapshot update.

/// Backup utilities.
pub mod backup;
/// Owner lock handling.
pub mod lock;
/// In-process store used for tests and ephemeral notebooks.
pub mod memory;
/// Table definitions.
pub mod tables;

use crate::constants::SCHEMA_VERSION;
use crate::error::AppError;
use crate::persistence::{StoredUpdates, UpdateStore};
use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use self::lock::OwnerLock;
use self::tables::{DOC_UPDATES, REDB_FILE_NAME, SCHEMA_KEY, SCHEMA_META};

#[cfg(test)]
mod tests;

/// Persisted schema record; guards against reading an incompatible layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaInfo {
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

/// redb-backed [`UpdateStore`] holding every notebook document.
pub struct Database {
    db: Arc<redb::Database>,
    path: PathBuf,
    schema: SchemaInfo,
    _owner_lock: OwnerLock,
}

impl Database {
    /// Open (or create) the database directory and initialize tables.
    ///
    /// # Returns
    /// A fully initialized [`Database`] holding the owner lock.
    ///
    /// # Errors
    /// Returns an error when another process owns the directory, redb cannot
    /// open the file, or the stored schema version is not supported.
    pub fn new(path: &str) -> Result<Self, AppError> {
        let root = PathBuf::from(path);
        std::fs::create_dir_all(&root).map_err(|err| {
            AppError::StorageMessage(format!(
                "Failed to create database directory '{}': {}",
                root.display(),
                err
            ))
        })?;

        let owner_lock = OwnerLock::acquire(&root)?;
        let db = Arc::new(redb::Database::create(root.join(REDB_FILE_NAME))?);
        let schema = Self::ensure_schema(&db)?;
        tracing::debug!(
            "Opened notebook database at {:?} (schema v{})",
            root,
            schema.version
        );

        Ok(Self {
            db,
            path: root,
            schema,
            _owner_lock: owner_lock,
        })
    }

    fn ensure_schema(db: &redb::Database) -> Result<SchemaInfo, AppError> {
        let write_txn = db.begin_write()?;
        let schema = {
            write_txn.open_table(DOC_UPDATES)?;
            let mut meta = write_txn.open_table(SCHEMA_META)?;
            let existing = match meta.get(SCHEMA_KEY)? {
                Some(guard) => Some(bincode::deserialize::<SchemaInfo>(guard.value())?),
                None => None,
            };
            match existing {
                Some(info) if info.version == SCHEMA_VERSION => info,
                Some(info) => {
                    return Err(AppError::StorageMessage(format!(
                        "Unsupported notebook schema version {} (expected {})",
                        info.version, SCHEMA_VERSION
                    )));
                }
                None => {
                    let info = SchemaInfo {
                        version: SCHEMA_VERSION,
                        created_at: Utc::now(),
                    };
                    let encoded = bincode::serialize(&info)?;
                    meta.insert(SCHEMA_KEY, encoded.as_slice())?;
                    info
                }
            }
        };
        write_txn.commit()?;
        Ok(schema)
    }

    /// Database directory this handle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema record read (or written) at open time.
    pub fn schema(&self) -> &SchemaInfo {
        &self.schema
    }
}

impl UpdateStore for Database {
    fn load(&self, name: &str) -> Result<StoredUpdates, AppError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DOC_UPDATES)?;
        let mut stored = StoredUpdates::default();
        for item in table.range((name, 0u64)..=(name, u64::MAX))? {
            let (key, value) = item?;
            let (_, seq) = key.value();
            stored.updates.push(value.value().to_vec());
            stored.last_seq = Some(seq);
        }
        Ok(stored)
    }

    fn append(&self, name: &str, updates: &[Vec<u8>]) -> Result<(), AppError> {
        if updates.is_empty() {
            return Ok(());
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DOC_UPDATES)?;
            let last_seq = table
                .range((name, 0u64)..=(name, u64::MAX))?
                .next_back()
                .transpose()?
                .map(|(key, _)| key.value().1);
            let mut next_seq = last_seq.map_or(0, |seq| seq + 1);
            for update in updates {
                table.insert((name, next_seq), update.as_slice())?;
                next_seq += 1;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn compact(&self, name: &str, through_seq: u64, snapshot: &[u8]) -> Result<(), AppError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DOC_UPDATES)?;
            let mut stale = Vec::new();
            for item in table.range((name, 0u64)..(name, through_seq))? {
                let (key, _) = item?;
                stale.push(key.value().1);
            }
            for seq in stale {
                let _ = table.remove((name, seq))?;
            }
            table.insert((name, through_seq), snapshot)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn clear(&self, name: &str) -> Result<(), AppError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(DOC_UPDATES)?;
            let mut seqs = Vec::new();
            for item in table.range((name, 0u64)..=(name, u64::MAX))? {
                let (key, _) = item?;
                seqs.push(key.value().1);
            }
            for seq in seqs {
                let _ = table.remove((name, seq))?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn stored_bytes(&self, name: &str) -> Result<u64, AppError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DOC_UPDATES)?;
        let mut total = 0u64;
        for item in table.range((name, 0u64)..=(name, u64::MAX))? {
            let (_, value) = item?;
            total += value.value().len() as u64;
        }
        Ok(total)
    }
}
