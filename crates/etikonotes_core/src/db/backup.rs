//! Backup helpers for the redb data file.

use super::tables::REDB_FILE_NAME;
use crate::error::AppError;
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Copies the data file of a database directory to a timestamped sibling.
pub struct BackupManager {
    db_path: PathBuf,
}

impl BackupManager {
    /// Create a backup manager for the database directory.
    pub fn new(db_path: &str) -> Self {
        Self {
            db_path: PathBuf::from(db_path),
        }
    }

    /// Copy `<db_path>/data.redb` into `<db_path>.backup.<unix-seconds>/`.
    ///
    /// Run this while no writer holds the database open.
    ///
    /// # Returns
    /// The backup directory, or `None` when there is no data file yet.
    ///
    /// # Errors
    /// Returns an error if the clock is unusable or copying fails.
    pub fn create_backup(&self) -> Result<Option<PathBuf>, AppError> {
        let source = self.db_path.join(REDB_FILE_NAME);
        if !source.exists() {
            return Ok(None);
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| AppError::StorageMessage(format!("System clock before epoch: {}", err)))?
            .as_secs();
        let backup_dir = self.db_path.with_extension(format!("backup.{}", timestamp));
        fs::create_dir_all(&backup_dir).map_err(|err| {
            AppError::StorageMessage(format!("Failed to create backup directory: {}", err))
        })?;
        fs::copy(&source, backup_dir.join(REDB_FILE_NAME)).map_err(|err| {
            AppError::StorageMessage(format!("Failed to copy {:?}: {}", source, err))
        })?;

        tracing::info!("Created database backup at: {:?}", backup_dir);
        Ok(Some(backup_dir))
    }
}
