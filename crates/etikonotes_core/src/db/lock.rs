//! Single-writer guard for a notebook directory.

use crate::constants::DB_OWNER_LOCK_FILE_NAME;
use crate::error::AppError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Exclusive OS lock on `<db_path>/db.owner.lock`, released on drop.
///
/// Update logs from two writers would interleave sequence numbers, so a
/// second process opening the same notebook fails here.
pub struct OwnerLock {
    file: File,
    path: PathBuf,
}

impl OwnerLock {
    /// Lock file location for a notebook directory.
    pub fn path_for(db_path: &Path) -> PathBuf {
        db_path.join(DB_OWNER_LOCK_FILE_NAME)
    }

    /// Take the lock without waiting. `db_path` must already exist.
    ///
    /// # Errors
    /// Returns [`AppError::StorageMessage`] when another process holds the
    /// lock or the lock file cannot be opened.
    pub fn acquire(db_path: &Path) -> Result<Self, AppError> {
        let path = Self::path_for(db_path);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| {
                AppError::StorageMessage(format!(
                    "Failed to open owner lock '{}': {}",
                    path.display(),
                    err
                ))
            })?;

        if let Err(err) = file.try_lock_exclusive() {
            return Err(match err.kind() {
                ErrorKind::WouldBlock | ErrorKind::PermissionDenied => {
                    AppError::StorageMessage(format!(
                        "Notebook '{}' is already open in another etikonotes process.\n\
                        Close it first, or set DB_PATH to use a different location.",
                        db_path.display()
                    ))
                }
                _ => AppError::StorageMessage(format!(
                    "Failed to lock '{}': {}",
                    path.display(),
                    err
                )),
            });
        }
        tracing::debug!("Holding owner lock {:?}", path);
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OwnerLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!("Failed to release owner lock {:?}: {}", self.path, err);
        }
    }
}
