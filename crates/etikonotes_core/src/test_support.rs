//! Test-only helpers shared across etikonotes_core modules.

use crate::Database;
use tempfile::TempDir;

/// Open a fresh notebook database inside a new temp directory.
///
/// The returned [`TempDir`] owns the files; dropping it deletes them.
pub(crate) fn setup_temp_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("temp dir");
    let root = temp_dir.path().join("notebook");
    let db = Database::new(root.to_str().expect("utf-8 path")).expect("open database");
    (db, temp_dir)
}
