//! Storage tests against a real redb file.

use super::backup::BackupManager;
use super::lock::OwnerLock;
use super::tables::{REDB_FILE_NAME, SCHEMA_KEY, SCHEMA_META};
use super::*;
use crate::test_support::setup_temp_db;
use tempfile::TempDir;

fn updates(values: &[&str]) -> Vec<Vec<u8>> {
    values.iter().map(|value| value.as_bytes().to_vec()).collect()
}

#[test]
fn new_database_records_current_schema() {
    let (db, _temp) = setup_temp_db();
    assert_eq!(db.schema().version, SCHEMA_VERSION);
    assert!(db.path().join(REDB_FILE_NAME).exists());
    assert!(OwnerLock::path_for(db.path()).exists());
}

#[test]
fn schema_survives_reopen() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("notebook");
    let path = path.to_str().expect("path");

    let created_at = Database::new(path).expect("db").schema().created_at;
    let reopened = Database::new(path).expect("reopen");
    assert_eq!(reopened.schema().created_at, created_at);
}

#[test]
fn unsupported_schema_version_is_rejected() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("notebook");
    drop(Database::new(path.to_str().expect("path")).expect("db"));

    {
        let raw = redb::Database::create(path.join(REDB_FILE_NAME)).expect("raw open");
        let write_txn = raw.begin_write().expect("begin");
        {
            let mut meta = write_txn.open_table(SCHEMA_META).expect("table");
            let future = SchemaInfo {
                version: SCHEMA_VERSION + 1,
                created_at: Utc::now(),
            };
            let encoded = bincode::serialize(&future).expect("encode");
            meta.insert(SCHEMA_KEY, encoded.as_slice()).expect("insert");
        }
        write_txn.commit().expect("commit");
    }

    match Database::new(path.to_str().expect("path")) {
        Err(AppError::StorageMessage(message)) => {
            assert!(message.contains("Unsupported notebook schema version"));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("future schema must not open"),
    }
}

#[test]
fn second_writer_is_refused_while_first_is_open() {
    let (db, _temp) = setup_temp_db();
    let path = db.path().to_str().expect("path").to_string();

    match Database::new(&path) {
        Err(AppError::StorageMessage(message)) => {
            assert!(message.contains("already open"), "message: {}", message);
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("second writer must be refused"),
    }

    drop(db);
    Database::new(&path).expect("open after release");
}

#[test]
fn append_and_load_keep_order_per_store() {
    let (db, _temp) = setup_temp_db();
    db.append("note|a", &updates(&["one", "two"])).expect("append");
    db.append("note|b", &updates(&["other"])).expect("append b");
    db.append("note|a", &updates(&["three"])).expect("append again");

    let stored = db.load("note|a").expect("load");
    assert_eq!(stored.updates, updates(&["one", "two", "three"]));
    assert_eq!(stored.last_seq, Some(2));

    let other = db.load("note|b").expect("load b");
    assert_eq!(other.updates, updates(&["other"]));

    let missing = db.load("note|missing").expect("load missing");
    assert!(missing.updates.is_empty());
    assert_eq!(missing.last_seq, None);
}

#[test]
fn store_names_sharing_a_prefix_stay_separate() {
    let (db, _temp) = setup_temp_db();
    db.append("note|a", &updates(&["short"])).expect("append");
    db.append("note|ab", &updates(&["long"])).expect("append");

    assert_eq!(db.load("note|a").expect("load").updates, updates(&["short"]));
    db.clear("note|a").expect("clear");
    assert_eq!(db.load("note|ab").expect("load").updates, updates(&["long"]));
}

#[test]
fn compact_replaces_prefix_with_snapshot() {
    let (db, _temp) = setup_temp_db();
    db.append("notes-list", &updates(&["a", "b", "c"])).expect("append");
    db.compact("notes-list", 1, b"snapshot").expect("compact");

    let stored = db.load("notes-list").expect("load");
    assert_eq!(stored.updates, updates(&["snapshot", "c"]));
    assert_eq!(stored.last_seq, Some(2));

    db.append("notes-list", &updates(&["d"])).expect("append after compact");
    assert_eq!(db.load("notes-list").expect("load").last_seq, Some(3));
}

#[test]
fn clear_and_stored_bytes() {
    let (db, _temp) = setup_temp_db();
    db.append("note|n1", &updates(&["12345", "678"])).expect("append");
    assert_eq!(db.stored_bytes("note|n1").expect("bytes"), 8);

    db.clear("note|n1").expect("clear");
    assert_eq!(db.stored_bytes("note|n1").expect("bytes"), 0);
    assert!(db.load("note|n1").expect("load").updates.is_empty());
    db.clear("note|n1").expect("clear is idempotent");
}

#[test]
fn backup_copies_data_file() {
    let temp = TempDir::new().expect("temp dir");
    let path = temp.path().join("notebook");
    let path = path.to_str().expect("path");

    let manager = BackupManager::new(path);
    assert_eq!(manager.create_backup().expect("no data yet"), None);

    let db = Database::new(path).expect("db");
    db.append("note|n1", &updates(&["payload"])).expect("append");
    drop(db);

    let backup_dir = manager
        .create_backup()
        .expect("backup")
        .expect("backup dir");
    assert!(backup_dir.join(REDB_FILE_NAME).exists());
    assert!(backup_dir
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with("notebook.backup.")));
}
