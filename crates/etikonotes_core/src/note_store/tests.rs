use super::*;
use crate::db::memory::{MemoryStore, StoreOp};
use crate::persistence::SyncTransport;
use std::sync::Mutex;

fn store_on(memory: &Arc<MemoryStore>) -> NoteStore {
    let store: Arc<dyn UpdateStore> = memory.clone();
    NoteStore::new(store, PersistenceOptions::default())
}

#[derive(Default)]
struct CountingTransport {
    attached: Mutex<Vec<String>>,
    detached: Mutex<Vec<String>>,
}

impl SyncTransport for CountingTransport {
    fn attach(&self, store_name: &str, _doc: &Doc) -> Result<(), AppError> {
        self.attached
            .lock()
            .expect("attached")
            .push(store_name.to_string());
        Ok(())
    }

    fn detach(&self, store_name: &str) {
        self.detached
            .lock()
            .expect("detached")
            .push(store_name.to_string());
    }
}

#[tokio::test]
async fn body_round_trips_through_close_and_reopen() {
    let memory = Arc::new(MemoryStore::new());
    let notes = store_on(&memory);

    let handle = notes.open("n1").await.expect("open");
    assert_eq!(handle.state(), NoteState::Open);
    assert!(handle.body().is_empty());
    handle.body().insert(0, "# Hello\nWorld");
    notes.close(handle).await;
    assert_eq!(notes.state("n1"), NoteState::Unopened);

    let handle = notes.open("n1").await.expect("reopen");
    assert_eq!(handle.body().text(), "# Hello\nWorld");
    notes.close(handle).await;
}

#[tokio::test]
async fn second_open_of_same_id_is_rejected() {
    let memory = Arc::new(MemoryStore::new());
    let notes = store_on(&memory);

    let handle = notes.open("n1").await.expect("open");
    let err = notes.open("n1").await.err().expect("double open");
    assert!(matches!(err, AppError::AlreadyOpen(ref id) if id == "n1"));
    assert_eq!(notes.open_ids(), vec!["n1".to_string()]);

    notes.close(handle).await;
    let handle = notes.open("n1").await.expect("open after close");
    notes.close(handle).await;
    assert!(notes.open_ids().is_empty());
}

#[tokio::test]
async fn delete_erases_stored_body() {
    let memory = Arc::new(MemoryStore::new());
    let notes = store_on(&memory);

    let handle = notes.open("n1").await.expect("open");
    handle.body().insert(0, "to be erased");
    notes.close(handle).await;
    assert!(notes.stored_bytes("n1").await.expect("bytes") > 0);

    let handle = notes.open_unsynced("n1").expect("unsynced");
    notes.delete(handle).await.expect("delete");
    assert_eq!(notes.stored_bytes("n1").await.expect("bytes"), 0);

    let handle = notes.open("n1").await.expect("reopen");
    assert!(handle.body().is_empty());
    notes.close(handle).await;
}

#[tokio::test]
async fn delete_failure_still_releases_handle() {
    let memory = Arc::new(MemoryStore::new());
    let notes = store_on(&memory);

    let handle = notes.open("n1").await.expect("open");
    handle.body().insert(0, "kept");
    memory.fail(StoreOp::Clear);
    let err = notes.delete(handle).await.expect_err("clear failure");
    assert!(matches!(err, AppError::Persistence { .. }));
    assert_eq!(notes.state("n1"), NoteState::Unopened);

    memory.heal(StoreOp::Clear);
    let handle = notes.open("n1").await.expect("reopen");
    assert_eq!(handle.body().text(), "kept");
    notes.close(handle).await;
}

#[tokio::test]
async fn close_survives_flush_failure() {
    let memory = Arc::new(MemoryStore::new());
    let notes = store_on(&memory);

    let handle = notes.open("n1").await.expect("open");
    memory.fail(StoreOp::Append);
    handle.body().insert(0, "unsaved");
    notes.close(handle).await;
    assert_eq!(notes.state("n1"), NoteState::Unopened);

    memory.heal(StoreOp::Append);
    let handle = notes.open("n1").await.expect("reopen");
    notes.close(handle).await;
}

#[tokio::test]
async fn failed_open_releases_the_id() {
    let memory = Arc::new(MemoryStore::new());
    let notes = store_on(&memory);

    memory.fail(StoreOp::Load);
    assert!(notes.open("n1").await.is_err());
    assert_eq!(notes.state("n1"), NoteState::Unopened);

    memory.heal(StoreOp::Load);
    let handle = notes.open("n1").await.expect("open after heal");
    notes.close(handle).await;
}

#[tokio::test]
async fn connect_attaches_transport_until_close() {
    let memory = Arc::new(MemoryStore::new());
    let notes = store_on(&memory);
    let transport = Arc::new(CountingTransport::default());

    let mut handle = notes.open("n1").await.expect("open");
    notes
        .connect(&mut handle, transport.clone())
        .expect("connect");
    notes.close(handle).await;

    assert_eq!(*transport.attached.lock().expect("attached"), vec!["note|n1"]);
    assert_eq!(*transport.detached.lock().expect("detached"), vec!["note|n1"]);
}

#[tokio::test]
async fn replace_markdown_issues_minimal_edits() {
    let memory = Arc::new(MemoryStore::new());
    let notes = store_on(&memory);
    let handle = notes.open("n1").await.expect("open");
    let body = handle.body();

    assert!(body.replace_markdown("# Title\nfirst line"));
    assert!(!body.replace_markdown("# Title\nfirst line"));
    assert!(body.replace_markdown("# Tïtle\nfirst and second line"));
    assert_eq!(body.text(), "# Tïtle\nfirst and second line");
    assert!(body.replace_markdown(""));
    assert!(body.is_empty());
    notes.close(handle).await;
}

#[tokio::test]
async fn replace_markdown_preserves_concurrent_remote_edits() {
    let memory = Arc::new(MemoryStore::new());
    let notes = store_on(&memory);
    let handle = notes.open("n1").await.expect("open");
    let body = handle.body();
    body.replace_markdown("alpha beta");

    let remote = NoteBody::new();
    {
        use yrs::updates::decoder::Decode;
        use yrs::{ReadTxn, StateVector, Update};
        let snapshot = body
            .doc()
            .transact()
            .encode_state_as_update_v1(&StateVector::default());
        remote
            .doc()
            .transact_mut()
            .apply_update(Update::decode_v1(&snapshot).expect("decode"))
            .expect("apply");
        remote.insert(0, ">> ");
        let remote_update = remote
            .doc()
            .transact()
            .encode_state_as_update_v1(&StateVector::default());

        body.replace_markdown("alpha gamma");
        body.doc()
            .transact_mut()
            .apply_update(Update::decode_v1(&remote_update).expect("decode"))
            .expect("apply");
    }
    assert_eq!(body.text(), ">> alpha gamma");
    notes.close(handle).await;
}

#[test]
fn char_offsets_cover_multibyte_text() {
    assert_eq!(char_byte_offsets("aé b"), vec![0, 1, 3, 4, 5]);
    assert_eq!(char_byte_offsets(""), vec![0]);
}
