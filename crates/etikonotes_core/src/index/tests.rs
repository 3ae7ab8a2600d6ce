use super::*;
use crate::db::memory::{MemoryStore, StoreOp};
use std::collections::HashMap;
use yrs::StateVector;

fn index_on(store: &Arc<MemoryStore>) -> MetadataIndex {
    let store: Arc<dyn UpdateStore> = store.clone();
    MetadataIndex::new(store, PersistenceOptions::default()).expect("index")
}

#[tokio::test]
async fn empty_index_lists_nothing() {
    let store = Arc::new(MemoryStore::new());
    let index = index_on(&store);
    assert!(index.list().await.expect("list").is_empty());
    assert_eq!(index.get("missing").await.expect("get"), None);
    index.close().await.expect("close");
}

#[tokio::test]
async fn save_then_get_round_trips() {
    let store = Arc::new(MemoryStore::new());
    let index = index_on(&store);
    let meta = NoteMetadata::new("n1", "Hello", 1_000);
    index.save(&meta).await.expect("save");
    assert_eq!(index.get("n1").await.expect("get"), Some(meta));
    index.close().await.expect("close");
}

#[tokio::test]
async fn list_orders_by_last_modified_descending() {
    let store = Arc::new(MemoryStore::new());
    let index = index_on(&store);
    index
        .save(&NoteMetadata::new("a", "A", 10))
        .await
        .expect("save a");
    index
        .save(&NoteMetadata::new("b", "B", 30))
        .await
        .expect("save b");
    index
        .save(&NoteMetadata::new("c", "C", 20))
        .await
        .expect("save c");

    let ids: Vec<String> = index
        .list()
        .await
        .expect("list")
        .into_iter()
        .map(|meta| meta.id)
        .collect();
    assert_eq!(ids, vec!["b", "c", "a"]);
    index.close().await.expect("close");
}

#[tokio::test]
async fn save_updates_existing_entry_in_place() {
    let store = Arc::new(MemoryStore::new());
    let index = index_on(&store);
    index
        .save(&NoteMetadata::new("n1", "First", 1))
        .await
        .expect("save");
    {
        let mut txn = index.doc.transact_mut();
        match index.notes.get(&txn, "n1") {
            Some(Out::YMap(entry)) => {
                entry.insert(&mut txn, "pinned", true);
            }
            other => panic!("expected nested map, got {:?}", other),
        }
    }

    index
        .save(&NoteMetadata::new("n1", "Second", 2))
        .await
        .expect("update");
    {
        let txn = index.doc.transact();
        match index.notes.get(&txn, "n1") {
            Some(Out::YMap(entry)) => {
                assert!(matches!(
                    entry.get(&txn, "pinned"),
                    Some(Out::Any(Any::Bool(true)))
                ));
            }
            other => panic!("expected nested map, got {:?}", other),
        }
    }

    let meta = index.get("n1").await.expect("get").expect("entry");
    assert_eq!(meta.title, "Second");
    assert_eq!(meta.last_modified, 2);
    index.close().await.expect("close");
}

#[tokio::test]
async fn delete_reports_whether_an_entry_existed() {
    let store = Arc::new(MemoryStore::new());
    let index = index_on(&store);
    index
        .save(&NoteMetadata::new("n1", "Doomed", 1))
        .await
        .expect("save");
    assert!(index.delete("n1").await.expect("delete"));
    assert!(!index.delete("n1").await.expect("second delete"));
    assert!(!index.delete("never").await.expect("unknown delete"));
    assert!(index.list().await.expect("list").is_empty());
    index.close().await.expect("close");
}

#[tokio::test]
async fn entries_survive_reopen() {
    let store = Arc::new(MemoryStore::new());
    let index = index_on(&store);
    index
        .save(&NoteMetadata::new("n1", "Persisted", 1_700_000_000_000))
        .await
        .expect("save");
    index.close().await.expect("close");

    let reopened = index_on(&store);
    let meta = reopened.get("n1").await.expect("get").expect("entry");
    assert_eq!(meta.title, "Persisted");
    assert_eq!(meta.last_modified, 1_700_000_000_000);
    reopened.close().await.expect("close");
}

#[tokio::test]
async fn plain_object_entries_are_read_and_replaced_on_save() {
    let store = Arc::new(MemoryStore::new());
    {
        let peer = Doc::new();
        let notes = peer.get_or_insert_map(NOTES_MAP_NAME);
        let mut fields = HashMap::new();
        fields.insert("id".to_string(), Any::String("js1".into()));
        fields.insert("title".to_string(), Any::String("From JS".into()));
        fields.insert("lastModified".to_string(), Any::Number(5_000.0));
        notes.insert(&mut peer.transact_mut(), "js1", Any::Map(fields.into()));
        let update = peer
            .transact()
            .encode_state_as_update_v1(&StateVector::default());
        store
            .append(METADATA_STORE_NAME, &[update])
            .expect("seed update");
    }

    let index = index_on(&store);
    let meta = index.get("js1").await.expect("get").expect("entry");
    assert_eq!(meta, NoteMetadata::new("js1", "From JS", 5_000));

    index
        .save(&NoteMetadata::new("js1", "Edited", 6_000))
        .await
        .expect("save");
    {
        let txn = index.doc.transact();
        assert!(matches!(index.notes.get(&txn, "js1"), Some(Out::YMap(_))));
    }
    let meta = index.get("js1").await.expect("get").expect("entry");
    assert_eq!(meta.title, "Edited");
    index.close().await.expect("close");
}

#[tokio::test]
async fn sync_failure_propagates_and_later_calls_retry() {
    let store = Arc::new(MemoryStore::new());
    store.fail(StoreOp::Load);
    let index = index_on(&store);
    assert!(index.list().await.is_err());
    assert!(index
        .save(&NoteMetadata::new("n1", "Blocked", 1))
        .await
        .is_err());

    store.heal(StoreOp::Load);
    index
        .save(&NoteMetadata::new("n1", "Retried", 1))
        .await
        .expect("save after heal");
    assert_eq!(index.list().await.expect("list").len(), 1);
    index.close().await.expect("close");
}

#[tokio::test]
async fn save_loaded_requires_initial_load() {
    let store = Arc::new(MemoryStore::new());
    let index = index_on(&store);
    let err = index
        .save_loaded(&NoteMetadata::new("n1", "Early", 1))
        .expect_err("not synced");
    assert!(matches!(err, AppError::Internal(_)));
    index.when_synced().await.expect("sync");
    index
        .save_loaded(&NoteMetadata::new("n1", "Late", 1))
        .expect("synced save");
    index.close().await.expect("close");
}
