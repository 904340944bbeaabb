//! Sync reconciliation integration tests
//!
//! Last-writer-wins merge, idempotence, and replica convergence.

mod common;

use common::fixtures::{plan, store, word};
use dwords_core::{
    RecordStore, StoreError, StoreEvent, SyncBatch, Version, WordPatch, WordStatus,
};
use proptest::prelude::*;
use uuid::Uuid;

fn seeded(local_version: i64) -> (dwords_core::SqliteRecordStore, Uuid) {
    let store = store("device-a");
    let id = Uuid::new_v4();
    store
        .apply_batch(&SyncBatch {
            plans: vec![plan(id, "p", 1, "device-a")],
            words: vec![word(id, "apple", "local", local_version, "device-a")],
        })
        .unwrap();
    (store, id)
}

#[test]
fn test_older_remote_is_discarded() {
    let (store, id) = seeded(10);
    let before = store.get_word(id, "apple").unwrap().unwrap();

    let report = store
        .apply_batch(&SyncBatch {
            plans: vec![],
            words: vec![word(id, "apple", "remote", 7, "device-b")],
        })
        .unwrap();
    assert_eq!(report.discarded, 1);
    assert_eq!(store.get_word(id, "apple").unwrap().unwrap(), before);
}

#[test]
fn test_newer_remote_replaces_fields_and_deleted() {
    let (store, id) = seeded(10);

    let mut remote = word(id, "apple", "remote", 15, "device-b");
    remote.deleted = true;
    remote.status = WordStatus::Memorized;
    let report = store
        .apply_batch(&SyncBatch {
            plans: vec![],
            words: vec![remote.clone()],
        })
        .unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(store.get_word(id, "apple").unwrap().unwrap(), remote);
}

#[test]
fn test_reapplying_a_batch_changes_nothing() {
    let (store, id) = seeded(10);
    let batch = SyncBatch {
        plans: vec![plan(id, "renamed", 20, "device-b")],
        words: vec![
            word(id, "apple", "remote", 15, "device-b"),
            word(id, "pear", "梨", 16, "device-b"),
        ],
    };

    store.apply_batch(&batch).unwrap();
    let snapshot = store.export_changes(Version::ZERO).unwrap();

    let report = store.apply_batch(&batch).unwrap();
    assert_eq!(report.inserted + report.updated, 0);
    assert_eq!(report.discarded, batch.len());
    assert_eq!(store.export_changes(Version::ZERO).unwrap(), snapshot);
}

#[test]
fn test_rename_travels_as_tombstone_and_insert() {
    let phone = store("device-a");
    let laptop = store("device-b");

    let id = phone.create_plan("p").unwrap();
    phone.add_word(id, "colour", 1, "颜色").unwrap();
    laptop
        .apply_batch(&phone.export_changes(Version::ZERO).unwrap())
        .unwrap();

    let mark = phone.get_word(id, "colour").unwrap().unwrap().version;
    phone
        .update_word(id, "colour", &WordPatch::new().rename("color"))
        .unwrap();
    let delta = phone.export_changes(mark).unwrap();
    assert_eq!(delta.words.len(), 2);

    laptop.apply_batch(&delta).unwrap();
    assert!(laptop.get_word(id, "colour").unwrap().unwrap().deleted);
    assert_eq!(
        laptop.get_word(id, "color").unwrap().unwrap().paraphrase,
        "颜色"
    );
}

#[test]
fn test_replicas_converge_after_exchange() {
    let a = store("device-a");
    let b = store("device-b");

    let id = a.create_plan("shared").unwrap();
    a.add_word(id, "apple", 1, "苹果").unwrap();
    b.apply_batch(&a.export_changes(Version::ZERO).unwrap()).unwrap();

    // Concurrent edits stamp the same version; the greater origin wins
    a.update_word(id, "apple", &WordPatch::new().color("red"))
        .unwrap();
    b.update_word(id, "apple", &WordPatch::new().color("blue"))
        .unwrap();
    b.add_word(id, "pear", 2, "梨").unwrap();

    let from_a = a.export_changes(Version::ZERO).unwrap();
    let from_b = b.export_changes(Version::ZERO).unwrap();
    a.apply_batch(&from_b).unwrap();
    b.apply_batch(&from_a).unwrap();

    let a_words = a.list_words(id, dwords_core::WordList::All, 20).unwrap();
    let b_words = b.list_words(id, dwords_core::WordList::All, 20).unwrap();
    assert_eq!(a_words, b_words);
    assert_eq!(a_words.len(), 2);
}

#[test]
fn test_remote_plan_tombstone_removes_local_words() {
    let (store, id) = seeded(10);
    let mut tombstone = plan(id, "p", 30, "device-b");
    tombstone.deleted = true;

    store
        .apply_batch(&SyncBatch {
            plans: vec![tombstone],
            words: vec![word(id, "late", "", 40, "device-b")],
        })
        .unwrap();
    assert!(store.get_plan(id).unwrap().unwrap().deleted);
    assert!(store.get_word(id, "apple").unwrap().is_none());
    assert!(store.get_word(id, "late").unwrap().is_none());
}

#[test]
fn test_version_past_ceiling_is_rejected() {
    let store = store("device-a");
    let id = Uuid::new_v4();

    let err = store
        .apply_batch(&SyncBatch {
            plans: vec![plan(id, "huge", i64::MAX, "device-b")],
            words: vec![],
        })
        .unwrap_err();
    assert!(matches!(&err, StoreError::VersionOutOfRange { version, .. } if *version == i64::MAX));
    assert!(err.is_validation());
    assert!(store.get_plan(id).unwrap().is_none());

    // Local writes keep working afterwards
    let local = store.create_plan("local").unwrap();
    assert_eq!(store.list_plans().unwrap().len(), 1);
    assert!(store.add_word(local, "apple", 1, "").unwrap());

    let at_ceiling = Uuid::new_v4();
    store
        .apply_batch(&SyncBatch {
            plans: vec![plan(at_ceiling, "edge", Version::MAX.value(), "device-b")],
            words: vec![],
        })
        .unwrap();
    store.rename_plan(local, "still local").unwrap();
    assert!(store.get_plan(local).unwrap().unwrap().version > Version::MAX);
}

#[test]
fn test_failed_record_keeps_earlier_records() {
    let store = store("device-a");
    let id = Uuid::new_v4();
    let mut batch = SyncBatch {
        plans: vec![plan(id, "p", 1, "device-b")],
        words: vec![
            word(id, "apple", "苹果", 2, "device-b"),
            word(id, "pear", "梨", i64::MAX, "device-b"),
            word(id, "plum", "李子", 3, "device-b"),
        ],
    };

    assert!(store.apply_batch(&batch).is_err());
    assert!(store.get_plan(id).unwrap().is_some());
    assert_eq!(store.get_word(id, "apple").unwrap().unwrap(), batch.words[0]);
    assert!(store.get_word(id, "pear").unwrap().is_none());
    assert!(store.get_word(id, "plum").unwrap().is_none());
    assert_eq!(store.count_words(id).unwrap(), 1);

    batch.words[1].version = Version(4);
    store.apply_batch(&batch).unwrap();

    let clean = common::fixtures::store("device-a");
    clean.apply_batch(&batch).unwrap();
    assert_eq!(
        store.export_changes(Version::ZERO).unwrap(),
        clean.export_changes(Version::ZERO).unwrap()
    );
}

#[test]
fn test_failed_batch_still_notifies_applied_records() {
    let store = store("device-a");
    let rx = store.subscribe().unwrap();
    let id = Uuid::new_v4();

    let result = store.apply_batch(&SyncBatch {
        plans: vec![plan(id, "p", 1, "device-b")],
        words: vec![
            word(id, "apple", "苹果", 2, "device-b"),
            word(id, "pear", "梨", i64::MAX, "device-b"),
        ],
    });
    assert!(result.is_err());
    assert_eq!(rx.try_recv().unwrap(), StoreEvent::ListChanged { plan_id: id });
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_batch_json_round_trip() {
    let id = Uuid::new_v4();
    let batch = SyncBatch {
        plans: vec![plan(id, "p", 3, "device-a")],
        words: vec![word(id, "apple", "苹果", 4, "device-a")],
    };
    let json = serde_json::to_string(&batch).unwrap();
    let back: SyncBatch = serde_json::from_str(&json).unwrap();
    assert_eq!(back, batch);

    let empty: SyncBatch = serde_json::from_str("{}").unwrap();
    assert!(empty.is_empty());
}

fn remote_word_strategy(id: Uuid) -> impl Strategy<Value = dwords_core::Word> {
    (
        prop::sample::select(vec!["ant", "bee", "cat"]),
        "[a-z]{0,4}",
        1..20i64,
        prop::sample::select(vec!["device-b", "device-c"]),
        any::<bool>(),
    )
        .prop_map(move |(w, paraphrase, version, origin, deleted)| {
            let mut record = word(id, w, &paraphrase, version, origin);
            record.deleted = deleted;
            record
        })
}

proptest! {
    #[test]
    fn test_apply_is_idempotent(
        words in prop::collection::vec(remote_word_strategy(Uuid::nil()), 0..20)
    ) {
        let store = store("device-a");
        let batch = SyncBatch { plans: vec![], words };

        store.apply_batch(&batch).unwrap();
        let once = store.export_changes(Version::ZERO).unwrap();
        store.apply_batch(&batch).unwrap();
        let twice = store.export_changes(Version::ZERO).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_order_does_not_matter(
        words in prop::collection::vec(remote_word_strategy(Uuid::nil()), 0..20)
    ) {
        let forward = store("device-a");
        let backward = store("device-a");

        forward.apply_batch(&SyncBatch { plans: vec![], words: words.clone() }).unwrap();
        let mut reversed = words;
        reversed.reverse();
        backward.apply_batch(&SyncBatch { plans: vec![], words: reversed }).unwrap();

        let mut a = forward.export_changes(Version::ZERO).unwrap().words;
        let mut b = backward.export_changes(Version::ZERO).unwrap().words;
        a.sort_by(|x, y| x.word.cmp(&y.word));
        b.sort_by(|x, y| x.word.cmp(&y.word));
        prop_assert_eq!(a, b);
    }
}
