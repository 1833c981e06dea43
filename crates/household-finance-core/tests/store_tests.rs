use std::sync::Arc;
use std::time::Duration;

use household_finance_core::store::json_file::JsonFileStore;
use household_finance_core::store::lock::LockRegistry;
use household_finance_core::store::memory::MemoryStore;
use household_finance_core::store::{FieldMap, TabularStore};
use household_finance_core::LedgerError;
use pretty_assertions::assert_eq;

fn fields(pairs: &[(&str, &str)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ===========================================================================
// Memory store
// ===========================================================================

#[test]
fn test_ensure_collection_registers_missing_fields_only() {
    let store = MemoryStore::new();
    store.ensure_collection("t", &["id", "name"]).unwrap();
    store.ensure_collection("t", &["id", "name", "extra"]).unwrap();
    store
        .upsert_record("t", "1", fields(&[("id", "1"), ("extra", "x")]))
        .unwrap();
    let rows = store.list_records("t").unwrap();
    assert_eq!(rows[0].get("extra"), "x");
    assert_eq!(rows[0].get("missing"), "");
}

#[test]
fn test_delete_is_a_no_op_for_unknown_keys() {
    let store = MemoryStore::new();
    store.ensure_collection("t", &["id"]).unwrap();
    store.delete_record("t", "ghost").unwrap();
    store.delete_record("never-created", "ghost").unwrap();
}

// ===========================================================================
// JSON file store
// ===========================================================================

#[test]
fn test_json_file_store_round_trips_collections_and_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");

    {
        let store = JsonFileStore::open(&path).unwrap();
        store.ensure_collection("debts", &["id", "amount"]).unwrap();
        for (key, amount) in [("d3", "30"), ("d1", "10"), ("d2", "20")] {
            store
                .upsert_record("debts", key, fields(&[("id", key), ("amount", amount)]))
                .unwrap();
        }
        store.flush().unwrap();
    }

    // A fresh handle sees the same rows in the same insertion order.
    let reopened = JsonFileStore::open(&path).unwrap();
    let rows = reopened.list_records("debts").unwrap();
    let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["d3", "d1", "d2"]);
    assert_eq!(rows[1].get("amount"), "10");
}

#[test]
fn test_json_file_store_persists_each_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");

    let store = JsonFileStore::open(&path).unwrap();
    store.ensure_collection("t", &["id"]).unwrap();
    store
        .upsert_record("t", "1", fields(&[("id", "1")]))
        .unwrap();

    // No explicit flush: the write is already durable.
    let other = JsonFileStore::open(&path).unwrap();
    assert_eq!(other.list_records("t").unwrap().len(), 1);

    store.delete_record("t", "1").unwrap();
    let other = JsonFileStore::open(&path).unwrap();
    assert!(other.list_records("t").unwrap().is_empty());
}

#[test]
fn test_json_file_store_rejects_corrupt_documents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    std::fs::write(&path, "{ not json").unwrap();
    let err = JsonFileStore::open(&path).unwrap_err();
    assert!(matches!(err, LedgerError::Store(_)));
}

// ===========================================================================
// Advisory locks
// ===========================================================================

#[test]
fn test_lock_contention_across_threads_times_out_and_recovers() {
    let registry = Arc::new(LockRegistry::new());

    let guard = registry.acquire("loans", Duration::from_millis(100)).unwrap();
    let contender = {
        let registry = registry.clone();
        std::thread::spawn(move || registry.acquire("loans", Duration::from_millis(50)))
    };
    let err = contender.join().unwrap().unwrap_err();
    assert!(matches!(err, LedgerError::LockTimeout { .. }));
    assert!(err.is_retryable());

    drop(guard);
    assert!(registry.acquire("loans", Duration::from_millis(50)).is_ok());
}
