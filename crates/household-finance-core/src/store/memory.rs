//! In-memory store. Backs the test suites and is the substrate the
//! JSON-file extension persists.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{FieldMap, Record, StoreResult, TabularStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Collection {
    /// Known field names, registration order.
    pub(crate) fields: Vec<String>,
    /// Rows in insertion order.
    pub(crate) rows: Vec<Record>,
}

pub(crate) type Snapshot = BTreeMap<String, Collection>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Self {
        MemoryStore {
            inner: RwLock::new(snapshot),
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        self.inner.read().clone()
    }
}

impl TabularStore for MemoryStore {
    fn ensure_collection(&self, collection: &str, required_fields: &[&str]) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let entry = inner.entry(collection.to_string()).or_default();
        for field in required_fields {
            if !entry.fields.iter().any(|f| f.eq_ignore_ascii_case(field)) {
                entry.fields.push(field.to_string());
            }
        }
        Ok(())
    }

    fn list_records(&self, collection: &str) -> StoreResult<Vec<Record>> {
        Ok(self
            .inner
            .read()
            .get(collection)
            .map(|c| c.rows.clone())
            .unwrap_or_default())
    }

    fn upsert_record(&self, collection: &str, key: &str, fields: FieldMap) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let entry = inner.entry(collection.to_string()).or_default();
        let record = Record {
            key: key.to_string(),
            fields,
        };
        match entry.rows.iter_mut().find(|r| r.key == key) {
            Some(existing) => *existing = record,
            None => entry.rows.push(record),
        }
        Ok(())
    }

    fn delete_record(&self, collection: &str, key: &str) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.get_mut(collection) {
            entry.rows.retain(|r| r.key != key);
        }
        Ok(())
    }

    fn flush(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_replaces_in_place_and_keeps_order() {
        let store = MemoryStore::new();
        store.ensure_collection("t", &["id", "v"]).unwrap();
        for (k, v) in [("a", "1"), ("b", "2"), ("c", "3")] {
            let mut fields = FieldMap::new();
            fields.insert("id".into(), k.into());
            fields.insert("v".into(), v.into());
            store.upsert_record("t", k, fields).unwrap();
        }
        let mut fields = FieldMap::new();
        fields.insert("id".into(), "b".into());
        fields.insert("v".into(), "20".into());
        store.upsert_record("t", "b", fields).unwrap();

        let rows = store.list_records("t").unwrap();
        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(rows[1].get("v"), "20");
    }

    #[test]
    fn unknown_collection_lists_empty() {
        let store = MemoryStore::new();
        assert!(store.list_records("nope").unwrap().is_empty());
    }
}
