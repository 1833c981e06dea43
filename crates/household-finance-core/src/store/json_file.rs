//! Single-file JSON backend: the whole store is one serialized document.
//!
//! Good for a household-sized data set; every mutation rewrites the file so
//! a crash can lose at most the in-flight operation, never corrupt prior
//! state (the write goes through a temp file + rename).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LedgerError;

use super::memory::{MemoryStore, Snapshot};
use super::{FieldMap, Record, StoreResult, TabularStore};

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    mem: MemoryStore,
}

impl JsonFileStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let snapshot: Snapshot = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| LedgerError::Store(format!("read {}: {e}", path.display())))?;
            if raw.trim().is_empty() {
                Snapshot::default()
            } else {
                serde_json::from_str(&raw)
                    .map_err(|e| LedgerError::Store(format!("parse {}: {e}", path.display())))?
            }
        } else {
            Snapshot::default()
        };
        Ok(JsonFileStore {
            path,
            mem: MemoryStore::from_snapshot(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> StoreResult<()> {
        let snapshot = self.mem.snapshot();
        let body = serde_json::to_string_pretty(&snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body)
            .map_err(|e| LedgerError::Store(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| LedgerError::Store(format!("rename {}: {e}", self.path.display())))?;
        Ok(())
    }
}

impl TabularStore for JsonFileStore {
    fn ensure_collection(&self, collection: &str, required_fields: &[&str]) -> StoreResult<()> {
        self.mem.ensure_collection(collection, required_fields)?;
        self.persist()
    }

    fn list_records(&self, collection: &str) -> StoreResult<Vec<Record>> {
        self.mem.list_records(collection)
    }

    fn upsert_record(&self, collection: &str, key: &str, fields: FieldMap) -> StoreResult<()> {
        self.mem.upsert_record(collection, key, fields)?;
        self.persist()
    }

    fn delete_record(&self, collection: &str, key: &str) -> StoreResult<()> {
        self.mem.delete_record(collection, key)?;
        self.persist()
    }

    fn flush(&self) -> StoreResult<()> {
        self.persist()
    }
}
