//! The abstract tabular record store the ledger core computes over.
//!
//! The contract is deliberately spreadsheet-shaped: named collections of
//! ordered rows, each row a flat map of string fields. Everything the core
//! persists round-trips through plain strings; typed interpretation happens
//! at the domain layer. Implementations are extensions of this module:
//! [`memory::MemoryStore`] for tests and ephemeral runs,
//! [`json_file::JsonFileStore`] for a durable single-file backend.

pub mod json_file;
pub mod lock;
pub mod memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

pub type StoreResult<T> = Result<T, LedgerError>;

/// Field name → string value. Keys are field names; missing reads as "".
pub type FieldMap = BTreeMap<String, String>;

/// One row in a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub fields: FieldMap,
}

impl Record {
    pub fn new(key: impl Into<String>) -> Self {
        Record {
            key: key.into(),
            fields: FieldMap::new(),
        }
    }

    /// Field value, empty string when absent.
    pub fn get(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, name: &str, value: impl ToString) -> &mut Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }
}

/// Contract of the persistent backend.
///
/// `list_records` on an unknown collection returns an empty sequence:
/// aggregate reads must stay tolerant of a half-provisioned store, the same
/// way the mutating paths call [`TabularStore::ensure_collection`] first.
pub trait TabularStore: Send + Sync {
    /// Create the collection if missing and register any absent fields.
    fn ensure_collection(&self, collection: &str, required_fields: &[&str]) -> StoreResult<()>;

    /// All rows of a collection in insertion order.
    fn list_records(&self, collection: &str) -> StoreResult<Vec<Record>>;

    /// Insert or fully replace the row at `key`.
    fn upsert_record(&self, collection: &str, key: &str, fields: FieldMap) -> StoreResult<()>;

    /// Remove the row at `key`. Unknown keys are a no-op.
    fn delete_record(&self, collection: &str, key: &str) -> StoreResult<()>;

    /// Read-after-write barrier. Callers that need to observe their own
    /// write immediately must call this after the mutating operation.
    fn flush(&self) -> StoreResult<()>;
}
