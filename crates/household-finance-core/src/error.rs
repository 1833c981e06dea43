use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid input: {field} — {reason}")]
    Validation { field: String, reason: String },

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Advisory lock \"{key}\" not acquired within {waited_ms} ms")]
    LockTimeout { key: String, waited_ms: u64 },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Date error: {0}")]
    Date(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LedgerError {
    /// Shorthand for the most common rejection.
    pub fn validation(field: &str, reason: &str) -> Self {
        LedgerError::Validation {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Lock timeouts are the only failures a caller should blindly retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::LockTimeout { .. })
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}
