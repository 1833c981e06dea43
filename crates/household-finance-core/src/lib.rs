pub mod config;
pub mod dates;
pub mod error;
pub mod persons;
pub mod store;
pub mod types;

#[cfg(feature = "loans")]
pub mod loans;

#[cfg(feature = "netting")]
pub mod netting;

pub use error::LedgerError;
pub use types::*;

/// Standard result type for all ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
