//! Collection names and operational bounds for the tabular store.
//!
//! Centralized so a deployment can rename collections (or point several
//! ledgers at one backend) without touching code.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Loan headers.
    pub loans: String,
    /// Amortization schedule rows, one per installment.
    pub loan_installments: String,
    /// Append-only loan payment ledger.
    pub loan_payments: String,
    /// Person directory.
    pub persons: String,
    /// Variable-expense debts (debtor owes creditor).
    pub debts: String,
    /// Partial payments against debts.
    pub debt_payments: String,
    /// Upper bound on advisory lock acquisition.
    pub lock_wait_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            loans: "loans".to_string(),
            loan_installments: "loan_installments".to_string(),
            loan_payments: "loan_payments".to_string(),
            persons: "persons".to_string(),
            debts: "debts".to_string(),
            debt_payments: "debt_payments".to_string(),
            lock_wait_ms: 15_000,
        }
    }
}

impl StoreConfig {
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}
