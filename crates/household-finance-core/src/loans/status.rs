//! Pure status derivation. Statuses are never stored as primary truth:
//! every read recomputes them from balances and dates, and the persisted
//! field is only an opportunistic cache.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{round2, Money, BALANCE_EPSILON};

use super::model::LoanStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentStatus {
    Pending,
    Overdue,
    Paid,
}

impl InstallmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallmentStatus::Pending => "Pending",
            InstallmentStatus::Overdue => "Overdue",
            InstallmentStatus::Paid => "Paid",
        }
    }

    pub fn parse(raw: &str) -> InstallmentStatus {
        match raw.trim() {
            "Overdue" => InstallmentStatus::Overdue,
            "Paid" => InstallmentStatus::Paid,
            _ => InstallmentStatus::Pending,
        }
    }
}

/// Status of one installment from its pending total and due date.
pub fn derive_installment_status(
    total_pending: Money,
    due_date: Option<NaiveDate>,
    as_of: NaiveDate,
) -> InstallmentStatus {
    if round2(total_pending) <= BALANCE_EPSILON {
        return InstallmentStatus::Paid;
    }
    match due_date {
        Some(due) if as_of > due => InstallmentStatus::Overdue,
        _ => InstallmentStatus::Pending,
    }
}

/// Operative loan status from the outstanding total across all installments.
pub fn derive_loan_status(total_pending: Money) -> LoanStatus {
    if round2(total_pending) <= BALANCE_EPSILON {
        LoanStatus::Finalized
    } else {
        LoanStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn paid_wins_over_overdue() {
        let s = derive_installment_status(dec!(0.0000004), Some(d("2024-01-01")), d("2024-06-01"));
        assert_eq!(s, InstallmentStatus::Paid);
    }

    #[test]
    fn overdue_only_after_due_date() {
        assert_eq!(
            derive_installment_status(dec!(10), Some(d("2024-01-15")), d("2024-01-15")),
            InstallmentStatus::Pending
        );
        assert_eq!(
            derive_installment_status(dec!(10), Some(d("2024-01-15")), d("2024-01-16")),
            InstallmentStatus::Overdue
        );
        assert_eq!(
            derive_installment_status(dec!(10), None, d("2024-01-16")),
            InstallmentStatus::Pending
        );
    }

    #[test]
    fn loan_finalizes_at_zero() {
        assert_eq!(derive_loan_status(dec!(0)), LoanStatus::Finalized);
        assert_eq!(derive_loan_status(dec!(0.01)), LoanStatus::Active);
    }
}
