//! Arrears (penalty) accrual.
//!
//! Penalty accrues daily on an installment's unpaid base balance from the
//! later of its due date and its accrual checkpoint. Advancing the
//! checkpoint is what makes repeated accrual idempotent; only payment
//! events persist it, read paths project without mutating.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::dates::whole_days_between;
use crate::types::{non_negative, round2, Money, Rate};

use super::model::Installment;
use super::status::{derive_installment_status, InstallmentStatus};

const DAYS_PER_MONTH: Decimal = dec!(30);

/// Daily penalty rate from a monthly one (30-day convention).
pub fn daily_penalty_rate(monthly_rate: Rate) -> Rate {
    monthly_rate / DAYS_PER_MONTH
}

/// Newly accrued penalty on an overdue base balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accrual {
    pub added: Money,
    /// New checkpoint: accrual is now complete through this date.
    pub through: NaiveDate,
}

/// Penalty accrued between the checkpoint and `as_of`.
///
/// Returns `None` when nothing accrues: no penalty rate, nothing overdue,
/// or the span has already been accrued.
pub fn accrue_penalty(
    base_pending: Money,
    due_date: NaiveDate,
    checkpoint: Option<NaiveDate>,
    daily_rate: Rate,
    as_of: NaiveDate,
) -> Option<Accrual> {
    if daily_rate <= Decimal::ZERO || base_pending <= Decimal::ZERO {
        return None;
    }
    if as_of <= due_date {
        return None;
    }
    let from = checkpoint.map_or(due_date, |cp| cp.max(due_date));
    let days = whole_days_between(as_of, from);
    if days <= 0 {
        return None;
    }
    let added = round2(base_pending * daily_rate * Decimal::from(days));
    Some(Accrual {
        added,
        through: as_of,
    })
}

/// Accrue penalty on every installment and persist it into the slice.
/// Used by the payment path; the resulting checkpoints must be written back.
pub fn bring_penalties_current(installments: &mut [Installment], daily_rate: Rate, as_of: NaiveDate) {
    for inst in installments.iter_mut() {
        let Some(due) = inst.due_date else { continue };
        if let Some(accrual) =
            accrue_penalty(inst.base_pending(), due, inst.penalty_through, daily_rate, as_of)
        {
            inst.penalty_accrued = round2(inst.penalty_accrued + accrual.added);
            inst.penalty_through = Some(accrual.through);
        }
    }
}

// ---------------------------------------------------------------------------
// Read-time projection
// ---------------------------------------------------------------------------

/// An installment's balances brought current to an as-of date, without
/// touching stored state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallmentView {
    #[serde(flatten)]
    pub installment: Installment,
    pub interest_pending: Money,
    pub principal_pending: Money,
    /// Penalty accrued through `as_of`, including the unpersisted portion.
    pub penalty_to_date: Money,
    pub penalty_pending: Money,
    pub total_pending: Money,
    pub status_as_of: InstallmentStatus,
}

/// Project an installment to `as_of`. Pure: the stored checkpoint and
/// cumulative figures are left untouched.
pub fn project(installment: &Installment, daily_rate: Rate, as_of: NaiveDate) -> InstallmentView {
    let interest_pending = installment.interest_pending();
    let principal_pending = installment.principal_pending();
    let base_pending = installment.base_pending();

    let extra = installment
        .due_date
        .and_then(|due| {
            accrue_penalty(
                base_pending,
                due,
                installment.penalty_through,
                daily_rate,
                as_of,
            )
        })
        .map(|a| a.added)
        .unwrap_or(Decimal::ZERO);

    let penalty_to_date = round2(installment.penalty_accrued + extra);
    let penalty_pending = round2(non_negative(penalty_to_date - installment.penalty_paid));
    let total_pending = round2(base_pending + penalty_pending);
    let status_as_of = derive_installment_status(total_pending, installment.due_date, as_of);

    InstallmentView {
        installment: installment.clone(),
        interest_pending,
        principal_pending,
        penalty_to_date,
        penalty_pending,
        total_pending,
        status_as_of,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn nothing_accrues_before_or_on_due_date() {
        assert_eq!(
            accrue_penalty(dec!(100), d("2024-03-05"), None, dec!(0.002), d("2024-03-05")),
            None
        );
        assert_eq!(
            accrue_penalty(dec!(100), d("2024-03-05"), None, dec!(0.002), d("2024-02-20")),
            None
        );
    }

    #[test]
    fn nothing_accrues_without_base_or_rate() {
        assert_eq!(
            accrue_penalty(dec!(0), d("2024-03-05"), None, dec!(0.002), d("2024-04-01")),
            None
        );
        assert_eq!(
            accrue_penalty(dec!(100), d("2024-03-05"), None, dec!(0), d("2024-04-01")),
            None
        );
    }

    #[test]
    fn accrues_daily_from_due_date() {
        // 100 overdue for 10 days at 0.2% daily = 2.00
        let accrual =
            accrue_penalty(dec!(100), d("2024-03-05"), None, dec!(0.002), d("2024-03-15")).unwrap();
        assert_eq!(accrual.added, dec!(2.00));
        assert_eq!(accrual.through, d("2024-03-15"));
    }

    #[test]
    fn checkpoint_makes_accrual_idempotent() {
        let due = d("2024-03-05");
        let as_of = d("2024-03-15");
        let first = accrue_penalty(dec!(100), due, None, dec!(0.002), as_of).unwrap();
        // Second call with the advanced checkpoint: no further accrual.
        assert_eq!(
            accrue_penalty(dec!(100), due, Some(first.through), dec!(0.002), as_of),
            None
        );
    }

    #[test]
    fn checkpoint_before_due_date_is_ignored() {
        // A checkpoint seeded at schedule creation (the due date itself or
        // earlier) must not extend the accrual span backwards.
        let accrual = accrue_penalty(
            dec!(100),
            d("2024-03-05"),
            Some(d("2024-02-01")),
            dec!(0.002),
            d("2024-03-10"),
        )
        .unwrap();
        assert_eq!(accrual.added, dec!(1.00));
    }

    #[test]
    fn projection_does_not_mutate() {
        let inst = Installment {
            id: "i1".into(),
            loan_id: "l1".into(),
            number: 1,
            due_date: Some(d("2024-03-05")),
            payment: dec!(100),
            interest: dec!(20),
            principal: dec!(80),
            balance_after: dec!(0),
            interest_paid: dec!(0),
            principal_paid: dec!(0),
            penalty_accrued: dec!(0),
            penalty_paid: dec!(0),
            penalty_through: Some(d("2024-03-05")),
            status: InstallmentStatus::Pending,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let view = project(&inst, dec!(0.002), d("2024-03-15"));
        assert_eq!(view.penalty_to_date, dec!(2.00));
        assert_eq!(view.total_pending, dec!(102.00));
        assert_eq!(view.status_as_of, InstallmentStatus::Overdue);
        // Stored figures untouched.
        assert_eq!(view.installment.penalty_accrued, dec!(0));
        assert_eq!(view.installment.penalty_through, Some(d("2024-03-05")));
    }
}
