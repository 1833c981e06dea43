//! Payment waterfall: apply a payment across installments oldest-first,
//! and within each installment penalty → interest → principal.
//!
//! The precedence is fixed policy: clearing penalty first stops punitive
//! interest compounding, and clearing the oldest delinquency first mirrors
//! standard lender practice.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{non_negative, round2, Money, Rate};

use super::arrears::bring_penalties_current;
use super::model::{Installment, InstallmentAllocation};
use super::status::derive_installment_status;

/// Result of running a payment through the waterfall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallOutcome {
    pub allocations: Vec<InstallmentAllocation>,
    pub penalty_applied: Money,
    pub interest_applied: Money,
    pub principal_applied: Money,
    /// Amount left after every obligation was exhausted.
    pub credit_balance: Money,
}

/// Apply `amount` to the installments as of `as_of`, mutating them in place.
///
/// Step 1 brings every installment's penalty current (the caller persists
/// both the accrual and the allocations). Step 2 walks installments in
/// their given order (callers pass them sorted by sequence number),
/// consuming the remainder per category. Whatever survives all
/// installments is returned as credit balance, never silently applied.
pub fn allocate(
    amount: Money,
    as_of: NaiveDate,
    daily_rate: Rate,
    installments: &mut [Installment],
) -> WaterfallOutcome {
    bring_penalties_current(installments, daily_rate, as_of);

    let mut remainder = round2(amount);
    let mut allocations = Vec::new();
    let mut penalty_applied = Decimal::ZERO;
    let mut interest_applied = Decimal::ZERO;
    let mut principal_applied = Decimal::ZERO;

    for inst in installments.iter_mut() {
        if remainder <= Decimal::ZERO {
            break;
        }
        let penalty_pending = inst.penalty_pending();
        let interest_pending = inst.interest_pending();
        let principal_pending = inst.principal_pending();
        let total_pending = round2(penalty_pending + interest_pending + principal_pending);

        if total_pending > Decimal::ZERO {
            let mut allocation = InstallmentAllocation {
                installment_id: inst.id.clone(),
                number: inst.number,
                penalty: Decimal::ZERO,
                interest: Decimal::ZERO,
                principal: Decimal::ZERO,
            };

            let paid = take(&mut remainder, penalty_pending);
            if paid > Decimal::ZERO {
                inst.penalty_paid = round2(inst.penalty_paid + paid);
                allocation.penalty = paid;
                penalty_applied = round2(penalty_applied + paid);
            }

            let paid = take(&mut remainder, interest_pending);
            if paid > Decimal::ZERO {
                inst.interest_paid = round2(inst.interest_paid + paid);
                allocation.interest = paid;
                interest_applied = round2(interest_applied + paid);
            }

            let paid = take(&mut remainder, principal_pending);
            if paid > Decimal::ZERO {
                inst.principal_paid = round2(inst.principal_paid + paid);
                allocation.principal = paid;
                principal_applied = round2(principal_applied + paid);
            }

            if allocation.penalty > Decimal::ZERO
                || allocation.interest > Decimal::ZERO
                || allocation.principal > Decimal::ZERO
            {
                allocations.push(allocation);
            }
        }

        inst.status = derive_installment_status(inst.total_pending(), inst.due_date, as_of);
    }

    WaterfallOutcome {
        allocations,
        penalty_applied,
        interest_applied,
        principal_applied,
        credit_balance: round2(non_negative(remainder)),
    }
}

/// Consume up to `available` from the remainder. Returns the amount taken.
fn take(remainder: &mut Money, available: Money) -> Money {
    let paid = round2((*remainder).min(non_negative(available)));
    if paid <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    *remainder = round2(*remainder - paid);
    paid
}
