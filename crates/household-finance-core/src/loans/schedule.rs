//! Amortization generator: level-payment (annuity) schedule on the
//! outstanding-balance method.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::dates::{add_month_clamped, date_with_day, next_month};
use crate::error::LedgerError;
use crate::types::{non_negative, round2, Money, Rate};
use crate::LedgerResult;

/// Rates below this are treated as interest-free.
const ZERO_RATE_THRESHOLD: Decimal = dec!(0.000000000001);

#[derive(Debug, Clone)]
pub struct ScheduleParams {
    pub principal: Money,
    pub term_months: u32,
    /// Nominal monthly rate as a decimal (0.03 = 3%). Zero is interest-free.
    pub monthly_rate: Rate,
    pub disbursed_on: NaiveDate,
    /// Day of month payments fall due, clamped to 1–28.
    pub payment_day: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    pub number: u32,
    pub due_date: NaiveDate,
    /// Amount due this installment; the final one absorbs rounding drift.
    pub payment: Money,
    pub interest: Money,
    pub principal: Money,
    pub balance_after: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub level_payment: Money,
    pub first_due_date: NaiveDate,
    pub total_interest: Money,
    pub installments: Vec<ScheduledInstallment>,
}

/// Level payment from the annuity formula, unrounded.
///
/// cuota = P·r·(1+r)^N / ((1+r)^N − 1), or P/N when r = 0.
pub fn level_payment(principal: Money, monthly_rate: Rate, term_months: u32) -> LedgerResult<Money> {
    validate(principal, monthly_rate, term_months)?;
    let n = Decimal::from(term_months);
    if monthly_rate.abs() < ZERO_RATE_THRESHOLD {
        return Ok(principal / n);
    }
    let pow = (Decimal::ONE + monthly_rate).powd(n);
    let denominator = pow - Decimal::ONE;
    if denominator.is_zero() {
        return Err(LedgerError::validation(
            "monthly_rate",
            "annuity factor degenerated to zero",
        ));
    }
    Ok(principal * monthly_rate * pow / denominator)
}

/// Build the full installment schedule.
///
/// Guarantees: exactly `term_months` installments, and the principal
/// components sum to the principal exactly; the final installment's
/// principal is forced to the remaining balance so intermediate rounding
/// can never leave a residual.
pub fn build_schedule(params: &ScheduleParams) -> LedgerResult<Schedule> {
    let ScheduleParams {
        principal,
        term_months,
        monthly_rate,
        disbursed_on,
        payment_day,
    } = params;
    let cuota = round2(level_payment(*principal, *monthly_rate, *term_months)?);
    let payment_day = (*payment_day).clamp(1, 28);

    // First due date: day `payment_day` of the month after disbursement.
    let (first_year, first_month) = next_month(disbursed_on.year(), disbursed_on.month());
    let first_due_date = date_with_day(first_year, first_month, payment_day);

    let mut installments = Vec::with_capacity(*term_months as usize);
    let mut balance = *principal;
    let mut total_interest = Decimal::ZERO;
    let mut due_date = first_due_date;

    for number in 1..=*term_months {
        let interest = round2(balance * monthly_rate);
        let principal_part = if number == *term_months {
            round2(balance)
        } else {
            round2(cuota - interest)
        };
        balance = round2(non_negative(balance - principal_part));
        total_interest = round2(total_interest + interest);

        installments.push(ScheduledInstallment {
            number,
            due_date,
            payment: if number == *term_months {
                round2(principal_part + interest)
            } else {
                cuota
            },
            interest,
            principal: principal_part,
            balance_after: balance,
        });

        due_date = add_month_clamped(due_date, payment_day);
    }

    Ok(Schedule {
        level_payment: cuota,
        first_due_date,
        total_interest,
        installments,
    })
}

fn validate(principal: Money, monthly_rate: Rate, term_months: u32) -> LedgerResult<()> {
    if principal <= Decimal::ZERO {
        return Err(LedgerError::validation(
            "principal",
            "principal must be greater than 0",
        ));
    }
    if term_months == 0 {
        return Err(LedgerError::validation(
            "term_months",
            "term must be at least 1 month",
        ));
    }
    if monthly_rate < Decimal::ZERO {
        return Err(LedgerError::validation(
            "monthly_rate",
            "monthly rate cannot be negative",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn params(principal: Money, term: u32, rate: Rate) -> ScheduleParams {
        ScheduleParams {
            principal,
            term_months: term,
            monthly_rate: rate,
            disbursed_on: d("2024-01-15"),
            payment_day: 5,
        }
    }

    #[test]
    fn one_month_zero_rate_is_the_principal() {
        let schedule = build_schedule(&params(dec!(500), 1, dec!(0))).unwrap();
        assert_eq!(schedule.installments.len(), 1);
        assert_eq!(schedule.level_payment, dec!(500));
        assert_eq!(schedule.total_interest, dec!(0));
        assert_eq!(schedule.installments[0].principal, dec!(500));
        assert_eq!(schedule.installments[0].due_date, d("2024-02-05"));
    }

    #[test]
    fn principal_components_sum_exactly() {
        let schedule = build_schedule(&params(dec!(10000), 12, dec!(0.035))).unwrap();
        let total: Money = schedule.installments.iter().map(|i| i.principal).sum();
        assert_eq!(total, dec!(10000));
        assert_eq!(schedule.installments.last().unwrap().balance_after, dec!(0));
    }

    #[test]
    fn principal_sums_hold_across_parameter_grid() {
        for principal in [dec!(100), dec!(997.53), dec!(25000), dec!(3.01)] {
            for term in [1u32, 2, 7, 24, 60] {
                for rate in [dec!(0), dec!(0.01), dec!(0.0275), dec!(0.12)] {
                    let schedule = build_schedule(&params(principal, term, rate)).unwrap();
                    assert_eq!(schedule.installments.len(), term as usize);
                    let total: Money = schedule.installments.iter().map(|i| i.principal).sum();
                    assert_eq!(total, principal, "P={principal} N={term} r={rate}");
                }
            }
        }
    }

    #[test]
    fn annuity_payment_matches_reference() {
        // 10,000 at 3% monthly over 12 months: cuota ≈ 1,004.62
        let schedule = build_schedule(&params(dec!(10000), 12, dec!(0.03))).unwrap();
        assert_eq!(schedule.level_payment, dec!(1004.62));
    }

    #[test]
    fn due_dates_advance_monthly_with_year_rollover() {
        let schedule = build_schedule(&ScheduleParams {
            principal: dec!(1200),
            term_months: 3,
            monthly_rate: dec!(0),
            disbursed_on: d("2024-11-20"),
            payment_day: 28,
        })
        .unwrap();
        let dates: Vec<NaiveDate> = schedule.installments.iter().map(|i| i.due_date).collect();
        assert_eq!(dates, vec![d("2024-12-28"), d("2025-01-28"), d("2025-02-28")]);
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(build_schedule(&params(dec!(0), 12, dec!(0.03))).is_err());
        assert!(build_schedule(&params(dec!(100), 0, dec!(0.03))).is_err());
        assert!(build_schedule(&params(dec!(100), 12, dec!(-0.01))).is_err());
    }
}
