use chrono::NaiveDate;
use household_finance_core::loans::{build_schedule, PenaltyMode, ScheduleParams};
use household_finance_core::types::Money;
use household_finance_core::LedgerError;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn params(principal: Money, term: u32, rate: Decimal, disbursed: &str, day: u32) -> ScheduleParams {
    ScheduleParams {
        principal,
        term_months: term,
        monthly_rate: rate,
        disbursed_on: d(disbursed),
        payment_day: day,
    }
}

// ===========================================================================
// Schedule shape
// ===========================================================================

#[test]
fn test_term_of_one_with_zero_rate_is_principal() {
    let schedule = build_schedule(&params(dec!(750), 1, dec!(0), "2024-05-20", 15)).unwrap();
    assert_eq!(schedule.installments.len(), 1);
    assert_eq!(schedule.level_payment, dec!(750));
    assert_eq!(schedule.total_interest, dec!(0));
    assert_eq!(schedule.first_due_date, d("2024-06-15"));
    assert_eq!(schedule.installments[0].payment, dec!(750));
}

#[test]
fn test_interest_free_installments_split_evenly_with_final_adjustment() {
    // 1000 / 3 = 333.33, final catches the remainder.
    let schedule = build_schedule(&params(dec!(1000), 3, dec!(0), "2024-01-05", 10)).unwrap();
    let principals: Vec<Money> = schedule.installments.iter().map(|i| i.principal).collect();
    assert_eq!(principals, vec![dec!(333.33), dec!(333.33), dec!(333.34)]);
    let total: Money = principals.iter().copied().sum();
    assert_eq!(total, dec!(1000));
}

#[test]
fn test_level_payment_matches_annuity_formula() {
    // 50,000 at 2.5% monthly over 36 months.
    // cuota = P*r*(1+r)^n / ((1+r)^n - 1) ≈ 2,122.58
    let schedule = build_schedule(&params(dec!(50000), 36, dec!(0.025), "2024-01-01", 1)).unwrap();
    assert_eq!(schedule.level_payment, dec!(2122.58));
}

#[test]
fn test_december_disbursement_rolls_into_next_year() {
    let schedule = build_schedule(&params(dec!(300), 2, dec!(0), "2023-12-31", 28)).unwrap();
    assert_eq!(schedule.installments[0].due_date, d("2024-01-28"));
    assert_eq!(schedule.installments[1].due_date, d("2024-02-28"));
}

#[test]
fn test_payment_day_is_clamped_to_valid_range() {
    let schedule = build_schedule(&params(dec!(300), 1, dec!(0), "2024-01-15", 31)).unwrap();
    // Day 31 clamps to 28 before scheduling.
    assert_eq!(schedule.first_due_date, d("2024-02-28"));
}

// ===========================================================================
// Conservation across a parameter grid
// ===========================================================================

#[test]
fn test_principal_components_always_sum_to_principal() {
    let principals = [dec!(50), dec!(1234.56), dec!(9999.99), dec!(100000)];
    let terms = [1u32, 3, 11, 18, 48];
    let rates = [dec!(0), dec!(0.005), dec!(0.0233), dec!(0.08)];
    for principal in principals {
        for term in terms {
            for rate in rates {
                let schedule = build_schedule(&params(principal, term, rate, "2024-03-31", 28))
                    .unwrap_or_else(|e| panic!("P={principal} N={term} r={rate}: {e}"));
                assert_eq!(schedule.installments.len(), term as usize);
                let total: Money = schedule.installments.iter().map(|i| i.principal).sum();
                assert_eq!(total, principal, "P={principal} N={term} r={rate}");
                assert_eq!(
                    schedule.installments.last().unwrap().balance_after,
                    dec!(0),
                    "P={principal} N={term} r={rate}"
                );
            }
        }
    }
}

#[test]
fn test_total_interest_is_the_sum_of_installment_interest() {
    let schedule = build_schedule(&params(dec!(8000), 10, dec!(0.018), "2024-02-10", 5)).unwrap();
    let summed: Money = schedule.installments.iter().map(|i| i.interest).sum();
    assert_eq!(schedule.total_interest, summed);
}

// ===========================================================================
// Validation
// ===========================================================================

#[test]
fn test_invalid_inputs_are_rejected_before_any_work() {
    let err = build_schedule(&params(dec!(-5), 6, dec!(0.02), "2024-01-01", 5)).unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));

    let err = build_schedule(&params(dec!(100), 0, dec!(0.02), "2024-01-01", 5)).unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));

    let err = build_schedule(&params(dec!(100), 6, dec!(-0.02), "2024-01-01", 5)).unwrap_err();
    assert!(matches!(err, LedgerError::Validation { .. }));
}

// ===========================================================================
// Penalty-rate policy
// ===========================================================================

#[test]
fn test_penalty_rate_policy_multipliers() {
    assert_eq!(
        PenaltyMode::Surcharge25.monthly_penalty_rate(dec!(0.04), Decimal::ZERO),
        dec!(0.05)
    );
    assert_eq!(
        PenaltyMode::Surcharge50.monthly_penalty_rate(dec!(0.04), Decimal::ZERO),
        dec!(0.06)
    );
    assert_eq!(
        PenaltyMode::Manual.monthly_penalty_rate(dec!(0.04), dec!(0.09)),
        dec!(0.09)
    );
}
