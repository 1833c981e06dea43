use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5% monthly). Never as percentages.
pub type Rate = Decimal;

/// A balance at or below this is considered settled.
pub const BALANCE_EPSILON: Decimal = dec!(0.000001);

/// Round to 2 fractional digits, midpoint away from zero.
///
/// Every value that is persisted or returned to a caller passes through
/// here; intermediate arithmetic may carry full precision.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Clamp to zero from below. Pending balances are never negative.
pub fn non_negative(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

/// Lenient numeric parse for values read back from the tabular store.
///
/// Strips everything but digits, sign and decimal point, so currency
/// prefixes or thousand separators left behind by a spreadsheet-style
/// backend do not poison a balance.
pub fn parse_money(raw: &str) -> Money {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse::<Decimal>().unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_midpoint_goes_away_from_zero() {
        assert_eq!(round2(dec!(1.005)), dec!(1.01));
        assert_eq!(round2(dec!(2.675)), dec!(2.68));
        assert_eq!(round2(dec!(-1.005)), dec!(-1.01));
    }

    #[test]
    fn parse_money_tolerates_decoration() {
        assert_eq!(parse_money("L 1,234.50"), dec!(1234.50));
        assert_eq!(parse_money("-12.30"), dec!(-12.30));
        assert_eq!(parse_money(""), Decimal::ZERO);
        assert_eq!(parse_money("n/a"), Decimal::ZERO);
    }
}
