//! Date plumbing shared by every subsystem.
//!
//! The tabular store exchanges all dates as plain `YYYY-MM-DD` strings and
//! periods as `YYYY-MM`, so silent type coercion by the backend can never
//! change a value. Inputs additionally accept `d/m/yyyy` (day-first, the
//! household's locale) with a swap when the day-first reading is impossible.

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::error::LedgerError;
use crate::LedgerResult;

pub const ISO_DATE: &str = "%Y-%m-%d";
pub const ISO_DATETIME: &str = "%Y-%m-%dT%H:%M:%S";

/// Parse a date in `YYYY-MM-DD` or `d/m/yyyy` form.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, ISO_DATE) {
        return Some(d);
    }
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() == 3 {
        let a: u32 = parts[0].trim().parse().ok()?;
        let b: u32 = parts[1].trim().parse().ok()?;
        let y: i32 = parts[2].trim().parse().ok()?;
        // Day-first unless that reading is impossible (a <= 12 < b).
        let (day, month) = if a <= 12 && b > 12 { (b, a) } else { (a, b) };
        return NaiveDate::from_ymd_opt(y, month, day);
    }
    None
}

/// Normalize to `YYYY-MM-DD`, passing unparseable input through untouched.
///
/// Read paths are tolerant: a malformed historical cell is kept as opaque
/// text rather than dropped.
pub fn normalize_iso(raw: &str) -> String {
    match parse_date(raw) {
        Some(d) => format_date(d),
        None => raw.trim().to_string(),
    }
}

/// Parse a date that an operation cannot proceed without.
pub fn parse_required_date(raw: &str, field: &str) -> LedgerResult<NaiveDate> {
    parse_date(raw).ok_or_else(|| LedgerError::Validation {
        field: field.to_string(),
        reason: format!("\"{}\" is not a valid date (expected YYYY-MM-DD)", raw.trim()),
    })
}

/// Parse `YYYY-MM-DDTHH:MM[:SS]`, or a bare date at midnight.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, ISO_DATETIME) {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M") {
        return Some(dt);
    }
    parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(ISO_DATE).to_string()
}

pub fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format(ISO_DATETIME).to_string()
}

/// Normalize a period to `YYYY-MM`. Accepts `YYYY-MM`, `m/yyyy`, or any
/// parseable date (truncated to its month). Unparseable input passes through.
pub fn normalize_period(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }
    if s.len() == 7 && NaiveDate::parse_from_str(&format!("{s}-01"), ISO_DATE).is_ok() {
        return s.to_string();
    }
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() == 2 {
        if let (Ok(m), Ok(y)) = (parts[0].trim().parse::<u32>(), parts[1].trim().parse::<i32>()) {
            if (1..=12).contains(&m) {
                return format!("{y:04}-{m:02}");
            }
        }
    }
    match parse_date(s) {
        Some(d) => format!("{:04}-{:02}", d.year(), d.month()),
        None => s.to_string(),
    }
}

/// First and last day of a `YYYY-MM` period.
pub fn period_range(period: &str) -> Option<(NaiveDate, NaiveDate)> {
    let normalized = normalize_period(period);
    let first = NaiveDate::parse_from_str(&format!("{normalized}-01"), ISO_DATE).ok()?;
    let last = NaiveDate::from_ymd_opt(
        first.year(),
        first.month(),
        days_in_month(first.year(), first.month()),
    )?;
    Some((first, last))
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(30)
}

/// Date at `day` of the given month, clamped to the month's length.
pub fn date_with_day(year: i32, month: u32, day: u32) -> NaiveDate {
    let month = month.clamp(1, 12);
    let day = day.clamp(1, 31).min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap_or_else(|| NaiveDate::default())
}

/// The month after `date`, rolling the year over December.
pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Advance one calendar month keeping `day`, clamped at month length
/// (day 31 becomes the last day of a 30-day month).
pub fn add_month_clamped(date: NaiveDate, day: u32) -> NaiveDate {
    let (y, m) = next_month(date.year(), date.month());
    date_with_day(y, m, day)
}

/// Whole days from `earlier` to `later`, never negative.
pub fn whole_days_between(later: NaiveDate, earlier: NaiveDate) -> i64 {
    (later - earlier).num_days().max(0)
}
