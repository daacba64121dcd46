//! Reference period parsing.

use chrono::NaiveDate;

/// Column holding the reference period of each row.
pub const REF_DATE_COLUMN: &str = "REF_DATE";

/// Parse a reference period: `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
///
/// Periods resolve to their first day. Fiscal or other ranges (`2019/2020`)
/// return `None`.
pub fn parse_ref_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    match value.len() {
        4 => NaiveDate::parse_from_str(&format!("{value}-01-01"), "%Y-%m-%d").ok(),
        7 => NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").ok(),
        _ => NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
    }
}

/// Parse every value, or `None` if any value is not a date.
pub fn parse_ref_dates<'a, I>(values: I) -> Option<Vec<NaiveDate>>
where
    I: IntoIterator<Item = &'a str>,
{
    values.into_iter().map(parse_ref_date).collect()
}
