//! Field matching and value parsing for raw rows.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use super::raw::Record;

/// Keys accepted as the ticker, in order of preference (case-insensitive).
pub const TICKER_ALIASES: &[&str] = &["ticker", "symbol", "stock", "code"];

/// Keys accepted as the row date, in order of preference (case-insensitive).
pub const DATE_ALIASES: &[&str] = &["date", "timestamp", "datetime", "time", "trade_date"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Epoch values at or above this are milliseconds (year 5138 in seconds).
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// The actual key in `record` matching the first alias that is present.
///
/// An exact-case match beats a case-insensitive one for the same alias.
pub fn find_key<'a>(record: &'a Record, aliases: &[&str]) -> Option<&'a str> {
    aliases.iter().find_map(|alias| {
        if let Some((key, _)) = record.get_key_value(*alias) {
            return Some(key.as_str());
        }
        record
            .keys()
            .find(|k| k.eq_ignore_ascii_case(alias))
            .map(String::as_str)
    })
}

/// Read a ticker value. Numeric codes are accepted and kept as text.
pub fn parse_ticker(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Read a calendar date from a string or an integer.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date_str(s.trim()),
        Value::Number(n) => {
            let n = n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?;
            parse_date_int(n)
        }
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse().ok().and_then(parse_date_int);
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}

fn parse_date_int(n: i64) -> Option<NaiveDate> {
    // 20240102 reads as a compact date before it reads as epoch seconds.
    if (10000101..=99991231).contains(&n) {
        let (year, month, day) = (n / 10000, (n / 100) % 100, n % 100);
        if let Some(date) = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32) {
            return Some(date);
        }
    }
    let dt = if n.unsigned_abs() >= EPOCH_MILLIS_THRESHOLD.unsigned_abs() {
        DateTime::from_timestamp_millis(n)?
    } else {
        DateTime::from_timestamp(n, 0)?
    };
    Some(dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_find_key_prefers_earlier_alias() {
        let record = json!({"Symbol": "X", "TICKER": "Y"});
        let record = record.as_object().unwrap();
        assert_eq!(find_key(record, TICKER_ALIASES), Some("TICKER"));
        assert_eq!(find_key(record, DATE_ALIASES), None);
    }

    #[test]
    fn test_parse_ticker() {
        assert_eq!(parse_ticker(&json!(" AAA ")), Some("AAA".to_string()));
        assert_eq!(parse_ticker(&json!(600519)), Some("600519".to_string()));
        assert_eq!(parse_ticker(&json!("")), None);
        assert_eq!(parse_ticker(&json!(1.5)), None);
        assert_eq!(parse_ticker(&Value::Null), None);
    }

    #[test]
    fn test_parse_date_strings() {
        let expected = d(2024, 1, 2);
        for s in [
            "2024-01-02",
            "2024/01/02",
            "20240102",
            "2024-01-02 15:30:00",
            "2024-01-02T15:30:00",
            "2024-01-02T15:30:00.250",
            "2024-01-02T15:30:00Z",
            "2024-01-02T23:30:00-05:00",
        ] {
            assert_eq!(parse_date(&json!(s)), Some(expected), "format: {s}");
        }
    }

    #[test]
    fn test_parse_date_epochs() {
        // 2024-01-02T00:00:00Z
        assert_eq!(parse_date(&json!(1704153600)), Some(d(2024, 1, 2)));
        assert_eq!(parse_date(&json!(1704153600000_i64)), Some(d(2024, 1, 2)));
        assert_eq!(parse_date(&json!("1704153600")), Some(d(2024, 1, 2)));
        assert_eq!(parse_date(&json!(20240102)), Some(d(2024, 1, 2)));
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert_eq!(parse_date(&json!("yesterday")), None);
        assert_eq!(parse_date(&json!("2024-13-45")), None);
        assert_eq!(parse_date(&json!(true)), None);
        assert_eq!(parse_date(&json!("")), None);
    }

    #[test]
    fn test_parse_date_extreme_numbers() {
        assert_eq!(parse_date(&json!(i64::MIN)), None);
        assert_eq!(parse_date(&json!(i64::MAX)), None);
        assert_eq!(parse_date(&json!(u64::MAX)), None);
        // Saturates to i64::MIN / i64::MAX on conversion.
        assert_eq!(parse_date(&json!(-1e300)), None);
        assert_eq!(parse_date(&json!(1e300)), None);
    }
}
