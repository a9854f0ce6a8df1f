//! Typed cell values and type-aware comparison
//!
//! Gateways hand back cells as optional strings. Before comparing, each cell is
//! parsed according to its column's [`LogicalType`] so that `1.0` matches `1`,
//! `2024-01-01T00:00:00Z` matches `2024-01-01 00:00:00 UTC`, and so on.

use super::schema::LogicalType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use std::cmp::Ordering;
use std::fmt;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
];

const ZONED_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// A parsed cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl CellValue {
    /// Parses a raw cell as the given column type
    ///
    /// Missing and empty cells are `Null`. A value that does not parse as the
    /// declared type is kept as `Text` rather than rejected.
    pub fn parse(raw: Option<&str>, data_type: &LogicalType) -> Self {
        let Some(raw) = raw else {
            return CellValue::Null;
        };
        if raw.is_empty() {
            return CellValue::Null;
        }
        let trimmed = raw.trim();

        let parsed = match data_type {
            LogicalType::Integer => parse_int(trimmed)
                .map(CellValue::Int)
                .or_else(|| parse_float(trimmed).map(CellValue::Float)),
            LogicalType::Float | LogicalType::Numeric => {
                parse_float(trimmed).map(CellValue::Float)
            }
            LogicalType::Boolean => parse_bool(trimmed).map(CellValue::Bool),
            LogicalType::Date => parse_date(trimmed)
                .map(CellValue::Date)
                .or_else(|| parse_timestamp(trimmed).map(CellValue::Timestamp)),
            LogicalType::Datetime | LogicalType::Timestamp => parse_timestamp(trimmed)
                .map(CellValue::Timestamp)
                .or_else(|| parse_date(trimmed).map(CellValue::Date)),
            LogicalType::Time => parse_time(trimmed).map(CellValue::Time),
            _ => None,
        };

        parsed.unwrap_or_else(|| CellValue::Text(raw.to_string()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            CellValue::Timestamp(ts) => Some(*ts),
            CellValue::Date(d) => d.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n)),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            CellValue::Null => 0,
            CellValue::Bool(_) => 1,
            CellValue::Int(_) | CellValue::Float(_) => 2,
            CellValue::Date(_) | CellValue::Timestamp(_) => 3,
            CellValue::Time(_) => 4,
            CellValue::Text(_) => 5,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            CellValue::Timestamp(ts) => {
                write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

/// Total order used for deterministic sampling: nulls first, then by value
pub fn compare_cells(a: &CellValue, b: &CellValue) -> Ordering {
    match (a, b) {
        (CellValue::Int(x), CellValue::Int(y)) => x.cmp(y),
        (CellValue::Bool(x), CellValue::Bool(y)) => x.cmp(y),
        (CellValue::Time(x), CellValue::Time(y)) => x.cmp(y),
        (CellValue::Text(x), CellValue::Text(y)) => x.as_bytes().cmp(y.as_bytes()),
        _ => {
            if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                return x.total_cmp(&y);
            }
            if let (Some(x), Some(y)) = (a.as_timestamp(), b.as_timestamp()) {
                return x.cmp(&y);
            }
            a.rank().cmp(&b.rank())
        }
    }
}

/// Type-aware equality
///
/// Numbers match when they differ by at most `tolerance` relative to the larger
/// magnitude (with an absolute floor of `tolerance`). Dates match timestamps at
/// UTC midnight. Anything else falls back to comparing rendered text.
pub fn values_equal(a: &CellValue, b: &CellValue, tolerance: f64) -> bool {
    match (a, b) {
        (CellValue::Null, CellValue::Null) => true,
        (CellValue::Null, _) | (_, CellValue::Null) => false,
        (CellValue::Int(x), CellValue::Int(y)) => x == y,
        _ => {
            if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                let scale = x.abs().max(y.abs()).max(1.0);
                return (x - y).abs() <= tolerance * scale;
            }
            if let (Some(x), Some(y)) = (a.as_timestamp(), b.as_timestamp()) {
                return x == y;
            }
            a.to_string() == b.to_string()
        }
    }
}

/// Infers a column type from sampled raw values the way warehouse autodetection does
///
/// Empty values are ignored; a column with no values is a string column.
pub fn infer_type<'a>(values: impl IntoIterator<Item = &'a str>) -> LogicalType {
    let mut candidates = [
        LogicalType::Integer,
        LogicalType::Float,
        LogicalType::Boolean,
        LogicalType::Date,
        LogicalType::Timestamp,
    ]
    .to_vec();
    let mut seen = false;

    for value in values {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        seen = true;
        candidates.retain(|candidate| match candidate {
            LogicalType::Integer => parse_int(value).is_some(),
            LogicalType::Float => parse_float(value).is_some(),
            LogicalType::Boolean => value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false"),
            LogicalType::Date => parse_date(value).is_some(),
            LogicalType::Timestamp => parse_timestamp(value).is_some(),
            _ => false,
        });
        if candidates.is_empty() {
            return LogicalType::String;
        }
    }

    if !seen {
        return LogicalType::String;
    }
    candidates.into_iter().next().unwrap_or(LogicalType::String)
}

fn parse_int(s: &str) -> Option<i64> {
    s.parse::<i64>().ok()
}

fn parse_float(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

/// Parses a timestamp in any of the common textual forms, normalized to UTC
///
/// Values without an offset are taken to be UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.strip_suffix(" UTC").unwrap_or(s).trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ZONED_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_respects_type() {
        assert_eq!(CellValue::parse(Some("42"), &LogicalType::Integer), CellValue::Int(42));
        assert_eq!(
            CellValue::parse(Some("42"), &LogicalType::String),
            CellValue::Text("42".to_string())
        );
        assert_eq!(CellValue::parse(Some("t"), &LogicalType::Boolean), CellValue::Bool(true));
        assert_eq!(CellValue::parse(None, &LogicalType::Integer), CellValue::Null);
        assert_eq!(CellValue::parse(Some(""), &LogicalType::String), CellValue::Null);
    }

    #[test]
    fn test_unparseable_value_kept_as_text() {
        assert_eq!(
            CellValue::parse(Some("n/a"), &LogicalType::Integer),
            CellValue::Text("n/a".to_string())
        );
    }

    #[test]
    fn test_numeric_tolerance() {
        let a = CellValue::parse(Some("10.0000001"), &LogicalType::Float);
        let b = CellValue::parse(Some("10"), &LogicalType::Integer);
        assert!(values_equal(&a, &b, 1e-6));
        assert!(!values_equal(&a, &b, 1e-12));

        let c = CellValue::parse(Some("10.5"), &LogicalType::Numeric);
        assert!(!values_equal(&c, &b, 1e-6));
    }

    #[test]
    fn test_temporal_normalization() {
        let a = CellValue::parse(Some("2024-03-01 10:15:00"), &LogicalType::Datetime);
        let b = CellValue::parse(Some("2024-03-01T10:15:00Z"), &LogicalType::Timestamp);
        let c = CellValue::parse(Some("2024-03-01 11:15:00+01"), &LogicalType::Timestamp);
        let d = CellValue::parse(Some("2024-03-01 10:15:00.000000 UTC"), &LogicalType::Timestamp);
        assert!(values_equal(&a, &b, 0.0));
        assert!(values_equal(&b, &c, 0.0));
        assert!(values_equal(&c, &d, 0.0));
    }

    #[test]
    fn test_date_matches_midnight_timestamp() {
        let date = CellValue::parse(Some("2024-03-01"), &LogicalType::Date);
        let ts = CellValue::parse(Some("2024-03-01T00:00:00Z"), &LogicalType::Timestamp);
        assert!(values_equal(&date, &ts, 0.0));
    }

    #[test]
    fn test_null_only_equals_null() {
        assert!(values_equal(&CellValue::Null, &CellValue::Null, 0.0));
        assert!(!values_equal(&CellValue::Null, &CellValue::Int(0), 0.0));
    }

    #[test]
    fn test_ordering_puts_nulls_first() {
        let mut values = vec![
            CellValue::Int(3),
            CellValue::Null,
            CellValue::Float(1.5),
            CellValue::Int(-2),
        ];
        values.sort_by(compare_cells);
        assert_eq!(
            values,
            vec![
                CellValue::Null,
                CellValue::Int(-2),
                CellValue::Float(1.5),
                CellValue::Int(3)
            ]
        );
    }

    #[test]
    fn test_text_ordering_is_bytewise() {
        let upper = CellValue::Text("Zed".to_string());
        let lower = CellValue::Text("apple".to_string());
        assert_eq!(compare_cells(&upper, &lower), Ordering::Less);
    }

    #[test_case(&["1", "2", ""], LogicalType::Integer ; "integers with blank")]
    #[test_case(&["1", "2.5"], LogicalType::Float ; "mixed numbers widen to float")]
    #[test_case(&["true", "FALSE"], LogicalType::Boolean ; "booleans")]
    #[test_case(&["2024-01-01", "2024-02-29"], LogicalType::Date ; "dates")]
    #[test_case(&["2024-01-01 10:00:00", "2024-01-02T08:30:00Z"], LogicalType::Timestamp ; "timestamps")]
    #[test_case(&["1", "abc"], LogicalType::String ; "mixed falls back to string")]
    #[test_case(&["", ""], LogicalType::String ; "all blank")]
    fn test_infer_type(values: &[&str], expected: LogicalType) {
        assert_eq!(infer_type(values.iter().copied()), expected);
    }
}
