//! Result normalizer - maps native database values onto JSON scalars
//!
//! Every value a row can carry ends up as a string, number, boolean or null.
//! The mapping is total: a value that has no natural JSON form is
//! stringified rather than failing the row.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::ValueRef;
use serde_json::{Number, Value};
use uuid::Uuid;

/// The closed set of values the driver layer can hand to the normalizer
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<FixedOffset>),
    Time(NaiveTime),
    /// Arbitrary-precision decimal in its textual form
    Decimal(String),
}

/// Declared column type families that change how a stored value is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclaredKind {
    Uuid,
    Date,
    DateTime,
    Time,
    Decimal,
    Bool,
    Other,
}

impl DeclaredKind {
    fn from_decl_type(decl_type: Option<&str>) -> Self {
        let Some(decl) = decl_type else {
            return DeclaredKind::Other;
        };
        let decl = decl.to_ascii_uppercase();
        if decl.contains("UUID") || decl.contains("GUID") {
            DeclaredKind::Uuid
        } else if decl.contains("DATETIME") || decl.contains("TIMESTAMP") {
            DeclaredKind::DateTime
        } else if decl.contains("DATE") {
            DeclaredKind::Date
        } else if decl.contains("TIME") {
            DeclaredKind::Time
        } else if decl.contains("DECIMAL") || decl.contains("NUMERIC") {
            DeclaredKind::Decimal
        } else if decl.starts_with("BOOL") {
            DeclaredKind::Bool
        } else {
            DeclaredKind::Other
        }
    }
}

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

fn parse_datetime(text: &str) -> Option<NativeValue> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(NativeValue::DateTimeTz(dt));
    }
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(NativeValue::DateTime)
}

fn parse_time(text: &str) -> Option<NativeValue> {
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
        .map(NativeValue::Time)
}

impl NativeValue {
    /// Lift an SQLite cell into a native value using the column's declared type
    ///
    /// SQLite stores dates, UUIDs and decimals as text (or blobs/integers),
    /// so the declared type decides how the stored value is interpreted.
    /// Text that does not parse as the declared type stays text.
    pub fn from_sqlite(value: ValueRef<'_>, decl_type: Option<&str>) -> Self {
        let kind = DeclaredKind::from_decl_type(decl_type);
        match value {
            ValueRef::Null => NativeValue::Null,
            ValueRef::Integer(i) => match kind {
                DeclaredKind::Bool => NativeValue::Bool(i != 0),
                _ => NativeValue::Integer(i),
            },
            ValueRef::Real(f) => NativeValue::Float(f),
            ValueRef::Text(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                let parsed = match kind {
                    DeclaredKind::Uuid => Uuid::parse_str(&text).ok().map(NativeValue::Uuid),
                    DeclaredKind::Date => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                        .ok()
                        .map(NativeValue::Date),
                    DeclaredKind::DateTime => parse_datetime(&text),
                    DeclaredKind::Time => parse_time(&text),
                    DeclaredKind::Decimal => Some(NativeValue::Decimal(text.to_string())),
                    DeclaredKind::Bool | DeclaredKind::Other => None,
                };
                parsed.unwrap_or_else(|| NativeValue::Text(text.into_owned()))
            }
            ValueRef::Blob(bytes) => match kind {
                DeclaredKind::Uuid if bytes.len() == 16 => Uuid::from_slice(bytes)
                    .map(NativeValue::Uuid)
                    .unwrap_or_else(|_| NativeValue::Bytes(bytes.to_vec())),
                _ => NativeValue::Bytes(bytes.to_vec()),
            },
        }
    }
}

/// Map a native value onto a transport-safe JSON scalar
///
/// | input | output |
/// |---|---|
/// | UUID | hyphenated lowercase string |
/// | date / datetime / time | ISO-8601 string |
/// | decimal | nearest `f64` (precision loss is accepted) |
/// | bytes | UTF-8 text when valid, lowercase hex otherwise |
/// | non-finite float | its string form |
pub fn normalize(value: NativeValue) -> Value {
    match value {
        NativeValue::Null => Value::Null,
        NativeValue::Bool(b) => Value::Bool(b),
        NativeValue::Integer(i) => Value::Number(i.into()),
        NativeValue::Float(f) => float_or_string(f, || f.to_string()),
        NativeValue::Text(s) => Value::String(s),
        NativeValue::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Value::String(text),
            Err(e) => Value::String(to_hex(e.as_bytes())),
        },
        NativeValue::Uuid(id) => Value::String(id.hyphenated().to_string()),
        NativeValue::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
        NativeValue::DateTime(dt) => {
            Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        NativeValue::DateTimeTz(dt) => Value::String(dt.to_rfc3339()),
        NativeValue::Time(t) => Value::String(t.format("%H:%M:%S%.f").to_string()),
        NativeValue::Decimal(text) => match text.trim().parse::<f64>() {
            Ok(f) => float_or_string(f, || text.clone()),
            Err(_) => Value::String(text),
        },
    }
}

fn float_or_string(f: f64, fallback: impl FnOnce() -> String) -> Value {
    Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(fallback()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_uuid_to_string() {
        let id = Uuid::parse_str("67E55044-10B1-426F-9247-BB680E5FE0C8").unwrap();
        assert_eq!(
            normalize(NativeValue::Uuid(id)),
            json!("67e55044-10b1-426f-9247-bb680e5fe0c8")
        );
    }

    #[test]
    fn test_date_round_trip() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let Value::String(text) = normalize(NativeValue::Date(date)) else {
            panic!("date should normalize to a string");
        };
        assert_eq!(text, "2024-02-29");
        assert_eq!(NaiveDate::parse_from_str(&text, "%Y-%m-%d").unwrap(), date);
    }

    #[test]
    fn test_datetime_and_time_iso() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(
            normalize(NativeValue::DateTime(dt)),
            json!("2024-01-15T10:30:00")
        );

        let with_millis = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_milli_opt(10, 30, 0, 250)
            .unwrap();
        assert_eq!(
            normalize(NativeValue::DateTime(with_millis)),
            json!("2024-01-15T10:30:00.250")
        );

        let t = NaiveTime::from_hms_opt(23, 59, 1).unwrap();
        assert_eq!(normalize(NativeValue::Time(t)), json!("23:59:01"));

        let tz = DateTime::parse_from_rfc3339("2024-01-15T10:30:00+02:00").unwrap();
        assert_eq!(
            normalize(NativeValue::DateTimeTz(tz)),
            json!("2024-01-15T10:30:00+02:00")
        );
    }

    #[test]
    fn test_decimal_to_number() {
        assert_eq!(normalize(NativeValue::Decimal("10.5".into())), json!(10.5));
        assert_eq!(normalize(NativeValue::Decimal("-3".into())), json!(-3.0));
        assert_eq!(
            normalize(NativeValue::Decimal("not-a-number".into())),
            json!("not-a-number")
        );
    }

    #[test]
    fn test_passthrough_scalars() {
        assert_eq!(normalize(NativeValue::Null), Value::Null);
        assert_eq!(normalize(NativeValue::Bool(true)), json!(true));
        assert_eq!(normalize(NativeValue::Integer(-42)), json!(-42));
        assert_eq!(normalize(NativeValue::Float(1.25)), json!(1.25));
        assert_eq!(normalize(NativeValue::Text("hi".into())), json!("hi"));
    }

    #[test]
    fn test_unrepresentable_values_stringify() {
        assert_eq!(normalize(NativeValue::Float(f64::NAN)), json!("NaN"));
        assert_eq!(normalize(NativeValue::Float(f64::INFINITY)), json!("inf"));
        assert_eq!(normalize(NativeValue::Bytes(b"abc".to_vec())), json!("abc"));
        assert_eq!(
            normalize(NativeValue::Bytes(vec![0xff, 0x00, 0x1a])),
            json!("ff001a")
        );
    }

    #[test]
    fn test_from_sqlite_uses_declared_type() {
        let id = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        assert_eq!(
            NativeValue::from_sqlite(ValueRef::Text(id.as_bytes()), Some("uuid")),
            NativeValue::Uuid(Uuid::parse_str(id).unwrap())
        );
        assert_eq!(
            NativeValue::from_sqlite(ValueRef::Text(b"2024-03-01"), Some("DATE")),
            NativeValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert!(matches!(
            NativeValue::from_sqlite(ValueRef::Text(b"2024-03-01 08:00:00"), Some("TIMESTAMP")),
            NativeValue::DateTime(_)
        ));
        assert!(matches!(
            NativeValue::from_sqlite(ValueRef::Text(b"08:15"), Some("TIME")),
            NativeValue::Time(_)
        ));
        assert_eq!(
            NativeValue::from_sqlite(ValueRef::Text(b"12.50"), Some("DECIMAL(10,2)")),
            NativeValue::Decimal("12.50".into())
        );
        assert_eq!(
            NativeValue::from_sqlite(ValueRef::Integer(1), Some("BOOLEAN")),
            NativeValue::Bool(true)
        );
        assert_eq!(
            NativeValue::from_sqlite(ValueRef::Integer(1), None),
            NativeValue::Integer(1)
        );
    }

    #[test]
    fn test_from_sqlite_falls_back_to_text() {
        assert_eq!(
            NativeValue::from_sqlite(ValueRef::Text(b"tomorrow"), Some("DATE")),
            NativeValue::Text("tomorrow".into())
        );
        assert_eq!(
            NativeValue::from_sqlite(ValueRef::Text(b"not-a-uuid"), Some("UUID")),
            NativeValue::Text("not-a-uuid".into())
        );
    }

    #[test]
    fn test_from_sqlite_uuid_blob() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(
            NativeValue::from_sqlite(ValueRef::Blob(id.as_bytes()), Some("UUID")),
            NativeValue::Uuid(id)
        );
    }
}
