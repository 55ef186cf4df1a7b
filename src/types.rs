use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use serde_json::Value as JsonValue;

use crate::error::DbSqlError;

/// The single timestamp layout used when a timestamp is turned into SQL text.
///
/// Includes fractional seconds and the UTC offset so the rendered text names
/// the same instant it came from.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

/// Values that can be bound into a statement or returned in a row.
///
/// ```rust
/// use databricks_sql::prelude::*;
///
/// let params = vec![
///     Value::Int(1),
///     Value::Text("alice".into()),
///     Value::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Timestamp with its UTC offset
    Timestamp(DateTime<FixedOffset>),
    /// JSON value, sent as its compact text
    Json(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let Value::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Int(1) => Some(true),
            Value::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let Value::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    /// Timestamp view; text in [`TIMESTAMP_FORMAT`] is parsed as well.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Value::Timestamp(value) => Some(*value),
            Value::Text(s) => parse_timestamp(s).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let Value::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Json(_) => "json",
            Value::Blob(_) => "blob",
        }
    }
}

macro_rules! impl_from_value {
    ($ty:ty => $variant:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v.into())
            }
        }
    };
}

impl_from_value!(bool => Bool);
impl_from_value!(i8 => Int);
impl_from_value!(i16 => Int);
impl_from_value!(i32 => Int);
impl_from_value!(i64 => Int);
impl_from_value!(u8 => Int);
impl_from_value!(u16 => Int);
impl_from_value!(u32 => Int);
impl_from_value!(f32 => Float);
impl_from_value!(f64 => Float);
impl_from_value!(String => Text);
impl_from_value!(JsonValue => Json);
impl_from_value!(Vec<u8> => Blob);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(v: DateTime<Tz>) -> Self {
        Value::Timestamp(v.fixed_offset())
    }
}

/// Naive timestamps are taken to be UTC.
impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v.and_utc().fixed_offset())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// An argument as handed to the driver: its 1-based position, an optional
/// name for `:name` placeholders, and the value.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValue {
    pub ordinal: usize,
    pub name: Option<String>,
    pub value: Value,
}

impl NamedValue {
    pub fn positional(ordinal: usize, value: impl Into<Value>) -> Self {
        Self {
            ordinal,
            name: None,
            value: value.into(),
        }
    }

    pub fn named(ordinal: usize, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            ordinal,
            name: Some(name.into()),
            value: value.into(),
        }
    }
}

/// Number a list of values as positional arguments.
#[must_use]
pub fn positional_args(values: Vec<Value>) -> Vec<NamedValue> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| NamedValue::positional(i + 1, value))
        .collect()
}

#[must_use]
pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse text produced by [`format_timestamp`].
///
/// # Errors
/// Returns `DbSqlError::BindingError` if the text is not in [`TIMESTAMP_FORMAT`].
pub fn parse_timestamp(s: &str) -> Result<DateTime<FixedOffset>, DbSqlError> {
    DateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|e| DbSqlError::BindingError(format!("invalid timestamp {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn timestamp_text_names_the_same_instant() {
        let offset = FixedOffset::west_opt(7 * 3600).unwrap();
        let ts = offset
            .with_ymd_and_hms(2023, 3, 12, 18, 45, 1)
            .unwrap()
            .checked_add_signed(chrono::TimeDelta::microseconds(123_456))
            .unwrap();

        let text = format_timestamp(&ts);
        assert_eq!(text, "2023-03-12 18:45:01.123456-07:00");
        assert_eq!(parse_timestamp(&text).unwrap(), ts);
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let naive = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let value = Value::from(naive);
        assert_eq!(
            value.as_timestamp().unwrap().to_utc().naive_utc(),
            naive
        );
    }

    #[test]
    fn text_in_timestamp_format_reads_as_timestamp() {
        let value = Value::Text("2020-05-06 07:08:09+00:00".into());
        assert!(value.as_timestamp().is_some());
        assert!(Value::Text("yesterday".into()).as_timestamp().is_none());
    }

    #[test]
    fn optional_values() {
        assert!(Value::from(None::<i32>).is_null());
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn positional_numbering_starts_at_one() {
        let args = positional_args(vec![Value::Int(7), Value::Null]);
        assert_eq!(args[0].ordinal, 1);
        assert_eq!(args[1].ordinal, 2);
    }
}
