use std::convert::TryFrom;
use std::fmt;

use async_graphql_value::{ConstValue, Number, Value};
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A value flowing through filters, tags, and query parameters.
///
/// Order matters for `Int64`/`Uint64`/`Float64`: when deserializing an
/// untagged representation, we prefer the exact-integer GraphQL `Int` type
/// over the unsigned extension, and prefer exact integers over lossy floats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Int64(i64),
    Uint64(u64),
    Float64(f64),
    String(String),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Decimal(Decimal),
    Enum(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Uint64(u) => (*u).try_into().ok(),
            FieldValue::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }

    /// The scalar name this value is most naturally typed as. Used for
    /// diagnostics only; actual type-checking is driven by the schema.
    pub fn scalar_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Int64(_) | FieldValue::Uint64(_) => "Int",
            FieldValue::Float64(_) => "Float",
            FieldValue::String(_) => "String",
            FieldValue::Boolean(_) => "Boolean",
            FieldValue::Date(_) => "Date",
            FieldValue::DateTime(_) => "DateTime",
            FieldValue::Decimal(_) => "Decimal",
            FieldValue::Enum(_) => "Enum",
            FieldValue::List(_) => "List",
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Uint64(l), Self::Uint64(r)) => l == r,
            (Self::Int64(l), Self::Int64(r)) => l == r,
            (Self::Float64(l), Self::Float64(r)) => {
                assert!(l.is_finite());
                assert!(r.is_finite());
                l == r
            }
            (Self::String(l), Self::String(r)) => l == r,
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::Date(l), Self::Date(r)) => l == r,
            (Self::DateTime(l), Self::DateTime(r)) => l == r,
            (Self::Decimal(l), Self::Decimal(r)) => l == r,
            (Self::Enum(l), Self::Enum(r)) => l == r,
            (Self::List(l), Self::List(r)) => l == r,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

/// Formats a scalar value using the bit-exact serialization rules:
/// `Date` as `YYYY-MM-DD`, `DateTime` as `YYYY-MM-DDThh:mm:ss` (timezone-naive),
/// `Decimal` as plain ASCII digits with an optional leading `-` and `.`, no
/// thousands separators.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Int64(v) => write!(f, "{v}"),
            FieldValue::Uint64(v) => write!(f, "{v}"),
            FieldValue::Float64(v) => write!(f, "{v}"),
            FieldValue::String(v) => write!(f, "{v}"),
            FieldValue::Boolean(v) => write!(f, "{v}"),
            FieldValue::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            FieldValue::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S")),
            FieldValue::Decimal(v) => write!(f, "{v}"),
            FieldValue::Enum(v) => write!(f, "{v}"),
            FieldValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ScalarParseError {
    #[error("value {0:?} is not a valid Date in YYYY-MM-DD format")]
    InvalidDate(String),
    #[error("value {0:?} is not a valid DateTime in YYYY-MM-DDThh:mm:ss format")]
    InvalidDateTime(String),
    #[error("value {0:?} is not a valid Decimal")]
    InvalidDecimal(String),
}

/// Parses a `Date` scalar: day precision, `YYYY-MM-DD`. The
/// parse is intentionally strict -- it re-serializes the parsed value and
/// rejects the input unless it round-trips, so that e.g. `2024-1-1` (which
/// `chrono` would otherwise happily parse) is rejected.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ScalarParseError> {
    let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ScalarParseError::InvalidDate(raw.to_owned()))?;
    if parsed.format("%Y-%m-%d").to_string() != raw {
        return Err(ScalarParseError::InvalidDate(raw.to_owned()));
    }
    Ok(parsed)
}

/// Parses a `DateTime` scalar: second precision,
/// timezone-naive, `YYYY-MM-DDThh:mm:ss`.
pub fn parse_datetime(raw: &str) -> Result<NaiveDateTime, ScalarParseError> {
    let parsed = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .map_err(|_| ScalarParseError::InvalidDateTime(raw.to_owned()))?;
    if parsed.format("%Y-%m-%dT%H:%M:%S").to_string() != raw {
        return Err(ScalarParseError::InvalidDateTime(raw.to_owned()));
    }
    Ok(parsed)
}

/// Parses a `Decimal` scalar: ASCII digits, optional leading
/// `-`, optional `.` followed by more digits, no thousands separators.
pub fn parse_decimal(raw: &str) -> Result<Decimal, ScalarParseError> {
    let mut chars = raw.chars().peekable();
    if chars.peek() == Some(&'-') {
        chars.next();
    }
    let mut saw_digit = false;
    let mut saw_dot = false;
    for c in chars {
        if c == '.' {
            if saw_dot {
                return Err(ScalarParseError::InvalidDecimal(raw.to_owned()));
            }
            saw_dot = true;
        } else if c.is_ascii_digit() {
            saw_digit = true;
        } else {
            return Err(ScalarParseError::InvalidDecimal(raw.to_owned()));
        }
    }
    if !saw_digit {
        return Err(ScalarParseError::InvalidDecimal(raw.to_owned()));
    }

    raw.parse::<Decimal>().map_err(|_| ScalarParseError::InvalidDecimal(raw.to_owned()))
}

fn convert_number_to_field_value(n: &Number) -> FieldValue {
    if let Some(i) = n.as_i64() {
        FieldValue::Int64(i)
    } else if let Some(u) = n.as_u64() {
        FieldValue::Uint64(u)
    } else {
        FieldValue::Float64(n.as_f64().expect("GraphQL Number must be i64, u64, or f64"))
    }
}

impl TryFrom<&Value> for FieldValue {
    type Error = String;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::Number(n) => Ok(convert_number_to_field_value(n)),
            Value::String(s) => Ok(Self::String(s.to_owned())),
            Value::Boolean(b) => Ok(Self::Boolean(*b)),
            Value::List(l) => {
                Ok(Self::List(l.iter().map(Self::try_from).collect::<Result<_, _>>()?))
            }
            Value::Enum(n) => Ok(Self::Enum(n.to_string())),
            Value::Binary(_) => Err("Binary values are not supported".to_string()),
            Value::Variable(_) => Err("Cannot use a variable reference here".to_string()),
            Value::Object(_) => Err("Object values are not supported".to_string()),
        }
    }
}

impl TryFrom<&ConstValue> for FieldValue {
    type Error = String;

    fn try_from(value: &ConstValue) -> Result<Self, Self::Error> {
        FieldValue::try_from(&value.clone().into_value())
    }
}
