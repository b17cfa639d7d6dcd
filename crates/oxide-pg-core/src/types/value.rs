//! Wire values and literal rendering.
//!
//! Every value that reaches the SQL text is escaped here; everything else is
//! sent as a bound parameter.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Strings shorter than this many characters are inlined as literals.
pub const INLINE_STRING_MAX_LEN: usize = 30;

/// A PostgreSQL `interval`, stored the way the server stores it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

impl Interval {
    /// Creates an interval.
    #[must_use]
    pub const fn new(months: i32, days: i32, microseconds: i64) -> Self {
        Self {
            months,
            days,
            microseconds,
        }
    }
}

/// A `bytea` value.
///
/// `Vec<u8>` maps to an integer array, so binary data uses this wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Binary(pub Vec<u8>);

/// A value as it travels to and from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    BigInt(i64),
    /// Single precision float.
    Float(f32),
    /// Double precision float.
    Double(f64),
    /// Arbitrary precision number.
    Decimal(Decimal),
    /// Text value.
    Text(String),
    /// UUID value.
    Uuid(Uuid),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day.
    Time(NaiveTime),
    /// Timestamp without time zone.
    DateTime(NaiveDateTime),
    /// Interval value.
    Interval(Interval),
    /// Binary blob value.
    Bytes(Vec<u8>),
    /// JSON document.
    Json(serde_json::Value),
    /// Enum label.
    Enum(String),
    /// Array of values.
    Array(Vec<PgValue>),
}

impl PgValue {
    /// Returns whether this is NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns a short name of the variant, for error messages.
    #[must_use]
    pub const fn variant_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::BigInt(_) => "bigint",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Uuid(_) => "uuid",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::DateTime(_) => "datetime",
            Self::Interval(_) => "interval",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
            Self::Enum(_) => "enum",
            Self::Array(_) => "array",
        }
    }

    /// Returns the literal used when the value is written straight into the
    /// SQL text of a bound-mode render.
    ///
    /// Only NULL, booleans, integers and short strings qualify; everything
    /// else must become a parameter.
    #[must_use]
    pub fn inline_literal(&self) -> Option<String> {
        match self {
            Self::Null => Some(String::from("NULL")),
            Self::Bool(b) => Some(bool_literal(*b)),
            Self::Int(n) => Some(n.to_string()),
            Self::BigInt(n) => Some(n.to_string()),
            Self::Text(s) if s.chars().count() < INLINE_STRING_MAX_LEN => Some(quote_literal(s)),
            _ => None,
        }
    }

    /// Returns the escaped SQL representation of the value, without a cast.
    ///
    /// Used by simple-mode rendering, where nothing is bound.
    #[must_use]
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Bool(b) => bool_literal(*b),
            Self::Int(n) => n.to_string(),
            Self::BigInt(n) => n.to_string(),
            Self::Float(f) => quote_literal(&float_text(f64::from(*f))),
            Self::Double(f) => quote_literal(&float_text(*f)),
            Self::Decimal(d) => quote_literal(&d.to_string()),
            Self::Text(s) | Self::Enum(s) => quote_literal(s),
            Self::Uuid(u) => quote_literal(&u.to_string()),
            Self::Date(d) => quote_literal(&d.format("%Y-%m-%d").to_string()),
            Self::Time(t) => quote_literal(&t.format("%H:%M:%S%.f").to_string()),
            Self::DateTime(dt) => quote_literal(&dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Self::Interval(i) => quote_literal(&format!(
                "{} mons {} days {} microseconds",
                i.months, i.days, i.microseconds
            )),
            Self::Bytes(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
                quote_literal(&format!("\\x{hex}"))
            }
            Self::Json(v) => quote_literal(&v.to_string()),
            Self::Array(items) if items.is_empty() => String::from("'{}'"),
            Self::Array(items) => {
                let parts: Vec<String> = items.iter().map(Self::to_sql_literal).collect();
                format!("ARRAY[{}]", parts.join(","))
            }
        }
    }
}

fn bool_literal(b: bool) -> String {
    if b {
        String::from("TRUE")
    } else {
        String::from("FALSE")
    }
}

fn float_text(f: f64) -> String {
    if f.is_nan() {
        String::from("NaN")
    } else if f.is_infinite() {
        if f > 0.0 {
            String::from("Infinity")
        } else {
            String::from("-Infinity")
        }
    } else {
        format!("{f:?}")
    }
}

/// Quotes a string literal.
///
/// Single quotes are doubled. Strings containing backslashes use the `E''`
/// form with doubled backslashes so the result does not depend on
/// `standard_conforming_strings`.
#[must_use]
pub fn quote_literal(s: &str) -> String {
    let escaped = s.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{escaped}'")
    }
}
