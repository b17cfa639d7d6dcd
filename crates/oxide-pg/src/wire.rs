//! Wire values sqlx does not decode on its own.
//!
//! sqlx reads one-dimensional arrays of built-in types only. Arrays here
//! are parsed from the raw column bytes in either wire format, whatever
//! their dimension or element type. Columns are classified by type OID:
//! built-in OIDs are known up front, other OIDs are looked up in
//! `pg_type` once per backend and cached in a [`TypeCatalog`].

use std::collections::HashMap;
use std::fmt::Write as _;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use oxide_pg_core::types::Interval;
use oxide_pg_core::PgValue;
use rust_decimal::Decimal;
use sqlx::postgres::{PgValueFormat, PgValueRef};

use crate::error::{Error, Result};

/// Built-in type OIDs.
pub(crate) mod oid {
    pub const BOOL: u32 = 16;
    pub const BYTEA: u32 = 17;
    pub const CHAR: u32 = 18;
    pub const NAME: u32 = 19;
    pub const INT8: u32 = 20;
    pub const INT2: u32 = 21;
    pub const INT4: u32 = 23;
    pub const TEXT: u32 = 25;
    pub const JSON: u32 = 114;
    pub const FLOAT4: u32 = 700;
    pub const FLOAT8: u32 = 701;
    pub const BPCHAR: u32 = 1042;
    pub const VARCHAR: u32 = 1043;
    pub const DATE: u32 = 1082;
    pub const TIME: u32 = 1083;
    pub const TIMESTAMP: u32 = 1114;
    pub const TIMESTAMPTZ: u32 = 1184;
    pub const INTERVAL: u32 = 1186;
    pub const NUMERIC: u32 = 1700;
    pub const UUID: u32 = 2950;
    pub const JSONB: u32 = 3802;
}

/// Built-in scalar types, paired with their array type.
const BUILTINS: [(u32, u32); 21] = [
    (oid::BOOL, 1000),
    (oid::BYTEA, 1001),
    (oid::CHAR, 1002),
    (oid::NAME, 1003),
    (oid::INT8, 1016),
    (oid::INT2, 1005),
    (oid::INT4, 1007),
    (oid::TEXT, 1009),
    (oid::JSON, 199),
    (oid::FLOAT4, 1021),
    (oid::FLOAT8, 1022),
    (oid::BPCHAR, 1014),
    (oid::VARCHAR, 1015),
    (oid::DATE, 1182),
    (oid::TIME, 1183),
    (oid::TIMESTAMP, 1115),
    (oid::TIMESTAMPTZ, 1185),
    (oid::INTERVAL, 1187),
    (oid::NUMERIC, 1231),
    (oid::UUID, 2951),
    (oid::JSONB, 3807),
];

/// How a column is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireType {
    /// A built-in scalar, by OID.
    Scalar(u32),
    /// An array, by element OID.
    Array(u32),
    /// Enums and other user-defined types, read as their text form.
    Label,
}

fn builtin(type_oid: u32) -> Option<WireType> {
    BUILTINS.iter().find_map(|&(scalar, array)| {
        if type_oid == scalar {
            Some(WireType::Scalar(scalar))
        } else if type_oid == array {
            Some(WireType::Array(scalar))
        } else {
            None
        }
    })
}

/// Classification of user-defined type OIDs, shared by every connection
/// of a backend.
#[derive(Debug, Clone, Default)]
pub(crate) struct TypeCatalog {
    /// `Some(element)` for array types, `None` for everything else.
    known: Arc<RwLock<HashMap<u32, Option<u32>>>>,
}

impl TypeCatalog {
    /// Returns how to read `type_oid`, or `None` when it must be looked up.
    pub(crate) fn classify(&self, type_oid: u32) -> Option<WireType> {
        builtin(type_oid).or_else(|| {
            self.known
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&type_oid)
                .map(|element| element.map_or(WireType::Label, WireType::Array))
        })
    }

    pub(crate) fn record(&self, type_oid: u32, element: Option<u32>) {
        self.known
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(type_oid, element);
    }
}

pub(crate) fn conversion(message: impl Into<String>) -> Error {
    Error::Core(oxide_pg_core::Error::Conversion(message.into()))
}

/// Decodes an array column of any dimension.
pub(crate) fn array(value: &PgValueRef<'_>, element: u32) -> Result<PgValue> {
    match value.format() {
        PgValueFormat::Binary => {
            let bytes = value.as_bytes().map_err(|e| conversion(e.to_string()))?;
            binary_array(bytes)
        }
        PgValueFormat::Text => {
            let text = value.as_str().map_err(|e| conversion(e.to_string()))?;
            text_array(text, element)
        }
    }
}

// =============================================================================
// Binary format
// =============================================================================

struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.0.len() < n {
            return Err(conversion("truncated array value"));
        }
        let (head, rest) = self.0.split_at(n);
        self.0 = rest;
        Ok(head)
    }

    fn i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

fn length(n: i32) -> Result<usize> {
    usize::try_from(n).map_err(|_| conversion(format!("invalid length {n} in array value")))
}

fn binary_array(bytes: &[u8]) -> Result<PgValue> {
    let mut reader = Reader(bytes);
    let dimensions = reader.i32()?;
    let _has_nulls = reader.i32()?;
    let element = reader.u32()?;
    let mut lengths = Vec::new();
    for _ in 0..dimensions {
        lengths.push(length(reader.i32()?)?);
        let _lower_bound = reader.i32()?;
    }
    if lengths.is_empty() {
        return Ok(PgValue::Array(Vec::new()));
    }

    let total: usize = lengths.iter().product();
    let mut items = Vec::with_capacity(total);
    for _ in 0..total {
        let len = reader.i32()?;
        if len < 0 {
            items.push(PgValue::Null);
        } else {
            items.push(binary_scalar(element, reader.take(length(len)?)?)?);
        }
    }
    Ok(nest(&lengths, &mut items.into_iter()))
}

fn nest(lengths: &[usize], items: &mut impl Iterator<Item = PgValue>) -> PgValue {
    match lengths {
        [] => PgValue::Array(Vec::new()),
        [len] => PgValue::Array(items.by_ref().take(*len).collect()),
        [len, inner @ ..] => PgValue::Array((0..*len).map(|_| nest(inner, items)).collect()),
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| conversion(format!("expected {N} bytes, got {}", bytes.len())))
}

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 1)
        .unwrap_or_default()
        .and_time(NaiveTime::MIN)
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| conversion(e.to_string()))
}

fn json(bytes: &[u8]) -> Result<PgValue> {
    serde_json::from_slice(bytes)
        .map(PgValue::Json)
        .map_err(|e| conversion(e.to_string()))
}

fn binary_scalar(element: u32, bytes: &[u8]) -> Result<PgValue> {
    Ok(match element {
        oid::BOOL => PgValue::Bool(fixed::<1>(bytes)?[0] != 0),
        oid::INT2 => PgValue::Int(i32::from(i16::from_be_bytes(fixed(bytes)?))),
        oid::INT4 => PgValue::Int(i32::from_be_bytes(fixed(bytes)?)),
        oid::INT8 => PgValue::BigInt(i64::from_be_bytes(fixed(bytes)?)),
        oid::FLOAT4 => PgValue::Float(f32::from_be_bytes(fixed(bytes)?)),
        oid::FLOAT8 => PgValue::Double(f64::from_be_bytes(fixed(bytes)?)),
        oid::NUMERIC => PgValue::Decimal(binary_numeric(bytes)?),
        oid::BYTEA => PgValue::Bytes(bytes.to_vec()),
        oid::UUID => PgValue::Uuid(uuid::Uuid::from_bytes(fixed(bytes)?)),
        oid::DATE => {
            let days = i32::from_be_bytes(fixed(bytes)?);
            PgValue::Date(
                epoch()
                    .date()
                    .checked_add_signed(Duration::days(i64::from(days)))
                    .ok_or_else(|| conversion("date out of range"))?,
            )
        }
        oid::TIME => {
            let micros = i64::from_be_bytes(fixed(bytes)?);
            PgValue::Time(NaiveTime::MIN + Duration::microseconds(micros))
        }
        oid::TIMESTAMP | oid::TIMESTAMPTZ => {
            let micros = i64::from_be_bytes(fixed(bytes)?);
            PgValue::DateTime(
                epoch()
                    .checked_add_signed(Duration::microseconds(micros))
                    .ok_or_else(|| conversion("timestamp out of range"))?,
            )
        }
        oid::INTERVAL => {
            let mut reader = Reader(bytes);
            let micros = i64::from_be_bytes(fixed(reader.take(8)?)?);
            let days = reader.i32()?;
            let months = reader.i32()?;
            PgValue::Interval(Interval::new(months, days, micros))
        }
        oid::JSON => json(bytes)?,
        oid::JSONB => match bytes.split_first() {
            Some((1, document)) => json(document)?,
            _ => return Err(conversion("unsupported jsonb version")),
        },
        // Text types, enums and other user-defined types send their label.
        _ => PgValue::Text(utf8(bytes)?),
    })
}

/// Numeric in base-10000 digit groups.
fn binary_numeric(bytes: &[u8]) -> Result<Decimal> {
    let mut groups = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    let mut header = || groups.next().ok_or_else(|| conversion("truncated numeric"));
    let count = usize::from(header()?);
    let weight = i32::from(i16::from_be_bytes(header()?.to_be_bytes()));
    let sign = header()?;
    let scale = usize::from(header()?);
    let digits: Vec<u16> = groups.take(count).collect();
    if sign == 0xC000 {
        return Err(conversion("NaN cannot be represented as a decimal"));
    }

    let digit = |position: i32| {
        usize::try_from(position)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };
    let mut text = String::new();
    if sign == 0x4000 {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        for position in 0..=weight {
            if position == 0 {
                let _ = write!(text, "{}", digit(position));
            } else {
                let _ = write!(text, "{:04}", digit(position));
            }
        }
    }
    if scale > 0 {
        let mut fraction = String::new();
        let mut position = weight + 1;
        while fraction.len() < scale {
            let _ = write!(fraction, "{:04}", digit(position));
            position += 1;
        }
        fraction.truncate(scale);
        text.push('.');
        text.push_str(&fraction);
    }
    text.parse().map_err(|e: rust_decimal::Error| conversion(e.to_string()))
}

// =============================================================================
// Text format
// =============================================================================

fn text_array(input: &str, element: u32) -> Result<PgValue> {
    // Arrays with non-default bounds carry a `[1:2][1:3]=` prefix.
    let body = if input.starts_with('[') {
        input
            .split_once('=')
            .map(|(_, body)| body)
            .ok_or_else(|| conversion(format!("malformed array `{input}`")))?
    } else {
        input
    };
    let mut chars = body.chars().peekable();
    let value = text_level(&mut chars, element)?;
    if chars.next().is_some() {
        return Err(conversion(format!("trailing characters in array `{input}`")));
    }
    Ok(value)
}

fn text_level(chars: &mut Peekable<Chars<'_>>, element: u32) -> Result<PgValue> {
    if chars.next() != Some('{') {
        return Err(conversion("array value does not start with `{`"));
    }
    let mut items = Vec::new();
    if chars.peek() == Some(&'}') {
        chars.next();
        return Ok(PgValue::Array(items));
    }
    loop {
        match chars.peek() {
            Some('{') => items.push(text_level(chars, element)?),
            Some('"') => {
                chars.next();
                let mut item = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => item.extend(chars.next()),
                        Some('"') => break,
                        Some(c) => item.push(c),
                        None => return Err(conversion("unterminated quoted array element")),
                    }
                }
                items.push(text_scalar(element, &item)?);
            }
            _ => {
                let mut item = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ',' || c == '}' {
                        break;
                    }
                    chars.next();
                    if c == '\\' {
                        item.extend(chars.next());
                    } else {
                        item.push(c);
                    }
                }
                let item = item.trim();
                if item.eq_ignore_ascii_case("NULL") {
                    items.push(PgValue::Null);
                } else {
                    items.push(text_scalar(element, item)?);
                }
            }
        }
        match chars.next() {
            Some(',') => {}
            Some('}') => return Ok(PgValue::Array(items)),
            _ => return Err(conversion("malformed array value")),
        }
    }
}

fn parse<T: std::str::FromStr>(text: &str, kind: &str) -> Result<T> {
    text.parse()
        .map_err(|_| conversion(format!("invalid {kind} `{text}`")))
}

fn text_scalar(element: u32, text: &str) -> Result<PgValue> {
    Ok(match element {
        oid::BOOL => PgValue::Bool(text == "t" || text == "true"),
        oid::INT2 | oid::INT4 => PgValue::Int(parse(text, "integer")?),
        oid::INT8 => PgValue::BigInt(parse(text, "bigint")?),
        oid::FLOAT4 => PgValue::Float(parse(text, "real")?),
        oid::FLOAT8 => PgValue::Double(parse(text, "double precision")?),
        oid::NUMERIC => PgValue::Decimal(parse(text, "numeric")?),
        oid::UUID => PgValue::Uuid(parse(text, "uuid")?),
        oid::BYTEA => PgValue::Bytes(hex(text)?),
        oid::DATE => PgValue::Date(
            NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| conversion(e.to_string()))?,
        ),
        oid::TIME => PgValue::Time(
            NaiveTime::parse_from_str(text, "%H:%M:%S%.f").map_err(|e| conversion(e.to_string()))?,
        ),
        oid::TIMESTAMP => PgValue::DateTime(
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                .map_err(|e| conversion(e.to_string()))?,
        ),
        oid::TIMESTAMPTZ => PgValue::DateTime(
            DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z")
                .map_err(|e| conversion(e.to_string()))?
                .naive_utc(),
        ),
        oid::INTERVAL => PgValue::Interval(interval_text(text)?),
        oid::JSON | oid::JSONB => json(text.as_bytes())?,
        _ => PgValue::Text(text.to_owned()),
    })
}

fn hex(text: &str) -> Result<Vec<u8>> {
    let digits = text
        .strip_prefix("\\x")
        .ok_or_else(|| conversion("bytea value is not in hex format"))?;
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| conversion(format!("invalid hex in bytea `{text}`")))
        })
        .collect()
}

/// Parses an interval in the `postgres` output style, such as
/// `1 year 2 mons -3 days +04:05:06.5`.
pub(crate) fn interval_text(text: &str) -> Result<Interval> {
    let (mut months, mut days, mut micros) = (0_i32, 0_i32, 0_i64);
    let mut tokens = text.split_whitespace();
    while let Some(token) = tokens.next() {
        if token.contains(':') {
            micros += clock_micros(token)?;
            continue;
        }
        let amount: i32 = parse(token, "interval")?;
        match tokens.next() {
            Some("year" | "years") => months += amount * 12,
            Some("mon" | "mons") => months += amount,
            Some("day" | "days") => days += amount,
            _ => return Err(conversion(format!("invalid interval `{text}`"))),
        }
    }
    Ok(Interval::new(months, days, micros))
}

fn clock_micros(token: &str) -> Result<i64> {
    let (negative, clock) = match token.as_bytes().first() {
        Some(b'-') => (true, &token[1..]),
        Some(b'+') => (false, &token[1..]),
        _ => (false, token),
    };
    let mut parts = clock.splitn(3, ':');
    let hours: i64 = parse(parts.next().unwrap_or_default(), "interval hours")?;
    let minutes: i64 = parse(parts.next().unwrap_or_default(), "interval minutes")?;
    let seconds = parts.next().unwrap_or("0");
    let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));
    let whole: i64 = parse(whole, "interval seconds")?;
    let fraction: i64 = if fraction.is_empty() {
        0
    } else {
        parse(&format!("{fraction:0<6}")[..6], "interval fraction")?
    };
    let total = ((hours * 60 + minutes) * 60 + whole) * 1_000_000 + fraction;
    Ok(if negative { -total } else { total })
}
