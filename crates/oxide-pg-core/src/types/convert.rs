//! Conversions between host values and wire values.
//!
//! [`ToPgValue`] and [`FromPgValue`] are mutually inverse for every value a
//! type can represent, including `None` and nested arrays.

use std::any::type_name;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::value::{Binary, Interval, PgValue};
use super::value_type::ValueType;
use crate::error::{Error, Result};

/// Static value-type inference for a host type.
pub trait PgType {
    /// Returns the value type of this host type.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when the type has no mapping, e.g. an enum
    /// that was never registered.
    fn value_type() -> Result<ValueType>;
}

/// Host values that can be sent to the server.
pub trait ToPgValue: PgType {
    /// Converts the value to its wire representation.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when the value cannot be represented.
    fn to_pg_value(&self) -> Result<PgValue>;
}

/// Host values that can be read back from the server.
pub trait FromPgValue: Sized {
    /// Converts a wire value into the host value.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when the wire value has the wrong shape.
    fn from_pg_value(value: PgValue) -> Result<Self>;
}

/// Converts a host value into a wire value paired with its value type.
///
/// # Errors
///
/// Propagates conversion errors from the host type.
pub fn to_pg<T: ToPgValue + ?Sized>(value: &T) -> Result<(PgValue, ValueType)> {
    Ok((value.to_pg_value()?, T::value_type()?))
}

/// Converts a wire value of the given type back into a host value.
///
/// Enum labels are checked against the registered label set first.
///
/// # Errors
///
/// Returns a conversion error when the value does not fit `ty` or `T`.
pub fn from_pg<T: FromPgValue>(ty: &ValueType, value: PgValue) -> Result<T> {
    if let (ValueType::Enum(e), PgValue::Enum(label) | PgValue::Text(label)) = (ty, &value) {
        if !e.has_label(label) {
            return Err(Error::conversion(format!(
                "`{label}` is not a label of enum `{}`",
                e.name
            )));
        }
    }
    T::from_pg_value(value)
}

pub(crate) fn mismatch<T: ?Sized>(value: &PgValue) -> Error {
    Error::conversion(format!(
        "cannot convert {} value into `{}`",
        value.variant_name(),
        type_name::<T>()
    ))
}

macro_rules! impl_scalar {
    ($ty:ty, $value_type:expr, |$v:ident| $encode:expr, { $($pat:pat => $decode:expr),+ $(,)? }) => {
        impl PgType for $ty {
            fn value_type() -> Result<ValueType> {
                Ok($value_type)
            }
        }

        impl ToPgValue for $ty {
            fn to_pg_value(&self) -> Result<PgValue> {
                let $v = self;
                Ok($encode)
            }
        }

        impl FromPgValue for $ty {
            fn from_pg_value(value: PgValue) -> Result<Self> {
                match value {
                    $($pat => $decode,)+
                    other => Err(mismatch::<Self>(&other)),
                }
            }
        }
    };
}

impl_scalar!(bool, ValueType::Boolean, |v| PgValue::Bool(*v), {
    PgValue::Bool(b) => Ok(b),
});

impl_scalar!(i16, ValueType::Integer, |v| PgValue::Int(i32::from(*v)), {
    PgValue::Int(n) => i16::try_from(n).map_err(|e| Error::conversion(e.to_string())),
});

impl_scalar!(i32, ValueType::Integer, |v| PgValue::Int(*v), {
    PgValue::Int(n) => Ok(n),
});

impl_scalar!(i64, ValueType::Integer64, |v| PgValue::BigInt(*v), {
    PgValue::BigInt(n) => Ok(n),
    PgValue::Int(n) => Ok(i64::from(n)),
});

impl_scalar!(f32, ValueType::Float, |v| PgValue::Float(*v), {
    PgValue::Float(f) => Ok(f),
});

impl_scalar!(f64, ValueType::Double, |v| PgValue::Double(*v), {
    PgValue::Double(f) => Ok(f),
    PgValue::Float(f) => Ok(f64::from(f)),
});

impl_scalar!(Decimal, ValueType::Decimal, |v| PgValue::Decimal(*v), {
    PgValue::Decimal(d) => Ok(d),
});

impl_scalar!(String, ValueType::String, |v| PgValue::Text(v.clone()), {
    PgValue::Text(s) | PgValue::Enum(s) => Ok(s),
    PgValue::Json(v) => Ok(v.to_string()),
});

impl_scalar!(Uuid, ValueType::Uuid, |v| PgValue::Uuid(*v), {
    PgValue::Uuid(u) => Ok(u),
});

impl_scalar!(NaiveDate, ValueType::Date, |v| PgValue::Date(*v), {
    PgValue::Date(d) => Ok(d),
});

impl_scalar!(NaiveTime, ValueType::Time, |v| PgValue::Time(*v), {
    PgValue::Time(t) => Ok(t),
});

impl_scalar!(NaiveDateTime, ValueType::DateTime, |v| PgValue::DateTime(*v), {
    PgValue::DateTime(dt) => Ok(dt),
});

impl_scalar!(DateTime<Utc>, ValueType::DateTime, |v| PgValue::DateTime(v.naive_utc()), {
    PgValue::DateTime(dt) => Ok(dt.and_utc()),
});

impl_scalar!(Interval, ValueType::Interval, |v| PgValue::Interval(*v), {
    PgValue::Interval(i) => Ok(i),
});

impl_scalar!(Binary, ValueType::Binary, |v| PgValue::Bytes(v.0.clone()), {
    PgValue::Bytes(b) => Ok(Self(b)),
});

impl_scalar!(serde_json::Value, ValueType::json(), |v| PgValue::Json(v.clone()), {
    PgValue::Json(v) => Ok(v),
    PgValue::Null => Ok(serde_json::Value::Null),
});

impl PgType for str {
    fn value_type() -> Result<ValueType> {
        Ok(ValueType::String)
    }
}

impl ToPgValue for str {
    fn to_pg_value(&self) -> Result<PgValue> {
        Ok(PgValue::Text(String::from(self)))
    }
}

impl<T: PgType + ?Sized> PgType for &T {
    fn value_type() -> Result<ValueType> {
        T::value_type()
    }
}

impl<T: ToPgValue + ?Sized> ToPgValue for &T {
    fn to_pg_value(&self) -> Result<PgValue> {
        (**self).to_pg_value()
    }
}

impl<T: PgType> PgType for Option<T> {
    fn value_type() -> Result<ValueType> {
        T::value_type()
    }
}

impl<T: ToPgValue> ToPgValue for Option<T> {
    fn to_pg_value(&self) -> Result<PgValue> {
        match self {
            Some(v) => v.to_pg_value(),
            None => Ok(PgValue::Null),
        }
    }
}

impl<T: FromPgValue> FromPgValue for Option<T> {
    fn from_pg_value(value: PgValue) -> Result<Self> {
        match value {
            PgValue::Null => Ok(None),
            other => T::from_pg_value(other).map(Some),
        }
    }
}

impl<T: PgType> PgType for Vec<T> {
    fn value_type() -> Result<ValueType> {
        Ok(ValueType::array_of(T::value_type()?))
    }
}

impl<T: ToPgValue> ToPgValue for Vec<T> {
    fn to_pg_value(&self) -> Result<PgValue> {
        self.as_slice().to_pg_value()
    }
}

impl<T: FromPgValue> FromPgValue for Vec<T> {
    fn from_pg_value(value: PgValue) -> Result<Self> {
        match value {
            PgValue::Array(items) => items.into_iter().map(T::from_pg_value).collect(),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: PgType> PgType for [T] {
    fn value_type() -> Result<ValueType> {
        Ok(ValueType::array_of(T::value_type()?))
    }
}

impl<T: ToPgValue> ToPgValue for [T] {
    fn to_pg_value(&self) -> Result<PgValue> {
        let items = self
            .iter()
            .map(ToPgValue::to_pg_value)
            .collect::<Result<Vec<_>>>()?;
        Ok(PgValue::Array(items))
    }
}

/// A JSON column backed by a serde-serializable shape.
///
/// Unlike `serde_json::Value`, the value type records the backing shape so
/// decoding produces `T` rather than a generic document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Returns the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> PgType for Json<T> {
    fn value_type() -> Result<ValueType> {
        Ok(ValueType::Json(Some(type_name::<T>().into())))
    }
}

impl<T: Serialize> ToPgValue for Json<T> {
    fn to_pg_value(&self) -> Result<PgValue> {
        serde_json::to_value(&self.0)
            .map(PgValue::Json)
            .map_err(|e| Error::conversion(format!("`{}`: {e}", type_name::<T>())))
    }
}

impl<T: DeserializeOwned> FromPgValue for Json<T> {
    fn from_pg_value(value: PgValue) -> Result<Self> {
        let document = match value {
            PgValue::Json(v) => v,
            PgValue::Text(s) => serde_json::from_str(&s)
                .map_err(|e| Error::conversion(format!("`{}`: {e}", type_name::<T>())))?,
            other => return Err(mismatch::<Self>(&other)),
        };
        serde_json::from_value(document)
            .map(Json)
            .map_err(|e| Error::conversion(format!("`{}`: {e}", type_name::<T>())))
    }
}

/// A value with an explicitly chosen value type.
///
/// Used where the static type alone does not carry enough information,
/// for example an untyped NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct Typed {
    pub value: PgValue,
    pub ty: ValueType,
}

impl Typed {
    /// An untyped NULL.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            value: PgValue::Null,
            ty: ValueType::Null,
        }
    }

    /// A NULL of the static type `T`.
    ///
    /// # Errors
    ///
    /// Propagates conversion errors from `T::value_type`.
    pub fn null_of<T: PgType>() -> Result<Self> {
        Ok(Self {
            value: PgValue::Null,
            ty: T::value_type()?,
        })
    }

    /// Converts a host value.
    ///
    /// # Errors
    ///
    /// Propagates conversion errors.
    pub fn from_host<T: ToPgValue + ?Sized>(value: &T) -> Result<Self> {
        let (value, ty) = to_pg(value)?;
        Ok(Self { value, ty })
    }
}

pub(crate) fn unsupported<T: ?Sized>() -> Error {
    Error::conversion(format!("`{}` has no PostgreSQL mapping", type_name::<T>()))
}

impl PgType for u64 {
    fn value_type() -> Result<ValueType> {
        Ok(ValueType::Integer64)
    }
}

impl ToPgValue for u64 {
    fn to_pg_value(&self) -> Result<PgValue> {
        i64::try_from(*self)
            .map(PgValue::BigInt)
            .map_err(|_| unsupported::<Self>())
    }
}

impl FromPgValue for u64 {
    fn from_pg_value(value: PgValue) -> Result<Self> {
        match value {
            PgValue::BigInt(n) => Self::try_from(n).map_err(|e| Error::conversion(e.to_string())),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T>(value: T)
    where
        T: ToPgValue + FromPgValue + PartialEq + std::fmt::Debug,
    {
        let (wire, ty) = to_pg(&value).unwrap();
        assert_eq!(ty, T::value_type().unwrap());
        let back: T = from_pg(&ty, wire).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_roundtrip_scalars() {
        roundtrip(true);
        roundtrip(7_i16);
        roundtrip(42_i32);
        roundtrip(-9_i64);
        roundtrip(1.5_f32);
        roundtrip(2.25_f64);
        roundtrip(Decimal::new(12345, 2));
        roundtrip(String::from("hello"));
        roundtrip(Uuid::nil());
        roundtrip(Interval::new(1, 2, 3));
        roundtrip(Binary(vec![1, 2, 3]));
    }

    #[test]
    fn test_roundtrip_temporal() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let time = NaiveTime::from_hms_micro_opt(12, 30, 1, 250).unwrap();
        roundtrip(date);
        roundtrip(time);
        roundtrip(date.and_time(time));
        roundtrip(date.and_time(time).and_utc());
    }

    #[test]
    fn test_roundtrip_null_and_options() {
        roundtrip(None::<i32>);
        roundtrip(Some(String::from("x")));
        assert_eq!(None::<i32>.to_pg_value().unwrap(), PgValue::Null);
    }

    #[test]
    fn test_roundtrip_nested_arrays() {
        roundtrip(vec![vec![1_i64, 2], vec![], vec![3]]);
        roundtrip(vec![Some(String::from("a")), None]);
        assert_eq!(
            Vec::<Vec<i32>>::value_type().unwrap(),
            ValueType::array_of(ValueType::array_of(ValueType::Integer))
        );
    }

    #[test]
    fn test_roundtrip_json() {
        #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
        struct Address {
            city: String,
        }

        roundtrip(serde_json::json!({"a": [1, 2, {"b": null}]}));
        roundtrip(Json(Address {
            city: String::from("Ghent"),
        }));
        assert!(matches!(
            Json::<Address>::value_type().unwrap(),
            ValueType::Json(Some(shape)) if shape.ends_with("Address")
        ));
        assert_eq!(serde_json::Value::value_type().unwrap(), ValueType::json());
    }

    #[test]
    fn test_decode_mismatch_is_conversion_error() {
        let err = i32::from_pg_value(PgValue::Text(String::from("x"))).unwrap_err();
        assert!(matches!(err, Error::Conversion(msg) if msg.contains("i32")));
    }

    #[test]
    fn test_u64_out_of_range() {
        assert!(matches!(u64::MAX.to_pg_value(), Err(Error::Conversion(_))));
        assert_eq!(5_u64.to_pg_value().unwrap(), PgValue::BigInt(5));
    }

    #[test]
    fn test_slice_and_str_conversions() {
        let values: &[&str] = &["a", "b"];
        let (wire, ty) = to_pg(values).unwrap();
        assert_eq!(ty, ValueType::array_of(ValueType::String));
        assert_eq!(
            wire,
            PgValue::Array(vec![
                PgValue::Text(String::from("a")),
                PgValue::Text(String::from("b"))
            ])
        );
    }
}
