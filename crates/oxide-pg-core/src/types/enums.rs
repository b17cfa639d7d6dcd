//! Process-wide registry of PostgreSQL enum types.
//!
//! Enums must be registered once, before first use, with
//! [`register_enum`]. `#[derive(PgEnum)]` implements the conversion traits
//! in terms of the helpers below.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use super::convert::mismatch;
use super::value::PgValue;
use super::value_type::{EnumType, ValueType};
use crate::error::{Error, Result};

/// A host enum that maps onto a PostgreSQL enum type.
pub trait PgEnum: Sized + 'static {
    /// SQL type name.
    const NAME: &'static str;
    /// Schema qualifier, if any.
    const SCHEMA: Option<&'static str>;
    /// Labels in declaration order.
    const LABELS: &'static [&'static str];

    /// Returns the label of this variant.
    fn label(&self) -> &'static str;

    /// Returns the variant with the given label.
    fn from_label(label: &str) -> Option<Self>;
}

static ENUMS: LazyLock<RwLock<HashMap<TypeId, Arc<EnumType>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Registers `E` and returns its descriptor.
///
/// Registering the same type twice returns the existing descriptor.
pub fn register_enum<E: PgEnum>() -> Arc<EnumType> {
    let key = TypeId::of::<E>();
    if let Some(existing) = lookup(key) {
        return existing;
    }
    let mut enums = ENUMS
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    Arc::clone(enums.entry(key).or_insert_with(|| {
        Arc::new(EnumType {
            host: type_name::<E>(),
            name: E::NAME,
            schema: E::SCHEMA,
            labels: E::LABELS,
        })
    }))
}

/// Returns whether `E` has been registered.
#[must_use]
pub fn is_registered<E: PgEnum>() -> bool {
    lookup(TypeId::of::<E>()).is_some()
}

fn lookup(key: TypeId) -> Option<Arc<EnumType>> {
    ENUMS
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .get(&key)
        .cloned()
}

/// Returns the value type of a registered enum.
///
/// # Errors
///
/// Returns a conversion error naming the host type when `E` was never
/// registered.
pub fn enum_value_type<E: PgEnum>() -> Result<ValueType> {
    lookup(TypeId::of::<E>())
        .map(ValueType::Enum)
        .ok_or_else(|| {
            Error::conversion(format!(
                "`{}` has no PostgreSQL mapping; register it with `register_enum` first",
                type_name::<E>()
            ))
        })
}

/// Encodes an enum variant.
///
/// # Errors
///
/// Returns a conversion error when `E` is not registered.
pub fn encode_enum<E: PgEnum>(value: &E) -> Result<PgValue> {
    enum_value_type::<E>()?;
    Ok(PgValue::Enum(String::from(value.label())))
}

/// Decodes an enum variant from its label.
///
/// # Errors
///
/// Returns a conversion error for unknown labels or non-text values.
pub fn decode_enum<E: PgEnum>(value: PgValue) -> Result<E> {
    match value {
        PgValue::Enum(label) | PgValue::Text(label) => E::from_label(&label).ok_or_else(|| {
            Error::conversion(format!(
                "`{label}` is not a label of enum `{}`",
                E::NAME
            ))
        }),
        other => Err(mismatch::<E>(&other)),
    }
}
