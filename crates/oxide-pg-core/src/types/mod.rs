//! The value type system.
//!
//! Maps host values to PostgreSQL wire values and back, and classifies them
//! with a [`ValueType`] that drives casting and decoding.

mod convert;
mod enums;
mod value;
mod value_type;

pub use convert::{from_pg, to_pg, FromPgValue, Json, PgType, ToPgValue, Typed};
pub use enums::{
    decode_enum, encode_enum, enum_value_type, is_registered, register_enum, PgEnum,
};
pub use value::{quote_literal, Binary, Interval, PgValue, INLINE_STRING_MAX_LEN};
pub use value_type::{quote_ident, EnumType, TypeKind, ValueType};
