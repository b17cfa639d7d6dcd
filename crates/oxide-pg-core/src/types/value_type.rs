//! PostgreSQL value types.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Descriptor of a registered PostgreSQL enum type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    /// Host type name the enum was registered for.
    pub host: &'static str,
    /// SQL type name.
    pub name: &'static str,
    /// Schema qualifier, if any.
    pub schema: Option<&'static str>,
    /// Labels in declaration order.
    pub labels: &'static [&'static str],
}

impl EnumType {
    /// Returns whether `label` is one of the enum's labels.
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(&label)
    }
}

/// Classification of a value that drives encoding, decoding and casts.
///
/// `Array` and `Enum` are parameterized; every other kind is a singleton.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Untyped NULL.
    Null,
    /// `boolean`
    Boolean,
    /// `integer`
    Integer,
    /// `bigint`
    Integer64,
    /// `real`
    Float,
    /// `double precision`
    Double,
    /// `numeric`
    Decimal,
    /// `text`
    String,
    /// `uuid`
    Uuid,
    /// `date`
    Date,
    /// `time`
    Time,
    /// `timestamp`
    DateTime,
    /// `interval`
    Interval,
    /// `bytea`
    Binary,
    /// `jsonb`, with the host type name of its backing shape when known.
    Json(Option<Arc<str>>),
    /// A registered enum.
    Enum(Arc<EnumType>),
    /// Array of the item type.
    Array(Box<ValueType>),
}

/// The shape of a value type without its parameters.
///
/// Used as the declaring-type half of call-handler registration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Null,
    Boolean,
    Numeric,
    String,
    Uuid,
    Temporal,
    Interval,
    Binary,
    Json,
    Enum,
    Array,
}

impl ValueType {
    /// Creates an array type of `item`.
    #[must_use]
    pub fn array_of(item: Self) -> Self {
        Self::Array(Box::new(item))
    }

    /// Creates an untyped JSON document type.
    #[must_use]
    pub const fn json() -> Self {
        Self::Json(None)
    }

    /// Returns the declaring-type kind.
    #[must_use]
    pub const fn kind(&self) -> TypeKind {
        match self {
            Self::Null => TypeKind::Null,
            Self::Boolean => TypeKind::Boolean,
            Self::Integer | Self::Integer64 | Self::Float | Self::Double | Self::Decimal => {
                TypeKind::Numeric
            }
            Self::String => TypeKind::String,
            Self::Uuid => TypeKind::Uuid,
            Self::Date | Self::Time | Self::DateTime => TypeKind::Temporal,
            Self::Interval => TypeKind::Interval,
            Self::Binary => TypeKind::Binary,
            Self::Json(_) => TypeKind::Json,
            Self::Enum(_) => TypeKind::Enum,
            Self::Array(_) => TypeKind::Array,
        }
    }

    /// Returns the array item type, if this is an array.
    #[must_use]
    pub fn item(&self) -> Option<&Self> {
        match self {
            Self::Array(item) => Some(item),
            _ => None,
        }
    }

    /// Returns whether this is an array type.
    #[must_use]
    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Returns whether this is a JSON type.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self, Self::Json(_))
    }

    /// Returns whether values of this type support arithmetic.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self.kind(), TypeKind::Numeric)
    }

    /// Returns the cast annotation used for parameters of this type.
    #[must_use]
    pub fn pg_cast(&self) -> String {
        match self {
            Self::Null => String::from("unknown"),
            Self::Boolean => String::from("boolean"),
            Self::Integer => String::from("integer"),
            Self::Integer64 => String::from("bigint"),
            Self::Float => String::from("real"),
            Self::Double => String::from("double precision"),
            Self::Decimal => String::from("numeric"),
            Self::String => String::from("text"),
            Self::Uuid => String::from("uuid"),
            Self::Date => String::from("date"),
            Self::Time => String::from("time"),
            Self::DateTime => String::from("timestamp"),
            Self::Interval => String::from("interval"),
            Self::Binary => String::from("bytea"),
            Self::Json(_) => String::from("jsonb"),
            Self::Enum(e) => match e.schema {
                Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(e.name)),
                None => quote_ident(e.name),
            },
            Self::Array(item) => format!("{}[]", item.pg_cast()),
        }
    }

    /// Parses an explicitly declared column type.
    ///
    /// Enum types cannot be declared by name; they come from the enum
    /// registry.
    ///
    /// # Errors
    ///
    /// Returns a conversion error for unknown type names.
    pub fn parse(decl: &str) -> Result<Self> {
        let decl = decl.trim();
        if let Some(item) = decl.strip_suffix("[]") {
            return Ok(Self::array_of(Self::parse(item)?));
        }
        let ty = match decl.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Self::Boolean,
            "int" | "int2" | "int4" | "integer" | "smallint" => Self::Integer,
            "int8" | "bigint" | "bigserial" => Self::Integer64,
            "serial" => Self::Integer,
            "real" | "float4" => Self::Float,
            "double precision" | "float8" => Self::Double,
            "numeric" | "decimal" => Self::Decimal,
            "text" | "varchar" | "character varying" | "char" => Self::String,
            "uuid" => Self::Uuid,
            "date" => Self::Date,
            "time" => Self::Time,
            "timestamp" | "timestamptz" => Self::DateTime,
            "interval" => Self::Interval,
            "bytea" => Self::Binary,
            "json" | "jsonb" => Self::json(),
            other => {
                return Err(Error::conversion(format!("unknown declared type `{other}`")));
            }
        };
        Ok(ty)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(Some(shape)) => write!(f, "jsonb<{shape}>"),
            other => f.write_str(&other.pg_cast()),
        }
    }
}

/// Quotes an identifier with PostgreSQL's rules.
#[must_use]
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
