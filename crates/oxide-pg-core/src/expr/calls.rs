//! Method handlers and derived accessors, keyed by receiver kind and name.
//!
//! The built-in table is created once. Callers that need extra methods
//! build their own registry on top of it:
//!
//! ```ignore
//! let mut calls = CallRegistry::with_builtins();
//! calls.register_method(TypeKind::String, "soundex_eq", soundex_eq);
//! let compiler = Compiler::with_registry(&scope, &calls);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use super::compile::{single_arg, wrap, Compiler};
use super::dsl::{lit, names};
use super::node::{Expr, TypedExpression};
use crate::error::{Error, Result};
use crate::raw::RawQuery;
use crate::types::{TypeKind, ValueType};

/// Compiles a method call given the compiled receiver and raw arguments.
pub type MethodHandler = fn(&Compiler<'_>, TypedExpression, &[Expr]) -> Result<TypedExpression>;

/// Compiles a zero-argument pseudo-property.
pub type Accessor = fn(TypedExpression) -> Result<TypedExpression>;

/// Dispatch table for method calls and derived accessors.
#[derive(Debug, Clone, Default)]
pub struct CallRegistry {
    methods: HashMap<TypeKind, HashMap<&'static str, MethodHandler>>,
    accessors: HashMap<TypeKind, HashMap<&'static str, Accessor>>,
}

static BUILTIN: LazyLock<Arc<CallRegistry>> =
    LazyLock::new(|| Arc::new(CallRegistry::with_builtins()));

impl CallRegistry {
    /// Returns the shared built-in registry.
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN
    }

    /// Returns a shared handle to the built-in registry.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::clone(&BUILTIN)
    }

    /// Creates a registry holding the built-in handlers.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut calls = Self::default();
        calls
            .register_method(TypeKind::String, names::STARTS_WITH, starts_with)
            .register_method(TypeKind::String, names::ENDS_WITH, ends_with)
            .register_method(TypeKind::String, names::CONTAINS, contains)
            .register_method(
                TypeKind::String,
                names::STARTS_WITH_IGNORE_CASE,
                starts_with_ignore_case,
            )
            .register_method(TypeKind::String, names::SUBSTRING, substring);

        calls
            .register_accessor(TypeKind::Temporal, names::YEAR, year)
            .register_accessor(TypeKind::Temporal, names::MONTH, month)
            .register_accessor(TypeKind::Temporal, names::DAY, day)
            .register_accessor(TypeKind::Temporal, names::HOUR, hour)
            .register_accessor(TypeKind::Temporal, names::MINUTE, minute)
            .register_accessor(TypeKind::Temporal, names::SECOND, second)
            .register_accessor(TypeKind::Temporal, names::DATE, date);
        calls
            .register_accessor(TypeKind::String, names::LENGTH, char_length)
            .register_accessor(TypeKind::String, names::TO_UPPER, to_upper)
            .register_accessor(TypeKind::String, names::TO_LOWER, to_lower)
            .register_accessor(TypeKind::Array, names::LENGTH, cardinality)
            .register_accessor(TypeKind::Json, names::LENGTH, json_length);
        calls
    }

    /// Registers a method handler, replacing an existing one.
    pub fn register_method(
        &mut self,
        kind: TypeKind,
        name: &'static str,
        handler: MethodHandler,
    ) -> &mut Self {
        self.methods.entry(kind).or_default().insert(name, handler);
        self
    }

    /// Registers a derived accessor, replacing an existing one.
    pub fn register_accessor(
        &mut self,
        kind: TypeKind,
        name: &'static str,
        accessor: Accessor,
    ) -> &mut Self {
        self.accessors.entry(kind).or_default().insert(name, accessor);
        self
    }

    /// Looks up a method handler.
    #[must_use]
    pub fn method(&self, kind: TypeKind, name: &str) -> Option<MethodHandler> {
        self.methods.get(&kind).and_then(|m| m.get(name)).copied()
    }

    /// Looks up a derived accessor.
    #[must_use]
    pub fn accessor(&self, kind: TypeKind, name: &str) -> Option<Accessor> {
        self.accessors.get(&kind).and_then(|m| m.get(name)).copied()
    }
}

fn string_arg(compiler: &Compiler<'_>, name: &str, args: &[Expr]) -> Result<TypedExpression> {
    let arg = compiler.compile(single_arg(name, args)?)?;
    match arg.ty() {
        ValueType::String | ValueType::Null => Ok(arg),
        other => Err(Error::compile(format!(
            "`{name}` requires a string argument, got {other}"
        ))),
    }
}

fn matches_pattern(
    receiver: &TypedExpression,
    op: &str,
    prefix: &'static str,
    arg: &TypedExpression,
    suffix: &'static str,
) -> TypedExpression {
    TypedExpression::new(
        RawQuery::new()
            .text("(")
            .nested(receiver.query())
            .text(format!(") {op} ({prefix}"))
            .nested(arg.query())
            .text(suffix),
        ValueType::Boolean,
    )
}

fn starts_with(
    compiler: &Compiler<'_>,
    receiver: TypedExpression,
    args: &[Expr],
) -> Result<TypedExpression> {
    let prefix = string_arg(compiler, names::STARTS_WITH, args)?;
    Ok(matches_pattern(
        &receiver,
        "LIKE",
        "escape_like(",
        &prefix,
        ") || '%')",
    ))
}

fn ends_with(
    compiler: &Compiler<'_>,
    receiver: TypedExpression,
    args: &[Expr],
) -> Result<TypedExpression> {
    let suffix = string_arg(compiler, names::ENDS_WITH, args)?;
    Ok(matches_pattern(
        &receiver,
        "LIKE",
        "'%' || escape_like(",
        &suffix,
        "))",
    ))
}

fn contains(
    compiler: &Compiler<'_>,
    receiver: TypedExpression,
    args: &[Expr],
) -> Result<TypedExpression> {
    let needle = string_arg(compiler, names::CONTAINS, args)?;
    Ok(matches_pattern(
        &receiver,
        "LIKE",
        "'%' || escape_like(",
        &needle,
        ") || '%')",
    ))
}

fn starts_with_ignore_case(
    compiler: &Compiler<'_>,
    receiver: TypedExpression,
    args: &[Expr],
) -> Result<TypedExpression> {
    let prefix = string_arg(compiler, names::STARTS_WITH_IGNORE_CASE, args)?;
    Ok(matches_pattern(
        &receiver,
        "~*",
        "'^' || escape_regexp(",
        &prefix,
        "))",
    ))
}

fn integer_arg(compiler: &Compiler<'_>, expr: &Expr) -> Result<TypedExpression> {
    let arg = compiler.compile(expr)?;
    match arg.ty() {
        ValueType::Integer | ValueType::Integer64 | ValueType::Null => Ok(arg),
        other => Err(Error::compile(format!(
            "`substring` requires integer positions, got {other}"
        ))),
    }
}

fn substring(
    compiler: &Compiler<'_>,
    receiver: TypedExpression,
    args: &[Expr],
) -> Result<TypedExpression> {
    let (start, len) = match args {
        [start] => (start, None),
        [start, len] => (start, Some(len)),
        _ => {
            return Err(Error::compile(format!(
                "`substring` takes 1 or 2 arguments, got {}",
                args.len()
            )))
        }
    };
    let start = integer_arg(compiler, &(start.clone() + lit(1)))?;
    let mut query = RawQuery::new()
        .text("substr(")
        .nested(receiver.query())
        .text(", ")
        .nested(start.query());
    if let Some(len) = len {
        let len = integer_arg(compiler, len)?;
        query = query.text(", ").nested(len.query());
    }
    Ok(TypedExpression::new(query.text(")"), ValueType::String))
}

fn date_part(field: &str, value: &TypedExpression) -> TypedExpression {
    wrap(
        &format!("date_part('{field}', "),
        value,
        ")::integer",
        ValueType::Integer,
    )
}

fn year(value: TypedExpression) -> Result<TypedExpression> {
    Ok(date_part("year", &value))
}

fn month(value: TypedExpression) -> Result<TypedExpression> {
    Ok(date_part("month", &value))
}

fn day(value: TypedExpression) -> Result<TypedExpression> {
    Ok(date_part("day", &value))
}

fn hour(value: TypedExpression) -> Result<TypedExpression> {
    Ok(date_part("hour", &value))
}

fn minute(value: TypedExpression) -> Result<TypedExpression> {
    Ok(date_part("minute", &value))
}

fn second(value: TypedExpression) -> Result<TypedExpression> {
    Ok(wrap(
        "floor(date_part('second', ",
        &value,
        "))::integer",
        ValueType::Integer,
    ))
}

fn date(value: TypedExpression) -> Result<TypedExpression> {
    Ok(wrap("(", &value, ")::date", ValueType::Date))
}

fn char_length(value: TypedExpression) -> Result<TypedExpression> {
    Ok(wrap("char_length(", &value, ")", ValueType::Integer))
}

fn cardinality(value: TypedExpression) -> Result<TypedExpression> {
    Ok(wrap("cardinality(", &value, ")", ValueType::Integer))
}

fn json_length(value: TypedExpression) -> Result<TypedExpression> {
    Ok(wrap("jsonb_array_length(", &value, ")", ValueType::Integer))
}

fn to_upper(value: TypedExpression) -> Result<TypedExpression> {
    Ok(wrap("upper(", &value, ")", ValueType::String))
}

fn to_lower(value: TypedExpression) -> Result<TypedExpression> {
    Ok(wrap("lower(", &value, ")", ValueType::String))
}
