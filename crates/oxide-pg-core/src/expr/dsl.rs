//! Builder functions and methods for writing expressions.
//!
//! ```ignore
//! use oxide_pg_core::expr::{col, slot};
//!
//! // "id" = 2 on the statement's first table
//! let by_id = col("id").eq(2);
//!
//! // a join condition between slots t0 and t1
//! let on = slot(0).col("id").eq(slot(1).col("author_id"));
//!
//! // JSON access and string matching
//! let city = col("address").json_text("city").starts_with("Gh");
//! ```

use std::ops::{Add, Div, Mul, Not, Sub};
use std::sync::Arc;

use super::node::{BinaryOp, Call, Expr, FieldPath, IntoExpr, PathStep, UnaryOp};
use crate::error::Error;
use crate::raw::Slot;
use crate::types::{ToPgValue, Typed, ValueType};

/// Names of the built-in method handlers and accessors.
pub mod names {
    pub const STARTS_WITH: &str = "starts_with";
    pub const ENDS_WITH: &str = "ends_with";
    pub const CONTAINS: &str = "contains";
    pub const STARTS_WITH_IGNORE_CASE: &str = "starts_with_ignore_case";
    pub const SUBSTRING: &str = "substring";
    pub const INDEX: &str = "index";
    pub const PG_IN: &str = "pg_in";
    pub const PG_NOT_IN: &str = "pg_not_in";
    pub const PG_CONTAINS_ANY: &str = "pg_contains_any";

    pub const YEAR: &str = "year";
    pub const MONTH: &str = "month";
    pub const DAY: &str = "day";
    pub const HOUR: &str = "hour";
    pub const MINUTE: &str = "minute";
    pub const SECOND: &str = "second";
    pub const DATE: &str = "date";
    pub const LENGTH: &str = "length";
    pub const TO_UPPER: &str = "to_upper";
    pub const TO_LOWER: &str = "to_lower";
}

/// A column of the statement's first table.
#[must_use]
pub fn col(name: &str) -> Expr {
    Expr::Field(FieldPath {
        steps: vec![PathStep::Column(Arc::from(name))],
    })
}

/// The table slot at `position` (`t0`, `t1`, ...).
#[must_use]
pub fn slot(position: usize) -> SlotRef {
    SlotRef {
        slot: Slot::at(position),
    }
}

/// A host value.
pub fn lit<T: ToPgValue>(value: T) -> Expr {
    Expr::constant(&value)
}

/// An untyped NULL.
#[must_use]
pub const fn null() -> Expr {
    Expr::Constant(Typed::null())
}

/// A server-side SQL function call, looked up in the function catalog.
pub fn sql_fn<I>(name: &str, args: I) -> Expr
where
    I: IntoIterator,
    I::Item: IntoExpr,
{
    Expr::Call(Call {
        name: Arc::from(name),
        receiver: None,
        args: args.into_iter().map(IntoExpr::into_expr).collect(),
        sql_function: true,
    })
}

/// A reference to one table slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRef {
    slot: Slot,
}

impl SlotRef {
    /// A slot with a caller-chosen name.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            slot: Slot::new(name),
        }
    }

    /// A column of this slot's table.
    #[must_use]
    pub fn col(&self, name: &str) -> Expr {
        Expr::Field(FieldPath {
            steps: vec![
                PathStep::Table(self.slot.clone()),
                PathStep::Column(Arc::from(name)),
            ],
        })
    }

    /// Returns the slot.
    #[must_use]
    pub const fn slot(&self) -> &Slot {
        &self.slot
    }
}

impl Expr {
    fn compare(self, op: BinaryOp, other: impl IntoExpr) -> Self {
        Self::binary(op, self, other.into_expr())
    }

    /// `self = other`; `IS NULL` when `other` is NULL.
    #[must_use]
    pub fn eq(self, other: impl IntoExpr) -> Self {
        self.compare(BinaryOp::Eq, other)
    }

    /// `self <> other`; `IS NOT NULL` when `other` is NULL.
    #[must_use]
    pub fn ne(self, other: impl IntoExpr) -> Self {
        self.compare(BinaryOp::NotEq, other)
    }

    #[must_use]
    pub fn lt(self, other: impl IntoExpr) -> Self {
        self.compare(BinaryOp::Lt, other)
    }

    #[must_use]
    pub fn lte(self, other: impl IntoExpr) -> Self {
        self.compare(BinaryOp::Lte, other)
    }

    #[must_use]
    pub fn gt(self, other: impl IntoExpr) -> Self {
        self.compare(BinaryOp::Gt, other)
    }

    #[must_use]
    pub fn gte(self, other: impl IntoExpr) -> Self {
        self.compare(BinaryOp::Gte, other)
    }

    #[must_use]
    pub fn and(self, other: impl IntoExpr) -> Self {
        self.compare(BinaryOp::And, other)
    }

    #[must_use]
    pub fn or(self, other: impl IntoExpr) -> Self {
        self.compare(BinaryOp::Or, other)
    }

    #[must_use]
    pub fn is_null(self) -> Self {
        self.eq(null())
    }

    #[must_use]
    pub fn is_not_null(self) -> Self {
        self.ne(null())
    }

    /// `(self)::ty`
    #[must_use]
    pub fn cast(self, ty: ValueType) -> Self {
        Self::unary(UnaryOp::Cast(ty), self)
    }

    /// Number of elements of an array.
    #[must_use]
    pub fn array_length(self) -> Self {
        Self::unary(UnaryOp::ArrayLength, self)
    }

    fn step(self, step: PathStep) -> Self {
        match self {
            Self::Field(mut path) => {
                path.steps.push(step);
                Self::Field(path)
            }
            Self::Invalid(e) => Self::Invalid(e),
            _ => Self::Invalid(Error::compile(
                "JSON steps are only supported on column paths",
            )),
        }
    }

    /// `self->'key'`
    #[must_use]
    pub fn json(self, key: &str) -> Self {
        self.step(PathStep::JsonKey {
            key: Arc::from(key),
            as_text: false,
        })
    }

    /// `self->>'key'`
    #[must_use]
    pub fn json_text(self, key: &str) -> Self {
        self.step(PathStep::JsonKey {
            key: Arc::from(key),
            as_text: true,
        })
    }

    /// `self->index`
    #[must_use]
    pub fn json_at(self, index: i32) -> Self {
        self.step(PathStep::JsonIndex {
            index,
            as_text: false,
        })
    }

    /// `self->>index`
    #[must_use]
    pub fn json_at_text(self, index: i32) -> Self {
        self.step(PathStep::JsonIndex {
            index,
            as_text: true,
        })
    }

    /// A registered pseudo-property.
    ///
    /// On column paths this becomes a path step; elsewhere a zero-argument
    /// method call. Both resolve through the accessor table.
    #[must_use]
    pub fn derived(self, name: &str) -> Self {
        match self {
            Self::Field(mut path) => {
                path.steps.push(PathStep::Derived(Arc::from(name)));
                Self::Field(path)
            }
            other => Self::method(name, other, Vec::new()),
        }
    }

    #[must_use]
    pub fn year(self) -> Self {
        self.derived(names::YEAR)
    }

    #[must_use]
    pub fn month(self) -> Self {
        self.derived(names::MONTH)
    }

    #[must_use]
    pub fn day(self) -> Self {
        self.derived(names::DAY)
    }

    #[must_use]
    pub fn hour(self) -> Self {
        self.derived(names::HOUR)
    }

    #[must_use]
    pub fn minute(self) -> Self {
        self.derived(names::MINUTE)
    }

    #[must_use]
    pub fn second(self) -> Self {
        self.derived(names::SECOND)
    }

    #[must_use]
    pub fn date(self) -> Self {
        self.derived(names::DATE)
    }

    /// Character count of a string, element count of an array or JSON
    /// array.
    #[must_use]
    pub fn length(self) -> Self {
        self.derived(names::LENGTH)
    }

    #[must_use]
    pub fn to_upper(self) -> Self {
        self.derived(names::TO_UPPER)
    }

    #[must_use]
    pub fn to_lower(self) -> Self {
        self.derived(names::TO_LOWER)
    }

    /// Calls a method by name; dispatched on the receiver type.
    #[must_use]
    pub fn call<I>(self, name: &str, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoExpr,
    {
        Self::method(name, self, args.into_iter().map(IntoExpr::into_expr).collect())
    }

    /// Prefix match; LIKE wildcards in `prefix` match literally.
    #[must_use]
    pub fn starts_with(self, prefix: impl IntoExpr) -> Self {
        Self::method(names::STARTS_WITH, self, vec![prefix.into_expr()])
    }

    #[must_use]
    pub fn ends_with(self, suffix: impl IntoExpr) -> Self {
        Self::method(names::ENDS_WITH, self, vec![suffix.into_expr()])
    }

    /// Substring match on strings, element membership on arrays.
    #[must_use]
    pub fn contains(self, item: impl IntoExpr) -> Self {
        Self::method(names::CONTAINS, self, vec![item.into_expr()])
    }

    #[must_use]
    pub fn starts_with_ignore_case(self, prefix: impl IntoExpr) -> Self {
        Self::method(names::STARTS_WITH_IGNORE_CASE, self, vec![prefix.into_expr()])
    }

    /// Characters from the 0-based `start` to the end.
    #[must_use]
    pub fn substring(self, start: impl IntoExpr) -> Self {
        Self::method(names::SUBSTRING, self, vec![start.into_expr()])
    }

    /// `len` characters from the 0-based `start`.
    #[must_use]
    pub fn substring_len(self, start: impl IntoExpr, len: impl IntoExpr) -> Self {
        Self::method(
            names::SUBSTRING,
            self,
            vec![start.into_expr(), len.into_expr()],
        )
    }

    /// Element at the 0-based `index` of an array, or JSON member.
    #[must_use]
    pub fn index(self, index: impl IntoExpr) -> Self {
        Self::method(names::INDEX, self, vec![index.into_expr()])
    }

    /// Membership in a host collection or a subquery.
    #[must_use]
    pub fn pg_in(self, values: impl IntoExpr) -> Self {
        Self::method(names::PG_IN, self, vec![values.into_expr()])
    }

    #[must_use]
    pub fn pg_not_in(self, values: impl IntoExpr) -> Self {
        Self::method(names::PG_NOT_IN, self, vec![values.into_expr()])
    }

    /// Array overlap.
    #[must_use]
    pub fn pg_contains_any(self, values: impl IntoExpr) -> Self {
        Self::method(names::PG_CONTAINS_ANY, self, vec![values.into_expr()])
    }
}

impl Not for Expr {
    type Output = Self;

    fn not(self) -> Self {
        Self::unary(UnaryOp::Not, self)
    }
}

macro_rules! impl_arith {
    ($($trait:ident :: $method:ident => $op:ident),+ $(,)?) => {
        $(
            impl<R: IntoExpr> $trait<R> for Expr {
                type Output = Self;

                fn $method(self, rhs: R) -> Self {
                    Self::binary(BinaryOp::$op, self, rhs.into_expr())
                }
            }
        )+
    };
}

impl_arith!(Add::add => Add, Sub::sub => Sub, Mul::mul => Mul, Div::div => Div);
