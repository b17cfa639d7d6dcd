//! Expressions and their compilation.
//!
//! An [`Expr`] is built with the functions in this module ([`col`],
//! [`slot`], [`lit`], [`sql_fn`]) and the methods and operators on `Expr`.
//! A [`Compiler`] turns it into a [`TypedExpression`]: a shareable SQL
//! fragment plus its [`ValueType`](crate::types::ValueType).
//!
//! Compilation folds constant subtrees on the host, resolves field paths
//! against the slots of a [`Scope`], and dispatches method calls in this
//! order:
//!
//! 1. handlers registered for the receiver kind in the [`CallRegistry`],
//! 2. the natively understood `contains` (arrays), `index`, `pg_in`,
//!    `pg_not_in` and `pg_contains_any`,
//! 3. the SQL function catalog, with the receiver as first argument.
//!
//! Anything else is a compile error.

mod calls;
mod compile;
mod dsl;
mod fold;
pub mod functions;
mod node;

pub use calls::{Accessor, CallRegistry, MethodHandler};
pub(crate) use compile::to_jsonb;
pub use compile::{
    comparable, infix, single_arg, wrap, Compiler, JsonPathItem, ResolvedPath, Scope,
};
pub use dsl::{col, lit, names, null, slot, sql_fn, SlotRef};
pub use node::{
    BinaryOp, Call, Expr, FieldPath, IntoExpr, PathStep, Subquery, TypedExpression, UnaryOp,
};
