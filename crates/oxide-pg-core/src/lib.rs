//! # oxide-pg-core
//!
//! A typed query compiler for PostgreSQL.
//!
//! This crate provides:
//! - A value type system mapping host values to PostgreSQL types
//! - An expression compiler producing typed, parameterized SQL fragments
//! - Statement builders for SELECT (with joins and subqueries), INSERT,
//!   UPDATE and DELETE
//! - Positional row decoding into models, scalars and composite shapes
//!
//! Nothing here talks to a database. The `oxide-pg` crate executes the
//! compiled [`Statement`]s.
//!
//! ## Building Queries
//!
//! ```ignore
//! use oxide_pg_core::expr::col;
//! use oxide_pg_core::query::Select;
//!
//! let statement = Select::<User>::new()
//!     .filter(col("id").eq(2))
//!     .build()?;
//!
//! // SELECT "id","name" FROM "app"."user" WHERE ("id") = (2)
//! println!("{}", statement.render().sql);
//! ```
//!
//! ## Parameters
//!
//! Short strings, booleans, integers and NULL are inlined as literals.
//! Every other value is bound as a typed parameter:
//!
//! ```ignore
//! let statement = Select::<User>::new()
//!     .filter(col("name").pg_in(vec!["ann", "bob"]))
//!     .build()?;
//!
//! // ... WHERE ("name") = ANY(@1::text[])
//! ```

pub mod decode;
pub mod error;
pub mod expr;
pub mod query;
pub mod raw;
pub mod schema;
pub mod types;

#[cfg(test)]
mod testing;

pub use decode::{ResultSet, Row, RowReader, ShapedRow};
pub use error::{Error, Result};
pub use expr::{col, lit, null, slot, sql_fn, Expr, IntoExpr, TypedExpression};
pub use query::{Delete, Insert, Inserted, Select, Shape, Statement, Update};
pub use raw::{Parameters, Placeholder, RawQuery, RenderMode, RenderedQuery};
pub use schema::{Model, Registry, TableDescriptor};
pub use types::{FromPgValue, Json, PgEnum, PgType, PgValue, ToPgValue, ValueType};
