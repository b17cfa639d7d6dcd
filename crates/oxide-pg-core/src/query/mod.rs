//! Statement builders.
//!
//! Each builder collects expressions and compiles them into a
//! [`Statement`]: a framed SQL fragment plus the decoder for its result.
//! Construction errors are kept and returned by `build`, so builder calls
//! chain without `?`.

mod delete;
mod insert;
mod select;
mod statement;
mod update;

pub use delete::Delete;
pub use insert::{Insert, Inserted};
pub use select::{Select, Shape};
pub use statement::{OrderBy, OrderDirection, Statement};
pub use update::Update;
