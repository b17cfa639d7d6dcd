//! Build-time error types.
//!
//! Every error in this crate is raised synchronously while a query is being
//! assembled, before anything reaches the database.

use thiserror::Error;

/// Errors raised while mapping, converting, or compiling a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A model or field has no table or column metadata.
    #[error("model mapping error: {0}")]
    ModelMapping(String),

    /// An expression node is unsupported, or its arity or types mismatch.
    #[error("compile error: {0}")]
    Compile(String),

    /// A host value has no known PostgreSQL mapping.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// An UPDATE was built without any SET clause.
    #[error("update of `{0}` has no SET clause")]
    EmptyMutation(String),
}

impl Error {
    pub(crate) fn compile(message: impl Into<String>) -> Self {
        Self::Compile(message.into())
    }

    pub(crate) fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }

    pub(crate) fn mapping(message: impl Into<String>) -> Self {
        Self::ModelMapping(message.into())
    }
}

/// Result type alias for query building.
pub type Result<T> = std::result::Result<T, Error>;
