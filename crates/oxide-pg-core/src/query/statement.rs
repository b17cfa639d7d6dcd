//! Compiled statements.

use std::fmt;
use std::sync::Arc;

use crate::decode::ResultSet;
use crate::error::Result;
use crate::raw::{RawQuery, RenderMode, RenderedQuery};

type Decoder<T> = Arc<dyn Fn(ResultSet) -> Result<T> + Send + Sync>;

/// A statement ready to execute: its SQL fragment and the decoder that
/// turns its result set into `T`.
pub struct Statement<T> {
    query: Arc<RawQuery>,
    decoder: Decoder<T>,
}

impl<T> Statement<T> {
    /// Creates a statement.
    pub fn new<F>(query: Arc<RawQuery>, decoder: F) -> Self
    where
        F: Fn(ResultSet) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            query,
            decoder: Arc::new(decoder),
        }
    }

    /// Returns the fragment.
    #[must_use]
    pub const fn query(&self) -> &Arc<RawQuery> {
        &self.query
    }

    /// Renders with `@n` placeholders.
    #[must_use]
    pub fn render(&self) -> RenderedQuery {
        self.query.render()
    }

    /// Renders in the given mode.
    #[must_use]
    pub fn render_with(&self, mode: RenderMode) -> RenderedQuery {
        self.query.render_with(mode)
    }

    /// Decodes the statement's result set.
    ///
    /// # Errors
    ///
    /// Propagates row conversion errors.
    pub fn decode(&self, result: ResultSet) -> Result<T> {
        (self.decoder)(result)
    }

    /// Maps the decoded output.
    #[must_use]
    pub fn map<U, F>(self, f: F) -> Statement<U>
    where
        T: 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let decoder = self.decoder;
        Statement {
            query: self.query,
            decoder: Arc::new(move |result| decoder(result).map(&f)),
        }
    }
}

impl<T> Clone for Statement<T> {
    fn clone(&self) -> Self {
        Self {
            query: Arc::clone(&self.query),
            decoder: Arc::clone(&self.decoder),
        }
    }
}

impl<T> fmt::Debug for Statement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.query.render().sql)
            .finish_non_exhaustive()
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// One ORDER BY item.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: crate::expr::Expr,
    pub direction: OrderDirection,
}

impl OrderBy {
    /// Ascending order.
    #[must_use]
    pub const fn asc(expr: crate::expr::Expr) -> Self {
        Self {
            expr,
            direction: OrderDirection::Asc,
        }
    }

    /// Descending order.
    #[must_use]
    pub const fn desc(expr: crate::expr::Expr) -> Self {
        Self {
            expr,
            direction: OrderDirection::Desc,
        }
    }

    /// Parses `"name"` or `"-name"` on the first table.
    #[must_use]
    pub fn parse(spec: &str) -> Self {
        spec.strip_prefix('-').map_or_else(
            || Self::asc(crate::expr::col(spec)),
            |column| Self::desc(crate::expr::col(column)),
        )
    }

    pub(crate) const fn keyword(&self) -> &'static str {
        match self.direction {
            OrderDirection::Asc => " ASC",
            OrderDirection::Desc => " DESC",
        }
    }
}

impl From<&str> for OrderBy {
    fn from(spec: &str) -> Self {
        Self::parse(spec)
    }
}

impl From<crate::expr::Expr> for OrderBy {
    fn from(expr: crate::expr::Expr) -> Self {
        Self::asc(expr)
    }
}
