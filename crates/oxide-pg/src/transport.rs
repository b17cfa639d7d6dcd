//! The execute interface.
//!
//! Statements reach the server through a [`Transport`]: something that
//! takes a [`Command`] of one or more SQL segments and returns one result
//! set per segment. A [`Backend`] hands out transports, either plain
//! connections or transactions.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use oxide_pg_core::raw::Renderer;
use oxide_pg_core::{RawQuery, RenderMode, RenderedQuery, ResultSet};

use crate::error::{Error, Result};

/// Separator between statements of one command.
pub const STATEMENT_SEPARATOR: &str = ";";

/// One or more statements sent in a single round trip.
#[derive(Clone, Default)]
pub struct Command {
    segments: Vec<Arc<RawQuery>>,
}

impl Command {
    /// Creates an empty command.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Creates a single-statement command.
    #[must_use]
    pub fn single(query: Arc<RawQuery>) -> Self {
        Self {
            segments: vec![query],
        }
    }

    /// Appends a statement.
    pub fn push(&mut self, query: Arc<RawQuery>) {
        self.segments.push(query);
    }

    /// Returns the number of statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns whether the command has no statements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Renders every segment into one text with one parameter list.
    ///
    /// Placeholders are numbered across the whole command, so the third
    /// parameter of the batch is `$3` whichever segment it belongs to.
    #[must_use]
    pub fn render(&self, mode: RenderMode) -> RenderedQuery {
        let mut renderer = Renderer::new(mode);
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                renderer.write_text(STATEMENT_SEPARATOR);
            }
            renderer.write(segment);
        }
        renderer.finish()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("statements", &self.segments.len())
            .field("sql", &self.render(RenderMode::Bound(Default::default())).sql)
            .finish()
    }
}

/// The result sets of one command, consumed in statement order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultCursor {
    results: VecDeque<ResultSet>,
}

impl ResultCursor {
    /// Creates a cursor over already received result sets.
    #[must_use]
    pub fn new(results: impl IntoIterator<Item = ResultSet>) -> Self {
        Self {
            results: results.into_iter().collect(),
        }
    }

    /// Appends a result set.
    pub fn push(&mut self, result: ResultSet) {
        self.results.push_back(result);
    }

    /// Takes the result set of the next statement.
    pub fn advance(&mut self) -> Option<ResultSet> {
        self.results.pop_front()
    }

    /// Returns the number of result sets not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.results.len()
    }

    /// Checks that the cursor holds one result set per statement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingResult`] on a count mismatch.
    pub fn ensure_len(&self, statements: usize) -> Result<()> {
        if self.results.len() == statements {
            Ok(())
        } else {
            Err(Error::MissingResult {
                expected: statements,
                received: self.results.len(),
            })
        }
    }
}

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Returns the SQL spelling.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Runs commands on one connection.
#[async_trait]
pub trait Transport: Send {
    /// Sends `command` in one round trip and returns its result sets.
    ///
    /// A server error fails the whole command.
    async fn run(&mut self, command: &Command) -> Result<ResultCursor>;

    /// Identifies the server session behind this connection, for
    /// [`Backend::cancel`]. `None` when commands cannot be cancelled.
    async fn session_id(&mut self) -> Result<Option<i32>> {
        Ok(None)
    }
}

/// A transport inside an open transaction.
///
/// Dropping a transaction that was neither committed nor rolled back must
/// roll it back.
#[async_trait]
pub trait TransactionControl: Transport + Sized {
    /// Commits the transaction.
    async fn commit(self) -> Result<()>;

    /// Rolls the transaction back.
    async fn rollback(self) -> Result<()>;
}

/// Hands out connections and transactions.
#[async_trait]
pub trait Backend: Send + Sync {
    /// A plain connection.
    type Connection: Transport;
    /// An open transaction.
    type Transaction: TransactionControl;

    /// Acquires a connection.
    async fn connect(&self) -> Result<Self::Connection>;

    /// Acquires a connection and begins a transaction on it.
    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Transaction>;

    /// Aborts whatever command `session` is running, out of band.
    async fn cancel(&self, _session: i32) -> Result<()> {
        Ok(())
    }
}
