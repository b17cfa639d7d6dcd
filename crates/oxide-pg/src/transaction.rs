//! Explicit transactions.

use oxide_pg_core::Statement;
use tracing::debug;

use crate::batch::{execute_one, Batch};
use crate::error::{Error, Result};
use crate::transport::{IsolationLevel, TransactionControl};

/// An open transaction.
///
/// Statements take `&mut self`, so only one can be in flight at a time.
/// Commit is explicit; dropping the transaction rolls it back.
///
/// ```ignore
/// let mut tx = db.begin(IsolationLevel::Serializable).await?;
/// tx.execute(&Update::<Account>::new().set("balance", 0).build()?).await?;
/// tx.commit().await?;
/// ```
#[derive(Debug)]
pub struct Transaction<X> {
    inner: X,
    isolation: IsolationLevel,
}

impl<X: TransactionControl> Transaction<X> {
    pub(crate) const fn new(inner: X, isolation: IsolationLevel) -> Self {
        Self { inner, isolation }
    }

    /// Returns the isolation level chosen at begin.
    #[must_use]
    pub const fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Sends a batch on the transaction's connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BatchFault`] when the round trip fails.
    pub async fn run(&mut self, batch: Batch) -> Result<()> {
        batch.run_on(&mut self.inner).await
    }

    /// Runs one statement.
    ///
    /// # Errors
    ///
    /// Returns server and decoding errors.
    pub async fn execute<T>(&mut self, statement: &Statement<T>) -> Result<T> {
        execute_one(&mut self.inner, statement).await
    }

    /// Runs a query and returns every row.
    ///
    /// # Errors
    ///
    /// Returns server and decoding errors.
    pub async fn fetch_all<T>(&mut self, statement: &Statement<Vec<T>>) -> Result<Vec<T>> {
        self.execute(statement).await
    }

    /// Runs a query and returns its first row, if any.
    ///
    /// # Errors
    ///
    /// Returns server and decoding errors.
    pub async fn fetch_optional<T>(&mut self, statement: &Statement<Vec<T>>) -> Result<Option<T>> {
        Ok(self.execute(statement).await?.into_iter().next())
    }

    /// Runs a query and returns its first row.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error::RowNotFound` when the query returns nothing.
    pub async fn fetch_one<T>(&mut self, statement: &Statement<Vec<T>>) -> Result<T> {
        self.fetch_optional(statement)
            .await?
            .ok_or(Error::Server(sqlx::Error::RowNotFound))
    }

    /// Commits.
    ///
    /// # Errors
    ///
    /// Returns the server error; the transaction is gone either way.
    pub async fn commit(self) -> Result<()> {
        debug!(isolation = %self.isolation, "Committing transaction");
        self.inner.commit().await
    }

    /// Rolls back.
    ///
    /// # Errors
    ///
    /// Returns the server error.
    pub async fn rollback(self) -> Result<()> {
        debug!(isolation = %self.isolation, "Rolling back transaction");
        self.inner.rollback().await
    }
}
