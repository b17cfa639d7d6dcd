//! Database handle.

use std::sync::Arc;
use std::time::Duration;

use oxide_pg_core::schema::Registry;
use oxide_pg_core::{RawQuery, ResultSet, Statement};
use tracing::{debug, info, warn};

use crate::batch::{execute_one, Batch};
use crate::bootstrap;
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::postgres::PgBackend;
use crate::transaction::Transaction;
use crate::transport::{Backend, Command, IsolationLevel, Transport};

/// Entry point for running statements.
///
/// Calls outside a transaction acquire a connection for the duration of
/// the call and release it afterwards.
///
/// # Example
///
/// ```ignore
/// let db = Database::connect(&ConnectionConfig::from_env()?)?;
/// db.bootstrap().await?;
///
/// let users = db
///     .fetch_all(&Select::<User>::new().filter(col("active").eq(true)).build()?)
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database<B> {
    backend: B,
}

impl Database<PgBackend> {
    /// Creates a lazily connecting PostgreSQL database and makes
    /// `config.schema` the default schema for models.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid settings.
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let backend = PgBackend::connect_lazy(config)?;
        Registry::global().set_default_schema(config.schema.clone());
        info!(url = %config.redacted(), schema = %config.schema, "Database configured");
        Ok(Self::new(backend))
    }
}

impl<B: Backend> Database<B> {
    /// Wraps a backend.
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Returns the backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Installs the helper functions generated SQL relies on.
    ///
    /// # Errors
    ///
    /// Returns server errors.
    pub async fn bootstrap(&self) -> Result<()> {
        info!("Installing helper functions");
        let mut connection = self.backend.connect().await?;
        let command = bootstrap::command();
        connection.run(&command).await?;
        Ok(())
    }

    /// Begins a transaction.
    ///
    /// # Errors
    ///
    /// Returns server errors.
    pub async fn begin(&self, isolation: IsolationLevel) -> Result<Transaction<B::Transaction>> {
        let inner = self.backend.begin(isolation).await?;
        Ok(Transaction::new(inner, isolation))
    }

    /// Sends a batch on a connection of its own.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BatchFault`] when the round trip fails, or the
    /// connection error.
    pub async fn run(&self, batch: Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut connection = self.backend.connect().await?;
        batch.run_on(&mut connection).await
    }

    /// Runs one statement.
    ///
    /// # Errors
    ///
    /// Returns server and decoding errors.
    pub async fn execute<T>(&self, statement: &Statement<T>) -> Result<T> {
        let mut connection = self.backend.connect().await?;
        execute_one(&mut connection, statement).await
    }

    /// Runs a query and returns every row.
    ///
    /// # Errors
    ///
    /// Returns server and decoding errors.
    pub async fn fetch_all<T>(&self, statement: &Statement<Vec<T>>) -> Result<Vec<T>> {
        self.execute(statement).await
    }

    /// Runs a query and returns its first row, if any.
    ///
    /// # Errors
    ///
    /// Returns server and decoding errors.
    pub async fn fetch_optional<T>(&self, statement: &Statement<Vec<T>>) -> Result<Option<T>> {
        Ok(self.execute(statement).await?.into_iter().next())
    }

    /// Runs a query and returns its first row.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error::RowNotFound` when the query returns nothing.
    pub async fn fetch_one<T>(&self, statement: &Statement<Vec<T>>) -> Result<T> {
        self.fetch_optional(statement)
            .await?
            .ok_or(Error::Server(sqlx::Error::RowNotFound))
    }

    /// Runs one hand-written statement, giving up after `timeout`.
    ///
    /// On timeout the in-flight command is aborted on the server through
    /// [`Backend::cancel`] before its connection is released.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] or server errors.
    pub async fn raw_query(&self, sql: &str, timeout: Duration) -> Result<ResultSet> {
        let command = Command::single(Arc::new(RawQuery::new().text(sql.to_owned())));
        let mut connection = self.backend.connect().await?;
        let session = connection.session_id().await?;
        let outcome = tokio::time::timeout(timeout, connection.run(&command)).await;
        let Ok(result) = outcome else {
            warn!(?timeout, ?session, "Raw query timed out");
            if let Some(session) = session {
                if let Err(e) = self.backend.cancel(session).await {
                    warn!(session, error = %e, "Failed to cancel timed out query");
                }
            }
            return Err(Error::Timeout(timeout));
        };
        let mut cursor = result?;
        debug!(results = cursor.remaining(), "Raw query finished");
        Ok(cursor.advance().unwrap_or_default())
    }
}
