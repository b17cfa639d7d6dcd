//! Batched execution.
//!
//! A [`Batch`] collects statements and sends them in one round trip. Each
//! pushed statement returns a [`Pending`] handle that resolves once the
//! whole round trip has completed:
//!
//! ```ignore
//! let mut batch = Batch::new();
//! let inserted = batch.push(&Insert::<User>::new().row(&user).build()?);
//! let count = batch.push(&Select::<User>::new().count()?);
//! db.run(batch).await?;
//!
//! let keys = inserted.await?.keys;
//! let total = count.await?;
//! ```
//!
//! If any statement fails on the server, the round trip fails and every
//! handle of the batch resolves to [`Error::BatchFault`].

use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;

use futures::future::BoxFuture;
use oxide_pg_core::{ResultSet, Statement};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transport::{Command, Transport};

type Resolver = Box<dyn FnOnce(std::result::Result<ResultSet, Arc<Error>>) + Send>;

/// Statements waiting to be sent together.
#[derive(Default)]
pub struct Batch {
    command: Command,
    resolvers: Vec<Resolver>,
}

impl Batch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a statement and returns the handle of its result.
    ///
    /// Results resolve in enqueue order.
    pub fn push<T: Send + 'static>(&mut self, statement: &Statement<T>) -> Pending<T> {
        let (tx, rx) = oneshot::channel();
        let statement = statement.clone();
        self.command.push(Arc::clone(statement.query()));
        self.resolvers.push(Box::new(move |outcome| {
            let result = match outcome {
                Ok(set) => statement.decode(set).map_err(Error::from),
                Err(fault) => Err(Error::BatchFault(fault)),
            };
            // The handle may have been dropped; nobody is waiting then.
            let _ = tx.send(result);
        }));
        Pending { rx }
    }

    /// Returns the number of enqueued statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    /// Returns whether nothing was enqueued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    /// Returns the command that will be sent.
    #[must_use]
    pub const fn command(&self) -> &Command {
        &self.command
    }

    /// Sends the batch over `transport` and resolves every handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BatchFault`] wrapping the transport error; the same
    /// fault is delivered to every handle.
    pub async fn run_on<T: Transport + ?Sized>(self, transport: &mut T) -> Result<()> {
        let statements = self.len();
        if statements == 0 {
            return Ok(());
        }
        debug!(statements, "Sending batch");

        let outcome = match transport.run(&self.command).await {
            Ok(cursor) => cursor.ensure_len(statements).map(|()| cursor),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(mut cursor) => {
                for resolver in self.resolvers {
                    match cursor.advance() {
                        Some(set) => resolver(Ok(set)),
                        None => resolver(Err(Arc::new(Error::MissingResult {
                            expected: statements,
                            received: statements - 1,
                        }))),
                    }
                }
                Ok(())
            }
            Err(e) => {
                warn!(statements, error = %e, "Batch failed");
                let fault = Arc::new(e);
                for resolver in self.resolvers {
                    resolver(Err(Arc::clone(&fault)));
                }
                Err(Error::BatchFault(fault))
            }
        }
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

/// Runs one statement in its own round trip.
///
/// Unlike a batch, server errors come back unwrapped.
pub(crate) async fn execute_one<X, T>(transport: &mut X, statement: &Statement<T>) -> Result<T>
where
    X: Transport + ?Sized,
{
    let command = Command::single(Arc::clone(statement.query()));
    let mut cursor = transport.run(&command).await?;
    cursor.ensure_len(1)?;
    let set = cursor.advance().ok_or(Error::MissingResult {
        expected: 1,
        received: 0,
    })?;
    Ok(statement.decode(set)?)
}

/// The deferred result of a batched statement.
///
/// Await it, or poll it with [`Pending::try_take`].
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Pending<T> {
    /// Takes the result if the batch has already run.
    ///
    /// Returns `None` while the round trip is still outstanding.
    pub fn try_take(&mut self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::Abandoned)),
        }
    }
}

impl<T: Send + 'static> IntoFuture for Pending<T> {
    type Output = Result<T>;
    type IntoFuture = BoxFuture<'static, Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.rx.await.unwrap_or(Err(Error::Abandoned)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use oxide_pg_core::{RawQuery, ResultSet};

    use crate::transport::ResultCursor;

    struct Fixed(Option<Result<ResultCursor>>);

    #[async_trait]
    impl Transport for Fixed {
        async fn run(&mut self, _command: &Command) -> Result<ResultCursor> {
            self.0.take().unwrap_or(Err(Error::Abandoned))
        }
    }

    fn affected() -> Statement<u64> {
        Statement::new(RawQuery::new().text("DELETE").shared(), |r: ResultSet| {
            Ok(r.rows_affected)
        })
    }

    #[tokio::test]
    async fn test_handles_resolve_in_order() {
        let mut batch = Batch::new();
        let mut first = batch.push(&affected());
        let second = batch.push(&affected());
        assert!(first.try_take().is_none());

        let mut transport = Fixed(Some(Ok(ResultCursor::new([
            ResultSet::affected(3),
            ResultSet::affected(5),
        ]))));
        batch.run_on(&mut transport).await.unwrap();
        assert_eq!(first.try_take().unwrap().unwrap(), 3);
        assert_eq!(second.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_short_cursor_faults_everything() {
        let mut batch = Batch::new();
        let first = batch.push(&affected());
        let second = batch.push(&affected());
        let mut transport = Fixed(Some(Ok(ResultCursor::new([ResultSet::affected(1)]))));
        assert!(matches!(
            batch.run_on(&mut transport).await,
            Err(Error::BatchFault(_))
        ));
        assert!(matches!(first.await, Err(Error::BatchFault(_))));
        assert!(matches!(second.await, Err(Error::BatchFault(_))));
    }

    #[tokio::test]
    async fn test_dropped_batch_abandons_handles() {
        let mut batch = Batch::new();
        let pending = batch.push(&affected());
        drop(batch);
        assert!(matches!(pending.await, Err(Error::Abandoned)));
    }

    #[tokio::test]
    async fn test_empty_batch_sends_nothing() {
        let mut transport = Fixed(None);
        assert!(Batch::new().run_on(&mut transport).await.is_ok());
        assert!(transport.0.is_none());
    }
}
