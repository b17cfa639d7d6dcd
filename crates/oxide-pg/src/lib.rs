//! # oxide-pg
//!
//! Executes statements compiled by `oxide-pg-core` against PostgreSQL.
//!
//! This crate provides:
//! - A [`Database`] handle with single-statement conveniences
//! - [`Batch`]es that send many statements in one round trip
//! - Explicit [`Transaction`]s with a chosen isolation level
//! - The [`Transport`]/[`Backend`] execute interface, implemented on
//!   `sqlx::PgPool` by [`PgBackend`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use oxide_pg::{Batch, ConnectionConfig, Database};
//! use oxide_pg::core::{col, Insert, Select};
//!
//! let db = Database::connect(&ConnectionConfig::from_env()?)?;
//! db.bootstrap().await?;
//!
//! let mut batch = Batch::new();
//! let created = batch.push(&Insert::<Post>::new().row(&post).build()?);
//! let recent = batch.push(&Select::<Post>::new().order_by("-id").limit(10).build()?);
//! db.run(batch).await?;
//!
//! println!("{:?} {}", created.await?.keys, recent.await?.len());
//! ```

pub mod batch;
pub mod bootstrap;
pub mod config;
pub mod database;
pub mod error;
pub mod postgres;
pub mod transaction;
pub mod transport;
mod wire;

pub use oxide_pg_core as core;

pub use batch::{Batch, Pending};
pub use config::ConnectionConfig;
pub use database::Database;
pub use error::{Error, Result};
pub use postgres::{PgBackend, PgSession, PgTransaction};
pub use transaction::Transaction;
pub use transport::{
    Backend, Command, IsolationLevel, ResultCursor, TransactionControl, Transport,
};
