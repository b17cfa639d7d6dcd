//! PostgreSQL backend on a sqlx connection pool.
//!
//! Single statements with parameters use the extended protocol with `$n`
//! placeholders. Everything else is rendered with every value inlined and
//! sent over the simple query protocol, which is the only one accepting
//! more than one statement per message.
//!
//! Columns are decoded by type OID. Arrays and user-defined types go
//! through [`crate::wire`]; their OIDs are looked up once per backend.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use oxide_pg_core::raw::{Placeholder, RenderedQuery};
use oxide_pg_core::types::{Interval, Typed};
use oxide_pg_core::{PgValue, RenderMode, ResultSet, ValueType};
use sqlx::pool::PoolConnection;
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{
    PgArguments, PgConnectOptions, PgConnection, PgPool, PgPoolOptions, PgQueryResult, PgRow,
    PgValueFormat, Postgres,
};
use sqlx::{Column, Connection, Either, Executor, Row, ValueRef};
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::transport::{Backend, Command, IsolationLevel, ResultCursor, TransactionControl, Transport};
use crate::wire::{self, conversion, oid, TypeCatalog, WireType};

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;
type RowStream<'e> = BoxStream<'e, std::result::Result<Either<PgQueryResult, PgRow>, sqlx::Error>>;

/// A [`Backend`] backed by a [`PgPool`].
#[derive(Debug, Clone)]
pub struct PgBackend {
    pool: PgPool,
    types: TypeCatalog,
}

impl PgBackend {
    /// Wraps an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            types: TypeCatalog::default(),
        }
    }

    /// Opens a pool.
    ///
    /// The pool connects lazily; the first statement establishes the first
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the URL is rejected by the driver.
    pub fn connect_lazy(config: &ConnectionConfig) -> Result<Self> {
        let mut options: PgConnectOptions = config
            .url
            .as_str()
            .parse()
            .map_err(|e: sqlx::Error| Error::Config(e.to_string()))?;
        if let Some(ms) = config.statement_timeout_ms {
            options = options.options([("statement_timeout", ms.to_string())]);
        }
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_lazy_with(options);
        Ok(Self::new(pool))
    }

    /// Returns the pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Backend for PgBackend {
    type Connection = PgSession;
    type Transaction = PgTransaction;

    async fn connect(&self) -> Result<PgSession> {
        Ok(PgSession {
            conn: self.pool.acquire().await?,
            types: self.types.clone(),
        })
    }

    async fn begin(&self, isolation: IsolationLevel) -> Result<PgTransaction> {
        let mut tx = self.pool.begin().await?;
        let sql = format!("SET TRANSACTION ISOLATION LEVEL {isolation}");
        sqlx::query(&sql).execute(&mut *tx).await?;
        debug!(%isolation, "Transaction started");
        Ok(PgTransaction {
            tx,
            types: self.types.clone(),
        })
    }

    /// Sends `pg_cancel_backend` from a separate connection.
    async fn cancel(&self, session: i32) -> Result<()> {
        let mut side = PgConnection::connect_with(&self.pool.connect_options()).await?;
        let cancelled: bool = sqlx::query_scalar("SELECT pg_cancel_backend($1)")
            .bind(session)
            .fetch_one(&mut side)
            .await?;
        side.close().await?;
        debug!(session, cancelled, "Cancel requested");
        Ok(())
    }
}

/// A pooled connection; returned to the pool when dropped.
#[derive(Debug)]
pub struct PgSession {
    conn: PoolConnection<Postgres>,
    types: TypeCatalog,
}

#[async_trait]
impl Transport for PgSession {
    async fn run(&mut self, command: &Command) -> Result<ResultCursor> {
        run_on(&mut self.conn, &self.types, command).await
    }

    async fn session_id(&mut self) -> Result<Option<i32>> {
        backend_pid(&mut self.conn).await
    }
}

/// An open transaction. Dropping it uncommitted rolls it back.
#[derive(Debug)]
pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
    types: TypeCatalog,
}

#[async_trait]
impl Transport for PgTransaction {
    async fn run(&mut self, command: &Command) -> Result<ResultCursor> {
        run_on(&mut self.tx, &self.types, command).await
    }

    async fn session_id(&mut self) -> Result<Option<i32>> {
        backend_pid(&mut self.tx).await
    }
}

#[async_trait]
impl TransactionControl for PgTransaction {
    async fn commit(self) -> Result<()> {
        Ok(self.tx.commit().await?)
    }

    async fn rollback(self) -> Result<()> {
        Ok(self.tx.rollback().await?)
    }
}

async fn backend_pid(conn: &mut PgConnection) -> Result<Option<i32>> {
    let pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
        .fetch_one(conn)
        .await?;
    Ok(Some(pid))
}

/// How a command goes over the wire.
#[derive(Debug)]
enum Outgoing {
    /// One statement with `$n` parameters, on the extended protocol.
    Prepared(RenderedQuery),
    /// Inlined SQL on the simple query protocol.
    Simple(String),
}

fn outgoing(command: &Command) -> Outgoing {
    if command.len() == 1 {
        let rendered = command.render(RenderMode::Bound(Placeholder::Dollar));
        if !rendered.params.is_empty() && rendered.params.iter().all(is_bindable) {
            return Outgoing::Prepared(rendered);
        }
    }
    Outgoing::Simple(command.render(RenderMode::Simple).sql)
}

/// Rows of one statement, not yet decoded.
struct Fetched {
    rows: Vec<PgRow>,
    rows_affected: u64,
}

async fn run_on(
    conn: &mut PgConnection,
    types: &TypeCatalog,
    command: &Command,
) -> Result<ResultCursor> {
    let fetched = match outgoing(command) {
        Outgoing::Prepared(rendered) => {
            debug!(
                statements = 1,
                params = rendered.params.len(),
                sql = %rendered.sql,
                "Executing SQL"
            );
            let mut query = sqlx::query(&rendered.sql);
            for param in &rendered.params {
                query = bind(query, param)?;
            }
            fetch((&mut *conn).fetch_many(query)).await?
        }
        Outgoing::Simple(sql) => {
            debug!(
                statements = command.len(),
                params = 0,
                sql = %sql,
                "Executing SQL"
            );
            fetch((&mut *conn).fetch_many(sqlx::raw_sql(&sql))).await?
        }
    };

    resolve_types(conn, types, &fetched).await?;
    let mut cursor = ResultCursor::default();
    for set in fetched {
        cursor.push(ResultSet {
            rows: set
                .rows
                .iter()
                .map(|row| decode_row(row, types))
                .collect::<Result<_>>()?,
            rows_affected: set.rows_affected,
        });
    }
    Ok(cursor)
}

async fn fetch(mut stream: RowStream<'_>) -> Result<Vec<Fetched>> {
    let mut sets = Vec::new();
    let mut rows = Vec::new();
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => sets.push(Fetched {
                rows: std::mem::take(&mut rows),
                rows_affected: done.rows_affected(),
            }),
            Either::Right(row) => rows.push(row),
        }
    }
    Ok(sets)
}

fn column_oid(column: &sqlx::postgres::PgColumn) -> Option<u32> {
    column.type_info().oid().map(|oid| oid.0)
}

/// Looks up column types the catalog has not seen yet.
async fn resolve_types(
    conn: &mut PgConnection,
    types: &TypeCatalog,
    fetched: &[Fetched],
) -> Result<()> {
    let mut unknown: Vec<i64> = fetched
        .iter()
        .filter_map(|set| set.rows.first())
        .flat_map(|row| row.columns())
        .filter_map(column_oid)
        .filter(|&type_oid| types.classify(type_oid).is_none())
        .map(i64::from)
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    unknown.sort_unstable();
    unknown.dedup();

    let found: Vec<(i64, bool, i64)> = sqlx::query_as(
        "SELECT oid::int8, typcategory = 'A' AND typelem <> 0, typelem::int8 \
         FROM pg_catalog.pg_type WHERE oid::int8 = ANY($1)",
    )
    .bind(&unknown)
    .fetch_all(&mut *conn)
    .await?;
    debug!(types = ?unknown, "Resolved column types");

    for type_oid in unknown {
        let element = found
            .iter()
            .find(|(found_oid, ..)| *found_oid == type_oid)
            .and_then(|&(_, is_array, element)| is_array.then_some(element))
            .and_then(|element| u32::try_from(element).ok());
        if let Ok(type_oid) = u32::try_from(type_oid) {
            types.record(type_oid, element);
        }
    }
    Ok(())
}

/// Multidimensional arrays have no sqlx encoding; they are inlined instead.
fn is_bindable(param: &Typed) -> bool {
    !param.ty.item().is_some_and(ValueType::is_array)
}

fn bind<'q>(query: PgQuery<'q>, param: &Typed) -> Result<PgQuery<'q>> {
    Ok(match &param.value {
        PgValue::Null => query.bind(None::<String>),
        PgValue::Bool(b) => query.bind(*b),
        PgValue::Int(n) => query.bind(*n),
        PgValue::BigInt(n) => query.bind(*n),
        PgValue::Float(n) => query.bind(*n),
        PgValue::Double(n) => query.bind(*n),
        PgValue::Decimal(n) => query.bind(*n),
        PgValue::Text(s) | PgValue::Enum(s) => query.bind(s.clone()),
        PgValue::Uuid(u) => query.bind(*u),
        PgValue::Date(d) => query.bind(*d),
        PgValue::Time(t) => query.bind(*t),
        PgValue::DateTime(t) => query.bind(*t),
        PgValue::Interval(i) => query.bind(to_pg_interval(*i)),
        PgValue::Bytes(b) => query.bind(b.clone()),
        PgValue::Json(v) => query.bind(v.clone()),
        PgValue::Array(items) => bind_array(query, &param.ty, items)?,
    })
}

fn bind_array<'q>(query: PgQuery<'q>, ty: &ValueType, items: &[PgValue]) -> Result<PgQuery<'q>> {
    let item = ty.item().unwrap_or(&ValueType::Null);
    Ok(match item {
        ValueType::Boolean => query.bind(elements(items, |v| match v {
            PgValue::Bool(b) => Some(*b),
            _ => None,
        })?),
        ValueType::Integer => query.bind(elements(items, |v| match v {
            PgValue::Int(n) => Some(*n),
            _ => None,
        })?),
        ValueType::Integer64 => query.bind(elements(items, |v| match v {
            PgValue::BigInt(n) => Some(*n),
            PgValue::Int(n) => Some(i64::from(*n)),
            _ => None,
        })?),
        ValueType::Float => query.bind(elements(items, |v| match v {
            PgValue::Float(n) => Some(*n),
            _ => None,
        })?),
        ValueType::Double => query.bind(elements(items, |v| match v {
            PgValue::Double(n) => Some(*n),
            _ => None,
        })?),
        ValueType::Decimal => query.bind(elements(items, |v| match v {
            PgValue::Decimal(n) => Some(*n),
            _ => None,
        })?),
        ValueType::Uuid => query.bind(elements(items, |v| match v {
            PgValue::Uuid(u) => Some(*u),
            _ => None,
        })?),
        ValueType::Date => query.bind(elements(items, |v| match v {
            PgValue::Date(d) => Some(*d),
            _ => None,
        })?),
        ValueType::Time => query.bind(elements(items, |v| match v {
            PgValue::Time(t) => Some(*t),
            _ => None,
        })?),
        ValueType::DateTime => query.bind(elements(items, |v| match v {
            PgValue::DateTime(t) => Some(*t),
            _ => None,
        })?),
        ValueType::Interval => query.bind(elements(items, |v| match v {
            PgValue::Interval(i) => Some(to_pg_interval(*i)),
            _ => None,
        })?),
        ValueType::Binary => query.bind(elements(items, |v| match v {
            PgValue::Bytes(b) => Some(b.clone()),
            _ => None,
        })?),
        ValueType::Json(_) => query.bind(elements(items, |v| match v {
            PgValue::Json(j) => Some(j.clone()),
            _ => None,
        })?),
        // Enum arrays travel as text[] and are cast by the placeholder.
        ValueType::String | ValueType::Enum(_) | ValueType::Null => {
            query.bind(elements(items, |v| match v {
                PgValue::Text(s) | PgValue::Enum(s) => Some(s.clone()),
                _ => None,
            })?)
        }
        ValueType::Array(_) => {
            return Err(conversion(String::from(
                "multidimensional arrays cannot be bound as parameters",
            )));
        }
    })
}

fn elements<T>(items: &[PgValue], f: impl Fn(&PgValue) -> Option<T>) -> Result<Vec<Option<T>>> {
    items
        .iter()
        .map(|value| match value {
            PgValue::Null => Ok(None),
            other => f(other).map(Some).ok_or_else(|| {
                conversion(format!(
                    "array element of kind {} does not match the array type",
                    other.variant_name()
                ))
            }),
        })
        .collect()
}

const fn to_pg_interval(i: Interval) -> PgInterval {
    PgInterval {
        months: i.months,
        days: i.days,
        microseconds: i.microseconds,
    }
}

fn decode_row(row: &PgRow, types: &TypeCatalog) -> Result<Vec<PgValue>> {
    row.columns()
        .iter()
        .map(|column| decode_column(row, column.ordinal(), column_oid(column), types))
        .collect()
}

fn decode_column(
    row: &PgRow,
    index: usize,
    type_oid: Option<u32>,
    types: &TypeCatalog,
) -> Result<PgValue> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(PgValue::Null);
    }
    let wire_type = type_oid
        .and_then(|type_oid| types.classify(type_oid))
        .unwrap_or(WireType::Label);
    let value = match wire_type {
        WireType::Array(element) => wire::array(&raw, element)?,
        WireType::Label => PgValue::Text(row.try_get_unchecked(index)?),
        WireType::Scalar(scalar) => match scalar {
            oid::BOOL => PgValue::Bool(row.try_get(index)?),
            oid::INT2 => PgValue::Int(i32::from(row.try_get::<i16, _>(index)?)),
            oid::INT4 => PgValue::Int(row.try_get(index)?),
            oid::INT8 => PgValue::BigInt(row.try_get(index)?),
            oid::FLOAT4 => PgValue::Float(row.try_get(index)?),
            oid::FLOAT8 => PgValue::Double(row.try_get(index)?),
            oid::NUMERIC => PgValue::Decimal(row.try_get(index)?),
            oid::UUID => PgValue::Uuid(row.try_get(index)?),
            oid::DATE => PgValue::Date(row.try_get(index)?),
            oid::TIME => PgValue::Time(row.try_get(index)?),
            oid::TIMESTAMP => PgValue::DateTime(row.try_get(index)?),
            oid::TIMESTAMPTZ => PgValue::DateTime(
                row.try_get::<chrono::DateTime<chrono::Utc>, _>(index)?
                    .naive_utc(),
            ),
            // sqlx reads intervals in binary only.
            oid::INTERVAL if matches!(raw.format(), PgValueFormat::Text) => PgValue::Interval(
                wire::interval_text(raw.as_str().map_err(|e| conversion(e.to_string()))?)?,
            ),
            oid::INTERVAL => {
                let i: PgInterval = row.try_get(index)?;
                PgValue::Interval(Interval::new(i.months, i.days, i.microseconds))
            }
            oid::BYTEA => PgValue::Bytes(row.try_get(index)?),
            oid::JSON | oid::JSONB => PgValue::Json(row.try_get(index)?),
            _ => PgValue::Text(row.try_get_unchecked(index)?),
        },
    };
    Ok(value)
}
