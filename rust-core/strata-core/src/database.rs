//! # Database Module
//!
//! Async database access with SQLx for PostgreSQL and SQLite.
//!
//! Every query runs under an [`ExecutionContext`]: when the request is
//! cancelled or its deadline passes, the query future is dropped and the
//! call fails with [`Error::Execution`].
//!
//! ```ignore
//! let users: Vec<User> = query_many(ctx.db()?, &ctx.execution,
//!     "SELECT id, email FROM users WHERE company = ?", &[company.into()]).await?;
//!
//! let execution = ctx.execution.clone();
//! with_tx(ctx.db()?, &ctx.execution, |tx| Box::pin(async move {
//!     exec(tx, &execution, "INSERT INTO audit (event) VALUES (?)", &["login".into()]).await
//! })).await?;
//! ```
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Only handles database operations
//! - **O**: `DatabasePool` enum extensible for new backends
//! - **I**: Helpers depend on the small [`Querier`] trait
//! - **D**: Abstraction over specific database drivers

use crate::error::{Error, Result};
use crate::execution::ExecutionContext;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::error::ErrorKind;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo};
use std::collections::HashMap;
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Default maximum number of open connections
pub const DEFAULT_MAX_OPEN_CONNS: u32 = 25;
/// Default maximum number of idle connections
pub const DEFAULT_MAX_IDLE_CONNS: u32 = 25;
/// Default maximum connection lifetime
pub const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(5 * 60);
/// Default maximum connection idle time
pub const DEFAULT_MAX_IDLE_TIME: Duration = Duration::from_secs(5 * 60);

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection pool limits
///
/// Zero values mean "use the default".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of open connections
    pub max_open_conns: u32,
    /// Maximum number of idle connections; must not exceed `max_open_conns`
    pub max_idle_conns: u32,
    /// Maximum lifetime of a connection
    pub max_lifetime: Duration,
    /// Maximum time a connection may sit idle
    pub max_idle_time: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open_conns: DEFAULT_MAX_OPEN_CONNS,
            max_idle_conns: DEFAULT_MAX_IDLE_CONNS,
            max_lifetime: DEFAULT_MAX_LIFETIME,
            max_idle_time: DEFAULT_MAX_IDLE_TIME,
        }
    }
}

impl PoolConfig {
    /// Set the open connection limit
    #[must_use]
    pub const fn with_max_open_conns(mut self, n: u32) -> Self {
        self.max_open_conns = n;
        self
    }

    /// Set the idle connection limit
    #[must_use]
    pub const fn with_max_idle_conns(mut self, n: u32) -> Self {
        self.max_idle_conns = n;
        self
    }

    /// Set the connection lifetime
    #[must_use]
    pub const fn with_max_lifetime(mut self, d: Duration) -> Self {
        self.max_lifetime = d;
        self
    }

    /// Set the idle timeout
    #[must_use]
    pub const fn with_max_idle_time(mut self, d: Duration) -> Self {
        self.max_idle_time = d;
        self
    }

    /// Replace zero values by defaults
    ///
    /// An unset idle limit follows the open limit when that is below the default.
    #[must_use]
    pub fn normalized(self) -> Self {
        let max_open_conns = if self.max_open_conns == 0 {
            DEFAULT_MAX_OPEN_CONNS
        } else {
            self.max_open_conns
        };
        Self {
            max_open_conns,
            max_idle_conns: if self.max_idle_conns == 0 {
                DEFAULT_MAX_IDLE_CONNS.min(max_open_conns)
            } else {
                self.max_idle_conns
            },
            max_lifetime: if self.max_lifetime.is_zero() {
                DEFAULT_MAX_LIFETIME
            } else {
                self.max_lifetime
            },
            max_idle_time: if self.max_idle_time.is_zero() {
                DEFAULT_MAX_IDLE_TIME
            } else {
                self.max_idle_time
            },
        }
    }

    /// Check the limits
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the open limit is zero or the idle limit
    /// exceeds it.
    pub fn validate(&self) -> Result<()> {
        if self.max_open_conns == 0 {
            return Err(Error::config("max_open_conns must be greater than 0"));
        }
        if self.max_idle_conns > self.max_open_conns {
            return Err(Error::config(format!(
                "max_idle_conns ({}) cannot exceed max_open_conns ({})",
                self.max_idle_conns, self.max_open_conns
            )));
        }
        Ok(())
    }
}

/// Where and how to connect
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `sqlite:...`, `postgres://...` or `postgresql://...`
    pub url: String,
    /// Pool limits
    pub pool: PoolConfig,
}

impl DatabaseConfig {
    /// Configuration for `url` with default pool limits
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool: PoolConfig::default(),
        }
    }

    /// Set the pool limits
    #[must_use]
    pub const fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = self.url.split(':').next().unwrap_or_default();
        f.debug_struct("DatabaseConfig")
            .field("scheme", &scheme)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// Database connection pool supporting multiple backends
#[derive(Debug, Clone)]
pub enum DatabasePool {
    /// SQLite connection pool
    Sqlite(SqlitePool),
    /// PostgreSQL connection pool
    Postgres(PgPool),
}

impl DatabasePool {
    /// Validate `config` and connect, choosing the backend from the URL scheme
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for invalid pool limits or an unknown scheme,
    /// both detected before any connection attempt, and `Error::Sqlx` when
    /// connecting fails.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let limits = config.pool.normalized();
        limits.validate()?;

        let scheme = config.url.split(':').next().unwrap_or_default();
        let pool = match scheme {
            "sqlite" => Self::Sqlite(
                SqlitePoolOptions::new()
                    .max_connections(limits.max_open_conns)
                    .max_lifetime(limits.max_lifetime)
                    .idle_timeout(limits.max_idle_time)
                    .connect(&config.url)
                    .await?,
            ),
            "postgres" | "postgresql" => Self::Postgres(
                PgPoolOptions::new()
                    .max_connections(limits.max_open_conns)
                    .max_lifetime(limits.max_lifetime)
                    .idle_timeout(limits.max_idle_time)
                    .connect(&config.url)
                    .await?,
            ),
            other => {
                return Err(Error::config(format!("unsupported database URL scheme: '{other}'")));
            }
        };

        info!(
            backend = pool.backend(),
            max_open_conns = limits.max_open_conns,
            max_idle_conns = limits.max_idle_conns,
            "Database pool connected"
        );
        Ok(pool)
    }

    /// Backend name
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Postgres(_) => "postgres",
        }
    }

    /// Ping the database, giving up after five seconds
    ///
    /// # Errors
    ///
    /// Returns `Error::Execution` on timeout and `Error::Sqlx` when the ping fails.
    pub async fn health_check(&self) -> Result<()> {
        let ctx = ExecutionContext::background().with_timeout(HEALTH_CHECK_TIMEOUT);
        self.execute(&ctx, "SELECT 1", &[]).await.map(|_| ())
    }

    /// Start a transaction
    ///
    /// # Errors
    ///
    /// Returns `Error::Execution` when `ctx` is interrupted and `Error::Sqlx`
    /// when the driver fails.
    pub async fn begin(&self, ctx: &ExecutionContext) -> Result<Transaction> {
        let inner = match self {
            Self::Sqlite(pool) => TxInner::Sqlite(ctx.run(pool.begin()).await??),
            Self::Postgres(pool) => TxInner::Postgres(ctx.run(pool.begin()).await??),
        };
        Ok(Transaction {
            inner: Mutex::new(inner),
        })
    }

    /// Close the pool
    pub async fn close(&self) {
        match self {
            Self::Sqlite(pool) => pool.close().await,
            Self::Postgres(pool) => pool.close().await,
        }
    }
}

/// Column type of a [`DbValue::TypedNull`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullKind {
    /// Integer column
    Int,
    /// Floating point column
    Float,
    /// Text, timestamp or any column the SQL casts from text
    Text,
    /// Boolean column
    Bool,
    /// Binary column
    Bytes,
    /// UUID column
    Uuid,
}

/// A bound argument or a result cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DbValue {
    /// Null value
    ///
    /// Bound as a text NULL on PostgreSQL; cast it in SQL (`$1::uuid`) or
    /// use [`DbValue::TypedNull`] for other column types.
    Null,
    /// Null of a known column type
    #[serde(serialize_with = "serialize_typed_null")]
    TypedNull(NullKind),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// String value
    String(String),
    /// Boolean value
    Bool(bool),
    /// Binary data
    Bytes(Vec<u8>),
    /// UUID, native on PostgreSQL and text on SQLite
    Uuid(Uuid),
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Uuid> for DbValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_typed_null<S: serde::Serializer>(
    _kind: &NullKind,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_none()
}

/// One result row keyed by column name
pub type Row = HashMap<String, DbValue>;

fn bind_sqlite<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    args: &'q [DbValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for arg in args {
        query = match arg {
            DbValue::Null => query.bind(None::<String>),
            DbValue::TypedNull(kind) => match kind {
                NullKind::Int => query.bind(None::<i64>),
                NullKind::Float => query.bind(None::<f64>),
                NullKind::Bool => query.bind(None::<bool>),
                NullKind::Bytes => query.bind(None::<Vec<u8>>),
                NullKind::Text | NullKind::Uuid => query.bind(None::<String>),
            },
            DbValue::Int(v) => query.bind(*v),
            DbValue::Float(v) => query.bind(*v),
            DbValue::String(v) => query.bind(v.as_str()),
            DbValue::Bool(v) => query.bind(*v),
            DbValue::Bytes(v) => query.bind(v.as_slice()),
            DbValue::Uuid(v) => query.bind(v.to_string()),
        };
    }
    query
}

fn bind_postgres<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    args: &'q [DbValue],
) -> Query<'q, Postgres, PgArguments> {
    for arg in args {
        query = match arg {
            DbValue::Null => query.bind(None::<String>),
            DbValue::TypedNull(kind) => match kind {
                NullKind::Int => query.bind(None::<i64>),
                NullKind::Float => query.bind(None::<f64>),
                NullKind::Text => query.bind(None::<String>),
                NullKind::Bool => query.bind(None::<bool>),
                NullKind::Bytes => query.bind(None::<Vec<u8>>),
                NullKind::Uuid => query.bind(None::<Uuid>),
            },
            DbValue::Int(v) => query.bind(*v),
            DbValue::Float(v) => query.bind(*v),
            DbValue::String(v) => query.bind(v.as_str()),
            DbValue::Bool(v) => query.bind(*v),
            DbValue::Bytes(v) => query.bind(v.as_slice()),
            DbValue::Uuid(v) => query.bind(*v),
        };
    }
    query
}

fn sqlite_row_to_map(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = match column.type_info().name() {
                "INTEGER" | "INT8" => row.try_get::<i64, _>(i).map(DbValue::Int),
                "REAL" => row.try_get::<f64, _>(i).map(DbValue::Float),
                "BOOLEAN" => row.try_get::<bool, _>(i).map(DbValue::Bool),
                "BLOB" => row.try_get::<Vec<u8>, _>(i).map(DbValue::Bytes),
                _ => row.try_get::<String, _>(i).map(DbValue::String),
            };
            (column.name().to_string(), value.unwrap_or(DbValue::Null))
        })
        .collect()
}

fn pg_row_to_map(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = match column.type_info().name() {
                "INT2" => row.try_get::<i16, _>(i).map(|v| DbValue::Int(v.into())),
                "INT4" => row.try_get::<i32, _>(i).map(|v| DbValue::Int(v.into())),
                "INT8" => row.try_get::<i64, _>(i).map(DbValue::Int),
                "FLOAT4" => row.try_get::<f32, _>(i).map(|v| DbValue::Float(v.into())),
                "FLOAT8" => row.try_get::<f64, _>(i).map(DbValue::Float),
                "BOOL" => row.try_get::<bool, _>(i).map(DbValue::Bool),
                "BYTEA" => row.try_get::<Vec<u8>, _>(i).map(DbValue::Bytes),
                "UUID" => row.try_get::<Uuid, _>(i).map(DbValue::Uuid),
                _ => row.try_get::<String, _>(i).map(DbValue::String),
            };
            (column.name().to_string(), value.unwrap_or(DbValue::Null))
        })
        .collect()
}

/// Something queries can run against: a pool or a transaction
#[async_trait]
pub trait Querier: Send + Sync {
    /// Run a statement, returning the number of affected rows
    async fn execute(&self, ctx: &ExecutionContext, sql: &str, args: &[DbValue]) -> Result<u64>;

    /// Fetch every row
    async fn fetch_all(&self, ctx: &ExecutionContext, sql: &str, args: &[DbValue]) -> Result<Vec<Row>>;

    /// Fetch the first row, if any
    async fn fetch_optional(
        &self,
        ctx: &ExecutionContext,
        sql: &str,
        args: &[DbValue],
    ) -> Result<Option<Row>>;
}

#[async_trait]
impl Querier for DatabasePool {
    async fn execute(&self, ctx: &ExecutionContext, sql: &str, args: &[DbValue]) -> Result<u64> {
        let affected = match self {
            Self::Sqlite(pool) => {
                let query = bind_sqlite(sqlx::query(sql), args);
                ctx.run(query.execute(pool)).await??.rows_affected()
            }
            Self::Postgres(pool) => {
                let query = bind_postgres(sqlx::query(sql), args);
                ctx.run(query.execute(pool)).await??.rows_affected()
            }
        };
        Ok(affected)
    }

    async fn fetch_all(&self, ctx: &ExecutionContext, sql: &str, args: &[DbValue]) -> Result<Vec<Row>> {
        let rows = match self {
            Self::Sqlite(pool) => {
                let query = bind_sqlite(sqlx::query(sql), args);
                let rows = ctx.run(query.fetch_all(pool)).await??;
                rows.iter().map(sqlite_row_to_map).collect()
            }
            Self::Postgres(pool) => {
                let query = bind_postgres(sqlx::query(sql), args);
                let rows = ctx.run(query.fetch_all(pool)).await??;
                rows.iter().map(pg_row_to_map).collect()
            }
        };
        Ok(rows)
    }

    async fn fetch_optional(
        &self,
        ctx: &ExecutionContext,
        sql: &str,
        args: &[DbValue],
    ) -> Result<Option<Row>> {
        let row = match self {
            Self::Sqlite(pool) => {
                let query = bind_sqlite(sqlx::query(sql), args);
                ctx.run(query.fetch_optional(pool)).await??.as_ref().map(sqlite_row_to_map)
            }
            Self::Postgres(pool) => {
                let query = bind_postgres(sqlx::query(sql), args);
                ctx.run(query.fetch_optional(pool)).await??.as_ref().map(pg_row_to_map)
            }
        };
        Ok(row)
    }
}

enum TxInner {
    Sqlite(sqlx::Transaction<'static, Sqlite>),
    Postgres(sqlx::Transaction<'static, Postgres>),
}

impl TxInner {
    async fn commit(self) -> sqlx::Result<()> {
        match self {
            Self::Sqlite(tx) => tx.commit().await,
            Self::Postgres(tx) => tx.commit().await,
        }
    }

    async fn rollback(self) -> sqlx::Result<()> {
        match self {
            Self::Sqlite(tx) => tx.rollback().await,
            Self::Postgres(tx) => tx.rollback().await,
        }
    }
}

/// An open transaction
///
/// Dropped without `commit` it is rolled back by the driver.
pub struct Transaction {
    inner: Mutex<TxInner>,
}

impl Transaction {
    /// Commit
    ///
    /// # Errors
    ///
    /// Returns `Error::Sqlx` when the commit fails.
    pub async fn commit(self) -> Result<()> {
        Ok(self.inner.into_inner().commit().await?)
    }

    /// Roll back
    ///
    /// # Errors
    ///
    /// Returns `Error::Sqlx` when the rollback fails.
    pub async fn rollback(self) -> Result<()> {
        Ok(self.inner.into_inner().rollback().await?)
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl Querier for Transaction {
    async fn execute(&self, ctx: &ExecutionContext, sql: &str, args: &[DbValue]) -> Result<u64> {
        let mut guard = self.inner.lock().await;
        let affected = match &mut *guard {
            TxInner::Sqlite(tx) => {
                let query = bind_sqlite(sqlx::query(sql), args);
                ctx.run(query.execute(&mut **tx)).await??.rows_affected()
            }
            TxInner::Postgres(tx) => {
                let query = bind_postgres(sqlx::query(sql), args);
                ctx.run(query.execute(&mut **tx)).await??.rows_affected()
            }
        };
        Ok(affected)
    }

    async fn fetch_all(&self, ctx: &ExecutionContext, sql: &str, args: &[DbValue]) -> Result<Vec<Row>> {
        let mut guard = self.inner.lock().await;
        let rows = match &mut *guard {
            TxInner::Sqlite(tx) => {
                let query = bind_sqlite(sqlx::query(sql), args);
                let rows = ctx.run(query.fetch_all(&mut **tx)).await??;
                rows.iter().map(sqlite_row_to_map).collect()
            }
            TxInner::Postgres(tx) => {
                let query = bind_postgres(sqlx::query(sql), args);
                let rows = ctx.run(query.fetch_all(&mut **tx)).await??;
                rows.iter().map(pg_row_to_map).collect()
            }
        };
        Ok(rows)
    }

    async fn fetch_optional(
        &self,
        ctx: &ExecutionContext,
        sql: &str,
        args: &[DbValue],
    ) -> Result<Option<Row>> {
        let mut guard = self.inner.lock().await;
        let row = match &mut *guard {
            TxInner::Sqlite(tx) => {
                let query = bind_sqlite(sqlx::query(sql), args);
                ctx.run(query.fetch_optional(&mut **tx)).await??.as_ref().map(sqlite_row_to_map)
            }
            TxInner::Postgres(tx) => {
                let query = bind_postgres(sqlx::query(sql), args);
                ctx.run(query.fetch_optional(&mut **tx)).await??.as_ref().map(pg_row_to_map)
            }
        };
        Ok(row)
    }
}

fn decode_row<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(serde_json::to_value(row)?)?)
}

/// Fetch every row as `T`
///
/// Rows are decoded by column name, as with `#[derive(Deserialize)]`.
///
/// # Errors
///
/// Returns the querier's error, or `Error::Json` when a row does not fit `T`.
pub async fn query_many<T, Q>(
    querier: &Q,
    ctx: &ExecutionContext,
    sql: &str,
    args: &[DbValue],
) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    Q: Querier + ?Sized,
{
    debug!(sql, args = args.len(), "query_many");
    let rows = querier.fetch_all(ctx, sql, args).await.map_err(|e| {
        error!(sql, error = %e, "Query failed");
        e
    })?;
    rows.into_iter().map(decode_row).collect()
}

/// Fetch exactly one row as `T`
///
/// # Errors
///
/// Returns `Error::RowNotFound` when the query yields no row.
pub async fn query_one<T, Q>(querier: &Q, ctx: &ExecutionContext, sql: &str, args: &[DbValue]) -> Result<T>
where
    T: DeserializeOwned,
    Q: Querier + ?Sized,
{
    debug!(sql, args = args.len(), "query_one");
    let row = querier.fetch_optional(ctx, sql, args).await.map_err(|e| {
        error!(sql, error = %e, "Query failed");
        e
    })?;
    row.map_or(Err(Error::RowNotFound), decode_row)
}

/// Run a statement, returning the number of affected rows
///
/// # Errors
///
/// Returns the querier's error.
pub async fn exec<Q>(querier: &Q, ctx: &ExecutionContext, sql: &str, args: &[DbValue]) -> Result<u64>
where
    Q: Querier + ?Sized,
{
    debug!(sql, args = args.len(), "exec");
    querier.execute(ctx, sql, args).await
}

/// Run `f` inside a transaction
///
/// Commits when `f` succeeds and rolls back when it fails. If `f` panics
/// the transaction is rolled back and the panic resumed.
///
/// # Errors
///
/// Returns the error of `f`, or of begin / commit. When the rollback after a
/// failure also fails, `Error::Rollback` carries both.
pub async fn with_tx<T, E, F>(pool: &DatabasePool, ctx: &ExecutionContext, f: F) -> std::result::Result<T, E>
where
    F: for<'t> FnOnce(&'t Transaction) -> BoxFuture<'t, std::result::Result<T, E>>,
    E: From<Error> + Display,
{
    let tx = pool.begin(ctx).await?;
    let outcome = AssertUnwindSafe(f(&tx)).catch_unwind().await;

    match outcome {
        Err(panic) => {
            if let Err(e) = tx.inner.into_inner().rollback().await {
                error!(error = %e, "Rollback after panic failed");
            }
            std::panic::resume_unwind(panic)
        }
        Ok(Err(err)) => match tx.inner.into_inner().rollback().await {
            Ok(()) => Err(err),
            Err(source) => Err(Error::Rollback {
                original: err.to_string(),
                source,
            }
            .into()),
        },
        Ok(Ok(value)) => {
            tx.commit().await?;
            Ok(value)
        }
    }
}

fn violates(err: &sqlx::Error, constraint: &str, kind: &ErrorKind, code: &str) -> bool {
    let sqlx::Error::Database(db) = err else {
        return false;
    };
    let kind_matches = std::mem::discriminant(&db.kind()) == std::mem::discriminant(kind)
        || db.code().as_deref() == Some(code);
    kind_matches
        && (constraint.is_empty()
            || db.constraint().is_some_and(|c| c.contains(constraint))
            || db.message().contains(constraint))
}

/// Whether `err` is a unique constraint violation, optionally of `constraint`
///
/// An empty `constraint` matches any unique violation.
#[must_use]
pub fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    violates(err, constraint, &ErrorKind::UniqueViolation, "23505")
}

/// Whether `err` is a foreign key violation, optionally of `constraint`
#[must_use]
pub fn is_foreign_key_violation(err: &sqlx::Error, constraint: &str) -> bool {
    violates(err, constraint, &ErrorKind::ForeignKeyViolation, "23503")
}

impl Error {
    /// See [`is_unique_violation`]
    #[must_use]
    pub fn is_unique_violation(&self, constraint: &str) -> bool {
        matches!(self, Self::Sqlx(e) if is_unique_violation(e, constraint))
    }

    /// See [`is_foreign_key_violation`]
    #[must_use]
    pub fn is_foreign_key_violation(&self, constraint: &str) -> bool {
        matches!(self, Self::Sqlx(e) if is_foreign_key_violation(e, constraint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_error::ApiError;
    use crate::error::ExecutionError;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: i64,
        email: String,
    }

    async fn memory_pool() -> DatabasePool {
        let config = DatabaseConfig::new("sqlite::memory:").with_pool(
            PoolConfig::default()
                .with_max_open_conns(1)
                .with_max_idle_conns(1),
        );
        let pool = DatabasePool::connect(&config).await.unwrap();
        let ctx = ExecutionContext::background();
        exec(
            &pool,
            &ctx,
            "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL UNIQUE)",
            &[],
        )
        .await
        .unwrap();
        pool
    }

    async fn count(pool: &DatabasePool) -> i64 {
        #[derive(Deserialize)]
        struct Count {
            n: i64,
        }
        let ctx = ExecutionContext::background();
        query_one::<Count, _>(pool, &ctx, "SELECT COUNT(*) AS n FROM users", &[])
            .await
            .unwrap()
            .n
    }

    #[test]
    fn test_pool_defaults_and_normalization() {
        let config = PoolConfig::default();
        assert_eq!(config.max_open_conns, 25);
        assert_eq!(config.max_idle_conns, 25);
        assert_eq!(config.max_lifetime, Duration::from_secs(300));

        let zeroed = PoolConfig {
            max_open_conns: 0,
            max_idle_conns: 0,
            max_lifetime: Duration::ZERO,
            max_idle_time: Duration::ZERO,
        };
        assert_eq!(zeroed.normalized(), PoolConfig::default());

        let small = PoolConfig::default().with_max_open_conns(4).with_max_idle_conns(0);
        assert_eq!(small.normalized().max_idle_conns, 4);
    }

    #[tokio::test]
    async fn test_idle_above_open_rejected_before_connecting() {
        let config = DatabaseConfig::new("postgres://unreachable.invalid/db").with_pool(
            PoolConfig::default()
                .with_max_open_conns(5)
                .with_max_idle_conns(10),
        );
        let err = DatabasePool::connect(&config).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: max_idle_conns (10) cannot exceed max_open_conns (5)"
        );
    }

    #[tokio::test]
    async fn test_unknown_scheme_rejected() {
        let err = DatabasePool::connect(&DatabaseConfig::new("mysql://localhost/db"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_null_arguments_round_trip() {
        let pool = memory_pool().await;
        let ctx = ExecutionContext::background();
        exec(
            &pool,
            &ctx,
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, owner TEXT, score INTEGER)",
            &[],
        )
        .await
        .unwrap();
        exec(
            &pool,
            &ctx,
            "INSERT INTO notes (id, owner, score) VALUES (?, ?, ?)",
            &[DbValue::Int(1), DbValue::TypedNull(NullKind::Uuid), DbValue::Null],
        )
        .await
        .unwrap();

        let rows = pool
            .fetch_all(&ctx, "SELECT owner, score FROM notes WHERE id = 1", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["owner"], DbValue::Null);
        assert_eq!(rows[0]["score"], DbValue::Null);
    }

    #[test]
    fn test_typed_null_serializes_as_null() {
        let value = serde_json::to_value(DbValue::TypedNull(NullKind::Text)).unwrap();
        assert_eq!(value, serde_json::Value::Null);
        assert_eq!(DbValue::from(None::<i64>), DbValue::Null);
    }

    #[tokio::test]
    async fn test_typed_queries() {
        let pool = memory_pool().await;
        let ctx = ExecutionContext::background();
        let inserted = exec(
            &pool,
            &ctx,
            "INSERT INTO users (id, email) VALUES (?, ?), (?, ?)",
            &[1_i64.into(), "a@example.com".into(), 2_i64.into(), "b@example.com".into()],
        )
        .await
        .unwrap();
        assert_eq!(inserted, 2);

        let users: Vec<User> = query_many(&pool, &ctx, "SELECT id, email FROM users ORDER BY id", &[])
            .await
            .unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].email, "b@example.com");

        let user: User = query_one(&pool, &ctx, "SELECT id, email FROM users WHERE id = ?", &[1_i64.into()])
            .await
            .unwrap();
        assert_eq!(user, User { id: 1, email: "a@example.com".to_string() });

        let missing = query_one::<User, _>(&pool, &ctx, "SELECT id, email FROM users WHERE id = ?", &[9_i64.into()])
            .await
            .unwrap_err();
        assert!(matches!(missing, Error::RowNotFound));
        assert!(pool.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_query() {
        let pool = memory_pool().await;
        let ctx = ExecutionContext::background();
        ctx.cancel();
        let err = exec(&pool, &ctx, "DELETE FROM users", &[]).await.unwrap_err();
        assert_eq!(err.execution(), Some(ExecutionError::Cancelled));
    }

    #[tokio::test]
    async fn test_tx_commit_and_rollback() {
        let pool = memory_pool().await;
        let ctx = ExecutionContext::background();

        let committed: Result<u64> = with_tx(&pool, &ctx, |tx| {
            let ctx = ctx.clone();
            Box::pin(async move {
                exec(tx, &ctx, "INSERT INTO users (id, email) VALUES (1, 'a@example.com')", &[]).await
            })
        })
        .await;
        assert_eq!(committed.unwrap(), 1);

        let failed: Result<u64> = with_tx(&pool, &ctx, |tx| {
            let ctx = ctx.clone();
            Box::pin(async move {
                exec(tx, &ctx, "INSERT INTO users (id, email) VALUES (2, 'b@example.com')", &[]).await?;
                Err(Error::config("abort"))
            })
        })
        .await;
        assert!(failed.is_err());
        assert_eq!(count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_tx_panic_rolls_back_and_propagates() {
        let pool = memory_pool().await;
        let ctx = ExecutionContext::background();

        let run = with_tx::<u64, Error, _>(&pool, &ctx, |tx| {
            let ctx = ctx.clone();
            Box::pin(async move {
                let inserted =
                    exec(tx, &ctx, "INSERT INTO users (id, email) VALUES (1, 'a@example.com')", &[]).await?;
                if inserted > 0 {
                    panic!("boom after insert");
                }
                Ok(inserted)
            })
        });
        let caught = AssertUnwindSafe(run).catch_unwind().await;
        assert!(caught.is_err());
        assert_eq!(count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_unique_violation_maps_to_conflict() {
        let pool = memory_pool().await;
        let ctx = ExecutionContext::background();
        let insert = "INSERT INTO users (id, email) VALUES (?, 'dup@example.com')";
        exec(&pool, &ctx, insert, &[1_i64.into()]).await.unwrap();
        let err = exec(&pool, &ctx, insert, &[2_i64.into()]).await.unwrap_err();

        assert!(err.is_unique_violation(""));
        assert!(err.is_unique_violation("users.email"));
        assert!(!err.is_foreign_key_violation(""));
        assert_eq!(ApiError::from_database(&err).code, 409);
    }
}
