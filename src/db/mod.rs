//! Driver abstraction
//!
//! Everything above this module talks to storage through [`Driver`]. A
//! connection pool ([`Database`]) and a live transaction ([`SqliteTx`]) both
//! satisfy it, which is what lets builders run unchanged inside a
//! transaction.

mod debug;
mod sqlite;
mod sqlite_helpers;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::value::Value;

pub use debug::DebugDriver;
pub use sqlite::{Database, SqliteTx};
pub use sqlite_helpers::{bind_value, decode_row};

/// SQL dialect spoken by a driver. Only placeholder syntax differs here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite3",
            Dialect::Postgres => "postgres",
            Dialect::MySql => "mysql",
        }
    }

    /// Placeholder for the `n`th (1-based) bound argument.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", n),
            Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rows returned by [`Driver::query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Rows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of every row, e.g. for `SELECT id ...` or `SELECT COUNT(*)`.
    pub fn first_column(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row.first().cloned().unwrap_or_default())
            .collect()
    }
}

/// Outcome of [`Driver::exec`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// The sole boundary to storage.
///
/// Cancellation follows Rust futures: dropping an in-flight `exec` or `query`
/// future abandons the underlying call.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Run a statement that returns no rows.
    async fn exec(&self, query: &str, args: &[Value]) -> Result<ExecResult>;

    /// Run a statement and collect its rows.
    async fn query(&self, query: &str, args: &[Value]) -> Result<Rows>;

    fn dialect(&self) -> Dialect;

    /// Start a transaction on this driver.
    async fn tx(&self) -> Result<Arc<dyn Tx>>;

    /// Release the driver's resources.
    async fn close(&self) -> Result<()>;

    /// For transaction-scoped drivers: the driver the transaction was started
    /// from. `None` for everything else.
    fn unscoped(&self) -> Option<Arc<dyn Driver>> {
        None
    }
}

/// A driver bound to one open transaction.
#[async_trait]
pub trait Tx: Driver {
    async fn commit(&self) -> Result<()>;
    async fn rollback(&self) -> Result<()>;
}

#[async_trait]
impl<D: Driver + ?Sized> Driver for Arc<D> {
    async fn exec(&self, query: &str, args: &[Value]) -> Result<ExecResult> {
        (**self).exec(query, args).await
    }

    async fn query(&self, query: &str, args: &[Value]) -> Result<Rows> {
        (**self).query(query, args).await
    }

    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    async fn tx(&self) -> Result<Arc<dyn Tx>> {
        (**self).tx().await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }

    fn unscoped(&self) -> Option<Arc<dyn Driver>> {
        (**self).unscoped()
    }
}
