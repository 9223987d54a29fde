//! SQLite driver backed by a sqlx connection pool

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions};
use sqlx::Transaction;
use tokio::sync::Mutex;

use super::sqlite_helpers::{bind_all, column_names, decode_row};
use super::{Dialect, Driver, ExecResult, Rows, Tx};
use crate::error::{OrmError, Result};
use crate::value::Value;

/// Database wrapper providing connection pool access
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new database connection pool
    ///
    /// In-memory URLs get a single long-lived connection: every new
    /// connection would otherwise open a separate, empty database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        if url.contains(":memory:") {
            return Self::connect_single(url).await;
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Single-connection in-memory database that lives as long as the pool.
    pub async fn in_memory() -> Result<Self> {
        Self::connect_single("sqlite::memory:").await
    }

    async fn connect_single(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Driver for Database {
    async fn exec(&self, query: &str, args: &[Value]) -> Result<ExecResult> {
        tracing::debug!(sql = %query, args = args.len(), "Executing statement");
        let result = bind_all(query, args).execute(&self.pool).await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    async fn query(&self, query: &str, args: &[Value]) -> Result<Rows> {
        tracing::debug!(sql = %query, args = args.len(), "Executing query");
        let rows = bind_all(query, args).fetch_all(&self.pool).await?;
        collect_rows(&rows)
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn tx(&self) -> Result<Arc<dyn Tx>> {
        let tx = self.pool.begin().await?;
        tracing::debug!("Transaction started");
        Ok(Arc::new(SqliteTx {
            inner: Mutex::new(Some(tx)),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// One open sqlx transaction.
///
/// Only one statement runs at a time; concurrent callers queue on the lock.
pub struct SqliteTx {
    inner: Mutex<Option<Transaction<'static, Sqlite>>>,
}

impl SqliteTx {
    fn closed() -> OrmError {
        OrmError::InvalidQuery("transaction already committed or rolled back".into())
    }
}

#[async_trait]
impl Driver for SqliteTx {
    async fn exec(&self, query: &str, args: &[Value]) -> Result<ExecResult> {
        tracing::debug!(sql = %query, args = args.len(), "Executing statement in transaction");
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(Self::closed)?;
        let result = bind_all(query, args).execute(&mut **tx).await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    async fn query(&self, query: &str, args: &[Value]) -> Result<Rows> {
        tracing::debug!(sql = %query, args = args.len(), "Executing query in transaction");
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(Self::closed)?;
        let rows = bind_all(query, args).fetch_all(&mut **tx).await?;
        collect_rows(&rows)
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn tx(&self) -> Result<Arc<dyn Tx>> {
        Err(OrmError::NestedTransaction)
    }

    async fn close(&self) -> Result<()> {
        self.rollback().await
    }
}

#[async_trait]
impl Tx for SqliteTx {
    async fn commit(&self) -> Result<()> {
        let tx = self.inner.lock().await.take().ok_or_else(Self::closed)?;
        tx.commit().await?;
        tracing::debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let tx = self.inner.lock().await.take().ok_or_else(Self::closed)?;
        tx.rollback().await?;
        tracing::debug!("Transaction rolled back");
        Ok(())
    }
}

fn collect_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Rows> {
    let columns = rows.first().map(column_names).unwrap_or_default();
    let decoded = rows
        .iter()
        .map(decode_row)
        .collect::<Result<Vec<_>, sqlx::Error>>()?;
    Ok(Rows::new(columns, decoded))
}
