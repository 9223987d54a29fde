//! Table registry
//!
//! The type table lists entity tables in a fixed order; a table's position
//! is the high part of every global id it issues. The list is loaded from
//! storage at most once per client. Concurrent first callers wait on a
//! single-permit semaphore so only one of them reaches the driver. A failed
//! load is not cached and the next caller retries.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Semaphore;

use crate::db::Driver;
use crate::error::{OrmError, Result};
use crate::orm::sql::ident;

pub struct TableRegistry {
    type_table: String,
    sem: Semaphore,
    tables: RwLock<Option<Arc<Vec<String>>>>,
}

impl TableRegistry {
    pub fn new(type_table: impl Into<String>) -> Self {
        Self {
            type_table: type_table.into(),
            sem: Semaphore::new(1),
            tables: RwLock::new(None),
        }
    }

    pub fn type_table(&self) -> &str {
        &self.type_table
    }

    /// The list, if it has been loaded.
    pub fn cached(&self) -> Option<Arc<Vec<String>>> {
        self.tables.read().clone()
    }

    /// Load the ordered table list, reading storage only the first time.
    pub async fn load<D: Driver + ?Sized>(&self, driver: &D) -> Result<Arc<Vec<String>>> {
        if let Some(tables) = self.cached() {
            return Ok(tables);
        }

        let _permit = self
            .sem
            .acquire()
            .await
            .map_err(|e| OrmError::InvalidQuery(format!("table registry unavailable: {e}")))?;

        // Another caller may have finished while we waited.
        if let Some(tables) = self.cached() {
            return Ok(tables);
        }

        let sql = format!("SELECT \"type\" FROM {} ORDER BY \"id\"", ident(&self.type_table));
        let rows = driver.query(&sql, &[]).await?;
        let tables = rows
            .first_column()
            .iter()
            .map(|v| v.get::<String>())
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(count = tables.len(), "Loaded entity tables");
        let tables = Arc::new(tables);
        *self.tables.write() = Some(tables.clone());
        Ok(tables)
    }
}

impl std::fmt::Debug for TableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableRegistry")
            .field("type_table", &self.type_table)
            .field("tables", &self.cached())
            .finish()
    }
}
