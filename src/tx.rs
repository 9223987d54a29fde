//! Transaction manager
//!
//! [`Client::tx`](crate::Client::tx) starts a transaction and hands out a
//! [`Transaction`]. Its client runs every builder on a [`ScopedDriver`]: a
//! driver bound to the open transaction whose own commit and rollback do
//! nothing, so nested mutations join the transaction instead of ending it.
//! Only the `Transaction` handle commits or rolls back.
//!
//! ```rust,ignore
//! let tx = client.tx().await?;
//! let hall = tx.client().create(&LOCATION).set("name", "hall").save().await?;
//! tx.commit().await?;
//! let hall = hall.unwrap_tx()?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::client::Client;
use crate::db::{Dialect, Driver, ExecResult, Rows, Tx};
use crate::error::{OrmError, Result};
use crate::value::Value;

/// Driver bound to one open transaction.
#[derive(Clone)]
pub struct ScopedDriver {
    tx: Arc<dyn Tx>,
    origin: Arc<dyn Driver>,
    closed: Arc<AtomicBool>,
}

impl ScopedDriver {
    pub(crate) fn new(tx: Arc<dyn Tx>, origin: Arc<dyn Driver>) -> Self {
        Self {
            tx,
            origin,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(OrmError::TransactionClosed {
                label: String::new(),
            });
        }
        Ok(())
    }

    /// Mark the transaction finished; returns false if it already was.
    fn close_scope(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

#[async_trait]
impl Driver for ScopedDriver {
    async fn exec(&self, query: &str, args: &[Value]) -> Result<ExecResult> {
        self.ensure_open()?;
        self.tx.exec(query, args).await
    }

    async fn query(&self, query: &str, args: &[Value]) -> Result<Rows> {
        self.ensure_open()?;
        self.tx.query(query, args).await
    }

    fn dialect(&self) -> Dialect {
        self.tx.dialect()
    }

    /// Joins the open transaction.
    async fn tx(&self) -> Result<Arc<dyn Tx>> {
        self.ensure_open()?;
        Ok(Arc::new(self.clone()))
    }

    /// Closing is the transaction owner's job.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn unscoped(&self) -> Option<Arc<dyn Driver>> {
        Some(self.origin.clone())
    }
}

#[async_trait]
impl Tx for ScopedDriver {
    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        Ok(())
    }
}

/// An open transaction.
///
/// Dropping it without calling [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) rolls it back.
pub struct Transaction {
    client: Client,
    scope: ScopedDriver,
}

impl Transaction {
    pub(crate) fn new(client: Client, scope: ScopedDriver) -> Self {
        Self { client, scope }
    }

    /// Client whose builders run inside this transaction.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn commit(self) -> Result<()> {
        if !self.scope.close_scope() {
            return Err(OrmError::TransactionClosed {
                label: "transaction".to_string(),
            });
        }
        tracing::debug!("Committing transaction");
        self.scope.tx.commit().await
    }

    pub async fn rollback(self) -> Result<()> {
        if !self.scope.close_scope() {
            return Err(OrmError::TransactionClosed {
                label: "transaction".to_string(),
            });
        }
        tracing::debug!("Rolling back transaction");
        self.scope.tx.rollback().await
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("closed", &self.scope.is_closed())
            .field("client", &self.client)
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.scope.close_scope() {
            return;
        }
        let tx = self.scope.tx.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = tx.rollback().await {
                        tracing::warn!(error = %e, "Rollback of dropped transaction failed");
                    }
                });
            }
            Err(_) => tracing::warn!("Transaction dropped outside a runtime; leaving rollback to the driver"),
        }
    }
}
