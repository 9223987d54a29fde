//! Statement logging decorator

use std::sync::Arc;

use async_trait::async_trait;

use super::{Dialect, Driver, ExecResult, Rows, Tx};
use crate::error::Result;
use crate::value::Value;

/// Wraps a driver and logs every statement with its arguments at `info`.
///
/// Used by [`Client::debug`](crate::Client::debug) for verbose logging on
/// specific operations without changing the global filter.
pub struct DebugDriver {
    inner: Arc<dyn Driver>,
}

impl DebugDriver {
    pub fn new(inner: Arc<dyn Driver>) -> Self {
        Self { inner }
    }
}

fn render_args(args: &[Value]) -> String {
    let parts: Vec<String> = args.iter().map(|v| format!("{:?}", v)).collect();
    format!("[{}]", parts.join(", "))
}

#[async_trait]
impl Driver for DebugDriver {
    async fn exec(&self, query: &str, args: &[Value]) -> Result<ExecResult> {
        tracing::info!(sql = %query, args = %render_args(args), "driver.Exec");
        self.inner.exec(query, args).await
    }

    async fn query(&self, query: &str, args: &[Value]) -> Result<Rows> {
        tracing::info!(sql = %query, args = %render_args(args), "driver.Query");
        self.inner.query(query, args).await
    }

    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn tx(&self) -> Result<Arc<dyn Tx>> {
        tracing::info!("driver.Tx");
        let inner = self.inner.tx().await?;
        Ok(Arc::new(DebugTx { inner }))
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    fn unscoped(&self) -> Option<Arc<dyn Driver>> {
        self.inner.unscoped()
    }
}

/// A transaction started through a [`DebugDriver`]; logs like its parent.
struct DebugTx {
    inner: Arc<dyn Tx>,
}

#[async_trait]
impl Driver for DebugTx {
    async fn exec(&self, query: &str, args: &[Value]) -> Result<ExecResult> {
        tracing::info!(sql = %query, args = %render_args(args), "Tx.Exec");
        self.inner.exec(query, args).await
    }

    async fn query(&self, query: &str, args: &[Value]) -> Result<Rows> {
        tracing::info!(sql = %query, args = %render_args(args), "Tx.Query");
        self.inner.query(query, args).await
    }

    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn tx(&self) -> Result<Arc<dyn Tx>> {
        let inner = self.inner.tx().await?;
        Ok(Arc::new(DebugTx { inner }))
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    fn unscoped(&self) -> Option<Arc<dyn Driver>> {
        self.inner.unscoped()
    }
}

#[async_trait]
impl Tx for DebugTx {
    async fn commit(&self) -> Result<()> {
        tracing::info!("Tx.Commit");
        self.inner.commit().await
    }

    async fn rollback(&self) -> Result<()> {
        tracing::info!("Tx.Rollback");
        self.inner.rollback().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    use parking_lot::Mutex;
    use tracing_subscriber::layer::SubscriberExt;

    use crate::db::Database;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_statements_inside_transactions_are_logged() {
        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(move || writer.clone()),
        );
        let _guard = tracing::subscriber::set_default(subscriber);

        let database = Database::in_memory().await.unwrap();
        let driver = DebugDriver::new(Arc::new(database));
        let tx = driver.tx().await.unwrap();
        tx.exec("CREATE TABLE t (x INTEGER)", &[]).await.unwrap();
        tx.query("SELECT x FROM t WHERE x = ?", &[Value::Int(7)]).await.unwrap();
        tx.commit().await.unwrap();

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        assert!(output.contains("driver.Tx"));
        assert!(output.contains("Tx.Exec"));
        assert!(output.contains("CREATE TABLE t"));
        assert!(output.contains("Tx.Query"));
        assert!(output.contains("Int(7)"));
        assert!(output.contains("Tx.Commit"));
    }
}
