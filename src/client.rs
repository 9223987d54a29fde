//! Client
//!
//! Entry point for queries, mutations, transactions and node resolution.
//! A client is cheap to clone: it shares its driver, schema and table
//! registry.

use std::sync::Arc;

use crate::config::ClientConfig;
use crate::db::{Database, DebugDriver, Driver};
use crate::error::{OrmError, Result};
use crate::orm::{
    Create, Delete, DeleteOne, EntityType, Hook, Query, Schema, SchemaSyncResult, Update,
    UpdateOne,
};
use crate::tables::TableRegistry;
use crate::tx::{ScopedDriver, Transaction};
use crate::value::Value;

/// Driver plus hooks, carried by every builder and record.
#[derive(Clone)]
pub(crate) struct Config {
    pub(crate) driver: Arc<dyn Driver>,
    pub(crate) hooks: Arc<Vec<Arc<dyn Hook>>>,
}

impl Config {
    pub(crate) fn with_driver(&self, driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            hooks: self.hooks.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Client {
    config: Config,
    schema: Arc<Schema>,
    tables: Arc<TableRegistry>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("dialect", &self.config.driver.dialect())
            .field("transactional", &self.is_transactional())
            .field("hooks", &self.config.hooks.len())
            .field("schema", &self.schema)
            .finish()
    }
}

impl Client {
    pub fn new(driver: Arc<dyn Driver>, schema: Schema) -> Self {
        let tables = Arc::new(TableRegistry::new(schema.type_table()));
        Self {
            config: Config {
                driver,
                hooks: Arc::new(Vec::new()),
            },
            schema: Arc::new(schema),
            tables,
        }
    }

    /// Connect using a [`ClientConfig`].
    pub async fn open(config: &ClientConfig, schema: Schema) -> Result<Self> {
        let database = Database::connect(&config.database_url, config.max_connections).await?;
        let schema = schema.with_type_table(config.type_table.clone());
        let client = Self::new(Arc::new(database), schema);
        tracing::info!(
            url = %config.database_url,
            max_connections = config.max_connections,
            "Connected to database"
        );
        Ok(if config.debug { client.debug() } else { client })
    }

    fn with_config(&self, config: Config) -> Self {
        Self {
            config,
            schema: self.schema.clone(),
            tables: self.tables.clone(),
        }
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.config.driver
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    pub fn is_transactional(&self) -> bool {
        self.config.driver.unscoped().is_some()
    }

    /// Register a hook that runs before every mutation of this client.
    pub fn use_hook(&mut self, hook: impl Hook + 'static) {
        Arc::make_mut(&mut self.config.hooks).push(Arc::new(hook));
    }

    /// Builder-style [`use_hook`](Self::use_hook).
    pub fn with_hook(mut self, hook: impl Hook + 'static) -> Self {
        self.use_hook(hook);
        self
    }

    /// A client that logs every statement.
    pub fn debug(&self) -> Self {
        let driver: Arc<dyn Driver> = Arc::new(DebugDriver::new(self.config.driver.clone()));
        self.with_config(self.config.with_driver(driver))
    }

    /// Create the schema's tables and register them in the type table.
    pub async fn create_schema(&self) -> Result<SchemaSyncResult> {
        self.schema.create_all(self.config.driver.as_ref()).await
    }

    // ========================================================================
    // Builders
    // ========================================================================

    pub fn query(&self, entity: &'static EntityType) -> Query {
        Query::new(self.config.clone(), entity)
    }

    /// Query builder for an entity type looked up by table name.
    pub fn query_table(&self, table: &str) -> Result<Query> {
        let entity = self
            .schema
            .by_table(table)
            .ok_or_else(|| OrmError::InvalidField {
                kind: "table",
                name: table.to_string(),
                entity: "schema".to_string(),
            })?;
        Ok(self.query(entity))
    }

    pub fn create(&self, entity: &'static EntityType) -> Create {
        Create::new(self.config.clone(), entity)
    }

    pub fn update(&self, entity: &'static EntityType) -> Update {
        Update::new(self.config.clone(), entity)
    }

    pub fn update_one(&self, entity: &'static EntityType, id: impl Into<Value>) -> UpdateOne {
        UpdateOne::new(self.config.clone(), entity, id.into())
    }

    pub fn delete(&self, entity: &'static EntityType) -> Delete {
        Delete::new(self.config.clone(), entity)
    }

    pub fn delete_one(&self, entity: &'static EntityType, id: impl Into<Value>) -> DeleteOne {
        DeleteOne::new(self.config.clone(), entity, id.into())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a transaction.
    pub async fn tx(&self) -> Result<Transaction> {
        if self.is_transactional() {
            return Err(OrmError::NestedTransaction);
        }
        let tx = self.config.driver.tx().await?;
        let scope = ScopedDriver::new(tx, self.config.driver.clone());
        let client = self.with_config(self.config.with_driver(Arc::new(scope.clone())));
        tracing::debug!("Started transaction");
        Ok(Transaction::new(client, scope))
    }

    /// Close the underlying driver.
    pub async fn close(&self) -> Result<()> {
        self.config.driver.close().await
    }
}
