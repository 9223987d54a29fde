//! Registered entity types and schema bootstrap
//!
//! A [`Schema`] is the set of entity types a client knows about. It maps
//! table names back to descriptors (used by the node resolver) and can
//! create the tables on an empty SQLite database:
//! - one table per entity type, plus M2M join tables
//! - the type table, listing entity tables in registration order
//! - per-table id ranges, so auto-assigned ids are globally unique
//!
//! This is bootstrap only. Column changes on existing tables are not
//! migrated.

use crate::db::{Dialect, Driver};
use crate::error::Result;
use crate::node::GlobalId;
use crate::orm::sql::ident;
use crate::orm::traits::{EntityType, IdKind};
use crate::value::Value;

/// Default name of the table that lists entity tables.
pub const DEFAULT_TYPE_TABLE: &str = "ent_types";

/// Result of a schema bootstrap
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SchemaSyncResult {
    pub tables_created: Vec<String>,
    pub types_registered: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Schema {
    types: Vec<&'static EntityType>,
    type_table: String,
}

impl Schema {
    pub fn new(types: Vec<&'static EntityType>) -> Self {
        Self {
            types,
            type_table: DEFAULT_TYPE_TABLE.to_string(),
        }
    }

    pub fn with_type_table(mut self, name: impl Into<String>) -> Self {
        self.type_table = name.into();
        self
    }

    pub fn types(&self) -> &[&'static EntityType] {
        &self.types
    }

    pub fn type_table(&self) -> &str {
        &self.type_table
    }

    pub fn by_table(&self, table: &str) -> Option<&'static EntityType> {
        self.types.iter().copied().find(|t| t.table == table)
    }

    pub fn by_name(&self, name: &str) -> Option<&'static EntityType> {
        self.types.iter().copied().find(|t| t.name == name)
    }

    /// Create missing tables and register every entity table in the type
    /// table.
    pub async fn create_all<D: Driver + ?Sized>(&self, driver: &D) -> Result<SchemaSyncResult> {
        let mut result = SchemaSyncResult::default();

        let type_table = format!(
            "CREATE TABLE IF NOT EXISTS {} (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"type\" TEXT NOT NULL UNIQUE)",
            ident(&self.type_table)
        );
        driver.exec(&type_table, &[]).await?;

        for entity in &self.types {
            if !table_exists(driver, entity.table).await? {
                tracing::debug!(table = entity.table, "Creating table");
                driver.exec(&entity.create_table_sql(), &[]).await?;
                result.tables_created.push(entity.table.to_string());
            }
            for sql in entity.join_tables_sql() {
                driver.exec(&sql, &[]).await?;
            }
        }

        let select = format!(
            "SELECT \"type\" FROM {} ORDER BY \"id\"",
            ident(&self.type_table)
        );
        let mut registered: Vec<String> = driver
            .query(&select, &[])
            .await?
            .first_column()
            .iter()
            .map(|v| v.to_string())
            .collect();

        let insert = format!("INSERT INTO {} (\"type\") VALUES (?)", ident(&self.type_table));
        for entity in &self.types {
            if registered.iter().any(|t| t == entity.table) {
                continue;
            }
            driver.exec(&insert, &[Value::from(entity.table)]).await?;
            registered.push(entity.table.to_string());
            result.types_registered.push(entity.table.to_string());
        }

        if driver.dialect() == Dialect::Sqlite {
            for (idx, table) in registered.iter().enumerate() {
                let Some(entity) = self.by_table(table) else {
                    continue;
                };
                if entity.id_kind == IdKind::Int {
                    seed_id_range(driver, entity.table, idx as i64).await?;
                }
            }
        }

        tracing::info!(
            tables_created = result.tables_created.len(),
            types_registered = result.types_registered.len(),
            "Schema bootstrap complete"
        );
        Ok(result)
    }
}

/// Check if a table exists in the database
async fn table_exists<D: Driver + ?Sized>(driver: &D, table: &str) -> Result<bool> {
    let rows = driver
        .query(
            "SELECT name FROM sqlite_master WHERE type='table' AND name = ?",
            &[Value::from(table)],
        )
        .await?;
    Ok(!rows.is_empty())
}

/// Start the table's AUTOINCREMENT counter at the first id of its range.
async fn seed_id_range<D: Driver + ?Sized>(driver: &D, table: &str, idx: i64) -> Result<()> {
    let start = GlobalId::encode(idx, 0)?;
    driver
        .exec(
            "INSERT INTO sqlite_sequence (name, seq) SELECT ?, ? WHERE NOT EXISTS (SELECT 1 FROM sqlite_sequence WHERE name = ?)",
            &[Value::from(table), Value::Int(start), Value::from(table)],
        )
        .await?;
    Ok(())
}
