//! Loaded entity rows
//!
//! A [`Record`] is one row of an entity type plus the edges eager-loaded
//! with it. It keeps the client configuration it was loaded through, so
//! records loaded inside a transaction stay bound to that transaction until
//! [`Record::unwrap_tx`] rebinds them.

use std::collections::BTreeMap;

use super::builder::Query;
use super::filters::id_eq;
use super::traits::{EntityType, FieldType, IdKind};
use crate::client::Config;
use crate::error::{OrmError, Result};
use crate::value::{FromValue, Value};

/// Neighbors attached to a record by eager loading.
#[derive(Debug, Clone)]
pub enum Loaded {
    /// Unique edge; `None` when the neighbor does not exist.
    One(Option<Box<Record>>),
    Many(Vec<Record>),
}

/// One row of an entity type.
#[derive(Clone)]
pub struct Record {
    entity: &'static EntityType,
    config: Config,
    id: Value,
    /// Parallel to `entity.columns`.
    values: Vec<Value>,
    /// Parallel to `entity.foreign_keys`; empty unless they were selected.
    fks: Vec<Value>,
    edges: BTreeMap<&'static str, Loaded>,
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct(self.entity.name);
        s.field(self.entity.id_column, &self.id);
        for (column, value) in self.entity.columns.iter().zip(&self.values) {
            s.field(column.name, value);
        }
        if !self.edges.is_empty() {
            s.field("edges", &self.edges);
        }
        s.finish()
    }
}

/// Coerce a driver value into the shape the column declares.
fn coerce(table: &str, column: &str, field_type: FieldType, value: Value) -> Result<Value> {
    let mismatch = |v: &Value| {
        OrmError::scan_mismatch(
            table,
            format!("column {:?} ({}) got {}", column, field_type.name(), v.kind()),
        )
    };
    Ok(match (field_type, value) {
        (_, Value::Null) => Value::Null,
        (FieldType::Int, Value::Int(i)) => Value::Int(i),
        (FieldType::Int, Value::Bool(b)) => Value::Int(b as i64),
        (FieldType::Float, Value::Float(f)) => Value::Float(f),
        (FieldType::Float, Value::Int(i)) => Value::Float(i as f64),
        (FieldType::Bool, Value::Bool(b)) => Value::Bool(b),
        (FieldType::Bool, Value::Int(i @ (0 | 1))) => Value::Bool(i == 1),
        (FieldType::Bytes, Value::Bytes(b)) => Value::Bytes(b),
        (FieldType::Bytes, Value::String(s)) => Value::Bytes(s.into_bytes()),
        (
            FieldType::String | FieldType::Time | FieldType::Json | FieldType::Uuid,
            Value::String(s),
        ) => Value::String(s),
        (_, other) => return Err(mismatch(&other)),
    })
}

impl Record {
    /// Build a record from a row laid out as id, columns, then (optionally)
    /// foreign keys.
    pub(crate) fn assign(
        entity: &'static EntityType,
        config: Config,
        mut row: Vec<Value>,
        with_fks: bool,
    ) -> Result<Self> {
        let expected = 1
            + entity.columns.len()
            + if with_fks { entity.foreign_keys.len() } else { 0 };
        if row.len() != expected {
            return Err(OrmError::scan_mismatch(
                entity.table,
                format!("expected {} values per row, got {}", expected, row.len()),
            ));
        }

        let fks = if with_fks {
            row.split_off(1 + entity.columns.len())
        } else {
            Vec::new()
        };
        let raw = row.split_off(1);
        let id = row.pop().unwrap_or_default();

        let id = match (entity.id_kind, id) {
            (IdKind::Int, Value::Int(i)) => Value::Int(i),
            (IdKind::String, Value::String(s)) => Value::String(s),
            (_, other) => {
                return Err(OrmError::scan_mismatch(
                    entity.table,
                    format!("primary key got {}", other.kind()),
                ));
            }
        };

        let mut values = Vec::with_capacity(raw.len());
        for (column, value) in entity.columns.iter().zip(raw) {
            if value.is_null() && !column.nullable {
                return Err(OrmError::scan_mismatch(
                    entity.table,
                    format!("NULL in non-nullable column {:?}", column.name),
                ));
            }
            values.push(coerce(entity.table, column.name, column.field_type, value)?);
        }

        Ok(Self {
            entity,
            config,
            id,
            values,
            fks,
            edges: BTreeMap::new(),
        })
    }

    pub fn entity(&self) -> &'static EntityType {
        self.entity
    }

    pub fn id(&self) -> &Value {
        &self.id
    }

    pub fn id_as<T: FromValue>(&self) -> Result<T> {
        T::from_value(&self.id)
    }

    /// Raw value of a column, the primary key or a selected foreign key.
    pub fn value(&self, column: &str) -> Option<&Value> {
        if column == self.entity.id_column {
            return Some(&self.id);
        }
        if let Some(i) = self.entity.column_index(column) {
            return self.values.get(i);
        }
        self.fk(column)
    }

    /// Typed read of a column.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T> {
        match self.value(column) {
            Some(v) => T::from_value(v),
            None => Err(OrmError::InvalidField {
                kind: "column",
                name: column.to_string(),
                entity: self.entity.name.to_string(),
            }),
        }
    }

    /// Scalar columns in declaration order, excluding the primary key.
    pub fn values(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.entity
            .columns
            .iter()
            .map(|c| c.name)
            .zip(self.values.iter())
    }

    /// Foreign-key value, when foreign keys were selected.
    pub fn fk(&self, column: &str) -> Option<&Value> {
        let i = self.entity.foreign_keys.iter().position(|fk| *fk == column)?;
        self.fks.get(i)
    }

    // ========================================================================
    // Edges
    // ========================================================================

    pub fn is_loaded(&self, edge: &str) -> bool {
        self.edges.contains_key(edge)
    }

    /// Loaded neighbors of an edge; NotLoaded when it was not eager-loaded.
    pub fn edge(&self, name: &str) -> Result<&Loaded> {
        let def = self.entity.require_edge(name)?;
        self.edges.get(def.name).ok_or_else(|| OrmError::NotLoaded {
            edge: def.name.to_string(),
        })
    }

    /// Neighbor of a unique edge. `Ok(None)` means loaded but absent.
    pub fn edge_one(&self, name: &str) -> Result<Option<&Record>> {
        match self.edge(name)? {
            Loaded::One(r) => Ok(r.as_deref()),
            Loaded::Many(rs) => Ok(rs.first()),
        }
    }

    pub fn edge_many(&self, name: &str) -> Result<&[Record]> {
        match self.edge(name)? {
            Loaded::Many(rs) => Ok(rs),
            Loaded::One(Some(r)) => Ok(std::slice::from_ref(r.as_ref())),
            Loaded::One(None) => Ok(&[]),
        }
    }

    pub(crate) fn set_edge(&mut self, name: &'static str, loaded: Loaded) {
        self.edges.insert(name, loaded);
    }

    pub(crate) fn push_edge(&mut self, name: &'static str, neighbor: Record) {
        match self.edges.get_mut(name) {
            Some(Loaded::Many(rs)) => rs.push(neighbor),
            _ => {
                self.edges.insert(name, Loaded::One(Some(Box::new(neighbor))));
            }
        }
    }

    /// Query the neighbors of this record on `edge`.
    pub fn query_edge(&self, edge: &str) -> Result<Query> {
        Query::new(self.config.clone(), self.entity)
            .filter(id_eq(self.id.clone()))
            .query_edge(edge)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    pub fn is_transactional(&self) -> bool {
        self.config.driver.unscoped().is_some()
    }

    /// Rebind this record (and its loaded edges) to the driver its
    /// transaction was started from.
    pub fn unwrap_tx(self) -> Result<Record> {
        let origin = self.config.driver.unscoped().ok_or_else(|| OrmError::NotTransactional {
            label: self.entity.name.to_string(),
        })?;
        let config = self.config.with_driver(origin);
        Ok(self.rebind(&config))
    }

    fn rebind(mut self, config: &Config) -> Record {
        self.config = config.clone();
        self.edges = std::mem::take(&mut self.edges)
            .into_iter()
            .map(|(name, loaded)| {
                let loaded = match loaded {
                    Loaded::One(r) => Loaded::One(r.map(|r| Box::new(r.rebind(config)))),
                    Loaded::Many(rs) => {
                        Loaded::Many(rs.into_iter().map(|r| r.rebind(config)).collect())
                    }
                };
                (name, loaded)
            })
            .collect();
        self
    }
}
