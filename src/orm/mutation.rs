//! Create, update and delete builders
//!
//! Every mutation runs inside a transaction started on the client's driver.
//! When the client is itself transaction scoped, that call joins the
//! enclosing transaction, and commit/rollback are left to its owner.
//!
//! Registered [`Hook`]s see each [`Mutation`] before it is executed and may
//! change it or reject it.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::builder::{Query, QuerySpec};
use super::filters::{Predicate, id_eq};
use super::record::Record;
use super::sql::SqlBuilder;
use super::traits::{EdgeDef, EntityType, IdKind, Rel};
use crate::client::Config;
use crate::db::{Driver, Tx};
use crate::error::{OrmError, Result};
use crate::value::Value;

/// Kind of write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Update,
    UpdateOne,
    Delete,
    DeleteOne,
}

impl Op {
    pub fn is_delete(&self) -> bool {
        matches!(self, Op::Delete | Op::DeleteOne)
    }
}

/// Change to one edge.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeChange {
    Add(Vec<Value>),
    Remove(Vec<Value>),
    Clear,
}

/// A pending write, as seen by hooks.
#[derive(Debug, Clone)]
pub struct Mutation {
    op: Op,
    entity: &'static EntityType,
    /// `None` clears the column.
    fields: BTreeMap<String, Option<Value>>,
    edges: Vec<(&'static EdgeDef, EdgeChange)>,
    predicates: Vec<Predicate>,
}

impl Mutation {
    fn new(op: Op, entity: &'static EntityType) -> Self {
        Self {
            op,
            entity,
            fields: BTreeMap::new(),
            edges: Vec::new(),
            predicates: Vec::new(),
        }
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn entity(&self) -> &'static EntityType {
        self.entity
    }

    /// Value set for a column; `Some(None)` when the column is being cleared.
    pub fn field(&self, column: &str) -> Option<Option<&Value>> {
        self.fields.get(column).map(Option::as_ref)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&Value>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn set_field(&mut self, column: &str, value: impl Into<Value>) {
        self.fields.insert(column.to_string(), Some(value.into()));
    }

    pub fn clear_field(&mut self, column: &str) {
        self.fields.insert(column.to_string(), None);
    }

    pub fn edge_changes(&self) -> impl Iterator<Item = (&'static str, &EdgeChange)> {
        self.edges.iter().map(|(e, c)| (e.name, c))
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    fn change_edge(&mut self, name: &str, change: EdgeChange) -> Result<()> {
        let edge = self.entity.require_edge(name)?;
        if !edge.fk_on_self() {
            self.edges.push((edge, change));
            return Ok(());
        }
        // The key lives on this row: the change is a column write.
        match change {
            EdgeChange::Add(ids) => match ids.as_slice() {
                [id] => self.set_field(edge.column(), id.clone()),
                _ => {
                    return Err(OrmError::InvalidQuery(format!(
                        "edge {:?} on {} holds a single neighbor",
                        edge.name, self.entity.name
                    )));
                }
            },
            EdgeChange::Remove(_) | EdgeChange::Clear => self.clear_field(edge.column()),
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for column in self.fields.keys() {
            self.entity.require_column(column)?;
        }
        if self.op == Op::Create {
            for column in self.entity.columns.iter().filter(|c| c.is_required()) {
                if !matches!(self.fields.get(column.name), Some(Some(_))) {
                    return Err(OrmError::Constraint(format!(
                        "missing required field \"{}.{}\"",
                        self.entity.name, column.name
                    )));
                }
            }
        }
        for (column, value) in &self.fields {
            if value.is_none() && column != self.entity.id_column {
                let nullable = match self.entity.column(column) {
                    Some(c) => c.nullable,
                    None => true,
                };
                if !nullable {
                    return Err(OrmError::Constraint(format!(
                        "field \"{}.{}\" cannot be cleared",
                        self.entity.name, column
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Runs before every mutation executed through a client.
#[async_trait]
pub trait Hook: Send + Sync {
    async fn run(&self, mutation: &mut Mutation) -> Result<()>;
}

async fn apply_hooks(config: &Config, mutation: &mut Mutation) -> Result<()> {
    for hook in config.hooks.iter() {
        hook.run(mutation).await?;
    }
    mutation.validate()
}

/// Commit on success, roll back on failure.
async fn finish<T>(tx: Arc<dyn Tx>, label: &str, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(|e| relabel(e, label))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "Rollback after failed mutation also failed");
            }
            Err(relabel(err, label))
        }
    }
}

fn relabel(err: OrmError, label: &str) -> OrmError {
    match err {
        OrmError::TransactionClosed { .. } => OrmError::TransactionClosed {
            label: label.to_string(),
        },
        other => other,
    }
}

// ============================================================================
// Statement helpers
// ============================================================================

async fn select_ids(
    tx: &dyn Tx,
    entity: &'static EntityType,
    predicates: &[Predicate],
) -> Result<Vec<Value>> {
    let spec = QuerySpec {
        entity: Some(entity),
        table: entity.table,
        columns: vec![entity.id_column.to_string()],
        predicates: predicates.to_vec(),
        ..Default::default()
    };
    let mut builder = SqlBuilder::new(tx.dialect());
    let sql = builder.select(&spec)?;
    Ok(tx.query(&sql, &builder.into_args()).await?.first_column())
}

async fn exec_update(
    tx: &dyn Tx,
    entity: Option<&'static EntityType>,
    table: &str,
    assignments: &[(String, Option<Value>)],
    predicates: &[Predicate],
) -> Result<u64> {
    let mut builder = SqlBuilder::new(tx.dialect());
    let sql = builder.update(entity, table, assignments, predicates)?;
    Ok(tx.exec(&sql, &builder.into_args()).await?.rows_affected)
}

async fn exec_delete(
    tx: &dyn Tx,
    entity: Option<&'static EntityType>,
    table: &str,
    predicates: &[Predicate],
) -> Result<u64> {
    let mut builder = SqlBuilder::new(tx.dialect());
    let sql = builder.delete(entity, table, predicates)?;
    Ok(tx.exec(&sql, &builder.into_args()).await?.rows_affected)
}

fn in_values(column: &str, values: Vec<Value>) -> Predicate {
    Predicate::In {
        column: column.to_string(),
        values,
        negate: false,
    }
}

/// Apply edge changes whose storage is outside the owner's row.
async fn apply_edges(
    tx: &dyn Tx,
    owner: &Value,
    edges: &[(&'static EdgeDef, EdgeChange)],
) -> Result<()> {
    for (edge, change) in edges {
        let target = edge.target();
        match (edge.rel, change) {
            (Rel::M2M, EdgeChange::Add(ids)) => {
                for id in ids {
                    let mut builder = SqlBuilder::new(tx.dialect());
                    let sql = builder.insert(
                        edge.table,
                        &[
                            (edge.column().to_string(), owner.clone()),
                            (edge.target_column().to_string(), id.clone()),
                        ],
                    );
                    tx.exec(&sql, &builder.into_args()).await?;
                }
            }
            (Rel::M2M, EdgeChange::Remove(ids)) => {
                let predicates = [
                    in_values(edge.column(), vec![owner.clone()]),
                    in_values(edge.target_column(), ids.clone()),
                ];
                exec_delete(tx, None, edge.table, &predicates).await?;
            }
            (Rel::M2M, EdgeChange::Clear) => {
                let predicates = [in_values(edge.column(), vec![owner.clone()])];
                exec_delete(tx, None, edge.table, &predicates).await?;
            }
            (_, EdgeChange::Add(ids)) => {
                if edge.is_unique() && ids.len() > 1 {
                    return Err(OrmError::InvalidQuery(format!(
                        "edge {:?} holds a single neighbor",
                        edge.name
                    )));
                }
                let predicates = [
                    Predicate::IdIn(ids.clone()),
                    Predicate::Null {
                        column: edge.column().to_string(),
                        negate: true,
                    },
                ];
                // Neighbors already attached elsewhere are a constraint error.
                let taken = select_ids(tx, target, &predicates).await?;
                if !taken.is_empty() {
                    return Err(OrmError::Constraint(format!(
                        "one of {:?} is already connected to a different {}",
                        taken, edge.column()
                    )));
                }
                let predicates = [Predicate::IdIn(ids.clone())];
                exec_update(
                    tx,
                    Some(target),
                    target.table,
                    &[(edge.column().to_string(), Some(owner.clone()))],
                    &predicates,
                )
                .await?;
            }
            (_, EdgeChange::Remove(ids)) => {
                let predicates = [
                    Predicate::IdIn(ids.clone()),
                    in_values(edge.column(), vec![owner.clone()]),
                ];
                exec_update(
                    tx,
                    Some(target),
                    target.table,
                    &[(edge.column().to_string(), None)],
                    &predicates,
                )
                .await?;
            }
            (_, EdgeChange::Clear) => {
                let predicates = [in_values(edge.column(), vec![owner.clone()])];
                exec_update(
                    tx,
                    Some(target),
                    target.table,
                    &[(edge.column().to_string(), None)],
                    &predicates,
                )
                .await?;
            }
        }
    }
    Ok(())
}

/// Remove join-table rows that reference deleted owners.
async fn clear_join_rows(
    tx: &dyn Tx,
    entity: &'static EntityType,
    predicates: &[Predicate],
) -> Result<()> {
    for edge in entity.edges.iter().filter(|e| e.rel == Rel::M2M) {
        let owners = QuerySpec {
            entity: Some(entity),
            table: entity.table,
            columns: vec![entity.id_column.to_string()],
            predicates: predicates.to_vec(),
            ..Default::default()
        };
        let restriction = [Predicate::InSelect {
            column: edge.column().to_string(),
            select: Box::new(owners),
        }];
        exec_delete(tx, None, edge.table, &restriction).await?;
    }
    Ok(())
}

// ============================================================================
// Create
// ============================================================================

/// Builder for inserting one entity.
pub struct Create {
    config: Config,
    mutation: Mutation,
    error: Option<OrmError>,
}

impl Create {
    pub(crate) fn new(config: Config, entity: &'static EntityType) -> Self {
        Self {
            config,
            mutation: Mutation::new(Op::Create, entity),
            error: None,
        }
    }

    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.mutation.set_field(column, value);
        self
    }

    /// Set a column only when a value is present.
    pub fn set_opt<V: Into<Value>>(self, column: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Connect neighbors on an edge.
    pub fn add_edge<V: Into<Value>>(mut self, edge: &str, ids: impl IntoIterator<Item = V>) -> Self {
        let ids = ids.into_iter().map(Into::into).collect();
        if let Err(e) = self.mutation.change_edge(edge, EdgeChange::Add(ids)) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Connect the single neighbor of a unique edge.
    pub fn set_edge(self, edge: &str, id: impl Into<Value>) -> Self {
        self.add_edge(edge, [id.into()])
    }

    pub async fn save(mut self) -> Result<Record> {
        if let Some(err) = self.error {
            return Err(err);
        }
        apply_hooks(&self.config, &mut self.mutation).await?;
        let entity = self.mutation.entity;

        if entity.id_kind == IdKind::String && !self.mutation.fields.contains_key(entity.id_column) {
            let id = uuid::Uuid::new_v4().to_string();
            self.mutation.set_field(entity.id_column, id);
        }

        let tx = self.config.driver.tx().await.map_err(|e| relabel(e, entity.name))?;
        let result = insert(tx.as_ref(), &self.mutation).await;
        let id = finish(tx, entity.name, result).await?;

        tracing::debug!(entity = entity.name, id = %id, "Created entity");
        Query::new(self.config, entity).filter(id_eq(id)).only().await
    }
}

async fn insert(tx: &dyn Tx, mutation: &Mutation) -> Result<Value> {
    let entity = mutation.entity;
    let values: Vec<(String, Value)> = mutation
        .fields
        .iter()
        .filter_map(|(k, v)| v.clone().map(|v| (k.clone(), v)))
        .collect();

    let mut builder = SqlBuilder::new(tx.dialect());
    let sql = builder.insert(entity.table, &values);
    let result = tx.exec(&sql, &builder.into_args()).await?;

    let id = match mutation.fields.get(entity.id_column) {
        Some(Some(id)) => id.clone(),
        _ => result.last_insert_id.map(Value::Int).ok_or_else(|| {
            OrmError::InvalidQuery(format!("driver returned no id for new {}", entity.label))
        })?,
    };

    apply_edges(tx, &id, &mutation.edges).await?;
    Ok(id)
}

// ============================================================================
// Update
// ============================================================================

async fn update(tx: &dyn Tx, mutation: &Mutation) -> Result<Vec<Value>> {
    let entity = mutation.entity;
    let ids = select_ids(tx, entity, &mutation.predicates).await?;
    if ids.is_empty() {
        return Ok(ids);
    }

    let assignments: Vec<(String, Option<Value>)> = mutation
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if !assignments.is_empty() {
        let predicates = [Predicate::IdIn(ids.clone())];
        exec_update(tx, Some(entity), entity.table, &assignments, &predicates).await?;
    }
    for id in &ids {
        apply_edges(tx, id, &mutation.edges).await?;
    }
    Ok(ids)
}

/// Builder for updating every entity matching its predicates.
pub struct Update {
    config: Config,
    mutation: Mutation,
    error: Option<OrmError>,
}

/// Builder for updating one entity by id.
pub struct UpdateOne {
    inner: Update,
    id: Value,
}

macro_rules! update_setters {
    ($($field:ident).+) => {
        /// Set a column.
        pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
            self.$($field).+.set_field(column, value);
            self
        }

        /// Set a column to NULL.
        pub fn clear(mut self, column: &str) -> Self {
            self.$($field).+.clear_field(column);
            self
        }

        pub fn add_edge<V: Into<Value>>(mut self, edge: &str, ids: impl IntoIterator<Item = V>) -> Self {
            let ids = ids.into_iter().map(Into::into).collect();
            self.record_edge(edge, EdgeChange::Add(ids));
            self
        }

        pub fn set_edge(self, edge: &str, id: impl Into<Value>) -> Self {
            self.add_edge(edge, [id.into()])
        }

        pub fn remove_edge<V: Into<Value>>(mut self, edge: &str, ids: impl IntoIterator<Item = V>) -> Self {
            let ids = ids.into_iter().map(Into::into).collect();
            self.record_edge(edge, EdgeChange::Remove(ids));
            self
        }

        /// Disconnect every neighbor on an edge.
        pub fn clear_edge(mut self, edge: &str) -> Self {
            self.record_edge(edge, EdgeChange::Clear);
            self
        }
    };
}

impl Update {
    pub(crate) fn new(config: Config, entity: &'static EntityType) -> Self {
        Self {
            config,
            mutation: Mutation::new(Op::Update, entity),
            error: None,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.mutation.predicates.push(predicate);
        self
    }

    fn record_edge(&mut self, edge: &str, change: EdgeChange) {
        if let Err(e) = self.mutation.change_edge(edge, change) {
            self.error.get_or_insert(e);
        }
    }

    update_setters!(mutation);

    /// Execute the update; returns the number of matched entities.
    pub async fn save(self) -> Result<usize> {
        Ok(self.execute().await?.len())
    }

    async fn execute(mut self) -> Result<Vec<Value>> {
        if let Some(err) = self.error {
            return Err(err);
        }
        apply_hooks(&self.config, &mut self.mutation).await?;
        let entity = self.mutation.entity;

        let tx = self.config.driver.tx().await.map_err(|e| relabel(e, entity.name))?;
        let result = update(tx.as_ref(), &self.mutation).await;
        let ids = finish(tx, entity.name, result).await?;
        tracing::debug!(entity = entity.name, count = ids.len(), "Updated entities");
        Ok(ids)
    }
}

impl UpdateOne {
    pub(crate) fn new(config: Config, entity: &'static EntityType, id: Value) -> Self {
        let mut inner = Update::new(config, entity);
        inner.mutation.op = Op::UpdateOne;
        inner.mutation.predicates.push(id_eq(id.clone()));
        Self { inner, id }
    }

    pub fn id(&self) -> &Value {
        &self.id
    }

    fn record_edge(&mut self, edge: &str, change: EdgeChange) {
        self.inner.record_edge(edge, change);
    }

    update_setters!(inner.mutation);

    /// Execute the update and return the updated entity.
    pub async fn save(self) -> Result<Record> {
        let config = self.inner.config.clone();
        let entity = self.inner.mutation.entity;
        let ids = self.inner.execute().await?;
        if ids.is_empty() {
            return Err(OrmError::not_found(entity.label));
        }
        Query::new(config, entity).filter(id_eq(self.id)).only().await
    }
}

// ============================================================================
// Delete
// ============================================================================

async fn delete(tx: &dyn Tx, mutation: &Mutation) -> Result<u64> {
    let entity = mutation.entity;
    clear_join_rows(tx, entity, &mutation.predicates).await?;
    exec_delete(tx, Some(entity), entity.table, &mutation.predicates).await
}

/// Builder for deleting every entity matching its predicates.
pub struct Delete {
    config: Config,
    mutation: Mutation,
}

impl Delete {
    pub(crate) fn new(config: Config, entity: &'static EntityType) -> Self {
        Self {
            config,
            mutation: Mutation::new(Op::Delete, entity),
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.mutation.predicates.push(predicate);
        self
    }

    /// Execute the delete; returns the number of deleted rows.
    pub async fn exec(mut self) -> Result<u64> {
        apply_hooks(&self.config, &mut self.mutation).await?;
        let entity = self.mutation.entity;

        let tx = self.config.driver.tx().await.map_err(|e| relabel(e, entity.name))?;
        let result = delete(tx.as_ref(), &self.mutation).await;
        let affected = finish(tx, entity.name, result).await?;
        tracing::debug!(entity = entity.name, affected, "Deleted entities");
        Ok(affected)
    }
}

/// Builder for deleting one entity by id.
pub struct DeleteOne {
    inner: Delete,
}

impl DeleteOne {
    pub(crate) fn new(config: Config, entity: &'static EntityType, id: Value) -> Self {
        let mut inner = Delete::new(config, entity).filter(id_eq(id));
        inner.mutation.op = Op::DeleteOne;
        Self { inner }
    }

    /// Execute the delete; NotFound when no row had the id.
    pub async fn exec(self) -> Result<()> {
        let label = self.inner.mutation.entity.label;
        match self.inner.exec().await? {
            0 => Err(OrmError::not_found(label)),
            _ => Ok(()),
        }
    }
}
