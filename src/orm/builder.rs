//! Query builder for entity types
//!
//! One builder serves every entity type: it is parameterized by the type's
//! static [`EntityType`] descriptor. Builders are plain values; `clone()`
//! forks an independent copy that can be filtered differently.
//!
//! ```rust,ignore
//! let rooms = client
//!     .query(&LOCATION)
//!     .filter(eq("kind", "room"))
//!     .order(asc("name"))
//!     .limit(10)
//!     .with_edge("parent", |q| q)
//!     .all()
//!     .await?;
//! ```

use std::collections::BTreeMap;

use futures::future::{BoxFuture, FutureExt};

use super::filters::{Order, Predicate, id_eq};
use super::loaders;
use super::record::Record;
use super::select::{Aggregate, GroupBy, Select};
use super::sql::{render_count, render_select};
use super::traits::{EntityType, FromRecord, Rel};
use crate::client::Config;
use crate::db::Rows;
use crate::error::{OrmError, Result};
use crate::value::Value;

/// Immutable description of one single-table statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    /// Entity type behind `table`; `None` for join tables.
    pub entity: Option<&'static EntityType>,
    pub table: &'static str,
    /// Projected column names.
    pub columns: Vec<String>,
    pub aggregates: Vec<Aggregate>,
    pub predicates: Vec<Predicate>,
    pub order: Vec<Order>,
    pub group_by: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// A query builder for one entity type.
#[derive(Clone)]
pub struct Query {
    config: Config,
    entity: &'static EntityType,
    predicates: Vec<Predicate>,
    order: Vec<Order>,
    limit: Option<u64>,
    offset: Option<u64>,
    /// Eager-loaded edges, keyed by edge name.
    with: BTreeMap<&'static str, Query>,
    with_fks: bool,
    /// Edge names passed to `with_edge` that the type does not declare.
    unknown_edges: Vec<String>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("entity", &self.entity.name)
            .field("predicates", &self.predicates)
            .field("order", &self.order)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("with", &self.with)
            .finish()
    }
}

impl Query {
    pub(crate) fn new(config: Config, entity: &'static EntityType) -> Self {
        Self {
            config,
            entity,
            predicates: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            with: BTreeMap::new(),
            with_fks: false,
            unknown_edges: Vec::new(),
        }
    }

    pub fn entity(&self) -> &'static EntityType {
        self.entity
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// Add a predicate (the WHERE step). Predicates are ANDed.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn filter_all(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.predicates.extend(predicates);
        self
    }

    /// Add an ORDER BY term.
    pub fn order(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub(crate) fn with_fks(mut self, with_fks: bool) -> Self {
        self.with_fks = with_fks;
        self
    }

    /// Eager-load an edge, configuring the neighbor query with `configure`.
    ///
    /// Attaching the same edge again replaces the earlier sub-query.
    pub fn with_edge(mut self, edge: &str, configure: impl FnOnce(Query) -> Query) -> Self {
        match self.entity.edge(edge) {
            Some(def) => {
                let sub = configure(Query::new(self.config.clone(), def.target()));
                self.with.insert(def.name, sub);
            }
            None => self.unknown_edges.push(edge.to_string()),
        }
        self
    }

    /// Names of the edges this query will eager-load.
    pub fn eager_loads(&self) -> Vec<&'static str> {
        self.with.keys().copied().collect()
    }

    /// The sub-query attached for an edge, if any.
    pub fn eager_load(&self, edge: &str) -> Option<&Query> {
        self.with.get(edge)
    }

    fn check(&self) -> Result<()> {
        match self.unknown_edges.first() {
            Some(name) => Err(OrmError::InvalidField {
                kind: "edge",
                name: name.clone(),
                entity: self.entity.name.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn needs_fks(&self) -> bool {
        self.with_fks
            || self
                .with
                .keys()
                .filter_map(|name| self.entity.edge(name))
                .any(|edge| edge.fk_on_self())
    }

    fn spec_for(&self, columns: Vec<String>) -> QuerySpec {
        QuerySpec {
            entity: Some(self.entity),
            table: self.entity.table,
            columns,
            aggregates: Vec::new(),
            predicates: self.predicates.clone(),
            order: self.order.clone(),
            group_by: Vec::new(),
            limit: self.limit,
            offset: self.offset,
        }
    }

    fn record_columns(&self, with_fks: bool) -> Vec<String> {
        let mut columns: Vec<String> = self
            .entity
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        if with_fks {
            columns.extend(self.entity.foreign_keys.iter().map(|c| c.to_string()));
        }
        columns
    }

    /// Snapshot of the statement this builder currently describes.
    pub fn spec(&self) -> QuerySpec {
        self.spec_for(self.record_columns(self.needs_fks()))
    }

    /// Spec projecting a single column, used for sub-selects and id scans.
    pub(crate) fn projection(&self, column: &str) -> QuerySpec {
        self.spec_for(vec![column.to_string()])
    }

    pub(crate) fn grouped(&self, fields: &[String], aggregates: &[Aggregate]) -> QuerySpec {
        let mut spec = self.spec_for(fields.to_vec());
        spec.aggregates = aggregates.to_vec();
        spec.group_by = fields.to_vec();
        spec
    }

    /// A transaction closed under a record surfaces with the record's type.
    fn relabel(&self, err: OrmError) -> OrmError {
        match err {
            OrmError::TransactionClosed { .. } => OrmError::TransactionClosed {
                label: self.entity.name.to_string(),
            },
            other => other,
        }
    }

    pub(crate) async fn run(&self, sql: &str, args: &[Value]) -> Result<Rows> {
        self.config
            .driver
            .query(sql, args)
            .await
            .map_err(|e| self.relabel(e))
    }

    pub(crate) async fn run_spec(&self, spec: &QuerySpec) -> Result<Rows> {
        self.check()?;
        let (sql, args) = render_select(self.config.driver.dialect(), spec)?;
        self.run(&sql, &args).await
    }

    /// The SELECT this query executes, with its arguments.
    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        self.check()?;
        render_select(self.config.driver.dialect(), &self.spec())
    }

    /// Chain the query onto an edge: a query over the neighbors of every row
    /// this query matches.
    pub fn query_edge(self, edge: &str) -> Result<Query> {
        self.check()?;
        let def = self.entity.require_edge(edge)?;
        let target = def.target();

        let restriction = if def.rel == Rel::M2M {
            let join = QuerySpec {
                table: def.table,
                columns: vec![def.target_column().to_string()],
                predicates: vec![Predicate::InSelect {
                    column: def.column().to_string(),
                    select: Box::new(self.projection(self.entity.id_column)),
                }],
                ..Default::default()
            };
            Predicate::InSelect {
                column: target.id_column.to_string(),
                select: Box::new(join),
            }
        } else if def.fk_on_self() {
            Predicate::InSelect {
                column: target.id_column.to_string(),
                select: Box::new(self.projection(def.column())),
            }
        } else {
            Predicate::InSelect {
                column: def.column().to_string(),
                select: Box::new(self.projection(self.entity.id_column)),
            }
        };

        Ok(Query::new(self.config.clone(), target).filter(restriction))
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Execute the query and return every matching record.
    pub async fn all(self) -> Result<Vec<Record>> {
        self.load().await
    }

    /// Boxed so eager loading can recurse through sub-queries.
    pub(crate) fn load(self) -> BoxFuture<'static, Result<Vec<Record>>> {
        async move {
            self.check()?;
            let with_fks = self.needs_fks();
            let spec = self.spec_for(self.record_columns(with_fks));
            let rows = self.run_spec(&spec).await?;

            if !rows.is_empty() && rows.columns.len() != spec.columns.len() {
                return Err(OrmError::scan_mismatch(
                    self.entity.table,
                    format!(
                        "expected {} columns, driver returned {}",
                        spec.columns.len(),
                        rows.columns.len()
                    ),
                ));
            }

            let mut records = Vec::with_capacity(rows.len());
            for row in rows.rows {
                records.push(Record::assign(
                    self.entity,
                    self.config.clone(),
                    row,
                    with_fks,
                )?);
            }
            if records.is_empty() {
                return Ok(records);
            }

            for (name, sub) in self.with {
                let edge = self.entity.require_edge(name)?;
                loaders::load_edge(&mut records, edge, sub).await?;
            }

            tracing::trace!(entity = self.entity.name, count = records.len(), "Loaded records");
            Ok(records)
        }
        .boxed()
    }

    /// First match, or NotFound.
    pub async fn first(self) -> Result<Record> {
        let label = self.entity.label;
        self.limit(1)
            .all()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OrmError::not_found(label))
    }

    /// The single match; NotFound for none, NotSingular for more than one.
    pub async fn only(self) -> Result<Record> {
        let label = self.entity.label;
        let mut records = self.limit(2).all().await?;
        match records.len() {
            1 => Ok(records.remove(0)),
            0 => Err(OrmError::not_found(label)),
            _ => Err(OrmError::not_singular(label)),
        }
    }

    /// Identifiers of every matching row.
    pub async fn ids(self) -> Result<Vec<Value>> {
        let spec = self.projection(self.entity.id_column);
        Ok(self.run_spec(&spec).await?.first_column())
    }

    pub async fn first_id(self) -> Result<Value> {
        let label = self.entity.label;
        self.limit(1)
            .ids()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OrmError::not_found(label))
    }

    pub async fn only_id(self) -> Result<Value> {
        let label = self.entity.label;
        let mut ids = self.limit(2).ids().await?;
        match ids.len() {
            1 => Ok(ids.remove(0)),
            0 => Err(OrmError::not_found(label)),
            _ => Err(OrmError::not_singular(label)),
        }
    }

    /// Execute a COUNT query.
    pub async fn count(&self) -> Result<usize> {
        self.check()?;
        let spec = self.projection(self.entity.id_column);
        let (sql, args) = render_count(self.config.driver.dialect(), &spec)?;
        let rows = self.run(&sql, &args).await?;
        let count: i64 = rows
            .first_column()
            .first()
            .ok_or_else(|| OrmError::scan_mismatch(self.entity.table, "COUNT returned no rows"))?
            .get()?;
        Ok(count.max(0) as usize)
    }

    pub async fn exist(&self) -> Result<bool> {
        Ok(self.count().await? > 0)
    }

    pub async fn all_as<T: FromRecord>(self) -> Result<Vec<T>> {
        self.all().await?.iter().map(T::from_record).collect()
    }

    pub async fn first_as<T: FromRecord>(self) -> Result<T> {
        T::from_record(&self.first().await?)
    }

    pub async fn only_as<T: FromRecord>(self) -> Result<T> {
        T::from_record(&self.only().await?)
    }

    /// Group by one or more columns; aggregate with [`GroupBy::aggregate`].
    pub fn group_by(self, fields: &[&str]) -> GroupBy {
        GroupBy::new(self, fields.iter().map(|f| f.to_string()).collect())
    }

    /// Project an explicit column set.
    pub fn select(self, fields: &[&str]) -> Select {
        Select::new(self, fields.iter().map(|f| f.to_string()).collect())
    }

    /// Restrict to the row with this identifier.
    pub fn by_id(self, id: impl Into<Value>) -> Self {
        self.filter(id_eq(id))
    }
}
