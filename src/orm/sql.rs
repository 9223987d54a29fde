//! SQL rendering for query descriptions
//!
//! Turns a [`QuerySpec`] into one parameterized statement plus its bound
//! arguments. Arguments are collected in textual order, which is what
//! positional `?` placeholders require.

use super::builder::QuerySpec;
use super::filters::Predicate;
use super::traits::{EntityType, Rel};
use crate::db::Dialect;
use crate::error::{OrmError, Result};
use crate::value::Value;

/// Limit imposed when only an offset is set; dialects such as SQLite reject
/// OFFSET without LIMIT.
pub const IMPLICIT_LIMIT: u64 = i32::MAX as u64;

/// Quote an identifier.
pub fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) struct SqlBuilder {
    dialect: Dialect,
    args: Vec<Value>,
}

impl SqlBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            args: Vec::new(),
        }
    }

    pub fn into_args(self) -> Vec<Value> {
        self.args
    }

    fn bind(&mut self, value: Value) -> String {
        self.args.push(value);
        self.dialect.placeholder(self.args.len())
    }

    /// SELECT for the spec's projection.
    pub fn select(&mut self, spec: &QuerySpec) -> Result<String> {
        let mut projection: Vec<String> = spec.columns.iter().map(|c| ident(c)).collect();
        projection.extend(spec.aggregates.iter().map(|a| a.to_sql()));
        if projection.is_empty() {
            return Err(OrmError::InvalidQuery(format!(
                "empty projection on {}",
                spec.table
            )));
        }

        let mut sql = format!("SELECT {} FROM {}", projection.join(", "), ident(spec.table));
        sql.push_str(&self.where_clause(spec)?);

        if !spec.group_by.is_empty() {
            let groups: Vec<String> = spec.group_by.iter().map(|c| ident(c)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(", "));
        }

        if !spec.order.is_empty() {
            let mut terms = Vec::with_capacity(spec.order.len());
            for order in &spec.order {
                if let Some(entity) = spec.entity {
                    entity.require_column(&order.column)?;
                }
                terms.push(format!("{} {}", ident(&order.column), order.direction.to_sql()));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        match (spec.limit, spec.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", IMPLICIT_LIMIT, offset))
            }
            (None, None) => {}
        }

        Ok(sql)
    }

    /// COUNT over the rows the spec selects. Limit and offset are honored by
    /// counting a windowed sub-select.
    pub fn count(&mut self, spec: &QuerySpec) -> Result<String> {
        if spec.limit.is_none() && spec.offset.is_none() {
            let mut sql = format!("SELECT COUNT(*) FROM {}", ident(spec.table));
            sql.push_str(&self.where_clause(spec)?);
            return Ok(sql);
        }
        let inner = self.select(spec)?;
        Ok(format!("SELECT COUNT(*) FROM ({}) AS {}", inner, ident("t1")))
    }

    fn where_clause(&mut self, spec: &QuerySpec) -> Result<String> {
        if spec.predicates.is_empty() {
            return Ok(String::new());
        }
        let conditions = self.conjunction(spec.entity, &spec.predicates)?;
        Ok(format!(" WHERE {}", conditions))
    }

    fn conjunction(
        &mut self,
        entity: Option<&'static EntityType>,
        predicates: &[Predicate],
    ) -> Result<String> {
        let mut parts = Vec::with_capacity(predicates.len());
        for p in predicates {
            parts.push(self.predicate(entity, p)?);
        }
        Ok(parts.join(" AND "))
    }

    fn check_column(entity: Option<&'static EntityType>, column: &str) -> Result<()> {
        match entity {
            Some(entity) => entity.require_column(column),
            None => Ok(()),
        }
    }

    fn predicate(&mut self, entity: Option<&'static EntityType>, p: &Predicate) -> Result<String> {
        let id_column = entity.map(|e| e.id_column).unwrap_or("id");
        Ok(match p {
            Predicate::Compare { column, op, value } => {
                Self::check_column(entity, column)?;
                format!("{} {} {}", ident(column), op.to_sql(), self.bind(value.clone()))
            }
            Predicate::In {
                column,
                values,
                negate,
            } => {
                Self::check_column(entity, column)?;
                self.membership(column, values, *negate)
            }
            Predicate::IdIn(values) => self.membership(id_column, values, false),
            Predicate::Null { column, negate } => {
                Self::check_column(entity, column)?;
                let op = if *negate { "IS NOT NULL" } else { "IS NULL" };
                format!("{} {}", ident(column), op)
            }
            Predicate::Like { column, pattern } => {
                Self::check_column(entity, column)?;
                format!(
                    "{} LIKE {} ESCAPE '\\'",
                    ident(column),
                    self.bind(Value::String(pattern.clone()))
                )
            }
            Predicate::And(items) if items.is_empty() => "1 = 1".to_string(),
            Predicate::And(items) => format!("({})", self.conjunction(entity, items)?),
            Predicate::Or(items) if items.is_empty() => "1 = 0".to_string(),
            Predicate::Or(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.push(self.predicate(entity, item)?);
                }
                format!("({})", parts.join(" OR "))
            }
            Predicate::Not(inner) => format!("NOT ({})", self.predicate(entity, inner)?),
            Predicate::HasEdge { edge, with } => {
                let entity = entity.ok_or_else(|| {
                    OrmError::InvalidQuery(format!("edge predicate {:?} outside an entity query", edge))
                })?;
                self.has_edge(entity, edge, with)?
            }
            Predicate::InSelect { column, select } => {
                format!("{} IN ({})", ident(column), self.select(select)?)
            }
        })
    }

    fn membership(&mut self, column: &str, values: &[Value], negate: bool) -> String {
        if values.is_empty() {
            return if negate { "1 = 1" } else { "1 = 0" }.to_string();
        }
        let placeholders: Vec<String> = values.iter().map(|v| self.bind(v.clone())).collect();
        let op = if negate { "NOT IN" } else { "IN" };
        format!("{} {} ({})", ident(column), op, placeholders.join(", "))
    }

    fn has_edge(
        &mut self,
        entity: &'static EntityType,
        name: &str,
        with: &[Predicate],
    ) -> Result<String> {
        let edge = entity.require_edge(name)?;
        let target = edge.target();

        if edge.rel == Rel::M2M {
            let narrowed = if with.is_empty() {
                String::new()
            } else {
                format!(
                    " WHERE {} IN (SELECT {} FROM {} WHERE {})",
                    ident(edge.target_column()),
                    ident(target.id_column),
                    ident(target.table),
                    self.conjunction(Some(target), with)?
                )
            };
            return Ok(format!(
                "{} IN (SELECT {} FROM {}{})",
                ident(entity.id_column),
                ident(edge.column()),
                ident(edge.table),
                narrowed
            ));
        }

        if edge.fk_on_self() {
            if with.is_empty() {
                return Ok(format!("{} IS NOT NULL", ident(edge.column())));
            }
            return Ok(format!(
                "{} IN (SELECT {} FROM {} WHERE {})",
                ident(edge.column()),
                ident(target.id_column),
                ident(target.table),
                self.conjunction(Some(target), with)?
            ));
        }

        let mut condition = format!("{} IS NOT NULL", ident(edge.column()));
        if !with.is_empty() {
            condition.push_str(" AND ");
            condition.push_str(&self.conjunction(Some(target), with)?);
        }
        Ok(format!(
            "{} IN (SELECT {} FROM {} WHERE {})",
            ident(entity.id_column),
            ident(edge.column()),
            ident(target.table),
            condition
        ))
    }

    /// INSERT of explicit columns; `DEFAULT VALUES` when there are none.
    pub fn insert(&mut self, table: &str, values: &[(String, Value)]) -> String {
        if values.is_empty() {
            return format!("INSERT INTO {} DEFAULT VALUES", ident(table));
        }
        let columns: Vec<String> = values.iter().map(|(c, _)| ident(c)).collect();
        let placeholders: Vec<String> = values.iter().map(|(_, v)| self.bind(v.clone())).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            ident(table),
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    /// UPDATE with `None` assignments rendered as NULL.
    pub fn update(
        &mut self,
        entity: Option<&'static EntityType>,
        table: &str,
        assignments: &[(String, Option<Value>)],
        predicates: &[Predicate],
    ) -> Result<String> {
        if assignments.is_empty() {
            return Err(OrmError::InvalidQuery(format!("empty update on {}", table)));
        }
        let mut sets = Vec::with_capacity(assignments.len());
        for (column, value) in assignments {
            Self::check_column(entity, column)?;
            let rhs = match value {
                Some(v) => self.bind(v.clone()),
                None => "NULL".to_string(),
            };
            sets.push(format!("{} = {}", ident(column), rhs));
        }
        let mut sql = format!("UPDATE {} SET {}", ident(table), sets.join(", "));
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conjunction(entity, predicates)?);
        }
        Ok(sql)
    }

    pub fn delete(
        &mut self,
        entity: Option<&'static EntityType>,
        table: &str,
        predicates: &[Predicate],
    ) -> Result<String> {
        let mut sql = format!("DELETE FROM {}", ident(table));
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conjunction(entity, predicates)?);
        }
        Ok(sql)
    }
}

/// Render a SELECT and its arguments.
pub(crate) fn render_select(dialect: Dialect, spec: &QuerySpec) -> Result<(String, Vec<Value>)> {
    let mut builder = SqlBuilder::new(dialect);
    let sql = builder.select(spec)?;
    Ok((sql, builder.into_args()))
}

/// Render a COUNT and its arguments.
pub(crate) fn render_count(dialect: Dialect, spec: &QuerySpec) -> Result<(String, Vec<Value>)> {
    let mut builder = SqlBuilder::new(dialect);
    let sql = builder.count(spec)?;
    Ok((sql, builder.into_args()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::filters::{eq, has_prefix, id_in, or};
    use crate::orm::traits::{Column, FieldType, IdKind};
    use pretty_assertions::assert_eq;

    static ITEM: EntityType = EntityType {
        name: "Item",
        label: "item",
        table: "items",
        id_kind: IdKind::Int,
        id_column: "id",
        columns: &[Column::new("name", FieldType::String)],
        foreign_keys: &["owner_id"],
        edges: &[],
    };

    fn spec() -> QuerySpec {
        QuerySpec {
            entity: Some(&ITEM),
            table: ITEM.table,
            columns: vec!["id".into(), "name".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_offset_without_limit_gets_implicit_limit() {
        let mut s = spec();
        s.offset = Some(5);
        let (sql, _) = render_select(Dialect::Sqlite, &s).unwrap();
        assert_eq!(
            sql,
            format!("SELECT \"id\", \"name\" FROM \"items\" LIMIT {} OFFSET 5", IMPLICIT_LIMIT)
        );
    }

    #[test]
    fn test_arguments_follow_placeholder_order() {
        let mut s = spec();
        s.predicates = vec![
            eq("name", "a"),
            or(vec![id_in([1, 2]), has_prefix("name", "b")]),
        ];
        let (sql, args) = render_select(Dialect::Postgres, &s).unwrap();
        assert_eq!(
            sql,
            "SELECT \"id\", \"name\" FROM \"items\" WHERE \"name\" = $1 AND (\"id\" IN ($2, $3) OR \"name\" LIKE $4 ESCAPE '\\')"
        );
        assert_eq!(
            args,
            vec![Value::from("a"), Value::Int(1), Value::Int(2), Value::from("b%")]
        );
    }

    #[test]
    fn test_unknown_column_is_rejected() {
        let mut s = spec();
        s.predicates = vec![eq("nope", 1)];
        assert!(matches!(
            render_select(Dialect::Sqlite, &s),
            Err(OrmError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_empty_membership() {
        let mut s = spec();
        s.predicates = vec![id_in(Vec::<i64>::new())];
        let (sql, args) = render_select(Dialect::Sqlite, &s).unwrap();
        assert!(sql.ends_with("WHERE 1 = 0"));
        assert!(args.is_empty());
    }

    #[test]
    fn test_windowed_count() {
        let mut s = spec();
        s.limit = Some(3);
        let (sql, _) = render_count(Dialect::Sqlite, &s).unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM (SELECT \"id\", \"name\" FROM \"items\" LIMIT 3) AS \"t1\""
        );
    }

    #[test]
    fn test_update_binds_sets_before_predicates() {
        let mut b = SqlBuilder::new(Dialect::Postgres);
        let sql = b
            .update(
                Some(&ITEM),
                "items",
                &[("name".into(), Some(Value::from("x"))), ("owner_id".into(), None)],
                &[eq("name", "y")],
            )
            .unwrap();
        assert_eq!(
            sql,
            "UPDATE \"items\" SET \"name\" = $1, \"owner_id\" = NULL WHERE \"name\" = $2"
        );
        assert_eq!(b.into_args(), vec![Value::from("x"), Value::from("y")]);
    }
}
