//! Group-by and projection builders
//!
//! Both wrap a [`Query`] and reuse its predicates. Results come back as raw
//! [`Rows`], or as a flat list through the single-column helpers
//! (`strings`, `ints`, `floats`, `bools`), which fail when more than one
//! column is projected.

use super::builder::Query;
use super::sql::ident;
use crate::db::Rows;
use crate::error::{OrmError, Result};
use crate::value::FromValue;

/// Aggregate function applied to a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
}

impl Aggregate {
    pub fn to_sql(&self) -> String {
        match self {
            Aggregate::Count => "COUNT(*)".to_string(),
            Aggregate::Sum(c) => format!("SUM({})", ident(c)),
            Aggregate::Avg(c) => format!("AVG({})", ident(c)),
            Aggregate::Min(c) => format!("MIN({})", ident(c)),
            Aggregate::Max(c) => format!("MAX({})", ident(c)),
        }
    }

    fn column(&self) -> Option<&str> {
        match self {
            Aggregate::Count => None,
            Aggregate::Sum(c) | Aggregate::Avg(c) | Aggregate::Min(c) | Aggregate::Max(c) => {
                Some(c.as_str())
            }
        }
    }
}

pub fn count() -> Aggregate {
    Aggregate::Count
}

pub fn sum(column: &str) -> Aggregate {
    Aggregate::Sum(column.to_string())
}

pub fn avg(column: &str) -> Aggregate {
    Aggregate::Avg(column.to_string())
}

pub fn min(column: &str) -> Aggregate {
    Aggregate::Min(column.to_string())
}

pub fn max(column: &str) -> Aggregate {
    Aggregate::Max(column.to_string())
}

fn single_column(projected: usize, helper: &str, builder: &str) -> Result<()> {
    if projected > 1 {
        return Err(OrmError::InvalidQuery(format!(
            "{}.{} is not achievable when selecting more than 1 field",
            builder, helper
        )));
    }
    Ok(())
}

fn column_of<T: FromValue>(rows: Rows) -> Result<Vec<T>> {
    rows.rows
        .into_iter()
        .map(|row| match row.first() {
            Some(v) => T::from_value(v),
            None => Err(OrmError::InvalidQuery("empty row".to_string())),
        })
        .collect()
}

// ============================================================================
// GroupBy
// ============================================================================

/// GROUP BY over one or more columns with optional aggregates.
#[derive(Debug, Clone)]
pub struct GroupBy {
    query: Query,
    fields: Vec<String>,
    aggregates: Vec<Aggregate>,
}

impl GroupBy {
    pub(crate) fn new(query: Query, fields: Vec<String>) -> Self {
        Self {
            query,
            fields,
            aggregates: Vec::new(),
        }
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregates.push(aggregate);
        self
    }

    fn validate(&self) -> Result<()> {
        let entity = self.query.entity();
        if self.fields.is_empty() {
            return Err(OrmError::InvalidQuery(
                "group-by requires at least one field".to_string(),
            ));
        }
        for field in &self.fields {
            entity.require_column(field)?;
        }
        for column in self.aggregates.iter().filter_map(|a| a.column()) {
            entity.require_column(column)?;
        }
        Ok(())
    }

    /// Grouped rows: the group columns followed by the aggregates.
    pub async fn scan(self) -> Result<Rows> {
        self.validate()?;
        let spec = self.query.grouped(&self.fields, &self.aggregates);
        self.query.run_spec(&spec).await
    }

    async fn scalars<T: FromValue>(self, helper: &str) -> Result<Vec<T>> {
        single_column(self.fields.len() + self.aggregates.len(), helper, "GroupBy")?;
        column_of(self.scan().await?)
    }

    pub async fn strings(self) -> Result<Vec<String>> {
        self.scalars("strings").await
    }

    pub async fn ints(self) -> Result<Vec<i64>> {
        self.scalars("ints").await
    }

    pub async fn floats(self) -> Result<Vec<f64>> {
        self.scalars("floats").await
    }

    pub async fn bools(self) -> Result<Vec<bool>> {
        self.scalars("bools").await
    }
}

// ============================================================================
// Select
// ============================================================================

/// Projection of explicit columns.
#[derive(Debug, Clone)]
pub struct Select {
    query: Query,
    fields: Vec<String>,
}

impl Select {
    pub(crate) fn new(query: Query, fields: Vec<String>) -> Self {
        Self { query, fields }
    }

    pub async fn scan(self) -> Result<Rows> {
        if self.fields.is_empty() {
            return Err(OrmError::InvalidQuery(
                "select requires at least one field".to_string(),
            ));
        }
        for field in &self.fields {
            self.query.entity().require_column(field)?;
        }
        let mut spec = self.query.projection(&self.fields[0]);
        spec.columns = self.fields.clone();
        self.query.run_spec(&spec).await
    }

    async fn scalars<T: FromValue>(self, helper: &str) -> Result<Vec<T>> {
        single_column(self.fields.len(), helper, "Select")?;
        column_of(self.scan().await?)
    }

    pub async fn strings(self) -> Result<Vec<String>> {
        self.scalars("strings").await
    }

    pub async fn ints(self) -> Result<Vec<i64>> {
        self.scalars("ints").await
    }

    pub async fn floats(self) -> Result<Vec<f64>> {
        self.scalars("floats").await
    }

    pub async fn bools(self) -> Result<Vec<bool>> {
        self.scalars("bools").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_sql() {
        assert_eq!(count().to_sql(), "COUNT(*)");
        assert_eq!(sum("price").to_sql(), "SUM(\"price\")");
        assert_eq!(avg("price").to_sql(), "AVG(\"price\")");
    }

    #[test]
    fn test_single_column_guard() {
        assert!(single_column(1, "strings", "GroupBy").is_ok());
        let err = single_column(2, "strings", "GroupBy").unwrap_err();
        assert!(err.to_string().contains("more than 1 field"));
    }
}
