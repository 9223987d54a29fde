//! Predicates and ordering for entity queries
//!
//! Filters are plain data: they are rendered to parameterized SQL only when a
//! query executes, so a builder can be cloned and extended freely.
//!
//! ```rust,ignore
//! use entgraph::orm::filters::*;
//!
//! let q = client
//!     .query(&LOCATION)
//!     .filter(and(vec![has_prefix("name", "Build"), not_null("parent_id")]))
//!     .order(desc("name"));
//! ```

use super::builder::QuerySpec;
use super::traits::OrderDirection;
use crate::value::Value;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    pub fn to_sql(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
        }
    }
}

/// A filter over one entity type's rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        op: CmpOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
        negate: bool,
    },
    Null {
        column: String,
        negate: bool,
    },
    /// LIKE with an already escaped pattern.
    Like {
        column: String,
        pattern: String,
    },
    /// Primary key membership, whatever the key column is called.
    IdIn(Vec<Value>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    /// Rows with at least one neighbor on `edge` (matching `with`, if any).
    HasEdge {
        edge: String,
        with: Vec<Predicate>,
    },
    /// `column IN (SELECT ...)`, used for edge traversal.
    InSelect {
        column: String,
        select: Box<QuerySpec>,
    },
}

fn compare(column: &str, op: CmpOp, value: impl Into<Value>) -> Predicate {
    Predicate::Compare {
        column: column.to_string(),
        op,
        value: value.into(),
    }
}

pub fn eq(column: &str, value: impl Into<Value>) -> Predicate {
    compare(column, CmpOp::Eq, value)
}

pub fn ne(column: &str, value: impl Into<Value>) -> Predicate {
    compare(column, CmpOp::Ne, value)
}

pub fn gt(column: &str, value: impl Into<Value>) -> Predicate {
    compare(column, CmpOp::Gt, value)
}

pub fn gte(column: &str, value: impl Into<Value>) -> Predicate {
    compare(column, CmpOp::Gte, value)
}

pub fn lt(column: &str, value: impl Into<Value>) -> Predicate {
    compare(column, CmpOp::Lt, value)
}

pub fn lte(column: &str, value: impl Into<Value>) -> Predicate {
    compare(column, CmpOp::Lte, value)
}

pub fn is_in<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Predicate {
    Predicate::In {
        column: column.to_string(),
        values: values.into_iter().map(Into::into).collect(),
        negate: false,
    }
}

pub fn not_in<V: Into<Value>>(column: &str, values: impl IntoIterator<Item = V>) -> Predicate {
    Predicate::In {
        column: column.to_string(),
        values: values.into_iter().map(Into::into).collect(),
        negate: true,
    }
}

pub fn is_null(column: &str) -> Predicate {
    Predicate::Null {
        column: column.to_string(),
        negate: false,
    }
}

pub fn not_null(column: &str) -> Predicate {
    Predicate::Null {
        column: column.to_string(),
        negate: true,
    }
}

/// Escape LIKE wildcards so user text matches literally.
fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub fn contains(column: &str, needle: &str) -> Predicate {
    Predicate::Like {
        column: column.to_string(),
        pattern: format!("%{}%", escape_like(needle)),
    }
}

pub fn has_prefix(column: &str, prefix: &str) -> Predicate {
    Predicate::Like {
        column: column.to_string(),
        pattern: format!("{}%", escape_like(prefix)),
    }
}

pub fn has_suffix(column: &str, suffix: &str) -> Predicate {
    Predicate::Like {
        column: column.to_string(),
        pattern: format!("%{}", escape_like(suffix)),
    }
}

pub fn id_eq(id: impl Into<Value>) -> Predicate {
    Predicate::IdIn(vec![id.into()])
}

pub fn id_in<V: Into<Value>>(ids: impl IntoIterator<Item = V>) -> Predicate {
    Predicate::IdIn(ids.into_iter().map(Into::into).collect())
}

pub fn and(predicates: Vec<Predicate>) -> Predicate {
    Predicate::And(predicates)
}

pub fn or(predicates: Vec<Predicate>) -> Predicate {
    Predicate::Or(predicates)
}

pub fn not(predicate: Predicate) -> Predicate {
    Predicate::Not(Box::new(predicate))
}

pub fn has_edge(edge: &str) -> Predicate {
    Predicate::HasEdge {
        edge: edge.to_string(),
        with: Vec::new(),
    }
}

pub fn has_edge_with(edge: &str, with: Vec<Predicate>) -> Predicate {
    Predicate::HasEdge {
        edge: edge.to_string(),
        with,
    }
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: OrderDirection,
}

pub fn asc(column: &str) -> Order {
    Order {
        column: column.to_string(),
        direction: OrderDirection::Asc,
    }
}

pub fn desc(column: &str) -> Order {
    Order {
        column: column.to_string(),
        direction: OrderDirection::Desc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_patterns_escape_wildcards() {
        assert_eq!(
            contains("name", "50%_off"),
            Predicate::Like {
                column: "name".into(),
                pattern: "%50\\%\\_off%".into()
            }
        );
        assert_eq!(
            has_prefix("name", "a"),
            Predicate::Like {
                column: "name".into(),
                pattern: "a%".into()
            }
        );
    }

    #[test]
    fn test_in_collects_values() {
        assert_eq!(
            is_in("id", [1, 2]),
            Predicate::In {
                column: "id".into(),
                values: vec![Value::Int(1), Value::Int(2)],
                negate: false
            }
        );
    }
}
