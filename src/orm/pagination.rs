//! Cursor pagination over entity queries
//!
//! Relay-style connections keyed on the id column. A cursor names the id of
//! an edge's node, so a page boundary stays put when earlier rows are
//! inserted or deleted. `PageInfo` is a GraphQL object so resolvers can
//! return it directly.

use async_graphql::SimpleObject;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use super::builder::Query;
use super::filters::{asc, desc, gt, lt};
use super::record::Record;
use crate::error::{OrmError, Result};
use crate::value::Value;

/// Information about pagination in a connection
#[derive(SimpleObject, Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    /// When paginating forwards, are there more items?
    pub has_next_page: bool,
    /// When paginating backwards, are there more items?
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

/// An edge in a connection, containing a node and its cursor
#[derive(Debug, Clone)]
pub struct Edge<T> {
    pub node: T,
    pub cursor: String,
}

/// A page of results
#[derive(Debug, Clone)]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
}

impl<T> Connection<T> {
    pub fn empty() -> Self {
        Self {
            edges: Vec::new(),
            page_info: PageInfo::default(),
        }
    }

    /// Convert the nodes, keeping cursors and page info.
    pub fn try_map<U>(self, f: impl Fn(T) -> Result<U>) -> Result<Connection<U>> {
        let edges = self
            .edges
            .into_iter()
            .map(|e| {
                Ok(Edge {
                    node: f(e.node)?,
                    cursor: e.cursor,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Connection {
            edges,
            page_info: self.page_info,
        })
    }

    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|e| &e.node)
    }
}

impl Connection<Record> {
    fn from_records(records: Vec<Record>, has_next_page: bool, has_previous_page: bool) -> Self {
        let edges: Vec<Edge<Record>> = records
            .into_iter()
            .map(|node| Edge {
                cursor: encode_cursor(node.id()),
                node,
            })
            .collect();

        let page_info = PageInfo {
            has_next_page,
            has_previous_page,
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
        };

        Self { edges, page_info }
    }
}

/// Encode an id as a cursor string
pub fn encode_cursor(id: &Value) -> String {
    BASE64.encode(format!("cursor:{}", id.to_json()))
}

/// Decode a cursor string to the id it names
pub fn decode_cursor(cursor: &str) -> Result<Value, &'static str> {
    let decoded = BASE64.decode(cursor).map_err(|_| "invalid cursor format")?;

    let s = String::from_utf8(decoded).map_err(|_| "invalid cursor encoding")?;

    let Some(value) = s.strip_prefix("cursor:") else {
        return Err("invalid cursor prefix");
    };

    match serde_json::from_str(value).map_err(|_| "invalid cursor value")? {
        serde_json::Value::Number(n) => n.as_i64().map(Value::Int).ok_or("invalid cursor value"),
        serde_json::Value::String(s) => Ok(Value::String(s)),
        _ => Err("invalid cursor value"),
    }
}

fn page_size(size: Option<i64>) -> Result<Option<u64>> {
    match size {
        Some(n) if n < 0 => Err(OrmError::InvalidPagination),
        Some(n) => Ok(Some(n as u64)),
        None => Ok(None),
    }
}

fn cursor_id(cursor: Option<&str>) -> Result<Option<Value>> {
    cursor
        .map(|c| {
            decode_cursor(c).map_err(|e| {
                tracing::debug!(cursor = c, error = e, "Rejected pagination cursor");
                OrmError::InvalidPagination
            })
        })
        .transpose()
}

impl Query {
    /// One page of records ordered by id.
    ///
    /// `after`/`before` bound the ids exclusively; `first` takes from the
    /// front and `last` from the back. Without either, every row between the
    /// cursors is returned.
    pub async fn paginate(
        self,
        after: Option<&str>,
        first: Option<i64>,
        before: Option<&str>,
        last: Option<i64>,
    ) -> Result<Connection<Record>> {
        if first.is_some() && last.is_some() {
            return Err(OrmError::InvalidPagination);
        }
        let first = page_size(first)?;
        let last = page_size(last)?;
        if first == Some(0) || last == Some(0) {
            return Ok(Connection::empty());
        }

        let id_column = self.entity().id_column;
        let mut query = self;
        if let Some(id) = cursor_id(after)? {
            query = query.filter(gt(id_column, id));
        }
        if let Some(id) = cursor_id(before)? {
            query = query.filter(lt(id_column, id));
        }
        if let Some(n) = first {
            query = query.order(asc(id_column)).limit(n + 1);
        }
        if let Some(n) = last {
            query = query.order(desc(id_column)).limit(n + 1);
        }

        let mut records = query.all().await?;
        if records.is_empty() {
            return Ok(Connection::empty());
        }
        if last.is_some() {
            records.reverse();
        }

        let mut has_next_page = false;
        let mut has_previous_page = false;
        if let Some(n) = first.filter(|n| records.len() as u64 > *n) {
            has_next_page = true;
            records.truncate(n as usize);
        } else if let Some(n) = last.filter(|n| records.len() as u64 > *n) {
            has_previous_page = true;
            records.drain(..records.len() - n as usize);
        }

        Ok(Connection::from_records(records, has_next_page, has_previous_page))
    }
}
