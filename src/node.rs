//! Global identifiers and the node resolver
//!
//! Integer ids are global: each entity table owns a range of
//! `2^32 - 1` ids, selected by the table's position in the type table.
//! Given only an id, [`Client::noder`] finds the table and loads the record
//! through that table's query builder.

use serde::Serialize;

use crate::client::Client;
use crate::error::{OrmError, Result, UNKNOWN_LABEL};
use crate::orm::filters::id_eq;
use crate::orm::{FieldType, Record, Selection};
use crate::value::Value;

/// Size of each table's id range.
pub const TABLE_SPACE: i64 = (1 << 32) - 1;

/// Encoding of `(table_index, seq)` pairs into global ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalId;

impl GlobalId {
    pub fn encode(table_index: i64, seq: i64) -> Result<i64> {
        if table_index < 0 || !(0..TABLE_SPACE).contains(&seq) {
            return Err(OrmError::InvalidQuery(format!(
                "global id out of range: table {} seq {}",
                table_index, seq
            )));
        }
        table_index
            .checked_mul(TABLE_SPACE)
            .and_then(|base| base.checked_add(seq))
            .ok_or_else(|| OrmError::InvalidQuery(format!("table index {} overflows", table_index)))
    }

    /// Split an id into `(table_index, seq)`.
    pub fn decode(id: i64) -> (i64, i64) {
        (id / TABLE_SPACE, id % TABLE_SPACE)
    }

    pub fn table_index(id: i64) -> i64 {
        id / TABLE_SPACE
    }
}

// ============================================================================
// Introspection
// ============================================================================

/// Generic view of a record: fields as JSON and neighbor ids per edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: serde_json::Value,
    #[serde(rename = "type")]
    pub node_type: String,
    pub fields: Vec<NodeField>,
    pub edges: Vec<NodeEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeField {
    #[serde(rename = "type")]
    pub field_type: String,
    pub name: String,
    /// JSON-encoded value.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeEdge {
    #[serde(rename = "type")]
    pub node_type: String,
    pub name: String,
    pub ids: Vec<serde_json::Value>,
}

fn field_json(field_type: FieldType, value: &Value) -> Result<String> {
    let json = match (field_type, value) {
        // Stored as JSON text already.
        (FieldType::Json, Value::String(s)) => serde_json::from_str(s)
            .map_err(|e| OrmError::scan_mismatch("json", e.to_string()))?,
        (_, v) => v.to_json(),
    };
    serde_json::to_string(&json).map_err(|e| OrmError::InvalidQuery(e.to_string()))
}

impl Record {
    /// Introspect the record. Edge ids are queried through the record's
    /// driver.
    pub async fn node(&self) -> Result<Node> {
        let entity = self.entity();
        let mut fields = Vec::with_capacity(entity.columns.len());
        for (column, value) in entity.columns.iter().zip(self.values().map(|(_, v)| v)) {
            fields.push(NodeField {
                field_type: column.field_type.name().to_string(),
                name: column.name.to_string(),
                value: field_json(column.field_type, value)?,
            });
        }

        let mut edges = Vec::with_capacity(entity.edges.len());
        for edge in entity.edges {
            let ids = self.query_edge(edge.name)?.ids().await?;
            edges.push(NodeEdge {
                node_type: edge.target().name.to_string(),
                name: edge.name.to_string(),
                ids: ids.iter().map(Value::to_json).collect(),
            });
        }

        Ok(Node {
            id: self.id().to_json(),
            node_type: entity.name.to_string(),
            fields,
            edges,
        })
    }
}

// ============================================================================
// Resolver
// ============================================================================

impl Client {
    /// Load the record behind a global id, eager-loading the edges named in
    /// `selection`.
    pub async fn noder(&self, id: i64, selection: Option<&[Selection]>) -> Result<Record> {
        let tables = self.tables().load(self.driver().as_ref()).await?;
        let idx = GlobalId::table_index(id);
        let table = usize::try_from(idx)
            .ok()
            .and_then(|i| tables.get(i))
            .ok_or_else(|| OrmError::not_found(UNKNOWN_LABEL))?;
        let entity = self
            .schema()
            .by_table(table)
            .ok_or_else(|| OrmError::not_found(UNKNOWN_LABEL))?;

        tracing::trace!(id, table = %table, "Resolving node");
        let mut query = self.query(entity).filter(id_eq(id));
        if let Some(selection) = selection {
            query = query.collect_fields(selection);
        }
        query.only().await
    }

    /// Resolve several ids, in order.
    pub async fn noders(&self, ids: &[i64], selection: Option<&[Selection]>) -> Result<Vec<Record>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            records.push(self.noder(*id, selection).await?);
        }
        Ok(records)
    }

    /// Resolve and introspect.
    pub async fn node(&self, id: i64) -> Result<Node> {
        self.noder(id, None).await?.node().await
    }
}
