//! Eager loading of edges
//!
//! Each edge is loaded with one extra query per level, batched over all
//! parent records. The neighbor query is the sub-query attached through
//! `with_edge`, so its own predicates and nested eager loads apply.

use std::collections::{HashMap, HashSet};

use super::builder::{Query, QuerySpec};
use super::filters::Predicate;
use super::record::{Loaded, Record};
use super::sql::render_select;
use super::traits::{EdgeDef, Rel};
use crate::error::{OrmError, Result};
use crate::value::Value;

/// Hashable form of an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Int(i64),
    Str(String),
}

fn key(value: &Value) -> Option<Key> {
    match value {
        Value::Int(i) => Some(Key::Int(*i)),
        Value::Bool(b) => Some(Key::Int(*b as i64)),
        Value::String(s) => Some(Key::Str(s.clone())),
        _ => None,
    }
}

fn unexpected(edge: &EdgeDef, value: &Value) -> OrmError {
    OrmError::InvalidQuery(format!(
        "unexpected foreign-key {:?} returned while loading edge {:?}",
        value, edge.name
    ))
}

pub(crate) async fn load_edge(
    nodes: &mut [Record],
    edge: &'static EdgeDef,
    query: Query,
) -> Result<()> {
    tracing::trace!(edge = edge.name, parents = nodes.len(), "Eager loading edge");
    if edge.rel == Rel::M2M {
        load_many_to_many(nodes, edge, query).await
    } else if edge.fk_on_self() {
        load_owners(nodes, edge, query).await
    } else {
        load_dependents(nodes, edge, query).await
    }
}

fn empty(edge: &EdgeDef) -> Loaded {
    if edge.is_unique() {
        Loaded::One(None)
    } else {
        Loaded::Many(Vec::new())
    }
}

/// Foreign key on the parent rows: collect the keys and fetch by id.
async fn load_owners(nodes: &mut [Record], edge: &'static EdgeDef, query: Query) -> Result<()> {
    let mut ids = Vec::new();
    let mut requested = HashSet::new();
    for node in nodes.iter_mut() {
        if let Some(fk) = node.fk(edge.column()) {
            if let Some(k) = key(fk) {
                if requested.insert(k) {
                    ids.push(fk.clone());
                }
            }
        }
        node.set_edge(edge.name, empty(edge));
    }
    if ids.is_empty() {
        return Ok(());
    }

    let neighbors = query.filter(Predicate::IdIn(ids)).load().await?;
    let mut by_id = HashMap::with_capacity(neighbors.len());
    for neighbor in neighbors {
        let k = key(neighbor.id())
            .filter(|k| requested.contains(k))
            .ok_or_else(|| unexpected(edge, neighbor.id()))?;
        by_id.insert(k, neighbor);
    }

    for node in nodes.iter_mut() {
        let neighbor = node
            .fk(edge.column())
            .and_then(key)
            .and_then(|k| by_id.get(&k))
            .cloned();
        if let Some(neighbor) = neighbor {
            node.push_edge(edge.name, neighbor);
        }
    }
    Ok(())
}

/// Foreign key on the neighbor rows: select neighbors whose key points at
/// one of the parents and group them.
async fn load_dependents(
    nodes: &mut [Record],
    edge: &'static EdgeDef,
    query: Query,
) -> Result<()> {
    let mut index = HashMap::with_capacity(nodes.len());
    let mut ids = Vec::with_capacity(nodes.len());
    for (i, node) in nodes.iter_mut().enumerate() {
        if let Some(k) = key(node.id()) {
            index.insert(k, i);
            ids.push(node.id().clone());
        }
        node.set_edge(edge.name, empty(edge));
    }

    let neighbors = query
        .with_fks(true)
        .filter(Predicate::In {
            column: edge.column().to_string(),
            values: ids,
            negate: false,
        })
        .load()
        .await?;

    for neighbor in neighbors {
        let fk = neighbor.fk(edge.column()).cloned().unwrap_or_default();
        if fk.is_null() {
            return Err(OrmError::InvalidQuery(format!(
                "foreign-key {:?} is nil for node {}",
                edge.column(),
                neighbor.id()
            )));
        }
        let i = key(&fk)
            .and_then(|k| index.get(&k).copied())
            .ok_or_else(|| unexpected(edge, &fk))?;
        nodes[i].push_edge(edge.name, neighbor);
    }
    Ok(())
}

/// Join table between parents and neighbors.
async fn load_many_to_many(
    nodes: &mut [Record],
    edge: &'static EdgeDef,
    query: Query,
) -> Result<()> {
    let mut index = HashMap::with_capacity(nodes.len());
    let mut ids = Vec::with_capacity(nodes.len());
    for (i, node) in nodes.iter_mut().enumerate() {
        if let Some(k) = key(node.id()) {
            index.insert(k, i);
            ids.push(node.id().clone());
        }
        node.set_edge(edge.name, Loaded::Many(Vec::new()));
    }

    let join = QuerySpec {
        table: edge.table,
        columns: vec![edge.column().to_string(), edge.target_column().to_string()],
        predicates: vec![Predicate::In {
            column: edge.column().to_string(),
            values: ids,
            negate: false,
        }],
        ..Default::default()
    };
    let (sql, args) = render_select(query.config().driver.dialect(), &join)?;
    let pairs = query.run(&sql, &args).await?;

    let mut targets = Vec::new();
    let mut seen = HashSet::new();
    let mut links = Vec::with_capacity(pairs.len());
    for row in &pairs.rows {
        let (Some(owner), Some(target)) = (row.first(), row.get(1)) else {
            return Err(OrmError::scan_mismatch(edge.table, "expected 2 columns"));
        };
        let owner = key(owner)
            .and_then(|k| index.get(&k).copied())
            .ok_or_else(|| unexpected(edge, owner))?;
        let Some(target_key) = key(target) else {
            continue;
        };
        if seen.insert(target_key.clone()) {
            targets.push(target.clone());
        }
        links.push((owner, target_key));
    }
    if targets.is_empty() {
        return Ok(());
    }

    let neighbors = query.filter(Predicate::IdIn(targets)).load().await?;
    let by_id: HashMap<Key, Record> = neighbors
        .into_iter()
        .filter_map(|n| key(n.id()).map(|k| (k, n)))
        .collect();

    for (owner, target) in links {
        // Neighbors filtered out by the sub-query's predicates are skipped.
        if let Some(neighbor) = by_id.get(&target) {
            nodes[owner].push_edge(edge.name, neighbor.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_distinguish_kinds() {
        assert_eq!(key(&Value::Int(1)), Some(Key::Int(1)));
        assert_eq!(key(&Value::from("1")), Some(Key::Str("1".into())));
        assert_ne!(key(&Value::Int(1)), key(&Value::from("1")));
        assert_eq!(key(&Value::Null), None);
    }
}
