//! Table registry, global-id resolution and node introspection

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use entgraph::orm::filters::eq;
use entgraph::{
    Client, Dialect, Driver, ExecResult, GlobalId, OrmError, Rows, Selection, TableRegistry, Tx,
    Value,
};
use pretty_assertions::assert_eq;

use common::{LOCATION, client, schema, seed};

/// Serves the type table, counting loads.
#[derive(Default)]
struct TypeTableDriver {
    loads: AtomicUsize,
    fail_next: AtomicBool,
    delay: Duration,
}

#[async_trait]
impl Driver for TypeTableDriver {
    async fn exec(&self, _query: &str, _args: &[Value]) -> entgraph::Result<ExecResult> {
        Ok(ExecResult::default())
    }

    async fn query(&self, query: &str, _args: &[Value]) -> entgraph::Result<Rows> {
        assert!(query.contains("ent_types"), "unexpected query: {query}");
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(OrmError::InvalidQuery("type table unavailable".into()));
        }
        Ok(Rows::new(
            vec!["type".into()],
            ["location_types", "locations", "equipment", "tags"]
                .iter()
                .map(|t| vec![Value::from(*t)])
                .collect(),
        ))
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn tx(&self) -> entgraph::Result<Arc<dyn Tx>> {
        Err(OrmError::InvalidQuery("no transactions".into()))
    }

    async fn close(&self) -> entgraph::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Table registry
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cold_start_loads_once() {
    let driver = Arc::new(TypeTableDriver {
        delay: Duration::from_millis(50),
        ..Default::default()
    });
    let registry = Arc::new(TableRegistry::new("ent_types"));

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let driver = driver.clone();
            let registry = registry.clone();
            tokio::spawn(async move { registry.load(driver.as_ref()).await })
        })
        .collect();

    let mut lists = Vec::with_capacity(handles.len());
    for handle in handles {
        lists.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(driver.loads.load(Ordering::SeqCst), 1);
    assert!(lists.iter().all(|l| Arc::ptr_eq(l, &lists[0])));
    assert_eq!(lists[0].len(), 4);
    assert_eq!(lists[0][1], "locations");
}

#[tokio::test]
async fn test_failed_load_is_retried() {
    let driver = TypeTableDriver::default();
    driver.fail_next.store(true, Ordering::SeqCst);
    let registry = TableRegistry::new("ent_types");

    assert_matches!(registry.load(&driver).await, Err(OrmError::InvalidQuery(_)));
    assert!(registry.cached().is_none());

    let tables = registry.load(&driver).await.unwrap();
    assert_eq!(tables.len(), 4);
    registry.load(&driver).await.unwrap();
    assert_eq!(driver.loads.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Resolver
// ============================================================================

#[tokio::test]
async fn test_noder_resolves_any_table() {
    let client = client().await;
    let inv = seed(&client).await;

    let id: i64 = inv.room_a.id_as().unwrap();
    let record = client.noder(id, None).await.unwrap();
    assert_eq!(record.entity().name, "Location");
    assert_eq!(record.get::<String>("name").unwrap(), "Room A");

    let type_id: i64 = inv.room_type.id_as().unwrap();
    let record = client.noder(type_id, None).await.unwrap();
    assert_eq!(record.entity().name, "LocationType");

    let resolved = client.noders(&[type_id, id], None).await.unwrap();
    assert_eq!(resolved[1].id(), inv.room_a.id());
}

#[tokio::test]
async fn test_noder_out_of_range_is_unknown() {
    let client = client().await;
    seed(&client).await;

    let id = GlobalId::encode(42, 1).unwrap();
    let err = client.noder(id, None).await.unwrap_err();
    assert!(err.is_unknown_table());
    assert_eq!(err.to_string(), "entgraph: invalid/unknown not found");
}

#[tokio::test]
async fn test_noder_missing_row_is_not_found() {
    let client = client().await;
    seed(&client).await;

    let id = GlobalId::encode(1, 999_999).unwrap();
    assert_matches!(
        client.noder(id, None).await,
        Err(OrmError::NotFound { label }) if label == "location"
    );
}

#[tokio::test]
async fn test_noder_applies_selection() {
    let client = client().await;
    let inv = seed(&client).await;

    let selection = vec![Selection::with_children(
        "parentLocation",
        vec![Selection::new("name")],
    )];
    let id: i64 = inv.room_b.id_as().unwrap();
    let record = client.noder(id, Some(&selection)).await.unwrap();
    let parent = record.edge_one("parent").unwrap().unwrap();
    assert_eq!(parent.get::<String>("name").unwrap(), "Floor 1");
}

#[tokio::test]
async fn test_node_introspection() {
    let client = client().await;
    let inv = seed(&client).await;

    let id: i64 = inv.room_a.id_as().unwrap();
    let node = client.node(id).await.unwrap();

    assert_eq!(node.node_type, "Location");
    assert_eq!(node.id, serde_json::json!(id));

    let name = node.fields.iter().find(|f| f.name == "name").unwrap();
    assert_eq!(name.field_type, "string");
    assert_eq!(name.value, "\"Room A\"");
    let latitude = node.fields.iter().find(|f| f.name == "latitude").unwrap();
    assert_eq!(latitude.value, "null");

    let edge = |name: &str| node.edges.iter().find(|e| e.name == name).unwrap();
    assert_eq!(edge("parent").ids, vec![inv.floor.id().to_json()]);
    assert_eq!(edge("parent").node_type, "Location");
    assert_eq!(edge("equipment").ids.len(), 2);
    assert_eq!(edge("tags").ids.len(), 2);
    assert!(edge("children").ids.is_empty());

    let json = serde_json::to_value(&node).unwrap();
    assert_eq!(json["type"], "Location");
}

// ============================================================================
// Debug driver and cancellation
// ============================================================================

#[tokio::test]
async fn test_debug_client_forwards() {
    let client = client().await;
    seed(&client).await;

    let debug = client.debug();
    let hq = debug.query(&LOCATION).filter(eq("name", "HQ")).only().await.unwrap();
    assert_eq!(hq.get::<f64>("latitude").unwrap(), 32.1);
}

#[tokio::test]
async fn test_timeout_cancels_slow_driver_call() {
    let driver = Arc::new(TypeTableDriver {
        delay: Duration::from_secs(30),
        ..Default::default()
    });
    let client = Client::new(driver.clone(), schema());

    let result = tokio::time::timeout(Duration::from_millis(20), client.noder(1, None)).await;
    assert!(result.is_err());
    assert_eq!(driver.loads.load(Ordering::SeqCst), 1);
    assert!(client.tables().cached().is_none());
}
