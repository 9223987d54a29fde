//! Query builder behavior against SQLite
//!
//! Covers single-row helpers, cloning, paging, aggregates, projections,
//! edge predicates and traversal.

mod common;

use assert_matches::assert_matches;
use entgraph::orm::filters::{asc, contains, desc, eq, gt, has_edge, has_edge_with, id_in, is_null, or};
use entgraph::orm::select::{count, max};
use entgraph::orm::sql::IMPLICIT_LIMIT;
use entgraph::{FromRecord, OrmError, Value};
use pretty_assertions::assert_eq;

use common::{EQUIPMENT, LOCATION, LOCATION_TYPE, TAG, client, names, seed};

// ============================================================================
// Single-row helpers
// ============================================================================

#[tokio::test]
async fn test_only_with_zero_one_and_two_rows() {
    let client = client().await;
    seed(&client).await;

    let none = client.query(&LOCATION).filter(eq("name", "Attic")).only().await;
    assert_matches!(none, Err(OrmError::NotFound { label }) if label == "location");

    let one = client
        .query(&LOCATION)
        .filter(eq("name", "Room A"))
        .only()
        .await
        .unwrap();
    assert_eq!(one.get::<String>("name").unwrap(), "Room A");
    assert_eq!(one.get::<Option<String>>("external_id").unwrap(), Some("A-1".to_string()));

    let two = client
        .query(&LOCATION)
        .filter(contains("name", "Room"))
        .only()
        .await;
    assert_matches!(two, Err(e) if e.is_not_singular());
}

#[tokio::test]
async fn test_first_and_ids() {
    let client = client().await;
    let inv = seed(&client).await;

    let first = client
        .query(&LOCATION)
        .order(desc("name"))
        .first()
        .await
        .unwrap();
    assert_eq!(first.get::<String>("name").unwrap(), "Room B");

    let missing = client.query(&LOCATION).filter(eq("name", "nope")).first_id().await;
    assert_matches!(missing, Err(e) if e.is_not_found());

    let id = client
        .query(&LOCATION)
        .filter(eq("name", "HQ"))
        .only_id()
        .await
        .unwrap();
    assert_eq!(&id, inv.building.id());

    let ids = client
        .query(&LOCATION)
        .filter(contains("name", "Room"))
        .order(asc("name"))
        .ids()
        .await
        .unwrap();
    assert_eq!(ids, vec![inv.room_a.id().clone(), inv.room_b.id().clone()]);
}

#[tokio::test]
async fn test_global_ids_encode_table_position() {
    let client = client().await;
    let inv = seed(&client).await;

    let type_id: i64 = inv.room_type.id_as().unwrap();
    let location_id: i64 = inv.building.id_as().unwrap();
    assert_eq!(entgraph::GlobalId::table_index(type_id), 0);
    assert_eq!(entgraph::GlobalId::table_index(location_id), 1);
}

// ============================================================================
// Cloning and paging
// ============================================================================

#[tokio::test]
async fn test_clone_is_independent() {
    let client = client().await;
    seed(&client).await;

    let base = client.query(&LOCATION).filter(contains("name", "Room")).limit(5);
    let forked = base.clone().limit(10).filter(eq("site_survey_needed", true));

    assert_eq!(base.spec().limit, Some(5));
    assert_eq!(base.spec().predicates.len(), 1);
    assert_eq!(forked.spec().limit, Some(10));
    assert_eq!(forked.spec().predicates.len(), 2);

    assert_eq!(base.count().await.unwrap(), 2);
    assert_eq!(forked.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_offset_without_limit() {
    let client = client().await;
    seed(&client).await;

    let query = client.query(&LOCATION).order(asc("name")).offset(2);
    let (sql, _) = query.to_sql().unwrap();
    assert!(sql.ends_with(&format!("LIMIT {} OFFSET 2", IMPLICIT_LIMIT)));

    let rest = query.all().await.unwrap();
    assert_eq!(names(&rest), vec!["Room A", "Room B"]);
}

#[tokio::test]
async fn test_count_and_exist() {
    let client = client().await;
    seed(&client).await;

    assert_eq!(client.query(&LOCATION).count().await.unwrap(), 4);
    assert_eq!(client.query(&LOCATION).limit(2).count().await.unwrap(), 2);
    assert!(client.query(&EQUIPMENT).exist().await.unwrap());
    assert!(!client
        .query(&EQUIPMENT)
        .filter(eq("name", "printer"))
        .exist()
        .await
        .unwrap());
}

fn page_names(page: &entgraph::orm::Connection<entgraph::Record>) -> Vec<String> {
    page.nodes().map(|r| r.get("name").unwrap()).collect()
}

#[tokio::test]
async fn test_paginate_forward_and_backward() {
    let client = client().await;
    seed(&client).await;

    let page = client
        .query(&LOCATION)
        .paginate(None, Some(3), None, None)
        .await
        .unwrap();
    assert_eq!(page_names(&page), vec!["HQ", "Floor 1", "Room A"]);
    assert!(page.page_info.has_next_page);
    assert!(!page.page_info.has_previous_page);

    let after = page.page_info.end_cursor.clone().unwrap();
    let rest = client
        .query(&LOCATION)
        .paginate(Some(&after), Some(3), None, None)
        .await
        .unwrap();
    assert_eq!(page_names(&rest), vec!["Room B"]);
    assert!(!rest.page_info.has_next_page);

    let before = rest.page_info.start_cursor.clone().unwrap();
    let back = client
        .query(&LOCATION)
        .paginate(None, None, Some(&before), Some(2))
        .await
        .unwrap();
    assert_eq!(page_names(&back), vec!["Floor 1", "Room A"]);
    assert!(back.page_info.has_previous_page);
    assert!(!back.page_info.has_next_page);

    let rooms = client
        .query(&LOCATION)
        .filter(contains("name", "Room"))
        .paginate(None, None, None, None)
        .await
        .unwrap();
    assert_eq!(page_names(&rooms), vec!["Room A", "Room B"]);
}

#[tokio::test]
async fn test_paginate_invalid_and_empty_pages() {
    let client = client().await;
    seed(&client).await;

    let both = client.query(&LOCATION).paginate(None, Some(1), None, Some(1)).await;
    assert_matches!(both, Err(OrmError::InvalidPagination));
    let negative = client.query(&LOCATION).paginate(None, Some(-1), None, None).await;
    assert_matches!(negative, Err(OrmError::InvalidPagination));
    let garbage = client.query(&LOCATION).paginate(Some("garbage"), Some(1), None, None).await;
    assert_matches!(garbage, Err(OrmError::InvalidPagination));

    let zero = client.query(&LOCATION).paginate(None, Some(0), None, None).await.unwrap();
    assert!(zero.edges.is_empty());
    assert_eq!(zero.page_info.end_cursor, None);

    let none = client
        .query(&LOCATION)
        .filter(eq("name", "Attic"))
        .paginate(None, Some(5), None, None)
        .await
        .unwrap();
    assert!(none.edges.is_empty());
}

#[tokio::test]
async fn test_paginate_large_pages_are_not_truncated() {
    let client = client().await;
    for i in 0..150 {
        client.create(&EQUIPMENT).set("name", format!("unit-{i}")).save().await.unwrap();
    }

    let page = client.query(&EQUIPMENT).paginate(None, Some(150), None, None).await.unwrap();
    assert_eq!(page.edges.len(), 150);
    assert!(!page.page_info.has_next_page);
}

#[tokio::test]
async fn test_paginate_cursor_survives_deletes() {
    let client = client().await;
    let mut kinds = Vec::new();
    for name in ["a", "b", "c", "d"] {
        kinds.push(client.create(&LOCATION_TYPE).set("name", name).save().await.unwrap());
    }

    let first = client.query(&LOCATION_TYPE).paginate(None, Some(2), None, None).await.unwrap();
    assert_eq!(page_names(&first), vec!["a", "b"]);

    client.delete_one(&LOCATION_TYPE, kinds[0].id().clone()).exec().await.unwrap();

    let after = first.page_info.end_cursor.clone().unwrap();
    let second = client
        .query(&LOCATION_TYPE)
        .paginate(Some(&after), Some(2), None, None)
        .await
        .unwrap();
    assert_eq!(page_names(&second), vec!["c", "d"]);
}

// ============================================================================
// Predicates
// ============================================================================

#[tokio::test]
async fn test_boolean_and_null_predicates() {
    let client = client().await;
    seed(&client).await;

    let roots = client.query(&LOCATION).filter(is_null("parent_id")).all().await.unwrap();
    assert_eq!(names(&roots), vec!["HQ"]);

    let either = client
        .query(&LOCATION)
        .filter(or(vec![eq("name", "HQ"), gt("latitude", 0.0)]))
        .all()
        .await
        .unwrap();
    assert_eq!(names(&either), vec!["HQ"]);

    let surveyed = client
        .query(&LOCATION)
        .filter(eq("site_survey_needed", true))
        .only()
        .await
        .unwrap();
    assert!(surveyed.get::<bool>("site_survey_needed").unwrap());
}

#[tokio::test]
async fn test_edge_predicates() {
    let client = client().await;
    seed(&client).await;

    let with_equipment = client.query(&LOCATION).filter(has_edge("equipment")).all().await.unwrap();
    assert_eq!(names(&with_equipment), vec!["Room A"]);

    let powered = client
        .query(&LOCATION)
        .filter(has_edge_with("tags", vec![eq("name", "Power")]))
        .all()
        .await
        .unwrap();
    assert_eq!(names(&powered), vec!["Room A"]);

    let in_floor = client
        .query(&LOCATION)
        .filter(has_edge_with("parent", vec![eq("name", "Floor 1")]))
        .all()
        .await
        .unwrap();
    assert_eq!(names(&in_floor), vec!["Room A", "Room B"]);
}

#[tokio::test]
async fn test_unknown_column_fails_before_execution() {
    let client = client().await;
    let result = client.query(&LOCATION).filter(eq("colour", "red")).all().await;
    assert_matches!(result, Err(OrmError::InvalidField { kind: "column", .. }));

    let result = client.query(&LOCATION).with_edge("owner", |q| q).all().await;
    assert_matches!(result, Err(OrmError::InvalidField { kind: "edge", .. }));
}

// ============================================================================
// Traversal
// ============================================================================

#[tokio::test]
async fn test_query_edge_from_query_and_record() {
    let client = client().await;
    let inv = seed(&client).await;

    let rooms = client
        .query(&LOCATION_TYPE)
        .filter(eq("name", "room"))
        .query_edge("locations")
        .unwrap()
        .all()
        .await
        .unwrap();
    assert_eq!(names(&rooms), vec!["Room A", "Room B"]);

    let gear = inv.room_a.query_edge("equipment").unwrap().all().await.unwrap();
    assert_eq!(names(&gear), vec!["router", "switch"]);

    let parent = inv.room_b.query_edge("parent").unwrap().only().await.unwrap();
    assert_eq!(parent.id(), inv.floor.id());

    let wifi_rooms = client
        .query(&TAG)
        .filter(eq("name", "Wi-Fi"))
        .query_edge("locations")
        .unwrap()
        .count()
        .await
        .unwrap();
    assert_eq!(wifi_rooms, 2);
}

// ============================================================================
// Aggregates and projections
// ============================================================================

#[tokio::test]
async fn test_group_by() {
    let client = client().await;
    seed(&client).await;

    let rows = client
        .query(&LOCATION)
        .order(asc("type_id"))
        .group_by(&["type_id"])
        .aggregate(count())
        .scan()
        .await
        .unwrap();
    let counts: Vec<i64> = rows.rows.iter().map(|r| r[1].get().unwrap()).collect();
    assert_eq!(counts, vec![2, 2]);

    let multi = client
        .query(&LOCATION)
        .group_by(&["type_id"])
        .aggregate(max("name"))
        .strings()
        .await;
    assert_matches!(multi, Err(OrmError::InvalidQuery(msg)) if msg.contains("more than 1 field"));

    let names = client.query(&EQUIPMENT).group_by(&["name"]).strings().await.unwrap();
    assert_eq!(names.len(), 2);
}

#[tokio::test]
async fn test_select_scalars() {
    let client = client().await;
    seed(&client).await;

    let mut names = client
        .query(&LOCATION_TYPE)
        .select(&["name"])
        .strings()
        .await
        .unwrap();
    names.sort();
    assert_eq!(names, vec!["building", "room"]);

    let flags = client
        .query(&LOCATION)
        .filter(contains("name", "Room"))
        .order(asc("name"))
        .select(&["site_survey_needed"])
        .bools()
        .await
        .unwrap();
    assert_eq!(flags, vec![false, true]);

    let both = client.query(&LOCATION).select(&["name", "latitude"]).strings().await;
    assert_matches!(both, Err(OrmError::InvalidQuery(_)));
}

// ============================================================================
// Typed decoding
// ============================================================================

#[derive(Debug, FromRecord)]
struct Room {
    id: i64,
    name: String,
    #[record(column = "external_id")]
    code: Option<String>,
    site_survey_needed: bool,
    #[record(skip)]
    visited: bool,
}

#[tokio::test]
async fn test_all_as_derived_struct() {
    let client = client().await;
    let inv = seed(&client).await;

    let rooms: Vec<Room> = client
        .query(&LOCATION)
        .filter(id_in([inv.room_a.id().clone(), inv.room_b.id().clone()]))
        .order(asc("name"))
        .all_as()
        .await
        .unwrap();
    assert_eq!(rooms.len(), 2);
    assert_eq!(rooms[0].name, "Room A");
    assert_eq!(rooms[0].code.as_deref(), Some("A-1"));
    assert_eq!(Value::Int(rooms[1].id), inv.room_b.id().clone());
    assert!(rooms[1].site_survey_needed);
    assert!(!rooms[0].visited);
}
