//! Shared fixtures: a small location inventory schema on in-memory SQLite.

#![allow(dead_code)]

use std::sync::Arc;

use entgraph::{
    Client, Column, Database, EdgeDef, EntityType, FieldType, IdKind, Record, Rel, Schema,
};

fn location_type() -> &'static EntityType {
    &LOCATION_TYPE
}

fn location() -> &'static EntityType {
    &LOCATION
}

fn equipment() -> &'static EntityType {
    &EQUIPMENT
}

fn tag() -> &'static EntityType {
    &TAG
}

pub static LOCATION_TYPE: EntityType = EntityType {
    name: "LocationType",
    label: "location_type",
    table: "location_types",
    id_kind: IdKind::Int,
    id_column: "id",
    columns: &[Column::new("name", FieldType::String)],
    foreign_keys: &[],
    edges: &[EdgeDef {
        name: "locations",
        fields: &["locations"],
        target: location,
        rel: Rel::O2M,
        inverse: false,
        table: "locations",
        columns: &["type_id"],
    }],
};

pub static LOCATION: EntityType = EntityType {
    name: "Location",
    label: "location",
    table: "locations",
    id_kind: IdKind::Int,
    id_column: "id",
    columns: &[
        Column::new("name", FieldType::String),
        Column::optional("external_id", FieldType::String),
        Column::optional("latitude", FieldType::Float),
        Column::new("site_survey_needed", FieldType::Bool).with_default("0"),
    ],
    foreign_keys: &["type_id", "parent_id"],
    edges: &[
        EdgeDef {
            name: "type",
            fields: &["locationType"],
            target: location_type,
            rel: Rel::M2O,
            inverse: true,
            table: "locations",
            columns: &["type_id"],
        },
        EdgeDef {
            name: "parent",
            fields: &["parentLocation"],
            target: location,
            rel: Rel::M2O,
            inverse: true,
            table: "locations",
            columns: &["parent_id"],
        },
        EdgeDef {
            name: "children",
            fields: &["children"],
            target: location,
            rel: Rel::O2M,
            inverse: false,
            table: "locations",
            columns: &["parent_id"],
        },
        EdgeDef {
            name: "equipment",
            fields: &["equipment", "devices"],
            target: equipment,
            rel: Rel::O2M,
            inverse: false,
            table: "equipment",
            columns: &["location_id"],
        },
        EdgeDef {
            name: "tags",
            fields: &["tags"],
            target: tag,
            rel: Rel::M2M,
            inverse: false,
            table: "location_tags",
            columns: &["location_id", "tag_id"],
        },
    ],
};

pub static EQUIPMENT: EntityType = EntityType {
    name: "Equipment",
    label: "equipment",
    table: "equipment",
    id_kind: IdKind::Int,
    id_column: "id",
    columns: &[Column::new("name", FieldType::String)],
    foreign_keys: &["location_id"],
    edges: &[EdgeDef {
        name: "location",
        fields: &["location"],
        target: location,
        rel: Rel::M2O,
        inverse: true,
        table: "equipment",
        columns: &["location_id"],
    }],
};

pub static TAG: EntityType = EntityType {
    name: "Tag",
    label: "tag",
    table: "tags",
    id_kind: IdKind::String,
    id_column: "id",
    columns: &[Column::new("name", FieldType::String)],
    foreign_keys: &[],
    edges: &[EdgeDef {
        name: "locations",
        fields: &["locations"],
        target: location,
        rel: Rel::M2M,
        inverse: true,
        table: "location_tags",
        columns: &["tag_id", "location_id"],
    }],
};

pub fn schema() -> Schema {
    Schema::new(vec![&LOCATION_TYPE, &LOCATION, &EQUIPMENT, &TAG])
}

/// Fresh in-memory database with the schema created.
pub async fn client() -> Client {
    entgraph::logging::init_for_tests();
    let database = Database::in_memory().await.expect("open in-memory database");
    let client = Client::new(Arc::new(database), schema());
    client.create_schema().await.expect("create schema");
    client
}

/// Building > Floor > {Room A, Room B}, with equipment in Room A and tags.
pub struct Inventory {
    pub building_type: Record,
    pub room_type: Record,
    pub building: Record,
    pub floor: Record,
    pub room_a: Record,
    pub room_b: Record,
}

pub async fn seed(client: &Client) -> Inventory {
    let building_type = client
        .create(&LOCATION_TYPE)
        .set("name", "building")
        .save()
        .await
        .unwrap();
    let room_type = client
        .create(&LOCATION_TYPE)
        .set("name", "room")
        .save()
        .await
        .unwrap();

    let building = client
        .create(&LOCATION)
        .set("name", "HQ")
        .set("latitude", 32.1)
        .set_edge("type", building_type.id().clone())
        .save()
        .await
        .unwrap();
    let floor = client
        .create(&LOCATION)
        .set("name", "Floor 1")
        .set_edge("type", building_type.id().clone())
        .set_edge("parent", building.id().clone())
        .save()
        .await
        .unwrap();
    let room_a = client
        .create(&LOCATION)
        .set("name", "Room A")
        .set("external_id", "A-1")
        .set_edge("type", room_type.id().clone())
        .set_edge("parent", floor.id().clone())
        .save()
        .await
        .unwrap();
    let room_b = client
        .create(&LOCATION)
        .set("name", "Room B")
        .set("site_survey_needed", true)
        .set_edge("type", room_type.id().clone())
        .set_edge("parent", floor.id().clone())
        .save()
        .await
        .unwrap();

    for name in ["router", "switch"] {
        client
            .create(&EQUIPMENT)
            .set("name", name)
            .set_edge("location", room_a.id().clone())
            .save()
            .await
            .unwrap();
    }

    let wifi = client.create(&TAG).set("id", "wifi").set("name", "Wi-Fi").save().await.unwrap();
    let power = client.create(&TAG).set("id", "power").set("name", "Power").save().await.unwrap();
    client
        .update_one(&LOCATION, room_a.id().clone())
        .add_edge("tags", [wifi.id().clone(), power.id().clone()])
        .save()
        .await
        .unwrap();
    client
        .update_one(&LOCATION, room_b.id().clone())
        .add_edge("tags", [wifi.id().clone()])
        .save()
        .await
        .unwrap();

    Inventory {
        building_type,
        room_type,
        building,
        floor,
        room_a,
        room_b,
    }
}

pub fn names(records: &[Record]) -> Vec<String> {
    let mut names: Vec<String> = records.iter().map(|r| r.get("name").unwrap()).collect();
    names.sort();
    names
}
