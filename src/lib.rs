//! entgraph: entity-graph data access runtime
//!
//! Generic, descriptor-driven data access for entity graphs stored in SQL:
//! - Query builders with predicates, ordering, paging, group-by and
//!   projections, shared by every entity type
//! - Eager loading of edges, planned by hand or from GraphQL selection sets
//! - Global ids resolvable to records without knowing their table
//! - Transactions whose nested builders cannot end them early
//! - Create/update/delete builders with hooks
//!
//! Entity types are described by static [`EntityType`] values; storage is
//! reached only through the [`Driver`] trait.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod must;
pub mod node;
pub mod orm;
pub mod tables;
pub mod tx;
pub mod value;

pub use client::Client;
pub use config::ClientConfig;
pub use db::{Database, DebugDriver, Dialect, Driver, ExecResult, Rows, Tx};
pub use entgraph_macros::FromRecord;
pub use error::{OrmError, Result, UNKNOWN_LABEL};
pub use must::{MustExt, must};
pub use node::{GlobalId, Node, NodeEdge, NodeField, TABLE_SPACE};
pub use orm::{
    Column, EdgeDef, EntityType, FieldType, FromRecord, IdKind, Loaded, Query, Record, Rel, Schema,
    Selection,
};
pub use tables::TableRegistry;
pub use tx::{ScopedDriver, Transaction};
pub use value::{FromValue, Value};
