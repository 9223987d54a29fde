//! Entity query layer
//!
//! Descriptor-driven builders shared by every entity type:
//! - Query specification and execution (`Query`, `QuerySpec`)
//! - Filters and ordering (`filters`)
//! - Group-by and projection (`GroupBy`, `Select`)
//! - Eager loading, planned by hand or from GraphQL selection sets
//! - Cursor pagination
//! - Create/update/delete builders with hooks
//!
//! ```rust,ignore
//! use entgraph::orm::filters::{eq, asc};
//!
//! let rooms = client
//!     .query(&LOCATION)
//!     .filter(eq("kind", "room"))
//!     .order(asc("name"))
//!     .with_edge("parent", |q| q)
//!     .all()
//!     .await?;
//! ```

mod builder;
mod collect;
pub mod filters;
mod loaders;
mod mutation;
pub mod pagination;
mod record;
mod schema;
pub mod select;
pub mod sql;
mod traits;

pub use builder::{Query, QuerySpec};
pub use collect::{Selection, has_field};
pub use mutation::{Create, Delete, DeleteOne, EdgeChange, Hook, Mutation, Op, Update, UpdateOne};
pub use pagination::{Connection, PageInfo, decode_cursor, encode_cursor};
pub use record::{Loaded, Record};
pub use schema::{DEFAULT_TYPE_TABLE, Schema, SchemaSyncResult};
pub use select::{Aggregate, GroupBy, Select};
pub use traits::*;
