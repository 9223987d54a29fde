//! Entity-type descriptors
//!
//! Per-type code (field getters, validators, formatting) lives outside this
//! crate. What the runtime needs from each entity type is captured by one
//! static [`EntityType`]: its table, its columns, its foreign keys and its
//! edges. Every builder in [`crate::orm`] is parameterized by such a
//! descriptor instead of being generated per type.

use super::record::Record;
use crate::error::{OrmError, Result};

/// Storage type of the primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Int,
    String,
}

impl IdKind {
    fn sql_type(&self) -> &'static str {
        match self {
            IdKind::Int => "INTEGER",
            IdKind::String => "TEXT",
        }
    }
}

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
    Bool,
    String,
    Bytes,
    Time,
    Json,
    Uuid,
}

impl FieldType {
    /// SQLite column type (TEXT, INTEGER, REAL, BLOB)
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Int | FieldType::Bool => "INTEGER",
            FieldType::Float => "REAL",
            FieldType::Bytes => "BLOB",
            FieldType::String | FieldType::Time | FieldType::Json | FieldType::Uuid => "TEXT",
        }
    }

    /// Type name reported by node introspection.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Float => "float64",
            FieldType::Bool => "bool",
            FieldType::String => "string",
            FieldType::Bytes => "[]byte",
            FieldType::Time => "time.Time",
            FieldType::Json => "json",
            FieldType::Uuid => "uuid",
        }
    }
}

/// Column definition.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    /// Column name in the database
    pub name: &'static str,
    pub field_type: FieldType,
    /// Whether the column can be NULL
    pub nullable: bool,
    /// Default value expression (e.g., "datetime('now')")
    pub default: Option<&'static str>,
}

impl Column {
    pub const fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            nullable: false,
            default: None,
        }
    }

    pub const fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            nullable: true,
            default: None,
        }
    }

    pub const fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    /// Whether an insert must supply this column.
    pub fn is_required(&self) -> bool {
        !self.nullable && self.default.is_none()
    }

    /// Generate the column definition SQL
    pub fn to_sql(&self) -> String {
        let mut sql = format!("\"{}\" {}", self.name, self.field_type.sql_type());

        if !self.nullable {
            sql.push_str(" NOT NULL");
        }

        if let Some(default) = self.default {
            sql.push_str(&format!(" DEFAULT ({})", default));
        }

        sql
    }
}

/// Relation kind of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rel {
    O2O,
    O2M,
    M2O,
    M2M,
}

/// A named relation from one entity type to another.
///
/// `table` and `columns` locate the relation's storage:
/// - key on this entity's table (M2O, inverse O2O): `table` is this table and
///   `columns[0]` the foreign-key column;
/// - key on the target's table (O2M, O2O): `table` is the target table and
///   `columns[0]` the foreign-key column pointing back here;
/// - M2M: `table` is the join table, `columns[0]` references this entity and
///   `columns[1]` the target.
#[derive(Debug, Clone, Copy)]
pub struct EdgeDef {
    /// Edge name, e.g. "parent"
    pub name: &'static str,
    /// Selection-set field names that load this edge, e.g.
    /// `&["parentLocation", "parent"]`
    pub fields: &'static [&'static str],
    pub target: fn() -> &'static EntityType,
    pub rel: Rel,
    pub inverse: bool,
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

impl EdgeDef {
    pub fn target(&self) -> &'static EntityType {
        (self.target)()
    }

    /// True when the foreign key lives on the owning entity's row.
    pub fn fk_on_self(&self) -> bool {
        matches!(self.rel, Rel::M2O) || (self.rel == Rel::O2O && self.inverse)
    }

    /// Edges that hold at most one neighbor.
    pub fn is_unique(&self) -> bool {
        matches!(self.rel, Rel::M2O | Rel::O2O)
    }

    pub fn column(&self) -> &'static str {
        self.columns[0]
    }

    /// Join-table column that references the target (M2M only).
    pub fn target_column(&self) -> &'static str {
        self.columns.get(1).copied().unwrap_or(self.columns[0])
    }
}

/// Metadata about an entity type (table).
#[derive(Debug)]
pub struct EntityType {
    /// Type name, e.g. "Location"
    pub name: &'static str,
    /// Lowercase label used in error messages, e.g. "location"
    pub label: &'static str,
    /// The SQL table name (e.g., "locations")
    pub table: &'static str,
    pub id_kind: IdKind,
    /// The primary key column name (e.g., "id")
    pub id_column: &'static str,
    /// Scalar columns, excluding the primary key
    pub columns: &'static [Column],
    /// Foreign-key columns on this table owned by edges
    pub foreign_keys: &'static [&'static str],
    pub edges: &'static [EdgeDef],
}

impl EntityType {
    /// List of all column names, primary key first
    pub fn column_names(&self) -> Vec<&'static str> {
        std::iter::once(self.id_column)
            .chain(self.columns.iter().map(|c| c.name))
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Index of a scalar column inside [`EntityType::columns`].
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        name == self.id_column
            || self.column(name).is_some()
            || self.foreign_keys.contains(&name)
    }

    pub fn edge(&self, name: &str) -> Option<&'static EdgeDef> {
        self.edges.iter().find(|e| e.name == name)
    }

    /// Edge lookup by selection-set field name, falling back to the edge name.
    pub fn edge_by_field(&self, field: &str) -> Option<&'static EdgeDef> {
        self.edges
            .iter()
            .find(|e| e.fields.iter().any(|f| *f == field))
            .or_else(|| self.edge(field))
    }

    pub fn require_edge(&self, name: &str) -> Result<&'static EdgeDef> {
        self.edge(name).ok_or_else(|| OrmError::InvalidField {
            kind: "edge",
            name: name.to_string(),
            entity: self.name.to_string(),
        })
    }

    pub fn require_column(&self, name: &str) -> Result<()> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(OrmError::InvalidField {
                kind: "column",
                name: name.to_string(),
                entity: self.name.to_string(),
            })
        }
    }

    /// SQL type for a foreign-key column, taken from the edge that owns it.
    fn foreign_key_sql_type(&self, column: &str) -> &'static str {
        self.edges
            .iter()
            .find(|e| e.fk_on_self() && e.column() == column)
            .map(|e| e.target().id_kind.sql_type())
            .unwrap_or("INTEGER")
    }

    /// Generate CREATE TABLE IF NOT EXISTS SQL
    ///
    /// Integer keys use AUTOINCREMENT so the table's id range can be seeded
    /// through `sqlite_sequence`.
    pub fn create_table_sql(&self) -> String {
        let mut defs = vec![match self.id_kind {
            IdKind::Int => format!("\"{}\" INTEGER PRIMARY KEY AUTOINCREMENT", self.id_column),
            IdKind::String => format!("\"{}\" TEXT PRIMARY KEY", self.id_column),
        }];
        defs.extend(self.columns.iter().map(|c| c.to_sql()));
        defs.extend(
            self.foreign_keys
                .iter()
                .map(|fk| format!("\"{}\" {}", fk, self.foreign_key_sql_type(fk))),
        );

        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n  {}\n)",
            self.table,
            defs.join(",\n  ")
        )
    }

    /// CREATE TABLE statements for join tables owned by this type's M2M edges.
    pub fn join_tables_sql(&self) -> Vec<String> {
        self.edges
            .iter()
            .filter(|e| e.rel == Rel::M2M && !e.inverse)
            .map(|e| {
                format!(
                    "CREATE TABLE IF NOT EXISTS \"{table}\" (\"{a}\" {at} NOT NULL, \"{b}\" {bt} NOT NULL, PRIMARY KEY (\"{a}\", \"{b}\"))",
                    table = e.table,
                    a = e.columns[0],
                    at = self.id_kind.sql_type(),
                    b = e.target_column(),
                    bt = e.target().id_kind.sql_type(),
                )
            })
            .collect()
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table
    }
}

impl Eq for EntityType {}

/// Trait for decoding a record into a typed struct.
///
/// Implemented by `#[derive(FromRecord)]` from `entgraph-macros`.
pub trait FromRecord: Sized {
    fn from_record(record: &Record) -> Result<Self>;
}

/// Sort direction for ORDER BY clauses.
#[derive(async_graphql::Enum, Copy, Clone, Debug, Default, Eq, PartialEq)]
#[graphql(name = "OrderDirection")]
pub enum OrderDirection {
    /// Ascending order (A-Z, 1-9, oldest-newest)
    #[default]
    #[graphql(name = "ASC")]
    Asc,
    /// Descending order (Z-A, 9-1, newest-oldest)
    #[graphql(name = "DESC")]
    Desc,
}

impl OrderDirection {
    /// Convert to SQL order string
    pub fn to_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}
