//! Error types for the entity-graph runtime
//!
//! Every fallible operation returns [`OrmError`]. The "not found" and
//! "not singular" conditions are ordinary, typed values that callers are
//! expected to match on; nothing in this crate panics on them unless the
//! caller opts into [`must`](crate::must).

use thiserror::Error;

/// Label used when an identifier cannot be mapped to a known table.
pub const UNKNOWN_LABEL: &str = "invalid/unknown";

/// Result alias used throughout the crate.
pub type Result<T, E = OrmError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum OrmError {
    /// Zero rows where at least one was required.
    #[error("entgraph: {label} not found")]
    NotFound { label: String },

    /// More than one row where exactly one was required.
    #[error("entgraph: {label} not singular")]
    NotSingular { label: String },

    /// An edge was read before it was eager-loaded.
    #[error("entgraph: {edge} edge was not loaded")]
    NotLoaded { edge: String },

    /// A record bound to a committed or rolled-back transaction was used for a new query.
    #[error("entgraph: {label} is bound to a closed transaction; call unwrap_tx() before querying it")]
    TransactionClosed { label: String },

    /// `unwrap_tx` was called on a record that was never transaction scoped.
    #[error("entgraph: {label} is not a transactional entity")]
    NotTransactional { label: String },

    #[error("entgraph: cannot start a transaction within a transaction")]
    NestedTransaction,

    /// The driver returned a row shape that does not match the entity type.
    #[error("entgraph: scan mismatch on {table}: {detail}")]
    ScanMismatch { table: String, detail: String },

    /// A column or edge name that the entity type does not declare.
    #[error("entgraph: unknown {kind} {name:?} on {entity}")]
    InvalidField {
        kind: &'static str,
        name: String,
        entity: String,
    },

    /// A typed read asked for a value of the wrong shape.
    #[error("entgraph: cannot convert {found} to {expected}")]
    Conversion {
        expected: &'static str,
        found: String,
    },

    #[error("entgraph: constraint failed: {0}")]
    Constraint(String),

    /// Misuse of a builder (for example single-field helpers on multi-field selections).
    #[error("entgraph: {0}")]
    InvalidQuery(String),

    /// `first` together with `last`, a negative page size, or a cursor that
    /// does not decode.
    #[error("entgraph: invalid pagination parameters")]
    InvalidPagination,

    /// A mutation hook rejected the operation.
    #[error("entgraph: operation denied: {0}")]
    Denied(String),

    #[error("entgraph: database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl OrmError {
    pub fn not_found(label: impl Into<String>) -> Self {
        Self::NotFound {
            label: label.into(),
        }
    }

    pub fn not_singular(label: impl Into<String>) -> Self {
        Self::NotSingular {
            label: label.into(),
        }
    }

    pub fn scan_mismatch(table: &str, detail: impl Into<String>) -> Self {
        Self::ScanMismatch {
            table: table.to_string(),
            detail: detail.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_not_singular(&self) -> bool {
        matches!(self, Self::NotSingular { .. })
    }

    pub fn is_not_loaded(&self) -> bool {
        matches!(self, Self::NotLoaded { .. })
    }

    /// Constraint violations, including the ones SQLite reports itself.
    pub fn is_constraint_error(&self) -> bool {
        match self {
            Self::Constraint(_) => true,
            Self::Database(sqlx::Error::Database(e)) => matches!(
                e.kind(),
                sqlx::error::ErrorKind::UniqueViolation
                    | sqlx::error::ErrorKind::ForeignKeyViolation
                    | sqlx::error::ErrorKind::NotNullViolation
                    | sqlx::error::ErrorKind::CheckViolation
            ),
            _ => false,
        }
    }

    /// True for the resolver's "identifier maps to no table" failure.
    pub fn is_unknown_table(&self) -> bool {
        matches!(self, Self::NotFound { label } if label == UNKNOWN_LABEL)
    }
}
