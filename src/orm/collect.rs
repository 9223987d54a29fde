//! Eager-load planning from GraphQL selection sets
//!
//! A selection set names the fields a client asked for. Fields that match an
//! edge (by its selection field name, or its edge name) become eager loads;
//! nested selections plan the neighbor query the same way. Other fields are
//! scalar or unknown and are skipped.

use async_graphql::context::SelectionField;

use super::builder::Query;

/// One requested field with its sub-selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub name: String,
    pub children: Vec<Selection>,
}

impl Selection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            children: Vec::new(),
        }
    }

    pub fn with_children(name: &str, children: Vec<Selection>) -> Self {
        Self {
            name: name.to_string(),
            children,
        }
    }

    /// Snapshot of an async-graphql look-ahead selection.
    pub fn from_graphql(field: &SelectionField<'_>) -> Self {
        Self {
            name: field.name().to_string(),
            children: field.selection_set().map(|f| Self::from_graphql(&f)).collect(),
        }
    }

    pub fn from_graphql_set<'a>(fields: impl IntoIterator<Item = SelectionField<'a>>) -> Vec<Self> {
        fields.into_iter().map(|f| Self::from_graphql(&f)).collect()
    }
}

impl From<&SelectionField<'_>> for Selection {
    fn from(field: &SelectionField<'_>) -> Self {
        Self::from_graphql(field)
    }
}

/// Helper to find a field in a selection set by name.
pub fn has_field(selection: &[Selection], name: &str) -> bool {
    selection.iter().any(|f| f.name == name)
}

impl Query {
    /// Attach eager loads for every edge named in `selection`, recursively.
    ///
    /// Planning the same selection twice yields the same eager loads: an
    /// edge already attached is re-planned in place.
    pub fn collect_fields(mut self, selection: &[Selection]) -> Self {
        let entity = self.entity();
        for field in selection {
            let Some(edge) = entity.edge_by_field(&field.name) else {
                tracing::trace!(entity = entity.name, field = %field.name, "Skipping non-edge field");
                continue;
            };
            let children = field.children.clone();
            self = self.with_edge(edge.name, move |q| q.collect_fields(&children));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_field() {
        let set = vec![
            Selection::new("name"),
            Selection::with_children("parentLocation", vec![Selection::new("id")]),
        ];
        assert!(has_field(&set, "parentLocation"));
        assert!(!has_field(&set, "children"));
    }
}
