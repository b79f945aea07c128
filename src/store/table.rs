//! Tables: storage buckets for entities with identical component sets.

use crate::entity::{EntityId, TableId};

/// A table stores every entity that carries exactly the same set of ids.
/// Its `ty` is that set, sorted by `(role, predicate, object)` so ids
/// sharing a predicate are contiguous.
#[derive(Clone, Debug)]
pub struct Table {
    pub id: TableId,
    /// The table's type: sorted, deduplicated ids.
    pub ty: Vec<EntityId>,
    /// Entities stored in this table, one per row.
    pub entities: Vec<EntityId>,
}

impl Table {
    pub fn new(id: TableId, ty: Vec<EntityId>) -> Table {
        Table {
            id,
            ty,
            entities: Vec::new(),
        }
    }

    /// Number of rows.
    pub fn count(&self) -> usize {
        self.entities.len()
    }
}
