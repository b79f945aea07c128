//! Table sets: the index from packed ids to the tables containing them.
//!
//! A table set answers two questions in O(1): "which tables carry this
//! id" (positional iteration, for `Select`) and "does this table carry
//! it, and at which column" (probe by table id, for `With`). Insertion
//! order is table creation order, which is what makes rule results
//! deterministic for a fixed world.

use indexmap::IndexMap;

use crate::entity::TableId;

/// A table plus the first column of its type at which the indexed id
/// appears.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableRecord {
    pub table: TableId,
    pub column: usize,
}

/// Set of tables containing a particular packed id.
#[derive(Clone, Debug, Default)]
pub struct TableSet {
    records: IndexMap<TableId, usize>,
}

impl TableSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at position `i` in insertion order.
    pub fn get(&self, i: usize) -> Option<TableRecord> {
        self.records
            .get_index(i)
            .map(|(&table, &column)| TableRecord { table, column })
    }

    /// O(1) membership probe by table id.
    pub fn probe(&self, table: TableId) -> Option<TableRecord> {
        self.records
            .get(&table)
            .map(|&column| TableRecord { table, column })
    }

    /// Register a table under this set. Only the first column is kept.
    pub fn insert_first(&mut self, table: TableId, column: usize) {
        self.records.entry(table).or_insert(column);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_column_wins() {
        let mut set = TableSet::default();
        set.insert_first(3, 2);
        set.insert_first(3, 5);
        assert_eq!(set.probe(3), Some(TableRecord { table: 3, column: 2 }));
    }

    #[test]
    fn iterates_in_insertion_order() {
        let mut set = TableSet::default();
        set.insert_first(7, 0);
        set.insert_first(2, 1);
        assert_eq!(set.get(0).unwrap().table, 7);
        assert_eq!(set.get(1).unwrap().table, 2);
        assert_eq!(set.get(2), None);
    }
}
