//! The world: an archetype entity store.
//!
//! Entities with identical component sets share a table. Adding an id to
//! an entity moves it to the table whose type is the old type plus the
//! new id, creating the table (and indexing its type) on first use.
//!
//! The index maps every packed id appearing in any table type to the set
//! of tables carrying it. Pair ids are additionally registered under
//! their wildcard forms `(P, *)`, `(*, O)` and `(*, *)`, and plain ids
//! under the bare wildcard, so the solver can probe unresolved filters
//! with the same lookup it uses for concrete ones.
//!
//! The rule solver only ever reads the world; iterators borrow it
//! immutably, so mutation during iteration is rejected at compile time.

mod index;
mod table;

pub use index::{TableRecord, TableSet};
pub use table::Table;

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::entity::{
    entity_hi, entity_lo, is_pair, pair_id, type_key, EntityId, TableId, FIRST_USER_ID,
    TRANSITIVE, WILDCARD,
};

/// Where an entity currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Record {
    pub table: TableId,
    pub row: usize,
}

/// An archetype entity store.
#[derive(Debug, Default)]
pub struct World {
    tables: Vec<Table>,
    table_ids: HashMap<Vec<EntityId>, TableId>,
    index: IndexMap<EntityId, TableSet>,
    records: HashMap<EntityId, Record>,
    names: IndexMap<String, EntityId>,
    labels: HashMap<EntityId, String>,
    next_id: EntityId,
}

impl World {
    pub fn new() -> World {
        World {
            next_id: FIRST_USER_ID,
            ..World::default()
        }
    }

    /// Create or look up a named entity.
    pub fn entity(&mut self, name: &str) -> EntityId {
        if let Some(&e) = self.names.get(name) {
            return e;
        }
        let e = self.spawn();
        self.names.insert(name.to_string(), e);
        self.labels.insert(e, name.to_string());
        e
    }

    /// Create an anonymous entity.
    pub fn spawn(&mut self) -> EntityId {
        let e = self.next_id;
        self.next_id += 1;
        e
    }

    /// Add a plain id to an entity, moving it to the matching table.
    pub fn add(&mut self, e: EntityId, id: EntityId) {
        self.add_id(e, id);
    }

    /// Add a `(pred, obj)` relation to an entity.
    pub fn add_pair(&mut self, e: EntityId, pred: EntityId, obj: EntityId) {
        self.add_id(e, pair_id(pred, obj));
    }

    /// Mark a predicate as transitive.
    pub fn make_transitive(&mut self, pred: EntityId) {
        self.add(pred, TRANSITIVE);
    }

    /// Is this predicate transitive?
    pub fn is_transitive(&self, pred: EntityId) -> bool {
        self.has(pred, TRANSITIVE)
    }

    /// Does the entity's table type contain `id`? Goes through the same
    /// table-set probe the solver uses.
    pub fn has(&self, e: EntityId, id: EntityId) -> bool {
        let (Some(record), Some(set)) = (self.record(e), self.table_set(id)) else {
            return false;
        };
        set.probe(record.table).is_some()
    }

    /// Resolve a name to an entity.
    pub fn lookup(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    /// Name of an entity, if it has one.
    pub fn name(&self, e: EntityId) -> Option<&str> {
        self.labels.get(&e).map(String::as_str)
    }

    /// Current location of an entity. Entities with no ids have no table.
    pub fn record(&self, e: EntityId) -> Option<Record> {
        self.records.get(&e).copied()
    }

    /// Table of an entity, if it has one.
    pub fn table_from_entity(&self, e: EntityId) -> Option<TableId> {
        self.record(e).map(|r| r.table)
    }

    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id]
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Table set for a packed id, wildcard forms included.
    pub fn table_set(&self, mask: EntityId) -> Option<&TableSet> {
        self.index.get(&mask)
    }

    /// Position of a table set in the index, for callers that need to
    /// hold onto a set without borrowing the world.
    pub fn table_set_pos(&self, mask: EntityId) -> Option<usize> {
        self.index.get_index_of(&mask)
    }

    /// Table set by index position.
    pub fn table_set_at(&self, pos: usize) -> &TableSet {
        self.index
            .get_index(pos)
            .map(|(_, set)| set)
            .expect("table set position out of range")
    }

    fn add_id(&mut self, e: EntityId, id: EntityId) {
        let ty = match self.record(e) {
            Some(record) => {
                let ty = &self.tables[record.table].ty;
                if ty.contains(&id) {
                    return;
                }
                let mut ty = ty.clone();
                ty.push(id);
                ty.sort_by_key(|&i| type_key(i));
                ty
            }
            None => vec![id],
        };
        let dst = self.table_for_type(ty);
        self.move_entity(e, dst);
    }

    /// Find or create the table with the given type, indexing the type on
    /// creation.
    fn table_for_type(&mut self, ty: Vec<EntityId>) -> TableId {
        if let Some(&t) = self.table_ids.get(&ty) {
            return t;
        }
        let t = self.tables.len();
        for (column, &id) in ty.iter().enumerate() {
            self.register(id, t, column);
            if is_pair(id) {
                self.register(pair_id(entity_lo(id), WILDCARD), t, column);
                self.register(pair_id(WILDCARD, entity_hi(id)), t, column);
                self.register(pair_id(WILDCARD, WILDCARD), t, column);
            } else {
                self.register(WILDCARD, t, column);
            }
        }
        self.table_ids.insert(ty.clone(), t);
        self.tables.push(Table::new(t, ty));
        t
    }

    fn register(&mut self, key: EntityId, table: TableId, column: usize) {
        self.index.entry(key).or_default().insert_first(table, column);
    }

    fn move_entity(&mut self, e: EntityId, dst: TableId) {
        if let Some(record) = self.record(e) {
            let src = &mut self.tables[record.table];
            src.entities.swap_remove(record.row);
            // The swapped-in entity now lives at the vacated row.
            if let Some(&moved) = src.entities.get(record.row) {
                self.records.insert(
                    moved,
                    Record {
                        table: record.table,
                        row: record.row,
                    },
                );
            }
        }
        let row = self.tables[dst].entities.len();
        self.tables[dst].entities.push(e);
        self.records.insert(e, Record { table: dst, row });
    }
}
