//! The evaluation VM.
//!
//! A rule program is interpreted by a single dispatch loop with a
//! uniform step signature: evaluating an operation either matches
//! (continue at `on_ok` with a fresh start) or fails (continue at
//! `on_fail` with `redo` set, resuming that operation's search where it
//! left off).
//!
//! Backtracking works by copying, not undoing: on every match the
//! current frame's registers and columns are pushed to the next frame,
//! so each operation keeps a private, stable view of the variable state
//! at the moment it was entered. A later failure simply re-enters an
//! earlier frame, which still holds everything that operation needs to
//! continue.
//!
//! The program suspends exactly at `Yield`: the driver publishes the
//! result and returns to the caller; the next call resumes the unwind.

use roaring::RoaringBitmap;

use crate::entity::{entity_hi, pair_id, EntityId, TableId, THIS, WILDCARD};
use crate::store::{TableRecord, TableSet, World};

use super::emit::{Op, OpKind};
use super::pair::{find_next_match, Filter, Pair};
use super::vars::{VarId, VarKind};
use super::Rule;

/// A register cell: a reified entity or a bound table.
#[derive(Clone, Copy, Debug)]
pub enum Reg {
    Entity(EntityId),
    Table(TableId),
}

impl Reg {
    fn entity(self) -> EntityId {
        match self {
            Reg::Entity(e) => e,
            Reg::Table(_) => {
                debug_assert!(false, "entity register holds a table");
                WILDCARD
            }
        }
    }

    fn table(self) -> Option<TableId> {
        match self {
            Reg::Table(t) => Some(t),
            Reg::Entity(_) => None,
        }
    }
}

/// Scratch for Select and With: the resolved table set and the current
/// position in it.
#[derive(Clone, Copy, Debug, Default)]
struct WithCtx {
    set: Option<usize>,
    table_index: i32,
}

/// One level of a transitive search: a table set, the current table in
/// it, and the row whose relations are being followed.
#[derive(Clone, Debug)]
struct DfsFrame {
    set: usize,
    table_index: i32,
    table: TableId,
    row: usize,
    column: usize,
    filter: Filter,
}

#[derive(Debug, Default)]
struct DfsCtx {
    frames: Vec<DfsFrame>,
    /// Tables already yielded under the current root match; stops cyclic
    /// relation graphs from replaying frames.
    visited: RoaringBitmap,
}

#[derive(Clone, Copy, Debug, Default)]
struct EachCtx {
    row: usize,
}

/// Per-operation scratch; the variant is fixed by the operation's kind.
#[derive(Debug)]
enum OpCtx {
    None,
    With(WithCtx),
    Dfs(DfsCtx),
    Each(EachCtx),
}

/// Iterator over a rule's results.
///
/// Drive it with [`RuleIter::next`]; between calls the yielded table
/// slice, matched ids, and reified variables are readable through the
/// accessors.
pub struct RuleIter<'a> {
    rule: &'a Rule<'a>,
    nvars: usize,
    ncols: usize,
    op: i32,
    redo: bool,
    done: bool,
    registers: Vec<Reg>,
    columns: Vec<i32>,
    op_ctx: Vec<OpCtx>,
    /// Matched id per signature column, refreshed by Select/With/Dfs.
    components: Vec<EntityId>,
    // Published result.
    result_frame: usize,
    result_table: Option<TableId>,
    count: usize,
    offset: usize,
    out_columns: Vec<i32>,
}

impl<'a> RuleIter<'a> {
    pub(super) fn new(rule: &'a Rule<'a>) -> RuleIter<'a> {
        let nvars = rule.variable_count();
        let ncols = rule.column_count();
        let nops = rule.operations().len();

        let op_ctx = rule
            .operations()
            .iter()
            .map(|op| match op.kind {
                OpKind::Select | OpKind::With => OpCtx::With(WithCtx::default()),
                OpKind::Dfs => OpCtx::Dfs(DfsCtx::default()),
                OpKind::Each => OpCtx::Each(EachCtx::default()),
                OpKind::Input | OpKind::Yield => OpCtx::None,
            })
            .collect();

        RuleIter {
            rule,
            nvars,
            ncols,
            op: 0,
            redo: false,
            done: false,
            registers: vec![Reg::Entity(WILDCARD); nops * nvars],
            columns: vec![-1; nops * ncols],
            op_ctx,
            components: vec![0; ncols],
            result_frame: 0,
            result_table: None,
            count: 0,
            offset: 0,
            out_columns: Vec::new(),
        }
    }

    /// Run the program until the next `Yield` or until it terminates.
    /// Returns false when there are no more results.
    pub fn next(&mut self) -> bool {
        if self.done {
            return false;
        }

        let rule = self.rule;
        let mut redo = self.redo;

        while self.op != -1 {
            let cur = self.op as usize;
            let op = &rule.operations()[cur];

            let matched = self.eval_op(op, cur, redo);

            if matched {
                let next = op.on_ok;
                // A match can never run off the end of the program.
                debug_assert!(next != -1);
                self.op = next;
                self.push_frame(cur, next as usize);
                redo = false;
            } else {
                self.op = op.on_fail;
                redo = true;
            }

            if op.kind == OpKind::Yield {
                self.publish(cur);
                self.redo = redo;
                return true;
            }
        }

        self.done = true;
        self.release();
        false
    }

    /// Number of entities in the current result. Zero for rules without
    /// a `.` variable, which yield a plain true/false outcome.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Row offset of the current result within its table.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Entities of the current result.
    pub fn entities(&self) -> &'a [EntityId] {
        match self.result_table {
            Some(t) => {
                let entities = &self.rule.world().table(t).entities;
                &entities[self.offset..self.offset + self.count]
            }
            None => &[],
        }
    }

    /// Matched id per signature column for the current result.
    pub fn matched_ids(&self) -> &[EntityId] {
        &self.components
    }

    /// Table column per signature column for the current result,
    /// 1-based. Internally columns are 0-based; they are shifted when
    /// published.
    pub fn columns(&self) -> &[i32] {
        &self.out_columns
    }

    /// Value of a reified Entity variable; 0 for Table variables.
    pub fn variable(&self, var: VarId) -> EntityId {
        if self.done || var >= self.nvars {
            return 0;
        }
        if self.rule.variables()[var].kind == VarKind::Entity {
            self.reg(self.result_frame, var).entity()
        } else {
            0
        }
    }

    // ---- frames ----------------------------------------------------

    fn reg(&self, frame: usize, var: VarId) -> Reg {
        self.registers[frame * self.nvars + var]
    }

    fn set_reg(&mut self, frame: usize, var: VarId, value: Reg) {
        self.registers[frame * self.nvars + var] = value;
    }

    fn column_at(&self, frame: usize, col: usize) -> i32 {
        self.columns[frame * self.ncols + col]
    }

    fn set_column_at(&mut self, frame: usize, col: usize, value: i32) {
        self.columns[frame * self.ncols + col] = value;
    }

    /// Copy registers and columns from the current frame to the next, so
    /// the next operation starts from this state and the current one can
    /// still resume from its own.
    fn push_frame(&mut self, cur: usize, next: usize) {
        if self.nvars > 0 {
            let src = cur * self.nvars;
            let dst = next * self.nvars;
            self.registers.copy_within(src..src + self.nvars, dst);
        }
        if self.ncols > 0 {
            let src = cur * self.ncols;
            let dst = next * self.ncols;
            self.columns.copy_within(src..src + self.ncols, dst);
        }
    }

    // ---- scratch access --------------------------------------------

    fn with_ctx(&self, i: usize) -> WithCtx {
        match &self.op_ctx[i] {
            OpCtx::With(c) => *c,
            _ => {
                debug_assert!(false, "operation {} has no with context", i);
                WithCtx::default()
            }
        }
    }

    fn put_with_ctx(&mut self, i: usize, ctx: WithCtx) {
        if let OpCtx::With(slot) = &mut self.op_ctx[i] {
            *slot = ctx;
        }
    }

    fn each_ctx(&self, i: usize) -> EachCtx {
        match &self.op_ctx[i] {
            OpCtx::Each(c) => *c,
            _ => {
                debug_assert!(false, "operation {} has no each context", i);
                EachCtx::default()
            }
        }
    }

    fn put_each_ctx(&mut self, i: usize, ctx: EachCtx) {
        if let OpCtx::Each(slot) = &mut self.op_ctx[i] {
            *slot = ctx;
        }
    }

    fn take_dfs_ctx(&mut self, i: usize) -> DfsCtx {
        match &mut self.op_ctx[i] {
            OpCtx::Dfs(c) => std::mem::take(c),
            _ => {
                debug_assert!(false, "operation {} has no dfs context", i);
                DfsCtx::default()
            }
        }
    }

    fn put_dfs_ctx(&mut self, i: usize, ctx: DfsCtx) {
        if let OpCtx::Dfs(slot) = &mut self.op_ctx[i] {
            *slot = ctx;
        }
    }

    // ---- filters ---------------------------------------------------

    /// Translate a pair back into a filter, substituting every variable
    /// the program has resolved so far. Registers are read from the
    /// previous frame: the current operation has not reified its own
    /// variables yet.
    fn pair_to_filter(&self, op_index: usize, pair: Pair) -> Filter {
        let prev = op_index - 1;
        let mut filter = Filter::default();
        let mut pred = pair.pred;
        let mut obj = pair.obj;

        if pair.obj_var {
            obj = self.reg(prev, pair.obj as VarId).entity();
            if obj == WILDCARD {
                filter.wildcard = true;
                filter.obj_wildcard = true;
                filter.hi_var = Some(pair.obj as VarId);
            }
        }

        if pair.pred_var {
            pred = self.reg(prev, pair.pred as VarId).entity();
            if pred == WILDCARD {
                if filter.wildcard {
                    filter.same_var = pair.pred == pair.obj;
                }
                filter.wildcard = true;
                filter.pred_wildcard = true;
                filter.lo_var = Some(pair.pred as VarId);
            }
        }

        filter.mask = if obj == 0 { pred } else { pair_id(pred, obj) };

        if filter.wildcard {
            filter.set_expr_mask();
        }

        filter
    }

    /// Write the halves of a matched element into the registers of the
    /// variables the filter left open.
    fn reify_variables(&mut self, frame: usize, filter: &Filter, ty: &[EntityId], column: usize) {
        let elem = ty[column];

        if let Some(lo) = filter.lo_var {
            debug_assert_eq!(self.rule.variables()[lo].kind, VarKind::Entity);
            self.set_reg(frame, lo, Reg::Entity(crate::entity::entity_lo(elem)));
        }
        if let Some(hi) = filter.hi_var {
            debug_assert_eq!(self.rule.variables()[hi].kind, VarKind::Entity);
            self.set_reg(frame, hi, Reg::Entity(entity_hi(elem)));
        }
    }

    /// Record the matched id for the operation's signature column.
    fn set_matched(&mut self, op: &Op, ty: &[EntityId], column: usize) {
        if let Some(c) = op.column {
            self.components[c] = ty[column];
        }
    }

    /// Resolve an input register (or the constant subject) to a table.
    fn table_from_reg(&self, op: &Op, op_index: usize) -> Option<TableId> {
        let world = self.rule.world();
        match op.r_in {
            None => {
                debug_assert!(op.subject != 0);
                world.table_from_entity(op.subject)
            }
            Some(r) => match self.rule.variables()[r].kind {
                VarKind::Table => self.reg(op_index, r).table(),
                VarKind::Entity => world.table_from_entity(self.reg(op_index, r).entity()),
            },
        }
    }

    // ---- operations ------------------------------------------------

    fn eval_op(&mut self, op: &Op, op_index: usize, redo: bool) -> bool {
        match op.kind {
            OpKind::Input => !redo,
            OpKind::Dfs => self.eval_dfs(op, op_index, redo),
            OpKind::Select => self.eval_select(op, op_index, redo),
            OpKind::With => self.eval_with(op, op_index, redo),
            OpKind::Each => self.eval_each(op, op_index, redo),
            // Yield only ever fails; the driver unwinds into the
            // previous operation on the next call.
            OpKind::Yield => false,
        }
    }

    /// Select: iterate the table set matching the filter, binding the
    /// output register to one table at a time.
    fn eval_select(&mut self, op: &Op, op_index: usize, redo: bool) -> bool {
        let world = self.rule.world();
        let Some(r) = op.r_out else {
            debug_assert!(false, "select without output register");
            return false;
        };
        let Some(col_slot) = op.column else {
            debug_assert!(false, "select without a signature column");
            return false;
        };

        let filter = self.pair_to_filter(op_index, op.param);
        let mut ctx = self.with_ctx(op_index);

        // Not a redo: resolve the table set anew, since variables may
        // have changed since the last visit.
        if !redo {
            ctx.set = world.table_set_pos(filter.mask);
            ctx.table_index = -1;
        }
        let Some(set_pos) = ctx.set else {
            self.put_with_ctx(op_index, ctx);
            return false;
        };
        let set = world.table_set_at(set_pos);

        let table;
        let column;
        if !redo {
            match find_next_table(world, set, &mut ctx.table_index, &filter, None) {
                Some(rec) => {
                    table = rec.table;
                    column = rec.column as i32;
                }
                None => {
                    self.put_with_ctx(op_index, ctx);
                    return false;
                }
            }
        } else {
            // Try more matches within the current table first, when the
            // filter has wildcards to expand.
            let mut next = -1;
            let cur_table = self.reg(op_index, r).table();
            if filter.wildcard {
                if let Some(t) = cur_table {
                    let ty = &world.table(t).ty;
                    let from = self.column_at(op_index, col_slot) + 1;
                    next = find_next_match(ty, from as usize, &filter)
                        .map(|c| c as i32)
                        .unwrap_or(-1);
                }
            }
            if next != -1 {
                table = cur_table.unwrap_or_default();
                column = next;
            } else {
                match find_next_table(world, set, &mut ctx.table_index, &filter, None) {
                    Some(rec) => {
                        table = rec.table;
                        column = rec.column as i32;
                    }
                    None => {
                        self.put_with_ctx(op_index, ctx);
                        return false;
                    }
                }
            }
        }

        self.put_with_ctx(op_index, ctx);
        self.set_reg(op_index, r, Reg::Table(table));
        self.set_column_at(op_index, col_slot, column);

        let ty = &world.table(table).ty;
        if filter.wildcard {
            self.reify_variables(op_index, &filter, ty, column as usize);
        }
        self.set_matched(op, ty, column as usize);
        true
    }

    /// With: probe the filter's table set for the input table in O(1),
    /// falling back to the transitive search when the predicate allows
    /// it.
    fn eval_with(&mut self, op: &Op, op_index: usize, redo: bool) -> bool {
        let world = self.rule.world();
        let filter = self.pair_to_filter(op_index, op.param);

        // Without wildcards there is at most one answer per input; a
        // redo has nothing more to yield.
        if redo && !filter.wildcard {
            return false;
        }

        let Some(col_slot) = op.column else {
            debug_assert!(false, "with without a signature column");
            return false;
        };

        let mut ctx = self.with_ctx(op_index);
        if !redo {
            ctx.set = world.table_set_pos(filter.mask);
            ctx.table_index = -1;
        }
        let set_pos = ctx.set;
        self.put_with_ctx(op_index, ctx);
        let Some(set_pos) = set_pos else {
            return false;
        };
        let set = world.table_set_at(set_pos);

        let Some(table) = self.table_from_reg(op, op_index) else {
            return false;
        };
        let ty = &world.table(table).ty;

        let mut new_column = -1;
        if !redo {
            if let Some(rec) = set.probe(table) {
                new_column = find_next_match(ty, rec.column, &filter)
                    .map(|c| c as i32)
                    .unwrap_or(-1);
            } else if !op.param.transitive && !filter.obj_wildcard {
                // The table does not carry the id, and no transitive
                // fallback applies.
                return false;
            }
        } else {
            let from = self.column_at(op_index, col_slot) + 1;
            new_column = find_next_match(ty, from as usize, &filter)
                .map(|c| c as i32)
                .unwrap_or(-1);
        }

        if new_column == -1 {
            if !filter.obj_wildcard && op.param.transitive {
                match self.transitive_probe(op.param, table, set, &filter) {
                    Some(c) => new_column = c as i32,
                    None => return false,
                }
            } else {
                return false;
            }
        }

        self.set_column_at(op_index, col_slot, new_column);
        if filter.wildcard {
            self.reify_variables(op_index, &filter, ty, new_column as usize);
        }
        self.set_matched(op, ty, new_column as usize);
        true
    }

    /// Walk the input table's occurrences of a transitive predicate and
    /// return the first column whose object reaches the filter's object
    /// through the relation.
    fn transitive_probe(
        &self,
        pair: Pair,
        table: TableId,
        table_set: &TableSet,
        filter: &Filter,
    ) -> Option<usize> {
        let world = self.rule.world();

        // Blank the object to a wildcard: every table carrying the
        // predicate, regardless of object.
        let mut tr_filter = filter.clone();
        tr_filter.mask = pair_id(pair.pred, WILDCARD);
        tr_filter.set_expr_mask();

        // The concrete-object set is a subset of this one, so the lookup
        // cannot reasonably fail.
        let all_for_pred = world.table_set(tr_filter.mask)?;
        let rec = all_for_pred.probe(table)?;

        let ty = &world.table(table).ty;
        let mut column = rec.column as i32 - 1;
        loop {
            column = find_next_match(ty, (column + 1) as usize, &tr_filter)? as i32;
            let obj = entity_hi(ty[column as usize]);
            if test_if_transitive(world, table_set, all_for_pred, obj, &tr_filter) {
                return Some(column as usize);
            }
        }
    }

    /// Dfs: depth-first traversal for transitive predicates. The root
    /// frame iterates the tables matching the filter directly; child
    /// frames follow rows upward through the relation, yielding every
    /// table that reaches the object transitively.
    fn eval_dfs(&mut self, op: &Op, op_index: usize, redo: bool) -> bool {
        let mut ctx = self.take_dfs_ctx(op_index);
        let matched = self.dfs_step(op, op_index, redo, &mut ctx);
        self.put_dfs_ctx(op_index, ctx);
        matched
    }

    fn dfs_step(&mut self, op: &Op, op_index: usize, redo: bool, ctx: &mut DfsCtx) -> bool {
        let world = self.rule.world();
        let pair = op.param;
        let root_filter = self.pair_to_filter(op_index, pair);

        if !redo {
            ctx.frames.clear();
            ctx.frames.reserve(16);
            ctx.visited.clear();

            let Some(set_pos) = world.table_set_pos(root_filter.mask) else {
                return false;
            };
            let set = world.table_set_at(set_pos);
            let mut table_index = -1;
            let Some(rec) = find_next_table(world, set, &mut table_index, &root_filter, None)
            else {
                return false;
            };
            ctx.visited.insert(rec.table as u32);
            ctx.frames.push(DfsFrame {
                set: set_pos,
                table_index,
                table: rec.table,
                row: 0,
                column: rec.column,
                filter: root_filter.clone(),
            });
            return self.dfs_yield(op, op_index, &ctx.frames, &root_filter);
        }

        debug_assert!(!ctx.frames.is_empty());
        let DfsCtx { frames, visited } = ctx;

        loop {
            // Find a frame with rows left, moving exhausted frames to
            // their next table or popping them.
            loop {
                let at_root = frames.len() == 1;
                let Some(frame) = frames.last_mut() else {
                    return false;
                };
                if frame.row < world.table(frame.table).count() {
                    break;
                }

                let set = world.table_set_at(frame.set);
                let skip = if at_root { None } else { Some(&*visited) };
                match find_next_table(world, set, &mut frame.table_index, &frame.filter, skip) {
                    Some(rec) => {
                        if at_root {
                            // Each root match starts its own traversal;
                            // earlier dedup state no longer applies.
                            visited.clear();
                        }
                        visited.insert(rec.table as u32);
                        frame.table = rec.table;
                        frame.row = 0;
                        frame.column = rec.column;
                        return self.dfs_yield(op, op_index, frames, &root_filter);
                    }
                    None => {
                        frames.pop();
                        match frames.last_mut() {
                            Some(parent) => parent.row += 1,
                            None => return false,
                        }
                    }
                }
            }

            // Follow the rows of the top frame: each entity keys a child
            // table set of the tables relating to it.
            loop {
                let top = frames.len() - 1;
                let (table, row) = {
                    let f = &frames[top];
                    (f.table, f.row)
                };
                let t = world.table(table);
                if row >= t.count() {
                    break;
                }
                let e = t.entities[row];

                // The object is now concrete; drop the register flag.
                let mut child_pair = pair;
                child_pair.obj_var = false;
                child_pair.obj = e;
                let child_filter = self.pair_to_filter(op_index, child_pair);

                let mut pushed = false;
                if let Some(set_pos) = world.table_set_pos(child_filter.mask) {
                    let set = world.table_set_at(set_pos);
                    let mut table_index = -1;
                    if let Some(rec) =
                        find_next_table(world, set, &mut table_index, &child_filter, Some(&*visited))
                    {
                        visited.insert(rec.table as u32);
                        frames.push(DfsFrame {
                            set: set_pos,
                            table_index,
                            table: rec.table,
                            row: 0,
                            column: rec.column,
                            filter: child_filter,
                        });
                        pushed = true;
                    }
                }

                if pushed {
                    return self.dfs_yield(op, op_index, frames, &root_filter);
                }
                frames[top].row += 1;
            }
        }
    }

    /// Publish the top frame's table as the Dfs result. Wildcard
    /// variables reify from the root frame's match: the traversal binds
    /// the object once per root match, while deeper frames supply the
    /// subjects that reach it.
    fn dfs_yield(
        &mut self,
        op: &Op,
        op_index: usize,
        frames: &[DfsFrame],
        root_filter: &Filter,
    ) -> bool {
        let world = self.rule.world();
        let Some(r) = op.r_out else {
            debug_assert!(false, "dfs without output register");
            return false;
        };
        let top = match frames.last() {
            Some(f) => f,
            None => return false,
        };

        self.set_reg(op_index, r, Reg::Table(top.table));
        let top_ty = &world.table(top.table).ty;
        if let Some(col_slot) = op.column {
            self.set_column_at(op_index, col_slot, top.column as i32);
        }
        self.set_matched(op, top_ty, top.column);

        if root_filter.wildcard {
            let root = &frames[0];
            let root_ty = &world.table(root.table).ty;
            self.reify_variables(op_index, root_filter, root_ty, root.column);
        }
        true
    }

    /// Each: forward the entities of the input table one row at a time,
    /// skipping builtin sentinels.
    fn eval_each(&mut self, op: &Op, op_index: usize, redo: bool) -> bool {
        let world = self.rule.world();
        let (Some(r_in), Some(r_out)) = (op.r_in, op.r_out) else {
            debug_assert!(false, "each without registers");
            return false;
        };
        debug_assert_eq!(self.rule.variables()[r_in].kind, VarKind::Table);
        debug_assert_eq!(self.rule.variables()[r_out].kind, VarKind::Entity);

        let Some(table) = self.reg(op_index, r_in).table() else {
            return false;
        };
        let entities = &world.table(table).entities;

        let mut ctx = self.each_ctx(op_index);
        let mut row = if redo { ctx.row + 1 } else { 0 };

        while let Some(&e) = entities.get(row) {
            // Sentinels must not leak into user-visible results.
            if e == WILDCARD || e == THIS {
                row += 1;
                continue;
            }
            ctx.row = row;
            self.put_each_ctx(op_index, ctx);
            self.set_reg(op_index, r_out, Reg::Entity(e));
            return true;
        }

        self.put_each_ctx(op_index, ctx);
        false
    }

    // ---- results ---------------------------------------------------

    /// Materialize the result visible between `next` calls from the
    /// yield operation's frame.
    fn publish(&mut self, cur: usize) {
        let world = self.rule.world();
        self.result_frame = cur;

        self.out_columns.clear();
        for c in 0..self.ncols {
            self.out_columns.push(self.column_at(cur, c) + 1);
        }

        let op = &self.rule.operations()[cur];
        let Some(r) = op.r_in else {
            // No `.` variable: the rule yields a boolean outcome and the
            // reified variables.
            self.result_table = None;
            self.count = 0;
            self.offset = 0;
            return;
        };

        match self.rule.variables()[r].kind {
            VarKind::Table => match self.reg(cur, r).table() {
                Some(t) => {
                    self.result_table = Some(t);
                    self.count = world.table(t).count();
                    self.offset = 0;
                }
                None => {
                    debug_assert!(false, "yield register holds no table");
                    self.result_table = None;
                    self.count = 0;
                    self.offset = 0;
                }
            },
            VarKind::Entity => {
                let e = self.reg(cur, r).entity();
                match world.record(e) {
                    Some(rec) => {
                        self.result_table = Some(rec.table);
                        self.count = 1;
                        self.offset = rec.row;
                    }
                    None => {
                        // A matched entity always has a table.
                        debug_assert!(false, "yielded entity has no record");
                        self.result_table = None;
                        self.count = 0;
                        self.offset = 0;
                    }
                }
            }
        }
    }

    /// Drop scratch state once the program has terminated; no partial
    /// results linger.
    fn release(&mut self) {
        self.registers = Vec::new();
        self.columns = Vec::new();
        self.op_ctx = Vec::new();
        self.components = Vec::new();
        self.out_columns = Vec::new();
        self.result_table = None;
        self.count = 0;
        self.offset = 0;
    }
}

/// Advance `table_index` through a table set to the next non-empty table
/// with a column matching the filter. Tables in `skip` are passed over.
fn find_next_table(
    world: &World,
    set: &TableSet,
    table_index: &mut i32,
    filter: &Filter,
    skip: Option<&RoaringBitmap>,
) -> Option<TableRecord> {
    if *table_index >= set.len() as i32 {
        return None;
    }
    loop {
        *table_index += 1;
        let rec = set.get(*table_index as usize)?;
        if let Some(skip) = skip {
            if skip.contains(rec.table as u32) {
                continue;
            }
        }
        let table = world.table(rec.table);
        if table.count() == 0 {
            continue;
        }
        if let Some(column) = find_next_match(&table.ty, rec.column, filter) {
            return Some(TableRecord {
                table: rec.table,
                column,
            });
        }
    }
}

/// Does `start_obj` reach the queried object through the transitive
/// predicate? Membership in `table_set` (the concrete-object set)
/// answers directly; otherwise the object's own occurrences of the
/// predicate are followed. The visited set is per table: entities
/// sharing a table share a type and therefore the same out-edges.
fn test_if_transitive(
    world: &World,
    table_set: &TableSet,
    all_for_pred: &TableSet,
    start_obj: EntityId,
    tr_filter: &Filter,
) -> bool {
    let mut stack = vec![start_obj];
    let mut visited = RoaringBitmap::new();

    while let Some(obj) = stack.pop() {
        // No table: no relationships at all.
        let Some(table) = world.table_from_entity(obj) else {
            continue;
        };
        if table_set.probe(table).is_some() {
            return true;
        }
        if !visited.insert(table as u32) {
            continue;
        }
        let Some(rec) = all_for_pred.probe(table) else {
            continue;
        };
        let ty = &world.table(table).ty;
        let mut column = Some(rec.column);
        while let Some(c) = column {
            stack.push(entity_hi(ty[c]));
            column = find_next_match(ty, c + 1, tr_filter);
        }
    }

    false
}
