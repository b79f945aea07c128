//! Program emission.
//!
//! Walks terms in variable order and emits a linear operation sequence.
//! Every operation gets the standard jump wiring on insertion: `on_ok`
//! points at the slot after it, `on_fail` at the operation before it, so
//! a failing operation retries its predecessor with `redo` set.
//!
//! Emission order:
//!
//! 1. `Input` at position 0.
//! 2. A `With` per term whose subject is a constant entity.
//! 3. Per subject variable in sort order, an operation per term it is
//!    the subject of: `With` if it is already written, otherwise
//!    `Select` (or `Dfs` for a transitive pair) which writes it.
//! 4. An `Each` per entity variable still unwritten, fed from its Table
//!    companion.
//! 5. `Yield`.

use crate::entity::EntityId;
use crate::sig::{Signature, Term};
use crate::store::World;

use super::pair::{term_to_pair, Pair};
use super::vars::{find_variable, VarId, VarKind, Variable};

/// Operation kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    /// Placeholder first instruction; succeeds once, fails on redo.
    Input,
    /// Follow a transitive relationship depth-first.
    Dfs,
    /// Iterate all tables matching a pair filter.
    Select,
    /// Apply a pair filter to a table or entity.
    With,
    /// Forward each entity in a table.
    Each,
    /// Return a result.
    Yield,
}

/// A single operation.
#[derive(Clone, Debug)]
pub struct Op {
    pub kind: OpKind,
    /// Pair filter parameter, meaningful for Dfs/Select/With.
    pub param: Pair,
    /// Constant subject, used when `r_in` is `None`.
    pub subject: EntityId,
    /// Jump target on success; `-1` terminates.
    pub on_ok: i32,
    /// Jump target on failure; `-1` terminates.
    pub on_fail: i32,
    /// Signature column this operation matches, for column tracking.
    pub column: Option<usize>,
    pub r_in: Option<VarId>,
    pub r_out: Option<VarId>,
    pub has_in: bool,
    pub has_out: bool,
}

/// Emit the operation sequence for an analyzed rule.
pub fn emit_program(
    world: &World,
    sig: &Signature,
    vars: &[Variable],
    subject_count: usize,
) -> Vec<Op> {
    let mut emitter = Emitter {
        world,
        terms: &sig.terms,
        vars,
        ops: Vec::new(),
        written: vec![false; vars.len()],
    };

    // Input's first evaluation jumps to the first real operation; its
    // redo returns false, which ends the program as op becomes -1.
    emitter.ops.push(Op {
        kind: OpKind::Input,
        param: Pair::default(),
        subject: 0,
        on_ok: 1,
        on_fail: -1,
        column: None,
        r_in: None,
        r_out: None,
        has_in: false,
        has_out: false,
    });

    // Constant-subject terms first: they iterate one entity's type and
    // narrow the search cheaply.
    for (c, term) in sig.terms.iter().enumerate() {
        if term.subject.is_var() {
            continue;
        }
        emitter.write_term_variables(term, c);

        let subject = match &term.subject {
            crate::sig::TermRef::Entity(e) => *e,
            _ => unreachable!("constant subject"),
        };
        debug_assert!(subject != 0);

        let i = emitter.insert_operation(Some(c));
        let op = &mut emitter.ops[i];
        op.kind = OpKind::With;
        op.has_in = true;
        op.subject = subject;
    }

    // Subject variables in dependency order.
    for v in 0..subject_count {
        debug_assert_eq!(vars[v].kind, VarKind::Table);

        for (c, term) in sig.terms.iter().enumerate() {
            if term.subject.var_name() != Some(vars[v].name.as_str()) {
                continue;
            }

            let entity_var = find_variable(vars, Some(VarKind::Entity), &vars[v].name);
            let entity_written = entity_var.map_or(false, |e| emitter.written[e]);
            let table_written = emitter.written[v];

            // Predicate and object variables become written by this
            // operation, with an Each injected where a table has to be
            // expanded first.
            emitter.write_term_variables(term, c);

            let i = emitter.insert_operation(Some(c));
            let op = &mut emitter.ops[i];
            if entity_written {
                // The subject is known as an entity; filter its type.
                op.kind = OpKind::With;
                op.has_in = true;
                op.r_in = entity_var;
            } else if table_written {
                op.kind = OpKind::With;
                op.has_in = true;
                op.r_in = Some(v);
            } else {
                op.kind = if op.param.transitive {
                    OpKind::Dfs
                } else {
                    OpKind::Select
                };
                op.has_out = true;
                op.r_out = Some(v);
                emitter.written[v] = true;
            }
        }
    }

    // Every subject variable is now written in one incarnation or the
    // other.
    for v in 0..subject_count {
        if !emitter.written[v] {
            let entity_var = find_variable(vars, Some(VarKind::Entity), &vars[v].name);
            debug_assert!(entity_var.map_or(false, |e| emitter.written[e]));
        }
    }

    // Entity variables constrained only through a shared predicate or
    // object have no operation writing them yet; expand them from their
    // Table companion so the iterator returns every permutation.
    for v in subject_count..vars.len() {
        if emitter.written[v] {
            continue;
        }
        debug_assert_eq!(vars[v].kind, VarKind::Entity);
        let Some(table_var) = find_variable(vars, Some(VarKind::Table), &vars[v].name) else {
            debug_assert!(false, "no table companion for '{}'", vars[v].name);
            continue;
        };
        let i = emitter.insert_operation(None);
        let op = &mut emitter.ops[i];
        op.kind = OpKind::Each;
        op.r_in = Some(table_var);
        op.r_out = Some(v);
        op.has_in = true;
        op.has_out = true;
        emitter.written[v] = true;
    }

    // Yield closes the program; it only ever fails, unwinding into the
    // operation before it.
    let yield_index = emitter.ops.len();
    emitter.ops.push(Op {
        kind: OpKind::Yield,
        param: Pair::default(),
        subject: 0,
        on_ok: -1,
        on_fail: yield_index as i32 - 1,
        column: None,
        // A rule may bind `.` both as a table and as the entities in it;
        // prefer the entity so the iterator yields single rows.
        r_in: find_variable(vars, Some(VarKind::Entity), ".")
            .or_else(|| find_variable(vars, Some(VarKind::Table), ".")),
        r_out: None,
        has_in: true,
        has_out: false,
    });

    emitter.ops
}

struct Emitter<'a> {
    world: &'a World,
    terms: &'a [Term],
    vars: &'a [Variable],
    ops: Vec<Op>,
    written: Vec<bool>,
}

impl<'a> Emitter<'a> {
    /// Append an operation with the standard jump wiring and, when it
    /// stems from a term, that term's compiled pair.
    fn insert_operation(&mut self, column: Option<usize>) -> usize {
        let index = self.ops.len();
        let param = column
            .map(|c| term_to_pair(self.world, self.vars, &self.terms[c]))
            .unwrap_or_default();
        self.ops.push(Op {
            kind: OpKind::With,
            param,
            subject: 0,
            on_ok: index as i32 + 1,
            on_fail: index as i32 - 1,
            column,
            r_in: None,
            r_out: None,
            has_in: false,
            has_out: false,
        });
        index
    }

    fn write_term_variables(&mut self, term: &Term, column: usize) {
        if let Some(name) = term.pred.var_name() {
            self.write_variable(name, column);
        }
        if let Some(name) = term.object.as_ref().and_then(|o| o.var_name()) {
            self.write_variable(name, column);
        }
    }

    /// Mark a predicate/object variable as written, inserting an Each
    /// when only its Table incarnation has a value so far.
    fn write_variable(&mut self, name: &str, column: usize) {
        let tvar = find_variable(self.vars, Some(VarKind::Table), name);
        let Some(evar) = find_variable(self.vars, Some(VarKind::Entity), name) else {
            debug_assert!(false, "variable '{}' not declared as entity", name);
            return;
        };

        // Table variables usually resolve before they are used as a
        // predicate or object; with cyclic dependencies that is not
        // guaranteed, so only expand tables that have a value.
        if let Some(tvar) = tvar {
            if self.written[tvar] && !self.written[evar] {
                let i = self.insert_operation(Some(column));
                let op = &mut self.ops[i];
                op.kind = OpKind::Each;
                op.has_in = true;
                op.has_out = true;
                op.r_in = Some(tvar);
                op.r_out = Some(evar);
            }
        }

        // The entity is either written here or by the operation being
        // emitted for this term.
        self.written[evar] = true;
    }
}
