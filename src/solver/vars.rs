//! Variable discovery, dependency analysis, and ordering.
//!
//! Subject variables drive iteration: one is elected root (`.` takes
//! precedence, otherwise the most-occurring subject), every other
//! variable's depth is its distance from the root in the term dependency
//! graph, and the final variable order — `(kind, depth, -occurs, -id)` —
//! decides emission order. A subject variable the root cannot reach is
//! unconstrained and rejects the whole rule.
//!
//! A single name may exist twice: once as a Table variable (it appears as
//! a subject) and once as an Entity variable (it appears as a predicate
//! or object, or its per-entity value is needed). The two records are
//! correlated by name; they are never collapsed.

use crate::error::{RuleError, RuleResult};
use crate::sig::{Signature, Term, TermRef};

/// Variable id: index into the rule's variable array (after sorting).
pub type VarId = usize;

/// Upper bound on subject variables in one rule.
pub const MAX_VARIABLE_COUNT: usize = 256;

/// Depth sentinel: not yet assigned.
pub const DEPTH_MAX: u8 = u8::MAX;

/// Variable kind. Table sorts before Entity; the emitter relies on
/// subject (Table) variables occupying the low ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum VarKind {
    Table,
    Entity,
}

/// A rule variable.
#[derive(Clone, Debug)]
pub struct Variable {
    pub kind: VarKind,
    pub name: String,
    pub id: VarId,
    /// Number of subject occurrences, for root election and ordering.
    pub occurs: u32,
    /// Distance from the root, `DEPTH_MAX` until assigned.
    pub depth: u8,
    /// Cycle-detection flag for the depth DFS.
    pub marked: bool,
}

/// Find a variable by name. `None` kind matches any; Table variables are
/// created first, so a dual-kinded name resolves to its Table record.
pub fn find_variable(vars: &[Variable], kind: Option<VarKind>, name: &str) -> Option<VarId> {
    vars.iter()
        .position(|v| v.name == name && kind.map_or(true, |k| k == v.kind))
}

/// Scan the signature for variables and put them in dependency order.
/// Returns the sorted variable array and the subject variable count.
pub fn scan_variables(sig: &Signature) -> RuleResult<(Vec<Variable>, usize)> {
    let mut analyzer = Analyzer {
        terms: &sig.terms,
        vars: Vec::new(),
        subject_count: 0,
    };

    // Phase 1: collect candidate roots. Only subjects can be elected, so
    // predicates and objects are not considered here.
    let mut this_var = None;
    let mut max_occur = 0;
    let mut max_occur_var = None;

    for term in &sig.terms {
        let Some(name) = term.subject.var_name() else {
            continue;
        };
        let subj = match find_variable(&analyzer.vars, Some(VarKind::Table), name) {
            Some(v) => v,
            None => {
                if analyzer.vars.len() >= MAX_VARIABLE_COUNT {
                    return Err(RuleError::too_many_variables(&sig.expr));
                }
                analyzer.create(VarKind::Table, name)
            }
        };
        if matches!(term.subject, TermRef::This) {
            this_var = Some(subj);
        }
        analyzer.vars[subj].occurs += 1;
        if analyzer.vars[subj].occurs > max_occur {
            max_occur = analyzer.vars[subj].occurs;
            max_occur_var = Some(subj);
        }
    }

    analyzer.subject_count = analyzer.vars.len();

    // Phase 2: materialize every used name as an Entity variable, so the
    // array is frozen before emission.
    analyzer.ensure_all();

    // Phase 3: elect a root. `.` wins; otherwise the subject with the
    // most occurrences. No subject variables means the rule operates on
    // fixed entities and needs no ordering at all.
    let Some(root) = this_var.or(max_occur_var) else {
        let subject_count = analyzer.subject_count;
        return Ok((analyzer.vars, subject_count));
    };

    // Phase 4: assign depths.
    analyzer.get_variable_depth(root, root);

    // Phase 5: a subject variable the root never reached is unconstrained.
    for v in &analyzer.vars[..analyzer.subject_count] {
        if v.depth == DEPTH_MAX {
            return Err(RuleError::unconstrained_variable(&sig.expr, &v.name));
        }
    }

    // Phase 6: sort by (kind, depth, -occurs, -id) and rewrite ids to
    // match the new positions.
    analyzer
        .vars
        .sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then(a.depth.cmp(&b.depth))
                .then(b.occurs.cmp(&a.occurs))
                .then(b.id.cmp(&a.id))
        });
    for (i, v) in analyzer.vars.iter_mut().enumerate() {
        v.id = i;
    }

    let subject_count = analyzer.subject_count;
    Ok((analyzer.vars, subject_count))
}

struct Analyzer<'a> {
    terms: &'a [Term],
    vars: Vec<Variable>,
    subject_count: usize,
}

impl<'a> Analyzer<'a> {
    fn create(&mut self, kind: VarKind, name: &str) -> VarId {
        let id = self.vars.len();
        self.vars.push(Variable {
            kind,
            name: name.to_string(),
            id,
            occurs: 0,
            depth: DEPTH_MAX,
            marked: false,
        });
        id
    }

    fn ensure(&mut self, kind: VarKind, name: &str) -> VarId {
        match find_variable(&self.vars, Some(kind), name) {
            Some(v) => v,
            None => self.create(kind, name),
        }
    }

    fn ensure_all(&mut self) {
        let terms = self.terms;
        for term in terms {
            if let Some(name) = term.pred.var_name() {
                self.ensure(VarKind::Entity, name);
            }
            // A named variable subject also needs an entity incarnation so
            // the program returns all permutations. `.` subjects do not;
            // they may yield as a whole table.
            if let TermRef::Var(name) = &term.subject {
                self.ensure(VarKind::Entity, name);
            }
            if let Some(name) = term.object.as_ref().and_then(|o| o.var_name()) {
                self.ensure(VarKind::Entity, name);
            }
        }
    }

    /// First variable (any kind) the slot refers to.
    fn slot_var(&self, slot: &TermRef) -> Option<VarId> {
        slot.var_name().and_then(|n| find_variable(&self.vars, None, n))
    }

    fn obj_var(&self, term: &Term) -> Option<VarId> {
        term.object.as_ref().and_then(|o| self.slot_var(o))
    }

    fn is_subject(&self, var: VarId) -> bool {
        var < self.subject_count
    }

    /// Depth contributed by one neighbor variable.
    fn get_depth_from_var(&mut self, var: VarId, root: VarId) -> u8 {
        // The root's own depth is still unset on first entry; wrapping
        // makes it contribute zero, i.e. the root is distance -1 from
        // itself while its depth is being computed.
        if var == root || self.vars[var].depth != DEPTH_MAX {
            return self.vars[var].depth.wrapping_add(1);
        }

        // Already being evaluated: a cycle. Stop.
        if self.vars[var].marked {
            return 0;
        }

        let depth = self.get_variable_depth(var, root);
        if depth == DEPTH_MAX {
            depth
        } else {
            depth + 1
        }
    }

    /// Depth of `cur` as constrained by one of its terms, whose predicate
    /// and object subject-variables are `pred` and `obj` (if any).
    fn get_depth_from_term(
        &mut self,
        cur: VarId,
        pred: Option<VarId>,
        obj: Option<VarId>,
        root: VarId,
    ) -> u8 {
        let mut result = DEPTH_MAX;

        // Neither part is a variable: no dependencies from this term.
        if pred.is_none() && obj.is_none() {
            return 0;
        }

        if let Some(pred) = pred {
            if pred != cur {
                let depth = self.get_depth_from_var(pred, root);
                if depth == DEPTH_MAX {
                    return DEPTH_MAX;
                }
                if depth < result {
                    result = depth;
                }
            }
        }

        if let Some(obj) = obj {
            if obj != cur {
                let depth = self.get_depth_from_var(obj, root);
                if depth == DEPTH_MAX {
                    return DEPTH_MAX;
                }
                if depth < result {
                    result = depth;
                }
            }
        }

        result
    }

    /// Depth of the dependency tree from `var` to the root.
    fn get_variable_depth(&mut self, var: VarId, root: VarId) -> u8 {
        self.vars[var].marked = true;

        let terms = self.terms;
        let mut result = DEPTH_MAX;

        for term in terms {
            if self.slot_var(&term.subject) != Some(var) {
                continue;
            }
            // Only subject variables constrain depth; a predicate or
            // object that is never itself a subject is treated as fixed.
            let pred = self.slot_var(&term.pred).filter(|&p| self.is_subject(p));
            let obj = self.obj_var(term).filter(|&o| self.is_subject(o));

            let depth = self.get_depth_from_term(var, pred, obj, root);
            if depth < result {
                result = depth;
            }
        }

        if result == DEPTH_MAX {
            // No variable dependencies: fixed with respect to the root.
            result = 0;
        }
        self.vars[var].depth = result;

        // Depths flow from subject to (pred, obj). Subjects related only
        // through a shared object — `P(X, Y), Q(Z, Y)` — are not found by
        // that walk, so follow the predicate and object links too.
        for term in terms {
            if self.slot_var(&term.subject) != Some(var) {
                continue;
            }
            self.crawl_variable(var, root);
            if let Some(pred) = self.slot_var(&term.pred) {
                if pred != var {
                    self.crawl_variable(pred, root);
                }
            }
            if let Some(obj) = self.obj_var(term) {
                if obj != var {
                    self.crawl_variable(obj, root);
                }
            }
        }

        self.vars[var].depth
    }

    /// Visit every variable co-occurring with `var` in some term and give
    /// it a depth if it does not have one yet.
    fn crawl_variable(&mut self, var: VarId, root: VarId) {
        let terms = self.terms;
        for term in terms {
            let pred = self.slot_var(&term.pred);
            let subj = self.slot_var(&term.subject);
            let obj = self.obj_var(term);

            if pred != Some(var) && subj != Some(var) && obj != Some(var) {
                continue;
            }

            for other in [pred, subj, obj].into_iter().flatten() {
                if other != var && !self.vars[other].marked {
                    self.get_variable_depth(other, root);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::World;

    fn scan(world: &World, expr: &str) -> RuleResult<(Vec<Variable>, usize)> {
        scan_variables(&Signature::new(world, expr).unwrap())
    }

    fn world_with_knows() -> World {
        let mut w = World::new();
        w.entity("Knows");
        w.entity("Eats");
        w.entity("Apple");
        w.entity("Bob");
        w
    }

    #[test]
    fn this_subject_creates_a_table_variable() {
        let w = world_with_knows();
        let (vars, subjects) = scan(&w, "Knows(., Bob)").unwrap();
        assert_eq!(subjects, 1);
        assert_eq!(vars[0].kind, VarKind::Table);
        assert_eq!(vars[0].name, ".");
        assert_eq!(vars[0].depth, 0);
    }

    #[test]
    fn object_variables_become_entity_variables() {
        let w = world_with_knows();
        let (vars, subjects) = scan(&w, "Knows(., X)").unwrap();
        assert_eq!(subjects, 1);
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[1].kind, VarKind::Entity);
        assert_eq!(vars[1].name, "X");
    }

    #[test]
    fn named_subjects_get_entity_twins() {
        let w = world_with_knows();
        let (vars, subjects) = scan(&w, "Knows(X, Bob)").unwrap();
        assert_eq!(subjects, 1);
        // Table X plus Entity X.
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].kind, VarKind::Table);
        assert_eq!(vars[1].kind, VarKind::Entity);
        assert_eq!(vars[0].name, vars[1].name);
    }

    #[test]
    fn unconstrained_subject_is_rejected() {
        let w = world_with_knows();
        let err = scan(&w, "Knows(X, Y), Eats(Z, Apple)").unwrap_err();
        assert!(err.to_string().contains("unconstrained variable 'Z'"));
    }

    #[test]
    fn chained_subjects_are_all_constrained() {
        let w = world_with_knows();
        let (vars, subjects) = scan(&w, "Knows(X, Y), Knows(Y, Z)").unwrap();
        assert_eq!(subjects, 2);
        for v in &vars[..subjects] {
            assert_eq!(v.kind, VarKind::Table);
            assert_ne!(v.depth, DEPTH_MAX);
        }
    }

    #[test]
    fn sort_orders_by_kind_depth_then_occurrences() {
        let w = world_with_knows();
        let (vars, _) = scan(&w, "Knows(X, Y), Knows(Y, Z), Eats(X, Apple)").unwrap();
        for pair in vars.windows(2) {
            let key = |v: &Variable| (v.kind, v.depth, std::cmp::Reverse(v.occurs));
            assert!(key(&pair[0]) <= key(&pair[1]));
        }
        // Ids are rewritten to match the sorted positions.
        for (i, v) in vars.iter().enumerate() {
            assert_eq!(v.id, i);
        }
    }

    #[test]
    fn subjects_linked_by_shared_object_are_found() {
        let w = world_with_knows();
        let (vars, subjects) = scan(&w, "Knows(X, Y), Eats(Z, Y)").unwrap();
        assert_eq!(subjects, 2);
        for v in &vars[..subjects] {
            assert_ne!(v.depth, DEPTH_MAX);
        }
    }
}
