//! The rule solver.
//!
//! Compiles a declarative rule expression — a conjunction of
//! `Predicate(Subject)` and `Predicate(Subject, Object)` terms, any slot
//! of which may be a variable — into a small bytecode program, and
//! evaluates that program against a world to enumerate every assignment
//! of the variables that satisfies all terms.
//!
//! Compilation runs in three passes: the signature is parsed and
//! resolved ([`crate::sig`]), variables are discovered and ordered
//! ([`vars`]), and the operation sequence is emitted ([`emit`]).
//! Evaluation is a backtracking VM ([`iter`]) that yields one result per
//! [`RuleIter::next`] call.
//!
//! ```
//! use quarry::{Rule, World};
//!
//! let mut world = World::new();
//! let eats = world.entity("Eats");
//! let apple = world.entity("Apple");
//! let alice = world.entity("Alice");
//! world.add_pair(alice, eats, apple);
//!
//! let rule = Rule::new(&world, "Eats(., Apple)").unwrap();
//! let mut it = rule.iter();
//! while it.next() {
//!     for &e in it.entities() {
//!         assert_eq!(e, alice);
//!     }
//! }
//! ```

mod emit;
mod iter;
mod pair;
mod pretty;
mod vars;

pub use emit::{Op, OpKind};
pub use iter::RuleIter;
pub use pair::{find_next_match, term_to_pair, Filter, Pair};
pub use vars::{find_variable, VarId, VarKind, Variable, MAX_VARIABLE_COUNT};

use crate::error::RuleResult;
use crate::sig::Signature;
use crate::store::World;

/// A compiled rule: the analyzed variables and the operation sequence,
/// bound to the world it was compiled against.
///
/// Rules are read-only once constructed; any number of iterators may
/// borrow one.
#[derive(Debug)]
pub struct Rule<'w> {
    world: &'w World,
    sig: Signature,
    vars: Vec<Variable>,
    subject_variable_count: usize,
    ops: Vec<Op>,
}

impl<'w> Rule<'w> {
    /// Compile an expression against a world.
    pub fn new(world: &'w World, expr: &str) -> RuleResult<Rule<'w>> {
        let sig = Signature::new(world, expr)?;
        let (vars, subject_variable_count) = vars::scan_variables(&sig)?;
        let ops = emit::emit_program(world, &sig, &vars, subject_variable_count);

        Ok(Rule {
            world,
            sig,
            vars,
            subject_variable_count,
            ops,
        })
    }

    /// The world this rule was compiled against.
    pub fn world(&self) -> &'w World {
        self.world
    }

    /// The source expression.
    pub fn expr(&self) -> &str {
        &self.sig.expr
    }

    /// The compiled operation sequence.
    pub fn operations(&self) -> &[Op] {
        &self.ops
    }

    /// The analyzed variables, in emission order.
    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }

    pub fn variable_count(&self) -> usize {
        self.vars.len()
    }

    pub fn subject_variable_count(&self) -> usize {
        self.subject_variable_count
    }

    /// Number of terms in the signature.
    pub fn column_count(&self) -> usize {
        self.sig.column_count()
    }

    /// Find an entity variable by name.
    pub fn find_variable(&self, name: &str) -> Option<VarId> {
        vars::find_variable(&self.vars, Some(VarKind::Entity), name)
    }

    pub fn variable_name(&self, var: VarId) -> &str {
        &self.vars[var].name
    }

    pub fn variable_is_entity(&self, var: VarId) -> bool {
        self.vars[var].kind == VarKind::Entity
    }

    /// Start iterating the rule's results.
    pub fn iter<'a>(&'a self) -> RuleIter<'a> {
        RuleIter::new(self)
    }
}
