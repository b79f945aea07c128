//! Quarry: a rule solver for an archetype entity store.
//!
//! A rule is a conjunction of terms over entities, predicates, and
//! objects, where any position may be a named variable:
//!
//! ```text
//! Eats(., Apple), Knows(., Bob)
//! ```
//!
//! Compiling a rule produces a small bytecode program; iterating it runs
//! a backtracking VM against the world and yields every assignment of
//! the variables that satisfies all terms. Predicates marked transitive
//! are chased depth-first through the relation graph.

pub mod ast;
pub mod entity;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod sig;
pub mod solver;
pub mod store;

pub use entity::{EntityId, TableId, THIS, TRANSITIVE, WILDCARD};
pub use error::{RuleError, RuleErrorKind, RuleResult};
pub use sig::{Signature, Term, TermRef};
pub use solver::{Rule, RuleIter, VarId, VarKind};
pub use store::{Record, Table, TableRecord, TableSet, World};
