//! Surface syntax for rule expressions.
//!
//! A rule expression is a comma-separated conjunction of terms. Each term
//! applies a predicate to a subject and an optional object:
//!
//! ```text
//! Eats(., Apple), Knows(., Bob)
//! ```
//!
//! Any slot may be the `.` placeholder or a name. Names are not resolved
//! here; resolution against a world (entity, variable, or `This`) happens
//! in [`crate::sig`].

/// One slot of a term before name resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    /// The `.` placeholder.
    This,
    /// An identifier, resolved later against the world.
    Name(String),
}

impl Slot {
    /// The name this slot resolves variables under. `.` is the variable
    /// named `"."`.
    pub fn name(&self) -> &str {
        match self {
            Slot::This => ".",
            Slot::Name(s) => s,
        }
    }
}

/// A parsed term: `pred(subject)` or `pred(subject, object)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermAst {
    pub pred: Slot,
    pub subject: Slot,
    pub object: Option<Slot>,
}

/// A parsed rule expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExprAst {
    pub terms: Vec<TermAst>,
}
