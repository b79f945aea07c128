//! Resolved rule signatures.
//!
//! The parser produces names; this module resolves them against a world.
//! `.` becomes the `This` placeholder, a name registered in the world
//! becomes a concrete entity, and anything else becomes a named variable.
//! The resolved term list is what the variable analyzer and the emitter
//! consume.

use crate::ast::{Slot, TermAst};
use crate::entity::EntityId;
use crate::error::{format_lexer_errors, format_parser_errors, RuleError, RuleResult};
use crate::lexer::lexer;
use crate::parser::parser;
use crate::store::World;
use chumsky::Parser;

/// A resolved term slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TermRef {
    /// The `.` placeholder.
    This,
    /// A concrete entity.
    Entity(EntityId),
    /// A named variable.
    Var(String),
}

impl TermRef {
    /// The variable name this slot binds under, if it is one. `.` is the
    /// variable named `"."`.
    pub fn var_name(&self) -> Option<&str> {
        match self {
            TermRef::This => Some("."),
            TermRef::Var(name) => Some(name),
            TermRef::Entity(_) => None,
        }
    }

    /// Is this slot a variable (including `.`)?
    pub fn is_var(&self) -> bool {
        !matches!(self, TermRef::Entity(_))
    }
}

/// A resolved term: predicate applied to a subject and optional object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Term {
    pub pred: TermRef,
    pub subject: TermRef,
    pub object: Option<TermRef>,
}

/// A parsed and resolved rule expression.
#[derive(Clone, Debug)]
pub struct Signature {
    /// The source expression, kept for diagnostics and display.
    pub expr: String,
    pub terms: Vec<Term>,
}

impl Signature {
    /// Parse `expr` and resolve its names against `world`.
    pub fn new(world: &World, expr: &str) -> RuleResult<Signature> {
        let tokens = lexer()
            .parse(expr)
            .map_err(|errs| RuleError::parse(expr, format_lexer_errors(expr, errs)))?;

        let token_stream: Vec<_> = tokens.iter().cloned().collect();
        let len = expr.len();

        let ast = parser()
            .parse(chumsky::Stream::from_iter(
                len..len + 1,
                token_stream.into_iter(),
            ))
            .map_err(|errs| RuleError::parse(expr, format_parser_errors(expr, errs, &tokens)))?;

        let terms = ast
            .terms
            .iter()
            .map(|t| resolve_term(world, t))
            .collect();

        Ok(Signature {
            expr: expr.to_string(),
            terms,
        })
    }

    /// Number of terms (columns) in the signature.
    pub fn column_count(&self) -> usize {
        self.terms.len()
    }
}

fn resolve_term(world: &World, term: &TermAst) -> Term {
    Term {
        pred: resolve_slot(world, &term.pred),
        subject: resolve_slot(world, &term.subject),
        object: term.object.as_ref().map(|o| resolve_slot(world, o)),
    }
}

fn resolve_slot(world: &World, slot: &Slot) -> TermRef {
    match slot {
        Slot::This => TermRef::This,
        Slot::Name(name) => match world.lookup(name) {
            Some(e) => TermRef::Entity(e),
            None => TermRef::Var(name.clone()),
        },
    }
}
