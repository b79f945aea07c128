//! Parser for rule expressions.
//!
//! Parses token streams into the term list AST.

use chumsky::prelude::*;

use crate::ast::{ExprAst, Slot, TermAst};
use crate::lexer::Token;

/// Create a parser for a complete rule expression
pub fn parser() -> impl Parser<Token, ExprAst, Error = Simple<Token>> + Clone {
    term()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .then_ignore(end())
        .map(|terms| ExprAst { terms })
}

fn ident() -> impl Parser<Token, String, Error = Simple<Token>> + Clone {
    select! {
        Token::Ident(s) => s,
    }
}

/// Parse a slot: `.` or an identifier
fn slot() -> impl Parser<Token, Slot, Error = Simple<Token>> + Clone {
    just(Token::Dot)
        .to(Slot::This)
        .or(ident().map(Slot::Name))
}

/// Parse a term: `pred`, `pred(subject)` or `pred(subject, object)`.
/// A bare predicate is shorthand for applying it to `.`.
fn term() -> impl Parser<Token, TermAst, Error = Simple<Token>> + Clone {
    let args = slot()
        .then(just(Token::Comma).ignore_then(slot()).or_not())
        .delimited_by(just(Token::LParen), just(Token::RParen));

    slot().then(args.or_not()).map(|(pred, args)| match args {
        Some((subject, object)) => TermAst {
            pred,
            subject,
            object,
        },
        None => TermAst {
            pred,
            subject: Slot::This,
            object: None,
        },
    })
}
