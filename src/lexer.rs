//! Lexer for rule expressions.
//!
//! Tokenizes an expression into a stream for the parser.

use chumsky::prelude::*;
use std::ops::Range;

/// Token types for rule expressions
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Token {
    /// Identifier: predicate, entity, or variable name
    Ident(String),
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `(`
    LParen,
    /// `)`
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{}", s),
            Token::Dot => write!(f, "."),
            Token::Comma => write!(f, ","),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

/// Type alias for spans
pub type Span = Range<usize>;

/// Create a lexer for rule expressions
pub fn lexer() -> impl Parser<char, Vec<(Token, Span)>, Error = Simple<char>> {
    let ident = text::ident().map(Token::Ident);

    let punctuation = choice((
        just('.').to(Token::Dot),
        just(',').to(Token::Comma),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
    ));

    // Comments: // to end of line (handles both mid-expression and EOF)
    let line_comment = just("//")
        .then(none_of('\n').repeated())
        .then(just('\n').or_not())
        .ignored();

    let token_or_skip = line_comment
        .to(None)
        .or(ident.or(punctuation).map(Some));

    token_or_skip
        .map_with_span(|opt_tok, span| opt_tok.map(|tok| (tok, span)))
        .padded()
        .repeated()
        .then_ignore(end())
        .map(|items| items.into_iter().flatten().collect())
}
