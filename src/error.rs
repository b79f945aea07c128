//! Error types and diagnostics for rule compilation.
//!
//! Compile errors carry the offending expression so the rendered message
//! reads `error: <expression>: <what went wrong>`. Lexer and parser
//! failures are formatted with ariadne into a labeled report over the
//! expression source.

use ariadne::{Color, Label, Report, ReportKind, Source};
use chumsky::prelude::Simple;
use std::ops::Range;

use crate::lexer::Token;

/// What went wrong while compiling a rule.
#[derive(Clone, Debug)]
pub enum RuleErrorKind {
    /// The expression failed to lex or parse. Carries the rendered report.
    Parse(String),
    /// The rule declares more subject variables than the register file
    /// can address.
    TooManyVariables,
    /// A subject variable is unreachable from the root.
    UnconstrainedVariable(String),
}

/// A rule compile error, tied to the expression that produced it.
#[derive(Clone, Debug)]
pub struct RuleError {
    pub expr: String,
    pub kind: RuleErrorKind,
}

pub type RuleResult<T> = Result<T, RuleError>;

impl RuleError {
    pub fn parse(expr: &str, report: String) -> Self {
        RuleError {
            expr: expr.to_string(),
            kind: RuleErrorKind::Parse(report),
        }
    }

    pub fn too_many_variables(expr: &str) -> Self {
        RuleError {
            expr: expr.to_string(),
            kind: RuleErrorKind::TooManyVariables,
        }
    }

    pub fn unconstrained_variable(expr: &str, name: &str) -> Self {
        RuleError {
            expr: expr.to_string(),
            kind: RuleErrorKind::UnconstrainedVariable(name.to_string()),
        }
    }
}

impl std::fmt::Display for RuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            RuleErrorKind::Parse(report) => {
                write!(f, "error: {}: invalid expression\n{}", self.expr, report)
            }
            RuleErrorKind::TooManyVariables => {
                write!(f, "error: {}: too many variables in rule", self.expr)
            }
            RuleErrorKind::UnconstrainedVariable(name) => {
                write!(f, "error: {}: unconstrained variable '{}'", self.expr, name)
            }
        }
    }
}

impl std::error::Error for RuleError {}

/// Format lexer errors into a user-friendly report
pub fn format_lexer_errors(source: &str, errors: Vec<Simple<char>>) -> String {
    let mut output = Vec::new();

    for error in errors {
        let span = error.span();
        let found = error
            .found()
            .map(|c| format!("'{}'", c))
            .unwrap_or_else(|| "end of input".to_string());

        let report = Report::build(ReportKind::Error, (), span.start)
            .with_message("Lexical error")
            .with_label(
                Label::new(span.clone())
                    .with_message(format!("Unexpected {}", found))
                    .with_color(Color::Red),
            );

        if report
            .finish()
            .write(Source::from(source), &mut output)
            .is_err()
        {
            return "error formatting failed".to_string();
        }
    }

    String::from_utf8(output).unwrap_or_else(|_| "error formatting failed".to_string())
}

/// Format parser errors into a user-friendly report
pub fn format_parser_errors(
    source: &str,
    errors: Vec<Simple<Token>>,
    token_spans: &[(Token, Range<usize>)],
) -> String {
    let mut output = Vec::new();

    for error in errors {
        let span = error.span();

        // Parser spans are token indices; map them back to character
        // ranges so the label lands on the right slice of the source.
        let char_span = if span.start < token_spans.len() {
            token_spans[span.start].1.clone()
        } else if let Some((_, last)) = token_spans.last() {
            last.end..last.end
        } else {
            0..0
        };

        let report = Report::build(ReportKind::Error, (), char_span.start)
            .with_message("Parse error")
            .with_label(
                Label::new(char_span.clone())
                    .with_message(format_parser_error(&error))
                    .with_color(Color::Red),
            );

        if report
            .finish()
            .write(Source::from(source), &mut output)
            .is_err()
        {
            return "error formatting failed".to_string();
        }
    }

    String::from_utf8(output).unwrap_or_else(|_| "error formatting failed".to_string())
}

fn format_parser_error(error: &Simple<Token>) -> String {
    use chumsky::error::SimpleReason;

    let found = error
        .found()
        .map(|t| format!("'{}'", t))
        .unwrap_or_else(|| "end of input".to_string());

    if let SimpleReason::Custom(msg) = error.reason() {
        return msg.clone();
    }

    let expected: Vec<String> = error
        .expected()
        .filter_map(|opt| opt.as_ref())
        .map(|t| format!("'{}'", t))
        .collect();

    if expected.is_empty() {
        format!("Unexpected token {}", found)
    } else {
        format!("Unexpected {}, expected one of: {}", found, expected.join(", "))
    }
}
