//! Error types for rule compilation

use thiserror::Error;

/// Reasons a rule string failed to compile. The first error aborts the whole string.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("lex error at {pos}: {msg}")]
    Lex { pos: usize, msg: String },
    #[error("unexpected {found} at {pos}, expected {expected}")]
    Unexpected {
        pos: usize,
        found: String,
        expected: &'static str,
    },
    #[error("invalid number literal `{0}`")]
    InvalidNumber(String),
    #[error("invalid regex `{pattern}`: {msg}")]
    InvalidRegex { pattern: String, msg: String },
    #[error("unsupported literal {found} at {pos}")]
    UnsupportedLiteral { pos: usize, found: String },
    #[error("expression nested deeper than {0} levels")]
    TooDeep(usize),
    #[error("unexpected end of input, expected {0}")]
    UnexpectedEof(&'static str),
}
