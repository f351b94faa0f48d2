//! Recursive descent parser for filter rule text.
//!
//! ```text
//! rules      := [ group { ';' [ group ] } ]
//! group      := '{' [ expr { ',' expr } ] '}'
//! expr       := and_expr { ( 'or' | '||' ) and_expr }
//! and_expr   := term { ( 'and' | '&&' ) term }
//! term       := '(' expr ')' | comparison
//! comparison := ident ( '=' | '!=' | '<' | '<=' | '>' | '>=' ) literal
//!             | ident ( 'in' | 'notin' ) '[' [ literal { ',' literal } ] ']'
//! ```
//!
//! `and` binds tighter than `or`, and both fold to the right. Only parentheses
//! count towards the nesting limit. Every parser owns its lexer, so compiles
//! never share state.

use crate::condition::ast::{Node, NumberLiteral, Op, RegexLiteral, WhereCondition, WhereConditions};
use crate::condition::errors::ParseError;
use crate::condition::lexer::Lexer;
use crate::condition::token::{Token, TokenKind};
use regex::Regex;

const MAX_DEPTH: usize = 128;

pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
    depth: usize,
}

impl<'src> Parser<'src> {
    #[must_use]
    pub fn new(source: &'src str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = next_significant(&mut lexer);
        Self {
            lexer,
            current,
            depth: 0,
        }
    }

    pub fn parse(mut self) -> Result<WhereConditions, ParseError> {
        let mut groups = Vec::new();
        loop {
            match self.current.kind {
                TokenKind::Eof => break,
                TokenKind::Semicolon => {
                    self.bump();
                }
                TokenKind::LBrace => {
                    groups.push(self.parse_group()?);
                    match self.current.kind {
                        TokenKind::Semicolon | TokenKind::Eof => {}
                        _ => return Err(self.unexpected("`;` or end of input")),
                    }
                }
                _ => return Err(self.unexpected("`{`")),
            }
        }
        Ok(WhereConditions(groups))
    }

    fn parse_group(&mut self) -> Result<WhereCondition, ParseError> {
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut conditions = Vec::new();
        if self.current.kind != TokenKind::RBrace {
            loop {
                conditions.push(self.parse_expr()?);
                if self.current.kind == TokenKind::Comma {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "`}` or `,`")?;
        Ok(WhereCondition { conditions })
    }

    fn parse_expr(&mut self) -> Result<Node, ParseError> {
        let first = self.parse_and()?;
        let mut rest = Vec::new();
        while self.current.kind == TokenKind::Or {
            self.bump();
            rest.push(self.parse_and()?);
        }
        Ok(fold_right(Op::Or, first, rest))
    }

    fn parse_and(&mut self) -> Result<Node, ParseError> {
        let first = self.parse_term()?;
        let mut rest = Vec::new();
        while self.current.kind == TokenKind::And {
            self.bump();
            rest.push(self.parse_term()?);
        }
        Ok(fold_right(Op::And, first, rest))
    }

    fn parse_term(&mut self) -> Result<Node, ParseError> {
        if self.current.kind == TokenKind::LParen {
            self.enter()?;
            self.bump();
            let inner = self.parse_expr()?;
            self.expect(&TokenKind::RParen, "`)`")?;
            self.depth -= 1;
            return Ok(Node::Paren(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Node, ParseError> {
        let lhs = match &self.current.kind {
            TokenKind::Ident(name) | TokenKind::RawString(name) => Node::Identifier(name.clone()),
            _ => return Err(self.unexpected("identifier or `(`")),
        };
        self.bump();

        let op = match self.current.kind {
            TokenKind::Eq => Op::Eq,
            TokenKind::Neq => Op::Neq,
            TokenKind::Lt => Op::Lt,
            TokenKind::Lte => Op::Lte,
            TokenKind::Gt => Op::Gt,
            TokenKind::Gte => Op::Gte,
            TokenKind::In => Op::In,
            TokenKind::NotIn => Op::NotIn,
            _ => return Err(self.unexpected("comparison operator")),
        };
        self.bump();

        let rhs = match op {
            Op::In | Op::NotIn => self.parse_list()?,
            _ => self.parse_literal()?,
        };
        Ok(Node::binary(op, lhs, rhs))
    }

    fn parse_list(&mut self) -> Result<Node, ParseError> {
        self.expect(&TokenKind::LBracket, "`[`")?;
        let mut items = Vec::new();
        if self.current.kind != TokenKind::RBracket {
            loop {
                items.push(self.parse_literal()?);
                if self.current.kind == TokenKind::Comma {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "`]` or `,`")?;
        Ok(Node::ListLiteral(items))
    }

    fn parse_literal(&mut self) -> Result<Node, ParseError> {
        let token = self.bump();
        match token.kind {
            TokenKind::String(s) | TokenKind::RawString(s) => Ok(Node::StringLiteral(s)),
            TokenKind::Number(text) => parse_number(&text, false).map(Node::NumberLiteral),
            TokenKind::Minus => self.parse_signed(true),
            TokenKind::Plus => self.parse_signed(false),
            TokenKind::True => Ok(Node::BoolLiteral(true)),
            TokenKind::False => Ok(Node::BoolLiteral(false)),
            TokenKind::Re => self.parse_regex(),
            TokenKind::Nil | TokenKind::Duration(_) => Err(ParseError::UnsupportedLiteral {
                pos: token.pos,
                found: token.text,
            }),
            TokenKind::Error(msg) => Err(ParseError::Lex {
                pos: token.pos,
                msg,
            }),
            other => Err(unexpected_token(token.pos, &other, "literal")),
        }
    }

    fn parse_signed(&mut self, negative: bool) -> Result<Node, ParseError> {
        let token = self.bump();
        match token.kind {
            TokenKind::Number(text) => parse_number(&text, negative).map(Node::NumberLiteral),
            TokenKind::Error(msg) => Err(ParseError::Lex {
                pos: token.pos,
                msg,
            }),
            other => Err(unexpected_token(token.pos, &other, "number after sign")),
        }
    }

    /// `re` has been consumed; parses `('pattern')` or ``(`pattern`)``.
    fn parse_regex(&mut self) -> Result<Node, ParseError> {
        self.expect(&TokenKind::LParen, "`(` after `re`")?;
        let token = self.bump();
        let pattern = match token.kind {
            TokenKind::String(s) | TokenKind::RawString(s) => s,
            TokenKind::Error(msg) => {
                return Err(ParseError::Lex {
                    pos: token.pos,
                    msg,
                });
            }
            other => return Err(unexpected_token(token.pos, &other, "regex pattern")),
        };
        self.expect(&TokenKind::RParen, "`)`")?;
        let regex = Regex::new(&pattern).map_err(|e| ParseError::InvalidRegex {
            pattern: pattern.clone(),
            msg: e.to_string(),
        })?;
        Ok(Node::Regex(RegexLiteral { pattern, regex }))
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn bump(&mut self) -> Token {
        let next = next_significant(&mut self.lexer);
        std::mem::replace(&mut self.current, next)
    }

    fn expect(&mut self, kind: &TokenKind, expected: &'static str) -> Result<Token, ParseError> {
        if &self.current.kind == kind {
            Ok(self.bump())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        unexpected_token(self.current.pos, &self.current.kind, expected)
    }
}

fn unexpected_token(pos: usize, kind: &TokenKind, expected: &'static str) -> ParseError {
    match kind {
        TokenKind::Error(msg) => ParseError::Lex {
            pos,
            msg: msg.clone(),
        },
        TokenKind::Eof => ParseError::UnexpectedEof(expected),
        other => ParseError::Unexpected {
            pos,
            found: other.to_string(),
            expected,
        },
    }
}

/// `a op b op c` becomes `a op (b op c)`.
fn fold_right(op: Op, first: Node, mut rest: Vec<Node>) -> Node {
    let Some(mut node) = rest.pop() else {
        return first;
    };
    while let Some(lhs) = rest.pop() {
        node = Node::binary(op, lhs, node);
    }
    Node::binary(op, first, node)
}

fn next_significant(lexer: &mut Lexer<'_>) -> Token {
    loop {
        let token = lexer.next_token();
        if !token.kind.is_trivia() {
            return token;
        }
    }
}

/// Integer first (`0x` hex, leading-zero octal, decimal), then float.
fn parse_number(text: &str, negative: bool) -> Result<NumberLiteral, ParseError> {
    if let Some(magnitude) = parse_unsigned(text) {
        let signed = if negative {
            -i128::from(magnitude)
        } else {
            i128::from(magnitude)
        };
        if let Ok(value) = i64::try_from(signed) {
            return Ok(NumberLiteral::int(value));
        }
    }

    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(NumberLiteral::float(if negative {
            -value
        } else {
            value
        })),
        _ => Err(ParseError::InvalidNumber(if negative {
            format!("-{text}")
        } else {
            text.to_string()
        })),
    }
}

fn parse_unsigned(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok();
    }
    if text.len() > 1 && text.starts_with('0') {
        return u64::from_str_radix(&text[1..], 8).ok();
    }
    text.parse::<u64>().ok()
}
