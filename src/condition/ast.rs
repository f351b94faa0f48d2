//! Syntax tree for compiled filter conditions.
//!
//! `Display` renders a tree back to rule text that compiles to an equal tree.

use crate::condition::lexer::is_bare_identifier;
use regex::Regex;
use std::fmt::{self, Write};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    And,
    Or,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
}

impl Op {
    #[must_use]
    pub fn is_logical(self) -> bool {
        matches!(self, Op::And | Op::Or)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Op::And => "and",
            Op::Or => "or",
            Op::Eq => "=",
            Op::Neq => "!=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::In => "in",
            Op::NotIn => "notin",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NumberLiteral {
    pub is_int: bool,
    pub int: i64,
    pub float: f64,
}

impl NumberLiteral {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn int(value: i64) -> Self {
        Self {
            is_int: true,
            int: value,
            float: value as f64,
        }
    }

    #[must_use]
    pub fn float(value: f64) -> Self {
        Self {
            is_int: false,
            int: 0,
            float: value,
        }
    }
}

/// A `re(...)` pattern, compiled once when the rule is parsed.
#[derive(Clone, Debug)]
pub struct RegexLiteral {
    pub pattern: String,
    pub regex: Regex,
}

impl PartialEq for RegexLiteral {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BinaryExpr {
    pub op: Op,
    pub lhs: Node,
    pub rhs: Node,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Identifier(String),
    StringLiteral(String),
    NumberLiteral(NumberLiteral),
    BoolLiteral(bool),
    ListLiteral(Vec<Node>),
    Regex(RegexLiteral),
    Binary(Box<BinaryExpr>),
    Paren(Box<Node>),
}

impl Node {
    #[must_use]
    pub fn binary(op: Op, lhs: Node, rhs: Node) -> Self {
        Node::Binary(Box::new(BinaryExpr { op, lhs, rhs }))
    }

    /// The binary expression this node denotes, looking through parentheses.
    #[must_use]
    pub fn as_binary(&self) -> Option<&BinaryExpr> {
        match self {
            Node::Binary(expr) => Some(expr),
            Node::Paren(inner) => inner.as_binary(),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Identifier(name) => {
                if is_bare_identifier(name) {
                    f.write_str(name)
                } else {
                    write!(f, "`{name}`")
                }
            }
            Node::StringLiteral(s) => write_quoted(f, s),
            Node::NumberLiteral(n) => {
                if n.is_int {
                    write!(f, "{}", n.int)
                } else {
                    write!(f, "{:?}", n.float)
                }
            }
            Node::BoolLiteral(b) => write!(f, "{b}"),
            Node::ListLiteral(items) => {
                f.write_char('[')?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_char(']')
            }
            Node::Regex(re) => {
                if re.pattern.contains('`') {
                    f.write_str("re(")?;
                    write_quoted(f, &re.pattern)?;
                    f.write_char(')')
                } else {
                    write!(f, "re(`{}`)", re.pattern)
                }
            }
            Node::Binary(expr) => write!(f, "{} {} {}", expr.lhs, expr.op, expr.rhs),
            Node::Paren(inner) => write!(f, "({inner})"),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('\'')?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\'' => f.write_str("\\'")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c.is_ascii_control() => write!(f, "\\x{:02x}", u32::from(c))?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('\'')
}

/// Nodes that must all hold. An empty group always holds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WhereCondition {
    pub conditions: Vec<Node>,
}

impl fmt::Display for WhereCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return f.write_str("{}");
        }
        f.write_str("{ ")?;
        for (i, node) in self.conditions.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{node}")?;
        }
        f.write_str(" }")
    }
}

/// Groups of which at least one must hold.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WhereConditions(pub Vec<WhereCondition>);

impl WhereConditions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn extend(&mut self, other: WhereConditions) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WhereCondition> {
        self.0.iter()
    }
}

impl fmt::Display for WhereConditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, group) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{group}")?;
        }
        Ok(())
    }
}
