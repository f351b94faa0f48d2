//! Evaluation of compiled conditions against a point.
//!
//! Evaluation is total: type mismatches, absent keys and malformed trees all
//! resolve to a plain `false` (or `true` for `notin` on an absent key).

use crate::condition::ast::{BinaryExpr, Node, Op, WhereCondition, WhereConditions};
use crate::point::{FieldValue, Point};
use std::cmp::Ordering;
use std::collections::HashMap;

const FLOAT_EPSILON: f64 = 1e-9;

/// The view of a point that conditions are matched against.
#[derive(Clone, Copy, Debug)]
pub struct Subject<'a> {
    /// Identifier that resolves to `name`, e.g. `measurement` for metrics.
    pub name_key: Option<&'a str>,
    pub name: &'a str,
    pub tags: &'a HashMap<String, String>,
    pub fields: &'a HashMap<String, FieldValue>,
}

impl<'a> Subject<'a> {
    #[must_use]
    pub fn new(
        name_key: Option<&'a str>,
        name: &'a str,
        tags: &'a HashMap<String, String>,
        fields: &'a HashMap<String, FieldValue>,
    ) -> Self {
        Self {
            name_key,
            name,
            tags,
            fields,
        }
    }

    #[must_use]
    pub fn from_point(point: &'a Point, name_key: Option<&'a str>) -> Self {
        Self::new(name_key, &point.name, &point.tags, &point.fields)
    }

    fn lookup(&self, key: &str) -> Option<Value<'a>> {
        if self.name_key == Some(key) {
            return Some(Value::Str(self.name));
        }
        if let Some(tag) = self.tags.get(key) {
            return Some(Value::Str(tag));
        }
        self.fields.get(key).map(Value::from)
    }
}

#[derive(Clone, Copy, Debug)]
enum Value<'a> {
    Str(&'a str),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl<'a> From<&'a FieldValue> for Value<'a> {
    fn from(value: &'a FieldValue) -> Self {
        match value {
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::Int(*i),
            FieldValue::UInt(u) => Value::UInt(*u),
            FieldValue::Float(f) => Value::Float(*f),
            FieldValue::String(s) => Value::Str(s),
        }
    }
}

impl Value<'_> {
    fn as_int(self) -> Option<i128> {
        match self {
            Value::Int(i) => Some(i128::from(i)),
            Value::UInt(u) => Some(i128::from(u)),
            _ => None,
        }
    }
}

fn literal_value(node: &Node) -> Option<Value<'_>> {
    match node {
        Node::StringLiteral(s) => Some(Value::Str(s)),
        Node::NumberLiteral(n) if n.is_int => Some(Value::Int(n.int)),
        Node::NumberLiteral(n) => Some(Value::Float(n.float)),
        Node::BoolLiteral(b) => Some(Value::Bool(*b)),
        _ => None,
    }
}

impl WhereConditions {
    /// True if any group holds.
    #[must_use]
    pub fn eval(&self, subject: &Subject<'_>) -> bool {
        self.iter().any(|group| group.eval(subject))
    }
}

impl WhereCondition {
    /// True if every node holds. Top-level nodes must be binary expressions.
    #[must_use]
    pub fn eval(&self, subject: &Subject<'_>) -> bool {
        self.conditions
            .iter()
            .all(|node| node.as_binary().is_some_and(|expr| eval_binary(expr, subject)))
    }
}

/// Evaluates a single node. Non-expression nodes never hold.
#[must_use]
pub fn eval(node: &Node, subject: &Subject<'_>) -> bool {
    node.as_binary()
        .is_some_and(|expr| eval_binary(expr, subject))
}

fn eval_binary(expr: &BinaryExpr, subject: &Subject<'_>) -> bool {
    if !expr.op.is_logical() {
        return compare(expr.op, &expr.lhs, &expr.rhs, subject);
    }

    // Chains lean right, so walk the spine instead of recursing into it.
    let op = expr.op;
    let short_circuit = op == Op::Or;
    let mut current = expr;
    loop {
        if eval(&current.lhs, subject) == short_circuit {
            return short_circuit;
        }
        match current.rhs.as_binary() {
            Some(next) if next.op == op => current = next,
            _ => return eval(&current.rhs, subject),
        }
    }
}

fn compare(op: Op, lhs: &Node, rhs: &Node, subject: &Subject<'_>) -> bool {
    let Node::Identifier(key) = lhs else {
        return false;
    };
    let Some(value) = subject.lookup(key) else {
        return op == Op::NotIn;
    };

    match (op, rhs) {
        (Op::In, Node::ListLiteral(items)) => items.iter().any(|item| equals(value, item)),
        (Op::NotIn, Node::ListLiteral(items)) => !items.iter().any(|item| equals(value, item)),
        (Op::In | Op::NotIn, _) | (_, Node::ListLiteral(_)) => false,
        (Op::Eq, _) => equals(value, rhs),
        (Op::Neq, _) => !equals(value, rhs),
        (Op::Lt, _) => ordering(value, rhs).is_some_and(Ordering::is_lt),
        (Op::Lte, _) => ordering(value, rhs).is_some_and(Ordering::is_le),
        (Op::Gt, _) => ordering(value, rhs).is_some_and(Ordering::is_gt),
        (Op::Gte, _) => ordering(value, rhs).is_some_and(Ordering::is_ge),
        (Op::And | Op::Or, _) => false,
    }
}

fn equals(value: Value<'_>, literal: &Node) -> bool {
    if let Node::Regex(re) = literal {
        return matches!(value, Value::Str(s) if re.regex.is_match(s));
    }
    let Some(expected) = literal_value(literal) else {
        return false;
    };
    match (value, expected) {
        (Value::Float(a), Value::Float(b)) => (a - b).abs() < FLOAT_EPSILON,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (a, b) => match (a.as_int(), b.as_int()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn ordering(value: Value<'_>, literal: &Node) -> Option<Ordering> {
    let expected = literal_value(literal)?;
    match (value, expected) {
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(&b),
        (Value::Str(a), Value::Str(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
        (Value::Bool(_), _) | (_, Value::Bool(_)) => None,
        (a, b) => Some(a.as_int()?.cmp(&b.as_int()?)),
    }
}
