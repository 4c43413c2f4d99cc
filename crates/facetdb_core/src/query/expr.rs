//! Filter expressions.

use crate::error::{CoreError, CoreResult};
use crate::schema::{ToValue, ID_FIELD};
use facetdb_codec::{Document, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// Equal. Integers and floats compare by numeric value.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Text contains substring, list contains element, or object has key.
    Contains,
}

/// A side-effect free predicate over a document.
///
/// Expressions are plain data: they serialize with a `kind` tag, so a filter
/// can be built on a game client and shipped to the server.
///
/// # Example
///
/// ```rust
/// use facetdb_core::query::{field, Expr};
///
/// let rich_johns = field("name").equals("John").and(field("coins").greater_than(100));
/// let json = serde_json::to_string(&rich_johns).unwrap();
/// assert!(json.contains(r#""kind":"and""#));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// Value at a dotted field path, null when absent.
    Field {
        /// Dotted path such as `stats.level`.
        path: String,
    },
    /// A constant.
    Literal {
        /// The constant value.
        value: Value,
    },
    /// Binary comparison.
    Compare {
        /// The operator.
        op: CompareOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// True when every operand is true. Empty is true.
    And {
        /// Operands.
        operands: Vec<Expr>,
    },
    /// True when any operand is true. Empty is false.
    Or {
        /// Operands.
        operands: Vec<Expr>,
    },
    /// Negation.
    Not {
        /// The negated expression.
        operand: Box<Expr>,
    },
}

/// Starts an expression at a field path.
pub fn field(path: impl Into<String>) -> Expr {
    Expr::Field { path: path.into() }
}

/// A literal operand.
pub fn literal(value: impl ToValue) -> Expr {
    Expr::Literal {
        value: value.to_value(),
    }
}

impl Expr {
    fn compare(self, op: CompareOp, rhs: impl ToValue) -> Expr {
        Expr::Compare {
            op,
            left: Box::new(self),
            right: Box::new(literal(rhs)),
        }
    }

    /// `self == rhs`
    #[must_use]
    pub fn equals(self, rhs: impl ToValue) -> Expr {
        self.compare(CompareOp::Eq, rhs)
    }

    /// `self != rhs`
    #[must_use]
    pub fn not_equals(self, rhs: impl ToValue) -> Expr {
        self.compare(CompareOp::Ne, rhs)
    }

    /// `self < rhs`
    #[must_use]
    pub fn less_than(self, rhs: impl ToValue) -> Expr {
        self.compare(CompareOp::Lt, rhs)
    }

    /// `self <= rhs`
    #[must_use]
    pub fn at_most(self, rhs: impl ToValue) -> Expr {
        self.compare(CompareOp::Le, rhs)
    }

    /// `self > rhs`
    #[must_use]
    pub fn greater_than(self, rhs: impl ToValue) -> Expr {
        self.compare(CompareOp::Gt, rhs)
    }

    /// `self >= rhs`
    #[must_use]
    pub fn at_least(self, rhs: impl ToValue) -> Expr {
        self.compare(CompareOp::Ge, rhs)
    }

    /// Substring, element or key containment.
    #[must_use]
    pub fn contains(self, rhs: impl ToValue) -> Expr {
        self.compare(CompareOp::Contains, rhs)
    }

    /// Conjunction, flattening nested `And`s.
    #[must_use]
    pub fn and(self, other: Expr) -> Expr {
        let mut operands = match self {
            Expr::And { operands } => operands,
            single => vec![single],
        };
        match other {
            Expr::And { operands: more } => operands.extend(more),
            single => operands.push(single),
        }
        Expr::And { operands }
    }

    /// Disjunction.
    #[must_use]
    pub fn or(self, other: Expr) -> Expr {
        let mut operands = match self {
            Expr::Or { operands } => operands,
            single => vec![single],
        };
        operands.push(other);
        Expr::Or { operands }
    }

    /// Logical negation.
    #[must_use]
    pub fn negate(self) -> Expr {
        Expr::Not {
            operand: Box::new(self),
        }
    }

    /// Conjunction of a filter list. An empty list matches everything.
    #[must_use]
    pub fn all(filters: impl IntoIterator<Item = Expr>) -> Expr {
        filters
            .into_iter()
            .fold(Expr::And { operands: Vec::new() }, Expr::and)
    }

    /// Evaluates the expression as a value.
    #[must_use]
    pub fn evaluate(&self, doc: &Document) -> Value {
        match self {
            Expr::Field { path } => doc.get_path(path).cloned().unwrap_or(Value::Null),
            Expr::Literal { value } => value.clone(),
            _ => Value::Bool(self.matches(doc)),
        }
    }

    /// Evaluates the expression as a predicate.
    ///
    /// A bare field or literal is true only when it is `true`.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Expr::Field { .. } | Expr::Literal { .. } => {
                self.evaluate(doc) == Value::Bool(true)
            }
            Expr::Compare { op, left, right } => {
                compare(*op, &left.evaluate(doc), &right.evaluate(doc))
            }
            Expr::And { operands } => operands.iter().all(|e| e.matches(doc)),
            Expr::Or { operands } => operands.iter().any(|e| e.matches(doc)),
            Expr::Not { operand } => !operand.matches(doc),
        }
    }

    /// Field assignments every match must satisfy.
    ///
    /// Collects `field == literal` comparisons reachable through `And` only.
    /// Used by `first_or_create` to pre-populate a new instance.
    #[must_use]
    pub fn implied_assignments(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        self.collect_assignments(&mut out);
        out
    }

    fn collect_assignments(&self, out: &mut BTreeMap<String, Value>) {
        match self {
            Expr::And { operands } => {
                for operand in operands {
                    operand.collect_assignments(out);
                }
            }
            Expr::Compare {
                op: CompareOp::Eq,
                left,
                right,
            } => match (left.as_ref(), right.as_ref()) {
                (Expr::Field { path }, Expr::Literal { value })
                | (Expr::Literal { value }, Expr::Field { path }) => {
                    out.insert(path.clone(), value.clone());
                }
                _ => {}
            },
            _ => {}
        }
    }

    /// Stable text form of the expression, used to name predicate locks.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if a literal cannot be printed.
    pub fn fingerprint(&self) -> CoreResult<String> {
        serde_json::to_string(self)
            .map_err(|e| CoreError::invalid_operation(format!("unprintable filter: {e}")))
    }

    /// Returns the id pinned by an `id == literal` conjunct, if any.
    #[must_use]
    pub fn implied_id(&self) -> Option<String> {
        self.implied_assignments()
            .remove(ID_FIELD)
            .and_then(|v| v.as_text().map(str::to_string))
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    match op {
        CompareOp::Eq => loosely_equal(left, right),
        CompareOp::Ne => !loosely_equal(left, right),
        CompareOp::Lt => order(left, right) == Some(Ordering::Less),
        CompareOp::Le => matches!(order(left, right), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => order(left, right) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(
            order(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CompareOp::Contains => contains(left, right),
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            order(left, right) == Some(Ordering::Equal)
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loosely_equal(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|w| loosely_equal(v, w)))
        }
        _ => left == right,
    }
}

/// Ordering between values of comparable kinds; `None` otherwise.
fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            left.as_float()?.partial_cmp(&right.as_float()?)
        }
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Text(text), Value::Text(part)) => text.contains(part.as_str()),
        (Value::Array(items), _) => items.iter().any(|item| loosely_equal(item, needle)),
        (Value::Map(map), Value::Text(key)) => map.contains_key(key),
        _ => false,
    }
}
