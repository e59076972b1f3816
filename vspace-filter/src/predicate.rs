//! Predicates over a single column's values.

use std::cmp::Ordering;
use std::ops::Bound;

use crate::value::ScalarValue;

/// Comparison against a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// A predicate over one column's values.
///
/// The set of variants is closed; composite predicates are built with
/// [`Predicate::And`].
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        op: CompareOp,
        value: ScalarValue,
    },
    Range {
        lower: Bound<ScalarValue>,
        upper: Bound<ScalarValue>,
    },
    In(Vec<ScalarValue>),
    And(Vec<Predicate>),
}

fn is(a: &ScalarValue, b: &ScalarValue, accept: impl Fn(Ordering) -> bool) -> bool {
    a.compare(b).is_some_and(accept)
}

fn lt(a: &ScalarValue, b: &ScalarValue) -> bool {
    is(a, b, |o| o == Ordering::Less)
}

fn le(a: &ScalarValue, b: &ScalarValue) -> bool {
    is(a, b, |o| o != Ordering::Greater)
}

fn gt(a: &ScalarValue, b: &ScalarValue) -> bool {
    is(a, b, |o| o == Ordering::Greater)
}

fn ge(a: &ScalarValue, b: &ScalarValue) -> bool {
    is(a, b, |o| o != Ordering::Less)
}

fn eq(a: &ScalarValue, b: &ScalarValue) -> bool {
    is(a, b, |o| o == Ordering::Equal)
}

impl Predicate {
    /// Return `true` when `value` satisfies the predicate.
    ///
    /// Incomparable values (mismatched kinds, NaN) never match.
    pub fn matches(&self, value: &ScalarValue) -> bool {
        match self {
            Predicate::Compare { op, value: target } => match op {
                CompareOp::Eq => eq(value, target),
                CompareOp::NotEq => is(value, target, |o| o != Ordering::Equal),
                CompareOp::Lt => lt(value, target),
                CompareOp::LtEq => le(value, target),
                CompareOp::Gt => gt(value, target),
                CompareOp::GtEq => ge(value, target),
            },
            Predicate::Range { lower, upper } => {
                let lower_ok = match lower {
                    Bound::Included(l) => ge(value, l),
                    Bound::Excluded(l) => gt(value, l),
                    Bound::Unbounded => true,
                };
                let upper_ok = match upper {
                    Bound::Included(u) => le(value, u),
                    Bound::Excluded(u) => lt(value, u),
                    Bound::Unbounded => true,
                };
                lower_ok && upper_ok
            }
            Predicate::In(values) => values.iter().any(|target| eq(value, target)),
            Predicate::And(children) => children.iter().all(|child| child.matches(value)),
        }
    }

    /// Return `true` only when no value in `[min, max]` can satisfy the
    /// predicate, so a chunk with these bounds may be skipped.
    ///
    /// Every comparison that cannot be decided answers "keep".
    pub fn can_skip(&self, min: &ScalarValue, max: &ScalarValue) -> bool {
        match self {
            Predicate::Compare { op, value } => match op {
                CompareOp::Eq => lt(value, min) || gt(value, max),
                CompareOp::NotEq => eq(min, value) && eq(max, value),
                CompareOp::Lt => ge(min, value),
                CompareOp::LtEq => gt(min, value),
                CompareOp::Gt => le(max, value),
                CompareOp::GtEq => lt(max, value),
            },
            Predicate::Range { lower, upper } => {
                let below = match lower {
                    Bound::Included(l) => lt(max, l),
                    Bound::Excluded(l) => le(max, l),
                    Bound::Unbounded => false,
                };
                let above = match upper {
                    Bound::Included(u) => gt(min, u),
                    Bound::Excluded(u) => ge(min, u),
                    Bound::Unbounded => false,
                };
                below || above
            }
            // An empty set matches nothing, so `all` over it correctly skips.
            Predicate::In(values) => values
                .iter()
                .all(|v| lt(v, min) || gt(v, max)),
            Predicate::And(children) => children.iter().any(|child| child.can_skip(min, max)),
        }
    }
}
