use smallvec::SmallVec;

use crate::{
    errors::{fmt_expected_counts, RunError, RunResult},
    value::Value,
};

/// Call arguments handed to a native function.
///
/// Fixed variants cover the 0/1/2/3 arities natives dispatch on; `Many`
/// carries the N-ary case. Values are `Copy`, so extraction helpers can
/// consume `self` freely.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ArgValues {
    Empty,
    One(Value),
    Two(Value, Value),
    Three(Value, Value, Value),
    Many(SmallVec<[Value; 6]>),
}

impl ArgValues {
    pub fn from_values(values: &[Value]) -> Self {
        match values {
            [] => Self::Empty,
            [a] => Self::One(*a),
            [a, b] => Self::Two(*a, *b),
            [a, b, c] => Self::Three(*a, *b, *c),
            more => Self::Many(SmallVec::from_slice(more)),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::One(_) => 1,
            Self::Two(..) => 2,
            Self::Three(..) => 3,
            Self::Many(values) => values.len(),
        }
    }

    /// All arguments in order, for N-ary natives.
    pub fn into_values(self) -> SmallVec<[Value; 6]> {
        match self {
            Self::Empty => SmallVec::new(),
            Self::One(a) => SmallVec::from_slice(&[a]),
            Self::Two(a, b) => SmallVec::from_slice(&[a, b]),
            Self::Three(a, b, c) => SmallVec::from_slice(&[a, b, c]),
            Self::Many(values) => values,
        }
    }

    pub fn check_zero(self, name: &str) -> RunResult<()> {
        match self {
            Self::Empty => Ok(()),
            other => Err(arity_error(name, &[0], other.count())),
        }
    }

    pub fn get_one(self, name: &str) -> RunResult<Value> {
        match self {
            Self::One(a) => Ok(a),
            other => Err(arity_error(name, &[1], other.count())),
        }
    }

    pub fn get_two(self, name: &str) -> RunResult<(Value, Value)> {
        match self {
            Self::Two(a, b) => Ok((a, b)),
            other => Err(arity_error(name, &[2], other.count())),
        }
    }

    pub fn get_three(self, name: &str) -> RunResult<(Value, Value, Value)> {
        match self {
            Self::Three(a, b, c) => Ok((a, b, c)),
            other => Err(arity_error(name, &[3], other.count())),
        }
    }

    /// One required argument plus up to two optional ones, for natives like
    /// `range(to)` / `range(from, to)` / `range(from, to, step)`.
    pub fn get_one_to_three(self, name: &str) -> RunResult<(Value, Option<Value>, Option<Value>)> {
        match self {
            Self::One(a) => Ok((a, None, None)),
            Self::Two(a, b) => Ok((a, Some(b), None)),
            Self::Three(a, b, c) => Ok((a, Some(b), Some(c))),
            other => Err(arity_error(name, &[1, 2, 3], other.count())),
        }
    }
}

/// Structured arity failure naming the native, as the error taxonomy
/// requires.
fn arity_error(name: &str, expected: &[usize], got: usize) -> RunError {
    RunError::native(format!(
        "{name}() takes {} argument(s), got {got}",
        fmt_expected_counts(expected)
    ))
}
