//! Implementation of the `range` native.

use crate::{
    args::ArgValues,
    errors::{RunError, RunResult},
    evaluate::Evaluator,
    heap::HeapData,
    types::FixedArray,
    value::Value,
};

/// `range(to)`, `range(from, to)`, `range(from, to, step)` — a fixed array
/// of integers inclusive of both endpoints. `from` defaults to 0, `step`
/// to 1. A zero step, or a negative step against ascending bounds, is an
/// error.
pub(crate) fn native_range(ev: &mut Evaluator<'_>, args: ArgValues) -> RunResult<Value> {
    let (first, second, third) = args.get_one_to_three("range")?;
    let (from, to, step) = match (second, third) {
        (None, _) => (0, expect_int(first)?, 1),
        (Some(second), None) => (expect_int(first)?, expect_int(second)?, 1),
        (Some(second), Some(third)) => (expect_int(first)?, expect_int(second)?, expect_int(third)?),
    };
    if step == 0 {
        return Err(RunError::native("range() step must not be zero"));
    }
    if step < 0 && from < to {
        return Err(RunError::native("range() negative step with ascending bounds"));
    }
    let mut items = Vec::new();
    let mut current = from;
    while (step > 0 && current <= to) || (step < 0 && current >= to) {
        items.push(Value::Int(current));
        let Some(next) = current.checked_add(step) else {
            break;
        };
        current = next;
    }
    let id = ev.heap.allocate(HeapData::Array(FixedArray::from_values(items)));
    Ok(Value::Ref(id))
}

fn expect_int(value: Value) -> RunResult<i64> {
    match value {
        Value::Int(v) => Ok(v),
        Value::Byte(v) => Ok(i64::from(v)),
        _ => Err(RunError::native("range() expects integer arguments")),
    }
}
