//! Arithmetic helper natives: `sqrt`, `abs`, `pow`, `floor`.

use crate::{
    args::ArgValues,
    errors::{RunError, RunResult},
    evaluate::Evaluator,
    value::Value,
};

fn expect_number(ev: &Evaluator<'_>, value: Value, name: &str) -> RunResult<f64> {
    value
        .as_f64(&ev.heap)
        .ok_or_else(|| RunError::native(format!("{name}() expects a number, got {}", value.type_of(&ev.heap))))
}

pub(crate) fn native_sqrt(ev: &mut Evaluator<'_>, args: ArgValues) -> RunResult<Value> {
    let value = args.get_one("sqrt")?;
    let number = expect_number(ev, value, "sqrt")?;
    if number < 0.0 {
        return Err(RunError::native("sqrt() of a negative number"));
    }
    Ok(ev.alloc_double(number.sqrt()))
}

pub(crate) fn native_abs(ev: &mut Evaluator<'_>, args: ArgValues) -> RunResult<Value> {
    let value = args.get_one("abs")?;
    match value {
        Value::Int(v) => v
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| RunError::native("abs() overflow")),
        Value::Byte(_) => Ok(value),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        _ => {
            let number = expect_number(ev, value, "abs")?;
            Ok(ev.alloc_double(number.abs()))
        }
    }
}

pub(crate) fn native_pow(ev: &mut Evaluator<'_>, args: ArgValues) -> RunResult<Value> {
    let (base, exponent) = args.get_two("pow")?;
    if let (Value::Int(b), Value::Int(e)) = (base, exponent)
        && let Ok(small) = u32::try_from(e)
        && let Some(result) = b.checked_pow(small)
    {
        return Ok(Value::Int(result));
    }
    let base = expect_number(ev, base, "pow")?;
    let exponent = expect_number(ev, exponent, "pow")?;
    Ok(ev.alloc_double(base.powf(exponent)))
}

pub(crate) fn native_floor(ev: &mut Evaluator<'_>, args: ArgValues) -> RunResult<Value> {
    let value = args.get_one("floor")?;
    match value {
        Value::Int(_) | Value::Byte(_) => Ok(value),
        _ => {
            let number = expect_number(ev, value, "floor")?;
            Ok(Value::Int(number.floor() as i64))
        }
    }
}
