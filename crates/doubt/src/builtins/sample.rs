//! Probabilistic stubs: `sample`, `infer`, `take`.

use crate::{
    args::ArgValues,
    errors::{CodeLoc, RunError, RunResult},
    evaluate::Evaluator,
    heap::HeapData,
    intern::Interns,
    io::LogWriter,
    types::{FixedArray, Sampler},
    value::Value,
};

/// `sample(x)`: a number samples to itself; an object with a `sample`
/// method delegates to it; anything else is an error.
pub(crate) fn native_sample(ev: &mut Evaluator<'_>, args: ArgValues, log: &mut impl LogWriter) -> RunResult<Value> {
    let value = args.get_one("sample")?;
    if value.is_numeric(&ev.heap) {
        return Ok(value);
    }
    if let Value::Ref(id) = value
        && matches!(ev.heap.get(id), HeapData::Instance(_))
    {
        return ev.call_method(value, Interns::SAMPLE, Vec::new(), CodeLoc::default(), log);
    }
    Err(RunError::native(format!(
        "sample() expects a number or an object with a sample method, got {}",
        value.type_of(&ev.heap)
    )))
}

/// `infer(model, method)` — validates the model is callable and the method
/// is a tag, then returns a stub sampler record. No inference algorithm
/// runs in this core.
pub(crate) fn native_infer(ev: &mut Evaluator<'_>, args: ArgValues) -> RunResult<Value> {
    let (model, method) = args.get_two("infer")?;
    let callable = match model {
        Value::Native(_) => true,
        Value::Ref(id) => matches!(ev.heap.get(id), HeapData::Function(_)),
        _ => false,
    };
    if !callable {
        return Err(RunError::native("infer() expects a model function as its first argument"));
    }
    let Value::Tag(method) = method else {
        return Err(RunError::native(
            "infer() expects an inference method tag like #MCMC as its second argument",
        ));
    };
    let id = ev.heap.allocate(HeapData::Sampler(Sampler { model, method }));
    Ok(Value::Ref(id))
}

/// `take(seq, n)` — the first `n` values of a sequence: an array prefix, or
/// `n` draws pulled from a generator or sampler.
pub(crate) fn native_take(ev: &mut Evaluator<'_>, args: ArgValues, log: &mut impl LogWriter) -> RunResult<Value> {
    let (sequence, count) = args.get_two("take")?;
    let Value::Int(count) = count else {
        return Err(RunError::native("take() expects an integer count"));
    };
    let Ok(count) = usize::try_from(count) else {
        return Err(RunError::native("take() count must be non-negative"));
    };
    let Value::Ref(id) = sequence else {
        return Err(RunError::native(format!(
            "take() expects a sequence, got {}",
            sequence.type_of(&ev.heap)
        )));
    };
    let items = match ev.heap.get(id) {
        HeapData::Array(array) => array.as_slice().iter().take(count).copied().collect(),
        HeapData::Flex(flex) => flex.as_slice().iter().take(count).copied().collect(),
        HeapData::Generator(_) => {
            // Pin pulled values: stepping the generator body may reach a
            // collection safe point.
            let mark = ev.temp_mark();
            for _ in 0..count {
                match ev.generator_next(id, log)? {
                    Some(value) => ev.temp_push(value),
                    None => break,
                }
            }
            ev.temp_take(mark)
        }
        HeapData::Sampler(sampler) => {
            let model = sampler.model;
            let mark = ev.temp_mark();
            for _ in 0..count {
                let draw = ev.call_value(model, Vec::new(), CodeLoc::default(), log)?;
                ev.temp_push(draw);
            }
            ev.temp_take(mark)
        }
        other => {
            return Err(RunError::native(format!(
                "take() expects a sequence, got {}",
                other.type_name()
            )));
        }
    };
    let id = ev.heap.allocate(HeapData::Array(FixedArray::from_values(items)));
    Ok(Value::Ref(id))
}
