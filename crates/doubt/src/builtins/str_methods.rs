//! String method natives, reached through method resolution on string
//! receivers: `s.upper()` resolves to `Str_upper(s)` and so on.

use crate::{
    args::ArgValues,
    errors::{RunError, RunResult},
    evaluate::Evaluator,
    heap::HeapData,
    intern::StringId,
    strings,
    types::FixedArray,
    value::{fmt_value, Value},
};

fn expect_str(ev: &Evaluator<'_>, value: Value, name: &str) -> RunResult<StringId> {
    match value {
        Value::Str(id) => Ok(id),
        _ => Err(RunError::native(format!(
            "{name}() expects a string, got {}",
            value.type_of(&ev.heap)
        ))),
    }
}

pub(crate) fn native_upper(ev: &mut Evaluator<'_>, args: ArgValues) -> RunResult<Value> {
    let id = expect_str(ev, args.get_one("Str_upper")?, "Str_upper")?;
    Ok(Value::Str(strings::to_upper(&mut ev.interns, id)))
}

pub(crate) fn native_lower(ev: &mut Evaluator<'_>, args: ArgValues) -> RunResult<Value> {
    let id = expect_str(ev, args.get_one("Str_lower")?, "Str_lower")?;
    Ok(Value::Str(strings::to_lower(&mut ev.interns, id)))
}

pub(crate) fn native_trim(ev: &mut Evaluator<'_>, args: ArgValues) -> RunResult<Value> {
    let id = expect_str(ev, args.get_one("Str_trim")?, "Str_trim")?;
    Ok(Value::Str(strings::trim(&mut ev.interns, id)))
}

pub(crate) fn native_len(ev: &mut Evaluator<'_>, args: ArgValues) -> RunResult<Value> {
    let id = expect_str(ev, args.get_one("Str_len")?, "Str_len")?;
    Ok(Value::Int(ev.interns.get(id).chars().count() as i64))
}

/// Character index of the needle, or -1 when absent.
pub(crate) fn native_find(ev: &mut Evaluator<'_>, args: ArgValues) -> RunResult<Value> {
    let (haystack, needle) = args.get_two("Str_find")?;
    let haystack = expect_str(ev, haystack, "Str_find")?;
    let needle = expect_str(ev, needle, "Str_find")?;
    let index = strings::find(ev.interns.get(haystack), ev.interns.get(needle));
    Ok(Value::Int(index.map_or(-1, |i| i as i64)))
}

/// `format(template, args...)` — printf-style formatting: each `{}` in the
/// template is replaced by the next argument's string form. The result is a
/// freshly arena-allocated string.
pub(crate) fn native_format(ev: &mut Evaluator<'_>, args: ArgValues) -> RunResult<Value> {
    let values = args.into_values();
    let Some((&first, rest)) = values.split_first() else {
        return Err(RunError::native("format() expects a template string"));
    };
    let template_id = expect_str(ev, first, "format")?;
    let template = ev.interns.get(template_id).to_owned();
    let mut out = String::new();
    let mut pieces = template.split("{}");
    out.push_str(pieces.next().unwrap_or(""));
    let mut remaining = rest.iter();
    for piece in pieces {
        let Some(&value) = remaining.next() else {
            return Err(RunError::native("format() has more placeholders than arguments"));
        };
        fmt_value(value, &ev.heap, &ev.interns, &mut out, false);
        out.push_str(piece);
    }
    Ok(Value::Str(ev.interns.intern(&out)))
}

/// Splits on a single separator character into a fixed array of strings
/// sharing the source memory.
pub(crate) fn native_split(ev: &mut Evaluator<'_>, args: ArgValues) -> RunResult<Value> {
    let (subject, separator) = args.get_two("Str_split")?;
    let subject = expect_str(ev, subject, "Str_split")?;
    let separator = match separator {
        Value::Char(ch) => ch,
        Value::Str(id) => {
            let mut chars = ev.interns.get(id).chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => ch,
                _ => return Err(RunError::native("Str_split() separator must be a single character")),
            }
        }
        _ => return Err(RunError::native("Str_split() separator must be a character")),
    };
    let pieces = strings::split(&mut ev.interns, subject, separator);
    let items = pieces.into_iter().map(Value::Str).collect();
    let id = ev.heap.allocate(HeapData::Array(FixedArray::from_values(items)));
    Ok(Value::Ref(id))
}
