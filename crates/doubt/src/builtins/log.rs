//! Implementation of the `log` native (and its `observe` alias).

use crate::{
    args::ArgValues,
    errors::RunResult,
    evaluate::Evaluator,
    io::LogWriter,
    value::{fmt_value, Value},
};

/// Prints each argument's string form separated by spaces, then a newline.
/// Returns null.
pub(crate) fn native_log(ev: &mut Evaluator<'_>, args: ArgValues, log: &mut impl LogWriter) -> RunResult<Value> {
    let values = args.into_values();
    let mut text = String::new();
    for (i, &value) in values.iter().enumerate() {
        if i > 0 {
            log.push(' ');
        }
        text.clear();
        fmt_value(value, &ev.heap, &ev.interns, &mut text, false);
        log.write(&text);
    }
    log.push('\n');
    Ok(Value::Null)
}
