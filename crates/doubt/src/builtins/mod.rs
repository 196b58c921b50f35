//! The native prelude: functions bound into the global scope at driver
//! start.
//!
//! Each native is a [`NativeFn`] value dispatched by arity through
//! [`crate::args::ArgValues`]. The probabilistic natives (`sample`,
//! `observe`, `infer`) are ordinary calls here — their statistical
//! semantics are deliberate stubs.

mod dist;
mod log;
mod math;
mod range;
mod sample;
mod str_methods;

use strum::{Display as StrumDisplay, IntoStaticStr};

use crate::{
    args::ArgValues,
    errors::RunResult,
    evaluate::Evaluator,
    io::LogWriter,
    value::Value,
};

/// Every native function in the prelude.
///
/// The display form is the exact name bound into the global scope; the
/// `Str_*` entries are reached through method resolution on string
/// receivers (`s.upper()` resolves to `Str_upper`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, IntoStaticStr)]
pub(crate) enum NativeFn {
    #[strum(serialize = "log")]
    Log,
    /// Alias of `log` in this core; probabilistic semantics deferred.
    #[strum(serialize = "observe")]
    Observe,
    #[strum(serialize = "range")]
    Range,
    #[strum(serialize = "sqrt")]
    Sqrt,
    #[strum(serialize = "infer")]
    Infer,
    #[strum(serialize = "sample")]
    Sample,
    #[strum(serialize = "take")]
    Take,
    #[strum(serialize = "normal")]
    Normal,
    #[strum(serialize = "gamma")]
    Gamma,
    #[strum(serialize = "abs")]
    Abs,
    #[strum(serialize = "pow")]
    Pow,
    #[strum(serialize = "floor")]
    Floor,
    #[strum(serialize = "format")]
    Format,
    #[strum(serialize = "Str_upper")]
    StrUpper,
    #[strum(serialize = "Str_lower")]
    StrLower,
    #[strum(serialize = "Str_trim")]
    StrTrim,
    #[strum(serialize = "Str_len")]
    StrLen,
    #[strum(serialize = "Str_find")]
    StrFind,
    #[strum(serialize = "Str_split")]
    StrSplit,
}

impl NativeFn {
    /// Everything bound into the global scope at startup.
    pub const ALL: [Self; 19] = [
        Self::Log,
        Self::Observe,
        Self::Range,
        Self::Sqrt,
        Self::Infer,
        Self::Sample,
        Self::Take,
        Self::Normal,
        Self::Gamma,
        Self::Abs,
        Self::Pow,
        Self::Floor,
        Self::Format,
        Self::StrUpper,
        Self::StrLower,
        Self::StrTrim,
        Self::StrLen,
        Self::StrFind,
        Self::StrSplit,
    ];
}

/// Dispatches a native call.
pub(crate) fn call_native(
    ev: &mut Evaluator<'_>,
    native: NativeFn,
    args: ArgValues,
    log: &mut impl LogWriter,
) -> RunResult<Value> {
    match native {
        NativeFn::Log | NativeFn::Observe => log::native_log(ev, args, log),
        NativeFn::Range => range::native_range(ev, args),
        NativeFn::Sqrt => math::native_sqrt(ev, args),
        NativeFn::Abs => math::native_abs(ev, args),
        NativeFn::Pow => math::native_pow(ev, args),
        NativeFn::Floor => math::native_floor(ev, args),
        NativeFn::Format => str_methods::native_format(ev, args),
        NativeFn::Normal => dist::native_normal(ev, args),
        NativeFn::Gamma => dist::native_gamma(ev, args),
        NativeFn::Infer => sample::native_infer(ev, args),
        NativeFn::Sample => sample::native_sample(ev, args, log),
        NativeFn::Take => sample::native_take(ev, args, log),
        NativeFn::StrUpper => str_methods::native_upper(ev, args),
        NativeFn::StrLower => str_methods::native_lower(ev, args),
        NativeFn::StrTrim => str_methods::native_trim(ev, args),
        NativeFn::StrLen => str_methods::native_len(ev, args),
        NativeFn::StrFind => str_methods::native_find(ev, args),
        NativeFn::StrSplit => str_methods::native_split(ev, args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_are_the_scope_bindings() {
        assert_eq!(NativeFn::Log.to_string(), "log");
        assert_eq!(NativeFn::Range.to_string(), "range");
        assert_eq!(NativeFn::StrUpper.to_string(), "Str_upper");
    }

    #[test]
    fn all_table_is_complete_and_distinct() {
        let mut names: Vec<String> = NativeFn::ALL.iter().map(ToString::to_string).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), NativeFn::ALL.len());
    }
}
