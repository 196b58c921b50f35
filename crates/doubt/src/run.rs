//! The driver: source text in, program behavior out.
//!
//! `Runner::new` lexes and parses, accumulating diagnostics; any recorded
//! diagnostic refuses evaluation. `Runner::run` evaluates the top level in
//! the transparent global scope, then calls `main`.

use crate::{
    ast::Module,
    errors::{CompileError, Exception},
    evaluate::Evaluator,
    intern::Interns,
    io::LogWriter,
    lexer::lex,
    object::Object,
    parse::parse,
    value::{StateKind, Value},
};

/// Default indent unit: four spaces.
pub const DEFAULT_INDENT: &str = "    ";

/// A compiled program, ready to run.
#[derive(Debug)]
pub struct Runner {
    module: Module,
    interns: Interns,
}

impl Runner {
    /// Lexes and parses `source`. Returns every accumulated diagnostic
    /// when the source does not compile — evaluation is refused on any
    /// recorded lex or parse error.
    pub fn new(source: &str, path: &str, indent_unit: &str) -> Result<Self, CompileError> {
        let (tokens, mut diagnostics) = lex(source, indent_unit);
        let mut interns = Interns::new();
        let (module, parse_diagnostics) = parse(tokens, source, &mut interns);
        diagnostics.extend(parse_diagnostics);
        if diagnostics.is_empty() {
            Ok(Self { module, interns })
        } else {
            Err(CompileError {
                path: path.to_owned(),
                diagnostics,
            })
        }
    }

    /// Runs the program: top-level statements, then `main(argv)`.
    ///
    /// The RNG is seeded from OS entropy; use [`Runner::run_seeded`] for
    /// deterministic output.
    pub fn run(self, argv: &[String], log: &mut impl LogWriter) -> Result<Object, Exception> {
        self.run_inner(None, argv, log)
    }

    /// Runs with a fixed RNG seed. Execution is deterministic given the
    /// same source, arguments and seed.
    pub fn run_seeded(self, seed: u64, argv: &[String], log: &mut impl LogWriter) -> Result<Object, Exception> {
        self.run_inner(Some(seed), argv, log)
    }

    fn run_inner(self, seed: Option<u64>, argv: &[String], log: &mut impl LogWriter) -> Result<Object, Exception> {
        let Self { module, interns } = self;
        let mut evaluator = Evaluator::new(&module, interns, seed);
        let outcome = evaluator
            .run_module(log)
            .and_then(|top| {
                // An EXIT sentinel at the top level terminates immediately.
                if top.as_state() == Some(StateKind::Exit) {
                    Ok(Value::Null)
                } else {
                    evaluator.call_main(argv, log)
                }
            })
            .map(|result| {
                if result.as_state() == Some(StateKind::Exit) {
                    Value::Null
                } else {
                    result
                }
            });
        match outcome {
            Ok(value) => Ok(Object::from_value(value, &evaluator.heap, &evaluator.interns)),
            Err(err) => Err(Exception::from_run_error(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CollectStringLog;

    #[test]
    fn compile_error_refuses_evaluation() {
        let err = Runner::new("fn main() :=\n    1 +\n", "test.doubt", DEFAULT_INDENT).unwrap_err();
        assert!(!err.diagnostics.is_empty());
        assert_eq!(err.path, "test.doubt");
    }

    #[test]
    fn missing_main_is_an_interp_error() {
        let runner = Runner::new("const x = 1\n", "test.doubt", DEFAULT_INDENT).unwrap();
        let mut log = CollectStringLog::new();
        let err = runner.run(&[], &mut log).unwrap_err();
        assert!(err.message.contains("main"), "message: {}", err.message);
    }
}
