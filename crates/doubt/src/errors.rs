use std::fmt::{self, Display, Write};

use strum::{Display as StrumDisplay, IntoStaticStr};

/// Result type alias for operations that can produce a runtime error.
pub(crate) type RunResult<T> = Result<T, RunError>;

/// Classification of every failure the interpreter can report.
///
/// Lex and parse errors are accumulated as [`Diagnostic`]s and refuse
/// evaluation; the remaining kinds surface at runtime as [`RunError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, IntoStaticStr)]
pub enum ErrorKind {
    /// Malformed token or indentation inconsistency.
    #[strum(serialize = "lex")]
    Lex,
    /// Unexpected token, missing bracket, truncated construct.
    #[strum(serialize = "parse")]
    Parse,
    /// Argument arity/type mismatch or precondition violation in a builtin.
    #[strum(serialize = "native")]
    Native,
    /// Evaluator-level failure: unknown identifier, call of a non-function,
    /// unsupported operand tags, missing member, division by zero.
    #[strum(serialize = "interp")]
    Interp,
    /// Deliberate stub reached (`use`, `mut`, `trait`, `mod`, `macro`).
    #[strum(serialize = "not-implemented")]
    NotImplemented,
}

/// A line/column position in user source. Both are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

impl CodeLoc {
    pub(crate) fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// One function frame recorded while a runtime error unwinds the call stack.
///
/// Frames are appended innermost-first, so iterating a traceback in storage
/// order prints the deepest frame first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Name of the called function (`<fn>` for anonymous functions).
    pub function: String,
    /// Where the call appeared in user source.
    pub call_site: CodeLoc,
}

/// A runtime error travelling up through the evaluator.
///
/// Every evaluator handler checks sub-evaluations with `?`, so producing a
/// `RunError` short-circuits the enclosing evaluation without mutating any
/// scope. The driver converts the final error into a public [`Exception`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RunError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<CodeLoc>,
    pub frames: Vec<StackFrame>,
}

impl RunError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            frames: Vec::new(),
        }
    }

    /// Evaluator-level failure.
    pub fn interp(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Interp, message)
    }

    /// Builtin precondition or arity failure. The message must name the native.
    pub fn native(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Native, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, message)
    }

    /// Attaches a source location if none was recorded yet.
    ///
    /// The innermost location wins: handlers closer to the fault call this
    /// first, and outer handlers must not overwrite it.
    #[must_use]
    pub fn at(mut self, loc: CodeLoc) -> Self {
        if self.location.is_none() {
            self.location = Some(loc);
        }
        self
    }

    /// Records a call frame during unwind. Innermost calls push first.
    pub fn push_frame(&mut self, function: impl Into<String>, call_site: CodeLoc) {
        self.frames.push(StackFrame {
            function: function.into(),
            call_site,
        });
    }
}

/// Public runtime failure returned by [`crate::Runner::run`].
///
/// Carries the error taxonomy kind, a formatted message, the faulting
/// location in user source when known, and the call-stack traceback in
/// deepest-first order.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<CodeLoc>,
    pub frames: Vec<StackFrame>,
}

impl Exception {
    pub(crate) fn from_run_error(err: RunError) -> Self {
        Self {
            kind: err.kind,
            message: err.message,
            location: err.location,
            frames: err.frames,
        }
    }
}

impl Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)?;
        if let Some(loc) = self.location {
            write!(f, " at {loc}")?;
        }
        if !self.frames.is_empty() {
            write!(f, "\ntraceback (deepest first):")?;
            for frame in &self.frames {
                write!(f, "\n  in {} at {}", frame.function, frame.call_site)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Exception {}

/// A single lex or parse failure with the offending token and its position.
///
/// Diagnostics accumulate; lexing and parsing never abort early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub location: CodeLoc,
    /// Text of the offending token, when one exists.
    pub token: Option<String>,
}

impl Diagnostic {
    pub(crate) fn lex(message: impl Into<String>, location: CodeLoc) -> Self {
        Self {
            kind: ErrorKind::Lex,
            message: message.into(),
            location,
            token: None,
        }
    }

    pub(crate) fn parse(message: impl Into<String>, location: CodeLoc, token: Option<String>) -> Self {
        Self {
            kind: ErrorKind::Parse,
            message: message.into(),
            location,
            token,
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error at {}: {}", self.kind, self.location, self.message)?;
        if let Some(token) = &self.token {
            write!(f, " (found {token:?})")?;
        }
        Ok(())
    }
}

/// All lex/parse diagnostics for one source file.
///
/// Returned by [`crate::Runner::new`] when the source does not compile; the
/// driver refuses to evaluate when any diagnostic was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub path: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        for diagnostic in &self.diagnostics {
            write!(f, "{sep}{}: {diagnostic}", self.path)?;
            sep = "\n";
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// Renders a short human list like `1, 2 or 3` for arity messages.
pub(crate) fn fmt_expected_counts(counts: &[usize]) -> String {
    let mut out = String::new();
    for (i, count) in counts.iter().enumerate() {
        if i > 0 {
            if i + 1 == counts.len() {
                out.push_str(" or ");
            } else {
                out.push_str(", ");
            }
        }
        let _ = write!(out, "{count}");
    }
    out
}
