use strum::Display as StrumDisplay;

use crate::{
    ast::FunctionId,
    heap::HeapId,
    intern::StringId,
    value::{Symbol, Value},
};

/// A callable function value: the parsed definition plus the scope it
/// captured at definition time.
///
/// The captured scope lives on the GC heap and is traced through this
/// record, so a closure keeps its environment alive for the record's
/// lifetime.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FunctionRecord {
    pub function: FunctionId,
    /// Definition-site name, absent for anonymous functions.
    pub name: Option<StringId>,
    pub captured: HeapId,
}

/// Execution state of a generator record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum GeneratorState {
    /// Created, body not entered yet.
    Ready,
    /// Body currently executing (a `next` request is in flight).
    Running,
    /// Suspended at a `yield`; the next request resumes after it.
    Yielded,
    /// Body completed or returned; the sequence is exhausted.
    Returned,
    /// A runtime error escaped the body; the generator is dead.
    Errored,
}

/// One step of a generator's suspension path.
///
/// When a `yield` suspends the body, every construct between the body root
/// and the yield records how to re-enter itself: the statement index in a
/// list, the scope to reuse instead of a fresh child, the branch or arm
/// that was running, the loop cursor. Frames are stored innermost-first;
/// resumption consumes them outermost-first, so the next request continues
/// exactly after the yield instead of re-running anything before it.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ResumeFrame {
    /// Statement index inside a statement list.
    Index(usize),
    /// Re-enter this already-populated scope instead of a fresh child.
    Scope(HeapId),
    /// Which branch of an `if` was running (true = then).
    Branch(bool),
    /// Which match arm was running.
    Arm(usize),
    /// Inside a condition or plain loop iteration body.
    LoopIter,
    /// Inside a binding-loop iteration: the stream source, the element
    /// being processed, and the cursor for the next fetch.
    BindingIter {
        next_index: usize,
        source: Value,
        element: Value,
    },
    /// Comprehension accumulator to keep filling after resumption.
    Collect(HeapId),
    /// The yield that suspended the body; resuming consumes this and
    /// continues with the statement after it.
    Yielded,
}

impl ResumeFrame {
    /// Heap handles this frame keeps alive between steps (garbage
    /// collection roots while suspended or mid-step).
    pub fn heap_refs(self) -> [Option<HeapId>; 2] {
        match self {
            Self::Scope(id) | Self::Collect(id) => [Some(id), None],
            Self::BindingIter { source, element, .. } => [source.ref_id(), element.ref_id()],
            _ => [None, None],
        }
    }
}

/// A resumable generator created by calling a `loop fn`.
///
/// Suspension stores the resume path recorded by the evaluator; the
/// persistent generator scope carries parameters and locals across yields.
#[derive(Debug)]
pub(crate) struct Generator {
    pub function: FunctionId,
    pub name: Option<StringId>,
    /// Persistent local scope: parameters and locals survive across yields.
    pub scope: HeapId,
    pub state: GeneratorState,
    /// Innermost-first suspension path; empty before the first step.
    pub resume: Vec<ResumeFrame>,
}

impl Generator {
    pub fn new(function: FunctionId, name: Option<StringId>, scope: HeapId) -> Self {
        Self {
            function,
            name,
            scope,
            state: GeneratorState::Ready,
            resume: Vec::new(),
        }
    }
}

/// Stub inference iterator returned by the `infer` native.
///
/// Draws are produced by calling the stored model function once per
/// request; the method tag records which algorithm was asked for, but no
/// actual inference is performed in this core.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sampler {
    pub model: Value,
    pub method: Symbol,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generators_start_ready_with_an_empty_resume_path() {
        let generator = Generator::new(FunctionId::new(0), None, HeapId::new(0));
        assert_eq!(generator.state, GeneratorState::Ready);
        assert!(generator.resume.is_empty());
    }

    #[test]
    fn generator_states_render_lowercase() {
        assert_eq!(GeneratorState::Yielded.to_string(), "yielded");
        assert_eq!(GeneratorState::Returned.to_string(), "returned");
    }
}
