//! Tree-walking evaluator: one handler per AST variant.
//!
//! Every handler takes the node and returns a `RunResult<Value>`; the `?`
//! on each sub-evaluation is the error short-circuit — producing an error
//! returns immediately without mutating any scope. Control-flow sentinels
//! (`Value::State`) travel the other channel: handlers pass them through
//! unchanged until the innermost loop or function boundary that recognizes
//! them.
//!
//! The evaluator owns the runtime ambient context the source language kept
//! in globals: the heap, the interner, the RNG, the scope stack (which
//! doubles as the GC root set), and the pending return/yield payload.
//! Collection triggers are checked at statement boundaries, where every
//! live value is reachable from that root set plus the explicit temp-root
//! pin stack.

use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

use crate::{
    args::ArgValues,
    ast::{Binding, BindingKind, BinaryOp, Expr, ExprLoc, FieldDecl, FunctionDef, LoopHead, MatchArm, Module, Stmt,
        UnaryOp},
    builtins::{call_native, NativeFn},
    errors::{CodeLoc, RunError, RunResult},
    heap::{Heap, HeapData, HeapId},
    intern::{Interns, StringId},
    io::LogWriter,
    types::{FixedArray, FlexArray, FunctionRecord, Generator, GeneratorState, Instance, ResumeFrame, Scope, StructDef},
    value::{StateKind, Type, Value},
};

/// Recursion guard for user function calls; the tree walker uses the Rust
/// stack, so this must stay well below it.
const MAX_CALL_DEPTH: usize = 200;

pub(crate) struct Evaluator<'m> {
    module: &'m Module,
    pub(crate) interns: Interns,
    pub(crate) heap: Heap,
    pub(crate) rng: ChaCha12Rng,
    /// Scope stack: every entry is a GC root. Index 0 is the global scope.
    scopes: Vec<HeapId>,
    /// Values pinned across nested evaluation (call arguments, receivers,
    /// binary-op operands) so a collection at an inner safe point cannot
    /// sweep them.
    temp_roots: Vec<Value>,
    /// Payload slot for `Return` and `Yield` sentinels.
    pending: Value,
    /// True while a generator body is being stepped; only then do yields
    /// record suspension frames.
    stepping: bool,
    /// Suspension path under construction, innermost-first: each handler a
    /// Yield passes through pushes how to re-enter itself.
    suspend_path: Vec<ResumeFrame>,
    /// Path being consumed while re-entering a generator body; handlers
    /// pop their frame from the back (outermost-first).
    resume_path: Vec<ResumeFrame>,
    depth: usize,
}

impl<'m> Evaluator<'m> {
    pub fn new(module: &'m Module, interns: Interns, seed: Option<u64>) -> Self {
        let mut heap = Heap::new();
        let globals = heap.allocate(HeapData::Scope(Scope::new(None, "globals")));
        let rng = match seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::from_entropy(),
        };
        let mut evaluator = Self {
            module,
            interns,
            heap,
            rng,
            scopes: vec![globals],
            temp_roots: Vec::new(),
            pending: Value::Null,
            stepping: false,
            suspend_path: Vec::new(),
            resume_path: Vec::new(),
            depth: 0,
        };
        evaluator.bind_prelude();
        evaluator
    }

    /// Builds the native prelude as its own scope, then merges it into the
    /// global scope.
    fn bind_prelude(&mut self) {
        let mut prelude = Scope::new(None, "prelude");
        for native in NativeFn::ALL {
            let name: &'static str = native.into();
            let id = self.interns.intern(name);
            let hash = self.interns.hash(id);
            prelude.define_local(id, hash, Value::Native(native));
        }
        self.heap.scope_mut(self.scopes[0]).merge_from(&prelude);
    }

    fn current_scope(&self) -> HeapId {
        *self.scopes.last().expect("scope stack is never empty")
    }

    pub(crate) fn alloc_double(&mut self, value: f64) -> Value {
        Value::Ref(self.heap.allocate(HeapData::Double(value)))
    }

    // --- temp-root pinning ---------------------------------------------

    pub(crate) fn temp_mark(&self) -> usize {
        self.temp_roots.len()
    }

    pub(crate) fn temp_push(&mut self, value: Value) {
        self.temp_roots.push(value);
    }

    fn temp_truncate(&mut self, mark: usize) {
        self.temp_roots.truncate(mark);
    }

    pub(crate) fn temp_take(&mut self, mark: usize) -> Vec<Value> {
        self.temp_roots.split_off(mark)
    }

    /// Collection safe point. Runs at most one collection, with the scope
    /// stack, pin stack, pending slot and the given extras as roots.
    fn maybe_collect(&mut self, extra: &[Value]) {
        if !self.heap.should_collect() {
            return;
        }
        let roots: Vec<HeapId> = self
            .scopes
            .iter()
            .copied()
            .chain(self.temp_roots.iter().filter_map(|v| v.ref_id()))
            .chain(self.pending.ref_id())
            .chain(extra.iter().filter_map(|v| v.ref_id()))
            // Scopes and sequence values held by generator suspension
            // frames are live even though no Rust local names them.
            .chain(
                self.suspend_path
                    .iter()
                    .chain(self.resume_path.iter())
                    .flat_map(|frame| frame.heap_refs().into_iter().flatten()),
            )
            .collect();
        self.heap.collect(roots);
    }

    // --- generator suspension bookkeeping -------------------------------

    /// Consumes a saved scope from the resume path, if re-entering a
    /// suspended construct.
    fn resume_scope(&mut self) -> Option<HeapId> {
        if let Some(ResumeFrame::Scope(saved)) = self.resume_path.last().copied() {
            self.resume_path.pop();
            Some(saved)
        } else {
            None
        }
    }

    /// Records `frame` on the suspension path when `value` is a Yield
    /// bubbling out of a stepped generator body.
    fn record_suspend(&mut self, value: Value, frame: ResumeFrame) {
        if self.stepping && value.as_state() == Some(StateKind::Yield) {
            self.suspend_path.push(frame);
        }
    }

    // --- scopes ---------------------------------------------------------

    fn lookup(&self, name: StringId) -> Option<Value> {
        let hash = self.interns.hash(name);
        self.heap.scope_lookup(self.current_scope(), name, hash)
    }

    /// Binds a name in the current scope, shadowing parents. Fails when the
    /// name was bound with `const` in this same scope.
    fn define_current(&mut self, name: StringId, value: Value, constant: bool) -> RunResult<()> {
        let hash = self.interns.hash(name);
        let scope = self.heap.scope_mut(self.current_scope());
        if scope.is_const(name) {
            return Err(RunError::interp(format!(
                "cannot redefine constant '{}'",
                self.interns.get(name)
            )));
        }
        if constant {
            scope.define_const(name, hash, value);
        } else {
            scope.define_local(name, hash, value);
        }
        Ok(())
    }

    /// Plain assignment: updates the nearest visible binding, or defines a
    /// fresh local when the name is unbound. Writing through a `const`
    /// binding fails in whichever scope owns it.
    fn assign_name(&mut self, name: StringId, value: Value) -> RunResult<()> {
        let hash = self.interns.hash(name);
        let mut current = Some(self.current_scope());
        while let Some(id) = current {
            let scope = self.heap.scope(id);
            if scope.has_local(name, hash) {
                if scope.is_const(name) {
                    return Err(RunError::interp(format!(
                        "cannot redefine constant '{}'",
                        self.interns.get(name)
                    )));
                }
                self.heap.scope_mut(id).define_local(name, hash, value);
                return Ok(());
            }
            current = scope.parent();
        }
        self.define_current(name, value, false)
    }

    fn take_pending(&mut self) -> Value {
        std::mem::replace(&mut self.pending, Value::Null)
    }

    // --- driver entry points -------------------------------------------

    /// Evaluates the top-level statements in the transparent global scope.
    pub fn run_module(&mut self, log: &mut impl LogWriter) -> RunResult<Value> {
        let module = self.module;
        self.eval_stmts(&module.body, log)
    }

    /// Looks up `main` and calls it. When `main` declares parameters, the
    /// process arguments are passed as a fixed array of strings.
    pub fn call_main(&mut self, argv: &[String], log: &mut impl LogWriter) -> RunResult<Value> {
        let main = self
            .lookup(Interns::MAIN)
            .ok_or_else(|| RunError::interp("no `main` function defined"))?;
        let record = match main.ref_id().map(|id| self.heap.get(id)) {
            Some(HeapData::Function(record)) => *record,
            _ => {
                return Err(RunError::interp(format!(
                    "`main` is not a function (found {})",
                    main.type_of(&self.heap)
                )));
            }
        };
        let module = self.module;
        let def = module.function(record.function);
        let args = if def.params.is_empty() {
            Vec::new()
        } else {
            let items: Vec<Value> = argv.iter().map(|arg| Value::Str(self.interns.intern(arg))).collect();
            let array = self.heap.allocate(HeapData::Array(FixedArray::from_values(items)));
            vec![Value::Ref(array)]
        };
        self.call_function(record, args, CodeLoc::new(0, 0), log)
    }

    // --- statements -----------------------------------------------------

    /// Evaluates statements in order in the current scope (transparent
    /// block). The block's value is the last non-state result; a state
    /// sentinel returns immediately. Statement boundaries are the
    /// collection safe points.
    ///
    /// On generator resume the list continues at the recorded statement
    /// index; a Yield bubbling out records the index of the statement it
    /// came from.
    fn eval_stmts(&mut self, stmts: &'m [Stmt], log: &mut impl LogWriter) -> RunResult<Value> {
        let mut start = 0;
        if let Some(ResumeFrame::Index(index)) = self.resume_path.last().copied() {
            self.resume_path.pop();
            start = index;
        }
        let mut last = Value::Null;
        for (index, stmt) in stmts.iter().enumerate().skip(start) {
            self.maybe_collect(&[last]);
            let value = self.eval_stmt(stmt, log)?;
            if value.is_state() {
                self.record_suspend(value, ResumeFrame::Index(index));
                return Ok(value);
            }
            last = value;
        }
        Ok(last)
    }

    fn eval_scoped_block(&mut self, stmts: &'m [Stmt], doc: &'static str, log: &mut impl LogWriter) -> RunResult<Value> {
        let scope = match self.resume_scope() {
            Some(saved) => saved,
            None => self
                .heap
                .allocate(HeapData::Scope(Scope::new(Some(self.current_scope()), doc))),
        };
        self.scopes.push(scope);
        let result = self.eval_stmts(stmts, log);
        self.scopes.pop();
        let value = result?;
        self.record_suspend(value, ResumeFrame::Scope(scope));
        Ok(value)
    }

    fn eval_stmt(&mut self, stmt: &'m Stmt, log: &mut impl LogWriter) -> RunResult<Value> {
        match stmt {
            Stmt::Expr(expr) => self.eval_expr(expr, log),
            Stmt::Discard(_) => Ok(Value::Null),
            Stmt::Block(stmts) => self.eval_scoped_block(stmts, "block", log),
            Stmt::Const { name, value, loc } => {
                let value = self.eval_expr(value, log)?;
                if value.is_state() {
                    return Ok(value);
                }
                self.define_current(*name, value, true).map_err(|err| err.at(*loc))?;
                Ok(value)
            }
            Stmt::Assign { name, value, loc } => {
                let value = self.eval_expr(value, log)?;
                if value.is_state() {
                    return Ok(value);
                }
                self.assign_name(*name, value).map_err(|err| err.at(*loc))?;
                Ok(value)
            }
            Stmt::FnDef { function, loc } => {
                let def = self.module.function(*function);
                let record = FunctionRecord {
                    function: *function,
                    name: def.name,
                    captured: self.current_scope(),
                };
                let value = Value::Ref(self.heap.allocate(HeapData::Function(record)));
                if let Some(name) = def.name {
                    self.define_current(name, value, false).map_err(|err| err.at(*loc))?;
                }
                Ok(value)
            }
            Stmt::StructDef { name, fields, loc } => self.eval_struct_def(*name, fields, *loc, log),
            Stmt::If {
                cond,
                body,
                else_body,
                ..
            } => {
                // On resume, re-enter the branch that was suspended
                // without re-evaluating the condition.
                let take_then = if let Some(ResumeFrame::Branch(branch)) = self.resume_path.last().copied() {
                    self.resume_path.pop();
                    branch
                } else {
                    let cond = self.eval_expr(cond, log)?;
                    if cond.is_state() {
                        return Ok(cond);
                    }
                    cond.truthy(&self.heap, &self.interns)
                };
                let value = if take_then {
                    self.eval_scoped_block(body, "if", log)?
                } else if let Some(else_body) = else_body {
                    self.eval_scoped_block(else_body, "else", log)?
                } else {
                    Value::Null
                };
                self.record_suspend(value, ResumeFrame::Branch(take_then));
                Ok(value)
            }
            Stmt::Match { scrutinee, arms, .. } => self.eval_match(scrutinee, arms, log),
            Stmt::Let { bindings, body, .. } => self.eval_bound_body("let", bindings, None, body, log),
            Stmt::Loop { head, body, .. } => self.eval_loop(head, body, None, log),
            Stmt::For { head, body, .. } => {
                // On resume, keep filling the accumulator the suspension
                // recorded instead of starting a fresh one.
                let flex = if let Some(ResumeFrame::Collect(saved)) = self.resume_path.last().copied() {
                    self.resume_path.pop();
                    saved
                } else {
                    self.heap.allocate(HeapData::Flex(FlexArray::new()))
                };
                let mark = self.temp_mark();
                self.temp_push(Value::Ref(flex));
                let result = self.eval_loop(head, body, Some(flex), log);
                self.temp_truncate(mark);
                let value = result?;
                if value.is_state() {
                    self.record_suspend(value, ResumeFrame::Collect(flex));
                    Ok(value)
                } else {
                    Ok(Value::Ref(flex))
                }
            }
            Stmt::Yield { value, .. } => {
                // A resumed generator continues right after the yield that
                // suspended it: the statement itself evaluates to null.
                if let Some(ResumeFrame::Yielded) = self.resume_path.last() {
                    self.resume_path.pop();
                    return Ok(Value::Null);
                }
                let value = self.eval_expr(value, log)?;
                if value.is_state() {
                    return Ok(value);
                }
                self.pending = value;
                if self.stepping {
                    self.suspend_path.push(ResumeFrame::Yielded);
                }
                Ok(Value::State(StateKind::Yield))
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => {
                        let value = self.eval_expr(expr, log)?;
                        if value.is_state() {
                            return Ok(value);
                        }
                        value
                    }
                    None => Value::Null,
                };
                self.pending = value;
                Ok(Value::State(StateKind::Return))
            }
            Stmt::Use { path, loc } => Err(RunError::not_implemented(format!(
                "module loading is not implemented (use {})",
                self.interns.get(*path)
            ))
            .at(*loc)),
            Stmt::NotImplemented { what, loc } => {
                Err(RunError::not_implemented(format!("{what} is not implemented")).at(*loc))
            }
        }
    }

    fn eval_struct_def(
        &mut self,
        name: StringId,
        fields: &'m [FieldDecl],
        loc: CodeLoc,
        log: &mut impl LogWriter,
    ) -> RunResult<Value> {
        let mark = self.temp_mark();
        for field in fields {
            let default = match &field.default {
                Some(expr) => {
                    let value = self.eval_expr(expr, log)?;
                    if value.is_state() {
                        self.temp_truncate(mark);
                        return Ok(value);
                    }
                    value
                }
                // Type annotations are only consulted for zero-value
                // defaulting.
                None => self.zero_default(field.type_name),
            };
            self.temp_push(default);
        }
        let defaults = self.temp_take(mark);
        let def = StructDef {
            name,
            fields: fields
                .iter()
                .zip(defaults)
                .map(|(field, default)| crate::types::FieldDef {
                    name: field.name,
                    default,
                })
                .collect(),
        };
        let value = Value::Ref(self.heap.allocate(HeapData::StructDef(def)));
        self.define_current(name, value, false).map_err(|err| err.at(loc))?;
        Ok(value)
    }

    fn zero_default(&self, type_name: Option<StringId>) -> Value {
        let Some(type_name) = type_name else {
            return Value::Null;
        };
        match self.interns.get(type_name) {
            "Int" => Value::Int(0),
            "Byte" => Value::Byte(0),
            "Bool" => Value::Bool(false),
            "Float" => Value::Float(0.0),
            "Str" => Value::Str(Interns::EMPTY),
            _ => Value::Null,
        }
    }

    fn eval_match(&mut self, scrutinee: &'m ExprLoc, arms: &'m [MatchArm], log: &mut impl LogWriter) -> RunResult<Value> {
        // On resume, go straight back into the suspended arm; the
        // scrutinee and earlier patterns are not re-evaluated.
        if let Some(ResumeFrame::Arm(index)) = self.resume_path.last().copied() {
            self.resume_path.pop();
            let value = self.eval_stmt(&arms[index].body, log)?;
            self.record_suspend(value, ResumeFrame::Arm(index));
            return Ok(value);
        }
        let subject = self.eval_expr(scrutinee, log)?;
        if subject.is_state() {
            return Ok(subject);
        }
        let mark = self.temp_mark();
        self.temp_push(subject);
        let result = self.eval_match_arms(subject, arms, log);
        self.temp_truncate(mark);
        result
    }

    fn eval_match_arms(
        &mut self,
        subject: Value,
        arms: &'m [MatchArm],
        log: &mut impl LogWriter,
    ) -> RunResult<Value> {
        for (index, arm) in arms.iter().enumerate() {
            match &arm.pattern {
                Some(pattern) => {
                    let candidate = self.eval_expr(pattern, log)?;
                    if candidate.is_state() {
                        return Ok(candidate);
                    }
                    if subject.eq_value(candidate, &self.heap, &self.interns) {
                        let value = self.eval_stmt(&arm.body, log)?;
                        self.record_suspend(value, ResumeFrame::Arm(index));
                        return Ok(value);
                    }
                }
                None => {
                    let value = self.eval_stmt(&arm.body, log)?;
                    self.record_suspend(value, ResumeFrame::Arm(index));
                    return Ok(value);
                }
            }
        }
        Ok(Value::Null)
    }

    // --- loops ----------------------------------------------------------

    /// Shared engine for `loop` and `for`. With `collect`, each iteration's
    /// non-state value is appended to the flexible array (the caller pins
    /// it).
    fn eval_loop(
        &mut self,
        head: &'m LoopHead,
        body: &'m [Stmt],
        collect: Option<HeapId>,
        log: &mut impl LogWriter,
    ) -> RunResult<Value> {
        match head {
            LoopHead::Plain => loop {
                // Plain loop bodies are transparent: no iteration scope.
                let value = self.eval_stmts(body, log)?;
                match value.as_state() {
                    Some(StateKind::Break) => return Ok(Value::Null),
                    Some(StateKind::Continue) | None => {
                        if let Some(flex) = collect {
                            if value.as_state().is_none() {
                                self.flex_push(flex, value);
                            }
                        }
                    }
                    Some(StateKind::Done) if collect.is_some() => return Ok(Value::Null),
                    Some(_) => return Ok(value),
                }
            },
            LoopHead::Condition(cond) => {
                // A suspended iteration is finished before the condition
                // is looked at again.
                let mut resume_iteration = matches!(self.resume_path.last(), Some(ResumeFrame::LoopIter));
                if resume_iteration {
                    self.resume_path.pop();
                }
                loop {
                    if resume_iteration {
                        resume_iteration = false;
                    } else {
                        let test = self.eval_expr(cond, log)?;
                        if test.is_state() {
                            return Ok(test);
                        }
                        if !test.truthy(&self.heap, &self.interns) {
                            return Ok(Value::Null);
                        }
                    }
                    // Each iteration gets its own scope.
                    let value = self.eval_scoped_block(body, "loop", log)?;
                    match value.as_state() {
                        Some(StateKind::Break) => return Ok(Value::Null),
                        Some(StateKind::Continue) => {}
                        Some(StateKind::Done) if collect.is_some() => return Ok(Value::Null),
                        Some(_) => {
                            self.record_suspend(value, ResumeFrame::LoopIter);
                            return Ok(value);
                        }
                        None => {
                            if let Some(flex) = collect {
                                self.flex_push(flex, value);
                            }
                        }
                    }
                }
            }
            LoopHead::Bindings(bindings) => {
                let mark = self.temp_mark();
                let result = self.eval_binding_loop(bindings, body, collect, log);
                self.temp_truncate(mark);
                result
            }
        }
    }

    fn flex_push(&mut self, flex: HeapId, value: Value) {
        match self.heap.get_mut(flex) {
            HeapData::Flex(array) => array.push(value),
            other => unreachable!("comprehension accumulator is always flexible, found {}", other.type_name()),
        }
    }

    /// Binds the group into the current scope — the stream slot from
    /// `stream`, the rest by evaluating their expressions — then runs the
    /// body. The scope must already be pushed.
    fn bind_group_and_run(
        &mut self,
        bindings: &'m [Binding],
        stream: Option<(usize, Value)>,
        body: &'m [Stmt],
        log: &mut impl LogWriter,
    ) -> RunResult<Value> {
        if let Some((stream_index, element)) = stream {
            self.define_current(bindings[stream_index].name, element, false)?;
        }
        for (index, binding) in bindings.iter().enumerate() {
            if stream.is_some_and(|(stream_index, _)| stream_index == index) {
                continue;
            }
            let bound = self.eval_expr(&binding.value, log)?;
            if bound.is_state() {
                return Ok(bound);
            }
            self.define_current(binding.name, bound, false)?;
        }
        self.eval_stmts(body, log)
    }

    /// Runs `body` in a child scope populated from a bindings group.
    ///
    /// Backs `let` and both binding-loop shapes. On generator resume the
    /// suspended scope is reused and the binding prologue is skipped —
    /// execution continues inside the body; on suspension the scope rides
    /// in the resume path.
    fn eval_bound_body(
        &mut self,
        doc: &'static str,
        bindings: &'m [Binding],
        stream: Option<(usize, Value)>,
        body: &'m [Stmt],
        log: &mut impl LogWriter,
    ) -> RunResult<Value> {
        let resumed = self.resume_scope();
        let scope = match resumed {
            Some(saved) => saved,
            None => self
                .heap
                .allocate(HeapData::Scope(Scope::new(Some(self.current_scope()), doc))),
        };
        self.scopes.push(scope);
        let result = if resumed.is_some() {
            self.eval_stmts(body, log)
        } else {
            self.bind_group_and_run(bindings, stream, body, log)
        };
        self.scopes.pop();
        let value = result?;
        self.record_suspend(value, ResumeFrame::Scope(scope));
        Ok(value)
    }

    /// Stream iteration: the first `<-` binding drives the loop, `=`
    /// bindings re-evaluate per iteration. With no `<-` binding the group
    /// evaluates once and the body runs once.
    ///
    /// The caller truncates the pin stack, so early returns may leave pins.
    fn eval_binding_loop(
        &mut self,
        bindings: &'m [Binding],
        body: &'m [Stmt],
        collect: Option<HeapId>,
        log: &mut impl LogWriter,
    ) -> RunResult<Value> {
        let Some(stream_index) = bindings.iter().position(|b| b.kind == BindingKind::Stream) else {
            let value = self.eval_bound_body("loop", bindings, None, body, log)?;
            return match value.as_state() {
                Some(StateKind::Break | StateKind::Continue) => Ok(Value::Null),
                Some(StateKind::Done) if collect.is_some() => Ok(Value::Null),
                Some(_) => Ok(value),
                None => {
                    if let Some(flex) = collect {
                        self.flex_push(flex, value);
                    }
                    Ok(Value::Null)
                }
            };
        };

        let stream = &bindings[stream_index];
        // On resume, pick the iteration back up where it was suspended:
        // the source is not re-evaluated and the current element's body
        // continues through the saved scope.
        let resumed = if let Some(ResumeFrame::BindingIter {
            next_index,
            source,
            element,
        }) = self.resume_path.last().copied()
        {
            self.resume_path.pop();
            Some((next_index, source, element))
        } else {
            None
        };
        let (source, start_index, mut carried) = match resumed {
            Some((next_index, source, element)) => (source, next_index, Some(element)),
            None => {
                let source = self.eval_expr(&stream.value, log)?;
                if source.is_state() {
                    return Ok(source);
                }
                (source, 0, None)
            }
        };
        self.temp_push(source);
        let items: Option<Vec<Value>> = match source.ref_id().map(|id| self.heap.get(id)) {
            Some(HeapData::Array(array)) => Some(array.as_slice().to_vec()),
            Some(HeapData::Flex(flex)) => Some(flex.as_slice().to_vec()),
            Some(HeapData::Generator(_)) => None,
            _ => {
                return Err(RunError::interp(format!(
                    "cannot iterate over {} in a binding loop",
                    source.type_of(&self.heap)
                ))
                .at(stream.value.loc));
            }
        };

        let mut next_index = start_index;
        loop {
            let element = match carried.take() {
                Some(element) => element,
                None => match &items {
                    Some(items) => {
                        let Some(&element) = items.get(next_index) else {
                            break;
                        };
                        next_index += 1;
                        element
                    }
                    None => {
                        let generator = source.ref_id().expect("generator source is a heap value");
                        match self.generator_next(generator, log)? {
                            Some(element) => element,
                            None => break,
                        }
                    }
                },
            };
            if let Value::State(StateKind::Done) = element {
                break;
            }
            let element_mark = self.temp_mark();
            self.temp_push(element);
            let value = self.eval_bound_body("iteration", bindings, Some((stream_index, element)), body, log);
            self.temp_truncate(element_mark);
            let value = value?;
            if self.stepping && value.as_state() == Some(StateKind::Yield) {
                self.suspend_path.push(ResumeFrame::BindingIter {
                    next_index,
                    source,
                    element,
                });
                return Ok(value);
            }
            match value.as_state() {
                Some(StateKind::Break) => break,
                Some(StateKind::Continue) => {}
                Some(StateKind::Done) => break,
                Some(_) => return Ok(value),
                None => {
                    if let Some(flex) = collect {
                        self.flex_push(flex, value);
                    }
                }
            }
        }
        Ok(Value::Null)
    }

    // --- expressions ----------------------------------------------------

    fn eval_expr(&mut self, expr: &'m ExprLoc, log: &mut impl LogWriter) -> RunResult<Value> {
        match &expr.expr {
            Expr::Int(v) => Ok(Value::Int(*v)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Double(d) => Ok(self.alloc_double(*d)),
            Expr::Str(id) => Ok(Value::Str(*id)),
            Expr::TagLit(symbol) => Ok(Value::Tag(*symbol)),
            Expr::StateLit(kind) => Ok(Value::State(*kind)),
            Expr::Ident(name) => self.lookup(*name).ok_or_else(|| {
                RunError::interp(format!("unknown identifier '{}'", self.interns.get(*name))).at(expr.loc)
            }),
            Expr::TypeRef(name) => self.lookup(*name).ok_or_else(|| {
                RunError::interp(format!("unknown type '{}'", self.interns.get(*name))).at(expr.loc)
            }),
            Expr::Unary { op, operand } => {
                let value = self.eval_expr(operand, log)?;
                if value.is_state() {
                    return Ok(value);
                }
                self.unary_op(*op, value, expr.loc)
            }
            Expr::Binary { op, lhs, rhs } => {
                let left = self.eval_expr(lhs, log)?;
                if left.is_state() {
                    return Ok(left);
                }
                let mark = self.temp_mark();
                self.temp_push(left);
                let right = self.eval_expr(rhs, log);
                self.temp_truncate(mark);
                let right = right?;
                if right.is_state() {
                    return Ok(right);
                }
                self.binary_op(*op, left, right, expr.loc)
            }
            Expr::Call { callee, args } => {
                let callee = self.eval_expr(callee, log)?;
                if callee.is_state() {
                    return Ok(callee);
                }
                let mark = self.temp_mark();
                self.temp_push(callee);
                let arg_values = match self.eval_args(args, log) {
                    Ok(Some(values)) => values,
                    Ok(None) => {
                        // A state sentinel surfaced in an argument.
                        let state = self.temp_roots.pop().expect("sentinel pinned by eval_args");
                        self.temp_truncate(mark);
                        return Ok(state);
                    }
                    Err(err) => {
                        self.temp_truncate(mark);
                        return Err(err);
                    }
                };
                let result = self.call_value(callee, arg_values, expr.loc, log);
                self.temp_truncate(mark);
                result.map_err(|err| err.at(expr.loc))
            }
            Expr::Member { object, field } => {
                let object = self.eval_expr(object, log)?;
                if object.is_state() {
                    return Ok(object);
                }
                self.member_get(object, *field, expr.loc)
            }
            Expr::MethodCall { object, method, args } => {
                let receiver = self.eval_expr(object, log)?;
                if receiver.is_state() {
                    return Ok(receiver);
                }
                let mark = self.temp_mark();
                self.temp_push(receiver);
                let arg_values = match self.eval_args(args, log) {
                    Ok(Some(values)) => values,
                    Ok(None) => {
                        let state = self.temp_roots.pop().expect("sentinel pinned by eval_args");
                        self.temp_truncate(mark);
                        return Ok(state);
                    }
                    Err(err) => {
                        self.temp_truncate(mark);
                        return Err(err);
                    }
                };
                let result = self.call_method(receiver, *method, arg_values, expr.loc, log);
                self.temp_truncate(mark);
                result
            }
            Expr::ObjectLit { type_name, fields } => self.eval_object_lit(*type_name, fields, expr.loc, log),
            Expr::Lambda(function) => {
                let record = FunctionRecord {
                    function: *function,
                    name: None,
                    captured: self.current_scope(),
                };
                Ok(Value::Ref(self.heap.allocate(HeapData::Function(record))))
            }
            Expr::Error => Err(RunError::interp("cannot evaluate a parse-error placeholder").at(expr.loc)),
        }
    }

    /// Evaluates call arguments left-to-right, pinning each.
    ///
    /// `Ok(None)` means an argument produced a state sentinel, which is
    /// left on top of the pin stack for the caller to pop and propagate.
    fn eval_args(&mut self, args: &'m [ExprLoc], log: &mut impl LogWriter) -> RunResult<Option<Vec<Value>>> {
        let mark = self.temp_mark();
        for arg in args {
            let value = self.eval_expr(arg, log)?;
            if value.is_state() {
                self.temp_truncate(mark);
                self.temp_push(value);
                return Ok(None);
            }
            self.temp_push(value);
        }
        Ok(Some(self.temp_take(mark)))
    }

    fn unary_op(&mut self, op: UnaryOp, value: Value, loc: CodeLoc) -> RunResult<Value> {
        match op {
            UnaryOp::Not => Ok(Value::Bool(!value.truthy(&self.heap, &self.interns))),
            UnaryOp::Neg => match value {
                Value::Int(v) => v
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| RunError::interp("integer overflow in negation").at(loc)),
                Value::Byte(v) => Ok(Value::Int(-i64::from(v))),
                Value::Float(f) => Ok(Value::Float(-f)),
                _ => match value.as_f64(&self.heap) {
                    Some(d) if value.type_of(&self.heap) == Type::Double => Ok(self.alloc_double(-d)),
                    _ => Err(RunError::interp(format!(
                        "cannot negate {}",
                        value.type_of(&self.heap)
                    ))
                    .at(loc)),
                },
            },
        }
    }

    fn binary_op(&mut self, op: BinaryOp, left: Value, right: Value, loc: CodeLoc) -> RunResult<Value> {
        match op {
            BinaryOp::Eq => Ok(Value::Bool(left.eq_value(right, &self.heap, &self.interns))),
            BinaryOp::Ne => Ok(Value::Bool(!left.eq_value(right, &self.heap, &self.interns))),
            BinaryOp::And => match (left, right) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a & b)),
                _ => Ok(Value::Bool(
                    left.truthy(&self.heap, &self.interns) && right.truthy(&self.heap, &self.interns),
                )),
            },
            BinaryOp::Or => match (left, right) {
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a | b)),
                _ => Ok(Value::Bool(
                    left.truthy(&self.heap, &self.interns) || right.truthy(&self.heap, &self.interns),
                )),
            },
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => self.compare_op(op, left, right, loc),
            BinaryOp::Add if matches!((left, right), (Value::Str(_), Value::Str(_))) => {
                let (Value::Str(a), Value::Str(b)) = (left, right) else {
                    unreachable!("guard matched string operands");
                };
                let joined = format!("{}{}", self.interns.get(a), self.interns.get(b));
                Ok(Value::Str(self.interns.intern(&joined)))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                self.numeric_op(op, left, right, loc)
            }
        }
    }

    fn compare_op(&self, op: BinaryOp, left: Value, right: Value, loc: CodeLoc) -> RunResult<Value> {
        use std::cmp::Ordering;
        let ordering = if let (Value::Str(a), Value::Str(b)) = (left, right) {
            Some(self.interns.get(a).cmp(self.interns.get(b)))
        } else if let (Some(a), Some(b)) = (left.as_f64(&self.heap), right.as_f64(&self.heap)) {
            a.partial_cmp(&b)
        } else {
            return Err(self.unsupported_op(op, left, right, loc));
        };
        let Some(ordering) = ordering else {
            // NaN comparisons are all false.
            return Ok(Value::Bool(false));
        };
        let result = match op {
            BinaryOp::Lt => ordering == Ordering::Less,
            BinaryOp::Gt => ordering == Ordering::Greater,
            BinaryOp::Le => ordering != Ordering::Greater,
            BinaryOp::Ge => ordering != Ordering::Less,
            _ => unreachable!("compare_op only handles orderings"),
        };
        Ok(Value::Bool(result))
    }

    fn numeric_op(&mut self, op: BinaryOp, left: Value, right: Value, loc: CodeLoc) -> RunResult<Value> {
        if let (Value::Int(a), Value::Int(b)) = (left, right) {
            return self.int_op(op, a, b, loc);
        }
        let (Some(a), Some(b)) = (left.as_f64(&self.heap), right.as_f64(&self.heap)) else {
            return Err(self.unsupported_op(op, left, right, loc));
        };
        if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b == 0.0 {
            return Err(RunError::interp("division by zero").at(loc));
        }
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a % b,
            _ => unreachable!("numeric_op only handles arithmetic"),
        };
        // Mixing Int and Float promotes to Float; anything touching a
        // Double promotes to Double.
        let double_involved = left.type_of(&self.heap) == Type::Double || right.type_of(&self.heap) == Type::Double;
        if double_involved {
            Ok(self.alloc_double(result))
        } else {
            Ok(Value::Float(result as f32))
        }
    }

    fn int_op(&self, op: BinaryOp, a: i64, b: i64, loc: CodeLoc) -> RunResult<Value> {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => {
                if b == 0 {
                    return Err(RunError::interp("division by zero").at(loc));
                }
                a.checked_div(b)
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return Err(RunError::interp("modulo by zero").at(loc));
                }
                a.checked_rem(b)
            }
            _ => unreachable!("int_op only handles arithmetic"),
        };
        result
            .map(Value::Int)
            .ok_or_else(|| RunError::interp("integer overflow").at(loc))
    }

    fn unsupported_op(&self, op: BinaryOp, left: Value, right: Value, loc: CodeLoc) -> RunError {
        RunError::interp(format!(
            "unsupported operation: {} {} {}",
            left.type_of(&self.heap),
            op.symbol(),
            right.type_of(&self.heap)
        ))
        .at(loc)
    }

    // --- members and methods -------------------------------------------

    fn member_get(&self, object: Value, field: StringId, loc: CodeLoc) -> RunResult<Value> {
        let hash = self.interns.hash(field);
        if let Some(id) = object.ref_id()
            && let HeapData::Instance(instance) = self.heap.get(id)
        {
            if let Some(value) = instance.fields.find(field, hash) {
                return Ok(value);
            }
            let template = self.heap.struct_def(instance.template);
            if let Some(declared) = template.field(field) {
                return Ok(declared.default);
            }
            return Err(RunError::interp(format!(
                "struct {} has no member '{}'",
                self.interns.get(template.name),
                self.interns.get(field)
            ))
            .at(loc));
        }
        Err(RunError::interp(format!(
            "member access on {} (no member '{}')",
            object.type_of(&self.heap),
            self.interns.get(field)
        ))
        .at(loc))
    }

    /// Method resolution: the object's own scope first, then the enclosing
    /// scopes for `TypeName_method`, then a generic `method`. The found
    /// function is called with the receiver prepended to the arguments.
    pub(crate) fn call_method(
        &mut self,
        receiver: Value,
        method: StringId,
        args: Vec<Value>,
        loc: CodeLoc,
        log: &mut impl LogWriter,
    ) -> RunResult<Value> {
        let hash = self.interns.hash(method);
        if let Some(id) = receiver.ref_id()
            && let HeapData::Instance(instance) = self.heap.get(id)
            && let Some(own) = instance.fields.find(method, hash)
        {
            return self.call_with_receiver(own, receiver, args, loc, log);
        }
        let prefix: String = match receiver.ref_id().map(|id| self.heap.get(id)) {
            Some(HeapData::Instance(instance)) => {
                self.interns.get(self.heap.struct_def(instance.template).name).to_owned()
            }
            _ => receiver.type_of(&self.heap).method_prefix().to_owned(),
        };
        let qualified = format!("{prefix}_{}", self.interns.get(method));
        let qualified_id = self.interns.intern(&qualified);
        if let Some(found) = self.lookup(qualified_id) {
            return self.call_with_receiver(found, receiver, args, loc, log);
        }
        if let Some(found) = self.lookup(method) {
            return self.call_with_receiver(found, receiver, args, loc, log);
        }
        Err(RunError::interp(format!(
            "no method '{}' for {}",
            self.interns.get(method),
            prefix
        ))
        .at(loc))
    }

    fn call_with_receiver(
        &mut self,
        callee: Value,
        receiver: Value,
        args: Vec<Value>,
        loc: CodeLoc,
        log: &mut impl LogWriter,
    ) -> RunResult<Value> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(receiver);
        full.extend(args);
        self.call_value(callee, full, loc, log).map_err(|err| err.at(loc))
    }

    fn eval_object_lit(
        &mut self,
        type_name: StringId,
        fields: &'m [(StringId, ExprLoc)],
        loc: CodeLoc,
        log: &mut impl LogWriter,
    ) -> RunResult<Value> {
        let template = self.lookup(type_name).ok_or_else(|| {
            RunError::interp(format!("unknown struct '{}'", self.interns.get(type_name))).at(loc)
        })?;
        let template_id = match template.ref_id() {
            Some(id) if matches!(self.heap.get(id), HeapData::StructDef(_)) => id,
            _ => {
                return Err(RunError::interp(format!(
                    "'{}' is not a struct",
                    self.interns.get(type_name)
                ))
                .at(loc));
            }
        };
        let declared: Vec<StringId> = self.heap.struct_def(template_id).fields.iter().map(|f| f.name).collect();

        let mark = self.temp_mark();
        for (name, expr) in fields {
            if !declared.contains(name) {
                self.temp_truncate(mark);
                return Err(RunError::interp(format!(
                    "struct {} has no field '{}'",
                    self.interns.get(type_name),
                    self.interns.get(*name)
                ))
                .at(expr.loc));
            }
            let value = self.eval_expr(expr, log)?;
            if value.is_state() {
                self.temp_truncate(mark);
                return Ok(value);
            }
            self.temp_push(value);
        }
        let values = self.temp_take(mark);

        let interns = &self.interns;
        let instance = {
            let def = self.heap.struct_def(template_id);
            Instance::from_template(template_id, def, |id| interns.hash(id))
        };
        let mut instance = instance;
        for ((name, _), value) in fields.iter().zip(values) {
            instance.fields.insert(*name, self.interns.hash(*name), value);
        }
        Ok(Value::Ref(self.heap.allocate(HeapData::Instance(instance))))
    }

    // --- calls ----------------------------------------------------------

    /// Calls any callable value: a native or a user function record.
    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        loc: CodeLoc,
        log: &mut impl LogWriter,
    ) -> RunResult<Value> {
        match callee {
            Value::Native(native) => call_native(self, native, ArgValues::from_values(&args), log),
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Function(record) => {
                    let record = *record;
                    self.call_function(record, args, loc, log)
                }
                other => Err(RunError::interp(format!("called a non-function value of type {}", other.type_name()))),
            },
            _ => Err(RunError::interp(format!(
                "called a non-function value of type {}",
                callee.type_of(&self.heap)
            ))),
        }
    }

    /// User function call: fresh child scope of the captured scope,
    /// positional binding, defaults for missing arguments. Generator
    /// definitions instantiate a resumable record instead of running.
    pub(crate) fn call_function(
        &mut self,
        record: FunctionRecord,
        args: Vec<Value>,
        loc: CodeLoc,
        log: &mut impl LogWriter,
    ) -> RunResult<Value> {
        let module = self.module;
        let def = module.function(record.function);

        if def.is_generator {
            let scope = self
                .heap
                .allocate(HeapData::Scope(Scope::new(Some(record.captured), "generator")));
            self.scopes.push(scope);
            let bound = self.bind_params(def, &args, log);
            self.scopes.pop();
            bound.map_err(|err| self.framed(err, def, loc))?;
            let generator = Generator::new(record.function, record.name, scope);
            return Ok(Value::Ref(self.heap.allocate(HeapData::Generator(generator))));
        }

        if self.depth >= MAX_CALL_DEPTH {
            return Err(RunError::interp(format!("call depth limit of {MAX_CALL_DEPTH} exceeded")).at(loc));
        }
        self.depth += 1;
        let scope = self
            .heap
            .allocate(HeapData::Scope(Scope::new(Some(record.captured), "function")));
        self.scopes.push(scope);
        // Generator suspension never crosses a call boundary: a yield in a
        // called function is an error, not a suspension point, and resume
        // frames belong to the caller's body.
        let outer_stepping = std::mem::replace(&mut self.stepping, false);
        let outer_resume = std::mem::take(&mut self.resume_path);
        let result = self
            .bind_params(def, &args, log)
            .and_then(|()| self.eval_stmts(&def.body, log));
        self.resume_path = outer_resume;
        self.stepping = outer_stepping;
        self.scopes.pop();
        self.depth -= 1;

        let value = result.map_err(|err| self.framed(err, def, loc))?;
        match value.as_state() {
            // The function boundary consumes Return; the payload is the
            // call's value.
            Some(StateKind::Return) => Ok(self.take_pending()),
            Some(StateKind::Yield) => {
                Err(RunError::interp("yield outside a generator body").at(loc))
            }
            Some(StateKind::Break | StateKind::Continue) => Err(RunError::interp(format!(
                "{} escaped the function body without an enclosing loop",
                value.as_state().expect("state checked")
            ))
            .at(loc)),
            // Done and Exit pass through to the caller.
            Some(_) | None => Ok(value),
        }
    }

    /// Records a traceback frame while an error unwinds this call.
    fn framed(&self, mut err: RunError, def: &FunctionDef, call_site: CodeLoc) -> RunError {
        let name = def
            .name
            .map_or_else(|| "<fn>".to_owned(), |id| self.interns.get(id).to_owned());
        err.push_frame(name, call_site);
        err
    }

    fn bind_params(&mut self, def: &'m FunctionDef, args: &[Value], log: &mut impl LogWriter) -> RunResult<()> {
        if args.len() > def.params.len() {
            let name = def.name.map_or("<fn>", |id| self.interns.get(id));
            return Err(RunError::interp(format!(
                "{name}() takes {} argument(s), got {}",
                def.params.len(),
                args.len()
            )));
        }
        for (index, param) in def.params.iter().enumerate() {
            let value = if index < args.len() {
                args[index]
            } else if let Some(default) = &param.default {
                let value = self.eval_expr(default, log)?;
                if value.is_state() { Value::Null } else { value }
            } else {
                Value::Null
            };
            self.define_current(param.name, value, false)?;
        }
        Ok(())
    }

    // --- generators -----------------------------------------------------

    /// Advances a generator to its next `yield`.
    ///
    /// Returns `Ok(None)` when the sequence is exhausted. Resumption
    /// continues exactly after the yield that suspended the body: the
    /// stored resume path re-enters every in-progress construct — saved
    /// scopes included — and the yield statement itself evaluates to null
    /// on the way back in, so the statements after it run once per step.
    pub(crate) fn generator_next(&mut self, id: HeapId, log: &mut impl LogWriter) -> RunResult<Option<Value>> {
        let (function, scope, stored_resume) = match self.heap.get_mut(id) {
            HeapData::Generator(generator) => {
                if matches!(generator.state, GeneratorState::Returned | GeneratorState::Errored) {
                    return Ok(None);
                }
                generator.state = GeneratorState::Running;
                (generator.function, generator.scope, std::mem::take(&mut generator.resume))
            }
            other => {
                return Err(RunError::interp(format!(
                    "expected a generator, found {}",
                    other.type_name()
                )));
            }
        };
        let module = self.module;
        let def = module.function(function);

        // Install this generator's stepping context. Nested steps (a
        // generator consumed inside another generator's body) stack.
        let outer_stepping = std::mem::replace(&mut self.stepping, true);
        let outer_suspend = std::mem::take(&mut self.suspend_path);
        let outer_resume = std::mem::replace(&mut self.resume_path, stored_resume);
        self.scopes.push(scope);
        let result = self.eval_stmts(&def.body, log);
        self.scopes.pop();
        let recorded = std::mem::replace(&mut self.suspend_path, outer_suspend);
        self.resume_path = outer_resume;
        self.stepping = outer_stepping;

        let (next_state, next_resume, outcome) = match result {
            Err(err) => (GeneratorState::Errored, Vec::new(), Err(err)),
            Ok(value) => match value.as_state() {
                Some(StateKind::Yield) => (GeneratorState::Yielded, recorded, Ok(Some(self.take_pending()))),
                Some(StateKind::Return | StateKind::Done | StateKind::Exit) => {
                    let _ = self.take_pending();
                    (GeneratorState::Returned, Vec::new(), Ok(None))
                }
                Some(StateKind::Break | StateKind::Continue) => (
                    GeneratorState::Errored,
                    Vec::new(),
                    Err(RunError::interp(format!(
                        "{} escaped the generator body without an enclosing loop",
                        value.as_state().expect("state checked")
                    ))),
                ),
                None => (GeneratorState::Returned, Vec::new(), Ok(None)),
            },
        };
        if let HeapData::Generator(generator) = self.heap.get_mut(id) {
            generator.state = next_state;
            generator.resume = next_resume;
        }
        outcome
    }
}
