//! Abstract syntax produced by the parser.
//!
//! Expressions carry their source location so runtime errors can point back
//! at user source. Function bodies live in a side table on the [`Module`],
//! referenced by [`FunctionId`] — function *records* on the heap pair such
//! an id with the scope they captured.

use smallvec::SmallVec;

use crate::{
    errors::CodeLoc,
    intern::StringId,
    value::{StateKind, Symbol},
};

/// Index of a parsed function definition in [`Module::functions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct FunctionId(u32);

impl FunctionId {
    pub fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("function table overflow"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An expression with its source location.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExprLoc {
    pub expr: Expr,
    pub loc: CodeLoc,
}

impl ExprLoc {
    pub fn new(expr: Expr, loc: CodeLoc) -> Self {
        Self { expr, loc }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    /// Operator spelling for error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&",
            Self::Or => "|",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Int(i64),
    Float(f32),
    Double(f64),
    Str(StringId),
    /// `#NAME` literal, packed at parse time.
    TagLit(Symbol),
    /// `done` (and friends, were they spellable) — a state sentinel literal.
    StateLit(StateKind),
    Ident(StringId),
    /// Uppercase name in expression position: a struct template reference.
    TypeRef(StringId),
    Unary {
        op: UnaryOp,
        operand: Box<ExprLoc>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<ExprLoc>,
        rhs: Box<ExprLoc>,
    },
    Call {
        callee: Box<ExprLoc>,
        args: Vec<ExprLoc>,
    },
    Member {
        object: Box<ExprLoc>,
        field: StringId,
    },
    MethodCall {
        object: Box<ExprLoc>,
        method: StringId,
        args: Vec<ExprLoc>,
    },
    /// `Name { field = expr, ... }`
    ObjectLit {
        type_name: StringId,
        fields: Vec<(StringId, ExprLoc)>,
    },
    /// `fn(params) -> expr`
    Lambda(FunctionId),
    /// Placeholder produced during parse-error recovery. The driver refuses
    /// to evaluate a module with recorded diagnostics, so this never runs.
    Error,
}

/// How a binding in a `let`/`loop`/`for` group binds its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindingKind {
    /// `name = expr` — bind the value.
    Value,
    /// `name <- expr` — bind elements of the stream.
    Stream,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Binding {
    pub name: StringId,
    pub kind: BindingKind,
    pub value: ExprLoc,
}

/// The three shapes a `loop`/`for` head can take. Disambiguated at parse
/// time so the evaluator never has to guess.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LoopHead {
    /// `loop := ...` — run until a state sentinel.
    Plain,
    /// `loop (cond) := ...` — iterate while the condition is truthy.
    Condition(ExprLoc),
    /// `loop (x <- xs, y = e) := ...` — stream iteration.
    Bindings(Vec<Binding>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MatchArm {
    /// `None` is the `else` arm.
    pub pattern: Option<ExprLoc>,
    pub body: Box<Stmt>,
    pub loc: CodeLoc,
}

/// A struct field declaration. The type annotation is only consulted for
/// zero-value defaulting.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FieldDecl {
    pub name: StringId,
    pub type_name: Option<StringId>,
    pub default: Option<ExprLoc>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Param {
    pub name: StringId,
    pub default: Option<ExprLoc>,
}

/// A parsed function definition (named, anonymous, or generator).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FunctionDef {
    pub name: Option<StringId>,
    pub params: SmallVec<[Param; 4]>,
    pub body: Vec<Stmt>,
    /// `loop fn` — calls return a lazy generator instead of running.
    pub is_generator: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    Expr(ExprLoc),
    /// `;`
    Discard(CodeLoc),
    /// Nested indented block (introduces a scope).
    Block(Vec<Stmt>),
    Const {
        name: StringId,
        value: ExprLoc,
        loc: CodeLoc,
    },
    /// `name = expr` in statement position: define or update in the
    /// current scope.
    Assign {
        name: StringId,
        value: ExprLoc,
        loc: CodeLoc,
    },
    FnDef {
        function: FunctionId,
        loc: CodeLoc,
    },
    StructDef {
        name: StringId,
        fields: Vec<FieldDecl>,
        loc: CodeLoc,
    },
    If {
        cond: ExprLoc,
        body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
        loc: CodeLoc,
    },
    Match {
        scrutinee: ExprLoc,
        arms: Vec<MatchArm>,
        loc: CodeLoc,
    },
    Let {
        bindings: Vec<Binding>,
        body: Vec<Stmt>,
        loc: CodeLoc,
    },
    Loop {
        head: LoopHead,
        body: Vec<Stmt>,
        loc: CodeLoc,
    },
    /// Comprehension form of `loop`: body values are collected.
    For {
        head: LoopHead,
        body: Vec<Stmt>,
        loc: CodeLoc,
    },
    Yield {
        value: ExprLoc,
        loc: CodeLoc,
    },
    Return {
        value: Option<ExprLoc>,
        loc: CodeLoc,
    },
    Use {
        path: StringId,
        loc: CodeLoc,
    },
    /// Parsed surface with no runtime semantics (`mut`, `trait`, `mod`,
    /// `macro`). Evaluation reports a not-implemented error.
    NotImplemented {
        what: &'static str,
        loc: CodeLoc,
    },
}

/// A fully parsed source file: top-level statements plus the function table.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct Module {
    pub body: Vec<Stmt>,
    pub functions: Vec<FunctionDef>,
}

impl Module {
    pub fn function(&self, id: FunctionId) -> &FunctionDef {
        &self.functions[id.index()]
    }
}
