//! Recursive-descent statement parser with Pratt precedence climbing for
//! expressions.
//!
//! Parsing never aborts: every unexpected token records a [`Diagnostic`]
//! carrying the token text, kind, line and column, consumes one token, and
//! continues. The driver refuses to evaluate when any diagnostic was
//! recorded, so error-recovery placeholders never reach the evaluator.

use smallvec::SmallVec;

use crate::{
    ast::{
        Binding, BindingKind, BinaryOp, Expr, ExprLoc, FieldDecl, FunctionDef, FunctionId, LoopHead, MatchArm, Module,
        Param, Stmt, UnaryOp,
    },
    errors::{CodeLoc, Diagnostic},
    intern::{Interns, StringId},
    token::{Keyword, Token, TokenKind},
    value::{StateKind, Symbol},
};

/// Binding power of member access / call postfix (binds tightest).
const BP_CALL: u8 = 9;
const BP_MEMBER: u8 = 8;
const BP_UNARY: u8 = 7;

/// Parses a token stream into a module, accumulating diagnostics.
pub(crate) fn parse(tokens: Vec<Token>, source: &str, interns: &mut Interns) -> (Module, Vec<Diagnostic>) {
    let mut parser = Parser {
        tokens,
        pos: 0,
        source,
        interns,
        diagnostics: Vec::new(),
        functions: Vec::new(),
    };
    let mut body = Vec::new();
    while !parser.at_end() {
        if let Some(stmt) = parser.parse_stmt() {
            body.push(stmt);
        }
    }
    (
        Module {
            body,
            functions: parser.functions,
        },
        parser.diagnostics,
    )
}

struct Parser<'s, 'i> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'s str,
    interns: &'i mut Interns,
    diagnostics: Vec<Diagnostic>,
    functions: Vec<FunctionDef>,
}

impl<'s> Parser<'s, '_> {
    // --- token plumbing -------------------------------------------------

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<Token> {
        self.tokens.get(self.pos + ahead).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn text(&self, token: Token) -> &'s str {
        token.text(self.source)
    }

    fn current_loc(&self) -> CodeLoc {
        self.peek()
            .or_else(|| self.tokens.last().copied())
            .map_or_else(CodeLoc::default, |t| t.loc())
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    fn check_text(&self, kind: TokenKind, text: &str) -> bool {
        self.peek().is_some_and(|t| t.kind == kind && self.text(t) == text)
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) { self.advance() } else { None }
    }

    fn eat_text(&mut self, kind: TokenKind, text: &str) -> Option<Token> {
        if self.check_text(kind, text) { self.advance() } else { None }
    }

    /// Records a parse error at the current token without consuming it.
    fn error_here(&mut self, message: impl Into<String>) {
        let (loc, token) = match self.peek() {
            Some(t) => (t.loc(), Some(format!("{}: {:?}", t.kind, self.text(t)))),
            None => (self.current_loc(), None),
        };
        self.diagnostics.push(Diagnostic::parse(message, loc, token));
    }

    /// Records a parse error and consumes one token to make progress.
    fn error_consume(&mut self, message: impl Into<String>) {
        self.error_here(message);
        self.advance();
    }

    fn expect_text(&mut self, kind: TokenKind, text: &str) -> bool {
        if self.eat_text(kind, text).is_some() {
            true
        } else {
            self.error_here(format!("expected {text:?}"));
            false
        }
    }

    fn intern_token(&mut self, token: Token) -> StringId {
        self.interns.intern(token.text(self.source))
    }

    /// Consumes a statement-terminating END when present.
    fn end_of_stmt(&mut self) {
        self.eat(TokenKind::End);
    }

    // --- statements -----------------------------------------------------

    fn parse_stmt(&mut self) -> Option<Stmt> {
        let token = self.peek()?;
        match token.kind {
            TokenKind::End | TokenKind::Ignore | TokenKind::DocComment => {
                self.advance();
                None
            }
            TokenKind::Indent => {
                self.advance();
                Some(Stmt::Block(self.parse_stmts_until_dedent()))
            }
            TokenKind::Discard => {
                self.advance();
                self.end_of_stmt();
                Some(Stmt::Discard(token.loc()))
            }
            TokenKind::Keyword(keyword) => self.parse_keyword_stmt(keyword, token),
            TokenKind::Ident
                if self
                    .peek_at(1)
                    .is_some_and(|t| t.kind == TokenKind::Assign && t.text(self.source) == "=") =>
            {
                let name_token = self.advance().expect("ident token peeked");
                let name = self.intern_token(name_token);
                self.advance();
                let value = self.parse_expr(0);
                self.end_of_stmt();
                Some(Stmt::Assign {
                    name,
                    value,
                    loc: token.loc(),
                })
            }
            _ => {
                let expr = self.parse_expr(0);
                self.end_of_stmt();
                Some(Stmt::Expr(expr))
            }
        }
    }

    fn parse_keyword_stmt(&mut self, keyword: Keyword, token: Token) -> Option<Stmt> {
        match keyword {
            Keyword::Const => self.parse_const(token),
            Keyword::Fn => self.parse_fn_stmt(false),
            Keyword::Loop => {
                self.advance();
                if self.check(TokenKind::Keyword(Keyword::Fn)) {
                    self.parse_fn_stmt(true)
                } else {
                    let (head, body) = self.parse_loop_parts();
                    Some(Stmt::Loop {
                        head,
                        body,
                        loc: token.loc(),
                    })
                }
            }
            Keyword::For => {
                self.advance();
                let (head, body) = self.parse_loop_parts();
                Some(Stmt::For {
                    head,
                    body,
                    loc: token.loc(),
                })
            }
            Keyword::If => Some(self.parse_if()),
            Keyword::Let => Some(self.parse_let(token)),
            Keyword::Match => Some(self.parse_match(token)),
            Keyword::Struct => self.parse_struct(token),
            Keyword::Yield => {
                self.advance();
                let value = self.parse_expr(0);
                self.end_of_stmt();
                Some(Stmt::Yield {
                    value,
                    loc: token.loc(),
                })
            }
            Keyword::Return => {
                self.advance();
                let value = if self.check(TokenKind::End) || self.check(TokenKind::Dedent) || self.at_end() {
                    None
                } else {
                    Some(self.parse_expr(0))
                };
                self.end_of_stmt();
                Some(Stmt::Return {
                    value,
                    loc: token.loc(),
                })
            }
            Keyword::Use => {
                self.advance();
                let path = self.parse_use_path();
                self.end_of_stmt();
                Some(Stmt::Use {
                    path,
                    loc: token.loc(),
                })
            }
            Keyword::Mut | Keyword::MutStar => {
                // `mut x = e` parses but is deliberately not implemented;
                // the original's raw write is documented as unsound.
                self.advance();
                if self.eat(TokenKind::Ident).is_some() && self.eat_text(TokenKind::Assign, "=").is_some() {
                    self.parse_expr(0);
                }
                self.end_of_stmt();
                Some(Stmt::NotImplemented {
                    what: "mut",
                    loc: token.loc(),
                })
            }
            Keyword::Trait | Keyword::Mod | Keyword::Macro => {
                self.advance();
                self.skip_stmt_remainder();
                let what = match keyword {
                    Keyword::Trait => "trait",
                    Keyword::Mod => "mod",
                    _ => "macro",
                };
                Some(Stmt::NotImplemented {
                    what,
                    loc: token.loc(),
                })
            }
            _ => {
                self.error_consume(format!("unexpected keyword {keyword}"));
                None
            }
        }
    }

    fn parse_const(&mut self, token: Token) -> Option<Stmt> {
        self.advance();
        let Some(name_token) = self.eat(TokenKind::Ident) else {
            self.error_consume("expected a name after const");
            return None;
        };
        let name = self.intern_token(name_token);
        self.expect_text(TokenKind::Assign, "=");
        let value = self.parse_expr(0);
        self.end_of_stmt();
        Some(Stmt::Const {
            name,
            value,
            loc: token.loc(),
        })
    }

    /// `fn name(params) = expr` / `fn name(params) := block`, with the
    /// generator flag set when the definition was introduced by `loop fn`.
    fn parse_fn_stmt(&mut self, is_generator: bool) -> Option<Stmt> {
        let fn_token = self.advance().expect("fn keyword peeked");
        let Some(name_token) = self.eat(TokenKind::Ident) else {
            self.error_here("expected a function name");
            self.skip_stmt_remainder();
            return None;
        };
        let name = self.intern_token(name_token);
        let params = self.parse_params();
        let body = if self.eat_text(TokenKind::Assign, ":=").is_some() {
            self.parse_indented_block()
        } else if self.eat_text(TokenKind::Assign, "=").is_some() {
            let expr = self.parse_expr(0);
            self.end_of_stmt();
            vec![Stmt::Expr(expr)]
        } else {
            self.error_here("expected '=' or ':=' after the parameter list");
            self.skip_stmt_remainder();
            Vec::new()
        };
        let function = self.push_function(FunctionDef {
            name: Some(name),
            params,
            body,
            is_generator,
        });
        Some(Stmt::FnDef {
            function,
            loc: fn_token.loc(),
        })
    }

    fn push_function(&mut self, def: FunctionDef) -> FunctionId {
        let id = FunctionId::new(self.functions.len());
        self.functions.push(def);
        id
    }

    fn parse_params(&mut self) -> SmallVec<[Param; 4]> {
        let mut params = SmallVec::new();
        if !self.expect_text(TokenKind::BraOpen, "(") {
            return params;
        }
        if self.eat_text(TokenKind::BraClose, ")").is_some() {
            return params;
        }
        loop {
            if let Some(name_token) = self.eat(TokenKind::Ident) {
                let name = self.intern_token(name_token);
                let default = self
                    .eat_text(TokenKind::Assign, "=")
                    .is_some()
                    .then(|| self.parse_expr(0));
                params.push(Param { name, default });
            } else {
                self.error_consume("expected a parameter name");
                if self.at_end() || self.check(TokenKind::End) {
                    return params;
                }
            }
            if self.eat_text(TokenKind::Sep, ",").is_some() {
                continue;
            }
            self.expect_text(TokenKind::BraClose, ")");
            return params;
        }
    }

    fn parse_struct(&mut self, token: Token) -> Option<Stmt> {
        self.advance();
        let Some(name_token) = self.eat(TokenKind::Type) else {
            self.error_consume("expected a capitalized struct name");
            self.skip_stmt_remainder();
            return None;
        };
        let name = self.intern_token(name_token);
        self.expect_text(TokenKind::Assign, ":=");
        let mut fields = Vec::new();
        if self.eat(TokenKind::Indent).is_some() {
            loop {
                if self.eat(TokenKind::End).is_some() {
                    continue;
                }
                if self.eat(TokenKind::Dedent).is_some() || self.at_end() {
                    break;
                }
                if let Some(field) = self.parse_field_decl() {
                    fields.push(field);
                }
            }
        } else {
            self.error_here("expected an indented field block");
        }
        Some(Stmt::StructDef {
            name,
            fields,
            loc: token.loc(),
        })
    }

    /// One `field [: Type] [= default]` line.
    fn parse_field_decl(&mut self) -> Option<FieldDecl> {
        let Some(name_token) = self.eat(TokenKind::Ident) else {
            self.error_consume("expected a field name");
            return None;
        };
        let name = self.intern_token(name_token);
        let mut type_name = None;
        if self.eat_text(TokenKind::Sep, ":").is_some() {
            // `dyn`/`ref` qualifiers are parsed and discarded; their runtime
            // effect is unspecified.
            loop {
                if self.eat(TokenKind::Keyword(Keyword::Dyn)).is_some() {
                    continue;
                }
                if self.check_text(TokenKind::Ident, "ref") {
                    self.advance();
                    continue;
                }
                break;
            }
            if let Some(type_token) = self.eat(TokenKind::Type) {
                type_name = Some(self.intern_token(type_token));
            } else {
                self.error_here("expected a type name after ':'");
            }
        }
        let default = self
            .eat_text(TokenKind::Assign, "=")
            .is_some()
            .then(|| self.parse_expr(0));
        self.end_of_stmt();
        Some(FieldDecl {
            name,
            type_name,
            default,
        })
    }

    fn parse_if(&mut self) -> Stmt {
        let token = self.advance().expect("if keyword peeked");
        let cond = self.parse_expr(0);
        let body = self.parse_body_after_header();
        // An `else` may sit after the block's DEDENT or after an END from
        // the single-line form.
        if self.check(TokenKind::End)
            && self
                .peek_at(1)
                .is_some_and(|t| t.kind == TokenKind::Keyword(Keyword::Else))
        {
            self.advance();
        }
        let else_body = if self.eat(TokenKind::Keyword(Keyword::Else)).is_some() {
            if self.check(TokenKind::Keyword(Keyword::If)) {
                Some(vec![self.parse_if()])
            } else {
                Some(self.parse_body_after_header())
            }
        } else {
            None
        };
        Stmt::If {
            cond,
            body,
            else_body,
            loc: token.loc(),
        }
    }

    fn parse_match(&mut self, token: Token) -> Stmt {
        self.advance();
        let scrutinee = self.parse_expr(0);
        self.end_of_stmt();
        let mut arms = Vec::new();
        if self.eat(TokenKind::Indent).is_some() {
            loop {
                if self.eat(TokenKind::End).is_some() {
                    continue;
                }
                if self.eat(TokenKind::Dedent).is_some() || self.at_end() {
                    break;
                }
                let arm_loc = self.current_loc();
                if self.eat(TokenKind::Keyword(Keyword::If)).is_some() {
                    let pattern = self.parse_expr(0);
                    self.expect_text(TokenKind::Assign, "->");
                    let body = self.parse_arm_body();
                    arms.push(MatchArm {
                        pattern: Some(pattern),
                        body,
                        loc: arm_loc,
                    });
                } else if self.eat(TokenKind::Keyword(Keyword::Else)).is_some() {
                    self.expect_text(TokenKind::Assign, "->");
                    let body = self.parse_arm_body();
                    arms.push(MatchArm {
                        pattern: None,
                        body,
                        loc: arm_loc,
                    });
                } else {
                    self.error_consume("expected 'if pattern ->' or 'else ->' in match");
                }
            }
        } else {
            self.error_here("expected indented match arms");
        }
        Stmt::Match {
            scrutinee,
            arms,
            loc: token.loc(),
        }
    }

    fn parse_arm_body(&mut self) -> Box<Stmt> {
        let stmt = self
            .parse_stmt()
            .unwrap_or(Stmt::Discard(self.current_loc()));
        Box::new(stmt)
    }

    fn parse_let(&mut self, token: Token) -> Stmt {
        self.advance();
        if self.check_text(TokenKind::BraOpen, "(") {
            let bindings = self.parse_paren_bindings();
            let body = self.parse_body_after_header();
            return Stmt::Let {
                bindings,
                body,
                loc: token.loc(),
            };
        }
        // Block-form bindings: one per line, closed by `in`, body follows.
        let mut bindings = Vec::new();
        let mut body = Vec::new();
        self.eat(TokenKind::End);
        if self.eat(TokenKind::Indent).is_some() {
            loop {
                if self.eat(TokenKind::End).is_some() {
                    continue;
                }
                if self.eat(TokenKind::Dedent).is_some() || self.at_end() {
                    break;
                }
                if self.eat(TokenKind::Keyword(Keyword::In)).is_some() {
                    self.eat(TokenKind::End);
                    body = self.parse_stmts_until_dedent();
                    break;
                }
                if let Some(binding) = self.parse_binding() {
                    bindings.push(binding);
                    self.end_of_stmt();
                } else {
                    self.error_consume("expected a binding line");
                }
            }
        } else {
            self.error_here("expected '(' or an indented bindings block after let");
        }
        Stmt::Let {
            bindings,
            body,
            loc: token.loc(),
        }
    }

    /// Head and body shared by `loop` and `for` (keyword already consumed).
    fn parse_loop_parts(&mut self) -> (LoopHead, Vec<Stmt>) {
        let head = if self.check_text(TokenKind::BraOpen, "(") {
            if self.binding_follows() {
                LoopHead::Bindings(self.parse_paren_bindings())
            } else {
                self.advance();
                let cond = self.parse_expr(0);
                self.expect_text(TokenKind::BraClose, ")");
                LoopHead::Condition(cond)
            }
        } else if self.check_text(TokenKind::Assign, ":=") {
            LoopHead::Plain
        } else {
            LoopHead::Condition(self.parse_expr(0))
        };
        let body = self.parse_body_after_header();
        (head, body)
    }

    /// Whether the parenthesized group ahead starts with `name =` or
    /// `name <-`, i.e. is a bindings group rather than a condition.
    fn binding_follows(&self) -> bool {
        self.peek_at(1).is_some_and(|t| t.kind == TokenKind::Ident)
            && self.peek_at(2).is_some_and(|t| {
                t.kind == TokenKind::Assign && matches!(t.text(self.source), "=" | "<-")
            })
    }

    fn parse_paren_bindings(&mut self) -> Vec<Binding> {
        let mut bindings = Vec::new();
        self.expect_text(TokenKind::BraOpen, "(");
        loop {
            if self.eat_text(TokenKind::BraClose, ")").is_some() {
                break;
            }
            if let Some(binding) = self.parse_binding() {
                bindings.push(binding);
            } else {
                self.error_consume("expected a binding");
                if self.at_end() || self.check(TokenKind::End) {
                    break;
                }
                continue;
            }
            if self.eat_text(TokenKind::Sep, ",").is_some() {
                continue;
            }
            self.expect_text(TokenKind::BraClose, ")");
            break;
        }
        bindings
    }

    /// `name = expr` or `name <- expr`.
    fn parse_binding(&mut self) -> Option<Binding> {
        let name_token = self.eat(TokenKind::Ident)?;
        let name = self.intern_token(name_token);
        let kind = if self.eat_text(TokenKind::Assign, "<-").is_some() {
            BindingKind::Stream
        } else if self.eat_text(TokenKind::Assign, "=").is_some() {
            BindingKind::Value
        } else {
            self.error_here("expected '=' or '<-' in binding");
            BindingKind::Value
        };
        let value = self.parse_expr(0);
        Some(Binding { name, kind, value })
    }

    /// `:=` + indented block, or `->` + single expression statement.
    fn parse_body_after_header(&mut self) -> Vec<Stmt> {
        if self.eat_text(TokenKind::Assign, ":=").is_some() {
            self.parse_indented_block()
        } else if self.eat_text(TokenKind::Assign, "->").is_some() {
            let expr = self.parse_expr(0);
            self.end_of_stmt();
            vec![Stmt::Expr(expr)]
        } else {
            self.error_here("expected ':=' or '->'");
            Vec::new()
        }
    }

    fn parse_indented_block(&mut self) -> Vec<Stmt> {
        if self.eat(TokenKind::Indent).is_none() {
            self.error_here("expected an indented block");
            return Vec::new();
        }
        self.parse_stmts_until_dedent()
    }

    fn parse_stmts_until_dedent(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        loop {
            if self.eat(TokenKind::Dedent).is_some() {
                break;
            }
            if self.at_end() {
                self.error_here("unexpected end of input inside a block");
                break;
            }
            if let Some(stmt) = self.parse_stmt() {
                stmts.push(stmt);
            }
        }
        stmts
    }

    fn parse_use_path(&mut self) -> StringId {
        let mut path = String::new();
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::Ident | TokenKind::Type => {
                    path.push_str(self.text(token));
                    self.advance();
                }
                TokenKind::Deref => {
                    path.push('.');
                    self.advance();
                }
                _ => break,
            }
        }
        if path.is_empty() {
            self.error_here("expected a module path after use");
        }
        self.interns.intern(&path)
    }

    /// Skips to the end of the current line, and past an attached indented
    /// block when the line opened one with `:=`.
    fn skip_stmt_remainder(&mut self) {
        loop {
            match self.peek().map(|t| t.kind) {
                None => return,
                Some(TokenKind::End) => {
                    self.advance();
                    return;
                }
                Some(TokenKind::Indent) => {
                    self.advance();
                    let mut depth = 1u32;
                    while depth > 0 {
                        match self.advance().map(|t| t.kind) {
                            None => return,
                            Some(TokenKind::Indent) => depth += 1,
                            Some(TokenKind::Dedent) => depth -= 1,
                            Some(_) => {}
                        }
                    }
                    return;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
    }

    // --- expressions ----------------------------------------------------

    /// Pratt precedence climbing. `min_bp` is the smallest binding power
    /// the loop will still consume; equal powers break, giving left
    /// associativity.
    fn parse_expr(&mut self, min_bp: u8) -> ExprLoc {
        let mut lhs = self.parse_primary();
        loop {
            let Some(token) = self.peek() else { break };
            match token.kind {
                TokenKind::Deref => {
                    if BP_MEMBER <= min_bp {
                        break;
                    }
                    self.advance();
                    let Some(name_token) = self.eat(TokenKind::Ident) else {
                        self.error_here("expected a member name after '.'");
                        break;
                    };
                    let name = self.intern_token(name_token);
                    if self.check_text(TokenKind::BraOpen, "(") {
                        let args = self.parse_call_args();
                        lhs = ExprLoc::new(
                            Expr::MethodCall {
                                object: Box::new(lhs),
                                method: name,
                                args,
                            },
                            token.loc(),
                        );
                    } else {
                        lhs = ExprLoc::new(
                            Expr::Member {
                                object: Box::new(lhs),
                                field: name,
                            },
                            token.loc(),
                        );
                    }
                }
                TokenKind::BraOpen if self.text(token) == "(" => {
                    if BP_CALL <= min_bp {
                        break;
                    }
                    let args = self.parse_call_args();
                    lhs = ExprLoc::new(
                        Expr::Call {
                            callee: Box::new(lhs),
                            args,
                        },
                        token.loc(),
                    );
                }
                TokenKind::Op => {
                    let Some((op, bp)) = infix_op(self.text(token)) else {
                        break;
                    };
                    if bp <= min_bp {
                        break;
                    }
                    self.advance();
                    let rhs = self.parse_expr(bp);
                    lhs = ExprLoc::new(
                        Expr::Binary {
                            op,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        },
                        token.loc(),
                    );
                }
                // A lone `=` in expression position is equality; binding
                // contexts consume their `=` before Pratt runs.
                TokenKind::Assign if self.text(token) == "=" => {
                    let bp = 4;
                    if bp <= min_bp {
                        break;
                    }
                    self.advance();
                    let rhs = self.parse_expr(bp);
                    lhs = ExprLoc::new(
                        Expr::Binary {
                            op: BinaryOp::Eq,
                            lhs: Box::new(lhs),
                            rhs: Box::new(rhs),
                        },
                        token.loc(),
                    );
                }
                _ => break,
            }
        }
        lhs
    }

    fn parse_primary(&mut self) -> ExprLoc {
        let Some(token) = self.peek() else {
            self.error_here("expected an expression");
            return ExprLoc::new(Expr::Error, self.current_loc());
        };
        let loc = token.loc();
        match token.kind {
            TokenKind::Int => {
                self.advance();
                match self.text(token).parse::<i64>() {
                    Ok(value) => ExprLoc::new(Expr::Int(value), loc),
                    Err(_) => {
                        self.diagnostics.push(Diagnostic::parse(
                            "integer literal out of range",
                            loc,
                            Some(self.text(token).to_owned()),
                        ));
                        ExprLoc::new(Expr::Error, loc)
                    }
                }
            }
            TokenKind::Double => {
                self.advance();
                let value = self.text(token).parse::<f64>().unwrap_or(0.0);
                ExprLoc::new(Expr::Double(value), loc)
            }
            TokenKind::Float => {
                self.advance();
                let value = self.text(token).parse::<f32>().unwrap_or(0.0);
                ExprLoc::new(Expr::Float(value), loc)
            }
            TokenKind::Str => {
                self.advance();
                let id = self.intern_token(token);
                ExprLoc::new(Expr::Str(id), loc)
            }
            TokenKind::Tag => {
                self.advance();
                match Symbol::pack(self.text(token)) {
                    Some(symbol) => ExprLoc::new(Expr::TagLit(symbol), loc),
                    None => {
                        self.diagnostics.push(Diagnostic::parse(
                            "tag symbols are up to 11 characters of A-Z and 0-9",
                            loc,
                            Some(format!("#{}", self.text(token))),
                        ));
                        ExprLoc::new(Expr::Error, loc)
                    }
                }
            }
            TokenKind::Ident => {
                self.advance();
                let id = self.intern_token(token);
                ExprLoc::new(Expr::Ident(id), loc)
            }
            TokenKind::Type => {
                self.advance();
                let id = self.intern_token(token);
                if self.check_text(TokenKind::BraOpen, "{") {
                    let fields = self.parse_object_fields();
                    ExprLoc::new(
                        Expr::ObjectLit {
                            type_name: id,
                            fields,
                        },
                        loc,
                    )
                } else {
                    ExprLoc::new(Expr::TypeRef(id), loc)
                }
            }
            TokenKind::Keyword(Keyword::Done) => {
                self.advance();
                ExprLoc::new(Expr::StateLit(StateKind::Done), loc)
            }
            TokenKind::Keyword(Keyword::Fn) => self.parse_lambda(token),
            TokenKind::BraOpen if self.text(token) == "(" => {
                self.advance();
                let inner = self.parse_expr(0);
                self.expect_text(TokenKind::BraClose, ")");
                inner
            }
            TokenKind::Op if self.text(token) == "-" => {
                self.advance();
                let operand = self.parse_expr(BP_UNARY);
                ExprLoc::new(
                    Expr::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                    },
                    loc,
                )
            }
            TokenKind::Op if self.text(token) == "!" => {
                self.advance();
                let operand = self.parse_expr(BP_UNARY);
                ExprLoc::new(
                    Expr::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                    },
                    loc,
                )
            }
            _ => {
                self.error_consume("unexpected token in expression");
                ExprLoc::new(Expr::Error, loc)
            }
        }
    }

    /// `fn(params) -> expr` anonymous function.
    fn parse_lambda(&mut self, fn_token: Token) -> ExprLoc {
        self.advance();
        let params = self.parse_params();
        let body = if self.eat_text(TokenKind::Assign, "->").is_some() {
            vec![Stmt::Expr(self.parse_expr(0))]
        } else {
            self.error_here("expected '->' after anonymous function parameters");
            Vec::new()
        };
        let function = self.push_function(FunctionDef {
            name: None,
            params,
            body,
            is_generator: false,
        });
        ExprLoc::new(Expr::Lambda(function), fn_token.loc())
    }

    fn parse_call_args(&mut self) -> Vec<ExprLoc> {
        let mut args = Vec::new();
        self.expect_text(TokenKind::BraOpen, "(");
        if self.eat_text(TokenKind::BraClose, ")").is_some() {
            return args;
        }
        loop {
            args.push(self.parse_expr(0));
            if self.eat_text(TokenKind::Sep, ",").is_some() {
                continue;
            }
            self.expect_text(TokenKind::BraClose, ")");
            break;
        }
        args
    }

    fn parse_object_fields(&mut self) -> Vec<(StringId, ExprLoc)> {
        let mut fields = Vec::new();
        self.expect_text(TokenKind::BraOpen, "{");
        if self.eat_text(TokenKind::BraClose, "}").is_some() {
            return fields;
        }
        loop {
            let Some(name_token) = self.eat(TokenKind::Ident) else {
                self.error_consume("expected a field name in object literal");
                if self.at_end() || self.check(TokenKind::End) {
                    break;
                }
                continue;
            };
            let name = self.intern_token(name_token);
            self.expect_text(TokenKind::Assign, "=");
            let value = self.parse_expr(0);
            fields.push((name, value));
            if self.eat_text(TokenKind::Sep, ",").is_some() {
                continue;
            }
            self.expect_text(TokenKind::BraClose, "}");
            break;
        }
        fields
    }
}

/// Infix operator table: symbol to (operator, binding power). High binds
/// tighter: `* / %` 7, `+ -` 6, comparisons 5, equality 4, `&` 2, `|` 1.
fn infix_op(text: &str) -> Option<(BinaryOp, u8)> {
    Some(match text {
        "*" => (BinaryOp::Mul, 7),
        "/" => (BinaryOp::Div, 7),
        "%" => (BinaryOp::Mod, 7),
        "+" => (BinaryOp::Add, 6),
        "-" => (BinaryOp::Sub, 6),
        "<" => (BinaryOp::Lt, 5),
        ">" => (BinaryOp::Gt, 5),
        "<=" => (BinaryOp::Le, 5),
        ">=" => (BinaryOp::Ge, 5),
        "==" => (BinaryOp::Eq, 4),
        "!=" => (BinaryOp::Ne, 4),
        "&" => (BinaryOp::And, 2),
        "|" => (BinaryOp::Or, 1),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_source(source: &str) -> (Module, Vec<Diagnostic>) {
        let (tokens, lex_diagnostics) = lex(source, "    ");
        assert!(lex_diagnostics.is_empty(), "lex diagnostics: {lex_diagnostics:?}");
        let mut interns = Interns::new();
        parse(tokens, source, &mut interns)
    }

    fn parse_clean(source: &str) -> Module {
        let (module, diagnostics) = parse_source(source);
        assert!(diagnostics.is_empty(), "diagnostics: {diagnostics:?}");
        module
    }

    #[test]
    fn const_and_fn_block() {
        let module = parse_clean("const msg = \"hi\"\nfn main() :=\n    log(msg)\n");
        assert_eq!(module.body.len(), 2);
        assert!(matches!(module.body[0], Stmt::Const { .. }));
        assert!(matches!(module.body[1], Stmt::FnDef { .. }));
        assert_eq!(module.functions.len(), 1);
        assert_eq!(module.functions[0].body.len(), 1);
    }

    #[test]
    fn single_line_fn_is_an_expression_body() {
        let module = parse_clean("fn add(a, b) = a + b\n");
        let def = &module.functions[0];
        assert_eq!(def.params.len(), 2);
        assert!(!def.is_generator);
        assert!(matches!(
            module.functions[0].body[0],
            Stmt::Expr(ExprLoc {
                expr: Expr::Binary { op: BinaryOp::Add, .. },
                ..
            })
        ));
    }

    #[test]
    fn loop_fn_marks_a_generator() {
        let module = parse_clean("loop fn nat(start) :=\n    yield start\n");
        assert!(module.functions[0].is_generator);
    }

    #[test]
    fn precedence_mul_binds_tighter_than_add() {
        let module = parse_clean("a + b * c\n");
        let Stmt::Expr(expr) = &module.body[0] else {
            panic!("expected expression statement");
        };
        let Expr::Binary { op: BinaryOp::Add, rhs, .. } = &expr.expr else {
            panic!("expected + at the top, got {expr:?}");
        };
        assert!(matches!(rhs.expr, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn member_binds_tighter_than_mul() {
        let module = parse_clean("a.x * b\n");
        let Stmt::Expr(expr) = &module.body[0] else {
            panic!("expected expression statement");
        };
        let Expr::Binary { op: BinaryOp::Mul, lhs, .. } = &expr.expr else {
            panic!("expected * at the top");
        };
        assert!(matches!(lhs.expr, Expr::Member { .. }));
    }

    #[test]
    fn subtraction_chain_is_left_associative() {
        let module = parse_clean("a - b - c\n");
        let Stmt::Expr(expr) = &module.body[0] else {
            panic!("expected expression statement");
        };
        let Expr::Binary { lhs, .. } = &expr.expr else {
            panic!("expected binary");
        };
        assert!(matches!(lhs.expr, Expr::Binary { op: BinaryOp::Sub, .. }));
    }

    #[test]
    fn struct_with_typed_and_defaulted_fields() {
        let module = parse_clean("struct Point :=\n    x : Int = 1\n    y\n");
        let Stmt::StructDef { fields, .. } = &module.body[0] else {
            panic!("expected struct");
        };
        assert_eq!(fields.len(), 2);
        assert!(fields[0].type_name.is_some());
        assert!(fields[0].default.is_some());
        assert!(fields[1].type_name.is_none());
        assert!(fields[1].default.is_none());
    }

    #[test]
    fn match_arms_with_else() {
        let module = parse_clean("match 2\n    if 1 -> log(\"one\")\n    if 2 -> log(\"two\")\n    else -> log(\"other\")\n");
        let Stmt::Match { arms, .. } = &module.body[0] else {
            panic!("expected match");
        };
        assert_eq!(arms.len(), 3);
        assert!(arms[0].pattern.is_some());
        assert!(arms[2].pattern.is_none());
    }

    #[test]
    fn object_literal_fields() {
        let module = parse_clean("const p = Point {x = 10, y = 20}\n");
        let Stmt::Const { value, .. } = &module.body[0] else {
            panic!("expected const");
        };
        let Expr::ObjectLit { fields, .. } = &value.expr else {
            panic!("expected object literal, got {value:?}");
        };
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn loop_heads_disambiguate() {
        let module = parse_clean("loop (x < 3) :=\n    log(x)\nloop (i <- range(1, 3)) :=\n    log(i)\nloop :=\n    log(1)\n");
        let heads: Vec<&LoopHead> = module
            .body
            .iter()
            .map(|stmt| match stmt {
                Stmt::Loop { head, .. } => head,
                other => panic!("expected loop, got {other:?}"),
            })
            .collect();
        assert!(matches!(heads[0], LoopHead::Condition(_)));
        assert!(matches!(heads[1], LoopHead::Bindings(b) if b.len() == 1));
        assert!(matches!(heads[2], LoopHead::Plain));
    }

    #[test]
    fn let_with_paren_bindings_and_arrow_body() {
        let module = parse_clean("let (x = 1, y = 2) -> x + y\n");
        let Stmt::Let { bindings, body, .. } = &module.body[0] else {
            panic!("expected let");
        };
        assert_eq!(bindings.len(), 2);
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn anonymous_fn_expression() {
        let module = parse_clean("const f = fn(x) -> x + 1\n");
        let Stmt::Const { value, .. } = &module.body[0] else {
            panic!("expected const");
        };
        assert!(matches!(value.expr, Expr::Lambda(_)));
        assert!(module.functions[0].name.is_none());
    }

    #[test]
    fn errors_accumulate_and_parsing_continues() {
        let (module, diagnostics) = parse_source("const = 3\nfn main() :=\n    log(1)\n");
        assert!(!diagnostics.is_empty());
        // The fn after the bad const still parsed.
        assert!(module.body.iter().any(|stmt| matches!(stmt, Stmt::FnDef { .. })));
    }

    #[test]
    fn parse_error_records_token_and_location() {
        let (_, diagnostics) = parse_source("fn main() :=\n    1 + +\n");
        assert!(!diagnostics.is_empty());
        let diagnostic = &diagnostics[0];
        assert_eq!(diagnostic.location.line, 2);
        assert!(diagnostic.token.is_some());
    }

    #[test]
    fn mut_parses_to_not_implemented() {
        let module = parse_clean("mut x = 3\n");
        assert!(matches!(module.body[0], Stmt::NotImplemented { what: "mut", .. }));
    }

    #[test]
    fn use_collects_a_dotted_path() {
        let module = parse_clean("use std.math\n");
        assert!(matches!(module.body[0], Stmt::Use { .. }));
    }

    #[test]
    fn equality_spelled_with_single_equals() {
        let module = parse_clean("fn f(x) = x = 1\n");
        assert!(matches!(
            module.functions[0].body[0],
            Stmt::Expr(ExprLoc {
                expr: Expr::Binary { op: BinaryOp::Eq, .. },
                ..
            })
        ));
    }

    #[test]
    fn if_else_chain() {
        let module = parse_clean("if a :=\n    log(1)\nelse if b :=\n    log(2)\nelse :=\n    log(3)\n");
        let Stmt::If { else_body: Some(else_body), .. } = &module.body[0] else {
            panic!("expected if with else");
        };
        assert!(matches!(else_body[0], Stmt::If { .. }));
    }
}
