use crate::language::{
    ast::*,
    errors::{SyntaxError, SyntaxErrors},
    lexer::lex,
    span::Span,
    token::{Token, TokenKind},
};
use num_bigint::BigInt;
use num_rational::BigRational;
use std::path::PathBuf;
use std::str::FromStr;

pub fn parse_module(name: &str, path: PathBuf, source: &str) -> Result<Module, SyntaxErrors> {
    let tokens = match lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            let errs = errors
                .into_iter()
                .map(|err| SyntaxError::new(err.message, err.span))
                .collect();
            return Err(SyntaxErrors::new(errs));
        }
    };
    Parser::new(name, path, tokens).parse()
}

struct Parser {
    module_name: String,
    path: PathBuf,
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
    in_try: bool,
}

impl Parser {
    fn new(name: &str, path: PathBuf, tokens: Vec<Token>) -> Self {
        Self {
            module_name: name.to_string(),
            path,
            tokens,
            pos: 0,
            errors: Vec::new(),
            in_try: false,
        }
    }

    fn parse(mut self) -> Result<Module, SyntaxErrors> {
        let mut imports = Vec::new();
        let mut globals = Vec::new();
        let mut functions = Vec::new();

        while !self.is_eof() {
            self.skip_newlines();
            if self.is_eof() {
                break;
            }
            let result = if self.check(&TokenKind::Import) {
                self.parse_import().map(|import| imports.push(import))
            } else if self.check(&TokenKind::Global) {
                self.parse_global().map(|global| globals.push(global))
            } else if self.check(&TokenKind::Func) {
                self.parse_function().map(|func| functions.push(func))
            } else {
                Err(self.error_here("Expected 'func', 'global' or 'import'"))
            };
            if let Err(err) = result {
                self.report(err);
                self.synchronize_top_level();
            }
        }

        if self.errors.is_empty() {
            Ok(Module {
                name: self.module_name,
                path: self.path,
                imports,
                globals,
                functions,
            })
        } else {
            Err(SyntaxErrors::new(self.errors))
        }
    }

    fn parse_import(&mut self) -> Result<Import, SyntaxError> {
        let start = self.expect(TokenKind::Import)?.span.start;
        let path = self.expect_string("Expected import path string")?;
        let alias = if self.matches(&TokenKind::As) {
            Some(self.expect_name("Expected alias after 'as'")?.0)
        } else {
            None
        };
        let end = self.previous_span_end(start);
        self.expect_line_end()?;
        Ok(Import {
            path,
            alias,
            span: Span::new(start, end),
        })
    }

    fn parse_global(&mut self) -> Result<GlobalDef, SyntaxError> {
        let start = self.expect(TokenKind::Global)?.span.start;
        let (name, name_span) = self.expect_name("Expected global name")?;
        if is_mono_name(&name) {
            return Err(SyntaxError::new("Globals may not be monodirectional", name_span));
        }
        self.expect(TokenKind::Eq)?;
        let value = self.parse_expr()?;
        let end = self.previous_span_end(start);
        self.expect_line_end()?;
        Ok(GlobalDef {
            name,
            value,
            span: Span::new(start, end),
        })
    }

    fn parse_function(&mut self) -> Result<FunctionDef, SyntaxError> {
        let start = self.expect(TokenKind::Func)?.span.start;
        let (name, _) = self.expect_name("Expected function name")?;
        let borrow_params = self.parse_param_list()?;
        let inout_params = self.parse_param_list()?;
        self.expect_line_end()?;

        let body = self.parse_block(&[TokenKind::Return])?;
        self.expect(TokenKind::Return)?;
        if self.check(&TokenKind::LParen) {
            let listed = self.parse_param_list()?;
            let declared: Vec<&str> = inout_params.iter().map(|p| p.name.as_str()).collect();
            let returned: Vec<&str> = listed.iter().map(|p| p.name.as_str()).collect();
            if declared != returned {
                return Err(SyntaxError::new(
                    format!("Return list of '{}' does not match its in-out parameters", name),
                    listed.first().map(|p| p.span).unwrap_or_else(|| self.here()),
                )
                .with_help("List the same names, in the same order, as the second parameter list"));
            }
        }
        let end = self.previous_span_end(start);
        self.expect_line_end()?;

        Ok(FunctionDef {
            name,
            borrow_params,
            inout_params,
            body,
            span: Span::new(start, end),
        })
    }

    fn parse_param_list(&mut self) -> Result<Vec<Param>, SyntaxError> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let (name, span) = self.expect_name("Expected parameter name")?;
                params.push(Param { name, span });
                if self.matches(&TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_block(&mut self, terminators: &[TokenKind]) -> Result<Vec<Statement>, SyntaxError> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            if self.is_eof() {
                return Err(self.error_here("Unexpected end of file inside block"));
            }
            if terminators.iter().any(|t| self.check(t)) {
                return Ok(statements);
            }
            match self.parse_statement() {
                Ok(statement) => {
                    statements.push(statement);
                    self.expect_line_end()?;
                }
                Err(err) => {
                    self.report(err);
                    self.synchronize_line();
                }
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, SyntaxError> {
        match self.current_kind() {
            TokenKind::Let => self.parse_let(false),
            TokenKind::Unlet => self.parse_let(true),
            TokenKind::Push => self.parse_push_pop(false),
            TokenKind::Pop => self.parse_push_pop(true),
            TokenKind::Swap => self.parse_swap(),
            TokenKind::Promote => self.parse_promote(),
            TokenKind::If => self.parse_if(),
            TokenKind::Loop => self.parse_loop(),
            TokenKind::For => self.parse_for(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Catch => self.parse_catch(),
            TokenKind::Do => self.parse_do_undo(),
            TokenKind::Barrier => self.parse_barrier(),
            TokenKind::MutexKw => self.parse_mutex(),
            TokenKind::Print => self.parse_print(false),
            TokenKind::Println => self.parse_print(true),
            TokenKind::Call | TokenKind::Uncall => self.parse_call(None),
            TokenKind::LParen => {
                let start = self.here().start;
                let listed = self.parse_param_list()?;
                if self.matches(&TokenKind::LtEq) {
                    self.parse_call(Some((listed, start, false)))
                } else if self.matches(&TokenKind::FatArrow) {
                    self.parse_call(Some((listed, start, true)))
                } else {
                    Err(self.error_here("Expected '<=' or '=>' after in-out list"))
                }
            }
            TokenKind::Identifier(_) => self.parse_modop(),
            _ => Err(self.error_here("Expected a statement")),
        }
    }

    fn parse_let(&mut self, is_unlet: bool) -> Result<Statement, SyntaxError> {
        let keyword = if is_unlet { TokenKind::Unlet } else { TokenKind::Let };
        let start = self.expect(keyword)?.span.start;
        let (name, _) = self.expect_name("Expected variable name")?;
        let rhs = if self.matches(&TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let is_mono = is_mono_name(&name);
        if !is_mono {
            if let Some(rhs) = &rhs {
                self.check_no_mono(rhs, "a reversible let/unlet")?;
            }
        }
        let stmt = LetStmt {
            name,
            rhs,
            is_mono,
            span: self.span_from(start),
        };
        Ok(if is_unlet {
            Statement::Unlet(stmt)
        } else {
            Statement::Let(stmt)
        })
    }

    fn parse_push_pop(&mut self, is_pop: bool) -> Result<Statement, SyntaxError> {
        let keyword = if is_pop { TokenKind::Pop } else { TokenKind::Push };
        let start = self.expect(keyword)?.span.start;
        let (name, name_span) = self.expect_name("Expected value variable")?;
        let arrow = if is_pop { TokenKind::LtEq } else { TokenKind::FatArrow };
        self.expect(arrow)?;
        let stack = self.parse_lookup()?;
        if is_mono_name(&name) != stack.is_mono() {
            return Err(SyntaxError::new(
                "Both sides of a push/pop must agree in mono-ness",
                name_span,
            ));
        }
        let is_mono = stack.is_mono();
        if !is_mono {
            for idx in &stack.index {
                self.check_no_mono(idx, "a reversible push/pop")?;
            }
        }
        let stmt = StackStmt {
            name,
            stack,
            is_mono,
            span: self.span_from(start),
        };
        Ok(if is_pop {
            Statement::Pop(stmt)
        } else {
            Statement::Push(stmt)
        })
    }

    fn parse_swap(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect(TokenKind::Swap)?.span.start;
        let left = self.parse_lookup()?;
        self.expect(TokenKind::SwapArrow)?;
        let right = self.parse_lookup()?;
        if left.is_mono() != right.is_mono() {
            return Err(SyntaxError::new(
                "Both sides of a swap must agree in mono-ness",
                left.span,
            ));
        }
        let is_mono = left.is_mono();
        if !is_mono {
            for idx in left.index.iter().chain(right.index.iter()) {
                self.check_no_mono(idx, "a reversible swap")?;
            }
        }
        Ok(Statement::Swap(SwapStmt {
            left,
            right,
            is_mono,
            span: self.span_from(start),
        }))
    }

    fn parse_promote(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect(TokenKind::Promote)?.span.start;
        let (src, src_span) = self.expect_name("Expected source variable")?;
        self.expect(TokenKind::FatArrow)?;
        let (dst, dst_span) = self.expect_name("Expected destination variable")?;
        if !is_mono_name(&src) {
            return Err(SyntaxError::new(
                "Promote source must be a monodirectional name",
                src_span,
            ));
        }
        if is_mono_name(&dst) {
            return Err(SyntaxError::new(
                "Promote destination must not be monodirectional",
                dst_span,
            ));
        }
        Ok(Statement::Promote(PromoteStmt {
            src,
            dst,
            span: self.span_from(start),
        }))
    }

    fn parse_modop(&mut self) -> Result<Statement, SyntaxError> {
        let lookup = self.parse_lookup()?;
        let start = lookup.span.start;
        let op = match self.current_kind() {
            TokenKind::PlusEq => ModOp::Add,
            TokenKind::MinusEq => ModOp::Sub,
            TokenKind::StarEq => ModOp::Mul,
            TokenKind::SlashEq => ModOp::Div,
            TokenKind::SlashSlashEq => ModOp::FloorDiv,
            TokenKind::StarStarEq => ModOp::Pow,
            TokenKind::PercentEq => ModOp::Rem,
            TokenKind::CaretEq => ModOp::Xor,
            TokenKind::PipeEq => ModOp::Or,
            TokenKind::AmpersandEq => ModOp::And,
            _ => return Err(self.error_here("Expected a modification operator")),
        };
        self.advance();
        let rhs = self.parse_expr()?;
        let is_mono = lookup.is_mono();
        if !is_mono {
            self.check_no_mono(&rhs, "a reversible modification")?;
            for idx in &lookup.index {
                self.check_no_mono(idx, "a reversible modification")?;
            }
        }
        Ok(Statement::Modop(ModopStmt {
            lookup,
            op,
            rhs,
            is_mono,
            span: self.span_from(start),
        }))
    }

    fn parse_if(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect(TokenKind::If)?.span.start;
        self.expect(TokenKind::LParen)?;
        let guard = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        self.expect_line_end()?;
        let then_branch = self.parse_block(&[TokenKind::Else, TokenKind::Fi])?;
        let else_branch = if self.matches(&TokenKind::Else) {
            self.expect_line_end()?;
            self.parse_block(&[TokenKind::Fi])?
        } else {
            Vec::new()
        };
        self.expect(TokenKind::Fi)?;
        let post = self.parse_optional_predicate()?;
        let is_mono = guard.has_mono() || post.as_ref().map(Expr::has_mono).unwrap_or(false);
        let span = self.span_from(start);
        if is_mono {
            self.check_all_mono(then_branch.iter().chain(else_branch.iter()), span)?;
        }
        Ok(Statement::If(IfStmt {
            guard,
            then_branch,
            else_branch,
            post,
            is_mono,
            span,
        }))
    }

    fn parse_loop(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect(TokenKind::Loop)?.span.start;
        self.expect(TokenKind::LParen)?;
        let entry = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        self.expect_line_end()?;
        let body = self.parse_block(&[TokenKind::Pool])?;
        self.expect(TokenKind::Pool)?;
        let exit = self.parse_optional_predicate()?;
        let is_mono = entry.has_mono() || exit.as_ref().map(Expr::has_mono).unwrap_or(false);
        let span = self.span_from(start);
        if is_mono {
            self.check_all_mono(body.iter(), span)?;
        }
        Ok(Statement::Loop(LoopStmt {
            entry,
            body,
            exit,
            is_mono,
            span,
        }))
    }

    fn parse_for(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect(TokenKind::For)?.span.start;
        self.expect(TokenKind::LParen)?;
        let (name, _) = self.expect_name("Expected loop variable")?;
        self.expect(TokenKind::In)?;
        let iterator = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        self.expect_line_end()?;
        let body = self.parse_block(&[TokenKind::Rof])?;
        self.expect(TokenKind::Rof)?;
        let is_mono = is_mono_name(&name) || iterator.has_mono();
        let span = self.span_from(start);
        if is_mono {
            self.check_all_mono(body.iter(), span)?;
        }
        Ok(Statement::For(ForStmt {
            name,
            iterator,
            body,
            is_mono,
            span,
        }))
    }

    fn parse_try(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect(TokenKind::Try)?.span.start;
        self.expect(TokenKind::LParen)?;
        let (name, name_span) = self.expect_name("Expected search variable")?;
        if is_mono_name(&name) {
            return Err(SyntaxError::new(
                "The try variable survives the block and may not be monodirectional",
                name_span,
            ));
        }
        self.expect(TokenKind::In)?;
        let iterator = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        self.expect_line_end()?;
        let was_in_try = std::mem::replace(&mut self.in_try, true);
        let body = self.parse_block(&[TokenKind::Yrt]);
        self.in_try = was_in_try;
        let body = body?;
        self.expect(TokenKind::Yrt)?;
        Ok(Statement::Try(TryStmt {
            name,
            iterator,
            body,
            span: self.span_from(start),
        }))
    }

    fn parse_catch(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect(TokenKind::Catch)?.span.start;
        if !self.in_try {
            return Err(SyntaxError::new(
                "'catch' is only allowed in the top level of a try block",
                Span::new(start, start + 5),
            ));
        }
        self.expect(TokenKind::LParen)?;
        let predicate = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        Ok(Statement::Catch(CatchStmt {
            predicate,
            span: self.span_from(start),
        }))
    }

    fn parse_do_undo(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect(TokenKind::Do)?.span.start;
        self.expect_line_end()?;
        // The body of a try is no context for do/undo's nested statements
        let was_in_try = std::mem::replace(&mut self.in_try, false);
        let result = (|| {
            let do_body = self.parse_block(&[TokenKind::Yield, TokenKind::Undo])?;
            let yield_body = if self.matches(&TokenKind::Yield) {
                self.expect_line_end()?;
                self.parse_block(&[TokenKind::Undo])?
            } else {
                Vec::new()
            };
            self.expect(TokenKind::Undo)?;
            Ok((do_body, yield_body))
        })();
        self.in_try = was_in_try;
        let (do_body, yield_body) = result?;
        Ok(Statement::DoUndo(DoUndoStmt {
            do_body,
            yield_body,
            span: self.span_from(start),
        }))
    }

    fn parse_barrier(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect(TokenKind::Barrier)?.span.start;
        let name = self.expect_string("Expected barrier name string")?;
        Ok(Statement::Barrier(BarrierStmt {
            name,
            span: self.span_from(start),
        }))
    }

    fn parse_mutex(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.expect(TokenKind::MutexKw)?.span.start;
        let name = self.expect_string("Expected mutex name string")?;
        self.expect_line_end()?;
        let body = self.parse_block(&[TokenKind::Xetum])?;
        self.expect(TokenKind::Xetum)?;
        Ok(Statement::Mutex(MutexStmt {
            name,
            body,
            span: self.span_from(start),
        }))
    }

    fn parse_print(&mut self, newline: bool) -> Result<Statement, SyntaxError> {
        let keyword = if newline { TokenKind::Println } else { TokenKind::Print };
        let start = self.expect(keyword)?.span.start;
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                if let TokenKind::String(text) = self.current_kind() {
                    let text = text.clone();
                    self.advance();
                    args.push(PrintArg::Text(text));
                } else {
                    args.push(PrintArg::Value(self.parse_expr()?));
                }
                if self.matches(&TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(Statement::Print(PrintStmt {
            newline,
            args,
            span: self.span_from(start),
        }))
    }

    /// Parses every call form:
    ///   call f(borrows)                  (outs) <= call f{n}(borrows)
    ///   call f{n}(borrows) => (outs)     (ins) => call f(borrows) => (outs)
    fn parse_call(
        &mut self,
        leading: Option<(Vec<Param>, usize, bool)>,
    ) -> Result<Statement, SyntaxError> {
        let is_uncall = match self.current_kind() {
            TokenKind::Call => false,
            TokenKind::Uncall => true,
            _ => return Err(self.error_here("Expected 'call' or 'uncall'")),
        };
        let start = leading
            .as_ref()
            .map(|(_, start, _)| *start)
            .unwrap_or_else(|| self.here().start);
        self.advance();
        let (func, _) = self.expect_name("Expected function name")?;
        let num_threads = if self.matches(&TokenKind::LBrace) {
            if self.matches(&TokenKind::RBrace) {
                Some(None)
            } else {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RBrace)?;
                Some(Some(expr))
            }
        } else {
            None
        };
        let borrow_args = if self.check(&TokenKind::LParen) {
            self.parse_param_list()?
        } else {
            Vec::new()
        };
        let trailing = if self.matches(&TokenKind::FatArrow) {
            Some(self.parse_param_list()?)
        } else {
            None
        };

        let inout_args = match (leading, trailing) {
            (Some((listed, _, _)), None) | (None, Some(listed)) => listed,
            (None, None) => Vec::new(),
            (Some((lead, _, true)), Some(trail)) => {
                let lhs: Vec<&str> = lead.iter().map(|p| p.name.as_str()).collect();
                let rhs: Vec<&str> = trail.iter().map(|p| p.name.as_str()).collect();
                if lhs != rhs {
                    return Err(SyntaxError::new(
                        "In-out lists on both sides of a call must match",
                        trail.first().map(|p| p.span).unwrap_or_else(|| self.here()),
                    ));
                }
                lead
            }
            (Some((_, _, false)), Some(trail)) => {
                return Err(SyntaxError::new(
                    "A '<=' call form may not also have a trailing out list",
                    trail.first().map(|p| p.span).unwrap_or_else(|| self.here()),
                ));
            }
        };

        Ok(Statement::Call(CallStmt {
            is_uncall,
            func,
            num_threads,
            borrow_args,
            inout_args,
            span: self.span_from(start),
        }))
    }

    fn parse_optional_predicate(&mut self) -> Result<Option<Expr>, SyntaxError> {
        if self.matches(&TokenKind::LParen) {
            if self.matches(&TokenKind::RParen) {
                return Ok(None);
            }
            let expr = self.parse_expr()?;
            self.expect(TokenKind::RParen)?;
            Ok(Some(expr))
        } else {
            Ok(None)
        }
    }

    // ---------------- Expressions ----------------

    fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_xor()?;
        while self.matches(&TokenKind::Pipe) {
            let right = self.parse_xor()?;
            left = binary(BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_xor(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and()?;
        while self.matches(&TokenKind::Caret) {
            let right = self.parse_and()?;
            left = binary(BinOp::Xor, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_equality()?;
        while self.matches(&TokenKind::Ampersand) {
            let right = self.parse_equality()?;
            left = binary(BinOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::BangEq => BinOp::NotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::LtEq => BinOp::LtEq,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::GtEq => BinOp::GtEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_power()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::SlashSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Rem,
                _ => break,
            };
            self.advance();
            let right = self.parse_power()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.parse_unary()?;
        if self.matches(&TokenKind::StarStar) {
            let right = self.parse_power()?;
            return Ok(binary(BinOp::Pow, left, right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.here().start;
        if self.matches(&TokenKind::Minus) {
            let expr = self.parse_unary()?;
            let span = Span::new(start, expr.span().end);
            return Ok(Expr::Unary {
                op: UnOp::Neg,
                expr: Box::new(expr),
                span,
            });
        }
        if self.matches(&TokenKind::Bang) {
            let expr = self.parse_unary()?;
            let span = Span::new(start, expr.span().end);
            return Ok(Expr::Unary {
                op: UnOp::Not,
                expr: Box::new(expr),
                span,
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.here().start;
        match self.current_kind().clone() {
            TokenKind::Number(text) => {
                let span = self.here();
                self.advance();
                let value = parse_number(&text).ok_or_else(|| {
                    SyntaxError::new(format!("Invalid number literal '{}'", text), span)
                })?;
                Ok(Expr::Number(NumberLit { value, span }))
            }
            TokenKind::Identifier(_) => Ok(Expr::Lookup(self.parse_lookup()?)),
            TokenKind::Tid => {
                self.advance();
                self.expect(TokenKind::LParen)?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::ThreadId(self.span_from(start)))
            }
            TokenKind::Hash => {
                self.advance();
                if self.matches(&TokenKind::Tid) {
                    self.expect(TokenKind::LParen)?;
                    self.expect(TokenKind::RParen)?;
                    return Ok(Expr::NumThreads(self.span_from(start)));
                }
                let lookup = self.parse_lookup()?;
                Ok(Expr::Length(lookup, self.span_from(start)))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array(),
            _ => Err(self.error_here("Expected an expression")),
        }
    }

    fn parse_array(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.expect(TokenKind::LBracket)?.span.start;
        if self.matches(&TokenKind::RBracket) {
            return Ok(Expr::ArrayLiteral(Vec::new(), self.span_from(start)));
        }
        let first = self.parse_expr()?;
        if self.matches(&TokenKind::To) {
            let stop = self.parse_expr()?;
            let step = if self.matches(&TokenKind::By) {
                Some(Box::new(self.parse_expr()?))
            } else {
                None
            };
            self.expect(TokenKind::RBracket)?;
            return Ok(Expr::ArrayRange {
                start: Box::new(first),
                stop: Box::new(stop),
                step,
                span: self.span_from(start),
            });
        }
        if self.matches(&TokenKind::Tensor) {
            let shape = self.parse_expr()?;
            self.expect(TokenKind::RBracket)?;
            return Ok(Expr::ArrayTensor {
                fill: Box::new(first),
                shape: Box::new(shape),
                span: self.span_from(start),
            });
        }
        let mut items = vec![first];
        while self.matches(&TokenKind::Comma) {
            items.push(self.parse_expr()?);
        }
        self.expect(TokenKind::RBracket)?;
        Ok(Expr::ArrayLiteral(items, self.span_from(start)))
    }

    fn parse_lookup(&mut self) -> Result<Lookup, SyntaxError> {
        let (name, name_span) = self.expect_name("Expected variable name")?;
        let mut index = Vec::new();
        while self.matches(&TokenKind::LBracket) {
            index.push(self.parse_expr()?);
            self.expect(TokenKind::RBracket)?;
        }
        let end = self.previous_span_end(name_span.start);
        Ok(Lookup {
            name,
            index,
            span: Span::new(name_span.start, end),
        })
    }

    // ---------------- Mono checks ----------------

    fn check_no_mono(&self, expr: &Expr, context: &str) -> Result<(), SyntaxError> {
        if expr.has_mono() {
            return Err(SyntaxError::new(
                format!("Monodirectional data may not flow into {}", context),
                expr.span(),
            )
            .with_help("Promote the value first, or make the target monodirectional"));
        }
        Ok(())
    }

    fn check_all_mono<'s>(
        &self,
        statements: impl Iterator<Item = &'s Statement>,
        _span: Span,
    ) -> Result<(), SyntaxError> {
        for statement in statements {
            if !statement.is_mono() && !matches!(statement, Statement::Print(_)) {
                return Err(SyntaxError::new(
                    "A branch selected by monodirectional data may only contain \
                     monodirectional statements",
                    statement.span(),
                )
                .with_help(format!(
                    "This {} statement modifies reversible state",
                    statement.kind_name()
                )));
            }
        }
        Ok(())
    }

    // ---------------- Token helpers ----------------

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn here(&self) -> Span {
        self.current().span
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.previous_span_end(start))
    }

    fn previous_span_end(&self, fallback: usize) -> usize {
        if self.pos == 0 {
            return fallback;
        }
        self.tokens
            .get(self.pos - 1)
            .map(|t| t.span.end)
            .unwrap_or(fallback)
    }

    fn is_eof(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.current_kind() == kind
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) {
        if !self.is_eof() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, SyntaxError> {
        if self.check(&kind) {
            let token = self.current().clone();
            self.advance();
            Ok(token)
        } else {
            Err(self.error_here(format!(
                "Expected {:?}, found {}",
                kind,
                self.current_kind().describe()
            )))
        }
    }

    fn expect_name(&mut self, message: &str) -> Result<(String, Span), SyntaxError> {
        if let TokenKind::Identifier(name) = self.current_kind() {
            let name = name.clone();
            let span = self.here();
            self.advance();
            Ok((name, span))
        } else {
            Err(self.error_here(message))
        }
    }

    fn expect_string(&mut self, message: &str) -> Result<String, SyntaxError> {
        if let TokenKind::String(text) = self.current_kind() {
            let text = text.clone();
            self.advance();
            Ok(text)
        } else {
            Err(self.error_here(message))
        }
    }

    fn expect_line_end(&mut self) -> Result<(), SyntaxError> {
        if self.matches(&TokenKind::Newline) || self.is_eof() {
            Ok(())
        } else {
            Err(self.error_here("Expected end of line"))
        }
    }

    fn skip_newlines(&mut self) {
        while self.matches(&TokenKind::Newline) {}
    }

    fn error_here(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.here())
    }

    fn report(&mut self, err: SyntaxError) {
        self.errors.push(err);
    }

    fn synchronize_line(&mut self) {
        while !self.is_eof() && !self.check(&TokenKind::Newline) {
            self.advance();
        }
        self.matches(&TokenKind::Newline);
    }

    fn synchronize_top_level(&mut self) {
        while !self.is_eof() {
            if matches!(
                self.current_kind(),
                TokenKind::Func | TokenKind::Global | TokenKind::Import
            ) {
                return;
            }
            self.advance();
        }
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let span = left.span().join(right.span());
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span,
    }
}

fn parse_number(text: &str) -> Option<BigRational> {
    match text.find('.') {
        Some(dot) => {
            let frac = &text[dot + 1..];
            let digits: String = text[..dot].chars().chain(frac.chars()).collect();
            let numer = BigInt::from_str(&digits).ok()?;
            let denom = num_traits::pow(BigInt::from(10), frac.len());
            Some(BigRational::new(numer, denom))
        }
        None => Some(BigRational::from_integer(BigInt::from_str(text).ok()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Module {
        parse_module("test", PathBuf::from("test.rail"), source).expect("parse")
    }

    fn parse_err(source: &str) -> SyntaxErrors {
        parse_module("test", PathBuf::from("test.rail"), source).expect_err("should not parse")
    }

    #[test]
    fn function_with_let_unlet() {
        let module = parse("func main()()\nlet x = 3\nunlet x = 3\nreturn ()\n");
        assert_eq!(module.functions.len(), 1);
        let main = &module.functions[0];
        assert_eq!(main.body.len(), 2);
        assert!(matches!(main.body[0], Statement::Let(_)));
        assert!(matches!(main.body[1], Statement::Unlet(_)));
    }

    #[test]
    fn call_forms() {
        let module = parse(
            "func main()()\n(x) <= call f{4}(a, b)\n(x) => call g => (x)\ncall h(a)\nreturn ()\n",
        );
        let body = &module.functions[0].body;
        let Statement::Call(first) = &body[0] else {
            panic!("expected call");
        };
        assert!(!first.is_uncall);
        assert_eq!(first.borrow_args.len(), 2);
        assert_eq!(first.inout_args.len(), 1);
        assert!(matches!(first.num_threads, Some(Some(_))));
        let Statement::Call(second) = &body[1] else {
            panic!("expected call");
        };
        assert_eq!(second.inout_args.len(), 1);
        assert!(second.num_threads.is_none());
    }

    #[test]
    fn loop_and_if_predicates() {
        let module = parse(
            "func main()()\nif (x == 0)\nx += 1\nelse\nx -= 1\nfi (x == 1)\n\
             loop (n > 0)\nn -= 1\npool (n < 10)\nreturn ()\n",
        );
        let body = &module.functions[0].body;
        assert!(matches!(&body[0], Statement::If(s) if s.post.is_some()));
        assert!(matches!(&body[1], Statement::Loop(s) if s.exit.is_some()));
    }

    #[test]
    fn bare_fi_keeps_no_post_predicate() {
        let module = parse("func main()()\nif (x)\nx += 1\nfi\nreturn ()\n");
        assert!(matches!(&module.functions[0].body[0], Statement::If(s) if s.post.is_none()));
    }

    #[test]
    fn array_forms() {
        let module = parse("func main()()\nlet a = [1, 2]\nlet r = [0 to 10 by 2]\nlet t = [0 tensor [2, 3]]\nunlet a = [1, 2]\nreturn ()\n");
        let body = &module.functions[0].body;
        let Statement::Let(first) = &body[0] else { panic!() };
        assert!(matches!(first.rhs, Some(Expr::ArrayLiteral(..))));
        let Statement::Let(second) = &body[1] else { panic!() };
        assert!(matches!(second.rhs, Some(Expr::ArrayRange { .. })));
        let Statement::Let(third) = &body[2] else { panic!() };
        assert!(matches!(third.rhs, Some(Expr::ArrayTensor { .. })));
    }

    #[test]
    fn mono_flows_into_reversible_target_is_rejected() {
        let errors = parse_err("func main()()\nlet .m = 1\nlet x = .m + 1\nreturn ()\n");
        assert!(errors.errors[0].message.contains("Monodirectional"));
    }

    #[test]
    fn catch_outside_try_is_rejected() {
        let errors = parse_err("func main()()\ncatch (1)\nreturn ()\n");
        assert!(errors.errors[0].message.contains("catch"));
    }

    #[test]
    fn self_describing_mono_statement_flags() {
        let module = parse("func main()()\nlet .m = 1\n.m += 2\nreturn ()\n");
        let body = &module.functions[0].body;
        assert!(body[0].is_mono());
        assert!(body[1].is_mono());
    }

    #[test]
    fn decimal_literals_are_exact() {
        let module = parse("func main()()\nlet x = 0.5\nunlet x = 1/2\nreturn ()\n");
        let Statement::Let(stmt) = &module.functions[0].body[0] else {
            panic!()
        };
        let Some(Expr::Number(lit)) = &stmt.rhs else {
            panic!()
        };
        assert_eq!(lit.value, BigRational::new(BigInt::from(1), BigInt::from(2)));
    }

    #[test]
    fn promote_requires_mono_source() {
        let errors = parse_err("func main()()\npromote x => y\nreturn ()\n");
        assert!(errors.errors[0].message.contains("source"));
    }
}
