use crate::ast::{Ast, BinOp, ExprId, ExprKind, FnDecl, Param, Program, StmtId, StmtKind, UnaryOp};
use crate::token::{ParseError, Position, Span, Token, Tokenizer};
use crate::vm::ValueType;

type PResult<T> = Result<T, ParseError>;

/// Brackets, blocks, prefix operators and `else if` arms the parser will descend into.
const MAX_NESTING: usize = 128;
/// Tallest expression tree handed to the compiler.
const MAX_EXPR_DEPTH: u32 = 512;

/// Tokenize and parse a whole source file.
pub fn parse_program(src: &str) -> PResult<Program> {
    let (tokens, spans) = Tokenizer::tokenize_with_spans(src)?;
    Parser::new(&tokens, &spans).parse_program()
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    spans: &'a [Span],
    pos: usize,
    nesting: usize,
    ast: Ast,
}

impl<'a> Parser<'a> {
    /// `spans` must be aligned with `tokens` by index.
    pub fn new(tokens: &'a [Token], spans: &'a [Span]) -> Self {
        debug_assert_eq!(tokens.len(), spans.len());
        Self {
            tokens,
            spans,
            pos: 0,
            nesting: 0,
            ast: Ast::new(),
        }
    }

    /// program → item* expr? EOF
    pub fn parse_program(mut self) -> PResult<Program> {
        let mut functions = Vec::new();
        let mut body = Vec::new();
        let mut result = None;
        while !self.eof() {
            if self.check(&Token::Fn) {
                functions.push(self.parse_fn_decl()?);
                continue;
            }
            match self.parse_statement(true)? {
                Item::Stmt(stmt) => body.push(stmt),
                Item::Tail(expr) => {
                    result = Some(expr);
                    break;
                }
            }
        }
        Ok(Program {
            ast: self.ast,
            functions,
            body,
            result,
        })
    }

    fn eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead)
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn current_span(&self) -> Span {
        match self.spans.get(self.pos) {
            Some(span) => *span,
            None => self.eof_span(),
        }
    }

    fn eof_span(&self) -> Span {
        self.spans
            .last()
            .map(|s| Span::point(s.end))
            .unwrap_or_else(|| Span::point(Position::default()))
    }

    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.spans.get(i))
            .copied()
            .unwrap_or_else(|| self.eof_span())
    }

    /// From the start of `start` to the end of the last consumed token.
    fn since(&self, start: Span) -> Span {
        Span::new(start.start, self.prev_span().end)
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError::with_span(msg, self.current_span())
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(token) => self.err(format!("expected {}, found {}", expected, token)),
            None => self.err(format!("expected {}, found end of input", expected)),
        }
    }

    fn nested<T>(&mut self, what: &str, parse: fn(&mut Self) -> PResult<T>) -> PResult<T> {
        if self.nesting >= MAX_NESTING {
            return Err(self.err(format!("{} nest too deeply (limit {})", what, MAX_NESTING)));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    fn push_expr(&mut self, kind: ExprKind, span: Span) -> PResult<ExprId> {
        let id = self.ast.push_expr(kind, span);
        if self.ast.expr(id).depth > MAX_EXPR_DEPTH {
            return Err(ParseError::with_span(
                format!("expression nests too deeply (limit {})", MAX_EXPR_DEPTH),
                span,
            ));
        }
        Ok(id)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> PResult<Span> {
        if self.check(token) {
            let span = self.current_span();
            self.pos += 1;
            Ok(span)
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    fn expect_ident(&mut self) -> PResult<(String, Span)> {
        match self.peek() {
            Some(Token::Id(name)) => {
                let name = name.clone();
                let span = self.current_span();
                self.pos += 1;
                Ok((name, span))
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// type → "int" | "float" | "bool"
    fn parse_type(&mut self) -> PResult<ValueType> {
        let (name, span) = self.expect_ident()?;
        match name.as_str() {
            "int" => Ok(ValueType::Int),
            "float" => Ok(ValueType::Float),
            "bool" => Ok(ValueType::Bool),
            _ => Err(ParseError::with_span(format!("unknown type '{}'", name), span)),
        }
    }

    /// fn_decl → "fn" IDENT "(" (param ("," param)*)? ")" ("->" type)? block
    fn parse_fn_decl(&mut self) -> PResult<FnDecl> {
        let start = self.expect(&Token::Fn)?;
        let (name, _) = self.expect_ident()?;
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                let (pname, pspan) = self.expect_ident()?;
                self.expect(&Token::Colon)?;
                let ty = self.parse_type()?;
                params.push(Param {
                    name: pname,
                    ty,
                    span: self.since(pspan),
                });
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        let ret = if self.eat(&Token::FnArrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(FnDecl {
            name,
            params,
            ret,
            body,
            span: self.since(start),
        })
    }

    fn parse_block(&mut self) -> PResult<StmtId> {
        self.nested("blocks", Self::parse_block_body)
    }

    /// block → "{" statement* "}"
    fn parse_block_body(&mut self) -> PResult<StmtId> {
        let start = self.expect(&Token::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.eof() {
                return Err(self.unexpected("'}'"));
            }
            if self.check(&Token::Fn) {
                return Err(self.err("functions can only be declared at the top level"));
            }
            if let Item::Stmt(stmt) = self.parse_statement(false)? {
                stmts.push(stmt);
            }
        }
        let end = self.expect(&Token::RBrace)?;
        Ok(self.ast.push_stmt(StmtKind::Block(stmts), Span::new(start.start, end.end)))
    }

    fn parse_statement(&mut self, top_level: bool) -> PResult<Item> {
        let start = self.current_span();
        let stmt = match self.peek() {
            Some(Token::Var) => self.parse_var_decl()?,
            Some(Token::If) => self.parse_if()?,
            Some(Token::While) => {
                self.pos += 1;
                let cond = self.parse_paren_expr()?;
                let body = self.parse_block()?;
                self.ast
                    .push_stmt(StmtKind::While { cond, body }, self.since(start))
            }
            Some(Token::For) => self.parse_for()?,
            Some(Token::Return) => {
                self.pos += 1;
                let value = if self.check(&Token::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&Token::Semicolon)?;
                self.ast.push_stmt(StmtKind::Return(value), self.since(start))
            }
            Some(Token::LBrace) => self.parse_block()?,
            Some(Token::Id(_)) if self.peek_at(1) == Some(&Token::Assign) => {
                let stmt = self.parse_assignment()?;
                self.expect(&Token::Semicolon)?;
                stmt
            }
            _ => {
                let expr = self.parse_expr()?;
                if top_level && self.eof() {
                    return Ok(Item::Tail(expr));
                }
                if !self.eat(&Token::Semicolon) {
                    return Err(self.unexpected("';'"));
                }
                self.ast.push_stmt(StmtKind::Expr(expr), self.since(start))
            }
        };
        Ok(Item::Stmt(stmt))
    }

    /// "var" IDENT (":" type)? "=" expr ";"
    fn parse_var_decl(&mut self) -> PResult<StmtId> {
        let start = self.expect(&Token::Var)?;
        let (name, _) = self.expect_ident()?;
        let ty = if self.eat(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(&Token::Assign)?;
        let init = self.parse_expr()?;
        self.expect(&Token::Semicolon)?;
        Ok(self
            .ast
            .push_stmt(StmtKind::VarDecl { name, ty, init }, self.since(start)))
    }

    /// IDENT "=" expr, without the terminator
    fn parse_assignment(&mut self) -> PResult<StmtId> {
        let (name, start) = self.expect_ident()?;
        self.expect(&Token::Assign)?;
        let value = self.parse_expr()?;
        Ok(self
            .ast
            .push_stmt(StmtKind::Assign { name, value }, self.since(start)))
    }

    /// "if" "(" expr ")" block ("else" (if | block))?
    fn parse_if(&mut self) -> PResult<StmtId> {
        let start = self.expect(&Token::If)?;
        let cond = self.parse_paren_expr()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.eat(&Token::Else) {
            if self.check(&Token::If) {
                Some(self.nested("blocks", Self::parse_if)?)
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(self.ast.push_stmt(
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            },
            self.since(start),
        ))
    }

    /// "for" "(" (var-decl | assignment ";" | ";") expr? ";" assignment? ")" block
    fn parse_for(&mut self) -> PResult<StmtId> {
        let start = self.expect(&Token::For)?;
        self.expect(&Token::LParen)?;
        let init = if self.eat(&Token::Semicolon) {
            None
        } else if self.check(&Token::Var) {
            Some(self.parse_var_decl()?)
        } else {
            let stmt = self.parse_assignment()?;
            self.expect(&Token::Semicolon)?;
            Some(stmt)
        };
        let cond = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&Token::Semicolon)?;
        let step = if self.check(&Token::RParen) {
            None
        } else {
            Some(self.parse_assignment()?)
        };
        self.expect(&Token::RParen)?;
        let body = self.parse_block()?;
        Ok(self.ast.push_stmt(
            StmtKind::For {
                init,
                cond,
                step,
                body,
            },
            self.since(start),
        ))
    }

    fn parse_paren_expr(&mut self) -> PResult<ExprId> {
        self.expect(&Token::LParen)?;
        let expr = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        Ok(expr)
    }

    pub fn parse_expr(&mut self) -> PResult<ExprId> {
        self.nested("expressions", Self::parse_or)
    }

    fn binary_level(
        &mut self,
        next: fn(&mut Self) -> PResult<ExprId>,
        ops: &[(Token, BinOp)],
    ) -> PResult<ExprId> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.check(token) {
                    self.pos += 1;
                    let rhs = next(self)?;
                    let span = Span::new(self.ast.expr(lhs).span.start, self.ast.expr(rhs).span.end);
                    lhs = self.push_expr(ExprKind::Binary(*op, lhs, rhs), span)?;
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    /// `expr || expr`
    fn parse_or(&mut self) -> PResult<ExprId> {
        self.binary_level(Self::parse_and, &[(Token::Or, BinOp::Or)])
    }

    /// `expr && expr`
    fn parse_and(&mut self) -> PResult<ExprId> {
        self.binary_level(Self::parse_equality, &[(Token::And, BinOp::And)])
    }

    fn parse_equality(&mut self) -> PResult<ExprId> {
        self.binary_level(Self::parse_comparison, &[(Token::Eq, BinOp::Eq), (Token::Ne, BinOp::Ne)])
    }

    fn parse_comparison(&mut self) -> PResult<ExprId> {
        self.binary_level(
            Self::parse_term,
            &[
                (Token::Lt, BinOp::Lt),
                (Token::Le, BinOp::Le),
                (Token::Gt, BinOp::Gt),
                (Token::Ge, BinOp::Ge),
            ],
        )
    }

    fn parse_term(&mut self) -> PResult<ExprId> {
        self.binary_level(Self::parse_factor, &[(Token::Add, BinOp::Add), (Token::Sub, BinOp::Sub)])
    }

    fn parse_factor(&mut self) -> PResult<ExprId> {
        self.binary_level(Self::parse_unary, &[(Token::Mul, BinOp::Mul), (Token::Div, BinOp::Div)])
    }

    fn parse_unary(&mut self) -> PResult<ExprId> {
        let start = self.current_span();
        let op = match self.peek() {
            Some(Token::Sub) => UnaryOp::Neg,
            Some(Token::Not) => UnaryOp::Not,
            _ => return self.parse_call(),
        };
        self.pos += 1;
        let operand = self.nested("expressions", Self::parse_unary)?;
        let span = Span::new(start.start, self.ast.expr(operand).span.end);
        self.push_expr(ExprKind::Unary(op, operand), span)
    }

    /// call → IDENT "(" args? ")" | primary
    fn parse_call(&mut self) -> PResult<ExprId> {
        if let (Some(Token::Id(name)), Some(Token::LParen)) = (self.peek(), self.peek_at(1)) {
            let name = name.clone();
            let start = self.current_span();
            self.pos += 2;
            let mut args = Vec::new();
            if !self.check(&Token::RParen) {
                loop {
                    args.push(self.parse_expr()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
            }
            let end = self.expect(&Token::RParen)?;
            return self.push_expr(ExprKind::Call { name, args }, Span::new(start.start, end.end));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> PResult<ExprId> {
        let span = self.current_span();
        let kind = match self.peek() {
            Some(Token::Int(i)) => ExprKind::Int(*i),
            Some(Token::Float(f)) => ExprKind::Float(*f),
            Some(Token::Bool(b)) => ExprKind::Bool(*b),
            Some(Token::Id(name)) => ExprKind::Var(name.clone()),
            Some(Token::Str(_)) => return Err(self.err("string values are not supported")),
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                return Ok(inner);
            }
            _ => return Err(self.unexpected("expression")),
        };
        self.advance();
        self.push_expr(kind, span)
    }
}

enum Item {
    Stmt(StmtId),
    Tail(ExprId),
}
