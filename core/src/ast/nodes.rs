use std::fmt;

use crate::token::Span;
use crate::vm::ValueType;

/// Handle to an expression stored in an [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

/// Handle to a statement stored in an [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div)
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // Range-checked by the compiler; the tokenizer keeps the raw magnitude
    Int(i64),
    Float(f32),
    Bool(bool),
    Var(String),
    Unary(UnaryOp, ExprId),
    Binary(BinOp, ExprId, ExprId),
    Call { name: String, args: Vec<ExprId> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    /// Height of the subtree rooted here; leaves are 1.
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    VarDecl {
        name: String,
        ty: Option<ValueType>,
        init: ExprId,
    },
    Assign {
        name: String,
        value: ExprId,
    },
    If {
        cond: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    },
    While {
        cond: ExprId,
        body: StmtId,
    },
    For {
        init: Option<StmtId>,
        cond: Option<ExprId>,
        step: Option<StmtId>,
        body: StmtId,
    },
    Return(Option<ExprId>),
    Block(Vec<StmtId>),
    Expr(ExprId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: ValueType,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Option<ValueType>,
    /// Always a `StmtKind::Block`.
    pub body: StmtId,
    pub span: Span,
}

/// Node storage for one parsed program. Nodes refer to each other by id.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Ast {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        let children = match &kind {
            ExprKind::Unary(_, operand) => self.expr(*operand).depth,
            ExprKind::Binary(_, lhs, rhs) => self.expr(*lhs).depth.max(self.expr(*rhs).depth),
            ExprKind::Call { args, .. } => args.iter().map(|arg| self.expr(*arg).depth).max().unwrap_or(0),
            ExprKind::Int(_) | ExprKind::Float(_) | ExprKind::Bool(_) | ExprKind::Var(_) => 0,
        };
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(Expr {
            kind,
            span,
            depth: children + 1,
        });
        id
    }

    pub fn push_stmt(&mut self, kind: StmtKind, span: Span) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(Stmt { kind, span });
        id
    }

    // Ids are only minted by this arena, so indexing cannot go out of bounds.
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize]
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }
}

/// A parsed source file: hoisted function declarations, top-level statements in
/// order, and the optional trailing expression that is the program result.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub ast: Ast,
    pub functions: Vec<FnDecl>,
    pub body: Vec<StmtId>,
    pub result: Option<ExprId>,
}
