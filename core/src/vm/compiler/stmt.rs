use super::builder::{CResult, ProgramBuilder};
use super::driver::CompileError;
use crate::ast::{Ast, ExprId, StmtId, StmtKind};
use crate::token::Span;
use crate::vm::{Instruction, ValueType};

impl ProgramBuilder<'_> {
    pub fn stmt(&mut self, id: StmtId) -> CResult<()> {
        let program = self.program;
        let node = program.ast.stmt(id);
        let span = node.span;
        match &node.kind {
            StmtKind::VarDecl { name, ty, init } => {
                let actual = self.value_expr(*init)?;
                if let Some(declared) = ty
                    && *declared != actual
                {
                    return Err(CompileError::new(
                        format!("variable '{}' is declared {} but initialized with {}", name, declared, actual),
                        span,
                    ));
                }
                if actual == ValueType::Bool {
                    return Err(CompileError::new(
                        format!("variable '{}': bool variables are not supported", name),
                        span,
                    ));
                }
                if self.scopes.declared_in_current(name) {
                    return Err(CompileError::new(
                        format!("variable '{}' is already declared in this scope", name),
                        span,
                    ));
                }
                self.alloc_var(actual);
                self.scopes.declare(name, actual);
                self.save_var(actual, 0, span)?;
            }
            StmtKind::Assign { name, value } => {
                let ty = self.value_expr(*value)?;
                let Some((local, offset)) = self.scopes.resolve(name) else {
                    return Err(CompileError::new(format!("unknown variable '{}'", name), span));
                };
                if local.ty != ty {
                    return Err(CompileError::new(
                        format!("cannot assign {} to '{}' of type {}", ty, name, local.ty),
                        span,
                    ));
                }
                self.save_var(ty, offset, span)?;
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.branch_unless(*cond)?;
                let skip_then = self.emit_branch(Instruction::CondJumpB);
                self.stmt(*then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let skip_else = self.emit_branch(Instruction::Jump);
                        self.patch_here(skip_then, span)?;
                        self.stmt(*else_branch)?;
                        self.patch_here(skip_else, span)?;
                    }
                    None => self.patch_here(skip_then, span)?,
                }
            }
            StmtKind::While { cond, body } => {
                let top = self.label(span)?;
                self.branch_unless(*cond)?;
                let exit = self.emit_branch(Instruction::CondJumpB);
                self.stmt(*body)?;
                self.emit(Instruction::Jump(top));
                self.patch_here(exit, span)?;
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                // the init variable lives for the whole loop
                self.open_scope();
                if let Some(init) = init {
                    self.stmt(*init)?;
                }
                let top = self.label(span)?;
                let exit = match cond {
                    Some(cond) => {
                        self.branch_unless(*cond)?;
                        Some(self.emit_branch(Instruction::CondJumpB))
                    }
                    None => None,
                };
                self.stmt(*body)?;
                if let Some(step) = step {
                    self.stmt(*step)?;
                }
                self.emit(Instruction::Jump(top));
                if let Some(exit) = exit {
                    self.patch_here(exit, span)?;
                }
                self.close_scope();
            }
            StmtKind::Return(value) => self.return_stmt(*value, span)?,
            StmtKind::Block(stmts) => {
                self.open_scope();
                for stmt in stmts {
                    self.stmt(*stmt)?;
                }
                self.close_scope();
            }
            StmtKind::Expr(expr) => self.discard(*expr, span)?,
        }
        Ok(())
    }

    /// Lower `cond` and negate it, so a following `COND_JUMP_B` is taken when it is false.
    fn branch_unless(&mut self, cond: ExprId) -> CResult<()> {
        let ty = self.value_expr(cond)?;
        if ty != ValueType::Bool {
            let span = self.program.ast.expr(cond).span;
            return Err(CompileError::new(format!("condition must be bool, found {}", ty), span));
        }
        self.emit(Instruction::NegateB);
        Ok(())
    }

    fn return_stmt(&mut self, value: Option<ExprId>, span: Span) -> CResult<()> {
        let program = self.program;
        let Some(fn_index) = self.current_fn else {
            return Err(CompileError::new("return outside of a function", span));
        };
        let decl = &program.functions[fn_index];
        match (value, decl.ret) {
            (Some(value), Some(ret)) => {
                let ty = self.value_expr(value)?;
                if ty != ret {
                    return Err(CompileError::new(
                        format!("function '{}' returns {} but the value is {}", decl.name, ret, ty),
                        span,
                    ));
                }
            }
            (None, None) => {}
            (Some(_), None) => {
                return Err(CompileError::new(
                    format!("function '{}' has no return type but returns a value", decl.name),
                    span,
                ));
            }
            (None, Some(ret)) => {
                return Err(CompileError::new(
                    format!("function '{}' must return a {} value", decl.name, ret),
                    span,
                ));
            }
        }
        self.leave_function();
        Ok(())
    }

    /// Release every slot of the current function, then return to the caller.
    fn leave_function(&mut self) {
        let live = self.scopes.all_live();
        self.dealloc(&live);
        self.emit(Instruction::Return);
    }

    /// Evaluate an expression statement and drop its value.
    fn discard(&mut self, expr: ExprId, span: Span) -> CResult<()> {
        match self.expr(expr)? {
            Some(ty @ (ValueType::Int | ValueType::Float)) => {
                // park the value in a scratch slot and release it
                self.alloc_var(ty);
                self.save_var(ty, 0, span)?;
                self.emit(if ty == ValueType::Float {
                    Instruction::DeallocVarF
                } else {
                    Instruction::DeallocVarI
                });
            }
            Some(ValueType::Bool) => {
                // pops the bool either way and lands on the next instruction
                let site = self.emit_branch(Instruction::CondJumpB);
                self.patch_here(site, span)?;
            }
            None => {}
        }
        Ok(())
    }

    /// Lower the function at `index`: parameter prologue, body, implicit return.
    pub fn function(&mut self, index: usize) -> CResult<()> {
        let program = self.program;
        let decl = &program.functions[index];
        self.begin_function(index, decl.span)?;
        // arguments arrive with the last one on top of the evaluation stack
        for param in decl.params.iter().rev() {
            if param.ty == ValueType::Bool {
                return Err(CompileError::new(
                    format!("parameter '{}': bool parameters are not supported", param.name),
                    param.span,
                ));
            }
            self.alloc_var(param.ty);
            self.scopes.declare(&param.name, param.ty);
            self.save_var(param.ty, 0, param.span)?;
        }
        self.stmt(decl.body)?;
        if !always_returns(&program.ast, decl.body) {
            match decl.ret {
                None => self.leave_function(),
                Some(ret) => {
                    return Err(CompileError::new(
                        format!("function '{}' must return a {} value on every path", decl.name, ret),
                        decl.span,
                    ));
                }
            }
        }
        self.end_function();
        Ok(())
    }
}

/// Whether every path through `id` ends in a `return`.
pub(crate) fn always_returns(ast: &Ast, id: StmtId) -> bool {
    match &ast.stmt(id).kind {
        StmtKind::Return(_) => true,
        StmtKind::Block(stmts) => stmts.iter().any(|s| always_returns(ast, *s)),
        StmtKind::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => always_returns(ast, *then_branch) && always_returns(ast, *else_branch),
        _ => false,
    }
}
