use super::builder::{CResult, ProgramBuilder};
use super::driver::CompileError;
use crate::ast::{BinOp, ExprId, ExprKind, UnaryOp};
use crate::token::Span;
use crate::vm::{Instruction, Int, ValueType};

impl ProgramBuilder<'_> {
    /// Lower an expression that must produce a value.
    pub fn value_expr(&mut self, id: ExprId) -> CResult<ValueType> {
        let span = self.program.ast.expr(id).span;
        match self.expr(id)? {
            Some(ty) => Ok(ty),
            None => Err(CompileError::new("expression does not produce a value", span)),
        }
    }

    /// Lower an expression; `None` for a call to a function without a return type.
    pub fn expr(&mut self, id: ExprId) -> CResult<Option<ValueType>> {
        let program = self.program;
        let node = program.ast.expr(id);
        let span = node.span;
        let ty = match &node.kind {
            ExprKind::Int(v) => {
                self.emit(Instruction::LiteralI(int_literal(*v, span)?));
                ValueType::Int
            }
            ExprKind::Float(v) => {
                self.emit(Instruction::LiteralF(*v));
                ValueType::Float
            }
            ExprKind::Bool(b) => {
                self.emit(Instruction::LiteralB(*b));
                ValueType::Bool
            }
            ExprKind::Var(name) => {
                let Some((local, offset)) = self.scopes.resolve(name) else {
                    return Err(CompileError::new(format!("unknown variable '{}'", name), span));
                };
                let ty = local.ty;
                self.load_var(ty, offset, span)?;
                ty
            }
            ExprKind::Unary(op, operand) => self.unary(*op, *operand, span)?,
            ExprKind::Binary(op, lhs, rhs) => self.binary(*op, *lhs, *rhs, span)?,
            ExprKind::Call { name, args } => return self.call(name, args, span),
        };
        Ok(Some(ty))
    }

    /// Static type of an expression without emitting anything.
    fn type_of(&self, id: ExprId) -> CResult<Option<ValueType>> {
        let node = self.program.ast.expr(id);
        Ok(match &node.kind {
            ExprKind::Int(_) => Some(ValueType::Int),
            ExprKind::Float(_) => Some(ValueType::Float),
            ExprKind::Bool(_) => Some(ValueType::Bool),
            ExprKind::Var(name) => match self.scopes.resolve(name) {
                Some((local, _)) => Some(local.ty),
                None => return Err(CompileError::new(format!("unknown variable '{}'", name), node.span)),
            },
            ExprKind::Unary(UnaryOp::Neg, operand) => self.type_of(*operand)?,
            ExprKind::Unary(UnaryOp::Not, _) => Some(ValueType::Bool),
            ExprKind::Binary(op, lhs, _) if op.is_arithmetic() => self.type_of(*lhs)?,
            ExprKind::Binary(..) => Some(ValueType::Bool),
            ExprKind::Call { name, .. } => {
                if let Some(info) = self.functions.get(name) {
                    info.ret
                } else if let Some((_, sig)) = self.natives.lookup(name) {
                    sig.ret
                } else {
                    return Err(CompileError::new(format!("unknown function '{}'", name), node.span));
                }
            }
        })
    }

    fn unary(&mut self, op: UnaryOp, operand: ExprId, span: Span) -> CResult<ValueType> {
        match op {
            UnaryOp::Neg => {
                // fold negative literals so that i16::MIN is expressible
                let program = self.program;
                match program.ast.expr(operand).kind {
                    ExprKind::Int(v) => {
                        self.emit(Instruction::LiteralI(int_literal(-v, span)?));
                        return Ok(ValueType::Int);
                    }
                    ExprKind::Float(v) => {
                        self.emit(Instruction::LiteralF(-v));
                        return Ok(ValueType::Float);
                    }
                    _ => {}
                }
                // lowered as `0 - x`, so the zero has to be typed before x is emitted
                let (zero, sub) = match self.type_of(operand)? {
                    Some(ValueType::Int) => (Instruction::LiteralI(0), Instruction::SubtractI),
                    Some(ValueType::Float) => (Instruction::LiteralF(0.0), Instruction::SubtractF),
                    Some(other) => {
                        return Err(CompileError::new(format!("cannot negate a {} value", other), span));
                    }
                    None => return Err(CompileError::new("expression does not produce a value", span)),
                };
                self.emit(zero);
                let ty = self.value_expr(operand)?;
                self.emit(sub);
                Ok(ty)
            }
            UnaryOp::Not => {
                let ty = self.value_expr(operand)?;
                if ty != ValueType::Bool {
                    return Err(CompileError::new(format!("'!' needs a bool operand, found {}", ty), span));
                }
                self.emit(Instruction::NegateB);
                Ok(ValueType::Bool)
            }
        }
    }

    fn binary(&mut self, op: BinOp, lhs: ExprId, rhs: ExprId, span: Span) -> CResult<ValueType> {
        // `a > b` is `b < a`: evaluate the right operand first
        let (first, second) = match op {
            BinOp::Gt | BinOp::Ge => (rhs, lhs),
            _ => (lhs, rhs),
        };
        let lt = self.value_expr(first)?;
        let rt = self.value_expr(second)?;
        if lt != rt {
            return Err(CompileError::new(
                format!("mismatched operand types for '{}': {} and {}", op, lt, rt),
                span,
            ));
        }
        if op.is_logical() {
            if lt != ValueType::Bool {
                return Err(CompileError::new(format!("'{}' needs bool operands, found {}", op, lt), span));
            }
            self.emit(if op == BinOp::And { Instruction::AndB } else { Instruction::OrB });
            return Ok(ValueType::Bool);
        }
        let float = match lt {
            ValueType::Int => false,
            ValueType::Float => true,
            other => {
                return Err(CompileError::new(
                    format!("'{}' needs int or float operands, found {}", op, other),
                    span,
                ));
            }
        };
        let ins = match (op, float) {
            (BinOp::Add, false) => Instruction::AddI,
            (BinOp::Add, true) => Instruction::AddF,
            (BinOp::Sub, false) => Instruction::SubtractI,
            (BinOp::Sub, true) => Instruction::SubtractF,
            (BinOp::Mul, false) => Instruction::MultiplyI,
            (BinOp::Mul, true) => Instruction::MultiplyF,
            (BinOp::Div, false) => Instruction::DivideI,
            (BinOp::Div, true) => Instruction::DivideF,
            (BinOp::Eq | BinOp::Ne, false) => Instruction::CmpIEq,
            (BinOp::Eq | BinOp::Ne, true) => Instruction::CmpFEq,
            (BinOp::Lt | BinOp::Gt, false) => Instruction::CmpILess,
            (BinOp::Lt | BinOp::Gt, true) => Instruction::CmpFLess,
            (BinOp::Le | BinOp::Ge, false) => Instruction::CmpILessEq,
            (BinOp::Le | BinOp::Ge, true) => Instruction::CmpFLessEq,
            (BinOp::And | BinOp::Or, _) => unreachable!("logical operators handled above"),
        };
        self.emit(ins);
        if op == BinOp::Ne {
            self.emit(Instruction::NegateB);
        }
        Ok(if op.is_arithmetic() { lt } else { ValueType::Bool })
    }

    fn call(&mut self, name: &str, args: &[ExprId], span: Span) -> CResult<Option<ValueType>> {
        if let Some(info) = self.functions.get(name).cloned() {
            self.call_args(name, &info.params, args, span)?;
            self.emit_call(info.index, span);
            return Ok(info.ret);
        }
        let natives = self.natives;
        if let Some((index, sig)) = natives.lookup(name) {
            self.call_args(name, &sig.params, args, span)?;
            self.emit(Instruction::CallExt(index));
            self.max_native = Some(self.max_native.map_or(index, |m| m.max(index)));
            return Ok(sig.ret);
        }
        Err(CompileError::new(format!("unknown function '{}'", name), span))
    }

    fn call_args(&mut self, name: &str, params: &[ValueType], args: &[ExprId], span: Span) -> CResult<()> {
        if params.len() != args.len() {
            return Err(CompileError::new(
                format!("'{}' takes {} argument(s) but {} were given", name, params.len(), args.len()),
                span,
            ));
        }
        for (i, (arg, expected)) in args.iter().zip(params).enumerate() {
            let ty = self.value_expr(*arg)?;
            if ty != *expected {
                let arg_span = self.program.ast.expr(*arg).span;
                return Err(CompileError::new(
                    format!("argument {} of '{}' must be {}, found {}", i + 1, name, expected, ty),
                    arg_span,
                ));
            }
        }
        Ok(())
    }
}

fn int_literal(v: i64, span: Span) -> CResult<Int> {
    Int::try_from(v).map_err(|_| {
        CompileError::new(
            format!("integer literal {} does not fit in int ({}..={})", v, Int::MIN, Int::MAX),
            span,
        )
    })
}
