use rustc_hash::FxHashMap;

use super::driver::CompileError;
use super::scope::{Local, Scopes};
use crate::ast::Program;
use crate::token::{Position, Span};
use crate::vm::{Address, Instruction, NativeTable, ValueType};

pub(crate) type CResult<T> = Result<T, CompileError>;

#[derive(Debug, Clone)]
pub(crate) struct FnInfo {
    pub index: usize,
    pub params: Vec<ValueType>,
    pub ret: Option<ValueType>,
}

/// State shared by the expression and statement lowering passes.
pub(crate) struct ProgramBuilder<'a> {
    pub program: &'a Program,
    pub natives: &'a NativeTable,
    code: Vec<u8>,
    pub functions: FxHashMap<String, FnInfo>,
    fn_addrs: Vec<Option<Address>>,
    call_sites: Vec<(usize, usize, Span)>,
    pub scopes: Scopes,
    /// Function whose body is being lowered; `None` at the top level.
    pub current_fn: Option<usize>,
    pub max_native: Option<u8>,
}

impl<'a> ProgramBuilder<'a> {
    pub fn new(program: &'a Program, natives: &'a NativeTable) -> Self {
        Self {
            program,
            natives,
            code: Vec::new(),
            functions: FxHashMap::with_capacity_and_hasher(program.functions.len(), Default::default()),
            fn_addrs: vec![None; program.functions.len()],
            call_sites: Vec::new(),
            scopes: Scopes::new(),
            current_fn: None,
            max_native: None,
        }
    }

    pub fn emit(&mut self, ins: Instruction) -> usize {
        let at = self.code.len();
        ins.encode_into(&mut self.code);
        at
    }

    /// Address of the next instruction.
    pub fn label(&self, span: Span) -> CResult<Address> {
        Address::try_from(self.code.len())
            .map_err(|_| CompileError::new("program exceeds the 64 KiB address space", span))
    }

    /// Emit a branch with a placeholder target and return its site for [`patch`](Self::patch).
    pub fn emit_branch(&mut self, make: fn(Address) -> Instruction) -> usize {
        self.emit(make(0))
    }

    pub fn patch(&mut self, site: usize, target: Address) {
        // operand follows the opcode byte
        let operand = site + 1;
        self.code[operand..operand + 2].copy_from_slice(&target.to_le_bytes());
    }

    pub fn patch_here(&mut self, site: usize, span: Span) -> CResult<()> {
        let target = self.label(span)?;
        self.patch(site, target);
        Ok(())
    }

    pub fn emit_call(&mut self, fn_index: usize, span: Span) {
        let site = self.emit_branch(Instruction::Call);
        self.call_sites.push((site, fn_index, span));
    }

    pub fn begin_function(&mut self, fn_index: usize, span: Span) -> CResult<()> {
        let at = self.label(span)?;
        self.fn_addrs[fn_index] = Some(at);
        self.current_fn = Some(fn_index);
        self.scopes = Scopes::new();
        Ok(())
    }

    pub fn end_function(&mut self) {
        self.current_fn = None;
        self.scopes = Scopes::new();
    }

    pub fn alloc_var(&mut self, ty: ValueType) {
        self.emit(match ty {
            ValueType::Float => Instruction::AllocVarF,
            _ => Instruction::AllocVarI,
        });
    }

    pub fn dealloc(&mut self, locals: &[Local]) {
        for local in locals {
            self.emit(match local.ty {
                ValueType::Float => Instruction::DeallocVarF,
                _ => Instruction::DeallocVarI,
            });
        }
    }

    pub fn save_var(&mut self, ty: ValueType, offset: usize, span: Span) -> CResult<()> {
        let off = frame_offset(offset, span)?;
        self.emit(match ty {
            ValueType::Float => Instruction::SaveVarF(off),
            _ => Instruction::SaveVarI(off),
        });
        Ok(())
    }

    pub fn load_var(&mut self, ty: ValueType, offset: usize, span: Span) -> CResult<()> {
        let off = frame_offset(offset, span)?;
        self.emit(match ty {
            ValueType::Float => Instruction::LoadVarF(off),
            _ => Instruction::LoadVarI(off),
        });
        Ok(())
    }

    pub fn open_scope(&mut self) {
        self.scopes.push();
    }

    pub fn close_scope(&mut self) {
        let released = self.scopes.pop();
        self.dealloc(&released);
    }

    /// Resolve call sites and hand back the finished code.
    pub fn finish(mut self) -> CResult<Vec<u8>> {
        for (site, fn_index, span) in std::mem::take(&mut self.call_sites) {
            let Some(target) = self.fn_addrs[fn_index] else {
                return Err(CompileError::new("call to a function that was never emitted", span));
            };
            self.patch(site, target);
        }
        if self.code.len() > Address::MAX as usize {
            let span = self
                .program
                .result
                .map(|id| self.program.ast.expr(id).span)
                .unwrap_or_else(|| Span::point(Position::default()));
            return Err(CompileError::new("program exceeds the 64 KiB address space", span));
        }
        Ok(self.code)
    }
}

fn frame_offset(offset: usize, span: Span) -> CResult<u8> {
    u8::try_from(offset).map_err(|_| {
        CompileError::new(
            format!("variable is {} bytes deep in the frame, more than 255", offset),
            span,
        )
    })
}
