use std::fmt;

use anyhow::Result;
use rustc_hash::FxHashSet;
use tracing::debug;

use super::builder::{FnInfo, ProgramBuilder};
use crate::ast::{Program, parse_program};
use crate::token::Span;
use crate::vm::{Instruction, InstructionStream, NativeImport, NativeTable, ValueType, render_disassembly};

/// Type or resolution error found while lowering a program.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub message: String,
    pub span: Option<Span>,
}

impl CompileError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span: Some(span),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.span {
            Some(span) => write!(f, "{} at {}", self.message, span),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for CompileError {}

/// Bytecode for one program plus what a host needs to run it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    pub code: Vec<u8>,
    /// Type of the value left on the evaluation stack, if the program has a result.
    pub result: Option<ValueType>,
    /// Natives referenced by `CALL_EXT`, in table order up to the highest index used.
    pub natives: Vec<NativeImport>,
}

impl CompiledProgram {
    pub fn into_stream(self) -> InstructionStream {
        InstructionStream::from_bytes(self.code)
    }

    pub fn disassemble(&self) -> Result<String> {
        render_disassembly(&self.code)
    }
}

/// Lowers parsed programs against a fixed native table.
pub struct Compiler<'a> {
    natives: &'a NativeTable,
}

impl<'a> Compiler<'a> {
    pub fn new(natives: &'a NativeTable) -> Self {
        Self { natives }
    }

    /// Layout: `JUMP main`, the function bodies, then the top-level code. The jump is
    /// left out when there are no functions.
    pub fn compile(&self, program: &Program) -> Result<CompiledProgram, CompileError> {
        let mut b = ProgramBuilder::new(program, self.natives);
        hoist_functions(&mut b, program)?;

        let skip = (!program.functions.is_empty()).then(|| b.emit_branch(Instruction::Jump));
        for index in 0..program.functions.len() {
            b.function(index)?;
        }
        if let Some(site) = skip {
            b.patch_here(site, program.functions[0].span)?;
        }

        for stmt in &program.body {
            b.stmt(*stmt)?;
        }
        let result = match program.result {
            Some(expr) => b.expr(expr)?,
            None => None,
        };
        // top-level variables go out of scope once the result is on the stack
        let live = b.scopes.all_live();
        b.dealloc(&live);

        let natives = b
            .max_native
            .map_or_else(Vec::new, |max| self.natives.imports(max as usize + 1));
        let code = b.finish()?;
        debug!(
            target: "hss::compiler",
            functions = program.functions.len(),
            code_bytes = code.len(),
            natives = natives.len(),
            result = ?result,
            "compile.done"
        );
        Ok(CompiledProgram { code, result, natives })
    }
}

fn hoist_functions(b: &mut ProgramBuilder<'_>, program: &Program) -> Result<(), CompileError> {
    for (index, decl) in program.functions.iter().enumerate() {
        if b.functions.contains_key(&decl.name) {
            return Err(CompileError::new(
                format!("function '{}' is already declared", decl.name),
                decl.span,
            ));
        }
        let mut seen = FxHashSet::default();
        for param in &decl.params {
            if !seen.insert(param.name.as_str()) {
                return Err(CompileError::new(
                    format!("duplicate parameter '{}' in function '{}'", param.name, decl.name),
                    param.span,
                ));
            }
        }
        b.functions.insert(
            decl.name.clone(),
            FnInfo {
                index,
                params: decl.params.iter().map(|p| p.ty).collect(),
                ret: decl.ret,
            },
        );
    }
    Ok(())
}

pub fn compile_program(program: &Program, natives: &NativeTable) -> Result<CompiledProgram, CompileError> {
    Compiler::new(natives).compile(program)
}

/// Parse and compile in one step.
pub fn compile_source(src: &str, natives: &NativeTable) -> Result<CompiledProgram> {
    let program = parse_program(src)?;
    Ok(compile_program(&program, natives)?)
}
