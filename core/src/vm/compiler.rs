mod builder;
mod driver;
mod expr;
mod scope;
mod stmt;

pub use driver::{CompileError, CompiledProgram, Compiler, compile_program, compile_source};
