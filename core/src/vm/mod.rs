//! Stack-machine VM subsystem
//!
//! Memory regions and the dual-direction operand stack, the byte-level instruction
//! encoding, the dispatch loop, the native function table, the compiler that lowers
//! the AST to bytecode and the `HSSB` container that persists compiled modules.

mod alloc;
mod bytecode;
mod compiler;
mod hssb;
mod native;
mod scalar;
mod stack;
mod stream;
#[allow(clippy::module_inception)]
mod vm;

pub use alloc::*;
pub use bytecode::*;
pub use compiler::*;
pub use hssb::*;
pub use native::*;
pub use scalar::*;
pub use stack::*;
pub use stream::*;
pub use vm::*;

#[cfg(test)]
mod vm_test;
