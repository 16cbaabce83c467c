pub mod ast;
pub mod config;
pub mod token;

// Dual-stack bytecode VM, its compiler and the HSSB container
pub mod vm;
