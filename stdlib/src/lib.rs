//! Native functions for HSS programs, reachable through `CALL_EXT`.
//!
//! Registration order fixes the native indices baked into compiled code, so hosts that
//! run persisted modules must build their table with the same calls.

pub mod io;
pub mod math;

#[cfg(test)]
mod math_test;

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use hss_core::vm::NativeTable;
use tracing::debug;

pub use io::Sink;

/// Register every stdlib native: the `print_*` family writing to `sink`, then math.
pub fn register_stdlib(table: &mut NativeTable, sink: Sink) -> Result<()> {
    let before = table.len();
    io::register(table, sink)?;
    math::register(table)?;
    debug!(target: "hss::stdlib", natives = table.len() - before, "stdlib.register");
    Ok(())
}

/// A fresh table holding the stdlib natives, printing to stdout.
pub fn stdlib_table() -> Result<NativeTable> {
    let mut table = NativeTable::new();
    register_stdlib(&mut table, Rc::new(RefCell::new(std::io::stdout())))?;
    Ok(table)
}
