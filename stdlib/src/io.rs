use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use anyhow::{Context, Result};
use hss_core::vm::{NativeSignature, NativeTable, OperandStack, ValueType};

/// Where the `print_*` natives write. Shared so the host can keep a handle.
pub type Sink = Rc<RefCell<dyn Write>>;

fn write_line(sink: &Sink, text: &str) -> Result<()> {
    let mut out = sink.borrow_mut();
    writeln!(out, "{}", text).context("failed to write program output")?;
    out.flush().context("failed to flush program output")
}

pub fn register(table: &mut NativeTable, sink: Sink) -> Result<()> {
    let out = Rc::clone(&sink);
    table.register(
        "print_int",
        NativeSignature::new([ValueType::Int], None),
        move |stack: &mut OperandStack| {
            let v = stack.pop::<i16>()?;
            let mut buf = itoa::Buffer::new();
            write_line(&out, buf.format(v))
        },
    )?;

    let out = Rc::clone(&sink);
    table.register(
        "print_float",
        NativeSignature::new([ValueType::Float], None),
        move |stack: &mut OperandStack| {
            let v = stack.pop::<f32>()?;
            let mut buf = ryu::Buffer::new();
            write_line(&out, buf.format(v))
        },
    )?;

    table.register(
        "print_bool",
        NativeSignature::new([ValueType::Bool], None),
        move |stack: &mut OperandStack| {
            let v = stack.pop::<bool>()?;
            write_line(&sink, if v { "true" } else { "false" })
        },
    )?;
    Ok(())
}
