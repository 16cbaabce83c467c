use anyhow::Result;
use hss_core::vm::{NativeSignature, NativeTable, OperandStack, ValueType};

use ValueType::{Float, Int};

pub fn register(table: &mut NativeTable) -> Result<()> {
    table.register("abs", NativeSignature::new([Int], Some(Int)), abs)?;
    table.register("min", NativeSignature::new([Int, Int], Some(Int)), min)?;
    table.register("max", NativeSignature::new([Int, Int], Some(Int)), max)?;
    table.register("sqrt", NativeSignature::new([Float], Some(Float)), sqrt)?;
    table.register("float", NativeSignature::new([Int], Some(Float)), to_float)?;
    table.register("int", NativeSignature::new([Float], Some(Int)), to_int)?;
    Ok(())
}

/// `abs(-32768)` wraps like the rest of int arithmetic.
fn abs(stack: &mut OperandStack) -> Result<()> {
    let v = stack.pop::<i16>()?;
    stack.push(v.wrapping_abs())?;
    Ok(())
}

fn min(stack: &mut OperandStack) -> Result<()> {
    let b = stack.pop::<i16>()?;
    let a = stack.pop::<i16>()?;
    stack.push(a.min(b))?;
    Ok(())
}

fn max(stack: &mut OperandStack) -> Result<()> {
    let b = stack.pop::<i16>()?;
    let a = stack.pop::<i16>()?;
    stack.push(a.max(b))?;
    Ok(())
}

fn sqrt(stack: &mut OperandStack) -> Result<()> {
    let v = stack.pop::<f32>()?;
    stack.push(v.sqrt())?;
    Ok(())
}

fn to_float(stack: &mut OperandStack) -> Result<()> {
    let v = stack.pop::<i16>()?;
    stack.push(f32::from(v))?;
    Ok(())
}

/// Truncates toward zero, saturates at the int range, NaN becomes 0.
fn to_int(stack: &mut OperandStack) -> Result<()> {
    let v = stack.pop::<f32>()?;
    stack.push(v as i16)?;
    Ok(())
}
