use crate::vm::scalar::{Float, Int, Scalar};
use crate::vm::stack::{OperandStack, StackError};

/// Pop `b`, pop `a`, push `op(a, b)`.
#[inline]
pub(super) fn binary<T, R>(stack: &mut OperandStack, op: impl FnOnce(T, T) -> R) -> Result<(), StackError>
where
    T: Scalar,
    R: Scalar,
{
    let b = stack.pop::<T>()?;
    let a = stack.pop::<T>()?;
    stack.push(op(a, b))
}

#[inline]
pub(super) fn unary<T: Scalar>(stack: &mut OperandStack, op: impl FnOnce(T) -> T) -> Result<(), StackError> {
    let a = stack.pop::<T>()?;
    stack.push(op(a))
}

/// Integer division with two's complement wrap (`i16::MIN / -1 == i16::MIN`).
/// `None` for a zero divisor.
#[inline]
pub(super) fn div_int(a: Int, b: Int) -> Option<Int> {
    if b == 0 { None } else { Some(a.wrapping_div(b)) }
}

// IEEE ordering: every comparison involving NaN is false.
#[inline]
pub(super) fn float_eq(a: Float, b: Float) -> bool {
    a == b
}

#[inline]
pub(super) fn float_less(a: Float, b: Float) -> bool {
    a < b
}

#[inline]
pub(super) fn float_less_eq(a: Float, b: Float) -> bool {
    a <= b
}
