use tracing::trace;

use crate::vm::bytecode::{DecodeError, Instruction};
use crate::vm::scalar::{Address, Float, Int, Scalar};
use crate::vm::vm::{Fault, Vm};

use super::math;

impl Vm {
    /// Fetch, decode and execute the instruction at the program counter.
    pub(super) fn step(&mut self) -> Result<(), Fault> {
        let at = self.stream.pc();
        let ins = self.stream.fetch().map_err(|err| match err {
            DecodeError::UnknownOpcode(byte) => Fault::UnknownOpcode { at, byte },
            DecodeError::TruncatedOperand(opcode) => Fault::TruncatedOperand { at, opcode },
        })?;
        trace!(
            target: "hss::vm::dispatch",
            pc = at,
            ins = %ins,
            eval = self.stack.eval_len(),
            frame = self.stack.frame_len(),
            "step"
        );

        let on_stack = |error| Fault::Stack { at, error };
        let stack = &mut self.stack;
        match ins {
            Instruction::Noop => {}

            Instruction::AddI => math::binary(stack, Int::wrapping_add).map_err(on_stack)?,
            Instruction::AddF => math::binary(stack, |a: Float, b: Float| a + b).map_err(on_stack)?,
            Instruction::SubtractI => math::binary(stack, Int::wrapping_sub).map_err(on_stack)?,
            Instruction::SubtractF => math::binary(stack, |a: Float, b: Float| a - b).map_err(on_stack)?,
            Instruction::MultiplyI => math::binary(stack, Int::wrapping_mul).map_err(on_stack)?,
            Instruction::MultiplyF => math::binary(stack, |a: Float, b: Float| a * b).map_err(on_stack)?,
            Instruction::DivideI => {
                if stack.peek::<Int>().map_err(on_stack)? == 0 {
                    return Err(Fault::DivideByZero { at });
                }
                let b = stack.pop::<Int>().map_err(on_stack)?;
                let a = stack.pop::<Int>().map_err(on_stack)?;
                let quotient = math::div_int(a, b).ok_or(Fault::DivideByZero { at })?;
                stack.push(quotient).map_err(on_stack)?;
            }
            Instruction::DivideF => math::binary(stack, |a: Float, b: Float| a / b).map_err(on_stack)?,

            Instruction::LiteralI(v) => stack.push(v).map_err(on_stack)?,
            Instruction::LiteralF(v) => stack.push(v).map_err(on_stack)?,
            Instruction::LiteralB(v) => stack.push(v).map_err(on_stack)?,

            Instruction::NegateB => math::unary(stack, |b: bool| !b).map_err(on_stack)?,
            Instruction::AndB => math::binary(stack, |a: bool, b: bool| a & b).map_err(on_stack)?,
            Instruction::OrB => math::binary(stack, |a: bool, b: bool| a | b).map_err(on_stack)?,

            Instruction::CmpIEq => math::binary(stack, |a: Int, b: Int| a == b).map_err(on_stack)?,
            Instruction::CmpILess => math::binary(stack, |a: Int, b: Int| a < b).map_err(on_stack)?,
            Instruction::CmpILessEq => math::binary(stack, |a: Int, b: Int| a <= b).map_err(on_stack)?,
            Instruction::CmpFEq => math::binary(stack, math::float_eq).map_err(on_stack)?,
            Instruction::CmpFLess => math::binary(stack, math::float_less).map_err(on_stack)?,
            Instruction::CmpFLessEq => math::binary(stack, math::float_less_eq).map_err(on_stack)?,

            Instruction::AllocVarI => stack.alloc_var(Int::WIDTH).map_err(on_stack)?,
            Instruction::AllocVarF => stack.alloc_var(Float::WIDTH).map_err(on_stack)?,
            Instruction::DeallocVarI => stack.dealloc_var(Int::WIDTH).map_err(on_stack)?,
            Instruction::DeallocVarF => stack.dealloc_var(Float::WIDTH).map_err(on_stack)?,
            Instruction::SaveVarI(off) => {
                let v = stack.pop::<Int>().map_err(on_stack)?;
                stack.save_var(off as usize, v).map_err(on_stack)?;
            }
            Instruction::SaveVarF(off) => {
                let v = stack.pop::<Float>().map_err(on_stack)?;
                stack.save_var(off as usize, v).map_err(on_stack)?;
            }
            Instruction::LoadVarI(off) => {
                let v = stack.load_var::<Int>(off as usize).map_err(on_stack)?;
                stack.push(v).map_err(on_stack)?;
            }
            Instruction::LoadVarF(off) => {
                let v = stack.load_var::<Float>(off as usize).map_err(on_stack)?;
                stack.push(v).map_err(on_stack)?;
            }

            Instruction::Jump(target) => self.stream.jump(target),
            Instruction::CondJumpB(target) => {
                // pc is already past the operand
                if stack.pop::<bool>().map_err(on_stack)? {
                    self.stream.jump(target);
                }
            }
            Instruction::Call(target) => {
                let ret = Address::try_from(self.stream.pc()).map_err(|_| Fault::AddressOverflow { at })?;
                stack.push_return(ret).map_err(on_stack)?;
                self.stream.jump(target);
            }
            Instruction::Return => {
                let ret = stack.pop_return().map_err(on_stack)?;
                self.stream.jump(ret);
            }
            Instruction::CallExt(index) => {
                let Some(native) = self.natives.get_mut(index) else {
                    return Err(Fault::UnknownNative { at, index });
                };
                trace!(target: "hss::vm::dispatch", native = native.name(), "call_ext");
                native.call(stack).map_err(|err| Fault::Native {
                    at,
                    name: native.name().to_string(),
                    message: format!("{:#}", err),
                })?;
            }
        }
        Ok(())
    }
}
