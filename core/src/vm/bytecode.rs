use std::fmt;

use anyhow::{Result, anyhow};

use super::alloc::MemoryRegion;
use super::scalar::{Address, Float, Int, Scalar};

/// Opcode byte values. The numbering is the wire format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Noop = 0,
    AddI,
    AddF,
    SubtractI,
    SubtractF,
    MultiplyI,
    MultiplyF,
    DivideI,
    DivideF,
    LiteralI,
    LiteralF,
    LiteralB,
    NegateB,
    AndB,
    OrB,
    CmpIEq,
    CmpILess,
    CmpILessEq,
    CmpFEq,
    CmpFLess,
    CmpFLessEq,
    AllocVarI,
    AllocVarF,
    DeallocVarI,
    DeallocVarF,
    SaveVarI,
    SaveVarF,
    LoadVarI,
    LoadVarF,
    Jump,
    CondJumpB,
    Call,
    Return,
    CallExt,
}

const OPCODES: [Opcode; 34] = [
    Opcode::Noop,
    Opcode::AddI,
    Opcode::AddF,
    Opcode::SubtractI,
    Opcode::SubtractF,
    Opcode::MultiplyI,
    Opcode::MultiplyF,
    Opcode::DivideI,
    Opcode::DivideF,
    Opcode::LiteralI,
    Opcode::LiteralF,
    Opcode::LiteralB,
    Opcode::NegateB,
    Opcode::AndB,
    Opcode::OrB,
    Opcode::CmpIEq,
    Opcode::CmpILess,
    Opcode::CmpILessEq,
    Opcode::CmpFEq,
    Opcode::CmpFLess,
    Opcode::CmpFLessEq,
    Opcode::AllocVarI,
    Opcode::AllocVarF,
    Opcode::DeallocVarI,
    Opcode::DeallocVarF,
    Opcode::SaveVarI,
    Opcode::SaveVarF,
    Opcode::LoadVarI,
    Opcode::LoadVarF,
    Opcode::Jump,
    Opcode::CondJumpB,
    Opcode::Call,
    Opcode::Return,
    Opcode::CallExt,
];

impl Opcode {
    #[inline]
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        OPCODES.get(byte as usize).copied()
    }

    /// Total width of the immediates following the opcode byte.
    pub const fn operand_width(self) -> usize {
        match self {
            Opcode::LiteralI => Int::WIDTH,
            Opcode::LiteralF => Float::WIDTH,
            Opcode::LiteralB => bool::WIDTH,
            Opcode::SaveVarI | Opcode::SaveVarF | Opcode::LoadVarI | Opcode::LoadVarF | Opcode::CallExt => 1,
            Opcode::Jump | Opcode::CondJumpB | Opcode::Call => Address::WIDTH,
            _ => 0,
        }
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Noop => "NOOP",
            Opcode::AddI => "ADD_I",
            Opcode::AddF => "ADD_F",
            Opcode::SubtractI => "SUBTRACT_I",
            Opcode::SubtractF => "SUBTRACT_F",
            Opcode::MultiplyI => "MULTIPLY_I",
            Opcode::MultiplyF => "MULTIPLY_F",
            Opcode::DivideI => "DIVIDE_I",
            Opcode::DivideF => "DIVIDE_F",
            Opcode::LiteralI => "LITERAL_I",
            Opcode::LiteralF => "LITERAL_F",
            Opcode::LiteralB => "LITERAL_B",
            Opcode::NegateB => "NEGATE_B",
            Opcode::AndB => "AND_B",
            Opcode::OrB => "OR_B",
            Opcode::CmpIEq => "CMP_I_EQ",
            Opcode::CmpILess => "CMP_I_LESS",
            Opcode::CmpILessEq => "CMP_I_LESS_EQ",
            Opcode::CmpFEq => "CMP_F_EQ",
            Opcode::CmpFLess => "CMP_F_LESS",
            Opcode::CmpFLessEq => "CMP_F_LESS_EQ",
            Opcode::AllocVarI => "ALLOC_VAR_I",
            Opcode::AllocVarF => "ALLOC_VAR_F",
            Opcode::DeallocVarI => "DEALLOC_VAR_I",
            Opcode::DeallocVarF => "DEALLOC_VAR_F",
            Opcode::SaveVarI => "SAVE_VAR_I",
            Opcode::SaveVarF => "SAVE_VAR_F",
            Opcode::LoadVarI => "LOAD_VAR_I",
            Opcode::LoadVarF => "LOAD_VAR_F",
            Opcode::Jump => "JUMP",
            Opcode::CondJumpB => "COND_JUMP_B",
            Opcode::Call => "CALL",
            Opcode::Return => "RETURN",
            Opcode::CallExt => "CALL_EXT",
        }
    }
}

/// A decoded instruction together with its immediates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    Noop,
    AddI,
    AddF,
    SubtractI,
    SubtractF,
    MultiplyI,
    MultiplyF,
    DivideI,
    DivideF,
    LiteralI(Int),
    LiteralF(Float),
    LiteralB(bool),
    NegateB,
    AndB,
    OrB,
    CmpIEq,
    CmpILess,
    CmpILessEq,
    CmpFEq,
    CmpFLess,
    CmpFLessEq,
    AllocVarI,
    AllocVarF,
    DeallocVarI,
    DeallocVarF,
    // Frame offset relative to the reverse pointer
    SaveVarI(u8),
    SaveVarF(u8),
    LoadVarI(u8),
    LoadVarF(u8),
    Jump(Address),
    CondJumpB(Address),
    Call(Address),
    Return,
    // Native table index
    CallExt(u8),
}

/// Why the bytes at the program counter do not form an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    UnknownOpcode(u8),
    TruncatedOperand(Opcode),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownOpcode(byte) => write!(f, "unrecognized opcode 0x{:02X}", byte),
            DecodeError::TruncatedOperand(op) => {
                write!(f, "{} operand runs past the end of the instruction stream", op.mnemonic())
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Noop => Opcode::Noop,
            Instruction::AddI => Opcode::AddI,
            Instruction::AddF => Opcode::AddF,
            Instruction::SubtractI => Opcode::SubtractI,
            Instruction::SubtractF => Opcode::SubtractF,
            Instruction::MultiplyI => Opcode::MultiplyI,
            Instruction::MultiplyF => Opcode::MultiplyF,
            Instruction::DivideI => Opcode::DivideI,
            Instruction::DivideF => Opcode::DivideF,
            Instruction::LiteralI(_) => Opcode::LiteralI,
            Instruction::LiteralF(_) => Opcode::LiteralF,
            Instruction::LiteralB(_) => Opcode::LiteralB,
            Instruction::NegateB => Opcode::NegateB,
            Instruction::AndB => Opcode::AndB,
            Instruction::OrB => Opcode::OrB,
            Instruction::CmpIEq => Opcode::CmpIEq,
            Instruction::CmpILess => Opcode::CmpILess,
            Instruction::CmpILessEq => Opcode::CmpILessEq,
            Instruction::CmpFEq => Opcode::CmpFEq,
            Instruction::CmpFLess => Opcode::CmpFLess,
            Instruction::CmpFLessEq => Opcode::CmpFLessEq,
            Instruction::AllocVarI => Opcode::AllocVarI,
            Instruction::AllocVarF => Opcode::AllocVarF,
            Instruction::DeallocVarI => Opcode::DeallocVarI,
            Instruction::DeallocVarF => Opcode::DeallocVarF,
            Instruction::SaveVarI(_) => Opcode::SaveVarI,
            Instruction::SaveVarF(_) => Opcode::SaveVarF,
            Instruction::LoadVarI(_) => Opcode::LoadVarI,
            Instruction::LoadVarF(_) => Opcode::LoadVarF,
            Instruction::Jump(_) => Opcode::Jump,
            Instruction::CondJumpB(_) => Opcode::CondJumpB,
            Instruction::Call(_) => Opcode::Call,
            Instruction::Return => Opcode::Return,
            Instruction::CallExt(_) => Opcode::CallExt,
        }
    }

    #[inline]
    pub fn encoded_len(&self) -> usize {
        1 + self.opcode().operand_width()
    }

    /// Append the wire encoding: opcode byte, then immediates with no padding.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.opcode() as u8);
        match *self {
            Instruction::LiteralI(v) => push_scalar(out, v),
            Instruction::LiteralF(v) => push_scalar(out, v),
            Instruction::LiteralB(v) => push_scalar(out, v),
            Instruction::SaveVarI(off)
            | Instruction::SaveVarF(off)
            | Instruction::LoadVarI(off)
            | Instruction::LoadVarF(off)
            | Instruction::CallExt(off) => out.push(off),
            Instruction::Jump(addr) | Instruction::CondJumpB(addr) | Instruction::Call(addr) => push_scalar(out, addr),
            _ => {}
        }
    }

    /// Decode the instruction at the region cursor, advancing it past the opcode and its
    /// immediates. On an unknown opcode the cursor is left just past the bad byte.
    pub fn decode(code: &mut MemoryRegion) -> Result<Instruction, DecodeError> {
        let byte = code.read_advance::<u8>().ok_or(DecodeError::UnknownOpcode(0))?;
        let op = Opcode::from_byte(byte).ok_or(DecodeError::UnknownOpcode(byte))?;
        let truncated = DecodeError::TruncatedOperand(op);
        let ins = match op {
            Opcode::Noop => Instruction::Noop,
            Opcode::AddI => Instruction::AddI,
            Opcode::AddF => Instruction::AddF,
            Opcode::SubtractI => Instruction::SubtractI,
            Opcode::SubtractF => Instruction::SubtractF,
            Opcode::MultiplyI => Instruction::MultiplyI,
            Opcode::MultiplyF => Instruction::MultiplyF,
            Opcode::DivideI => Instruction::DivideI,
            Opcode::DivideF => Instruction::DivideF,
            Opcode::LiteralI => Instruction::LiteralI(code.read_advance().ok_or(truncated)?),
            Opcode::LiteralF => Instruction::LiteralF(code.read_advance().ok_or(truncated)?),
            Opcode::LiteralB => Instruction::LiteralB(code.read_advance().ok_or(truncated)?),
            Opcode::NegateB => Instruction::NegateB,
            Opcode::AndB => Instruction::AndB,
            Opcode::OrB => Instruction::OrB,
            Opcode::CmpIEq => Instruction::CmpIEq,
            Opcode::CmpILess => Instruction::CmpILess,
            Opcode::CmpILessEq => Instruction::CmpILessEq,
            Opcode::CmpFEq => Instruction::CmpFEq,
            Opcode::CmpFLess => Instruction::CmpFLess,
            Opcode::CmpFLessEq => Instruction::CmpFLessEq,
            Opcode::AllocVarI => Instruction::AllocVarI,
            Opcode::AllocVarF => Instruction::AllocVarF,
            Opcode::DeallocVarI => Instruction::DeallocVarI,
            Opcode::DeallocVarF => Instruction::DeallocVarF,
            Opcode::SaveVarI => Instruction::SaveVarI(code.read_advance().ok_or(truncated)?),
            Opcode::SaveVarF => Instruction::SaveVarF(code.read_advance().ok_or(truncated)?),
            Opcode::LoadVarI => Instruction::LoadVarI(code.read_advance().ok_or(truncated)?),
            Opcode::LoadVarF => Instruction::LoadVarF(code.read_advance().ok_or(truncated)?),
            Opcode::Jump => Instruction::Jump(code.read_advance().ok_or(truncated)?),
            Opcode::CondJumpB => Instruction::CondJumpB(code.read_advance().ok_or(truncated)?),
            Opcode::Call => Instruction::Call(code.read_advance().ok_or(truncated)?),
            Opcode::Return => Instruction::Return,
            Opcode::CallExt => Instruction::CallExt(code.read_advance().ok_or(truncated)?),
        };
        Ok(ins)
    }
}

#[inline]
fn push_scalar<T: Scalar>(out: &mut Vec<u8>, value: T) {
    let start = out.len();
    out.resize(start + T::WIDTH, 0);
    value.write_to(&mut out[start..]);
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.opcode().mnemonic();
        match self {
            Instruction::LiteralI(v) => write!(f, "{} {}", name, v),
            Instruction::LiteralF(v) => write!(f, "{} {:?}", name, v),
            Instruction::LiteralB(v) => write!(f, "{} {}", name, v),
            Instruction::SaveVarI(off)
            | Instruction::SaveVarF(off)
            | Instruction::LoadVarI(off)
            | Instruction::LoadVarF(off) => write!(f, "{} +{}", name, off),
            Instruction::Jump(addr) | Instruction::CondJumpB(addr) | Instruction::Call(addr) => {
                write!(f, "{} @{:04X}", name, addr)
            }
            Instruction::CallExt(idx) => write!(f, "{} #{}", name, idx),
            _ => f.write_str(name),
        }
    }
}

/// Decode a whole instruction stream, pairing every instruction with its address.
pub fn disassemble(code: &[u8]) -> Result<Vec<(Address, Instruction)>> {
    let mut region = MemoryRegion::from_bytes(code.to_vec());
    let mut out = Vec::new();
    while region.cursor() < region.end() {
        let at = region.cursor();
        let ins = Instruction::decode(&mut region).map_err(|err| anyhow!("{} at @{:04X}", err, at))?;
        let addr = Address::try_from(at).map_err(|_| anyhow!("instruction at {} is not addressable", at))?;
        out.push((addr, ins));
    }
    Ok(out)
}

/// One instruction per line: `@ADDR  MNEMONIC operands`.
pub fn render_disassembly(code: &[u8]) -> Result<String> {
    let mut out = String::new();
    for (addr, ins) in disassemble(code)? {
        out.push_str(&format!("@{:04X}  {}\n", addr, ins));
    }
    Ok(out)
}
