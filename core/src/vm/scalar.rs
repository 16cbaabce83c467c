//! Fixed-width value encoding shared by the instruction stream and the operand stack.
//!
//! Every value the VM touches is one of a handful of plain scalars that are stored by
//! raw byte copy, with no tags and no alignment. Multi-byte values are little-endian.

use std::fmt;

/// Signed 16-bit integer, the language `int`.
pub type Int = i16;
/// IEEE 754 single precision, the language `float`.
pub type Float = f32;
/// Byte offset from the start of the instruction stream.
pub type Address = u16;

/// Width and byte layout of a value stored in a [`MemoryRegion`](super::MemoryRegion).
pub trait Scalar: Copy + fmt::Debug {
    const WIDTH: usize;

    /// Decode from exactly `WIDTH` bytes.
    fn read_from(bytes: &[u8]) -> Self;

    /// Encode into exactly `WIDTH` bytes.
    fn write_to(self, bytes: &mut [u8]);
}

macro_rules! impl_le_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn read_from(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::WIDTH]);
                    <$ty>::from_le_bytes(raw)
                }

                #[inline]
                fn write_to(self, bytes: &mut [u8]) {
                    bytes[..Self::WIDTH].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_le_scalar!(i16, u16, f32, u8);

impl Scalar for bool {
    const WIDTH: usize = 1;

    #[inline]
    fn read_from(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    #[inline]
    fn write_to(self, bytes: &mut [u8]) {
        bytes[0] = self as u8;
    }
}

/// Static type of a language value, as seen by the compiler and the native signatures.
///
/// Return addresses live on the evaluation stack too but never as language values;
/// the VM moves them as raw [`Address`] scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int,
    Float,
    Bool,
}

impl ValueType {
    pub const fn width(self) -> usize {
        match self {
            ValueType::Int => Int::WIDTH,
            ValueType::Float => Float::WIDTH,
            ValueType::Bool => bool::WIDTH,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
        }
    }

    /// Tag used by the `HSSB` container.
    pub const fn tag(self) -> u8 {
        match self {
            ValueType::Int => 1,
            ValueType::Float => 2,
            ValueType::Bool => 3,
        }
    }

    pub const fn from_tag(tag: u8) -> Option<ValueType> {
        match tag {
            1 => Some(ValueType::Int),
            2 => Some(ValueType::Float),
            3 => Some(ValueType::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed value read back from the operand stack, e.g. a program result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(Int),
    Float(Float),
    Bool(bool),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Bool(_) => ValueType::Bool,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Bool(v) => write!(f, "{}", v),
        }
    }
}
