use std::fmt;

use anyhow::Result;

use super::alloc::MemoryRegion;
use super::scalar::{Address, Float, Int, Scalar, Value, ValueType};
use super::vm::FrameGuard;

/// Capacity or addressing violation on the operand stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    /// A push would run into the variable frame.
    Overflow { needed: usize, free: usize },
    /// A pop found fewer bytes on the evaluation side than the value needs.
    Underflow { needed: usize, available: usize },
    /// A frame allocation would run into the evaluation stack.
    FrameOverflow { needed: usize, free: usize },
    /// A frame deallocation would move past the top of the region.
    FrameUnderflow { needed: usize, available: usize },
    /// A frame-relative access points outside the allocated frame.
    SlotOutOfBounds { offset: usize, width: usize, frame_len: usize },
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackError::Overflow { needed, free } => {
                write!(f, "evaluation stack overflow: need {} bytes, {} free", needed, free)
            }
            StackError::Underflow { needed, available } => {
                write!(f, "evaluation stack underflow: need {} bytes, {} on stack", needed, available)
            }
            StackError::FrameOverflow { needed, free } => {
                write!(f, "variable frame overflow: need {} bytes, {} free", needed, free)
            }
            StackError::FrameUnderflow { needed, available } => {
                write!(f, "variable frame underflow: release {} bytes, {} allocated", needed, available)
            }
            StackError::SlotOutOfBounds {
                offset,
                width,
                frame_len,
            } => write!(
                f,
                "frame slot {}..{} outside the {} byte frame",
                offset,
                offset + width,
                frame_len
            ),
        }
    }
}

impl std::error::Error for StackError {}

/// One region holding two stacks that grow toward each other.
///
/// The evaluation stack grows forward from index 0 (`base.cursor` is its top). The
/// variable frame grows backward from `base.end`; `reverse` is its lowest allocated
/// byte and frame slots are addressed as `reverse + offset`. The two cursors never
/// cross: `base.cursor <= reverse`.
#[derive(Debug)]
pub struct OperandStack {
    base: MemoryRegion,
    reverse: usize,
}

impl OperandStack {
    pub fn new(size: usize) -> Result<Self> {
        let base = MemoryRegion::create(size)?;
        let reverse = base.end();
        Ok(Self { base, reverse })
    }

    #[inline]
    fn check_invariant(&self) {
        debug_assert!(
            self.base.cursor() <= self.reverse && self.reverse <= self.base.end(),
            "operand stack cursors crossed: low={} high={} end={}",
            self.base.cursor(),
            self.reverse,
            self.base.end()
        );
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.base.end()
    }

    /// Bytes in use on the evaluation side.
    #[inline]
    pub fn eval_len(&self) -> usize {
        self.base.cursor()
    }

    /// Bytes in use on the frame side.
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.base.end() - self.reverse
    }

    #[inline]
    pub fn free(&self) -> usize {
        self.reverse - self.base.cursor()
    }

    /// Index of the lowest allocated frame byte (`base.end()` when the frame is empty).
    #[inline]
    pub fn reverse_pointer(&self) -> usize {
        self.reverse
    }

    #[inline]
    pub fn push<T: Scalar>(&mut self, value: T) -> Result<(), StackError> {
        let overflow = StackError::Overflow {
            needed: T::WIDTH,
            free: self.free(),
        };
        if T::WIDTH > self.free() {
            return Err(overflow);
        }
        self.base.store_fwd(value).ok_or(overflow)?;
        self.check_invariant();
        Ok(())
    }

    #[inline]
    pub fn pop<T: Scalar>(&mut self) -> Result<T, StackError> {
        let value = self.base.load_fwd::<T>().ok_or(StackError::Underflow {
            needed: T::WIDTH,
            available: self.eval_len(),
        })?;
        self.check_invariant();
        Ok(value)
    }

    /// Read the top evaluation value without popping it.
    pub fn peek<T: Scalar>(&self) -> Result<T, StackError> {
        let underflow = StackError::Underflow {
            needed: T::WIDTH,
            available: self.eval_len(),
        };
        let at = self.eval_len().checked_sub(T::WIDTH).ok_or(underflow)?;
        self.base.load(at).ok_or(underflow)
    }

    /// Read the top evaluation value as `ty`.
    pub fn peek_value(&self, ty: ValueType) -> Result<Value, StackError> {
        Ok(match ty {
            ValueType::Int => Value::Int(self.peek::<Int>()?),
            ValueType::Float => Value::Float(self.peek::<Float>()?),
            ValueType::Bool => Value::Bool(self.peek::<bool>()?),
        })
    }

    /// Fixed-position read from the start of the region (evaluation stack bottom).
    pub fn load_at<T: Scalar>(&self, at: usize) -> Option<T> {
        self.base.load(at)
    }

    /// Reserve `width` bytes on the frame side.
    #[inline]
    pub fn alloc_var(&mut self, width: usize) -> Result<(), StackError> {
        if width > self.free() {
            return Err(StackError::FrameOverflow {
                needed: width,
                free: self.free(),
            });
        }
        self.reverse -= width;
        self.check_invariant();
        Ok(())
    }

    /// Release `width` bytes on the frame side.
    #[inline]
    pub fn dealloc_var(&mut self, width: usize) -> Result<(), StackError> {
        if width > self.frame_len() {
            return Err(StackError::FrameUnderflow {
                needed: width,
                available: self.frame_len(),
            });
        }
        self.reverse += width;
        self.check_invariant();
        Ok(())
    }

    #[inline]
    fn slot(&self, offset: usize, width: usize) -> Result<usize, StackError> {
        if offset + width > self.frame_len() {
            return Err(StackError::SlotOutOfBounds {
                offset,
                width,
                frame_len: self.frame_len(),
            });
        }
        Ok(self.reverse + offset)
    }

    /// Fixed-position store at `reverse + offset`; the frame cursor does not move.
    #[inline]
    pub fn save_var<T: Scalar>(&mut self, offset: usize, value: T) -> Result<(), StackError> {
        let at = self.slot(offset, T::WIDTH)?;
        self.base.store(at, value).ok_or(StackError::SlotOutOfBounds {
            offset,
            width: T::WIDTH,
            frame_len: self.frame_len(),
        })
    }

    #[inline]
    pub fn load_var<T: Scalar>(&self, offset: usize) -> Result<T, StackError> {
        let at = self.slot(offset, T::WIDTH)?;
        self.base.load(at).ok_or(StackError::SlotOutOfBounds {
            offset,
            width: T::WIDTH,
            frame_len: self.frame_len(),
        })
    }

    /// Allocate an address slot on the frame side and fill it.
    pub fn push_return(&mut self, address: Address) -> Result<(), StackError> {
        self.alloc_var(Address::WIDTH)?;
        self.save_var(0, address)
    }

    /// Read the address at the frame top and release its slot.
    pub fn pop_return(&mut self) -> Result<Address, StackError> {
        let address = self.load_var::<Address>(0).map_err(|_| StackError::FrameUnderflow {
            needed: Address::WIDTH,
            available: self.frame_len(),
        })?;
        self.dealloc_var(Address::WIDTH)?;
        Ok(address)
    }

    /// Allocate one slot of `ty` that is released when the guard drops.
    pub fn frame(&mut self, ty: ValueType) -> Result<FrameGuard<'_>, StackError> {
        FrameGuard::new(self, ty)
    }

    /// Drop every value and slot.
    pub fn clear(&mut self) {
        let _ = self.base.set_cursor(0);
        self.reverse = self.base.end();
    }
}
