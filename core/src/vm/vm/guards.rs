use std::ops::{Deref, DerefMut};

use tracing::warn;

use crate::vm::scalar::ValueType;
use crate::vm::stack::{OperandStack, StackError};

/// One frame slot allocated on an [`OperandStack`], released again on drop.
///
/// Hosts and natives use this instead of pairing `alloc_var`/`dealloc_var` by hand, so
/// the slot is released on every exit path. The guard derefs to the stack; the slot is
/// at frame offset 0 as long as nothing else is allocated on top of it.
///
/// The slot is only released when the frame is back at the length the guard left it
/// at. Otherwise the frame is left untouched: the top bytes belong to someone else.
pub struct FrameGuard<'a> {
    stack: &'a mut OperandStack,
    width: usize,
    frame_len: usize,
}

impl<'a> FrameGuard<'a> {
    pub(crate) fn new(stack: &'a mut OperandStack, ty: ValueType) -> Result<Self, StackError> {
        let width = ty.width();
        stack.alloc_var(width)?;
        let frame_len = stack.frame_len();
        Ok(Self {
            stack,
            width,
            frame_len,
        })
    }

    /// Frame offset of the guarded slot relative to the current reverse pointer.
    pub fn offset(&self) -> usize {
        self.stack.frame_len() - self.frame_len
    }
}

impl Deref for FrameGuard<'_> {
    type Target = OperandStack;

    fn deref(&self) -> &OperandStack {
        self.stack
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut OperandStack {
        self.stack
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        let current = self.stack.frame_len();
        if current != self.frame_len {
            warn!(
                target: "hss::vm::alloc",
                expected = self.frame_len,
                current,
                "frame_guard.unbalanced"
            );
            return;
        }
        let _ = self.stack.dealloc_var(self.width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_is_released_on_drop() {
        let mut stack = OperandStack::new(16).unwrap();
        {
            let mut slot = stack.frame(ValueType::Int).unwrap();
            slot.save_var::<i16>(0, 9).unwrap();
            assert_eq!(slot.load_var::<i16>(0).unwrap(), 9);
            assert_eq!(slot.frame_len(), 2);
        }
        assert_eq!(stack.frame_len(), 0);
    }

    #[test]
    fn nested_guards_unwind_in_order() {
        let mut stack = OperandStack::new(16).unwrap();
        let mut outer = stack.frame(ValueType::Float).unwrap();
        outer.save_var::<f32>(0, 1.25).unwrap();
        {
            let mut inner = outer.frame(ValueType::Int).unwrap();
            inner.save_var::<i16>(0, 3).unwrap();
            assert_eq!(inner.load_var::<f32>(2).unwrap(), 1.25);
        }
        assert_eq!(outer.offset(), 0);
        assert_eq!(outer.frame_len(), 4);
        drop(outer);
        assert_eq!(stack.frame_len(), 0);
    }

    #[test]
    fn unbalanced_frames_are_left_alone() {
        let mut stack = OperandStack::new(16).unwrap();
        {
            let mut slot = stack.frame(ValueType::Int).unwrap();
            slot.alloc_var(4).unwrap();
            assert_eq!(slot.offset(), 4);
        }
        assert_eq!(stack.frame_len(), 6);
        stack.dealloc_var(6).unwrap();

        stack.alloc_var(2).unwrap();
        {
            let mut slot = stack.frame(ValueType::Int).unwrap();
            slot.dealloc_var(4).unwrap();
            slot.alloc_var(1).unwrap();
        }
        assert_eq!(stack.frame_len(), 1);
    }

    #[test]
    fn allocation_failure_is_reported() {
        let mut stack = OperandStack::new(1).unwrap();
        assert!(matches!(
            stack.frame(ValueType::Int),
            Err(StackError::FrameOverflow { .. })
        ));
    }
}
