use anyhow::{Result, anyhow};
use tracing::trace;

use super::scalar::Scalar;

/// Contiguous owned byte buffer with a movable cursor.
///
/// `start` is always index 0; the region guarantees `0 <= cursor <= end <= bytes.len()`.
/// Cursor helpers never move past either bound: they return `None` instead and leave the
/// cursor untouched, so callers decide how the violation is reported.
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    bytes: Box<[u8]>,
    end: usize,
    cursor: usize,
}

impl MemoryRegion {
    /// Allocate a zeroed region of `size` bytes with the cursor at its start.
    pub fn create(size: usize) -> Result<Self> {
        let mut buf: Vec<u8> = Vec::new();
        buf.try_reserve_exact(size)
            .map_err(|err| anyhow!("failed to allocate {} byte region: {}", size, err))?;
        buf.resize(size, 0);
        trace!(target: "hss::vm::alloc", bytes = size, "memory_region.create");
        Ok(Self {
            bytes: buf.into_boxed_slice(),
            end: size,
            cursor: 0,
        })
    }

    /// Adopt an already prepared buffer; `end` covers the whole buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let end = bytes.len();
        Self {
            bytes: bytes.into_boxed_slice(),
            end,
            cursor: 0,
        }
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes backing the region, including any tail past `end` left over from emission.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    /// Move the cursor; rejected when it would leave `[0, end]`.
    #[inline]
    pub fn set_cursor(&mut self, at: usize) -> Option<()> {
        if at > self.end {
            return None;
        }
        self.cursor = at;
        Some(())
    }

    /// Finish emission: everything written so far becomes the region, cursor rewinds.
    pub fn seal(&mut self) {
        self.end = self.cursor;
        self.cursor = 0;
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.end]
    }

    pub fn into_bytes(self) -> Vec<u8> {
        let mut bytes = self.bytes.into_vec();
        bytes.truncate(self.end);
        bytes
    }

    /// Fixed-position read; no cursor movement.
    #[inline]
    pub fn load<T: Scalar>(&self, at: usize) -> Option<T> {
        let slot = self.bytes[..self.end].get(at..at.checked_add(T::WIDTH)?)?;
        Some(T::read_from(slot))
    }

    /// Fixed-position write; no cursor movement.
    #[inline]
    pub fn store<T: Scalar>(&mut self, at: usize, value: T) -> Option<()> {
        let slot = self.bytes[..self.end].get_mut(at..at.checked_add(T::WIDTH)?)?;
        value.write_to(slot);
        Some(())
    }

    /// Push: write at the cursor, then advance it by the value width.
    #[inline]
    pub fn store_fwd<T: Scalar>(&mut self, value: T) -> Option<()> {
        self.store(self.cursor, value)?;
        self.cursor += T::WIDTH;
        Some(())
    }

    /// Pop: retreat the cursor by the value width, then read.
    #[inline]
    pub fn load_fwd<T: Scalar>(&mut self) -> Option<T> {
        let at = self.cursor.checked_sub(T::WIDTH)?;
        let value = self.load(at)?;
        self.cursor = at;
        Some(value)
    }

    /// Operand fetch: read at the cursor, then advance past the value.
    #[inline]
    pub fn read_advance<T: Scalar>(&mut self) -> Option<T> {
        let value = self.load(self.cursor)?;
        self.cursor += T::WIDTH;
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_zeroes_and_starts_at_zero() {
        let region = MemoryRegion::create(16).expect("alloc");
        assert_eq!(region.cursor(), 0);
        assert_eq!(region.end(), 16);
        assert!(region.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn forward_helpers_are_lifo() {
        let mut region = MemoryRegion::create(8).expect("alloc");
        region.store_fwd::<i16>(7).unwrap();
        region.store_fwd::<f32>(1.5).unwrap();
        assert_eq!(region.cursor(), 6);
        assert_eq!(region.load_fwd::<f32>(), Some(1.5));
        assert_eq!(region.load_fwd::<i16>(), Some(7));
        assert_eq!(region.cursor(), 0);
        assert_eq!(region.load_fwd::<i16>(), None);
    }

    #[test]
    fn store_past_end_is_rejected_without_moving_cursor() {
        let mut region = MemoryRegion::create(3).expect("alloc");
        region.store_fwd::<i16>(1).unwrap();
        assert_eq!(region.store_fwd::<i16>(2), None);
        assert_eq!(region.cursor(), 2);
        assert_eq!(region.set_cursor(4), None);
    }

    #[test]
    fn seal_shrinks_to_written_bytes() {
        let mut region = MemoryRegion::create(32).expect("alloc");
        region.store_fwd::<u8>(9).unwrap();
        region.store_fwd::<i16>(300).unwrap();
        region.seal();
        assert_eq!(region.end(), 3);
        assert_eq!(region.cursor(), 0);
        assert_eq!(region.capacity(), 32);
        assert_eq!(region.read_advance::<u8>(), Some(9));
        assert_eq!(region.read_advance::<i16>(), Some(300));
        assert_eq!(region.read_advance::<u8>(), None);
        assert_eq!(region.into_bytes(), vec![9, 0x2C, 0x01]);
    }

    #[test]
    fn huge_allocation_reports_error() {
        let err = MemoryRegion::create(usize::MAX).unwrap_err();
        assert!(err.to_string().contains("failed to allocate"));
    }
}
