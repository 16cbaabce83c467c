use anyhow::{Result, bail};

use super::alloc::MemoryRegion;
use super::bytecode::{DecodeError, Instruction};
use super::scalar::Address;

/// Encoded instructions plus the program counter.
///
/// The region cursor is the program counter. During execution only the cursor
/// moves; the bytes are written once, either by adopting a prepared buffer or by
/// emitting into a [`writable`](InstructionStream::writable) stream and sealing it.
#[derive(Debug, Clone)]
pub struct InstructionStream {
    code: MemoryRegion,
}

impl InstructionStream {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            code: MemoryRegion::from_bytes(bytes),
        }
    }

    /// Fresh zeroed stream for in-place emission; call [`seal`](Self::seal) when done.
    pub fn writable(capacity: usize) -> Result<Self> {
        Ok(Self {
            code: MemoryRegion::create(capacity)?,
        })
    }

    /// Append one instruction at the cursor and return its address.
    pub fn emit(&mut self, ins: Instruction) -> Result<Address> {
        let at = self.code.cursor();
        let Ok(addr) = Address::try_from(at) else {
            bail!("instruction at byte {} is beyond the addressable range", at);
        };
        let mut encoded = Vec::with_capacity(ins.encoded_len());
        ins.encode_into(&mut encoded);
        if at + encoded.len() > self.code.end() {
            bail!(
                "instruction stream full: {} needs {} bytes, {} left",
                ins,
                encoded.len(),
                self.code.end() - at
            );
        }
        for byte in encoded {
            // capacity checked above
            let _ = self.code.store_fwd(byte);
        }
        Ok(addr)
    }

    /// Append one raw byte at the cursor.
    pub fn emit_byte(&mut self, byte: u8) -> Result<()> {
        if self.code.store_fwd(byte).is_none() {
            bail!("instruction stream full at byte {}", self.code.cursor());
        }
        Ok(())
    }

    /// Finish emission: the stream ends at the last emitted byte and the pc rewinds.
    pub fn seal(&mut self) {
        self.code.seal();
    }

    #[inline]
    pub fn pc(&self) -> usize {
        self.code.cursor()
    }

    /// Move the program counter. Targets at or past the end clamp to the end, which
    /// the dispatch loop treats as normal termination.
    #[inline]
    pub fn jump(&mut self, target: Address) {
        let at = (target as usize).min(self.code.end());
        let _ = self.code.set_cursor(at);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.code.end()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.end() == 0
    }

    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.code.cursor() >= self.code.end()
    }

    /// Decode the instruction at the program counter and step past it.
    #[inline]
    pub fn fetch(&mut self) -> Result<Instruction, DecodeError> {
        Instruction::decode(&mut self.code)
    }

    pub fn rewind(&mut self) {
        let _ = self.code.set_cursor(0);
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.code.as_bytes()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.code.into_bytes()
    }
}

impl From<Vec<u8>> for InstructionStream {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl FromIterator<Instruction> for InstructionStream {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> Self {
        let mut bytes = Vec::new();
        for ins in iter {
            ins.encode_into(&mut bytes);
        }
        Self::from_bytes(bytes)
    }
}
