use std::fmt;

use anyhow::{Result, bail};
use rustc_hash::FxHashMap;
use tracing::debug;

use super::scalar::ValueType;
use super::stack::OperandStack;

/// Host function reachable through `CALL_EXT`.
///
/// Natives pop their arguments (last argument on top) and push their result, if any.
pub type NativeFn = Box<dyn FnMut(&mut OperandStack) -> Result<()>>;

/// Largest table size addressable by the one-byte `CALL_EXT` operand.
pub const MAX_NATIVES: usize = u8::MAX as usize + 1;

/// Static shape of a native, used by the compiler to type-check calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeSignature {
    pub params: Vec<ValueType>,
    pub ret: Option<ValueType>,
}

impl NativeSignature {
    pub fn new(params: impl Into<Vec<ValueType>>, ret: Option<ValueType>) -> Self {
        Self {
            params: params.into(),
            ret,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for NativeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", p)?;
        }
        f.write_str(")")?;
        if let Some(ret) = self.ret {
            write!(f, " -> {}", ret)?;
        }
        Ok(())
    }
}

/// A native as a compiled program refers to it: table slot `i` must hold this name and shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeImport {
    pub name: String,
    pub signature: NativeSignature,
}

impl NativeImport {
    pub fn new(name: impl Into<String>, signature: NativeSignature) -> Self {
        Self {
            name: name.into(),
            signature,
        }
    }
}

impl fmt::Display for NativeImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.signature)
    }
}

pub struct NativeEntry {
    name: String,
    signature: NativeSignature,
    func: NativeFn,
}

impl NativeEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &NativeSignature {
        &self.signature
    }

    pub(crate) fn call(&mut self, stack: &mut OperandStack) -> Result<()> {
        (self.func)(stack)
    }
}

impl fmt::Debug for NativeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeEntry")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Ordered index -> native mapping. Indices are assigned in registration order.
#[derive(Default)]
pub struct NativeTable {
    entries: Vec<NativeEntry>,
    by_name: FxHashMap<String, u8>,
}

impl NativeTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_name: FxHashMap::default(),
        }
    }

    /// Append a native and return its `CALL_EXT` index.
    pub fn register<F>(&mut self, name: impl Into<String>, signature: NativeSignature, func: F) -> Result<u8>
    where
        F: FnMut(&mut OperandStack) -> Result<()> + 'static,
    {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            bail!("native '{}' is already registered", name);
        }
        if self.entries.len() >= MAX_NATIVES {
            bail!("native table is full ({} entries)", MAX_NATIVES);
        }
        let index = self.entries.len() as u8;
        debug!(target: "hss::vm", native = %name, index, signature = %signature, "native.register");
        self.by_name.insert(name.clone(), index);
        self.entries.push(NativeEntry {
            name,
            signature,
            func: Box::new(func),
        });
        Ok(index)
    }

    pub fn lookup(&self, name: &str) -> Option<(u8, &NativeSignature)> {
        let index = *self.by_name.get(name)?;
        Some((index, &self.entries[index as usize].signature))
    }

    pub fn get(&self, index: u8) -> Option<&NativeEntry> {
        self.entries.get(index as usize)
    }

    pub(crate) fn get_mut(&mut self, index: u8) -> Option<&mut NativeEntry> {
        self.entries.get_mut(index as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names in index order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Leading `count` entries as the compiler records them.
    pub fn imports(&self, count: usize) -> Vec<NativeImport> {
        self.entries
            .iter()
            .take(count)
            .map(|e| NativeImport::new(e.name.clone(), e.signature.clone()))
            .collect()
    }

    /// Check that `expected[i]` is registered at index `i` with the same signature.
    pub fn ensure_layout(&self, expected: &[NativeImport]) -> Result<()> {
        for (i, import) in expected.iter().enumerate() {
            let Some(entry) = self.entries.get(i) else {
                bail!("native #{} ('{}') is not registered", i, import.name);
            };
            if entry.name != import.name {
                bail!("native #{} is '{}' but the module expects '{}'", i, entry.name, import.name);
            }
            if entry.signature != import.signature {
                bail!(
                    "native '{}' has signature {} but the module expects {}",
                    entry.name,
                    entry.signature,
                    import.signature
                );
            }
        }
        Ok(())
    }
}

impl fmt::Debug for NativeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}
