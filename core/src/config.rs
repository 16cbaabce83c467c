//! Host-side VM configuration, loaded from TOML.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// Largest operand stack a VM accepts. Addresses on the stack are 16 bits wide.
pub const MAX_DATA_STACK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    /// Operand stack size in bytes, shared by the evaluation and frame sides.
    pub data_stack_size: usize,
    /// Instructions per `process_instructions` call in the run drivers.
    pub batch_size: usize,
    pub max_steps: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            data_stack_size: 1024,
            batch_size: 256,
            max_steps: None,
        }
    }
}

impl VmConfig {
    pub fn from_toml_str(src: &str) -> Result<Self> {
        let config: VmConfig = toml::from_str(src).context("failed to parse VM config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.data_stack_size > 0, "data_stack_size must be non-zero");
        ensure!(
            self.data_stack_size <= MAX_DATA_STACK_SIZE,
            "data_stack_size {} exceeds the maximum of {} bytes",
            self.data_stack_size,
            MAX_DATA_STACK_SIZE
        );
        ensure!(self.batch_size > 0, "batch_size must be non-zero");
        ensure!(self.max_steps != Some(0), "max_steps must be non-zero when set");
        Ok(())
    }
}
