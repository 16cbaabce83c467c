mod guards;
mod runtime;

use std::fmt;

use anyhow::{Context, Result, bail, ensure};
use tracing::debug;

use crate::config::VmConfig;
use crate::vm::bytecode::Opcode;
use crate::vm::native::NativeTable;
use crate::vm::stack::{OperandStack, StackError};
use crate::vm::stream::InstructionStream;

pub use guards::FrameGuard;

/// Why execution stopped abnormally. `at` is the address of the faulting instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    UnknownOpcode { at: usize, byte: u8 },
    TruncatedOperand { at: usize, opcode: Opcode },
    Stack { at: usize, error: StackError },
    DivideByZero { at: usize },
    /// A `CALL` whose return address does not fit an address operand.
    AddressOverflow { at: usize },
    UnknownNative { at: usize, index: u8 },
    Native { at: usize, name: String, message: String },
}

impl Fault {
    pub fn address(&self) -> usize {
        match self {
            Fault::UnknownOpcode { at, .. }
            | Fault::TruncatedOperand { at, .. }
            | Fault::Stack { at, .. }
            | Fault::DivideByZero { at }
            | Fault::AddressOverflow { at }
            | Fault::UnknownNative { at, .. }
            | Fault::Native { at, .. } => *at,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::UnknownOpcode { at, byte } => write!(f, "unrecognized opcode 0x{:02X} at @{:04X}", byte, at),
            Fault::TruncatedOperand { at, opcode } => {
                write!(f, "truncated {} operand at @{:04X}", opcode.mnemonic(), at)
            }
            Fault::Stack { at, error } => write!(f, "{} at @{:04X}", error, at),
            Fault::DivideByZero { at } => write!(f, "integer division by zero at @{:04X}", at),
            Fault::AddressOverflow { at } => write!(f, "return address out of range at @{:04X}", at),
            Fault::UnknownNative { at, index } => write!(f, "no native registered at index {} (@{:04X})", index, at),
            Fault::Native { at, name, message } => write!(f, "native '{}' failed at @{:04X}: {}", name, at, message),
        }
    }
}

impl std::error::Error for Fault {}

/// Run state of a [`Vm`]. Only a `Running` VM executes instructions.
#[derive(Debug, Clone, PartialEq)]
pub enum VmState {
    Running,
    /// The program counter reached the end of the stream.
    Halted,
    Faulted(Fault),
}

/// What the host gets back from [`Vm::teardown`].
#[derive(Debug, Default)]
pub struct Retained {
    pub instructions: Option<InstructionStream>,
    pub natives: Option<NativeTable>,
}

/// Stack machine over one instruction stream, one operand stack and one native table.
pub struct Vm {
    stream: InstructionStream,
    stack: OperandStack,
    natives: NativeTable,
    state: VmState,
    steps: u64,
}

impl Vm {
    /// Take ownership of `stream` and `natives` and allocate a `data_stack_size` byte operand stack.
    pub fn new(stream: InstructionStream, data_stack_size: usize, natives: NativeTable) -> Result<Self> {
        let stack = OperandStack::new(data_stack_size).context("failed to allocate operand stack")?;
        debug!(
            target: "hss::vm",
            code_bytes = stream.len(),
            stack_bytes = data_stack_size,
            natives = natives.len(),
            "vm.init"
        );
        Ok(Self {
            stream,
            stack,
            natives,
            state: VmState::Running,
            steps: 0,
        })
    }

    pub fn with_config(stream: InstructionStream, config: &VmConfig, natives: NativeTable) -> Result<Self> {
        config.validate()?;
        Self::new(stream, config.data_stack_size, natives)
    }

    pub fn state(&self) -> &VmState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, VmState::Running)
    }

    pub fn pc(&self) -> usize {
        self.stream.pc()
    }

    /// Instructions executed since construction or the last [`restart`](Self::restart).
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut OperandStack {
        &mut self.stack
    }

    pub fn stream(&self) -> &InstructionStream {
        &self.stream
    }

    pub fn natives(&self) -> &NativeTable {
        &self.natives
    }

    /// Rewind the program counter, clear the operand stack and resume `Running`.
    pub fn restart(&mut self) {
        self.stream.rewind();
        self.stack.clear();
        self.state = VmState::Running;
        self.steps = 0;
    }

    /// Drive [`process_instructions`](Self::process_instructions) until the VM stops.
    pub fn run(&mut self, batch: usize) -> Result<()> {
        self.run_with_budget(batch, None)
    }

    /// Like [`run`](Self::run), but give up once `max_steps` instructions ran without the
    /// program terminating. The check happens between batches.
    pub fn run_with_budget(&mut self, batch: usize, max_steps: Option<u64>) -> Result<()> {
        ensure!(batch > 0, "batch size must be non-zero");
        loop {
            let slice = match max_steps {
                Some(limit) => {
                    let left = limit.saturating_sub(self.steps);
                    if left == 0 {
                        bail!(
                            "step budget of {} instructions exhausted at pc @{:04X}",
                            limit,
                            self.pc()
                        );
                    }
                    left.min(batch as u64) as usize
                }
                None => batch,
            };
            if !self.process_instructions(slice) {
                break;
            }
        }
        match &self.state {
            VmState::Faulted(fault) => Err(fault.clone().into()),
            VmState::Running | VmState::Halted => Ok(()),
        }
    }

    /// Release the operand stack. The stream and the native table are handed back
    /// (stream rewound) when the matching flag is set and dropped otherwise.
    pub fn teardown(self, keep_instructions: bool, keep_natives: bool) -> Retained {
        let Vm {
            mut stream,
            stack,
            natives,
            steps,
            ..
        } = self;
        drop(stack);
        debug!(
            target: "hss::vm",
            steps,
            keep_instructions,
            keep_natives,
            "vm.teardown"
        );
        stream.rewind();
        Retained {
            instructions: keep_instructions.then_some(stream),
            natives: keep_natives.then_some(natives),
        }
    }

    fn halt(&mut self) {
        debug!(target: "hss::vm", pc = self.stream.pc(), steps = self.steps, "vm.halt");
        self.state = VmState::Halted;
    }

    fn fault(&mut self, fault: Fault) {
        debug!(target: "hss::vm", pc = self.stream.pc(), steps = self.steps, fault = %fault, "vm.fault");
        self.state = VmState::Faulted(fault);
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("pc", &self.stream.pc())
            .field("code_bytes", &self.stream.len())
            .field("eval_len", &self.stack.eval_len())
            .field("frame_len", &self.stack.frame_len())
            .field("natives", &self.natives.len())
            .field("state", &self.state)
            .field("steps", &self.steps)
            .finish()
    }
}
