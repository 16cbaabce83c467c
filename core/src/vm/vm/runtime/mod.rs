mod exec;
mod math;

use crate::vm::vm::Vm;

impl Vm {
    /// Execute up to `count` instructions.
    ///
    /// Returns `false` once the VM is no longer running: the program counter reached the
    /// end of the stream (`Halted`) or an instruction faulted (`Faulted`). A VM that has
    /// stopped stays stopped; further calls return `false` without doing anything.
    pub fn process_instructions(&mut self, count: usize) -> bool {
        if !self.is_running() {
            return false;
        }
        if self.stream.is_at_end() {
            self.halt();
            return false;
        }
        for _ in 0..count {
            if let Err(fault) = self.step() {
                self.fault(fault);
                return false;
            }
            self.steps += 1;
            if self.stream.is_at_end() {
                self.halt();
                return false;
            }
        }
        true
    }
}
