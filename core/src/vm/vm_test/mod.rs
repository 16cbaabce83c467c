pub(super) use crate::vm::{
    Fault, Instruction, InstructionStream, NativeSignature, NativeTable, StackError, Value, ValueType, Vm, VmState,
    compile_source,
};

pub(super) const STACK_SIZE: usize = 256;

pub(super) fn vm_with(code: impl IntoIterator<Item = Instruction>, natives: NativeTable) -> Vm {
    let stream: InstructionStream = code.into_iter().collect();
    Vm::new(stream, STACK_SIZE, natives).unwrap()
}

pub(super) fn vm_for(code: impl IntoIterator<Item = Instruction>) -> Vm {
    vm_with(code, NativeTable::new())
}

/// Run to completion, panicking on a fault.
pub(super) fn run_ok(vm: &mut Vm) {
    vm.run(16).unwrap_or_else(|err| panic!("vm faulted: {:#}", err));
    assert_eq!(vm.state(), &VmState::Halted);
}

pub(super) fn fault_of(vm: &mut Vm) -> Fault {
    while vm.process_instructions(16) {}
    match vm.state() {
        VmState::Faulted(fault) => fault.clone(),
        other => panic!("expected a fault, VM is {:?}", other),
    }
}

/// Compile `src`, run it and read back the program result.
pub(super) fn eval_with(src: &str, natives: NativeTable) -> (Vm, Option<Value>) {
    let program = compile_source(src, &natives).unwrap_or_else(|err| panic!("compile failed: {:#}", err));
    let result = program.result;
    let mut vm = Vm::new(program.into_stream(), 1024, natives).unwrap();
    run_ok(&mut vm);
    let value = result.map(|ty| vm.stack().peek_value(ty).unwrap());
    (vm, value)
}

pub(super) fn eval(src: &str) -> Option<Value> {
    let (vm, value) = eval_with(src, NativeTable::new());
    assert_eq!(vm.stack().frame_len(), 0, "frame not released for {:?}", src);
    value
}

mod control_flow;
mod functions;
mod lifecycle;
mod native;
mod semantics;
