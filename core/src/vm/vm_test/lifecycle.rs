use super::*;
use crate::config::VmConfig;
use crate::vm::{HssbModule, decode_module, encode_module};
use Instruction::*;

#[test]
fn teardown_hands_back_what_the_host_keeps() {
    let mut natives = NativeTable::new();
    natives
        .register("inc", NativeSignature::new([ValueType::Int], Some(ValueType::Int)), |stack| {
            let v = stack.pop::<i16>()?;
            stack.push(v + 1)?;
            Ok(())
        })
        .unwrap();
    let mut vm = vm_with([LiteralI(1), CallExt(0)], natives);
    run_ok(&mut vm);

    let retained = vm.teardown(true, true);
    let stream = retained.instructions.expect("stream kept");
    assert_eq!(stream.pc(), 0);
    let natives = retained.natives.expect("natives kept");
    assert_eq!(natives.len(), 1);

    // a second VM over the same parts runs the same program again
    let mut again = Vm::new(stream, STACK_SIZE, natives).unwrap();
    run_ok(&mut again);
    assert_eq!(again.stack().peek::<i16>().unwrap(), 2);

    let retained = again.teardown(false, false);
    assert!(retained.instructions.is_none());
    assert!(retained.natives.is_none());
}

#[test]
fn restart_rewinds_and_clears() {
    let mut vm = vm_for([LiteralI(5), LiteralI(0), DivideI]);
    fault_of(&mut vm);
    vm.restart();
    assert!(vm.is_running());
    assert_eq!(vm.pc(), 0);
    assert_eq!(vm.stack().eval_len(), 0);
    assert_eq!(vm.steps(), 0);
    assert!(vm.process_instructions(1));
}

#[test]
fn step_budget_interrupts_endless_loops() {
    let mut vm = vm_for([Noop, Jump(0)]);
    let err = vm.run_with_budget(7, Some(100)).unwrap_err();
    assert!(err.to_string().contains("step budget of 100"));
    assert_eq!(vm.steps(), 100);
    assert!(vm.is_running());

    let mut vm = vm_for([LiteralI(1)]);
    vm.run_with_budget(7, Some(1)).unwrap();
    assert_eq!(vm.state(), &VmState::Halted);
}

#[test]
fn config_drives_construction() {
    let config = VmConfig::from_toml_str("data_stack_size = 32").unwrap();
    let vm = Vm::with_config(InstructionStream::from_bytes(Vec::new()), &config, NativeTable::new()).unwrap();
    assert_eq!(vm.stack().capacity(), 32);

    let bad = VmConfig {
        data_stack_size: 0,
        ..VmConfig::default()
    };
    assert!(Vm::with_config(InstructionStream::from_bytes(Vec::new()), &bad, NativeTable::new()).is_err());
}

#[test]
fn frame_guard_releases_on_drop() {
    let mut vm = vm_for(Vec::new());
    {
        let mut slot = vm.stack_mut().frame(ValueType::Float).unwrap();
        slot.save_var(0, 1.5f32).unwrap();
        assert_eq!(slot.frame_len(), 4);
    }
    assert_eq!(vm.stack().frame_len(), 0);
}

#[test]
fn persisted_modules_run_like_fresh_ones() {
    let src = "fn sq(x: int) -> int { return x * x; } sq(12) - 4";
    let program = compile_source(src, &NativeTable::new()).unwrap();
    let bytes = encode_module(&HssbModule::new(program)).unwrap();

    let module = decode_module(&bytes).unwrap();
    assert_eq!(module.program.result, Some(ValueType::Int));
    let mut vm = Vm::new(module.program.into_stream(), 128, NativeTable::new()).unwrap();
    run_ok(&mut vm);
    assert_eq!(vm.stack().peek_value(ValueType::Int).unwrap(), Value::Int(140));
}
