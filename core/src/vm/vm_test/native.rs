use std::cell::RefCell;
use std::rc::Rc;

use anyhow::ensure;

use super::*;
use Instruction::*;

fn int_to_int() -> NativeSignature {
    NativeSignature::new([ValueType::Int], Some(ValueType::Int))
}

#[test]
fn call_ext_passes_the_operand_stack() {
    let mut natives = NativeTable::new();
    natives
        .register("twice", int_to_int(), |stack| {
            let v = stack.pop::<i16>()?;
            stack.push(v.wrapping_mul(2))?;
            Ok(())
        })
        .unwrap();
    let mut vm = vm_with([LiteralI(21), CallExt(0)], natives);
    run_ok(&mut vm);
    assert_eq!(vm.stack().peek::<i16>().unwrap(), 42);
    assert_eq!(vm.stack().eval_len(), 2);
}

#[test]
fn natives_see_arguments_last_on_top() {
    let mut natives = NativeTable::new();
    natives
        .register(
            "sub",
            NativeSignature::new([ValueType::Int, ValueType::Int], Some(ValueType::Int)),
            |stack| {
                let b = stack.pop::<i16>()?;
                let a = stack.pop::<i16>()?;
                stack.push(a - b)?;
                Ok(())
            },
        )
        .unwrap();
    let (_, value) = eval_with("sub(10, 4)", natives);
    assert_eq!(value, Some(Value::Int(6)));
}

#[test]
fn natives_can_keep_host_state() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let mut natives = NativeTable::new();
    natives
        .register("record", NativeSignature::new([ValueType::Int], None), move |stack| {
            sink.borrow_mut().push(stack.pop::<i16>()?);
            Ok(())
        })
        .unwrap();
    let (vm, value) = eval_with("for (var i = 0; i < 4; i = i + 1) { record(i * i); }", natives);
    assert_eq!(value, None);
    assert_eq!(vm.stack().eval_len(), 0);
    assert_eq!(*seen.borrow(), vec![0, 1, 4, 9]);
}

#[test]
fn unknown_native_index_faults() {
    let mut vm = vm_for([CallExt(3)]);
    assert_eq!(fault_of(&mut vm), Fault::UnknownNative { at: 0, index: 3 });
}

#[test]
fn native_errors_become_faults() {
    let mut natives = NativeTable::new();
    natives
        .register("positive", int_to_int(), |stack| {
            let v = stack.peek::<i16>()?;
            ensure!(v > 0, "expected a positive value, got {}", v);
            Ok(())
        })
        .unwrap();
    let mut vm = vm_with([LiteralI(-1), CallExt(0)], natives);
    let fault = fault_of(&mut vm);
    match &fault {
        Fault::Native { at, name, message } => {
            assert_eq!(*at, 3);
            assert_eq!(name, "positive");
            assert!(message.contains("got -1"));
        }
        other => panic!("unexpected fault {:?}", other),
    }
    let err = vm.run(4).unwrap_err();
    assert_eq!(err.downcast_ref::<Fault>(), Some(&fault));
}

#[test]
fn stack_errors_inside_natives_propagate() {
    let mut natives = NativeTable::new();
    natives
        .register("greedy", int_to_int(), |stack| {
            stack.pop::<f32>()?;
            Ok(())
        })
        .unwrap();
    let mut vm = vm_with([LiteralI(1), CallExt(0)], natives);
    match fault_of(&mut vm) {
        Fault::Native { message, .. } => assert!(message.contains("underflow")),
        other => panic!("unexpected fault {:?}", other),
    }
}

#[test]
fn compiled_module_checks_native_layout() {
    let mut natives = NativeTable::new();
    natives.register("a", int_to_int(), |_| Ok(())).unwrap();
    natives.register("b", int_to_int(), |_| Ok(())).unwrap();
    let program = compile_source("b(1)", &natives).unwrap();
    assert_eq!(program.natives, natives.imports(2));
    natives.ensure_layout(&program.natives).unwrap();

    let mut other = NativeTable::new();
    other.register("b", int_to_int(), |_| Ok(())).unwrap();
    assert!(other.ensure_layout(&program.natives).is_err());

    let mut retyped = NativeTable::new();
    retyped.register("a", int_to_int(), |_| Ok(())).unwrap();
    retyped
        .register("b", NativeSignature::new([ValueType::Float], Some(ValueType::Int)), |_| Ok(()))
        .unwrap();
    let err = retyped.ensure_layout(&program.natives).unwrap_err();
    assert!(err.to_string().contains("native 'b' has signature (float) -> int"), "{}", err);
}
