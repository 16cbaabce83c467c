use super::*;
use Instruction::*;

#[test]
fn call_returns_right_after_the_call_site() {
    let mut vm = vm_for([
        Call(9),       // @0000
        LiteralI(2),   // @0003
        Jump(15),      // @0006
        AllocVarI,     // @0009 callee
        DeallocVarI,   // @000A
        LiteralI(40),  // @000B
        Return,        // @000E
    ]);
    assert!(vm.process_instructions(1));
    assert_eq!(vm.pc(), 9);
    assert_eq!(vm.stack().frame_len(), 2);

    assert!(vm.process_instructions(4));
    assert_eq!(vm.pc(), 3);
    assert_eq!(vm.stack().frame_len(), 0);

    run_ok(&mut vm);
    assert_eq!(vm.stack_mut().pop::<i16>().unwrap(), 2);
    assert_eq!(vm.stack_mut().pop::<i16>().unwrap(), 40);
}

#[test]
fn return_with_an_empty_frame_faults() {
    let mut vm = vm_for([Return]);
    assert!(matches!(
        fault_of(&mut vm),
        Fault::Stack {
            at: 0,
            error: StackError::FrameUnderflow { .. }
        }
    ));
}

#[test]
fn recursion_from_source() {
    let src = "fn fact(n: int) -> int {
            if (n <= 1) { return 1; }
            return n * fact(n - 1);
        }
        fact(7)";
    assert_eq!(eval(src), Some(Value::Int(5040)));
}

#[test]
fn parameters_keep_their_order() {
    let src = "fn sub(a: int, b: int) -> int { return a - b; } sub(10, 3)";
    assert_eq!(eval(src), Some(Value::Int(7)));

    let src = "fn mix(a: int, x: float, b: int) -> float {
            var scale = 2.0;
            return x * scale;
        }
        mix(1, 1.25, 2)";
    assert_eq!(eval(src), Some(Value::Float(2.5)));
}

#[test]
fn early_returns_release_nested_locals() {
    let src = "fn find(limit: int) -> int {
            var i = 0;
            while (i < 100) {
                var sq = i * i;
                if (limit < sq) { return i; }
                i = i + 1;
            }
            return -1;
        }
        find(50) + find(0) * 100";
    assert_eq!(eval(src), Some(Value::Int(108)));
}

#[test]
fn void_functions_and_forward_calls() {
    let src = "fn first() -> int { return second() + 1; }
        fn second() -> int { return 41; }
        fn nothing() { }
        nothing();
        first()";
    assert_eq!(eval(src), Some(Value::Int(42)));
}

#[test]
fn bool_returning_functions() {
    let src = "fn even(n: int) -> bool { return n - n / 2 * 2 == 0; }
        var hits = 0;
        for (var i = 0; i < 9; i = i + 1) { if (even(i)) { hits = hits + 1; } }
        hits";
    assert_eq!(eval(src), Some(Value::Int(5)));
}

#[test]
fn deep_recursion_overflows_the_stack() {
    let src = "fn down(n: int) -> int { return down(n + 1); } down(0)";
    let program = compile_source(src, &NativeTable::new()).unwrap();
    let mut vm = Vm::new(program.into_stream(), 64, NativeTable::new()).unwrap();
    assert!(matches!(
        fault_of(&mut vm),
        Fault::Stack {
            error: StackError::FrameOverflow { .. },
            ..
        }
    ));
}
