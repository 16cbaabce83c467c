use super::*;
use Instruction::*;

#[test]
fn jump_lands_on_its_target() {
    let mut code = Vec::new();
    Jump(4).encode_into(&mut code);
    code.push(0xFF);
    LiteralI(7).encode_into(&mut code);
    let mut vm = Vm::new(InstructionStream::from_bytes(code), STACK_SIZE, NativeTable::new()).unwrap();
    assert!(vm.process_instructions(1));
    assert_eq!(vm.pc(), 4);
    run_ok(&mut vm);
    assert_eq!(vm.stack().peek::<i16>().unwrap(), 7);
}

#[test]
fn false_cond_jump_only_skips_its_operand() {
    let mut vm = vm_for([LiteralB(false), CondJumpB(11), LiteralI(1), LiteralI(2)]);
    assert!(vm.process_instructions(2));
    assert_eq!(vm.pc(), 5);
    assert_eq!(vm.stack().eval_len(), 0);
    run_ok(&mut vm);
    assert_eq!(vm.stack().eval_len(), 4);
}

#[test]
fn true_cond_jump_is_taken() {
    let mut vm = vm_for([LiteralB(true), CondJumpB(8), LiteralI(1), LiteralI(2)]);
    run_ok(&mut vm);
    assert_eq!(vm.stack().eval_len(), 2);
    assert_eq!(vm.stack().peek::<i16>().unwrap(), 2);
}

#[test]
fn jump_past_the_end_halts_normally() {
    let mut vm = vm_for([Jump(0xFFFF), LiteralI(1)]);
    assert!(!vm.process_instructions(8));
    assert_eq!(vm.state(), &VmState::Halted);
    assert_eq!(vm.stack().eval_len(), 0);
}

#[test]
fn empty_stream_halts_without_stepping() {
    let mut vm = vm_for(Vec::new());
    assert!(!vm.process_instructions(1));
    assert_eq!(vm.state(), &VmState::Halted);
    assert_eq!(vm.steps(), 0);
}

#[test]
fn counting_loop_leaves_exactly_five() {
    // i = 0; while i < 5 { i = i + 1 } push i
    let mut vm = vm_for([
        LiteralI(0),   // @0000
        AllocVarI,     // @0003
        SaveVarI(0),   // @0004
        LoadVarI(0),   // @0006 loop
        LiteralI(5),   // @0008
        CmpILess,      // @000B
        NegateB,       // @000C
        CondJumpB(27), // @000D
        LoadVarI(0),   // @0010
        LiteralI(1),   // @0012
        AddI,          // @0015
        SaveVarI(0),   // @0016
        Jump(6),       // @0018
        LoadVarI(0),   // @001B exit
        DeallocVarI,   // @001D
    ]);
    run_ok(&mut vm);
    assert_eq!(vm.stack().eval_len(), 2);
    assert_eq!(vm.stack().peek::<i16>().unwrap(), 5);
    assert_eq!(vm.stack().frame_len(), 0);
}

#[test]
fn batches_resume_where_they_stopped() {
    let mut vm = vm_for([LiteralI(1), LiteralI(2), AddI, LiteralI(3), MultiplyI]);
    assert!(vm.process_instructions(1));
    assert!(vm.process_instructions(1));
    assert_eq!(vm.steps(), 2);
    assert!(!vm.process_instructions(100));
    assert_eq!(vm.steps(), 5);
    assert_eq!(vm.stack().peek::<i16>().unwrap(), 9);
}

#[test]
fn while_and_for_from_source() {
    assert_eq!(eval("var i = 0; while (i < 5) { i = i + 1; } i"), Some(Value::Int(5)));
    assert_eq!(
        eval("var a = 0; var b = 1; for (var i = 0; i < 10; i = i + 1) { var t = a + b; a = b; b = t; } a"),
        Some(Value::Int(55))
    );
    assert_eq!(
        eval("var n = 0; for (; n < 3;) { n = n + 1; } if (n == 3) { n = 30; } else { n = -1; } n"),
        Some(Value::Int(30))
    );
}

#[test]
fn nested_if_else_chains() {
    let src = "var x = 7; var r = 0;
        if (x < 5) { r = 1; } else if (x < 10) { r = 2; } else { r = 3; }
        r";
    assert_eq!(eval(src), Some(Value::Int(2)));
}

#[test]
fn expression_statements_leave_nothing_behind() {
    let (vm, value) = eval_with("1 + 2; 2.5 * 2.0; 1 < 2; 4", NativeTable::new());
    assert_eq!(value, Some(Value::Int(4)));
    assert_eq!(vm.stack().eval_len(), 2);
}

#[test]
fn float_and_bool_results() {
    assert_eq!(eval("var x = 1.5; var y = x * 2.0; y - 0.5"), Some(Value::Float(2.5)));
    assert_eq!(eval("1 < 2 && !(3 <= 2)"), Some(Value::Bool(true)));
    assert_eq!(eval("2 > 1 || 1 != 1"), Some(Value::Bool(true)));
    assert_eq!(eval("-(3 - 5) * 4"), Some(Value::Int(8)));
    assert_eq!(eval("var s = 0; s = s + 1;"), None);
}
