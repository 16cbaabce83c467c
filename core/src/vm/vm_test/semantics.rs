use super::*;
use Instruction::*;

#[test]
fn literals_then_add_leave_the_sum() {
    let mut vm = vm_for([LiteralI(1), LiteralI(20), AddI]);
    assert!(vm.process_instructions(2));
    assert_eq!(vm.stack().eval_len(), 4);
    assert!(!vm.process_instructions(1));
    assert_eq!(vm.stack().eval_len(), 2);
    assert_eq!(vm.stack().peek::<i16>().unwrap(), 21);
    assert_eq!(vm.state(), &VmState::Halted);
}

#[test]
fn nested_sums_leave_a_single_value() {
    let mut vm = vm_for([LiteralI(1), LiteralI(20), AddI, LiteralI(300), LiteralI(4000), AddI, AddI]);
    run_ok(&mut vm);
    assert_eq!(vm.stack().eval_len(), 2);
    assert_eq!(vm.stack().peek::<i16>().unwrap(), 4321);
    assert_eq!(vm.stack().frame_len(), 0);
    assert_eq!(vm.steps(), 7);
}

#[test]
fn operand_order_for_non_commutative_ops() {
    let mut vm = vm_for([LiteralI(10), LiteralI(3), SubtractI, LiteralI(2), DivideI]);
    run_ok(&mut vm);
    assert_eq!(vm.stack().peek::<i16>().unwrap(), 3);

    let mut vm = vm_for([LiteralF(1.0), LiteralF(4.0), DivideF, LiteralF(2.0), MultiplyF]);
    run_ok(&mut vm);
    assert_eq!(vm.stack().peek::<f32>().unwrap(), 0.5);
}

#[test]
fn int_arithmetic_wraps() {
    let mut vm = vm_for([LiteralI(i16::MAX), LiteralI(1), AddI]);
    run_ok(&mut vm);
    assert_eq!(vm.stack().peek::<i16>().unwrap(), i16::MIN);

    let mut vm = vm_for([LiteralI(i16::MIN), LiteralI(-1), DivideI]);
    run_ok(&mut vm);
    assert_eq!(vm.stack().peek::<i16>().unwrap(), i16::MIN);
}

#[test]
fn int_divide_by_zero_faults() {
    let mut vm = vm_for([LiteralI(1), LiteralI(0), DivideI]);
    assert_eq!(fault_of(&mut vm), Fault::DivideByZero { at: 6 });
    assert!(!vm.process_instructions(1));
}

#[test]
fn float_divide_by_zero_follows_ieee() {
    let mut vm = vm_for([LiteralF(1.0), LiteralF(0.0), DivideF]);
    run_ok(&mut vm);
    assert_eq!(vm.stack().peek::<f32>().unwrap(), f32::INFINITY);
}

#[test]
fn nan_comparisons_are_false() {
    for cmp in [CmpFEq, CmpFLess, CmpFLessEq] {
        let mut vm = vm_for([LiteralF(0.0), LiteralF(0.0), DivideF, LiteralF(1.0), cmp]);
        run_ok(&mut vm);
        assert!(!vm.stack().peek::<bool>().unwrap(), "{} with NaN", cmp);
    }
    let mut vm = vm_for([LiteralF(1.0), LiteralF(f32::NAN), CmpFLessEq, NegateB]);
    run_ok(&mut vm);
    assert!(vm.stack().peek::<bool>().unwrap());
}

#[test]
fn comparisons_and_logic() {
    let cases = [
        (vec![LiteralI(2), LiteralI(2), CmpIEq], true),
        (vec![LiteralI(3), LiteralI(2), CmpILess], false),
        (vec![LiteralI(2), LiteralI(2), CmpILessEq], true),
        (vec![LiteralF(1.5), LiteralF(2.5), CmpFLess], true),
        (vec![LiteralB(true), LiteralB(false), AndB], false),
        (vec![LiteralB(true), LiteralB(false), OrB], true),
        (vec![LiteralB(false), NegateB], true),
    ];
    for (code, expected) in cases {
        let mut vm = vm_for(code.clone());
        run_ok(&mut vm);
        assert_eq!(vm.stack().peek::<bool>().unwrap(), expected, "{:?}", code);
        assert_eq!(vm.stack().eval_len(), 1);
    }
}

#[test]
fn variables_round_trip_through_the_frame() {
    let mut vm = vm_for([
        AllocVarF,
        AllocVarI,
        LiteralI(-7),
        SaveVarI(0),
        LiteralF(2.25),
        SaveVarF(2),
        LoadVarI(0),
        LoadVarF(2),
    ]);
    assert!(vm.process_instructions(2));
    assert_eq!(vm.stack().frame_len(), 6);
    run_ok(&mut vm);
    assert_eq!(vm.stack().peek::<f32>().unwrap(), 2.25);
    assert_eq!(vm.stack().load_at::<i16>(0), Some(-7));
}

#[test]
fn matched_alloc_and_dealloc_restore_the_frame() {
    let mut vm = vm_for([AllocVarI, AllocVarF, DeallocVarF, DeallocVarI]);
    let before = vm.stack().reverse_pointer();
    run_ok(&mut vm);
    assert_eq!(vm.stack().reverse_pointer(), before);
}

#[test]
fn stack_faults_carry_the_instruction_address() {
    let mut vm = vm_for([Noop, AddI]);
    assert!(matches!(
        fault_of(&mut vm),
        Fault::Stack {
            at: 1,
            error: StackError::Underflow { .. }
        }
    ));

    let mut vm = vm_for([DeallocVarI]);
    assert!(matches!(
        fault_of(&mut vm),
        Fault::Stack {
            error: StackError::FrameUnderflow { .. },
            ..
        }
    ));

    let mut vm = vm_for([AllocVarI, LoadVarI(2)]);
    assert!(matches!(
        fault_of(&mut vm),
        Fault::Stack {
            error: StackError::SlotOutOfBounds { .. },
            ..
        }
    ));
}

#[test]
fn evaluation_overflow_faults() {
    let code: Vec<_> = (0..200).map(|_| LiteralF(1.0)).collect();
    let mut vm = vm_for(code);
    assert!(matches!(
        fault_of(&mut vm),
        Fault::Stack {
            error: StackError::Overflow { .. },
            ..
        }
    ));
    assert_eq!(vm.stack().eval_len(), STACK_SIZE);
}

#[test]
fn unknown_opcode_stops_just_past_the_bad_byte() {
    let mut code = Vec::new();
    LiteralI(1).encode_into(&mut code);
    code.push(0xC8);
    LiteralI(2).encode_into(&mut code);
    let mut vm = Vm::new(InstructionStream::from_bytes(code), STACK_SIZE, NativeTable::new()).unwrap();

    assert!(vm.process_instructions(1));
    assert!(!vm.process_instructions(1));
    assert_eq!(vm.pc(), 4);
    assert_eq!(vm.state(), &VmState::Faulted(Fault::UnknownOpcode { at: 3, byte: 0xC8 }));
    assert_eq!(vm.steps(), 1);
}

#[test]
fn truncated_operand_faults() {
    let mut vm = Vm::new(InstructionStream::from_bytes(vec![9, 1]), STACK_SIZE, NativeTable::new()).unwrap();
    let fault = fault_of(&mut vm);
    assert!(matches!(fault, Fault::TruncatedOperand { at: 0, .. }));
    assert!(fault.to_string().contains("LITERAL_I"));
}

#[test]
fn deeply_nested_source_is_rejected_before_lowering() {
    let deep = format!("{}1{}", "(".repeat(20_000), ")".repeat(20_000));
    let err = compile_source(&deep, &NativeTable::new()).unwrap_err();
    assert!(err.to_string().contains("nest too deeply"), "{:#}", err);

    let sum = vec!["1"; 300].join(" + ");
    assert_eq!(eval(&sum), Some(Value::Int(300)));
}
