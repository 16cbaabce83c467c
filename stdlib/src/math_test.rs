#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use anyhow::Result;
    use hss_core::vm::{NativeTable, Value, Vm, compile_source};

    use crate::register_stdlib;

    fn eval(src: &str) -> Result<Option<Value>> {
        let mut natives = NativeTable::new();
        register_stdlib(&mut natives, Rc::new(RefCell::new(Vec::<u8>::new())))?;
        let program = compile_source(src, &natives)?;
        let result = program.result;
        let mut vm = Vm::new(program.into_stream(), 256, natives)?;
        vm.run(64)?;
        Ok(match result {
            Some(ty) => Some(vm.stack().peek_value(ty)?),
            None => None,
        })
    }

    #[test]
    fn test_int_helpers() -> Result<()> {
        assert_eq!(eval("abs(-42)")?, Some(Value::Int(42)));
        assert_eq!(eval("abs(-32768)")?, Some(Value::Int(-32768)));
        assert_eq!(eval("min(3, -4)")?, Some(Value::Int(-4)));
        assert_eq!(eval("max(3, -4)")?, Some(Value::Int(3)));
        assert_eq!(eval("max(min(10, 20), 5)")?, Some(Value::Int(10)));
        Ok(())
    }

    #[test]
    fn test_sqrt() -> Result<()> {
        assert_eq!(eval("sqrt(2.25)")?, Some(Value::Float(1.5)));
        match eval("sqrt(-1.0)")? {
            Some(Value::Float(v)) => assert!(v.is_nan()),
            other => panic!("unexpected {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_conversions() -> Result<()> {
        assert_eq!(eval("float(7) / 2.0")?, Some(Value::Float(3.5)));
        assert_eq!(eval("int(2.9)")?, Some(Value::Int(2)));
        assert_eq!(eval("int(-2.9)")?, Some(Value::Int(-2)));
        assert_eq!(eval("int(100000.0)")?, Some(Value::Int(i16::MAX)));
        assert_eq!(eval("int(-100000.0)")?, Some(Value::Int(i16::MIN)));
        assert_eq!(eval("int(0.0 / 0.0)")?, Some(Value::Int(0)));
        Ok(())
    }

    #[test]
    fn test_signatures_are_checked_at_compile_time() {
        let err = eval("sqrt(4)").unwrap_err();
        assert!(err.to_string().contains("argument 1 of 'sqrt' must be float, found int"));
        let err = eval("min(1)").unwrap_err();
        assert!(err.to_string().contains("takes 2 argument(s) but 1 were given"));
    }
}
