use super::*;

/// main: push a marker, call `f(3, 4)`, write the result and the marker.
fn two_arg_call() -> (Vec<Instr>, u32) {
    let f = 37;
    let main = vec![
        Instr::Begin { nargs: 2, nlocals: 0 },
        Instr::Const(100),
        Instr::Const(3),
        Instr::Const(4),
        Instr::Call { target: f, argc: 2 },
        Instr::CallWrite,
        Instr::Drop,
        Instr::CallWrite,
        Instr::End,
    ];
    assert_eq!(offset_of(&main), f);
    let mut code = main;
    code.extend([
        Instr::Begin { nargs: 2, nlocals: 0 },
        Instr::Ld(Loc::arg(0)),
        Instr::Ld(Loc::arg(1)),
        Instr::Binop(BinOp::Add),
        Instr::End,
    ]);
    (code, f)
}

#[test]
fn test_call_returns_sum_and_keeps_caller_stack() {
    let (code, _) = two_arg_call();
    let call_at = offset_of(&code[..4]) as usize;
    let ret_at = offset_of(&code[..5]) as usize;
    let (mut interp, out) = interpreter(BytecodeImage::new(assemble(&code)));

    while interp.ip() != Some(call_at) {
        assert_eq!(interp.step().unwrap(), Step::Continue);
    }
    let (top_before, fp_before) = (interp.stack().top(), interp.stack().fp());

    interp.step().unwrap();
    while interp.ip() != Some(ret_at) {
        interp.step().unwrap();
    }
    // Two arguments consumed, one result pushed, caller frame restored.
    assert_eq!(interp.stack().top(), top_before + 1);
    assert_eq!(interp.stack().fp(), fp_before);
    assert_eq!(interp.stack().peek(0).unwrap(), Word::boxed(7));
    assert_eq!(interp.stack().peek(1).unwrap(), Word::boxed(100));

    interp.run().unwrap();
    assert_eq!(out.text(), "7\n100\n");
    assert_eq!(interp.ip(), None);
    assert_eq!(interp.state().frames(), 0);
}

#[test]
fn test_entry_frame_returns_to_empty_stack() {
    let code = [Instr::Begin { nargs: 2, nlocals: 3 }, Instr::Const(5), Instr::End];
    let (mut interp, _) = interpreter(BytecodeImage::new(assemble(&code)));
    let capacity = interp.stack().capacity();
    interp.run().unwrap();
    assert_eq!(interp.stack().fp(), capacity);
    assert_eq!(interp.stack().depth(), 1);
    assert_eq!(interp.stack().peek(0).unwrap(), Word::boxed(5));
}

#[test]
fn test_begin_zero_fills_locals() {
    let code = [
        Instr::Begin { nargs: 2, nlocals: 2 },
        Instr::Ld(Loc::local(1)),
        Instr::CallWrite,
        Instr::Drop,
        Instr::Const(9),
        Instr::St(Loc::local(1)),
        Instr::Drop,
        Instr::Ld(Loc::local(1)),
        Instr::End,
    ];
    assert_eq!(eval(&code), Word::boxed(9));
    let (res, out) = run_code(&code);
    res.unwrap();
    assert_eq!(out, "0\n");
}

#[test]
fn test_end_without_begin_is_a_frame_fault() {
    let (res, _) = run_code(&[Instr::End]);
    let fault = res.unwrap_err();
    assert!(matches!(fault.error, VmError::InvalidFrame(_)), "{fault}");
    assert_eq!(fault.offset, 0);
}

#[test]
fn test_pop_past_frame_pointer_underflows() {
    let (res, _) = run_code(&[Instr::Begin { nargs: 2, nlocals: 0 }, Instr::Drop]);
    assert_eq!(res.unwrap_err().error, VmError::StackUnderflow);
}

#[test]
fn test_out_of_frame_locations_fault() {
    let (res, _) = run_code(&[Instr::Begin { nargs: 2, nlocals: 1 }, Instr::Ld(Loc::local(1))]);
    assert!(matches!(
        res.unwrap_err().error,
        VmError::InvalidLocation { kind: "local", index: 1 }
    ));

    let (res, _) = run_code(&[Instr::Begin { nargs: 2, nlocals: 0 }, Instr::Ld(Loc::global(0))]);
    assert!(matches!(
        res.unwrap_err().error,
        VmError::InvalidLocation { kind: "global", index: 0 }
    ));

    let (res, _) = run_code(&[Instr::Begin { nargs: 2, nlocals: 0 }, Instr::Ld(Loc::arg(1000))]);
    assert!(matches!(res.unwrap_err().error, VmError::InvalidLocation { kind: "argument", .. }));
}

#[test]
fn test_locals_exhausting_the_stack_overflow() {
    let config = InterpreterConfig {
        stack_words: 16,
        ..test_config()
    };
    let image = BytecodeImage::new(assemble(&[Instr::Begin { nargs: 2, nlocals: 100 }]));
    let (mut interp, _) = interpreter_with(image, &config, "");
    assert_eq!(interp.run().unwrap_err().error, VmError::StackOverflow);
}

#[test]
fn test_unsupported_opcodes_fault_cleanly() {
    for (instr, name) in [(Instr::Ret, "RET"), (Instr::Sti, "STI"), (Instr::Stop, "STOP")] {
        let (res, _) = run_code(&[Instr::Begin { nargs: 2, nlocals: 0 }, instr]);
        let fault = res.unwrap_err();
        assert_eq!(fault.error, VmError::UnsupportedOpcode(name));
        assert_eq!(fault.offset, 9);
        assert_eq!(fault.instr.as_deref(), Some(name));
    }
}

#[test]
fn test_call_with_more_arguments_than_frame_faults_at_call() {
    let code = [
        Instr::Begin { nargs: 2, nlocals: 0 },
        Instr::Const(1),
        Instr::Call { target: 0, argc: 3 },
        Instr::End,
    ];
    let call_at = offset_of(&code[..2]) as usize;
    let (mut interp, _) = interpreter(BytecodeImage::new(assemble(&code)));
    let fault = interp.run().unwrap_err();
    assert_eq!(fault.error, VmError::StackUnderflow);
    assert_eq!(fault.offset, call_at);
    assert_eq!(interp.stack().peek(0).unwrap(), Word::boxed(1));
}

#[test]
fn test_sexp_arity_past_frame_faults_at_sexp() {
    let (strings, names) = string_table(&["Cons"]);
    let code = [
        Instr::Begin { nargs: 2, nlocals: 0 },
        Instr::Const(1),
        Instr::Sexp { name: names[0], arity: 2 },
        Instr::End,
    ];
    let sexp_at = offset_of(&code[..2]) as usize;
    let (mut interp, _) = interpreter(BytecodeImage::new(assemble(&code)).with_strings(strings));
    let fault = interp.run().unwrap_err();
    assert_eq!(fault.error, VmError::StackUnderflow);
    assert_eq!(fault.offset, sexp_at);
    assert_eq!(interp.runtime().heap().live(), 0);
}
