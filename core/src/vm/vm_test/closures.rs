use super::*;
use crate::rt::Object;

#[test]
fn test_closure_captures_global_local_and_argument() {
    let f = 67;
    let main = [
        Instr::Begin { nargs: 2, nlocals: 1 },
        Instr::Const(10),
        Instr::St(Loc::global(0)),
        Instr::Drop,
        Instr::Const(20),
        Instr::St(Loc::local(0)),
        Instr::Drop,
        Instr::Closure {
            entry: f,
            captures: vec![Loc::global(0), Loc::local(0), Loc::arg(0)],
        },
        Instr::Const(5),
        Instr::CallC { argc: 1 },
        Instr::CallWrite,
        Instr::End,
    ];
    assert_eq!(offset_of(&main), f);
    let mut code = main.to_vec();
    code.extend([
        // Two frame arguments: the explicit one and the closure itself.
        Instr::Begin { nargs: 2, nlocals: 0 },
        Instr::Ld(Loc::capture(0)),
        Instr::Ld(Loc::capture(1)),
        Instr::Binop(BinOp::Add),
        Instr::Ld(Loc::arg(0)),
        Instr::Binop(BinOp::Add),
        Instr::Ld(Loc::capture(2)),
        Instr::Binop(BinOp::Add),
        Instr::End,
    ]);
    let (res, out) = run_image(BytecodeImage::new(assemble(&code)).with_globals(1));
    res.unwrap();
    assert_eq!(out, "35\n");
}

#[test]
fn test_capture_store_and_nested_capture() {
    let (f, g) = (41, 87);
    let main = [
        Instr::Begin { nargs: 2, nlocals: 1 },
        Instr::Const(7),
        Instr::St(Loc::local(0)),
        Instr::Drop,
        Instr::Closure {
            entry: f,
            captures: vec![Loc::local(0)],
        },
        Instr::CallC { argc: 0 },
        Instr::CallWrite,
        Instr::End,
    ];
    let f_body = [
        Instr::Begin { nargs: 1, nlocals: 0 },
        Instr::Ld(Loc::capture(0)),
        Instr::Const(1),
        Instr::Binop(BinOp::Add),
        Instr::St(Loc::capture(0)),
        Instr::Drop,
        Instr::Closure {
            entry: g,
            captures: vec![Loc::capture(0)],
        },
        Instr::CallC { argc: 0 },
        Instr::End,
    ];
    let g_body = [
        Instr::Begin { nargs: 1, nlocals: 0 },
        Instr::Ld(Loc::capture(0)),
        Instr::End,
    ];
    assert_eq!(offset_of(&main), f);
    assert_eq!(f + offset_of(&f_body), g);
    let code: Vec<Instr> = main.into_iter().chain(f_body).chain(g_body).collect();
    let (res, out) = run_code(&code);
    res.unwrap();
    assert_eq!(out, "8\n");
}

#[test]
fn test_closure_object_layout() {
    let code = [
        Instr::Begin { nargs: 2, nlocals: 0 },
        Instr::Closure {
            entry: 0x30,
            captures: vec![Loc::arg(0)],
        },
        Instr::Dup,
        Instr::CallLength,
        Instr::CallWrite,
        Instr::Drop,
        Instr::Dup,
        Instr::Patt(Patt::IsClosure),
        Instr::CallWrite,
        Instr::Drop,
        Instr::End,
    ];
    let (mut interp, out) = interpreter(BytecodeImage::new(assemble(&code)));
    interp.run().unwrap();
    assert_eq!(out.text(), "2\n1\n");
    let closure = interp.stack().peek(0).unwrap();
    assert_eq!(
        interp.runtime().heap().get(closure),
        Some(&Object::Closure {
            entry: 0x30,
            captures: vec![Word::ZERO],
        })
    );
    assert_eq!(interp.runtime().elem(closure, Word::boxed(0)).unwrap(), Word::boxed(0x30));
}

#[test]
fn test_capture_outside_closure_frame_faults() {
    let (res, _) = run_code(&[Instr::Begin { nargs: 2, nlocals: 0 }, Instr::Ld(Loc::capture(0))]);
    assert!(res.is_err());

    let (res, _) = run_code(&[Instr::Ld(Loc::capture(0))]);
    assert!(matches!(res.unwrap_err().error, VmError::InvalidFrame(_)));
}

#[test]
fn test_callc_on_non_closure_faults() {
    let (res, _) = run_code(&[
        Instr::Begin { nargs: 2, nlocals: 0 },
        Instr::CallArray(0),
        Instr::CallC { argc: 0 },
    ]);
    assert!(matches!(res.unwrap_err().error, VmError::Runtime(_)));
}
