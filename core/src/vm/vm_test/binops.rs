use super::*;

fn apply(op: BinOp, a: i32, b: i32) -> Result<Word, VmError> {
    let code = [
        Instr::Begin { nargs: 2, nlocals: 0 },
        Instr::Const(a),
        Instr::Const(b),
        Instr::Binop(op),
        Instr::End,
    ];
    let (mut interp, _) = interpreter(BytecodeImage::new(assemble(&code)));
    interp.run().map_err(|f| f.error)?;
    Ok(interp.stack().peek(0).unwrap())
}

#[test]
fn test_binop_table() {
    let cases = [
        (BinOp::Add, 2, 3, 5),
        (BinOp::Sub, 2, 3, -1),
        (BinOp::Mul, -4, 3, -12),
        (BinOp::Div, 7, 2, 3),
        (BinOp::Div, -7, 2, -3),
        (BinOp::Rem, 7, 3, 1),
        (BinOp::Rem, -7, 3, -1),
        (BinOp::Lt, 3, 5, 1),
        (BinOp::Lt, 5, 3, 0),
        (BinOp::Le, 5, 5, 1),
        (BinOp::Gt, 5, 3, 1),
        (BinOp::Ge, 3, 5, 0),
        (BinOp::Eq, 4, 4, 1),
        (BinOp::Ne, 4, 4, 0),
        (BinOp::And, 2, 0, 0),
        (BinOp::And, 2, -1, 1),
        (BinOp::Or, 0, 0, 0),
        (BinOp::Or, 0, 7, 1),
    ];
    for (op, a, b, expected) in cases {
        assert_eq!(
            apply(op, a, b).unwrap(),
            Word::boxed(expected),
            "{a} {} {b}",
            op.symbol()
        );
    }
}

#[test]
fn test_every_operator_is_covered() {
    for op in BinOp::ALL {
        assert!(apply(op, 6, 3).is_ok(), "{}", op.symbol());
        assert_eq!(BinOp::from_low(op.low()), Some(op));
    }
}

#[test]
fn test_division_by_zero_is_an_arithmetic_fault() {
    assert!(matches!(apply(BinOp::Div, 1, 0), Err(VmError::Arithmetic(_))));
    assert!(matches!(apply(BinOp::Rem, 1, 0), Err(VmError::Arithmetic(_))));
}

#[test]
fn test_results_wrap_to_31_bits() {
    let max = (1 << 30) - 1;
    assert_eq!(apply(BinOp::Add, max, 1).unwrap(), Word::boxed(-(1 << 30)));
}
