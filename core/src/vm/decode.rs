//! Byte-level decoder and encoder for [`Instr`].
//!
//! `decode` is a pure function of `(code, pos)`: it never mutates anything and
//! returns the same result however often it is called on the same position.

use super::bytecode::{BinOp, Instr, Loc, LocKind, Patt, family, high_bits, low_bits, opcode};
use super::error::DecodeError;

struct Cursor<'a> {
    code: &'a [u8],
    start: usize,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn byte(&mut self) -> Result<u8, DecodeError> {
        let b = *self
            .code
            .get(self.pos)
            .ok_or(DecodeError::Truncated { offset: self.start })?;
        self.pos += 1;
        Ok(b)
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let end = self.pos + 4;
        let bytes: [u8; 4] = self
            .code
            .get(self.pos..end)
            .and_then(|s| s.try_into().ok())
            .ok_or(DecodeError::Truncated { offset: self.start })?;
        self.pos = end;
        Ok(u32::from_le_bytes(bytes))
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        self.u32().map(|v| v as i32)
    }

    fn loc(&mut self, kind_byte: u8, at: usize) -> Result<Loc, DecodeError> {
        let kind = LocKind::from_low(kind_byte).ok_or(DecodeError::InvalidLocationKind {
            offset: at,
            byte: kind_byte,
        })?;
        Ok(Loc::new(kind, self.u32()?))
    }
}

/// Decodes the instruction at `pos`, returning it with the number of bytes it
/// occupies.
pub fn decode(code: &[u8], pos: usize) -> Result<(Instr, usize), DecodeError> {
    if pos >= code.len() {
        return Err(DecodeError::CursorOutOfRange { offset: pos });
    }
    let mut cur = Cursor { code, start: pos, pos };
    let byte = cur.byte()?;
    let low = low_bits(byte);

    let instr = match high_bits(byte) {
        family::BINOP => Instr::Binop(
            BinOp::from_low(low).ok_or(DecodeError::InvalidBinop { offset: pos, byte })?,
        ),
        family::LD | family::LDA | family::ST => {
            let kind = LocKind::from_low(low).ok_or(DecodeError::InvalidLocationKind { offset: pos, byte })?;
            let loc = Loc::new(kind, cur.u32()?);
            match high_bits(byte) {
                family::LD => Instr::Ld(loc),
                family::LDA => Instr::Lda(loc),
                _ => Instr::St(loc),
            }
        }
        family::PATT => Instr::Patt(Patt::from_low(low).ok_or(DecodeError::InvalidPattern { offset: pos, byte })?),
        family::STOP => Instr::Stop,
        _ => {
            let op = if byte == opcode::BEGIN_ALIAS { opcode::BEGIN } else { byte };
            match op {
                opcode::CONST => Instr::Const(cur.i32()?),
                opcode::STRING => Instr::String(cur.u32()?),
                opcode::SEXP => Instr::Sexp {
                    name: cur.u32()?,
                    arity: cur.u32()?,
                },
                opcode::STI => Instr::Sti,
                opcode::STA => Instr::Sta,
                opcode::JMP => Instr::Jmp(cur.u32()?),
                opcode::END => Instr::End,
                opcode::RET => Instr::Ret,
                opcode::DROP => Instr::Drop,
                opcode::DUP => Instr::Dup,
                opcode::SWAP => Instr::Swap,
                opcode::ELEM => Instr::Elem,
                opcode::CJMP_Z => Instr::CjmpZ(cur.u32()?),
                opcode::CJMP_NZ => Instr::CjmpNz(cur.u32()?),
                opcode::BEGIN => Instr::Begin {
                    nargs: cur.u32()?,
                    nlocals: cur.u32()?,
                },
                opcode::CLOSURE => {
                    let entry = cur.u32()?;
                    let n = cur.u32()?;
                    // Capacity is bounded by what the remaining bytes could hold.
                    let mut captures = Vec::with_capacity((n as usize).min((code.len() - cur.pos) / 5));
                    for _ in 0..n {
                        let at = cur.pos;
                        let kind = cur.byte()?;
                        captures.push(cur.loc(kind, at)?);
                    }
                    Instr::Closure { entry, captures }
                }
                opcode::CALLC => Instr::CallC { argc: cur.u32()? },
                opcode::CALL => Instr::Call {
                    target: cur.u32()?,
                    argc: cur.u32()?,
                },
                opcode::TAG => Instr::Tag {
                    name: cur.u32()?,
                    arity: cur.u32()?,
                },
                opcode::ARRAY => Instr::Array(cur.u32()?),
                opcode::FAIL => Instr::Fail {
                    line: cur.u32()?,
                    column: cur.u32()?,
                },
                opcode::LINE => Instr::Line(cur.u32()?),
                opcode::CALL_READ => Instr::CallRead,
                opcode::CALL_WRITE => Instr::CallWrite,
                opcode::CALL_LENGTH => Instr::CallLength,
                opcode::CALL_STRING => Instr::CallString,
                opcode::CALL_ARRAY => Instr::CallArray(cur.u32()?),
                _ => return Err(DecodeError::UnknownOpcode { offset: pos, byte }),
            }
        }
    };

    Ok((instr, cur.pos - pos))
}

impl Instr {
    /// Appends the canonical encoding of `self` to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        fn family_byte(high: u8, low: u8) -> u8 {
            (high << super::bytecode::LOW_BITS) | low
        }
        let mut op = |byte: u8, operands: &[u32]| {
            out.push(byte);
            for v in operands {
                out.extend_from_slice(&v.to_le_bytes());
            }
        };
        match self {
            Instr::Binop(b) => op(family_byte(family::BINOP, b.low()), &[]),
            Instr::Ld(loc) => op(family_byte(family::LD, loc.kind.low()), &[loc.index]),
            Instr::Lda(loc) => op(family_byte(family::LDA, loc.kind.low()), &[loc.index]),
            Instr::St(loc) => op(family_byte(family::ST, loc.kind.low()), &[loc.index]),
            Instr::Patt(p) => op(family_byte(family::PATT, p.low()), &[]),
            Instr::Stop => op(opcode::STOP, &[]),
            Instr::Const(n) => op(opcode::CONST, &[*n as u32]),
            Instr::String(s) => op(opcode::STRING, &[*s]),
            Instr::Sexp { name, arity } => op(opcode::SEXP, &[*name, *arity]),
            Instr::Sti => op(opcode::STI, &[]),
            Instr::Sta => op(opcode::STA, &[]),
            Instr::Jmp(t) => op(opcode::JMP, &[*t]),
            Instr::End => op(opcode::END, &[]),
            Instr::Ret => op(opcode::RET, &[]),
            Instr::Drop => op(opcode::DROP, &[]),
            Instr::Dup => op(opcode::DUP, &[]),
            Instr::Swap => op(opcode::SWAP, &[]),
            Instr::Elem => op(opcode::ELEM, &[]),
            Instr::CjmpZ(t) => op(opcode::CJMP_Z, &[*t]),
            Instr::CjmpNz(t) => op(opcode::CJMP_NZ, &[*t]),
            Instr::Begin { nargs, nlocals } => op(opcode::BEGIN, &[*nargs, *nlocals]),
            Instr::Closure { entry, captures } => {
                op(opcode::CLOSURE, &[*entry, captures.len() as u32]);
                for loc in captures {
                    out.push(loc.kind.low());
                    out.extend_from_slice(&loc.index.to_le_bytes());
                }
            }
            Instr::CallC { argc } => op(opcode::CALLC, &[*argc]),
            Instr::Call { target, argc } => op(opcode::CALL, &[*target, *argc]),
            Instr::Tag { name, arity } => op(opcode::TAG, &[*name, *arity]),
            Instr::Array(n) => op(opcode::ARRAY, &[*n]),
            Instr::Fail { line, column } => op(opcode::FAIL, &[*line, *column]),
            Instr::Line(n) => op(opcode::LINE, &[*n]),
            Instr::CallRead => op(opcode::CALL_READ, &[]),
            Instr::CallWrite => op(opcode::CALL_WRITE, &[]),
            Instr::CallLength => op(opcode::CALL_LENGTH, &[]),
            Instr::CallString => op(opcode::CALL_STRING, &[]),
            Instr::CallArray(n) => op(opcode::CALL_ARRAY, &[*n]),
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            Instr::Closure { captures, .. } => 9 + 5 * captures.len(),
            Instr::Sexp { .. }
            | Instr::Begin { .. }
            | Instr::Call { .. }
            | Instr::Tag { .. }
            | Instr::Fail { .. } => 9,
            Instr::Const(_)
            | Instr::String(_)
            | Instr::Jmp(_)
            | Instr::Ld(_)
            | Instr::Lda(_)
            | Instr::St(_)
            | Instr::CjmpZ(_)
            | Instr::CjmpNz(_)
            | Instr::CallC { .. }
            | Instr::Array(_)
            | Instr::Line(_)
            | Instr::CallArray(_) => 5,
            _ => 1,
        }
    }
}

/// Encodes a straight-line instruction sequence.
pub fn assemble(instrs: &[Instr]) -> Vec<u8> {
    let mut out = Vec::with_capacity(instrs.iter().map(Instr::encoded_len).sum());
    for instr in instrs {
        instr.encode(&mut out);
    }
    out
}
