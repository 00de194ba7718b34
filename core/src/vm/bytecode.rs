//! Instruction set of the Lama stack machine.
//!
//! The first byte of every instruction splits into a 4-bit high field and a
//! 4-bit low field. Five high-field values select a *family* whose low field is
//! an operand of its own (operator, location kind or pattern kind); every other
//! byte is looked up as a full-byte opcode.

use std::fmt;

pub const LOW_BITS: u8 = 4;
pub const LOW_MASK: u8 = (1 << LOW_BITS) - 1;

pub mod family {
    pub const BINOP: u8 = 0x0;
    pub const LD: u8 = 0x2;
    pub const LDA: u8 = 0x3;
    pub const ST: u8 = 0x4;
    pub const PATT: u8 = 0x6;
    pub const STOP: u8 = 0xF;
}

pub mod opcode {
    pub const CONST: u8 = 0x10;
    pub const STRING: u8 = 0x11;
    pub const SEXP: u8 = 0x12;
    pub const STI: u8 = 0x13;
    pub const STA: u8 = 0x14;
    pub const JMP: u8 = 0x15;
    pub const END: u8 = 0x16;
    pub const RET: u8 = 0x17;
    pub const DROP: u8 = 0x18;
    pub const DUP: u8 = 0x19;
    pub const SWAP: u8 = 0x1A;
    pub const ELEM: u8 = 0x1B;
    pub const CJMP_Z: u8 = 0x50;
    pub const CJMP_NZ: u8 = 0x51;
    pub const BEGIN: u8 = 0x52;
    /// Second historical encoding of BEGIN; decodes to the same instruction.
    pub const BEGIN_ALIAS: u8 = BEGIN + 1;
    pub const CLOSURE: u8 = 0x54;
    pub const CALLC: u8 = 0x55;
    pub const CALL: u8 = 0x56;
    pub const TAG: u8 = 0x57;
    pub const ARRAY: u8 = 0x58;
    pub const FAIL: u8 = 0x59;
    pub const LINE: u8 = 0x5A;
    pub const CALL_READ: u8 = 0x70;
    pub const CALL_WRITE: u8 = 0x71;
    pub const CALL_LENGTH: u8 = 0x72;
    pub const CALL_STRING: u8 = 0x73;
    pub const CALL_ARRAY: u8 = 0x74;
    pub const STOP: u8 = 0xFF;
}

#[inline]
pub const fn high_bits(byte: u8) -> u8 {
    byte >> LOW_BITS
}

#[inline]
pub const fn low_bits(byte: u8) -> u8 {
    byte & LOW_MASK
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    pub const ALL: [BinOp; 13] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Div,
        BinOp::Rem,
        BinOp::Lt,
        BinOp::Le,
        BinOp::Gt,
        BinOp::Ge,
        BinOp::Eq,
        BinOp::Ne,
        BinOp::And,
        BinOp::Or,
    ];

    /// Low field values start at 1; 0 is not an operator.
    pub fn from_low(low: u8) -> Option<BinOp> {
        (low as usize).checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn low(self) -> u8 {
        self as u8 + 1
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::And => "&&",
            BinOp::Or => "!!",
        }
    }
}

/// Pattern predicates of the PATT family, in low-field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Patt {
    /// Structural string equality; the only predicate with two operands.
    StrEq,
    IsString,
    IsArray,
    IsSexp,
    Boxed,
    Unboxed,
    IsClosure,
}

impl Patt {
    pub const ALL: [Patt; 7] = [
        Patt::StrEq,
        Patt::IsString,
        Patt::IsArray,
        Patt::IsSexp,
        Patt::Boxed,
        Patt::Unboxed,
        Patt::IsClosure,
    ];

    pub fn from_low(low: u8) -> Option<Patt> {
        Self::ALL.get(low as usize).copied()
    }

    pub fn low(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Patt::StrEq => "=str",
            Patt::IsString => "#string",
            Patt::IsArray => "#array",
            Patt::IsSexp => "#sexp",
            Patt::Boxed => "#ref",
            Patt::Unboxed => "#val",
            Patt::IsClosure => "#fun",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocKind {
    Global,
    Local,
    Argument,
    Capture,
}

impl LocKind {
    pub fn from_low(low: u8) -> Option<LocKind> {
        match low {
            0 => Some(LocKind::Global),
            1 => Some(LocKind::Local),
            2 => Some(LocKind::Argument),
            3 => Some(LocKind::Capture),
            _ => None,
        }
    }

    pub fn low(self) -> u8 {
        self as u8
    }

    pub fn letter(self) -> char {
        match self {
            LocKind::Global => 'G',
            LocKind::Local => 'L',
            LocKind::Argument => 'A',
            LocKind::Capture => 'C',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LocKind::Global => "global",
            LocKind::Local => "local",
            LocKind::Argument => "argument",
            LocKind::Capture => "capture",
        }
    }
}

/// Addressing operand of LD/LDA/ST and of CLOSURE capture lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Loc {
    pub kind: LocKind,
    pub index: u32,
}

impl Loc {
    pub const fn new(kind: LocKind, index: u32) -> Self {
        Self { kind, index }
    }

    pub const fn global(index: u32) -> Self {
        Self::new(LocKind::Global, index)
    }

    pub const fn local(index: u32) -> Self {
        Self::new(LocKind::Local, index)
    }

    pub const fn arg(index: u32) -> Self {
        Self::new(LocKind::Argument, index)
    }

    pub const fn capture(index: u32) -> Self {
        Self::new(LocKind::Capture, index)
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind.letter(), self.index)
    }
}

/// One decoded instruction. String operands stay as raw string-table offsets;
/// they are resolved (and range-checked) when the instruction executes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instr {
    Binop(BinOp),
    Const(i32),
    String(u32),
    Sexp { name: u32, arity: u32 },
    Sti,
    Sta,
    Jmp(u32),
    End,
    Ret,
    Drop,
    Dup,
    Swap,
    Elem,
    Ld(Loc),
    Lda(Loc),
    St(Loc),
    CjmpZ(u32),
    CjmpNz(u32),
    Begin { nargs: u32, nlocals: u32 },
    Closure { entry: u32, captures: Vec<Loc> },
    CallC { argc: u32 },
    Call { target: u32, argc: u32 },
    Tag { name: u32, arity: u32 },
    Array(u32),
    Fail { line: u32, column: u32 },
    Line(u32),
    Patt(Patt),
    CallRead,
    CallWrite,
    CallLength,
    CallString,
    CallArray(u32),
    Stop,
}

impl Instr {
    /// Mnemonic used in fault reports and by the analyzer when no string table
    /// is at hand.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instr::Binop(_) => "BINOP",
            Instr::Const(_) => "CONST",
            Instr::String(_) => "STRING",
            Instr::Sexp { .. } => "SEXP",
            Instr::Sti => "STI",
            Instr::Sta => "STA",
            Instr::Jmp(_) => "JMP",
            Instr::End => "END",
            Instr::Ret => "RET",
            Instr::Drop => "DROP",
            Instr::Dup => "DUP",
            Instr::Swap => "SWAP",
            Instr::Elem => "ELEM",
            Instr::Ld(_) => "LD",
            Instr::Lda(_) => "LDA",
            Instr::St(_) => "ST",
            Instr::CjmpZ(_) => "CJMPz",
            Instr::CjmpNz(_) => "CJMPnz",
            Instr::Begin { .. } => "BEGIN",
            Instr::Closure { .. } => "CLOSURE",
            Instr::CallC { .. } => "CALLC",
            Instr::Call { .. } => "CALL",
            Instr::Tag { .. } => "TAG",
            Instr::Array(_) => "ARRAY",
            Instr::Fail { .. } => "FAIL",
            Instr::Line(_) => "LINE",
            Instr::Patt(_) => "PATT",
            Instr::CallRead => "CALL Lread",
            Instr::CallWrite => "CALL Lwrite",
            Instr::CallLength => "CALL Llength",
            Instr::CallString => "CALL Lstring",
            Instr::CallArray(_) => "CALL Barray",
            Instr::Stop => "STOP",
        }
    }

    /// Renders the instruction, resolving string operands through `strings`.
    pub fn render(&self, strings: impl Fn(u32) -> Option<String>) -> String {
        let name = |off: u32| strings(off).unwrap_or_else(|| format!("@{off}"));
        match self {
            Instr::Binop(op) => format!("BINOP\t{}", op.symbol()),
            Instr::Const(n) => format!("CONST\t{n}"),
            Instr::String(off) => format!("STRING\t{}", name(*off)),
            Instr::Sexp { name: off, arity } => format!("SEXP\t{} {arity}", name(*off)),
            Instr::Jmp(t) => format!("JMP\t{t:#010x}"),
            Instr::CjmpZ(t) => format!("CJMPz\t{t:#010x}"),
            Instr::CjmpNz(t) => format!("CJMPnz\t{t:#010x}"),
            Instr::Ld(loc) => format!("LD\t{loc}"),
            Instr::Lda(loc) => format!("LDA\t{loc}"),
            Instr::St(loc) => format!("ST\t{loc}"),
            Instr::Begin { nargs, nlocals } => format!("BEGIN\t{nargs} {nlocals}"),
            Instr::Closure { entry, captures } => {
                let mut out = format!("CLOSURE\t{entry:#010x}");
                for loc in captures {
                    out.push(' ');
                    out.push_str(&loc.to_string());
                }
                out
            }
            Instr::CallC { argc } => format!("CALLC\t{argc}"),
            Instr::Call { target, argc } => format!("CALL\t{target:#010x} {argc}"),
            Instr::Tag { name: off, arity } => format!("TAG\t{} {arity}", name(*off)),
            Instr::Array(n) => format!("ARRAY\t{n}"),
            Instr::Fail { line, column } => format!("FAIL\t{line} {column}"),
            Instr::Line(n) => format!("LINE\t{n}"),
            Instr::Patt(p) => format!("PATT\t{}", p.name()),
            Instr::CallRead => "CALL\tLread".to_string(),
            Instr::CallWrite => "CALL\tLwrite".to_string(),
            Instr::CallLength => "CALL\tLlength".to_string(),
            Instr::CallString => "CALL\tLstring".to_string(),
            Instr::CallArray(n) => format!("CALL\tBarray\t{n}"),
            other => other.mnemonic().to_string(),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(|_| None))
    }
}
