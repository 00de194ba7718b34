use std::fmt;

/// Malformed instruction stream or operand reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No instruction family or full-byte opcode matches this byte.
    UnknownOpcode { offset: usize, byte: u8 },
    /// BINOP family byte with a low field outside `1..=13`.
    InvalidBinop { offset: usize, byte: u8 },
    /// PATT family byte with a low field outside `0..=6`.
    InvalidPattern { offset: usize, byte: u8 },
    /// Location-kind field (LD/LDA/ST low bits or a CLOSURE capture byte) outside `0..=3`.
    InvalidLocationKind { offset: usize, byte: u8 },
    /// The code section ends inside an instruction.
    Truncated { offset: usize },
    /// Instruction cursor positioned outside the code section.
    CursorOutOfRange { offset: usize },
    /// String operand pointing past the string table.
    StringOutOfRange { offset: u32 },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownOpcode { offset, byte } => {
                write!(f, "unknown opcode {byte:#04x} at {offset:#010x}")
            }
            DecodeError::InvalidBinop { offset, byte } => {
                write!(f, "invalid binary operator {byte:#04x} at {offset:#010x}")
            }
            DecodeError::InvalidPattern { offset, byte } => {
                write!(f, "invalid pattern kind {byte:#04x} at {offset:#010x}")
            }
            DecodeError::InvalidLocationKind { offset, byte } => {
                write!(f, "invalid location kind {byte:#04x} at {offset:#010x}")
            }
            DecodeError::Truncated { offset } => write!(f, "truncated instruction at {offset:#010x}"),
            DecodeError::CursorOutOfRange { offset } => {
                write!(f, "instruction cursor {offset:#010x} outside code section")
            }
            DecodeError::StringOutOfRange { offset } => {
                write!(f, "string offset {offset} outside string table")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Every way a single instruction can fail. None of these are recoverable:
/// the dispatch loop aborts the session on the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    Decode(DecodeError),
    StackOverflow,
    StackUnderflow,
    UnsupportedOpcode(&'static str),
    Arithmetic(&'static str),
    AllocationFailure(String),
    /// A resolved global, local, argument or capture slot lies outside its area.
    InvalidLocation { kind: &'static str, index: i64 },
    /// END without a live BEGIN, or a saved frame that does not nest.
    InvalidFrame(String),
    /// The FAIL opcode: no pattern matched the scrutinee.
    PatternMatchFailure { line: u32, column: u32 },
    /// Failure reported by a runtime-support primitive.
    Runtime(String),
    Io(String),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::Decode(e) => write!(f, "decode error: {e}"),
            VmError::StackOverflow => write!(f, "virtual stack limit exceeded"),
            VmError::StackUnderflow => write!(f, "illegal pop past the frame pointer"),
            VmError::UnsupportedOpcode(name) => write!(f, "unsupported opcode {name}"),
            VmError::Arithmetic(msg) => write!(f, "arithmetic error: {msg}"),
            VmError::AllocationFailure(msg) => write!(f, "allocation failure: {msg}"),
            VmError::InvalidLocation { kind, index } => write!(f, "invalid {kind} slot {index}"),
            VmError::InvalidFrame(msg) => write!(f, "invalid call frame: {msg}"),
            VmError::PatternMatchFailure { line, column } => {
                write!(f, "match failure at {line}:{column}")
            }
            VmError::Runtime(msg) => write!(f, "runtime error: {msg}"),
            VmError::Io(msg) => write!(f, "i/o error: {msg}"),
        }
    }
}

impl std::error::Error for VmError {}

impl From<DecodeError> for VmError {
    fn from(e: DecodeError) -> Self {
        VmError::Decode(e)
    }
}

impl From<std::io::Error> for VmError {
    fn from(e: std::io::Error) -> Self {
        VmError::Io(e.to_string())
    }
}

pub type VmResult<T> = std::result::Result<T, VmError>;

/// A `VmError` together with where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub error: VmError,
    /// Code offset of the faulting instruction.
    pub offset: usize,
    /// Mnemonic of the faulting instruction, if it decoded.
    pub instr: Option<String>,
    /// Last source line announced by a LINE instruction.
    pub line: Option<u32>,
}

impl Fault {
    pub fn new(error: VmError, offset: usize) -> Self {
        Self {
            error,
            offset,
            instr: None,
            line: None,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {:#010x}", self.error, self.offset)?;
        if let Some(instr) = &self.instr {
            write!(f, " ({})", instr.replace('\t', " "))?;
        }
        if let Some(line) = self.line {
            write!(f, ", line {line}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
