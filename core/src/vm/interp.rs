//! The dispatch loop.

use std::io::{BufRead, Write};

use tracing::{info, trace};

use super::bytecode::{BinOp, Instr, Loc, Patt};
use super::decode::decode;
use super::error::{Fault, VmError, VmResult};
use super::image::BytecodeImage;
use super::stack::OperandStack;
use super::state::{ExecutionState, Slot};
use super::word::Word;
use crate::config::InterpreterConfig;
use crate::rt::{Roots, Runtime, StackExtent, tag_hash};

/// Outcome of a single [`Interpreter::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Halted,
}

pub struct Interpreter {
    state: ExecutionState,
    runtime: Runtime,
    steps: u64,
    last_ip: usize,
}

/// Collector roots as of right now: the live stack range and the global area.
macro_rules! roots {
    ($state:expr) => {
        Roots::new($state.stack.live(), $state.image.globals())
    };
}

impl Interpreter {
    /// Interpreter over the process's stdin/stdout.
    pub fn new(image: BytecodeImage, config: &InterpreterConfig) -> VmResult<Self> {
        let runtime = Runtime::new(config);
        Self::with_runtime(image, config, runtime)
    }

    pub fn with_io(
        image: BytecodeImage,
        config: &InterpreterConfig,
        input: Box<dyn BufRead>,
        output: Box<dyn Write>,
    ) -> VmResult<Self> {
        let runtime = Runtime::with_io(config, input, output);
        Self::with_runtime(image, config, runtime)
    }

    fn with_runtime(image: BytecodeImage, config: &InterpreterConfig, mut runtime: Runtime) -> VmResult<Self> {
        let state = ExecutionState::new(image, config.stack_words)?;
        runtime.gc_init(StackExtent::of_capacity(state.stack.capacity()));
        Ok(Self {
            state,
            runtime,
            steps: 0,
            last_ip: 0,
        })
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn stack(&self) -> &OperandStack {
        &self.state.stack
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn ip(&self) -> Option<usize> {
        self.state.ip
    }

    /// Instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Runs until the entry frame returns or an instruction faults.
    pub fn run(&mut self) -> Result<(), Fault> {
        info!(
            target: "lama::vm",
            code = self.state.image.code().len(),
            globals = self.state.image.globals().len(),
            stack = self.state.stack.capacity(),
            "session started"
        );
        let outcome = loop {
            match self.step() {
                Ok(Step::Continue) => continue,
                Ok(Step::Halted) => break Ok(()),
                Err(fault) => break Err(fault),
            }
        };
        let flushed = self.runtime.flush().map_err(|e| Fault::new(e, self.last_ip));
        info!(
            target: "lama::vm",
            steps = self.steps,
            collections = self.runtime.collector().collections(),
            ok = outcome.is_ok(),
            "session finished"
        );
        outcome.and(flushed)
    }

    /// Decodes and executes one instruction.
    pub fn step(&mut self) -> Result<Step, Fault> {
        let Some(ip) = self.state.ip else {
            return Ok(Step::Halted);
        };
        self.last_ip = ip;
        let (instr, len) = decode(self.state.image.code(), ip).map_err(|e| self.fault(e.into(), ip, None))?;
        trace!(
            target: "lama::vm::dispatch",
            ip,
            depth = self.state.stack.depth(),
            "{}",
            instr.render(|off| self.state.image.string_lossy(off))
        );
        self.state.ip = Some(ip + len);
        self.execute(&instr).map_err(|e| self.fault(e, ip, Some(&instr)))?;
        self.steps += 1;
        Ok(if self.state.ip.is_some() {
            Step::Continue
        } else {
            Step::Halted
        })
    }

    fn fault(&self, error: VmError, offset: usize, instr: Option<&Instr>) -> Fault {
        Fault {
            error,
            offset,
            instr: instr.map(|i| i.render(|off| self.state.image.string_lossy(off))),
            line: self.state.line,
        }
    }

    fn execute(&mut self, instr: &Instr) -> VmResult<()> {
        let st = &mut self.state;
        match instr {
            Instr::Binop(op) => {
                let b = st.stack.pop()?.unbox();
                let a = st.stack.pop()?.unbox();
                st.stack.push(Word::boxed(binop(*op, a, b)?))?;
            }
            Instr::Const(n) => st.stack.push(Word::boxed(*n))?,
            Instr::String(off) => {
                let bytes = st.image.string_at(*off)?;
                let s = self.runtime.string(bytes, roots!(st))?;
                st.stack.push(s)?;
            }
            Instr::Sexp { name, arity } => {
                let tag = tag_hash(st.image.string_at(*name)?)?;
                let n = *arity as usize;
                let fields = natural_order(st.stack.top_slice(n)?);
                let sexp = self.runtime.sexp(tag, fields, roots!(st))?;
                st.stack.drop_n(n)?;
                st.stack.push(sexp)?;
            }
            Instr::Sti => return Err(VmError::UnsupportedOpcode("STI")),
            Instr::Ret => return Err(VmError::UnsupportedOpcode("RET")),
            Instr::Stop => return Err(VmError::UnsupportedOpcode("STOP")),
            Instr::Sta => {
                let value = st.stack.peek(0)?;
                let index = st.stack.peek(1)?;
                if index.is_unboxed() {
                    let container = st.stack.peek(2)?;
                    self.runtime.store_elem(container, index, value)?;
                    st.stack.drop_n(3)?;
                } else {
                    let slot = self.runtime.reference_slot(index)?;
                    self.store(slot, value)?;
                    self.state.stack.drop_n(2)?;
                }
                self.state.stack.push(value)?;
            }
            Instr::Jmp(target) => st.jump(*target),
            Instr::CjmpZ(target) => {
                if st.stack.pop()?.unbox() == 0 {
                    st.jump(*target);
                }
            }
            Instr::CjmpNz(target) => {
                if st.stack.pop()?.unbox() != 0 {
                    st.jump(*target);
                }
            }
            Instr::End => st.end()?,
            Instr::Drop => {
                st.stack.pop()?;
            }
            Instr::Dup => {
                let top = st.stack.pop()?;
                st.stack.push_copies(top, 2)?;
            }
            Instr::Swap => {
                let a = st.stack.pop()?;
                let b = st.stack.pop()?;
                st.stack.push(a)?;
                st.stack.push(b)?;
            }
            Instr::Elem => {
                let index = st.stack.pop()?;
                let container = st.stack.pop()?;
                let value = self.runtime.elem(container, index)?;
                st.stack.push(value)?;
            }
            Instr::Ld(loc) => {
                let value = self.load(*loc)?;
                self.state.stack.push(value)?;
            }
            Instr::Lda(loc) => {
                let slot = st.resolve(*loc)?;
                let reference = self.runtime.reference(slot, roots!(st))?;
                st.stack.push(reference)?;
            }
            Instr::St(loc) => {
                let value = st.stack.pop()?;
                let slot = st.resolve(*loc)?;
                self.store(slot, value)?;
                self.state.stack.push(value)?;
            }
            Instr::Begin { nlocals, .. } => st.begin(*nlocals)?,
            Instr::Closure { entry, captures } => {
                let mut values = Vec::with_capacity(captures.len());
                for loc in captures {
                    values.push(self.load(*loc)?);
                }
                let st = &mut self.state;
                let closure = self.runtime.closure(*entry, values, roots!(st))?;
                st.stack.push(closure)?;
            }
            Instr::CallC { argc } => {
                let closure = st.stack.peek(*argc as usize)?;
                let entry = self.runtime.closure_entry(closure)?;
                st.call_closure(entry, *argc)?;
            }
            Instr::Call { target, argc } => st.call(*target, *argc)?,
            Instr::Tag { name, arity } => {
                let tag = tag_hash(st.image.string_at(*name)?)?;
                let value = st.stack.pop()?;
                st.stack.push(self.runtime.tag_patt(value, tag, *arity))?;
            }
            Instr::Array(len) => {
                let value = st.stack.pop()?;
                st.stack.push(self.runtime.array_patt(value, *len))?;
            }
            Instr::Fail { line, column } => {
                return Err(VmError::PatternMatchFailure {
                    line: *line,
                    column: *column,
                });
            }
            Instr::Line(n) => st.line = Some(*n),
            Instr::Patt(Patt::StrEq) => {
                let pattern = st.stack.pop()?;
                let value = st.stack.pop()?;
                st.stack.push(self.runtime.string_patt(value, pattern)?)?;
            }
            Instr::Patt(patt) => {
                let value = st.stack.pop()?;
                st.stack.push(self.runtime.shape_patt(*patt, value)?)?;
            }
            Instr::CallRead => {
                let n = self.runtime.read_int()?;
                st.stack.push(n)?;
            }
            Instr::CallWrite => {
                let value = st.stack.pop()?;
                let unit = self.runtime.write_int(value)?;
                st.stack.push(unit)?;
            }
            Instr::CallLength => {
                let value = st.stack.pop()?;
                st.stack.push(self.runtime.length(value)?)?;
            }
            Instr::CallString => {
                let value = st.stack.peek(0)?;
                let s = self.runtime.stringify(value, roots!(st))?;
                st.stack.drop_n(1)?;
                st.stack.push(s)?;
            }
            Instr::CallArray(len) => {
                let n = *len as usize;
                let items = natural_order(st.stack.top_slice(n)?);
                let array = self.runtime.array(items, roots!(st))?;
                st.stack.drop_n(n)?;
                st.stack.push(array)?;
            }
        }
        Ok(())
    }

    fn load(&self, loc: Loc) -> VmResult<Word> {
        match self.state.resolve(loc)? {
            Slot::Capture { closure, index } => self.runtime.capture(closure, index),
            slot => self.state.read(slot),
        }
    }

    fn store(&mut self, slot: Slot, value: Word) -> VmResult<()> {
        match slot {
            Slot::Capture { closure, index } => self.runtime.set_capture(closure, index, value),
            slot => self.state.write(slot, value),
        }
    }
}

/// Operands pushed left to right sit top-first on the stack.
fn natural_order(top_first: &[Word]) -> Vec<Word> {
    top_first.iter().rev().copied().collect()
}

fn binop(op: BinOp, a: i32, b: i32) -> VmResult<i32> {
    Ok(match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(VmError::Arithmetic("division by zero"));
            }
            a.wrapping_div(b)
        }
        BinOp::Rem => {
            if b == 0 {
                return Err(VmError::Arithmetic("remainder by zero"));
            }
            a.wrapping_rem(b)
        }
        BinOp::Lt => (a < b) as i32,
        BinOp::Le => (a <= b) as i32,
        BinOp::Gt => (a > b) as i32,
        BinOp::Ge => (a >= b) as i32,
        BinOp::Eq => (a == b) as i32,
        BinOp::Ne => (a != b) as i32,
        BinOp::And => (a != 0 && b != 0) as i32,
        BinOp::Or => (a != 0 || b != 0) as i32,
    })
}
