//! Execution state and the calling convention.
//!
//! Frame layout, relative to the frame pointer `fp` (stack grows downward):
//!
//! ```text
//! fp + 3 + i   argument i
//! fp + 2       return address (raw code offset, 0 = halt)
//! fp + 1       argument count (raw)
//! fp + 0       saved caller fp
//! fp - 1 - i   local i
//! ```

use tracing::trace;

use super::bytecode::{Loc, LocKind};
use super::error::{VmError, VmResult};
use super::image::BytecodeImage;
use super::stack::OperandStack;
use super::word::Word;

/// Arguments the synthetic entry frame hands to the first function (`argc`,
/// `argv`).
const ENTRY_ARGS: usize = 2;

/// A resolved storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Global(usize),
    /// Absolute operand-stack index.
    Stack(usize),
    /// Captured word `index` of a closure object.
    Capture { closure: Word, index: usize },
}

#[derive(Debug)]
pub struct ExecutionState {
    pub(crate) image: BytecodeImage,
    pub(crate) stack: OperandStack,
    /// Next instruction offset; `None` once the entry frame has returned.
    pub(crate) ip: Option<usize>,
    /// Last line announced by LINE.
    pub(crate) line: Option<u32>,
    /// Frames opened by BEGIN and not yet closed by END.
    frames: usize,
}

impl ExecutionState {
    /// Sets up the synthetic caller frame of the entry function and positions
    /// the cursor at code offset 0.
    pub fn new(image: BytecodeImage, stack_words: usize) -> VmResult<Self> {
        let mut stack = OperandStack::new(stack_words);
        stack.push(Word::NULL)?; // argv
        stack.push(Word::ZERO)?; // argc
        stack.push(Word::NULL)?; // return address: halt
        stack.push(Word::from_index(ENTRY_ARGS))?;
        Ok(Self {
            image,
            stack,
            ip: Some(0),
            line: None,
            frames: 0,
        })
    }

    pub fn image(&self) -> &BytecodeImage {
        &self.image
    }

    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    pub fn ip(&self) -> Option<usize> {
        self.ip
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn jump(&mut self, target: u32) {
        self.ip = Some(target as usize);
    }

    /// CALL: arguments are reversed into callee order, then the return address
    /// and argument count are pushed.
    pub fn call(&mut self, target: u32, argc: u32) -> VmResult<()> {
        self.enter(target, argc as usize, argc as usize)
    }

    /// CALLC: like [`call`](Self::call), with the closure itself counted as one
    /// more argument sitting past the explicit ones.
    pub fn call_closure(&mut self, entry: u32, argc: u32) -> VmResult<()> {
        self.enter(entry, argc as usize, argc as usize + 1)
    }

    fn enter(&mut self, target: u32, argc: usize, frame_args: usize) -> VmResult<()> {
        let ret = self
            .ip
            .ok_or_else(|| VmError::InvalidFrame("call after halt".into()))?;
        self.stack.reverse_top(argc)?;
        self.stack.push(Word::from_index(ret))?;
        self.stack.push(Word::from_index(frame_args))?;
        trace!(target: "lama::vm", to = target, argc, ret, "call");
        self.jump(target);
        Ok(())
    }

    /// BEGIN: saves the caller's fp, opens the frame and zero-fills locals.
    pub fn begin(&mut self, nlocals: u32) -> VmResult<()> {
        self.stack.push(Word::from_index(self.stack.fp()))?;
        self.stack.set_fp(self.stack.top());
        self.stack.push_copies(Word::ZERO, nlocals as usize)?;
        self.frames += 1;
        Ok(())
    }

    /// END: closes the current frame, drops the callee's arguments and leaves
    /// the return value in their place.
    pub fn end(&mut self) -> VmResult<()> {
        if self.frames == 0 {
            return Err(VmError::InvalidFrame("END without a matching BEGIN".into()));
        }
        let value = self.stack.pop()?;
        let fp = self.stack.fp();
        self.stack.reset_top(fp)?;
        let saved = self
            .stack
            .get(fp)
            .ok_or_else(|| VmError::InvalidFrame(format!("frame pointer {fp} outside the stack")))?
            .as_index();
        if saved <= fp || saved > self.stack.capacity() {
            return Err(VmError::InvalidFrame(format!(
                "saved frame pointer {saved} does not enclose frame at {fp}"
            )));
        }
        self.stack.discard(1)?;
        self.stack.set_fp(saved);

        let nargs = self.stack.pop()?.as_index();
        let ret = self.stack.pop()?;
        self.stack.drop_n(nargs)?;
        self.stack.push(value)?;
        self.frames -= 1;

        self.ip = (!ret.is_null()).then_some(ret.as_index());
        trace!(target: "lama::vm", ret = ?self.ip, nargs, "return");
        Ok(())
    }

    /// Maps a location operand onto the slot it names in the current frame.
    pub fn resolve(&self, loc: Loc) -> VmResult<Slot> {
        let index = loc.index as usize;
        let invalid = || VmError::InvalidLocation {
            kind: loc.kind.name(),
            index: loc.index as i64,
        };
        let fp = self.stack.fp();
        match loc.kind {
            LocKind::Global => {
                if index >= self.image.globals().len() {
                    return Err(invalid());
                }
                Ok(Slot::Global(index))
            }
            LocKind::Local => fp
                .checked_sub(index + 1)
                .filter(|slot| *slot >= self.stack.top())
                .map(Slot::Stack)
                .ok_or_else(invalid),
            LocKind::Argument => fp
                .checked_add(3 + index)
                .filter(|slot| *slot < self.stack.capacity())
                .map(Slot::Stack)
                .ok_or_else(invalid),
            LocKind::Capture => {
                let closure = self.current_closure()?;
                Ok(Slot::Capture { closure, index })
            }
        }
    }

    /// The closure passed by CALLC as the implicit last argument.
    fn current_closure(&self) -> VmResult<Word> {
        if self.frames == 0 {
            return Err(VmError::InvalidFrame("capture access outside a function".into()));
        }
        let fp = self.stack.fp();
        let nargs = self
            .stack
            .get(fp + 1)
            .ok_or_else(|| VmError::InvalidFrame("frame header outside the stack".into()))?
            .as_index();
        self.stack
            .get(fp + 2 + nargs)
            .filter(|_| nargs > 0)
            .ok_or_else(|| VmError::InvalidFrame("frame carries no closure argument".into()))
    }

    /// Reads a global or stack slot. Capture slots live in the heap and are
    /// handled by the interpreter.
    pub fn read(&self, slot: Slot) -> VmResult<Word> {
        match slot {
            Slot::Global(i) => self.image.global(i),
            Slot::Stack(i) => self.stack.get(i).ok_or(VmError::InvalidLocation {
                kind: "stack",
                index: i as i64,
            }),
            Slot::Capture { .. } => Err(VmError::Runtime("capture slot read without heap".into())),
        }
    }

    pub fn write(&mut self, slot: Slot, value: Word) -> VmResult<()> {
        match slot {
            Slot::Global(i) => self.image.set_global(i, value),
            Slot::Stack(i) if self.stack.set(i, value) => Ok(()),
            Slot::Stack(i) => Err(VmError::InvalidLocation {
                kind: "stack",
                index: i as i64,
            }),
            Slot::Capture { .. } => Err(VmError::Runtime("capture slot write without heap".into())),
        }
    }
}
