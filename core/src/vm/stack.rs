//! The operand stack ("virtual stack").
//!
//! A fixed-capacity buffer that grows downward: `top` starts at `capacity` and
//! every push decrements it. The frame pointer `fp` marks the base of the
//! current frame; pops may never cross it. Frame slots are addressed relative
//! to `fp` with plain index arithmetic, bounds-checked on every access.

use super::error::{VmError, VmResult};
use super::word::Word;

pub const DEFAULT_STACK_WORDS: usize = 1024 * 1024;

#[derive(Debug)]
pub struct OperandStack {
    slots: Box<[Word]>,
    top: usize,
    fp: usize,
}

impl OperandStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Word::NULL; capacity].into_boxed_slice(),
            top: capacity,
            fp: capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Index of the current top word (equal to `capacity` when empty).
    #[inline]
    pub fn top(&self) -> usize {
        self.top
    }

    #[inline]
    pub fn fp(&self) -> usize {
        self.fp
    }

    #[inline]
    pub fn set_fp(&mut self, fp: usize) {
        self.fp = fp;
    }

    /// Number of words currently on the stack.
    #[inline]
    pub fn depth(&self) -> usize {
        self.capacity() - self.top
    }

    /// Live words, top first. This is the range the collector scans.
    #[inline]
    pub fn live(&self) -> &[Word] {
        &self.slots[self.top..]
    }

    #[inline]
    pub fn push(&mut self, value: Word) -> VmResult<()> {
        if self.top == 0 {
            return Err(VmError::StackOverflow);
        }
        self.top -= 1;
        self.slots[self.top] = value;
        Ok(())
    }

    #[inline]
    pub fn pop(&mut self) -> VmResult<Word> {
        if self.top >= self.fp {
            return Err(VmError::StackUnderflow);
        }
        let value = self.slots[self.top];
        self.top += 1;
        Ok(value)
    }

    /// Word `depth` slots below the top (`peek(0)` is the top itself).
    pub fn peek(&self, depth: usize) -> VmResult<Word> {
        self.slots
            .get(self.top + depth)
            .copied()
            .ok_or(VmError::StackUnderflow)
    }

    pub fn push_copies(&mut self, value: Word, count: usize) -> VmResult<()> {
        if count > self.top {
            return Err(VmError::StackOverflow);
        }
        let new_top = self.top - count;
        self.slots[new_top..self.top].fill(value);
        self.top = new_top;
        Ok(())
    }

    /// Reverses the top `count` words in place.
    pub fn reverse_top(&mut self, count: usize) -> VmResult<()> {
        self.top_slice(count)?;
        self.slots[self.top..self.top + count].reverse();
        Ok(())
    }

    /// The top `count` words, top first. The range may not reach past `fp`.
    pub fn top_slice(&self, count: usize) -> VmResult<&[Word]> {
        match self.top.checked_add(count) {
            Some(end) if end <= self.fp => Ok(&self.slots[self.top..end]),
            _ => Err(VmError::StackUnderflow),
        }
    }

    /// Pops `count` words at once, with the same frame check as [`pop`](Self::pop).
    pub fn drop_n(&mut self, count: usize) -> VmResult<()> {
        match self.top.checked_add(count) {
            Some(new_top) if new_top <= self.fp => {
                self.top = new_top;
                Ok(())
            }
            _ => Err(VmError::StackUnderflow),
        }
    }

    /// Discards `count` words without the frame check; END uses it to step
    /// over the saved frame pointer.
    pub fn discard(&mut self, count: usize) -> VmResult<()> {
        let new_top = self.top.checked_add(count).filter(|t| *t <= self.capacity());
        self.top = new_top.ok_or(VmError::StackUnderflow)?;
        Ok(())
    }

    /// Moves the top back to `index` (which must lie inside the buffer).
    pub fn reset_top(&mut self, index: usize) -> VmResult<()> {
        if index > self.capacity() {
            return Err(VmError::InvalidFrame(format!("stack index {index} past the stack base")));
        }
        self.top = index;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<Word> {
        self.slots.get(index).copied()
    }

    pub fn set(&mut self, index: usize, value: Word) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl Default for OperandStack {
    fn default() -> Self {
        Self::new(DEFAULT_STACK_WORDS)
    }
}
