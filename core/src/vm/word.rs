//! Machine words and the boxing discipline.
//!
//! Every value the interpreter moves around is a 32-bit word. Words with the
//! low bit set are *unboxed* 31-bit signed integers (`(n << 1) | 1`); words with
//! the low bit clear are *boxed* references into the runtime heap, or the raw
//! null sentinel `0`.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Word(u32);

impl Word {
    /// Raw zero: the null sentinel, also used for the synthetic entry frame.
    pub const NULL: Word = Word(0);
    /// `BOX(0)`, the initial value of every local slot and the boolean `false`.
    pub const ZERO: Word = Word::boxed(0);
    pub const TRUE: Word = Word::boxed(1);

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Word(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// `BOX(n) = (n << 1) | 1`. Bits shifted out of the top are lost, exactly as
    /// with the native 32-bit representation.
    #[inline]
    pub const fn boxed(n: i32) -> Self {
        Word(((n as u32) << 1) | 1)
    }

    /// `UNBOX(x) = x >> 1` with an arithmetic shift.
    #[inline]
    pub const fn unbox(self) -> i32 {
        (self.0 as i32) >> 1
    }

    /// `UNBOXED(x) = x & 1`.
    #[inline]
    pub const fn is_unboxed(self) -> bool {
        self.0 & 1 == 1
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn from_bool(b: bool) -> Self {
        if b { Word::TRUE } else { Word::ZERO }
    }

    /// Index-valued words (saved frame pointers, arg counts, return addresses)
    /// are stored raw.
    #[inline]
    pub const fn from_index(idx: usize) -> Self {
        Word(idx as u32)
    }

    #[inline]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unboxed() {
            write!(f, "Int({})", self.unbox())
        } else {
            write!(f, "Ref({:#010x})", self.0)
        }
    }
}
