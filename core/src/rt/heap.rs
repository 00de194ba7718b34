//! Object arena behind boxed words.
//!
//! A boxed word for the object in arena slot `i` is `(i + 1) << 1`: always even
//! and never the null sentinel. Freed slots are recycled through a free list.

use crate::vm::{Slot, VmError, VmResult, Word};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    String(Vec<u8>),
    Array(Vec<Word>),
    Sexp { tag: Word, fields: Vec<Word> },
    /// Code entry offset plus captured words. Element 0 of a closure, as seen
    /// by `elem`, is the entry itself.
    Closure { entry: u32, captures: Vec<Word> },
    /// Location reference produced by LDA.
    Ref(Slot),
}

impl Object {
    pub fn kind(&self) -> &'static str {
        match self {
            Object::String(_) => "string",
            Object::Array(_) => "array",
            Object::Sexp { .. } => "sexp",
            Object::Closure { .. } => "closure",
            Object::Ref(_) => "reference",
        }
    }

    /// Words this object keeps alive.
    pub(crate) fn children(&self) -> &[Word] {
        match self {
            Object::Array(items) => items,
            Object::Sexp { fields, .. } => fields,
            Object::Closure { captures, .. } => captures,
            Object::String(_) | Object::Ref(_) => &[],
        }
    }
}

#[derive(Debug, Default)]
pub struct Heap {
    pub(crate) objects: Vec<Option<Object>>,
    pub(crate) free: Vec<usize>,
    pub(crate) live: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    #[inline]
    pub(crate) fn handle_of(word: Word) -> Option<usize> {
        if word.is_unboxed() || word.is_null() {
            return None;
        }
        Some((word.raw() >> 1) as usize - 1)
    }

    #[inline]
    fn word_of(handle: usize) -> Word {
        Word::from_raw(((handle as u32) + 1) << 1)
    }

    /// Index of the object `word` refers to, if it names a live slot.
    pub(crate) fn live_handle(&self, word: Word) -> Option<usize> {
        let h = Self::handle_of(word)?;
        matches!(self.objects.get(h), Some(Some(_))).then_some(h)
    }

    pub(crate) fn insert(&mut self, obj: Object) -> VmResult<Word> {
        let handle = match self.free.pop() {
            Some(h) => {
                self.objects[h] = Some(obj);
                h
            }
            None => {
                let h = self.objects.len();
                if h >= (u32::MAX >> 2) as usize {
                    return Err(VmError::AllocationFailure("object handle space exhausted".into()));
                }
                self.objects.push(Some(obj));
                h
            }
        };
        self.live += 1;
        Ok(Self::word_of(handle))
    }

    pub fn get(&self, word: Word) -> Option<&Object> {
        Self::handle_of(word).and_then(|h| self.objects.get(h)).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, word: Word) -> Option<&mut Object> {
        Self::handle_of(word)
            .and_then(|h| self.objects.get_mut(h))
            .and_then(Option::as_mut)
    }

    /// Like [`Heap::get`] but faults on words that are not live objects.
    pub fn object(&self, word: Word, what: &str) -> VmResult<&Object> {
        self.get(word)
            .ok_or_else(|| VmError::Runtime(format!("{what}: {word:?} is not a heap object")))
    }

    pub fn object_mut(&mut self, word: Word, what: &str) -> VmResult<&mut Object> {
        self.get_mut(word)
            .ok_or_else(|| VmError::Runtime(format!("{what}: {word:?} is not a heap object")))
    }

    pub(crate) fn release(&mut self, handle: usize) {
        if let Some(slot) = self.objects.get_mut(handle)
            && slot.take().is_some()
        {
            self.free.push(handle);
            self.live -= 1;
        }
    }
}
