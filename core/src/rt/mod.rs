//! Runtime support library: heap object constructors, element access,
//! pattern predicates, tag hashing and integer I/O.
//!
//! Every allocating primitive takes the current [`Roots`] so the collector can
//! run from inside the allocation, the only place it is ever triggered.

mod gc;
mod heap;
mod render;
mod tag;

use std::io::{BufRead, Write};

pub use gc::{Collector, Roots, StackExtent};
pub use heap::{Heap, Object};
pub use render::render;
pub use tag::{MAX_TAG_LEN, de_hash, tag_hash};

use crate::config::InterpreterConfig;
use crate::vm::{Patt, Slot, VmError, VmResult, Word};

pub struct Runtime {
    heap: Heap,
    gc: Collector,
    input: Box<dyn BufRead>,
    output: Box<dyn Write>,
}

impl Runtime {
    /// Runtime wired to the process's stdin and stdout.
    pub fn new(config: &InterpreterConfig) -> Self {
        Self::with_io(
            config,
            Box::new(std::io::BufReader::new(std::io::stdin())),
            Box::new(std::io::stdout()),
        )
    }

    pub fn with_io(config: &InterpreterConfig, input: Box<dyn BufRead>, output: Box<dyn Write>) -> Self {
        Self {
            heap: Heap::new(),
            gc: Collector::new(config.gc_threshold, config.heap_limit),
            input,
            output,
        }
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn collector(&self) -> &Collector {
        &self.gc
    }

    /// One-time collector initialisation with the operand stack's extent.
    pub fn gc_init(&mut self, extent: StackExtent) {
        self.gc.init(extent);
    }

    pub fn collect(&mut self, roots: Roots<'_>) -> usize {
        self.gc.collect(&mut self.heap, roots)
    }

    fn alloc(&mut self, obj: Object, roots: Roots<'_>) -> VmResult<Word> {
        self.gc.reserve(&mut self.heap, roots)?;
        self.heap.insert(obj)
    }

    /// `Lread`: prompts with `> ` and reads one integer line.
    pub fn read_int(&mut self) -> VmResult<Word> {
        self.output.write_all(b"> ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(VmError::Io("unexpected end of input".into()));
        }
        let n = line
            .trim()
            .parse::<i32>()
            .map_err(|_| VmError::Runtime(format!("invalid integer input {:?}", line.trim())))?;
        Ok(Word::boxed(n))
    }

    /// `Lwrite`: prints the unboxed integer on its own line.
    pub fn write_int(&mut self, value: Word) -> VmResult<Word> {
        let mut buf = itoa::Buffer::new();
        self.output.write_all(buf.format(value.unbox()).as_bytes())?;
        self.output.write_all(b"\n")?;
        Ok(Word::ZERO)
    }

    pub fn flush(&mut self) -> VmResult<()> {
        self.output.flush()?;
        Ok(())
    }

    pub fn string(&mut self, bytes: &[u8], roots: Roots<'_>) -> VmResult<Word> {
        self.alloc(Object::String(bytes.to_vec()), roots)
    }

    /// `Lstring`: printed form of any value as a fresh string.
    pub fn stringify(&mut self, value: Word, roots: Roots<'_>) -> VmResult<Word> {
        let text = render(&self.heap, value);
        self.alloc(Object::String(text.into_bytes()), roots)
    }

    pub fn array(&mut self, items: Vec<Word>, roots: Roots<'_>) -> VmResult<Word> {
        self.alloc(Object::Array(items), roots)
    }

    pub fn sexp(&mut self, tag: Word, fields: Vec<Word>, roots: Roots<'_>) -> VmResult<Word> {
        self.alloc(Object::Sexp { tag, fields }, roots)
    }

    pub fn closure(&mut self, entry: u32, captures: Vec<Word>, roots: Roots<'_>) -> VmResult<Word> {
        self.alloc(Object::Closure { entry, captures }, roots)
    }

    pub fn reference(&mut self, slot: Slot, roots: Roots<'_>) -> VmResult<Word> {
        self.alloc(Object::Ref(slot), roots)
    }

    /// `Llength`: boxed element count.
    pub fn length(&self, value: Word) -> VmResult<Word> {
        let len = match self.heap.object(value, "length")? {
            Object::String(bytes) => bytes.len(),
            Object::Array(items) => items.len(),
            Object::Sexp { fields, .. } => fields.len(),
            Object::Closure { captures, .. } => captures.len() + 1,
            Object::Ref(_) => return Err(VmError::Runtime("length of a reference".into())),
        };
        Ok(Word::boxed(len as i32))
    }

    /// `Belem`: element `index` (boxed) of a string, array, sexp or closure.
    pub fn elem(&self, container: Word, index: Word) -> VmResult<Word> {
        let i = checked_index(index)?;
        let out_of_bounds = || VmError::Runtime(format!("index {i} out of bounds"));
        match self.heap.object(container, "elem")? {
            Object::String(bytes) => bytes
                .get(i)
                .map(|b| Word::boxed(*b as i32))
                .ok_or_else(out_of_bounds),
            Object::Array(items) | Object::Sexp { fields: items, .. } => {
                items.get(i).copied().ok_or_else(out_of_bounds)
            }
            Object::Closure { entry, captures } => match i {
                0 => Ok(Word::boxed(*entry as i32)),
                _ => captures.get(i - 1).copied().ok_or_else(out_of_bounds),
            },
            Object::Ref(_) => Err(VmError::Runtime("elem of a reference".into())),
        }
    }

    /// `Bsta` with an unboxed index: stores `value` into element `index` of
    /// `container` and returns `value`.
    pub fn store_elem(&mut self, container: Word, index: Word, value: Word) -> VmResult<Word> {
        let i = checked_index(index)?;
        let out_of_bounds = || VmError::Runtime(format!("index {i} out of bounds"));
        match self.heap.object_mut(container, "sta")? {
            Object::String(bytes) => *bytes.get_mut(i).ok_or_else(out_of_bounds)? = value.unbox() as u8,
            Object::Array(items) | Object::Sexp { fields: items, .. } => {
                *items.get_mut(i).ok_or_else(out_of_bounds)? = value
            }
            other => return Err(VmError::Runtime(format!("cannot store into a {}", other.kind()))),
        }
        Ok(value)
    }

    /// Target location of a reference produced by LDA.
    pub fn reference_slot(&self, reference: Word) -> VmResult<Slot> {
        match self.heap.object(reference, "sta")? {
            Object::Ref(slot) => Ok(*slot),
            other => Err(VmError::Runtime(format!("sta target is a {}, not a reference", other.kind()))),
        }
    }

    pub fn closure_entry(&self, closure: Word) -> VmResult<u32> {
        match self.heap.object(closure, "callc")? {
            Object::Closure { entry, .. } => Ok(*entry),
            other => Err(VmError::Runtime(format!("callc target is a {}, not a closure", other.kind()))),
        }
    }

    /// Captured word `index` of `closure` (entry point not counted).
    pub fn capture(&self, closure: Word, index: usize) -> VmResult<Word> {
        match self.heap.object(closure, "capture")? {
            Object::Closure { captures, .. } => captures.get(index).copied().ok_or(VmError::InvalidLocation {
                kind: "capture",
                index: index as i64,
            }),
            other => Err(VmError::Runtime(format!("capture read from a {}", other.kind()))),
        }
    }

    pub fn set_capture(&mut self, closure: Word, index: usize, value: Word) -> VmResult<()> {
        match self.heap.object_mut(closure, "capture")? {
            Object::Closure { captures, .. } => {
                let slot = captures.get_mut(index).ok_or(VmError::InvalidLocation {
                    kind: "capture",
                    index: index as i64,
                })?;
                *slot = value;
                Ok(())
            }
            other => Err(VmError::Runtime(format!("capture write to a {}", other.kind()))),
        }
    }

    /// `Btag`: is `value` a sexp with this tag and arity?
    pub fn tag_patt(&self, value: Word, tag: Word, arity: u32) -> Word {
        Word::from_bool(matches!(
            self.heap.get(value),
            Some(Object::Sexp { tag: t, fields }) if *t == tag && fields.len() == arity as usize
        ))
    }

    /// `Barray_patt`: is `value` an array of exactly `len` elements?
    pub fn array_patt(&self, value: Word, len: u32) -> Word {
        Word::from_bool(matches!(
            self.heap.get(value),
            Some(Object::Array(items)) if items.len() == len as usize
        ))
    }

    /// `Bstring_patt`: structural equality of `value` with the pattern string.
    pub fn string_patt(&self, value: Word, pattern: Word) -> VmResult<Word> {
        let Some(Object::String(expected)) = self.heap.get(pattern) else {
            return Err(VmError::Runtime("string pattern operand is not a string".into()));
        };
        Ok(Word::from_bool(matches!(
            self.heap.get(value),
            Some(Object::String(actual)) if actual == expected
        )))
    }

    /// Single-operand shape predicates (`#string`, `#array`, `#sexp`, `#ref`,
    /// `#val`, `#fun`).
    pub fn shape_patt(&self, patt: Patt, value: Word) -> VmResult<Word> {
        let obj = if value.is_unboxed() { None } else { self.heap.get(value) };
        let hit = match patt {
            Patt::IsString => matches!(obj, Some(Object::String(_))),
            Patt::IsArray => matches!(obj, Some(Object::Array(_))),
            Patt::IsSexp => matches!(obj, Some(Object::Sexp { .. })),
            Patt::IsClosure => matches!(obj, Some(Object::Closure { .. })),
            Patt::Boxed => !value.is_unboxed(),
            Patt::Unboxed => value.is_unboxed(),
            Patt::StrEq => return Err(VmError::Runtime("=str needs two operands".into())),
        };
        Ok(Word::from_bool(hit))
    }
}

fn checked_index(index: Word) -> VmResult<usize> {
    if !index.is_unboxed() {
        return Err(VmError::Runtime(format!("index {index:?} is not an integer")));
    }
    usize::try_from(index.unbox()).map_err(|_| VmError::Runtime(format!("negative index {}", index.unbox())))
}
