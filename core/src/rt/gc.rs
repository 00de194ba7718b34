//! Mark-and-sweep collector for the object arena.
//!
//! The interpreter publishes the operand stack's extent once through
//! [`Collector::init`]; afterwards collections only happen inside allocation
//! primitives. Roots are scanned conservatively: any even word that names a
//! live arena slot keeps that object alive, so saved frame pointers and return
//! addresses on the stack can at worst retain garbage, never free live data.

use tracing::debug;

use super::heap::{Heap, Object};
use crate::vm::{Slot, VmError, VmResult, Word};

/// Bounds of the operand stack as published to the collector: the scan range
/// is `[top, base)` of a buffer with `base == capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackExtent {
    pub base: usize,
    pub limit: usize,
}

impl StackExtent {
    pub fn of_capacity(capacity: usize) -> Self {
        Self {
            base: capacity,
            limit: 0,
        }
    }
}

/// Everything a collection may treat as a root.
#[derive(Debug, Clone, Copy)]
pub struct Roots<'a> {
    /// Live operand-stack words.
    pub stack: &'a [Word],
    pub globals: &'a [Word],
}

impl<'a> Roots<'a> {
    pub const EMPTY: Roots<'static> = Roots { stack: &[], globals: &[] };

    pub fn new(stack: &'a [Word], globals: &'a [Word]) -> Self {
        Self { stack, globals }
    }
}

#[derive(Debug)]
pub struct Collector {
    extent: Option<StackExtent>,
    threshold: usize,
    limit: usize,
    collections: u64,
}

impl Collector {
    pub fn new(threshold: usize, limit: usize) -> Self {
        Self {
            extent: None,
            threshold: threshold.max(1),
            limit,
            collections: 0,
        }
    }

    pub fn init(&mut self, extent: StackExtent) {
        debug!(target: "lama::rt::gc", base = extent.base, limit = extent.limit, "stack extent published");
        self.extent = Some(extent);
    }

    pub fn extent(&self) -> Option<StackExtent> {
        self.extent
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }

    /// Called before every allocation; collects when the live count has
    /// reached the threshold and fails once the hard limit is hit.
    pub fn reserve(&mut self, heap: &mut Heap, roots: Roots<'_>) -> VmResult<()> {
        let extent = self
            .extent
            .ok_or_else(|| VmError::AllocationFailure("collector used before stack extent was published".into()))?;
        if roots.stack.len() > extent.base - extent.limit {
            return Err(VmError::AllocationFailure("root range exceeds published stack extent".into()));
        }
        if heap.live() < self.threshold && heap.live() < self.limit {
            return Ok(());
        }
        self.collect(heap, roots);
        if heap.live() >= self.limit {
            return Err(VmError::AllocationFailure(format!(
                "{} live objects, limit is {}",
                heap.live(),
                self.limit
            )));
        }
        self.threshold = self.threshold.max(heap.live().saturating_mul(2));
        Ok(())
    }

    /// Runs one full collection; returns the number of objects freed.
    pub fn collect(&mut self, heap: &mut Heap, roots: Roots<'_>) -> usize {
        let mut marks = vec![false; heap.objects.len()];
        let mut work: Vec<usize> = Vec::new();

        let mark = |word: Word, work: &mut Vec<usize>, marks: &mut Vec<bool>| {
            if let Some(h) = heap.live_handle(word)
                && !marks[h]
            {
                marks[h] = true;
                work.push(h);
            }
        };

        for &w in roots.stack.iter().chain(roots.globals) {
            mark(w, &mut work, &mut marks);
        }
        while let Some(h) = work.pop() {
            let Some(obj) = heap.objects[h].as_ref() else { continue };
            for &child in obj.children() {
                mark(child, &mut work, &mut marks);
            }
            if let Object::Ref(Slot::Capture { closure, .. }) = obj {
                mark(*closure, &mut work, &mut marks);
            }
        }

        let before = heap.live();
        for (h, marked) in marks.iter().enumerate() {
            if !marked {
                heap.release(h);
            }
        }
        let freed = before - heap.live();
        self.collections += 1;
        debug!(
            target: "lama::rt::gc",
            cycle = self.collections,
            freed,
            live = heap.live(),
            "collection finished"
        );
        freed
    }
}
