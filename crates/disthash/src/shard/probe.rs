//! The linear probe sequence shared by insert and find.
//!
//! An empty slot met during `find` only proves absence because `insert`
//! walks exactly the same sequence from exactly the same start. Both
//! operations therefore iterate this type and nothing else.

/// Slot indices `start, start + 1, ...` modulo `capacity`, each visited once.
#[derive(Debug, Clone)]
pub(crate) struct ProbeSequence {
    start: usize,
    capacity: usize,
    step: usize,
}

impl ProbeSequence {
    /// Probe sequence for a key hashing to `hash` in a shard of `capacity` slots.
    ///
    /// `capacity` must be non-zero; `Shard` enforces this at construction.
    pub(crate) fn new(hash: u64, capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            start: (hash % capacity as u64) as usize,
            capacity,
            step: 0,
        }
    }

    pub(crate) fn start(&self) -> usize {
        self.start
    }
}

impl Iterator for ProbeSequence {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.step == self.capacity {
            return None;
        }
        let slot = (self.start + self.step) % self.capacity;
        self.step += 1;
        Some(slot)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.capacity - self.step;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ProbeSequence {}
