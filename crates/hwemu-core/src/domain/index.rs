//! Bounded index allocator backed by a fixed-size bitmap.
//!
//! Devices and pairs are identified by small integers drawn from a
//! `[0, capacity)` range.  The allocator always hands out the lowest free
//! index, so indices freed by a deletion are reused before any higher one.

const WORD_BITS: usize = u64::BITS as usize;

/// A free-index bitmap over `[0, capacity)`.
#[derive(Debug, Clone)]
pub struct IndexAllocator {
    words: Vec<u64>,
    capacity: usize,
    taken: usize,
}

impl IndexAllocator {
    /// Creates an allocator with every index in `[0, capacity)` free.
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(WORD_BITS)],
            capacity,
            taken: 0,
        }
    }

    /// Upper bound (exclusive) of the index range.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of indices currently taken.
    pub fn taken(&self) -> usize {
        self.taken
    }

    /// Returns the lowest free index without taking it.
    pub fn lowest_free(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != u64::MAX)
            .map(|(i, w)| i * WORD_BITS + w.trailing_ones() as usize)
            .filter(|&idx| idx < self.capacity)
    }

    /// Takes the lowest free index, or `None` if the range is exhausted.
    pub fn allocate(&mut self) -> Option<usize> {
        let idx = self.lowest_free()?;
        self.take(idx);
        Some(idx)
    }

    /// Returns `true` if `index` is currently taken.
    pub fn is_taken(&self, index: usize) -> bool {
        index < self.capacity && self.words[index / WORD_BITS] & (1u64 << (index % WORD_BITS)) != 0
    }

    /// Marks `index` as taken.  Out-of-range or already-taken indices are ignored.
    pub fn take(&mut self, index: usize) {
        if index < self.capacity && !self.is_taken(index) {
            self.words[index / WORD_BITS] |= 1u64 << (index % WORD_BITS);
            self.taken += 1;
        }
    }

    /// Returns `index` to the free pool.  Out-of-range or free indices are ignored.
    pub fn release(&mut self, index: usize) {
        if self.is_taken(index) {
            self.words[index / WORD_BITS] &= !(1u64 << (index % WORD_BITS));
            self.taken -= 1;
        }
    }

    /// Frees every index.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
        self.taken = 0;
    }
}
