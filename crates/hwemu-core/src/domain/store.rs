//! Per-device pair store and matcher.
//!
//! Pairs live in an arena of slots addressed by pair index.  A bitmap
//! allocator hands out the lowest free index, so a deleted pair's index is
//! reused by the next insertion.  Iteration and matching walk the slots in
//! index order.

use crate::domain::index::IndexAllocator;
use crate::domain::pair::{Pair, PairSpec};
use crate::error::CoreError;

/// The pairs configured on one device.
#[derive(Debug, Clone)]
pub struct PairStore {
    slots: Vec<Option<Pair>>,
    indices: IndexAllocator,
}

impl PairStore {
    /// Creates an empty store holding at most `capacity` pairs.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            indices: IndexAllocator::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.indices.capacity()
    }

    /// Number of stored pairs.
    pub fn len(&self) -> usize {
        self.indices.taken()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a pair at the lowest free index and returns that index.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Malformed`] if the pair violates size or period limits.
    /// - [`CoreError::Duplicate`] if a synchronous pair with the same request
    ///   already exists.
    /// - [`CoreError::OutOfCapacity`] if every index is taken.
    /// - [`CoreError::OutOfMemory`] if the slot arena cannot grow.
    pub fn add(&mut self, spec: PairSpec) -> Result<usize, CoreError> {
        spec.validate()?;

        if let Some(existing) = spec.request().and_then(|r| self.find(r)) {
            return Err(CoreError::Duplicate {
                existing: existing.index(),
            });
        }

        let index = self.indices.lowest_free().ok_or(CoreError::OutOfCapacity {
            max: self.capacity(),
        })?;

        if index >= self.slots.len() {
            let extra = index + 1 - self.slots.len();
            self.slots
                .try_reserve(extra)
                .map_err(|_| CoreError::OutOfMemory)?;
            self.slots.resize_with(index + 1, || None);
        }

        self.indices.take(index);
        self.slots[index] = Some(Pair::new(index, spec));
        Ok(index)
    }

    /// Removes the pair at `index` and returns its spec.
    ///
    /// # Errors
    ///
    /// [`CoreError::OutOfRange`] for an index beyond capacity,
    /// [`CoreError::NotFound`] for a free index.
    pub fn remove(&mut self, index: usize) -> Result<PairSpec, CoreError> {
        self.check_range(index)?;
        let pair = self
            .slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| not_found(index))?;
        self.indices.release(index);
        Ok(pair.spec().clone())
    }

    /// Removes every pair.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.indices.clear();
    }

    /// Returns the pair at `index`.
    ///
    /// # Errors
    ///
    /// Same as [`remove`](Self::remove).
    pub fn get(&self, index: usize) -> Result<&Pair, CoreError> {
        self.check_range(index)?;
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .ok_or_else(|| not_found(index))
    }

    /// Finds the synchronous pair whose request is exactly `request`.
    ///
    /// Periodic pairs are never matched.  Prefixes and extensions of a stored
    /// request do not match.
    pub fn find(&self, request: &[u8]) -> Option<&Pair> {
        self.iter().find(|p| p.matches(request))
    }

    /// The response mapped to `request`, if any.
    pub fn find_response(&self, request: &[u8]) -> Option<&[u8]> {
        self.find(request).map(|p| p.spec().response())
    }

    /// Stored pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Pair> {
        self.slots.iter().flatten()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pair> {
        self.slots.iter_mut().flatten()
    }

    fn check_range(&self, index: usize) -> Result<(), CoreError> {
        if index >= self.capacity() {
            return Err(CoreError::OutOfRange {
                index,
                max: self.capacity(),
            });
        }
        Ok(())
    }
}

fn not_found(index: usize) -> CoreError {
    CoreError::NotFound(format!("pair {index}"))
}
