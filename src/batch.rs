//! Batch splitting for large target sets.
//!
//! Stores cap how many rows a single statement may touch. The splitter cuts a
//! request into sub-batches no larger than that cap; the lock manager runs all
//! of them inside one store transaction so the request stays atomic.

/// Default upper bound on targets per store statement.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Splits target lists into bounded, order-preserving sub-batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSplitter {
    max_batch_size: usize,
}

impl BatchSplitter {
    /// A batch size of zero is treated as one.
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Tighten the bound to a store-declared statement limit, if any.
    pub fn clamped_to(self, store_limit: Option<usize>) -> Self {
        match store_limit {
            Some(limit) => Self::new(self.max_batch_size.min(limit)),
            None => self,
        }
    }

    /// Iterate over consecutive sub-slices in input order.
    pub fn split<'a, T>(&self, items: &'a [T]) -> std::slice::Chunks<'a, T> {
        items.chunks(self.max_batch_size)
    }

    /// Number of sub-batches `len` items produce.
    pub fn batch_count(&self, len: usize) -> usize {
        len.div_ceil(self.max_batch_size)
    }
}

impl Default for BatchSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BATCH_SIZE)
    }
}
