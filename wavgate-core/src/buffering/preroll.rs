//! Fixed-depth pre-roll memory.
//!
//! Backed by `ringbuf::HeapRb`, so pushing into a full memory overwrites the
//! oldest block in O(1) instead of shifting the whole window.

use std::fmt;

use ringbuf::{
    traits::{Consumer, Observer, RingBuffer},
    HeapRb,
};

use super::block::SampleBlock;

/// Bounded FIFO of the most recent blocks seen while no segment is recording.
pub struct PreRoll {
    ring: HeapRb<SampleBlock>,
}

impl PreRoll {
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity),
        }
    }

    /// Remember `block`, returning the evicted oldest block when full.
    pub fn push(&mut self, block: SampleBlock) -> Option<SampleBlock> {
        self.ring.push_overwrite(block)
    }

    /// Take every remembered block, oldest first, leaving the memory empty.
    pub fn drain(&mut self) -> Vec<SampleBlock> {
        self.ring.pop_iter().collect()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }

    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }
}

impl fmt::Debug for PreRoll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreRoll")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
