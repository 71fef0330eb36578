//! Fixed-capacity history of the most recent inputs.
//!
//! Appending past capacity drops the oldest element. Index 0 is always the
//! oldest retained element.

use std::collections::VecDeque;

use crate::error::{Result, StatError};

/// Storage reserved up front; larger buffers grow as they fill.
const INITIAL_RESERVE: usize = 1024;

#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> HistoryBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(StatError::invalid("history buffer capacity must be >= 1"));
        }
        Ok(Self {
            items: VecDeque::with_capacity(capacity.min(INITIAL_RESERVE)),
            capacity,
        })
    }

    /// Append `value`, returning the evicted oldest element when full.
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(value);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, index: usize) -> Result<&T> {
        self.items.get(index).ok_or(StatError::OutOfRange {
            what: "history buffer",
            index,
            len: self.items.len(),
        })
    }

    pub fn oldest(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Clear and give the backing storage back to the allocator.
    pub fn release(&mut self) {
        self.items = VecDeque::new();
    }
}

impl<T: Copy> HistoryBuffer<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().copied().collect()
    }
}
