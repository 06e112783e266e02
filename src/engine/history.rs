use std::collections::VecDeque;

use super::reading::Reading;

/// Number of instantaneous readings kept in the history
pub const HISTORY_CAPACITY: usize = 250;

/// Bounded history of recent readings. When full, the oldest reading is
/// evicted to make room for the newest.
#[derive(Debug)]
pub struct History {
    buffer: VecDeque<Reading>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert a reading, returning the evicted one if the history was full
    pub fn push(&mut self, reading: Reading) -> Option<Reading> {
        let evicted = if self.buffer.len() >= self.capacity {
            self.buffer.pop_front()
        } else {
            None
        };
        self.buffer.push_back(reading);
        evicted
    }

    /// Remove the oldest reading
    pub fn pop(&mut self) -> Option<Reading> {
        self.buffer.pop_front()
    }

    /// Remove every reading, oldest first
    pub fn drain(&mut self) -> Vec<Reading> {
        self.buffer.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}
