use std::collections::VecDeque;

use crate::error::{PipelineError, Result};

/// Malicious counts of the most recent batches, oldest first.
/// Display state only; it is never persisted.
#[derive(Debug, Clone)]
pub struct TrendWindow {
    capacity: usize,
    observed: usize,
    content: VecDeque<(usize, usize)>,
}

impl TrendWindow {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 { return Err(PipelineError::ZeroCapacity); }

        Ok(Self {
            capacity,
            observed: 0,
            content: VecDeque::with_capacity(capacity),
        })
    }

    pub fn observe(&mut self, batch_malicious_count: usize) {
        self.observed += 1;

        // Pop expired
        if self.content.len() >= self.capacity {
            self.content.pop_front();
        }
        self.content.push_back((self.observed, batch_malicious_count));
    }

    /// `(batch_index, count)` for every batch still in the window. The index is
    /// the global batch number (counted from 1 since the window was created),
    /// not the position within the window, so it keeps growing after eviction.
    pub fn snapshot(&self) -> Vec<(usize, usize)> {
        self.content.iter().copied().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
