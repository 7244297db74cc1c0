use crate::core::PositionEstimate;
use std::collections::VecDeque;
use std::sync::Arc;

/// Bounded log of past estimates, oldest first
#[derive(Debug, Clone)]
pub struct PositionHistory {
    entries: VecDeque<Arc<PositionEstimate>>,
    max_history_size: usize,
}

impl PositionHistory {
    /// Capacity is clamped to at least one entry
    pub fn new(capacity: usize) -> Self {
        let max_history_size = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(max_history_size),
            max_history_size,
        }
    }

    /// Append `estimate` unless the latest entry carries the same timestamp.
    ///
    /// Returns whether the estimate was appended.
    pub fn record(&mut self, estimate: Arc<PositionEstimate>) -> bool {
        if let Some(last) = self.entries.back() {
            if last.timestamp_ms == estimate.timestamp_ms {
                return false;
            }
        }

        self.entries.push_back(estimate);
        while self.entries.len() > self.max_history_size {
            self.entries.pop_front();
        }
        true
    }

    pub fn all(&self) -> Vec<Arc<PositionEstimate>> {
        self.entries.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&Arc<PositionEstimate>> {
        self.entries.back()
    }

    pub fn capacity(&self) -> usize {
        self.max_history_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
