//! Bounded store of recent recordings

use echorange_core::SampleBuffer;
use std::collections::VecDeque;

/// Keeps the most recent recordings; the oldest is evicted beyond capacity
#[derive(Debug, Clone)]
pub struct History {
    samples: VecDeque<SampleBuffer>,
    capacity: usize,
}

impl History {
    /// Capacity is at least one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn store(&mut self, sample: SampleBuffer) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Sample `i`, counted from the oldest kept
    pub fn get(&self, i: usize) -> Option<&SampleBuffer> {
        self.samples.get(i)
    }

    pub fn last(&self) -> Option<&SampleBuffer> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: i16) -> SampleBuffer {
        SampleBuffer::from_signal(&[value])
    }

    #[test]
    fn test_store_and_get() {
        let mut history = History::new(3);
        assert!(history.is_empty());
        assert!(history.last().is_none());

        history.store(sample(1));
        history.store(sample(2));
        assert_eq!(history.len(), 2);
        assert_eq!(history.get(0), Some(&sample(1)));
        assert_eq!(history.last(), Some(&sample(2)));
        assert!(history.get(2).is_none());
    }

    #[test]
    fn test_evicts_oldest() {
        let mut history = History::new(2);
        for value in 1..=4 {
            history.store(sample(value));
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.get(0), Some(&sample(3)));
        assert_eq!(history.last(), Some(&sample(4)));
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut history = History::new(0);
        history.store(sample(1));
        history.store(sample(2));
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.last(), Some(&sample(2)));
    }
}
