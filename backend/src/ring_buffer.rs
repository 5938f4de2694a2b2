use std::collections::VecDeque;

/// Fixed-capacity FIFO that evicts the oldest entry when full.
pub struct RingBuffer<T> {
    max: usize,
    buf: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            max,
            buf: VecDeque::with_capacity(max),
        }
    }

    pub fn push(&mut self, item: T) {
        if self.buf.len() == self.max {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    /// Up to `n` items, newest first.
    pub fn recent(&self, n: usize) -> Vec<&T> {
        self.buf.iter().rev().take(n).collect()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
