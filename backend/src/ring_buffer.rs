use std::collections::VecDeque;

/// Bounded FIFO: once `max` entries are held, each push evicts the oldest.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    max: usize,
    buf: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    /// A capacity of zero is bumped to one so the newest entry is always kept.
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            max,
            buf: VecDeque::with_capacity(max),
        }
    }

    /// Appends `item`, returning the entry it pushed out, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.buf.len() == self.max {
            self.buf.pop_front()
        } else {
            None
        };
        self.buf.push_back(item);
        evicted
    }

    /// Up to `n` entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<&T> {
        self.buf.iter().rev().take(n).collect()
    }

    /// The last `n` entries in arrival order.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &T> {
        self.buf.iter().skip(self.buf.len().saturating_sub(n))
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.buf.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.buf.back()
    }

    pub fn get(&self, idx: usize) -> Option<&T> {
        self.buf.get(idx)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
