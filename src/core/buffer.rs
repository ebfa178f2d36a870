//! Bounded buffer kept sorted by timestamp.
//!
//! Samples usually arrive in order, so insertion is an append in the common
//! case. Late samples are inserted at their sorted position. When the buffer
//! is full the oldest sample is evicted. Range and nearest queries use binary
//! search over the timestamps rather than relying on arrival order.

use std::collections::VecDeque;

use super::types::Stamped;

/// Time-ordered bounded deque.
#[derive(Debug, Clone)]
pub struct TimeSortedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Stamped> TimeSortedBuffer<T> {
    /// Create a buffer holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert an item at its sorted position.
    ///
    /// Returns the evicted item when the buffer overflowed. Items with equal
    /// timestamps keep their arrival order.
    pub fn push(&mut self, item: T) -> Option<T> {
        let t = item.timestamp_us();
        let idx = self.items.partition_point(|x| x.timestamp_us() <= t);
        self.items.insert(idx, item);

        if self.items.len() > self.capacity {
            self.items.pop_front()
        } else {
            None
        }
    }

    /// Items with `after_us < timestamp <= until_us`, oldest first.
    pub fn range(&self, after_us: u64, until_us: u64) -> impl Iterator<Item = &T> + '_ {
        let start = self.items.partition_point(|x| x.timestamp_us() <= after_us);
        let end = self
            .items
            .partition_point(|x| x.timestamp_us() <= until_us)
            .max(start);
        self.items.range(start..end)
    }

    /// Item closest in time to `timestamp_us`, if within `tolerance_us`.
    pub fn nearest(&self, timestamp_us: u64, tolerance_us: u64) -> Option<&T> {
        let idx = self.items.partition_point(|x| x.timestamp_us() < timestamp_us);
        let after = self.items.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.items.get(i));

        let best = match (before, after) {
            (Some(b), Some(a)) => {
                if timestamp_us - b.timestamp_us() <= a.timestamp_us() - timestamp_us {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };

        (best.timestamp_us().abs_diff(timestamp_us) <= tolerance_us).then_some(best)
    }

    /// Oldest item.
    pub fn oldest(&self) -> Option<&T> {
        self.items.front()
    }

    /// Newest item.
    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Number of buffered items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all items.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }
}
