//! Hybrid FIFO/LIFO ordering queue for pending lock requests.
//!
//! The coordinator uses this structure for two purposes that must not be
//! confused: flush drains head-first ([`StackQueue::dequeue`]) so requests
//! are serviced in true arrival order across all units of work, while
//! cleanup of a disposing unit walks tail-first ([`StackQueue::peek_tail`] /
//! [`StackQueue::pop_tail`]) and stops at the first item that belongs to
//! another unit. Strict nesting guarantees a disposing unit's unflushed
//! requests are contiguous at the tail.

use std::collections::VecDeque;

/// A queue that also supports stack-style access to its most recent end.
#[derive(Debug, Clone)]
pub struct StackQueue<T> {
    inner: VecDeque<T>,
}

impl<T> StackQueue<T> {
    /// Create an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: VecDeque::new(),
        }
    }

    /// Append an item at the tail.
    pub fn enqueue(&mut self, item: T) {
        self.inner.push_back(item);
    }

    /// Remove and return the item at the head (oldest first).
    pub fn dequeue(&mut self) -> Option<T> {
        self.inner.pop_front()
    }

    /// Inspect the most recently added item without removing it.
    #[must_use]
    pub fn peek_tail(&self) -> Option<&T> {
        self.inner.back()
    }

    /// Remove and return the most recently added item.
    pub fn pop_tail(&mut self) -> Option<T> {
        self.inner.pop_back()
    }

    /// Number of pending items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the queue holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop all pending items.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl<T> Default for StackQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn dequeue_preserves_arrival_order() {
        let mut queue = StackQueue::new();
        queue.enqueue(1);
        queue.enqueue(2);
        queue.enqueue(3);
        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.dequeue(), Some(2));
        assert_eq!(queue.dequeue(), Some(3));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn tail_access_unwinds_most_recent_first() {
        let mut queue = StackQueue::new();
        queue.enqueue("a");
        queue.enqueue("b");
        queue.enqueue("c");
        assert_eq!(queue.peek_tail(), Some(&"c"));
        assert_eq!(queue.pop_tail(), Some("c"));
        assert_eq!(queue.peek_tail(), Some(&"b"));
        assert_eq!(queue.pop_tail(), Some("b"));
        // head access still sees the oldest item
        assert_eq!(queue.dequeue(), Some("a"));
        assert!(queue.is_empty());
    }

    #[test]
    fn mixed_head_and_tail_access() {
        let mut queue = StackQueue::new();
        for n in 0..5 {
            queue.enqueue(n);
        }
        assert_eq!(queue.dequeue(), Some(0));
        assert_eq!(queue.pop_tail(), Some(4));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.pop_tail(), Some(3));
        assert_eq!(queue.dequeue(), Some(2));
        assert!(queue.dequeue().is_none());
        assert!(queue.pop_tail().is_none());
    }

    #[test]
    fn clear_empties_the_queue() {
        let mut queue = StackQueue::new();
        queue.enqueue(7);
        queue.enqueue(8);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.peek_tail(), None);
    }

    proptest! {
        #[test]
        fn drains_in_insertion_order(items in proptest::collection::vec(any::<u32>(), 0..64)) {
            let mut queue = StackQueue::new();
            for &item in &items {
                queue.enqueue(item);
            }
            let mut drained = Vec::new();
            while let Some(item) = queue.dequeue() {
                drained.push(item);
            }
            prop_assert_eq!(drained, items);
        }

        #[test]
        fn unwinds_in_reverse_insertion_order(items in proptest::collection::vec(any::<u32>(), 0..64)) {
            let mut queue = StackQueue::new();
            for &item in &items {
                queue.enqueue(item);
            }
            let mut unwound = Vec::new();
            while let Some(item) = queue.pop_tail() {
                unwound.push(item);
            }
            let mut reversed = items.clone();
            reversed.reverse();
            prop_assert_eq!(unwound, reversed);
        }
    }
}
