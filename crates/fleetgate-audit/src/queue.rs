//! Bounded audit queue with drop-oldest overflow.
//!
//! Uses `crossbeam-queue::ArrayQueue` for a lock-free, bounded MPMC queue.
//! Producers never block and never get their item back: when the queue is
//! full the oldest queued item is evicted to make room, so the newest audit
//! events are the ones that survive a delivery outage.
//!
//! # Sizing
//!
//! Size the queue using Little's Law: `capacity = throughput * latency`.
//! At 20k decisions/sec and a 500ms sink stall: `capacity = 20_000 * 0.5 = 10_000`.

use crossbeam_queue::ArrayQueue;

/// A bounded, lock-free queue that evicts its oldest item on overflow.
#[derive(Debug)]
pub struct DropOldestQueue<T> {
    inner: ArrayQueue<T>,
}

impl<T> DropOldestQueue<T> {
    /// Creates a new queue with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            inner: ArrayQueue::new(capacity),
        }
    }

    /// Pushes an item, returning the evicted oldest item if the queue was full.
    pub fn push(&self, item: T) -> Option<T> {
        self.inner.force_push(item)
    }

    /// Attempts to pop an item from the queue.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.pop()
    }

    /// Pops up to `max` items from the queue into a `Vec`.
    ///
    /// Returns an empty `Vec` if the queue is empty.
    pub fn pop_batch(&self, max: usize) -> Vec<T> {
        let mut batch = Vec::with_capacity(max.min(self.inner.len()));
        for _ in 0..max {
            match self.inner.pop() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        batch
    }

    /// Returns the number of items currently in the queue.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the capacity of the queue.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}
