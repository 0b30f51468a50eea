//! Fair round-robin queue
//!
//! Items are kept in one FIFO per key (the tenant, for health checks). A
//! dequeue walks the keys in the order they were first seen, starting after
//! the key served last, and takes the head of the first non-empty FIFO. A
//! tenant with a large backlog therefore cannot starve the others: once two
//! keys both have pending work, dequeues alternate between them.
//!
//! ```text
//! enqueue(a1) enqueue(a2) enqueue(a3) enqueue(b1) enqueue(b2)
//!
//!   a: [a1, a2, a3]      try_dequeue() -> a1, b1, a2, b2, a3, None
//!   b: [b1, b2]
//! ```

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use parking_lot::Mutex;

/// An item that knows which sub-queue it belongs to.
pub trait QueueItem {
    type Key: Eq + Hash + Clone;

    fn queue_key(&self) -> Self::Key;
}

/// Multi-producer, multi-consumer queue with round-robin fairness across keys
/// and strict FIFO order within a key.
pub struct FairQueue<T: QueueItem> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T: QueueItem> {
    /// Keys in insertion order; sub-queues are never removed.
    keys: Vec<T::Key>,
    queues: HashMap<T::Key, VecDeque<T>>,
    /// Index into `keys` of the next sub-queue to look at.
    cursor: usize,
    len: usize,
}

impl<T: QueueItem> FairQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                keys: Vec::new(),
                queues: HashMap::new(),
                cursor: 0,
                len: 0,
            }),
        }
    }

    /// Append `item` to the sub-queue for its key.
    pub fn enqueue(&self, item: T) {
        let key = item.queue_key();
        let mut inner = self.inner.lock();

        if !inner.queues.contains_key(&key) {
            inner.keys.push(key.clone());
        }
        inner.queues.entry(key).or_default().push_back(item);
        inner.len += 1;
    }

    /// Take the head of the next non-empty sub-queue in round-robin order.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.len == 0 {
            return None;
        }

        let key_count = inner.keys.len();
        for _ in 0..key_count {
            let index = inner.cursor % key_count;
            inner.cursor = (index + 1) % key_count;

            let key = inner.keys[index].clone();
            if let Some(item) = inner.queues.get_mut(&key).and_then(VecDeque::pop_front) {
                inner.len -= 1;
                return Some(item);
            }
        }

        None
    }

    /// Number of pending items across all keys.
    pub fn len(&self) -> usize {
        self.inner.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct keys seen so far.
    pub fn key_count(&self) -> usize {
        self.inner.lock().keys.len()
    }
}

impl<T: QueueItem> Default for FairQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
