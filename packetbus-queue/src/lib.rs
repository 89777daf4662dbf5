//! A fixed-capacity, thread-safe FIFO with a non-blocking enqueue and a
//! blocking dequeue, plus an explicit closed state used to wake every
//! blocked consumer on shutdown instead of threading sentinel values
//! through the item type.

mod error;

pub use error::Closed;

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A bounded FIFO queue of owned items.
///
/// Enqueue never blocks: it either stores the item and returns `true`, or
/// finds the queue full (or closed) and returns `false` immediately.
/// Dequeue blocks until an item is available or the queue is closed with
/// nothing left to deliver, in which case it returns `Err(Closed)`.
pub struct BoundedQueue<T> {
    capacity: usize,
    state: Mutex<Inner<T>>,
    not_empty: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue with the given fixed capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedQueue capacity must be non-zero");
        Self {
            capacity,
            state: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Attempts to enqueue `item`. Returns `false` without blocking if the
    /// queue is full or already closed.
    pub fn enqueue(&self, item: T) -> bool {
        let mut inner = self.state.lock().unwrap();
        if inner.closed || inner.items.len() >= self.capacity {
            return false;
        }
        inner.items.push_back(item);
        drop(inner);
        self.not_empty.notify_one();
        true
    }

    /// Blocks until an item is available, returning it, or returns
    /// `Err(Closed)` once the queue is closed and drained.
    pub fn dequeue(&self) -> Result<T, Closed> {
        let mut inner = self.state.lock().unwrap();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Ok(item);
            }
            if inner.closed {
                return Err(Closed::Closed);
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// Snapshot: true if no items are currently queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().unwrap().items.is_empty()
    }

    /// Snapshot: true if the queue is at capacity.
    pub fn is_full(&self) -> bool {
        self.state.lock().unwrap().items.len() >= self.capacity
    }

    /// Snapshot of the current item count.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    /// Marks the queue closed and wakes every blocked `dequeue`. Idempotent.
    /// Items already queued are still delivered in order before `dequeue`
    /// starts returning `Err(Closed)`.
    pub fn close(&self) {
        let mut inner = self.state.lock().unwrap();
        if inner.closed {
            return;
        }
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_all();
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}
