use thiserror::Error;

/// Returned by [`crate::BoundedQueue::dequeue`] once the queue has been
/// closed and fully drained.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Closed {
    #[error("queue closed")]
    Closed,
}
