/// Builder for [`super::Server`] tuning knobs, following the same fluent
/// `with_*` convention used throughout this crate's client configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub(crate) worker_count: usize,
    pub(crate) queue_capacity: usize,
    pub(crate) recv_buf_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 1000,
            recv_buf_size: 4096,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of worker threads draining the receive queue.
    ///
    /// With more than one worker, bursts of messages from the *same*
    /// connection may be dispatched to the user callback concurrently,
    /// so the callback must synchronize any shared state it touches.
    ///
    /// # Panics
    /// Panics if `count` is zero.
    pub fn with_worker_count(mut self, count: usize) -> Self {
        assert!(count > 0, "worker_count must be non-zero");
        self.worker_count = count;
        self
    }

    /// Fixed capacity of both the receive and send queues.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "queue_capacity must be non-zero");
        self.queue_capacity = capacity;
        self
    }

    /// Maximum accepted frame size; also the bound used to validate an
    /// incoming header's `total_len` before allocating a receive buffer.
    ///
    /// # Panics
    /// Panics if `size` is smaller than a minimal valid frame.
    pub fn with_recv_buf_size(mut self, size: usize) -> Self {
        assert!(
            size >= crate::wire::HEADER_SIZE + crate::wire::CHECKSUM_LEN,
            "recv_buf_size too small to hold a header and checksum"
        );
        self.recv_buf_size = size;
        self
    }
}
