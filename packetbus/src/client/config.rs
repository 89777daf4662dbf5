use std::time::Duration;

/// Builder for [`super::ClientSession`] tuning knobs.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub(crate) reconnect_interval: Duration,
    pub(crate) recv_buf_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(1),
            recv_buf_size: 4096,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay between reconnect attempts while disconnected.
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Maximum accepted frame size for both the handshake and subsequent
    /// messages.
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
