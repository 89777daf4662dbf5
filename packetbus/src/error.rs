use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("failed to register listener with the poller: {0}")]
    Register(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("session is not connected")]
    NotConnected,
    #[error("frame exceeds the configured buffer size")]
    FrameTooLarge,
    #[error("write failed: {0}")]
    Io(#[source] std::io::Error),
}
