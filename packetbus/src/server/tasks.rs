use mio::Token;

use crate::wire::TARGET_LEN;

/// A fully-received, still-framed message pulled off a connection, handed to
/// a worker for parsing and dispatch.
pub struct RecvTask {
    pub conn: Token,
    pub frame: Vec<u8>,
}

/// Where a [`SendTask`] should be written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Destination {
    Unicast(Token),
    Broadcast,
}

/// A pending outbound message, handed to the sender thread for serialization
/// and write.
pub struct SendTask {
    pub destination: Destination,
    pub target: [u8; TARGET_LEN],
    pub body: Vec<u8>,
}
