//! Reusable TCP transport: a length-prefixed, target-addressed wire codec
//! with a pluggable body cipher, a non-blocking multi-client server
//! pipeline, and a reconnecting client session.
//!
//! The server side is built on `mio` (non-blocking, one accept/read thread
//! plus a worker pool and sender thread); the client side uses blocking
//! `std::net::TcpStream` on a dedicated network thread, matching how each
//! side is actually used in practice.

mod client;
mod error;
mod net_util;
mod roster;
mod server;
mod wire;

pub use client::{ClientConfig, ClientHandle, ClientSession};
pub use error::{SendError, ServerError};
pub use server::{Destination, RecvTask, SendTask, Server, ServerConfig, ServerHandle};
pub use wire::{
    parse, serialize, CipherFn, CipherPair, FrameError, ParsedFrame, CHECKSUM_LEN, HEADER_SIZE,
    STRATEGY_NONE, STRATEGY_XOR, TARGET_LEN,
};
