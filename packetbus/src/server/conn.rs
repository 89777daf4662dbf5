//! Per-connection receive-frame accumulator.
//!
//! A single readiness event only guarantees "at least one byte is
//! available", not "exactly one frame is available" (TCP is a byte
//! stream). This accumulator reassembles frames split across reads and
//! drains every frame that has fully arrived before returning
//! [`ReadOutcome::WouldBlock`], so a burst of several small frames in one
//! read is never mistaken for one.

use std::io::{self, Read};

use tracing::debug;

use crate::wire::HEADER_SIZE;

pub enum ReadOutcome {
    FrameReady(Vec<u8>),
    WouldBlock,
    Disconnected,
}

#[derive(Clone)]
enum RxState {
    ReadingHeader {
        buf: [u8; HEADER_SIZE],
        have: usize,
    },
    ReadingRest {
        total_len: usize,
        buf: Vec<u8>,
        have: usize,
    },
}

/// Accumulates bytes read from one connection until complete frames can be
/// handed off, one at a time.
pub struct RxAccumulator {
    state: RxState,
}

impl RxAccumulator {
    pub fn new() -> Self {
        Self {
            state: RxState::ReadingHeader {
                buf: [0u8; HEADER_SIZE],
                have: 0,
            },
        }
    }

    /// Reads once and, if a full frame is now available, returns it. Call in
    /// a loop until `WouldBlock` or `Disconnected` to drain everything a
    /// single readiness event made available.
    pub fn read_frame(&mut self, stream: &mut impl Read, max_buf_size: usize) -> ReadOutcome {
        loop {
            match &mut self.state {
                RxState::ReadingHeader { buf, have } => {
                    match stream.read(&mut buf[*have..]) {
                        Ok(0) => return ReadOutcome::Disconnected,
                        Ok(n) => {
                            *have += n;
                            if *have < HEADER_SIZE {
                                continue;
                            }
                            let total_len =
                                u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
                            if total_len < HEADER_SIZE || total_len > max_buf_size {
                                debug!(total_len, "server: rejecting frame with invalid length");
                                return ReadOutcome::Disconnected;
                            }
                            let mut rest = vec![0u8; total_len];
                            rest[..HEADER_SIZE].copy_from_slice(&buf[..]);
                            self.state = RxState::ReadingRest {
                                total_len,
                                buf: rest,
                                have: HEADER_SIZE,
                            };
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                            return ReadOutcome::WouldBlock;
                        }
                        Err(err) => {
                            debug!(?err, "server: read header");
                            return ReadOutcome::Disconnected;
                        }
                    }
                }
                RxState::ReadingRest {
                    total_len,
                    buf,
                    have,
                } => match stream.read(&mut buf[*have..*total_len]) {
                    Ok(0) => return ReadOutcome::Disconnected,
                    Ok(n) => {
                        *have += n;
                        if *have == *total_len {
                            let frame = std::mem::take(buf);
                            self.state = RxState::ReadingHeader {
                                buf: [0u8; HEADER_SIZE],
                                have: 0,
                            };
                            return ReadOutcome::FrameReady(frame);
                        }
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        return ReadOutcome::WouldBlock;
                    }
                    Err(err) => {
                        debug!(?err, "server: read body");
                        return ReadOutcome::Disconnected;
                    }
                },
            }
        }
    }
}

impl Default for RxAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire;
    use std::io::Cursor;

    #[test]
    fn single_frame_in_one_read() {
        let mut out = Vec::new();
        wire::serialize(&mut out, b"CHAT", b"hi", 4096, None).unwrap();
        let mut cursor = Cursor::new(out.clone());
        let mut acc = RxAccumulator::new();
        match acc.read_frame(&mut cursor, 4096) {
            ReadOutcome::FrameReady(frame) => assert_eq!(frame, out),
            _ => panic!("expected a ready frame"),
        }
    }

    #[test]
    fn frame_split_across_reads() {
        let mut out = Vec::new();
        wire::serialize(&mut out, b"CHAT", b"hello world", 4096, None).unwrap();

        struct Choppy {
            data: Vec<u8>,
            pos: usize,
            chunk: usize,
        }
        impl Read for Choppy {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.pos >= self.data.len() {
                    return Err(io::Error::new(io::ErrorKind::WouldBlock, "would block"));
                }
                let n = self.chunk.min(buf.len()).min(self.data.len() - self.pos);
                buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
                self.pos += n;
                Ok(n)
            }
        }

        let mut stream = Choppy {
            data: out.clone(),
            pos: 0,
            chunk: 3,
        };
        let mut acc = RxAccumulator::new();
        let frame = loop {
            match acc.read_frame(&mut stream, 4096) {
                ReadOutcome::FrameReady(frame) => break frame,
                ReadOutcome::WouldBlock => panic!("should not block before frame is complete"),
                ReadOutcome::Disconnected => panic!("unexpected disconnect"),
            }
        };
        assert_eq!(frame, out);
    }

    #[test]
    fn oversized_total_len_disconnects() {
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&(1_000_000u32).to_be_bytes());
        let mut cursor = Cursor::new(buf);
        let mut acc = RxAccumulator::new();
        match acc.read_frame(&mut cursor, 4096) {
            ReadOutcome::Disconnected => {}
            _ => panic!("expected disconnect on oversized frame"),
        }
    }
}
