//! Wire framing: `[total_len: u32 BE][target: 8 bytes][body][checksum: 1 byte]`.
//!
//! `total_len` counts the whole frame, including itself, the target field
//! and the trailing checksum byte. The checksum is the byte sum (mod 256)
//! of everything preceding it. The body is the only region a cipher ever
//! touches.

use thiserror::Error;

/// Size of the length-prefixed header, excluding the checksum byte.
pub const HEADER_SIZE: usize = 12;
/// Size of the fixed target field within the header.
pub const TARGET_LEN: usize = 8;
/// Size of the trailing checksum.
pub const CHECKSUM_LEN: usize = 1;
/// Smallest possible valid frame: header + checksum, empty body.
pub const MIN_FRAME_LEN: usize = HEADER_SIZE + CHECKSUM_LEN;

use super::cipher::CipherFn;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame would exceed the maximum buffer size")]
    TooLarge,
    #[error("buffer shorter than the minimum frame size")]
    TooShort,
    #[error("header total_len does not match the received buffer length")]
    LengthMismatch,
    #[error("checksum verification failed")]
    ChecksumFail,
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Serializes `target` + `body` into `out`, applying `encrypt` (if any) to
/// the body region in place before the checksum is computed. `out` is
/// cleared and fully overwritten. Returns the number of bytes written.
///
/// `target` is copied left-aligned into the 8-byte target field and
/// zero-padded; bytes beyond the 8th are ignored.
pub fn serialize(
    out: &mut Vec<u8>,
    target: &[u8],
    body: &[u8],
    max_buf_size: usize,
    encrypt: Option<CipherFn>,
) -> Result<usize, FrameError> {
    let total_len = HEADER_SIZE + body.len() + CHECKSUM_LEN;
    if total_len > max_buf_size {
        return Err(FrameError::TooLarge);
    }

    out.clear();
    out.resize(total_len, 0);

    out[0..4].copy_from_slice(&(total_len as u32).to_be_bytes());

    let copy_len = target.len().min(TARGET_LEN);
    out[4..4 + copy_len].copy_from_slice(&target[..copy_len]);

    let body_start = HEADER_SIZE;
    let body_end = body_start + body.len();
    out[body_start..body_end].copy_from_slice(body);

    if let Some(encrypt_fn) = encrypt {
        encrypt_fn(&mut out[body_start..body_end]);
    }

    let sum = checksum(&out[..body_end]);
    out[body_end] = sum;

    Ok(total_len)
}

/// A successfully parsed frame. `target` is copied out (8 bytes, cheap);
/// `body` borrows the input buffer and reflects in-place decryption, if a
/// decrypt function was supplied.
pub struct ParsedFrame<'a> {
    pub target: [u8; TARGET_LEN],
    pub body: &'a [u8],
}

/// Parses and validates a single frame occupying the whole of `buf`,
/// decrypting the body region in place if `decrypt` is supplied.
///
/// `buf`'s length must equal exactly one frame's `total_len`. Callers are
/// responsible for slicing a single frame out of a connection's receive
/// accumulator before calling this.
pub fn parse<'a>(
    buf: &'a mut [u8],
    decrypt: Option<CipherFn>,
) -> Result<ParsedFrame<'a>, FrameError> {
    if buf.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort);
    }

    let total_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if total_len != buf.len() {
        return Err(FrameError::LengthMismatch);
    }

    let claimed = buf[total_len - CHECKSUM_LEN];
    let computed = checksum(&buf[..total_len - CHECKSUM_LEN]);
    if claimed != computed {
        return Err(FrameError::ChecksumFail);
    }

    let mut target = [0u8; TARGET_LEN];
    target.copy_from_slice(&buf[4..4 + TARGET_LEN]);

    let body_end = total_len - CHECKSUM_LEN;
    let body = &mut buf[HEADER_SIZE..body_end];
    if let Some(decrypt_fn) = decrypt {
        decrypt_fn(body);
    }

    Ok(ParsedFrame { target, body })
}
