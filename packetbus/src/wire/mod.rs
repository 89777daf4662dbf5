mod cipher;
mod frame;

pub use cipher::{CipherFn, CipherPair, STRATEGY_NONE, STRATEGY_XOR};
pub use frame::{parse, serialize, FrameError, ParsedFrame, CHECKSUM_LEN, HEADER_SIZE, TARGET_LEN};
