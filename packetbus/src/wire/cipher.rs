//! Body cipher registry: maps a numeric strategy code to the
//! `(encrypt, decrypt)` function pair applied in place to a frame's body
//! region. Strategies are self-contained and symmetric where possible so
//! the same function can serve both directions.

/// A cipher transforms a contiguous byte region in place.
pub type CipherFn = fn(&mut [u8]);

/// `SecurityStrategy::None` on the wire.
pub const STRATEGY_NONE: i32 = 0;
/// `SecurityStrategy::Xor` on the wire.
pub const STRATEGY_XOR: i32 = 1;

const XOR_KEY: u8 = 0x5A;

fn xor_in_place(data: &mut [u8]) {
    for byte in data.iter_mut() {
        *byte ^= XOR_KEY;
    }
}

/// The encrypt/decrypt pair currently in effect for a session or server.
#[derive(Clone, Copy)]
pub struct CipherPair {
    pub encrypt: Option<CipherFn>,
    pub decrypt: Option<CipherFn>,
}

impl CipherPair {
    pub const NONE: CipherPair = CipherPair {
        encrypt: None,
        decrypt: None,
    };

    pub const XOR: CipherPair = CipherPair {
        encrypt: Some(xor_in_place),
        decrypt: Some(xor_in_place),
    };

    /// Resolves a wire `strategy_code` to its cipher pair. Unknown codes
    /// resolve to [`CipherPair::NONE`].
    pub fn for_strategy_code(strategy_code: i32) -> CipherPair {
        match strategy_code {
            STRATEGY_XOR => CipherPair::XOR,
            _ => CipherPair::NONE,
        }
    }

    /// The wire `strategy_code` a peer should announce to have the other
    /// side install this exact pair via [`CipherPair::for_strategy_code`].
    /// Falls back to `STRATEGY_NONE` for any pair that isn't one of the
    /// built-in strategies.
    pub fn strategy_code(&self) -> i32 {
        if self.encrypt == CipherPair::XOR.encrypt && self.decrypt == CipherPair::XOR.decrypt {
            STRATEGY_XOR
        } else {
            STRATEGY_NONE
        }
    }
}

impl Default for CipherPair {
    fn default() -> Self {
        CipherPair::NONE
    }
}
