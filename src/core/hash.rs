//! Position Signatures
//!
//! Deterministic hashing of board positions for:
//! - Threefold repetition detection
//! - Cheap equality checks between client snapshots
//! - Diagnostics (hex-encoded in logs)

use sha2::{Digest, Sha256};

/// Hash output type (256 bits / 32 bytes)
pub type PositionSignature = [u8; 32];

/// Deterministic hasher for position data.
///
/// Wraps SHA-256 with a domain separator.
/// Order of updates is critical for determinism.
pub struct PositionHasher {
    hasher: Sha256,
}

impl PositionHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for repetition signatures.
    pub fn for_position() -> Self {
        Self::new(b"MATEY_POSITION_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with an optional u8, tagged so `None` never collides with a value.
    #[inline]
    pub fn update_opt_u8(&mut self, value: Option<u8>) {
        match value {
            Some(v) => {
                self.update_u8(1);
                self.update_u8(v);
            }
            None => self.update_u8(0),
        }
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> PositionSignature {
        self.hasher.finalize().into()
    }
}

/// Short hex prefix of a signature for log lines.
pub fn short_hex(signature: &PositionSignature) -> String {
    hex::encode(&signature[..6])
}
