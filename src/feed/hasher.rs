//! Vector-clock compression: full clocks become short opaque tokens.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::VectorClock;

/// Compresses a vector clock into a short opaque token carried on emitted
/// entries. Deterministic and side-effect-free; the enclosing system maps
/// tokens back to clocks when a cursor is resubmitted.
pub trait SequenceHasher: Send + Sync {
    fn hash(&self, clock: &VectorClock) -> Result<String, HashError>;
}

#[derive(Debug, Error)]
#[error("sequence hash failed: {0}")]
pub struct HashError(pub String);

/// Pure content hash over the clock's `(vbucket, sequence)` pairs, for
/// embedders without a persistent hash index.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256Hasher;

impl SequenceHasher for Sha256Hasher {
    fn hash(&self, clock: &VectorClock) -> Result<String, HashError> {
        let mut hasher = Sha256::new();
        for (vb_no, seq) in clock.entries() {
            hasher.update(vb_no.to_be_bytes());
            hasher.update(seq.to_be_bytes());
        }
        let digest = hasher.finalize();
        let mut token = String::with_capacity(16);
        for byte in &digest[..8] {
            token.push_str(&format!("{byte:02x}"));
        }
        Ok(token)
    }
}
