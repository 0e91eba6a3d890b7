//! A pooled Keccak hasher.
//!
//! Hashing inbound message events is on the hot path of L1 ingestion; the
//! pool keeps hasher state reuse explicit (acquire, use, reset, release)
//! without reaching for process-wide statics. The pool is a component field
//! of whoever hashes.

use alloy_primitives::B256;
use sha3::{Digest, Keccak256};
use std::sync::Mutex;

/// A pool of reusable Keccak-256 hasher states.
#[derive(Debug, Default)]
pub struct KeccakPool {
    pool: Mutex<Vec<Keccak256>>,
}

impl KeccakPool {
    /// Creates an empty pool. Hashers are created lazily on first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes `data`, reusing a pooled hasher state when one is available.
    pub fn hash(&self, data: &[u8]) -> B256 {
        let mut hasher = self.pool.lock().expect("hasher pool poisoned").pop().unwrap_or_default();
        hasher.update(data);
        let digest = hasher.finalize_reset();
        self.pool.lock().expect("hasher pool poisoned").push(hasher);
        B256::from_slice(&digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;

    #[test]
    fn test_pool_matches_one_shot_keccak() {
        let pool = KeccakPool::new();
        for data in [&b""[..], b"cloak", &[0u8; 1024]] {
            assert_eq!(pool.hash(data), keccak256(data));
        }
    }

    #[test]
    fn test_reused_state_is_reset() {
        let pool = KeccakPool::new();
        let first = pool.hash(b"first");
        // The same underlying state is reused; a stale state would corrupt
        // the second digest.
        let second = pool.hash(b"first");
        assert_eq!(first, second);
    }
}
