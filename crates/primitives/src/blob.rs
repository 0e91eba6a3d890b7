//! The enclave's view of an EIP-4844 blob.

use alloy_primitives::{Bytes, B256};

/// An opaque blob carrying a compressed rollup payload, addressed by its
/// versioned commitment hash.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    /// The versioned hash of the blob's KZG commitment.
    pub commitment: B256,
    /// The size of the blob data in bytes.
    #[serde(with = "alloy_serde::quantity")]
    pub size: u64,
    /// The blob data itself.
    pub data: Bytes,
}

impl Blob {
    /// Wraps raw blob data under its commitment hash.
    pub fn new(commitment: B256, data: Bytes) -> Self {
        Self { commitment, size: data.len() as u64, data }
    }
}
