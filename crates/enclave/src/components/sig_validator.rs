//! Verification of sequencer signatures on batch and rollup headers.

use crate::{crypto::recover_signer, errors::SignatureError};
use alloy_primitives::{Address, B256};

/// Checks header signatures against the attested sequencer enclave address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureValidator {
    sequencer_address: Address,
}

impl SignatureValidator {
    /// Creates a validator for the given attested sequencer address.
    pub const fn new(sequencer_address: Address) -> Self {
        Self { sequencer_address }
    }

    /// The attested sequencer address.
    pub const fn sequencer_address(&self) -> Address {
        self.sequencer_address
    }

    /// Verifies that `signature` over `hash` recovers to the attested
    /// sequencer. Used for batch headers and rollup headers alike, since
    /// both hash with the signature cleared.
    pub fn check_sequencer_signature(
        &self,
        hash: B256,
        signature: &[u8],
    ) -> Result<(), SignatureError> {
        let signer = recover_signer(hash, signature)?;
        if signer != self.sequencer_address {
            return Err(SignatureError::InvalidSignature);
        }
        Ok(())
    }
}
