//! The enclave signing key.

use crate::errors::SignatureError;
use alloy_primitives::{Address, Bytes, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

/// Length of a recoverable ECDSA signature: `r ‖ s ‖ v`.
const SIGNATURE_LEN: usize = 65;

/// The process-lifetime enclave key.
///
/// The key is generated (or unsealed) inside the enclave at startup and
/// never crosses the enclave boundary. It signs batch headers, rollup
/// headers and cross-chain bundles; the matching address is what other
/// enclaves attest against.
pub struct EnclaveKey {
    signing_key: SigningKey,
}

impl core::fmt::Debug for EnclaveKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EnclaveKey").field("address", &self.address()).finish_non_exhaustive()
    }
}

impl EnclaveKey {
    /// Wraps an existing signing key.
    pub const fn new(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// Generates a fresh key from the OS entropy source.
    pub fn generate() -> Self {
        Self { signing_key: SigningKey::random(&mut rand::rngs::OsRng) }
    }

    /// The address of the key, derived from the public key the usual
    /// Ethereum way.
    pub fn address(&self) -> Address {
        Address::from_public_key(self.signing_key.verifying_key())
    }

    /// Signs a 32-byte digest, producing a 65-byte recoverable signature.
    pub fn sign(&self, digest: B256) -> Result<Bytes, SignatureError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;
        let mut out = Vec::with_capacity(SIGNATURE_LEN);
        out.extend_from_slice(&signature.to_bytes());
        out.push(recovery_id.to_byte());
        Ok(Bytes::from(out))
    }
}

/// Recovers the signer address from a 32-byte digest and a 65-byte
/// recoverable signature.
pub fn recover_signer(digest: B256, signature: &[u8]) -> Result<Address, SignatureError> {
    if signature.len() != SIGNATURE_LEN {
        return Err(SignatureError::Malformed(format!(
            "expected {SIGNATURE_LEN} bytes, got {}",
            signature.len()
        )));
    }
    let recovery_id = RecoveryId::from_byte(signature[SIGNATURE_LEN - 1])
        .ok_or_else(|| SignatureError::Malformed("invalid recovery id".to_string()))?;
    let signature = Signature::from_slice(&signature[..SIGNATURE_LEN - 1])
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    let verifying_key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
        .map_err(|_| SignatureError::InvalidSignature)?;
    Ok(Address::from_public_key(&verifying_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_recovers_to_key_address() {
        let key = EnclaveKey::generate();
        let digest = B256::repeat_byte(0x42);
        let signature = key.sign(digest).unwrap();
        assert_eq!(signature.len(), SIGNATURE_LEN);
        assert_eq!(recover_signer(digest, &signature).unwrap(), key.address());
    }

    #[test]
    fn test_recover_rejects_malformed() {
        let err = recover_signer(B256::ZERO, &[0u8; 10]).unwrap_err();
        assert!(matches!(err, SignatureError::Malformed(_)));
    }

    #[test]
    fn test_tampered_digest_recovers_different_signer() {
        let key = EnclaveKey::generate();
        let signature = key.sign(B256::repeat_byte(1)).unwrap();
        match recover_signer(B256::repeat_byte(2), &signature) {
            Ok(addr) => assert_ne!(addr, key.address()),
            Err(err) => assert_eq!(err, SignatureError::InvalidSignature),
        }
    }
}
