//! Viewing-key envelope handling: decryption, authentication and response
//! encryption.

use crate::{
    crypto::recover_signer,
    errors::{InternalError, UserError},
};
use alloy_primitives::{keccak256, Address, Bytes};
use serde_json::Value;
use std::future::Future;
use thiserror::Error;
use tracing::debug;

/// An error inside the envelope cipher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("envelope failure: {0}")]
pub struct EnvelopeError(pub String);

/// The cipher shell around the enclave: asymmetric decryption of requests
/// with the enclave key and encryption of responses to a viewing key. The
/// concrete scheme lives outside the core.
pub trait EnvelopeCrypto: Send + Sync {
    /// Decrypts a request addressed to the enclave public key.
    fn decrypt_request(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EnvelopeError>;

    /// Encrypts a response to the given viewing-key public key.
    fn encrypt_response(
        &self,
        vk_public_key: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, EnvelopeError>;
}

/// A signed viewing key: the per-account session key that authorizes the
/// enclave to answer queries about the account.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewingKey {
    /// The account the key claims to act for.
    pub account: Address,
    /// The session public key responses are encrypted to.
    pub public_key: Bytes,
    /// The account's signature binding it to the session key.
    pub signature: Bytes,
    /// Signature scheme discriminator, reserved for future schemes.
    #[serde(default)]
    pub signature_type: u8,
}

impl ViewingKey {
    /// Authenticates the viewing key: the signature over
    /// `keccak256(account ‖ public_key)` must recover to the claimed
    /// account.
    pub fn authenticate(&self) -> Result<(), UserError> {
        let mut preimage = Vec::with_capacity(20 + self.public_key.len());
        preimage.extend_from_slice(self.account.as_slice());
        preimage.extend_from_slice(&self.public_key);
        let signer = recover_signer(keccak256(preimage), &self.signature)
            .map_err(|_| UserError::InvalidSignature)?;
        if signer != self.account {
            return Err(UserError::InvalidSignature);
        }
        Ok(())
    }
}

/// A decoded user request: the logical sender plus the method parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRpcRequest<P> {
    /// The `from` account of the request. Must match the viewing-key
    /// account.
    pub sender: Address,
    /// The method parameters.
    pub params: P,
}

/// The wire form of a user error, encrypted to the viewing key.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcErrorPayload {
    /// JSON-RPC error code; `3` is reserved for EVM reverts.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Hex-encoded revert bytes for reverts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_data: Option<String>,
}

impl From<&UserError> for RpcErrorPayload {
    fn from(err: &UserError) -> Self {
        Self { code: err.error_code(), message: err.to_string(), error_data: err.error_data() }
    }
}

/// A response leaving the enclave boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnclaveResponse {
    /// The request could not even be attributed to a viewing key; the error
    /// is returned in plaintext and reveals nothing about state.
    PlaintextError(String),
    /// A response (result or user error) encrypted to the viewing key.
    Encrypted(Bytes),
}

/// Runs one encrypted request through the viewing-key envelope: decrypt,
/// authenticate, extract, check the sender, execute, encrypt.
///
/// `execute` returns a nested result: the outer layer is a system failure
/// (propagated raw), the inner layer a user failure (encrypted back).
pub async fn with_vk_encryption<P, R, X, E, Fut>(
    crypto: &dyn EnvelopeCrypto,
    encrypted_request: &[u8],
    extract: X,
    execute: E,
) -> Result<EnclaveResponse, InternalError>
where
    X: FnOnce(&[Value]) -> Result<UserRpcRequest<P>, UserError>,
    E: FnOnce(UserRpcRequest<P>) -> Fut,
    Fut: Future<Output = Result<Result<R, UserError>, InternalError>>,
    R: serde::Serialize,
{
    // 1. Decrypt with the enclave key.
    let plaintext = match crypto.decrypt_request(encrypted_request) {
        Ok(plaintext) => plaintext,
        Err(e) => return Ok(EnclaveResponse::PlaintextError(format!("could not decrypt params - {e}"))),
    };

    // 2. The plaintext is a JSON array: [viewing key, param, ...].
    let request: Vec<Value> = match serde_json::from_slice(&plaintext) {
        Ok(request) => request,
        Err(e) => return Ok(EnclaveResponse::PlaintextError(format!("could not unmarshal params - {e}"))),
    };

    // 3. Authenticate the viewing key from the first element.
    let Some(vk_value) = request.first() else {
        return Ok(EnclaveResponse::PlaintextError("invalid request. viewing key is missing".to_string()));
    };
    let vk: ViewingKey = match serde_json::from_value(vk_value.clone()) {
        Ok(vk) => vk,
        Err(e) => return Ok(EnclaveResponse::PlaintextError(format!("invalid viewing key - {e}"))),
    };
    if let Err(e) = vk.authenticate() {
        return Ok(EnclaveResponse::PlaintextError(format!("invalid viewing key - {e}")));
    }

    // From here on every failure is encrypted: the caller proved who they
    // are.
    let decoded = match extract(&request[1..]) {
        Ok(decoded) => decoded,
        Err(e) => return encrypt_error(crypto, &vk, &e),
    };

    // 4. The logical sender must be the viewing-key account.
    if decoded.sender != vk.account {
        debug!(target: "rpc", sender = %decoded.sender, vk = %vk.account, "sender mismatch");
        let err = UserError::InvalidParams(format!(
            "viewing key account {} does not match the requester {}",
            vk.account, decoded.sender
        ));
        return encrypt_error(crypto, &vk, &err);
    }

    // 5. Execute and classify.
    match execute(decoded).await? {
        Ok(result) => {
            let plaintext = serde_json::to_vec(&result)
                .map_err(|e| InternalError(format!("could not encode response: {e}")))?;
            encrypt(crypto, &vk, &plaintext)
        }
        Err(user_err) => encrypt_error(crypto, &vk, &user_err),
    }
}

fn encrypt_error(
    crypto: &dyn EnvelopeCrypto,
    vk: &ViewingKey,
    err: &UserError,
) -> Result<EnclaveResponse, InternalError> {
    let payload = serde_json::to_vec(&RpcErrorPayload::from(err))
        .map_err(|e| InternalError(format!("could not encode error: {e}")))?;
    encrypt(crypto, vk, &payload)
}

fn encrypt(
    crypto: &dyn EnvelopeCrypto,
    vk: &ViewingKey,
    plaintext: &[u8],
) -> Result<EnclaveResponse, InternalError> {
    let ciphertext = crypto
        .encrypt_response(&vk.public_key, plaintext)
        .map_err(|e| InternalError(e.to_string()))?;
    Ok(EnclaveResponse::Encrypted(Bytes::from(ciphertext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crypto::EnclaveKey, test_utils::PlainEnvelope};

    fn signed_viewing_key(key: &EnclaveKey) -> ViewingKey {
        let public_key = Bytes::from(vec![0x04; 33]);
        let mut preimage = Vec::new();
        preimage.extend_from_slice(key.address().as_slice());
        preimage.extend_from_slice(&public_key);
        let signature = key.sign(keccak256(preimage)).unwrap();
        ViewingKey { account: key.address(), public_key, signature, signature_type: 0 }
    }

    #[test]
    fn test_viewing_key_authentication() {
        let key = EnclaveKey::generate();
        let vk = signed_viewing_key(&key);
        assert!(vk.authenticate().is_ok());

        let mut stolen = vk.clone();
        stolen.account = Address::repeat_byte(9);
        assert_eq!(stolen.authenticate(), Err(UserError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_undecodable_request_is_plaintext_error() {
        let response = with_vk_encryption::<(), u64, _, _, _>(
            &PlainEnvelope,
            b"not json",
            |_| unreachable!("extraction unreachable without a viewing key"),
            |_| async { unreachable!("execution unreachable without a viewing key") },
        )
        .await
        .unwrap();
        assert!(matches!(response, EnclaveResponse::PlaintextError(msg) if msg.contains("unmarshal")));
    }

    #[tokio::test]
    async fn test_sender_must_match_viewing_key() {
        let key = EnclaveKey::generate();
        let vk = signed_viewing_key(&key);
        let request = serde_json::to_vec(&vec![serde_json::to_value(&vk).unwrap()]).unwrap();

        let response = with_vk_encryption::<(), u64, _, _, _>(
            &PlainEnvelope,
            &request,
            |_| Ok(UserRpcRequest { sender: Address::repeat_byte(7), params: () }),
            |_| async { unreachable!("sender mismatch short-circuits") },
        )
        .await
        .unwrap();
        let EnclaveResponse::Encrypted(payload) = response else {
            panic!("sender mismatch must be encrypted");
        };
        let err: RpcErrorPayload = serde_json::from_slice(&payload).unwrap();
        assert!(err.message.contains("does not match the requester"));
    }

    #[tokio::test]
    async fn test_success_is_encrypted_result() {
        let key = EnclaveKey::generate();
        let vk = signed_viewing_key(&key);
        let account = key.address();
        let request = serde_json::to_vec(&vec![serde_json::to_value(&vk).unwrap()]).unwrap();

        let response = with_vk_encryption(
            &PlainEnvelope,
            &request,
            |_| Ok(UserRpcRequest { sender: account, params: () }),
            |_| async { Ok(Ok(42u64)) },
        )
        .await
        .unwrap();
        let EnclaveResponse::Encrypted(payload) = response else { panic!("expected ciphertext") };
        let result: u64 = serde_json::from_slice(&payload).unwrap();
        assert_eq!(result, 42);
    }
}
