//! The encrypted RPC boundary of the enclave.
//!
//! Requests arrive encrypted to the enclave public key; the plaintext is a
//! JSON array whose first element is a signed viewing key. Responses are
//! encrypted to the viewing key, except for decrypt/parse failures which are
//! returned in plaintext (they leak nothing about state) and system errors
//! which propagate raw.

mod envelope;
pub use envelope::{
    with_vk_encryption, EnclaveResponse, EnvelopeCrypto, EnvelopeError, RpcErrorPayload,
    UserRpcRequest, ViewingKey,
};

mod estimate_gas;
pub use estimate_gas::{extract_estimate_gas_request, EstimateGasParams};

mod manager;
pub use manager::EncryptionManager;
