//! Enclave-resident cryptography: the signing key and the pooled hasher.

mod key;
pub use key::{recover_signer, EnclaveKey};

mod hasher;
pub use hasher::KeccakPool;
