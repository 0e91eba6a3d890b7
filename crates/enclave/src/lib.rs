//! The enclave-side consensus and execution core of the cloak rollup.
//!
//! The enclave ingests L1 blocks, advances the L2 chain through reorgs,
//! executes sequencer-signed batches deterministically, commits to
//! cross-chain traffic, and answers user queries through an encrypted RPC
//! boundary. Storage, the execution engine, the mempool, and the envelope
//! cipher are collaborators behind traits; this crate owns the state machine
//! between them.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod config;
pub mod errors;

pub mod crypto;
pub mod traits;

pub mod components;
pub mod gas;
pub mod nodetype;
pub mod rpc;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

/// Re-export commonly used types and traits.
pub mod prelude {
    pub use crate::{
        components::{BatchExecutor, BatchRegistry, BlockConsumer, SignatureValidator},
        config::EnclaveConfig,
        errors::{ConsumerError, EnclaveError, StorageError},
        nodetype::{Sequencer, Validator},
        traits::{Evm, Mempool, Storage},
    };
}
