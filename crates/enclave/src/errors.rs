//! Error types for the enclave core.
//!
//! Components return discriminated variants, never opaque strings, so the
//! enclave boundary can classify reliably: user errors are wrapped and
//! encrypted for the caller, flow-control conditions are consumed by callers
//! to branch, and system errors propagate upward raw. Fatal invariant
//! violations (double execution, broken chain after a rewind) abort the
//! enclave instead of surfacing as errors, since continuing would corrupt
//! state.

use alloy_primitives::{hex, Bytes, B256};
use thiserror::Error;

/// A [Result] type alias where the error is [StorageError].
pub type StorageResult<T> = Result<T, StorageError>;

/// An error returned by the [Storage] interface.
///
/// [Storage]: crate::traits::Storage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The requested record does not exist. Flow control, not a failure.
    #[error("not found")]
    NotFound,
    /// The backend failed. Propagated as a system error.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// An error produced while ingesting an L1 block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumerError {
    /// The block has been ingested before. Idempotent rejection.
    #[error("block already processed")]
    BlockAlreadyProcessed,
    /// No common ancestor between the block and the current head exists
    /// within the stored chain.
    #[error("block ancestor not found")]
    BlockAncestorNotFound,
    /// Inbound message extraction failed. The block stays stored; the
    /// failure is permanent for this block.
    #[error("cross-chain extraction failed for block {0}: {1}")]
    CrossChainExtraction(B256, CrossChainError),
    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// An error produced by the cross-chain processors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrossChainError {
    /// A message-bus event could not be decoded.
    #[error("malformed message event in tx {tx_index}: {reason}")]
    MalformedEvent {
        /// Index of the offending transaction within the block.
        tx_index: usize,
        /// Decoder failure description.
        reason: String,
    },
    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// An error returned by the execution engine seam.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvmError {
    /// The transaction does not cover its intrinsic gas. During estimation
    /// this signals "raise the lower bound".
    #[error("intrinsic gas too low")]
    IntrinsicGas,
    /// The sender cannot cover the transferred value.
    #[error("insufficient funds for transfer")]
    InsufficientFunds,
    /// The engine itself failed. Propagated as a system error.
    #[error("execution engine failure: {0}")]
    Engine(String),
}

/// An error produced while executing a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// The batch was already executed. Storage rejects re-execution, which
    /// makes the validator loop idempotent.
    #[error("batch {0} already executed")]
    AlreadyExecuted(B256),
    /// The batch declares a base fee below the configured floor.
    #[error("batch base fee below the configured floor")]
    BaseFeeBelowFloor,
    /// The parent batch is not available.
    #[error("parent batch {0} not found")]
    ParentNotFound(B256),
    /// Re-execution produced a different state root than the header commits
    /// to.
    #[error("state root mismatch for batch {batch}: expected {expected}, got {got}")]
    StateRootMismatch {
        /// The offending batch hash.
        batch: B256,
        /// The state root committed to by the header.
        expected: B256,
        /// The locally computed state root.
        got: B256,
    },
    /// Re-execution produced a different cross-chain commitment than the
    /// header commits to.
    #[error("cross-chain root mismatch for batch {0}")]
    CrossChainRootMismatch(B256),
    /// Engine failure.
    #[error(transparent)]
    Evm(#[from] EvmError),
    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// An error produced while checking or producing signatures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The signature does not recover to the attested signer.
    #[error("invalid signature")]
    InvalidSignature,
    /// The signature bytes are structurally invalid.
    #[error("malformed signature: {0}")]
    Malformed(String),
}

/// An error produced by the mempool seam.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("mempool failure: {0}")]
pub struct MempoolError(pub String);

/// An error produced by the rollup payload compressor seam.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("compression failure: {0}")]
pub struct CompressionError(pub String);

/// A deterministic, user-attributable failure, surfaced encrypted to the
/// caller at the RPC boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UserError {
    /// The call reverted; the raw revert bytes are preserved for the
    /// error-data channel.
    #[error("execution reverted")]
    Reverted {
        /// ABI-encoded revert data.
        data: Bytes,
    },
    /// The sender cannot fund the call.
    #[error("insufficient funds for transfer")]
    InsufficientFunds,
    /// No gas limit up to the cap lets the call succeed.
    #[error("gas required exceeds allowance ({0})")]
    GasExceedsAllowance(u64),
    /// Execution failed deterministically for a reason other than a revert
    /// or running out of gas.
    #[error("execution failed: {0}")]
    Failed(String),
    /// A signature check failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// The request parameters are malformed.
    #[error("invalid params: {0}")]
    InvalidParams(String),
}

/// JSON-RPC error code reserved for EVM reverts.
pub const REVERT_ERROR_CODE: i64 = 3;

/// Generic JSON-RPC error code for the remaining user errors.
pub const USER_ERROR_CODE: i64 = -32000;

impl UserError {
    /// The JSON-RPC error code for this failure.
    pub const fn error_code(&self) -> i64 {
        match self {
            Self::Reverted { .. } => REVERT_ERROR_CODE,
            _ => USER_ERROR_CODE,
        }
    }

    /// Hex-encoded revert bytes for reverts, [None] otherwise.
    pub fn error_data(&self) -> Option<String> {
        match self {
            Self::Reverted { data } => Some(hex::encode_prefixed(data)),
            _ => None,
        }
    }
}

/// The top-level error of the enclave core: everything a node role can
/// surface to its host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnclaveError {
    /// The submitted genesis batch does not match the recomputed genesis.
    #[error("received invalid genesis batch")]
    InvalidGenesisBatch,
    /// A batch or rollup signature failed verification.
    #[error(transparent)]
    Signature(#[from] SignatureError),
    /// L1 ingestion failure.
    #[error(transparent)]
    Consumer(#[from] ConsumerError),
    /// Batch execution failure.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Mempool failure.
    #[error(transparent)]
    Mempool(#[from] MempoolError),
    /// Payload compression failure.
    #[error(transparent)]
    Compression(#[from] CompressionError),
    /// A user-attributable failure surfaced through the boundary.
    #[error(transparent)]
    User(#[from] UserError),
    /// The node is not yet initialised far enough to serve the request.
    #[error("not initialised")]
    NotInitialised,
}

/// A non-deterministic internal failure. Never encrypted for the caller: it
/// leaks nothing about confidential state and the caller can do nothing with
/// it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("internal error: {0}")]
pub struct InternalError(pub String);

impl From<StorageError> for InternalError {
    fn from(err: StorageError) -> Self {
        Self(err.to_string())
    }
}

impl From<EvmError> for InternalError {
    fn from(err: EvmError) -> Self {
        Self(err.to_string())
    }
}
