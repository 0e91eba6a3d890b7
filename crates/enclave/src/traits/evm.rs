//! The seam to the Ethereum-compatible execution engine.
//!
//! The engine's semantics are not defined here; the core only requires that
//! execution is deterministic: the same environment, parent state and
//! transactions produce bit-identical results on any enclave.

use crate::errors::{EvmError, UserError};
use alloy_primitives::{Address, Bytes, Log, B256, U256};
use async_trait::async_trait;
use cloak_primitives::{CrossChainMessage, RawTransaction, ValueTransfer};

/// The block anchor of a read-only query.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BlockSpec {
    /// The latest executed batch.
    #[default]
    Latest,
    /// The canonical batch at the given height.
    Number(u64),
}

/// The environment a batch executes in.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchEnv {
    /// State root of the parent batch.
    pub parent_state_root: B256,
    /// Height of the batch being built or replayed.
    pub number: u64,
    /// Batch timestamp.
    pub timestamp: u64,
    /// Fee recipient.
    pub coinbase: Address,
    /// Declared base fee.
    pub base_fee: U256,
    /// Batch gas limit.
    pub gas_limit: u64,
}

/// The outcome of one transaction inside a batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TxExecution {
    /// Hash of the executed transaction.
    pub tx_hash: B256,
    /// Whether execution succeeded.
    pub success: bool,
    /// Execution gas used, excluding the L1 publication charge.
    pub gas_used: u64,
    /// Logs emitted during execution.
    pub logs: Vec<Log>,
    /// Cross-chain messages emitted during execution, in emission order.
    pub messages: Vec<CrossChainMessage>,
    /// Value transfers emitted during execution, in emission order.
    pub value_transfers: Vec<ValueTransfer>,
}

/// The outcome of executing a whole batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EvmBatchResult {
    /// The resulting state root.
    pub state_root: B256,
    /// Per-transaction outcomes, in batch order.
    pub executions: Vec<TxExecution>,
}

/// A read-only call message, the dry-run input of gas estimation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallRequest {
    /// The logical sender. Mandatory at the RPC boundary.
    pub from: Option<Address>,
    /// The callee; [None] deploys.
    pub to: Option<Address>,
    /// Caller-supplied gas limit.
    pub gas: Option<u64>,
    /// Legacy gas price.
    pub gas_price: Option<U256>,
    /// EIP-1559 fee cap.
    pub max_fee_per_gas: Option<U256>,
    /// EIP-1559 priority fee.
    pub max_priority_fee_per_gas: Option<U256>,
    /// Transferred value.
    pub value: Option<U256>,
    /// Call data.
    pub data: Bytes,
}

impl CallRequest {
    /// The fee the caller is willing to pay per gas unit. Specifying both
    /// the legacy and the EIP-1559 form is a user error.
    pub fn fee_cap(&self) -> Result<U256, UserError> {
        match (self.gas_price, self.max_fee_per_gas.or(self.max_priority_fee_per_gas)) {
            (Some(_), Some(_)) => Err(UserError::InvalidParams(
                "both gasPrice and (maxFeePerGas or maxPriorityFeePerGas) specified".to_string(),
            )),
            (Some(gas_price), None) => Ok(gas_price),
            (None, _) => Ok(self.max_fee_per_gas.unwrap_or(U256::ZERO)),
        }
    }
}

/// How a dry-run call failed inside the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmFailure {
    /// The call reverted with the given data.
    Revert(Bytes),
    /// The call ran out of gas.
    OutOfGas,
    /// Any other deterministic execution failure.
    Halt(String),
}

/// The outcome of a dry-run call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    /// Gas consumed by the call.
    pub gas_used: u64,
    /// Return data of a successful call.
    pub output: Bytes,
    /// Set when the call failed.
    pub failure: Option<VmFailure>,
}

impl CallOutcome {
    /// Whether the call failed.
    pub const fn failed(&self) -> bool {
        self.failure.is_some()
    }

    /// The revert data, when the failure is a revert with data.
    pub fn revert_data(&self) -> Option<&Bytes> {
        match &self.failure {
            Some(VmFailure::Revert(data)) if !data.is_empty() => Some(data),
            _ => None,
        }
    }
}

/// The deterministic execution engine the core consumes.
#[async_trait]
pub trait Evm: Send + Sync + core::fmt::Debug {
    /// Executes the transactions against the parent state described by the
    /// environment and returns the per-transaction outcomes plus the
    /// resulting state root.
    async fn execute_batch(
        &self,
        env: &BatchEnv,
        txs: &[RawTransaction],
    ) -> Result<EvmBatchResult, EvmError>;

    /// Dry-runs a call message at the given block with the given gas limit.
    /// Deterministic failures are reported through [CallOutcome::failure];
    /// an [Err] means the message can never be accepted (or the engine
    /// itself failed).
    async fn call(
        &self,
        call: &CallRequest,
        gas_limit: u64,
        at: BlockSpec,
    ) -> Result<CallOutcome, EvmError>;

    /// The balance of an account at the given block.
    async fn balance(&self, account: Address, at: BlockSpec) -> Result<U256, EvmError>;

    /// The state root of the empty genesis state.
    async fn genesis_state_root(&self) -> Result<B256, EvmError>;
}
