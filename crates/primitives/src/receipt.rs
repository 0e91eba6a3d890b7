//! Receipts produced by batch execution.

use alloy_primitives::{Log, B256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// The receipt of a single transaction inside an executed batch.
///
/// Receipts are confidential state: they are stored inside the enclave and
/// only ever leave it through the encrypted RPC boundary.
#[derive(Debug, Default, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReceipt {
    /// Hash of the transaction this receipt belongs to.
    pub tx_hash: B256,
    /// Whether execution succeeded.
    pub success: bool,
    /// Gas used by this transaction, including its L1 publication charge.
    #[serde(with = "alloy_serde::quantity")]
    pub gas_used: u64,
    /// Cumulative gas used in the batch up to and including this transaction.
    #[serde(with = "alloy_serde::quantity")]
    pub cumulative_gas_used: u64,
    /// Logs emitted during execution.
    pub logs: Vec<Log>,
}
