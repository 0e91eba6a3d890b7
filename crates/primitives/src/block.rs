//! L1 block references as seen by the enclave.

use alloy_primitives::{Log, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// A reference to an L1 block: everything the enclave tracks about the host
/// chain. Identity is the L1 block hash.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L1BlockRef {
    /// The block hash.
    pub hash: B256,
    /// The parent block hash.
    pub parent_hash: B256,
    /// The block height.
    pub number: u64,
    /// The block timestamp.
    pub timestamp: u64,
    /// The block base fee, used to price L1 publication of L2 traffic.
    pub base_fee: U256,
}

/// A receipt of an L1 transaction, reduced to the parts the cross-chain
/// scanner consumes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L1Receipt {
    /// Whether the transaction succeeded.
    pub status: bool,
    /// The logs emitted by the transaction.
    pub logs: Vec<Log>,
}

/// An L1 block paired with its receipts, the unit of L1 ingestion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlockAndReceipts {
    /// The block reference.
    pub block: L1BlockRef,
    /// Receipts of all transactions in the block.
    pub receipts: Vec<L1Receipt>,
}

impl BlockAndReceipts {
    /// Pairs a block with its receipts.
    pub const fn new(block: L1BlockRef, receipts: Vec<L1Receipt>) -> Self {
        Self { block, receipts }
    }
}
