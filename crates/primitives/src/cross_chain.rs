//! The cross-chain data model: messages and value transfers crossing the
//! L1/L2 boundary, the hashed tree leaves committed to by batch headers, and
//! the signed bundle exported for L1 submission.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// Leaf type tag for a cross-chain message.
pub const LEAF_TYPE_MESSAGE: u8 = 0x01;

/// Leaf type tag for a value transfer.
pub const LEAF_TYPE_VALUE_TRANSFER: u8 = 0x02;

/// A message emitted on one chain and delivered on the other, as published by
/// the message-bus contract.
#[derive(Debug, Default, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossChainMessage {
    /// The contract that published the message.
    pub sender: Address,
    /// Bus-assigned sequence of the message.
    #[serde(with = "alloy_serde::quantity")]
    pub sequence: u64,
    /// Sender-scoped nonce.
    #[serde(with = "alloy_serde::quantity")]
    pub nonce: u64,
    /// Application topic.
    #[serde(with = "alloy_serde::quantity")]
    pub topic: u32,
    /// Opaque message payload.
    pub payload: Bytes,
    /// Finality level requested by the sender.
    #[serde(with = "alloy_serde::quantity")]
    pub consistency_level: u8,
}

impl CrossChainMessage {
    /// The privacy-preserving commitment to this message: only the hash goes
    /// into the public tree leaves.
    pub fn hash(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }
}

/// A native value transfer crossing the bridge.
#[derive(Debug, Default, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueTransfer {
    /// The account the value was withdrawn from.
    pub sender: Address,
    /// The account the value is credited to.
    pub receiver: Address,
    /// The transferred amount.
    pub amount: U256,
    /// Bus-assigned sequence of the transfer.
    #[serde(with = "alloy_serde::quantity")]
    pub sequence: u64,
}

impl ValueTransfer {
    /// The privacy-preserving commitment to this transfer.
    pub fn hash(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }
}

/// A hashed leaf of the cross-chain commitment tree. Leaves carry only the
/// type tag and the hash of the underlying message or transfer, so clients
/// can build inclusion proofs without access to batch plaintext.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeLeaf {
    /// [LEAF_TYPE_MESSAGE] or [LEAF_TYPE_VALUE_TRANSFER].
    #[serde(with = "alloy_serde::quantity")]
    pub kind: u8,
    /// Hash of the message or transfer this leaf commits to.
    pub hash: B256,
}

impl TreeLeaf {
    /// A leaf committing to a [CrossChainMessage].
    pub fn message(msg: &CrossChainMessage) -> Self {
        Self { kind: LEAF_TYPE_MESSAGE, hash: msg.hash() }
    }

    /// A leaf committing to a [ValueTransfer].
    pub fn value_transfer(transfer: &ValueTransfer) -> Self {
        Self { kind: LEAF_TYPE_VALUE_TRANSFER, hash: transfer.hash() }
    }
}

/// The enclave-signed export of cross-chain commitments over a contiguous
/// range of batch sequence numbers, submitted to the L1 message bus.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossChainBundle {
    /// The L1 block the enclave considered canonical when exporting.
    pub l1_block_hash: B256,
    /// Height of that L1 block.
    #[serde(with = "alloy_serde::quantity")]
    pub l1_block_num: u64,
    /// First batch sequence number covered by the bundle.
    #[serde(with = "alloy_serde::quantity")]
    pub from_seq_no: u64,
    /// Last batch sequence number covered by the bundle.
    #[serde(with = "alloy_serde::quantity")]
    pub to_seq_no: u64,
    /// Cross-chain roots of the canonical batches in the range, in sequence
    /// order.
    pub cross_chain_roots: Vec<B256>,
    /// Enclave signature over [Self::hash_packed].
    pub signature: Bytes,
}

impl CrossChainBundle {
    /// The digest the enclave signs: a tightly packed encoding of every field
    /// except the signature, so the L1 contract can rebuild it from calldata.
    pub fn hash_packed(&self) -> B256 {
        let mut packed = Vec::with_capacity(32 + 8 * 3 + 32 * self.cross_chain_roots.len());
        packed.extend_from_slice(self.l1_block_hash.as_slice());
        packed.extend_from_slice(&self.l1_block_num.to_be_bytes());
        packed.extend_from_slice(&self.from_seq_no.to_be_bytes());
        packed.extend_from_slice(&self.to_seq_no.to_be_bytes());
        for root in &self.cross_chain_roots {
            packed.extend_from_slice(root.as_slice());
        }
        keccak256(packed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;

    #[test]
    fn test_message_hash_covers_payload() {
        let msg = CrossChainMessage { payload: Bytes::from(vec![1, 2, 3]), ..Default::default() };
        let mut other = msg.clone();
        other.payload = Bytes::from(vec![1, 2, 4]);
        assert_ne!(msg.hash(), other.hash());
    }

    #[test]
    fn test_bundle_hash_packed_binds_range() {
        let bundle = CrossChainBundle {
            l1_block_hash: b256!("00000000000000000000000000000000000000000000000000000000000000aa"),
            l1_block_num: 7,
            from_seq_no: 1,
            to_seq_no: 3,
            cross_chain_roots: vec![B256::ZERO],
            signature: Bytes::new(),
        };
        let mut widened = bundle.clone();
        widened.to_seq_no = 4;
        assert_ne!(bundle.hash_packed(), widened.hash_packed());

        // The signature never contributes to the digest.
        let mut signed = bundle.clone();
        signed.signature = Bytes::from(vec![0xFF; 65]);
        assert_eq!(bundle.hash_packed(), signed.hash_packed());
    }
}
