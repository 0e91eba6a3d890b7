//! Batch headers and batches: the L2 block equivalent produced by the
//! sequencer and re-executed by validators.

use crate::{
    params::{L2_GENESIS_HEIGHT, L2_GENESIS_SEQ_NO},
    CrossChainMessage, TreeLeaf,
};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Decodable, Encodable, RlpDecodable, RlpEncodable};

/// The public header of an L2 batch.
///
/// The canonical identity of a batch is the keccak256 hash of the RLP
/// encoding of this struct with the signature cleared; the signature
/// authenticates the header but never contributes to it. Field declaration
/// order is the RLP encoding order.
#[derive(Debug, Default, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct BatchHeader {
    /// Hash of the parent batch. Zero for the genesis batch.
    pub parent_hash: B256,
    /// The state root after executing this batch.
    pub state_root: B256,
    /// Root of the transactions in this batch.
    pub transactions_root: B256,
    /// Root of the receipts produced by this batch.
    pub receipts_root: B256,
    /// Height of the batch. Not unique: L1 reorgs can produce several batches
    /// at the same height.
    pub number: u64,
    /// The dense, strictly monotonic position of this batch in the
    /// sequencer's output stream. This is the authoritative ordering.
    pub seq_no: u64,
    /// Gas limit of the batch.
    pub gas_limit: u64,
    /// Gas used by the batch.
    pub gas_used: u64,
    /// Batch production timestamp.
    pub timestamp: u64,
    /// Arbitrary extra data.
    pub extra: Bytes,
    /// Base fee the batch was produced with.
    pub base_fee: U256,
    /// The sequencer's fee recipient.
    pub coinbase: Address,
    /// Hash of the L1 block the enclave considered canonical when producing
    /// this batch.
    pub l1_proof: B256,
    /// Sequencer enclave signature over [Self::hash]. Cleared before hashing.
    pub signature: Bytes,
    /// Outbound cross-chain messages emitted by this batch.
    pub cross_chain_messages: Vec<CrossChainMessage>,
    /// Hash of the latest L1 block scanned for inbound messages.
    pub inbound_cross_chain_hash: B256,
    /// Height of the latest L1 block scanned for inbound messages.
    /// Non-decreasing along any canonical chain prefix.
    pub inbound_cross_chain_height: u64,
    /// Root of the commitment tree over outbound messages and transfers.
    pub cross_chain_root: B256,
    /// The hashed tree leaves, published so clients can build inclusion
    /// proofs without access to batch plaintext.
    pub cross_chain_tree: Vec<TreeLeaf>,
}

impl BatchHeader {
    /// The canonical batch hash: keccak256 of the RLP encoding with the
    /// signature cleared.
    pub fn hash(&self) -> B256 {
        let mut unsigned = self.clone();
        unsigned.signature = Bytes::new();
        keccak256(alloy_rlp::encode(&unsigned))
    }

    /// Whether this header is the genesis batch header.
    pub fn is_genesis(&self) -> bool {
        self.number == L2_GENESIS_HEIGHT && self.seq_no == L2_GENESIS_SEQ_NO
    }
}

/// The JSON wire form of a [BatchHeader]. The derived `hash` field is added
/// on marshalling and ignored on unmarshalling.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchHeaderJson {
    #[serde(default)]
    hash: B256,
    parent_hash: B256,
    state_root: B256,
    transactions_root: B256,
    receipts_root: B256,
    #[serde(with = "alloy_serde::quantity")]
    number: u64,
    #[serde(with = "alloy_serde::quantity")]
    sequencer_order_no: u64,
    #[serde(with = "alloy_serde::quantity")]
    gas_limit: u64,
    #[serde(with = "alloy_serde::quantity")]
    gas_used: u64,
    #[serde(with = "alloy_serde::quantity")]
    timestamp: u64,
    extra_data: Bytes,
    base_fee_per_gas: U256,
    miner: Address,
    l1_proof: B256,
    signature: Bytes,
    cross_chain_messages: Vec<CrossChainMessage>,
    inbound_cross_chain_hash: B256,
    #[serde(with = "alloy_serde::quantity")]
    inbound_cross_chain_height: u64,
    cross_chain_tree_hash: B256,
    cross_chain_tree: Vec<TreeLeaf>,
}

impl From<&BatchHeader> for BatchHeaderJson {
    fn from(h: &BatchHeader) -> Self {
        Self {
            hash: h.hash(),
            parent_hash: h.parent_hash,
            state_root: h.state_root,
            transactions_root: h.transactions_root,
            receipts_root: h.receipts_root,
            number: h.number,
            sequencer_order_no: h.seq_no,
            gas_limit: h.gas_limit,
            gas_used: h.gas_used,
            timestamp: h.timestamp,
            extra_data: h.extra.clone(),
            base_fee_per_gas: h.base_fee,
            miner: h.coinbase,
            l1_proof: h.l1_proof,
            signature: h.signature.clone(),
            cross_chain_messages: h.cross_chain_messages.clone(),
            inbound_cross_chain_hash: h.inbound_cross_chain_hash,
            inbound_cross_chain_height: h.inbound_cross_chain_height,
            cross_chain_tree_hash: h.cross_chain_root,
            cross_chain_tree: h.cross_chain_tree.clone(),
        }
    }
}

impl From<BatchHeaderJson> for BatchHeader {
    fn from(dec: BatchHeaderJson) -> Self {
        Self {
            parent_hash: dec.parent_hash,
            state_root: dec.state_root,
            transactions_root: dec.transactions_root,
            receipts_root: dec.receipts_root,
            number: dec.number,
            seq_no: dec.sequencer_order_no,
            gas_limit: dec.gas_limit,
            gas_used: dec.gas_used,
            timestamp: dec.timestamp,
            extra: dec.extra_data,
            base_fee: dec.base_fee_per_gas,
            coinbase: dec.miner,
            l1_proof: dec.l1_proof,
            signature: dec.signature,
            cross_chain_messages: dec.cross_chain_messages,
            inbound_cross_chain_hash: dec.inbound_cross_chain_hash,
            inbound_cross_chain_height: dec.inbound_cross_chain_height,
            cross_chain_root: dec.cross_chain_tree_hash,
            cross_chain_tree: dec.cross_chain_tree,
        }
    }
}

impl serde::Serialize for BatchHeader {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        BatchHeaderJson::from(self).serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for BatchHeader {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BatchHeaderJson::deserialize(deserializer).map(Into::into)
    }
}

/// A raw, opaque L2 transaction. The enclave core never inspects transaction
/// plaintext; decoding is the execution engine's concern.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RawTransaction(pub Bytes);

impl RawTransaction {
    /// The transaction hash.
    pub fn hash(&self) -> B256 {
        keccak256(&self.0)
    }
}

impl Encodable for RawTransaction {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.0.encode(out);
    }
}

impl Decodable for RawTransaction {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        Ok(Self(Bytes::decode(buf)?))
    }
}

/// A batch: one unit of L2 execution, a signed header plus the ordered
/// transactions it covers.
#[derive(Debug, Default, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    /// The batch header.
    pub header: BatchHeader,
    /// The ordered transactions of the batch.
    pub transactions: Vec<RawTransaction>,
}

impl Batch {
    /// The canonical batch hash. See [BatchHeader::hash].
    pub fn hash(&self) -> B256 {
        self.header.hash()
    }

    /// The batch's sequencer order number.
    pub const fn seq_no(&self) -> u64 {
        self.header.seq_no
    }

    /// Whether this batch is the genesis batch.
    pub fn is_genesis(&self) -> bool {
        self.header.is_genesis()
    }
}
