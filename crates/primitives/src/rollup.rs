//! Rollup headers: the sequencer-signed commitments covering contiguous
//! ranges of batches, published to L1.

use crate::CrossChainMessage;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// The public header of a rollup. All fields are processed by the L1
/// management contract; the payload itself stays an opaque blob.
#[derive(Debug, Default, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct RollupHeader {
    /// The L1 block the sequencer considered canonical when creating this
    /// rollup.
    pub compression_l1_head: B256,
    /// Union of the cross-chain messages of all covered batches.
    pub cross_chain_messages: Vec<CrossChainMessage>,
    /// Hash of the compressed batch bundle carried in the payload.
    pub payload_hash: B256,
    /// Sequencer enclave signature over [Self::hash]. Cleared before hashing.
    pub signature: Bytes,
    /// The last batch sequence number covered by this rollup.
    pub last_batch_seq_no: u64,
}

impl RollupHeader {
    /// The canonical rollup hash: keccak256 of the RLP encoding with the
    /// signature cleared.
    pub fn hash(&self) -> B256 {
        let mut unsigned = self.clone();
        unsigned.signature = Bytes::new();
        keccak256(alloy_rlp::encode(&unsigned))
    }
}

/// The JSON wire form of a [RollupHeader], with the derived `hash` added on
/// marshalling and ignored on unmarshalling.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RollupHeaderJson {
    #[serde(default)]
    hash: B256,
    compression_l1_head: B256,
    cross_chain_messages: Vec<CrossChainMessage>,
    payload_hash: B256,
    signature: Bytes,
    #[serde(with = "alloy_serde::quantity")]
    last_batch_seq_no: u64,
}

impl serde::Serialize for RollupHeader {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RollupHeaderJson {
            hash: self.hash(),
            compression_l1_head: self.compression_l1_head,
            cross_chain_messages: self.cross_chain_messages.clone(),
            payload_hash: self.payload_hash,
            signature: self.signature.clone(),
            last_batch_seq_no: self.last_batch_seq_no,
        }
        .serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for RollupHeader {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let dec = RollupHeaderJson::deserialize(deserializer)?;
        Ok(Self {
            compression_l1_head: dec.compression_l1_head,
            cross_chain_messages: dec.cross_chain_messages,
            payload_hash: dec.payload_hash,
            signature: dec.signature,
            last_batch_seq_no: dec.last_batch_seq_no,
        })
    }
}

/// A rollup ready for L1 submission: the signed header plus the compressed,
/// encrypted payload blob it commits to.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollup {
    /// The signed rollup header.
    pub header: RollupHeader,
    /// The compressed batch bundle. Opaque to everything but the enclave.
    pub payload: Bytes,
}

/// The reconstruction manifest carried inside a rollup's encrypted payload:
/// enough shared state and per-batch deltas to rebuild every covered batch
/// header.
#[derive(Debug, Default, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalldataRollupHeader {
    /// Sequence number of the first covered batch.
    #[serde(with = "alloy_serde::quantity")]
    pub first_batch_seq_no: u64,
    /// Height of the first canonical covered batch.
    #[serde(with = "alloy_serde::quantity")]
    pub first_canon_batch_height: u64,
    /// Parent hash of the first canonical covered batch.
    pub first_canon_parent_hash: B256,
    /// Coinbase shared by all covered batches.
    pub coinbase: Address,
    /// Base fee shared by all covered batches.
    pub base_fee: U256,
    /// Gas limit shared by all covered batches.
    pub gas_limit: u64,
    /// Timestamp of the first covered batch.
    pub start_time: u64,
    /// Per-batch timestamp deltas, signed-magnitude encoded because RLP
    /// cannot encode negative integers.
    pub batch_time_deltas: Vec<Bytes>,
    /// Per-batch L1 height deltas, encoded the same way.
    pub l1_height_deltas: Vec<Bytes>,
    /// Sparse list of re-orged headers: empty entries for canonical batches,
    /// the full serialized header where a batch was re-orged.
    pub reorgs: Vec<Bytes>,
}

/// Internal rollup metadata that can be requested from the enclave.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicRollupMetadata {
    /// Sequence number of the first batch in the rollup.
    #[serde(with = "alloy_serde::quantity")]
    pub first_batch_seq_no: u64,
    /// Timestamp of the first batch in the rollup.
    #[serde(with = "alloy_serde::quantity")]
    pub start_time: u64,
}

impl From<&CalldataRollupHeader> for PublicRollupMetadata {
    fn from(header: &CalldataRollupHeader) -> Self {
        Self { first_batch_seq_no: header.first_batch_seq_no, start_time: header.start_time }
    }
}

/// Signed-magnitude encoding of a delta: a sign byte followed by the
/// big-endian magnitude with leading zeros stripped.
pub fn encode_delta(delta: i64) -> Bytes {
    let magnitude = delta.unsigned_abs();
    let be = magnitude.to_be_bytes();
    let first = be.iter().position(|b| *b != 0).unwrap_or(be.len());
    let mut out = Vec::with_capacity(1 + be.len() - first);
    out.push(u8::from(delta < 0));
    out.extend_from_slice(&be[first..]);
    Bytes::from(out)
}

/// Decodes a delta produced by [encode_delta]. Returns `None` for malformed
/// input.
pub fn decode_delta(bytes: &Bytes) -> Option<i64> {
    let (sign, magnitude) = bytes.split_first()?;
    if *sign > 1 || magnitude.len() > 8 {
        return None;
    }
    let mut be = [0u8; 8];
    be[8 - magnitude.len()..].copy_from_slice(magnitude);
    let value = i64::try_from(u64::from_be_bytes(be)).ok()?;
    Some(if *sign == 1 { -value } else { value })
}
