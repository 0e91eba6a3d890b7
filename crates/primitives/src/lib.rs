//! Core types shared by the cloak enclave: batch and rollup headers, the
//! cross-chain data model, and the commitment tree the enclave publishes for
//! outbound traffic.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod params;

mod block;
pub use block::{BlockAndReceipts, L1BlockRef, L1Receipt};

mod batch;
pub use batch::{Batch, BatchHeader, RawTransaction};

mod receipt;
pub use receipt::BatchReceipt;

mod rollup;
pub use rollup::{
    decode_delta, encode_delta, CalldataRollupHeader, PublicRollupMetadata, Rollup, RollupHeader,
};

mod blob;
pub use blob::Blob;

mod cross_chain;
pub use cross_chain::{
    CrossChainBundle, CrossChainMessage, TreeLeaf, ValueTransfer, LEAF_TYPE_MESSAGE,
    LEAF_TYPE_VALUE_TRANSFER,
};

mod merkle;
pub use merkle::{cross_chain_root, leaf_hash, merkle_proof, verify_merkle_proof};
