//! The persistence contract consumed by the core.

use crate::errors::StorageResult;
use alloy_primitives::B256;
use async_trait::async_trait;
use cloak_primitives::{Batch, BatchReceipt, CrossChainMessage, L1BlockRef};

/// Keyed persistence for blocks, batches, heads and execution status.
///
/// Blocks and batches are append-only and immutable once stored; only their
/// canonicality is mutable. Reads are consistent with the most recent
/// completed write, and [Storage::store_executed_batch] persists the batch,
/// its receipts and the executed flag as one atomic unit.
#[async_trait]
pub trait Storage: Send + Sync + core::fmt::Debug {
    /// Fetches an L1 block by hash.
    async fn fetch_block(&self, hash: B256) -> StorageResult<L1BlockRef>;

    /// Stores an L1 block.
    async fn store_block(&self, block: &L1BlockRef) -> StorageResult<()>;

    /// Fetches the current L1 head block.
    async fn fetch_head_block(&self) -> StorageResult<L1BlockRef>;

    /// Moves the L1 head to the given, already stored, block.
    async fn update_l1_head(&self, hash: B256) -> StorageResult<()>;

    /// Fetches a batch by hash.
    async fn fetch_batch(&self, hash: B256) -> StorageResult<Batch>;

    /// Fetches the canonical batch at the given sequence number.
    async fn fetch_batch_by_seq_no(&self, seq_no: u64) -> StorageResult<Batch>;

    /// Fetches the canonical head batch: the executed batch with the highest
    /// sequence number.
    async fn fetch_head_batch(&self) -> StorageResult<Batch>;

    /// Stores a batch and marks it canonical for its sequence number,
    /// demoting any batch previously canonical there.
    async fn store_batch(&self, batch: &Batch) -> StorageResult<()>;

    /// Fetches all stored canonical batches with `seq_no >= from_seq_no`
    /// that have not been executed yet, in ascending sequence order.
    async fn fetch_canonical_unexecuted_batches(
        &self,
        from_seq_no: u64,
    ) -> StorageResult<Vec<Batch>>;

    /// Atomically stores a batch together with its receipts and marks it
    /// executed. Rejects re-execution of an already executed batch.
    async fn store_executed_batch(
        &self,
        batch: &Batch,
        receipts: &[BatchReceipt],
    ) -> StorageResult<()>;

    /// Whether the batch with the given hash has been executed.
    async fn batch_was_executed(&self, hash: B256) -> StorageResult<bool>;

    /// Persists the inbound messages extracted from the given L1 block.
    async fn store_inbound_messages(
        &self,
        block_hash: B256,
        messages: &[CrossChainMessage],
    ) -> StorageResult<()>;
}
