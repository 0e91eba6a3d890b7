//! The batch registry: the in-enclave index of executed batches and the
//! canonical head.

use alloy_primitives::B256;
use cloak_primitives::{params::L2_GENESIS_SEQ_NO, Batch};
use std::collections::HashMap;
use tracing::{debug, warn};

/// A compact record of an executed batch. Parents are referenced by hash
/// only; the registry is an index plus a head pointer, with no back
/// references between records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutedBatchRecord {
    /// The batch hash.
    pub hash: B256,
    /// The batch sequence number.
    pub seq_no: u64,
    /// Hash of the parent batch.
    pub parent_hash: B256,
    /// Height of the batch.
    pub number: u64,
    /// State root the batch executed to.
    pub state_root: B256,
}

impl ExecutedBatchRecord {
    fn from_batch(batch: &Batch) -> Self {
        Self {
            hash: batch.hash(),
            seq_no: batch.seq_no(),
            parent_hash: batch.header.parent_hash,
            number: batch.header.number,
            state_root: batch.header.state_root,
        }
    }
}

/// Tracks the executed set and the head of the canonical batch chain.
///
/// The head only ever advances through [BatchRegistry::on_batch_executed]
/// and only ever rewinds through [BatchRegistry::rewind_to]; both are driven
/// by the node roles inside the single core critical section.
#[derive(Debug, Default)]
pub struct BatchRegistry {
    head_seq: Option<u64>,
    head_hash: Option<B256>,
    by_hash: HashMap<B256, ExecutedBatchRecord>,
    by_seq: HashMap<u64, B256>,
}

impl BatchRegistry {
    /// An empty registry, as at enclave start before replaying storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// The highest executed sequence number on the current canonical chain,
    /// [None] before genesis executes.
    pub const fn head_batch_seq(&self) -> Option<u64> {
        self.head_seq
    }

    /// Hash of the current head batch.
    pub const fn head_batch_hash(&self) -> Option<B256> {
        self.head_hash
    }

    /// Whether a batch with this hash has been executed.
    pub fn batch_was_executed(&self, hash: B256) -> bool {
        self.by_hash.contains_key(&hash)
    }

    /// The executed batch hash at the given sequence number, if any.
    pub fn executed_at_seq(&self, seq_no: u64) -> Option<B256> {
        self.by_seq.get(&seq_no).copied()
    }

    /// The executed record for the given hash.
    pub fn record(&self, hash: B256) -> Option<&ExecutedBatchRecord> {
        self.by_hash.get(&hash)
    }

    /// Registers an executed batch and advances the head.
    ///
    /// The caller has already verified the execution prerequisites, so a
    /// parent mismatch here is a program invariant violation: continuing
    /// would corrupt the canonical chain.
    pub fn on_batch_executed(&mut self, batch: &Batch) {
        let record = ExecutedBatchRecord::from_batch(batch);

        if self.by_hash.contains_key(&record.hash) {
            panic!("double execution of batch {}", record.hash);
        }
        match self.head_hash {
            None => {
                assert!(
                    batch.is_genesis() || record.seq_no == L2_GENESIS_SEQ_NO,
                    "first executed batch {} is not genesis",
                    record.hash
                );
            }
            Some(head_hash) => {
                assert!(
                    record.parent_hash == head_hash,
                    "executed batch {} does not extend head {head_hash}",
                    record.hash
                );
            }
        }

        self.head_seq = Some(record.seq_no);
        self.head_hash = Some(record.hash);
        self.by_seq.insert(record.seq_no, record.hash);
        self.by_hash.insert(record.hash, record);
        debug!(target: "registry", seq_no = record.seq_no, hash = %record.hash, "head advanced");
    }

    /// Seeds the registry with the persisted head batch at enclave start,
    /// before any chain checks apply. Replay of older history is not needed:
    /// executed state lives in storage, the registry only needs the head to
    /// resume advancing from.
    pub fn restore(&mut self, head: &Batch) {
        let record = ExecutedBatchRecord::from_batch(head);
        self.head_seq = Some(record.seq_no);
        self.head_hash = Some(record.hash);
        self.by_seq.insert(record.seq_no, record.hash);
        self.by_hash.insert(record.hash, record);
    }

    /// Rewinds the executed view to `fork_point_seq` after an observed L2
    /// reorg, dropping every record above it. The new canonical suffix is
    /// then re-executed batch by batch; rewinding is safe because state
    /// roots are content-addressed.
    ///
    /// Panics if the remaining head is inconsistent with its own record,
    /// since that means the index was corrupted.
    pub fn rewind_to(&mut self, fork_point_seq: u64) {
        warn!(target: "registry", fork_point_seq, "rewinding executed batches");
        let dropped = self
            .by_seq
            .iter()
            .filter(|(seq, _)| **seq > fork_point_seq)
            .map(|(seq, hash)| (*seq, *hash))
            .collect::<Vec<_>>();
        for (seq, hash) in dropped {
            self.by_seq.remove(&seq);
            self.by_hash.remove(&hash);
        }

        let head_hash = self.by_seq.get(&fork_point_seq).copied();
        let head_record = head_hash.and_then(|h| self.by_hash.get(&h));
        match (head_hash, head_record) {
            (Some(hash), Some(record)) => {
                assert!(
                    record.seq_no == fork_point_seq,
                    "registry hash mismatch after rewind to {fork_point_seq}"
                );
                self.head_seq = Some(fork_point_seq);
                self.head_hash = Some(hash);
            }
            (Some(_), None) => panic!("registry hash mismatch after rewind to {fork_point_seq}"),
            (None, _) => {
                // Rewound past everything we executed.
                self.head_seq = None;
                self.head_hash = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::batch_chain;

    #[test]
    fn test_head_advances_along_chain() {
        let mut registry = BatchRegistry::new();
        let batches = batch_chain(3);
        for batch in &batches {
            registry.on_batch_executed(batch);
        }
        assert_eq!(registry.head_batch_seq(), Some(2));
        assert_eq!(registry.head_batch_hash(), Some(batches[2].hash()));
        assert!(registry.batch_was_executed(batches[0].hash()));
        assert_eq!(registry.executed_at_seq(1), Some(batches[1].hash()));
    }

    #[test]
    #[should_panic(expected = "double execution")]
    fn test_double_execution_is_fatal() {
        let mut registry = BatchRegistry::new();
        let batches = batch_chain(1);
        registry.on_batch_executed(&batches[0]);
        registry.on_batch_executed(&batches[0]);
    }

    #[test]
    #[should_panic(expected = "does not extend head")]
    fn test_gap_is_fatal() {
        let mut registry = BatchRegistry::new();
        let batches = batch_chain(3);
        registry.on_batch_executed(&batches[0]);
        registry.on_batch_executed(&batches[2]);
    }

    #[test]
    fn test_rewind_drops_suffix_and_allows_replay() {
        let mut registry = BatchRegistry::new();
        let batches = batch_chain(4);
        for batch in &batches {
            registry.on_batch_executed(batch);
        }

        registry.rewind_to(1);
        assert_eq!(registry.head_batch_seq(), Some(1));
        assert_eq!(registry.head_batch_hash(), Some(batches[1].hash()));
        assert!(!registry.batch_was_executed(batches[2].hash()));
        assert_eq!(registry.executed_at_seq(3), None);

        // A competing suffix off the fork point can now execute.
        let mut replacement = batches[2].clone();
        replacement.header.timestamp += 1;
        registry.on_batch_executed(&replacement);
        assert_eq!(registry.head_batch_seq(), Some(2));
        assert_eq!(registry.head_batch_hash(), Some(replacement.hash()));
    }

    #[test]
    fn test_rewind_to_genesis_keeps_genesis_head() {
        let mut registry = BatchRegistry::new();
        let batches = batch_chain(2);
        for batch in &batches {
            registry.on_batch_executed(batch);
        }
        registry.rewind_to(0);
        assert_eq!(registry.head_batch_seq(), Some(0));
    }
}
