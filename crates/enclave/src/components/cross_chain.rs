//! The cross-chain processors: inbound L1→L2 message extraction and the
//! outbound L2→L1 commitment.

use crate::{
    crypto::KeccakPool,
    errors::CrossChainError,
    traits::{Storage, TxExecution},
};
use alloy_primitives::{Address, B256};
use alloy_rlp::Decodable;
use cloak_primitives::{BlockAndReceipts, CrossChainMessage, L1BlockRef, TreeLeaf, ValueTransfer};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// The event signature the message bus emits for published messages.
const MESSAGE_PUBLISHED_EVENT: &[u8] =
    b"MessagePublished(address,uint64,uint64,uint32,bytes,uint8)";

/// The inbound scan watermark: the latest canonical L1 block whose receipts
/// have been scanned for messages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Watermark {
    hash: B256,
    height: u64,
}

/// Bridges L1 and L2 in both directions.
///
/// Inbound, it scans the receipts of newly canonical L1 blocks for message
/// events from the configured bus contract and persists what it finds.
/// Outbound, it turns the messages and transfers emitted by an executed
/// batch into the hashed leaves the batch header commits to.
#[derive(Debug)]
pub struct CrossChainProcessors {
    storage: Arc<dyn Storage>,
    message_bus: Address,
    message_topic: B256,
    hasher: KeccakPool,
    watermark: Mutex<Option<Watermark>>,
}

impl CrossChainProcessors {
    /// Creates the processors for the given bus contract.
    pub fn new(storage: Arc<dyn Storage>, message_bus: Address) -> Self {
        let hasher = KeccakPool::new();
        let message_topic = hasher.hash(MESSAGE_PUBLISHED_EVENT);
        Self { storage, message_bus, message_topic, hasher, watermark: Mutex::new(None) }
    }

    /// Extracts the bus messages from the block's receipts, persists them,
    /// and advances the inbound watermark.
    ///
    /// A decode failure is permanent for this block: the block is already
    /// stored by the consumer and re-submission is rejected as a duplicate,
    /// so the error must surface to the caller.
    pub async fn store_inbound_messages(
        &self,
        br: &BlockAndReceipts,
    ) -> Result<usize, CrossChainError> {
        let messages = self.extract_messages(br)?;
        if !messages.is_empty() {
            self.storage.store_inbound_messages(br.block.hash, &messages).await?;
            debug!(
                target: "cross_chain",
                block = %br.block.hash,
                count = messages.len(),
                "stored inbound cross-chain messages"
            );
        }
        self.advance_watermark(&br.block);
        Ok(messages.len())
    }

    fn extract_messages(
        &self,
        br: &BlockAndReceipts,
    ) -> Result<Vec<CrossChainMessage>, CrossChainError> {
        let mut messages = Vec::new();
        for (tx_index, receipt) in br.receipts.iter().enumerate() {
            if !receipt.status {
                continue;
            }
            for log in &receipt.logs {
                if log.address != self.message_bus {
                    continue;
                }
                if log.data.topics().first() != Some(&self.message_topic) {
                    continue;
                }
                let message = CrossChainMessage::decode(&mut log.data.data.as_ref())
                    .map_err(|e| CrossChainError::MalformedEvent {
                        tx_index,
                        reason: e.to_string(),
                    })?;
                trace!(
                    target: "cross_chain",
                    sequence = message.sequence,
                    hash = %self.hasher.hash(&log.data.data),
                    "extracted inbound message"
                );
                messages.push(message);
            }
        }
        Ok(messages)
    }

    fn advance_watermark(&self, block: &L1BlockRef) {
        let mut watermark = self.watermark.lock().expect("watermark lock poisoned");
        let advance = watermark.map_or(true, |w| block.number >= w.height);
        if advance {
            *watermark = Some(Watermark { hash: block.hash, height: block.number });
        }
    }

    /// Resets the watermark to the common ancestor of an L1 fork; the new
    /// canonical suffix is then re-applied block by block.
    pub fn on_fork(&self, ancestor: &L1BlockRef) {
        let mut watermark = self.watermark.lock().expect("watermark lock poisoned");
        if watermark.is_some_and(|w| w.height > ancestor.number) {
            debug!(
                target: "cross_chain",
                ancestor = %ancestor.hash,
                height = ancestor.number,
                "rewinding inbound watermark to fork ancestor"
            );
            *watermark = Some(Watermark { hash: ancestor.hash, height: ancestor.number });
        }
    }

    /// The inbound watermark `(hash, height)` batch headers record, zero
    /// before the first scanned block.
    pub fn watermark(&self) -> (B256, u64) {
        self.watermark
            .lock()
            .expect("watermark lock poisoned")
            .map_or((B256::ZERO, 0), |w| (w.hash, w.height))
    }
}

/// The hashed tree leaves of a batch, ordered by
/// `(transaction index, emission index)`.
pub fn outbound_leaves(executions: &[TxExecution]) -> Vec<TreeLeaf> {
    let mut leaves = Vec::new();
    for execution in executions {
        if !execution.success {
            continue;
        }
        leaves.extend(execution.messages.iter().map(TreeLeaf::message));
        leaves.extend(execution.value_transfers.iter().map(TreeLeaf::value_transfer));
    }
    leaves
}

/// The plaintext outbound messages of a batch, in leaf order.
pub fn outbound_messages(executions: &[TxExecution]) -> Vec<CrossChainMessage> {
    executions
        .iter()
        .filter(|e| e.success)
        .flat_map(|e| e.messages.iter().cloned())
        .collect()
}

/// The outbound value transfers of a batch, in leaf order.
pub fn outbound_transfers(executions: &[TxExecution]) -> Vec<ValueTransfer> {
    executions
        .iter()
        .filter(|e| e.success)
        .flat_map(|e| e.value_transfers.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::InMemoryStorage;
    use alloy_primitives::{Bytes, Log, LogData};
    use cloak_primitives::{cross_chain_root, L1Receipt};

    fn processors(bus: Address) -> CrossChainProcessors {
        CrossChainProcessors::new(Arc::new(InMemoryStorage::default()), bus)
    }

    fn bus_log(processors: &CrossChainProcessors, bus: Address, msg: &CrossChainMessage) -> Log {
        Log {
            address: bus,
            data: LogData::new_unchecked(
                vec![processors.message_topic],
                Bytes::from(alloy_rlp::encode(msg)),
            ),
        }
    }

    fn block(number: u64) -> L1BlockRef {
        L1BlockRef { hash: B256::repeat_byte(number as u8 + 1), number, ..Default::default() }
    }

    #[tokio::test]
    async fn test_extracts_only_bus_events_from_successful_txs() {
        let bus = Address::repeat_byte(0xBB);
        let p = processors(bus);
        let msg = CrossChainMessage { sequence: 3, ..Default::default() };

        let receipts = vec![
            // Wrong emitter.
            L1Receipt {
                status: true,
                logs: vec![Log {
                    address: Address::repeat_byte(0xCC),
                    ..bus_log(&p, bus, &msg)
                }],
            },
            // Reverted transaction.
            L1Receipt { status: false, logs: vec![bus_log(&p, bus, &msg)] },
            // The one that counts.
            L1Receipt { status: true, logs: vec![bus_log(&p, bus, &msg)] },
        ];
        let br = BlockAndReceipts::new(block(5), receipts);
        assert_eq!(p.store_inbound_messages(&br).await.unwrap(), 1);
        assert_eq!(p.watermark(), (block(5).hash, 5));
    }

    #[tokio::test]
    async fn test_malformed_event_poisons_block() {
        let bus = Address::repeat_byte(0xBB);
        let p = processors(bus);
        let garbage = Log {
            address: bus,
            data: LogData::new_unchecked(vec![p.message_topic], Bytes::from(vec![0xFF])),
        };
        let br =
            BlockAndReceipts::new(block(1), vec![L1Receipt { status: true, logs: vec![garbage] }]);
        let err = p.store_inbound_messages(&br).await.unwrap_err();
        assert!(matches!(err, CrossChainError::MalformedEvent { tx_index: 0, .. }));
        // The watermark did not advance past the poisoned block.
        assert_eq!(p.watermark(), (B256::ZERO, 0));
    }

    #[tokio::test]
    async fn test_fork_rewinds_watermark_to_ancestor() {
        let p = processors(Address::repeat_byte(0xBB));
        for n in [1, 2, 3] {
            p.store_inbound_messages(&BlockAndReceipts::new(block(n), vec![])).await.unwrap();
        }
        assert_eq!(p.watermark().1, 3);
        p.on_fork(&block(1));
        assert_eq!(p.watermark(), (block(1).hash, 1));
        // Re-applying the new canonical suffix advances again.
        p.store_inbound_messages(&BlockAndReceipts::new(block(2), vec![])).await.unwrap();
        assert_eq!(p.watermark().1, 2);
    }

    #[test]
    fn test_outbound_leaves_keep_emission_order() {
        let msg = |seq| CrossChainMessage { sequence: seq, ..Default::default() };
        let executions = vec![
            TxExecution { success: true, messages: vec![msg(1), msg(2)], ..Default::default() },
            TxExecution { success: false, messages: vec![msg(9)], ..Default::default() },
            TxExecution { success: true, messages: vec![msg(3)], ..Default::default() },
        ];
        let leaves = outbound_leaves(&executions);
        assert_eq!(leaves.len(), 3);
        assert_eq!(leaves, [TreeLeaf::message(&msg(1)), TreeLeaf::message(&msg(2)), TreeLeaf::message(&msg(3))]);

        // Leaf order is load-bearing: the committed root depends on it.
        let mut reordered = leaves.clone();
        reordered.swap(0, 2);
        assert_ne!(cross_chain_root(&leaves), cross_chain_root(&reordered));
    }
}
