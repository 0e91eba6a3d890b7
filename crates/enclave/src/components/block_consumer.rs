//! L1 block ingestion: classification, fork detection and storage.

use crate::{
    components::CrossChainProcessors,
    errors::{ConsumerError, StorageError},
    traits::Storage,
};
use cloak_primitives::{BlockAndReceipts, L1BlockRef};
use std::sync::Arc;
use tracing::{debug, trace};

/// How an ingested L1 block relates to the chain the enclave tracks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockIngestionType {
    /// Whether the host flagged this block as the latest.
    pub is_latest: bool,
    /// Whether ingesting the block revealed an L1 fork.
    pub fork: bool,
    /// Whether the block arrived before any head existed.
    pub pre_genesis: bool,
}

/// Ingests `(block, receipts)` pairs from the host, classifies them against
/// the tracked L1 chain, and stores them.
///
/// Ingestion of one block moves through
/// `New → Classified → Stored → MessagesExtracted → Committed`; only the
/// message-extraction step can fail permanently, leaving the block stored
/// but poisoned.
#[derive(Debug)]
pub struct BlockConsumer {
    storage: Arc<dyn Storage>,
    cross_chain: Arc<CrossChainProcessors>,
}

impl BlockConsumer {
    /// Creates a consumer over the given storage and cross-chain processors.
    pub fn new(storage: Arc<dyn Storage>, cross_chain: Arc<CrossChainProcessors>) -> Self {
        Self { storage, cross_chain }
    }

    /// Ingests one L1 block. Idempotent: re-submitting a stored block fails
    /// with [ConsumerError::BlockAlreadyProcessed] and mutates nothing.
    pub async fn consume_block(
        &self,
        br: &BlockAndReceipts,
        is_latest: bool,
    ) -> Result<BlockIngestionType, ConsumerError> {
        let ingestion = self.try_insert_block(br, is_latest).await?;

        if !ingestion.pre_genesis {
            // Requires the block to be stored first, and can permanently
            // poison it: the failure surfaces but the block stays stored.
            self.cross_chain
                .store_inbound_messages(br)
                .await
                .map_err(|e| ConsumerError::CrossChainExtraction(br.block.hash, e))?;
        }

        Ok(ingestion)
    }

    async fn try_insert_block(
        &self,
        br: &BlockAndReceipts,
        is_latest: bool,
    ) -> Result<BlockIngestionType, ConsumerError> {
        let block = &br.block;

        match self.storage.fetch_block(block.hash).await {
            Ok(_) => return Err(ConsumerError::BlockAlreadyProcessed),
            Err(StorageError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        let ingestion = self.classify(block, is_latest).await?;
        trace!(
            target: "block_consumer",
            height = block.number,
            hash = %block.hash,
            ?ingestion,
            "block classified"
        );

        // Do not store the block if classification failed.
        self.storage.store_block(block).await?;
        if is_latest {
            self.storage.update_l1_head(block.hash).await?;
        }

        Ok(ingestion)
    }

    async fn classify(
        &self,
        block: &L1BlockRef,
        is_latest: bool,
    ) -> Result<BlockIngestionType, ConsumerError> {
        let head = match self.storage.fetch_head_block().await {
            Ok(head) => head,
            // No head yet: everything before the first latest block is
            // pre-genesis history.
            Err(StorageError::NotFound) => {
                return Ok(BlockIngestionType { is_latest, fork: false, pre_genesis: true })
            }
            Err(e) => return Err(e.into()),
        };

        if block.parent_hash == head.hash {
            // The happy path: the block extends the previously ingested head.
            return Ok(BlockIngestionType { is_latest, fork: false, pre_genesis: false });
        }

        let ancestor = self.lca(block, &head).await?;
        if ancestor.number < head.number {
            debug!(
                target: "block_consumer",
                height = block.number,
                hash = %block.hash,
                head = %head.hash,
                ancestor = %ancestor.hash,
                "L1 fork detected"
            );
            self.cross_chain.on_fork(&ancestor);
            return Ok(BlockIngestionType { is_latest, fork: true, pre_genesis: false });
        }

        Ok(BlockIngestionType { is_latest, fork: false, pre_genesis: false })
    }

    /// Finds the least common ancestor of `a` and `b` by walking parent
    /// pointers of the deeper chain first, then both in lockstep. The walk
    /// only sees stored blocks; running off the stored chain means no
    /// ancestor exists.
    async fn lca(&self, a: &L1BlockRef, b: &L1BlockRef) -> Result<L1BlockRef, ConsumerError> {
        let (mut a, mut b) = (*a, *b);
        while a.number > b.number {
            a = self.parent_of(&a).await?;
        }
        while b.number > a.number {
            b = self.parent_of(&b).await?;
        }
        while a.hash != b.hash {
            if a.number == 0 {
                return Err(ConsumerError::BlockAncestorNotFound);
            }
            a = self.parent_of(&a).await?;
            b = self.parent_of(&b).await?;
        }
        Ok(a)
    }

    async fn parent_of(&self, block: &L1BlockRef) -> Result<L1BlockRef, ConsumerError> {
        self.storage.fetch_block(block.parent_hash).await.map_err(|e| match e {
            StorageError::NotFound => ConsumerError::BlockAncestorNotFound,
            other => other.into(),
        })
    }

    /// The current L1 head block.
    pub async fn head(&self) -> Result<L1BlockRef, ConsumerError> {
        Ok(self.storage.fetch_head_block().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{chain, InMemoryStorage};
    use alloy_primitives::{Address, B256};

    fn consumer(storage: Arc<InMemoryStorage>) -> BlockConsumer {
        let cross_chain =
            Arc::new(CrossChainProcessors::new(storage.clone(), Address::repeat_byte(0xBB)));
        BlockConsumer::new(storage, cross_chain)
    }

    fn with_receipts(block: L1BlockRef) -> BlockAndReceipts {
        BlockAndReceipts::new(block, vec![])
    }

    #[tokio::test]
    async fn test_first_block_is_pre_genesis() {
        let storage = Arc::new(InMemoryStorage::default());
        let consumer = consumer(storage.clone());
        let b0 = chain(B256::ZERO, 0, 1)[0];

        let ingestion = consumer.consume_block(&with_receipts(b0), true).await.unwrap();
        assert!(ingestion.pre_genesis);
        assert!(!ingestion.fork);
        assert_eq!(consumer.head().await.unwrap().hash, b0.hash);
    }

    #[tokio::test]
    async fn test_consume_is_idempotent() {
        let storage = Arc::new(InMemoryStorage::default());
        let consumer = consumer(storage.clone());
        let b0 = chain(B256::ZERO, 0, 1)[0];

        consumer.consume_block(&with_receipts(b0), true).await.unwrap();
        let err = consumer.consume_block(&with_receipts(b0), true).await.unwrap_err();
        assert_eq!(err, ConsumerError::BlockAlreadyProcessed);
        assert_eq!(consumer.head().await.unwrap().hash, b0.hash);
    }

    #[tokio::test]
    async fn test_happy_path_extends_head() {
        let storage = Arc::new(InMemoryStorage::default());
        let consumer = consumer(storage.clone());
        for block in chain(B256::ZERO, 0, 3) {
            let ingestion = consumer.consume_block(&with_receipts(block), true).await.unwrap();
            assert!(!ingestion.fork);
        }
    }

    #[tokio::test]
    async fn test_fork_detected_via_lca() {
        let storage = Arc::new(InMemoryStorage::default());
        let consumer = consumer(storage.clone());

        // B0 <- B1 <- B2, then a competing B1' <- B2' <- B3' off B0.
        let main = chain(B256::ZERO, 0, 3);
        for block in &main {
            consumer.consume_block(&with_receipts(*block), true).await.unwrap();
        }
        let side = chain(main[0].hash, 1, 3);

        let ingestion = consumer.consume_block(&with_receipts(side[0]), false).await.unwrap();
        assert!(ingestion.fork, "B1' forks off below the head");
        for block in &side[1..] {
            consumer.consume_block(&with_receipts(*block), true).await.unwrap();
        }
        assert_eq!(consumer.head().await.unwrap().hash, side[2].hash);
    }

    #[tokio::test]
    async fn test_unknown_ancestry_fails() {
        let storage = Arc::new(InMemoryStorage::default());
        let consumer = consumer(storage.clone());
        for block in chain(B256::ZERO, 0, 2) {
            consumer.consume_block(&with_receipts(block), true).await.unwrap();
        }

        // A block whose ancestry never joins the stored chain.
        let orphan = chain(B256::repeat_byte(0xEE), 5, 1)[0];
        let err = consumer.consume_block(&with_receipts(orphan), true).await.unwrap_err();
        assert_eq!(err, ConsumerError::BlockAncestorNotFound);
        // Classification failed, so the orphan was not stored.
        assert_eq!(storage.fetch_block(orphan.hash).await, Err(StorageError::NotFound));
    }

    #[tokio::test]
    async fn test_latest_flag_controls_head() {
        let storage = Arc::new(InMemoryStorage::default());
        let consumer = consumer(storage.clone());
        let blocks = chain(B256::ZERO, 0, 2);
        consumer.consume_block(&with_receipts(blocks[0]), true).await.unwrap();
        consumer.consume_block(&with_receipts(blocks[1]), false).await.unwrap();
        // Stored, but the head stays where the host last pointed it.
        assert!(storage.fetch_block(blocks[1].hash).await.is_ok());
        assert_eq!(consumer.head().await.unwrap().hash, blocks[0].hash);
    }
}
