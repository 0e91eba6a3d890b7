//! The sequencer role: the singleton producer of batches and rollups.

use crate::{
    components::{
        list_hash, outbound_leaves, outbound_messages, BatchExecutor, BatchRegistry,
        BlockConsumer, BlockIngestionType, CrossChainProcessors,
    },
    config::EnclaveConfig,
    crypto::EnclaveKey,
    errors::{CompressionError, EnclaveError, StorageError},
    gas::GasOracle,
    traits::{BatchEnv, Evm, Mempool, Storage},
};
use alloy_primitives::keccak256;
use cloak_primitives::{
    cross_chain_root, encode_delta, Batch, BatchHeader, BlockAndReceipts, CalldataRollupHeader,
    Rollup, RollupHeader,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Compresses (and encrypts) the batch bundle of a rollup into the opaque
/// payload published to L1. The concrete codec lives outside the core.
pub trait Compressor: Send + Sync + core::fmt::Debug {
    /// Produces the payload blob for the manifest and its batches.
    fn compress(
        &self,
        manifest: &CalldataRollupHeader,
        batches: &[Batch],
    ) -> Result<Vec<u8>, CompressionError>;
}

/// A sequencer enclave: drains the mempool into signed batches and
/// periodically folds the produced batches into signed rollups.
#[derive(Debug)]
pub struct Sequencer {
    consumer: BlockConsumer,
    executor: BatchExecutor,
    registry: BatchRegistry,
    cross_chain: Arc<CrossChainProcessors>,
    storage: Arc<dyn Storage>,
    mempool: Arc<dyn Mempool>,
    compressor: Arc<dyn Compressor>,
    enclave_key: Arc<EnclaveKey>,
    config: EnclaveConfig,
    last_rollup_seq: Option<u64>,
}

impl Sequencer {
    /// Wires up a sequencer over the collaborator seams.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<dyn Storage>,
        evm: Arc<dyn Evm>,
        gas_oracle: Arc<dyn GasOracle>,
        mempool: Arc<dyn Mempool>,
        compressor: Arc<dyn Compressor>,
        enclave_key: Arc<EnclaveKey>,
        config: EnclaveConfig,
    ) -> Self {
        let cross_chain =
            Arc::new(CrossChainProcessors::new(storage.clone(), config.message_bus_address));
        let consumer = BlockConsumer::new(storage.clone(), cross_chain.clone());
        let executor = BatchExecutor::new(evm, gas_oracle, storage.clone(), config.clone());
        Self {
            consumer,
            executor,
            registry: BatchRegistry::new(),
            cross_chain,
            storage,
            mempool,
            compressor,
            enclave_key,
            config,
            last_rollup_seq: None,
        }
    }

    /// Ingests an L1 block; the sequencer tracks the host chain the same way
    /// validators do.
    pub async fn on_l1_block(
        &mut self,
        br: &BlockAndReceipts,
        is_latest: bool,
    ) -> Result<BlockIngestionType, EnclaveError> {
        Ok(self.consumer.consume_block(br, is_latest).await?)
    }

    /// Produces, signs, executes and stores the next batch. The first call
    /// after L1 genesis produces the L2 genesis batch.
    pub async fn create_batch(&mut self) -> Result<Batch, EnclaveError> {
        let l1_head = self.storage.fetch_head_block().await?;

        let parent = match self.storage.fetch_head_batch().await {
            Ok(parent) => parent,
            Err(StorageError::NotFound) => return self.create_genesis_batch(&l1_head).await,
            Err(e) => return Err(e.into()),
        };

        let transactions = self
            .mempool
            .pending(self.config.batch_gas_limit, self.config.max_batch_transactions)
            .await;
        let env = BatchEnv {
            parent_state_root: parent.header.state_root,
            number: parent.header.number + 1,
            timestamp: parent.header.timestamp.max(l1_head.timestamp) + 1,
            coinbase: self.config.coinbase,
            base_fee: self.config.base_fee,
            gas_limit: self.config.batch_gas_limit,
        };
        let computed = self.executor.compute(&env, &transactions, &l1_head).await?;

        let leaves = outbound_leaves(&computed.executions);
        let (inbound_hash, inbound_height) = self.cross_chain.watermark();
        let mut header = BatchHeader {
            parent_hash: parent.hash(),
            state_root: computed.state_root,
            transactions_root: list_hash(&transactions),
            receipts_root: list_hash(&computed.receipts),
            number: env.number,
            seq_no: parent.seq_no() + 1,
            gas_limit: env.gas_limit,
            gas_used: computed.gas_used,
            timestamp: env.timestamp,
            base_fee: env.base_fee,
            coinbase: env.coinbase,
            l1_proof: l1_head.hash,
            cross_chain_messages: outbound_messages(&computed.executions),
            inbound_cross_chain_hash: inbound_hash,
            inbound_cross_chain_height: inbound_height,
            cross_chain_root: cross_chain_root(&leaves),
            cross_chain_tree: leaves,
            ..Default::default()
        };
        header.signature = self.enclave_key.sign(header.hash())?;
        let batch = Batch { header, transactions };

        self.storage.store_executed_batch(&batch, &computed.receipts).await?;
        self.mempool.ingest_batch(&batch).await?;
        self.registry.on_batch_executed(&batch);
        debug!(target: "sequencer", seq_no = batch.seq_no(), hash = %batch.hash(), "batch produced");
        Ok(batch)
    }

    async fn create_genesis_batch(&mut self, l1_head: &cloak_primitives::L1BlockRef) -> Result<Batch, EnclaveError> {
        let mut genesis = self
            .executor
            .create_genesis(
                l1_head.hash,
                l1_head.timestamp,
                self.config.coinbase,
                self.config.base_fee,
            )
            .await?;
        genesis.header.signature = self.enclave_key.sign(genesis.hash())?;
        self.storage.store_executed_batch(&genesis, &[]).await?;
        self.registry.on_batch_executed(&genesis);
        info!(target: "sequencer", hash = %genesis.hash(), "genesis batch produced");
        Ok(genesis)
    }

    /// Assembles a rollup covering every batch produced since the previous
    /// rollup, signs it, and marks the range as rolled up.
    pub async fn create_rollup(&mut self) -> Result<Rollup, EnclaveError> {
        let l1_head = self.storage.fetch_head_block().await?;
        let head = self.storage.fetch_head_batch().await?;

        let from_seq = self.last_rollup_seq.map_or(0, |seq| seq + 1);
        let to_seq = head.seq_no();
        if from_seq > to_seq {
            return Err(EnclaveError::Storage(StorageError::NotFound));
        }

        let mut batches = Vec::with_capacity((to_seq - from_seq + 1) as usize);
        for seq_no in from_seq..=to_seq {
            batches.push(self.storage.fetch_batch_by_seq_no(seq_no).await?);
        }

        let manifest = self.build_manifest(&batches).await?;
        let payload = self.compressor.compress(&manifest, &batches)?;

        let mut header = RollupHeader {
            compression_l1_head: l1_head.hash,
            cross_chain_messages: batches
                .iter()
                .flat_map(|b| b.header.cross_chain_messages.iter().cloned())
                .collect(),
            payload_hash: keccak256(&payload),
            last_batch_seq_no: to_seq,
            ..Default::default()
        };
        header.signature = self.enclave_key.sign(header.hash())?;

        self.last_rollup_seq = Some(to_seq);
        debug!(
            target: "sequencer",
            from_seq,
            to_seq,
            payload_bytes = payload.len(),
            "rollup produced"
        );
        Ok(Rollup { header, payload: payload.into() })
    }

    /// Builds the reconstruction manifest: shared fields once, per-batch
    /// deltas for the rest.
    async fn build_manifest(&self, batches: &[Batch]) -> Result<CalldataRollupHeader, EnclaveError> {
        let first = &batches[0].header;

        let mut batch_time_deltas = Vec::with_capacity(batches.len().saturating_sub(1));
        let mut l1_height_deltas = Vec::with_capacity(batches.len());
        let mut previous_time = first.timestamp;
        let mut previous_l1_height = 0i64;
        for (i, batch) in batches.iter().enumerate() {
            let l1_block = self.storage.fetch_block(batch.header.l1_proof).await?;
            let height = l1_block.number as i64;
            l1_height_deltas.push(encode_delta(height - previous_l1_height));
            previous_l1_height = height;

            if i > 0 {
                batch_time_deltas.push(encode_delta(
                    batch.header.timestamp as i64 - previous_time as i64,
                ));
                previous_time = batch.header.timestamp;
            }
        }

        Ok(CalldataRollupHeader {
            first_batch_seq_no: first.seq_no,
            first_canon_batch_height: first.number,
            first_canon_parent_hash: first.parent_hash,
            coinbase: first.coinbase,
            base_fee: first.base_fee,
            gas_limit: first.gas_limit,
            start_time: first.timestamp,
            batch_time_deltas,
            l1_height_deltas,
            // Only canonical batches are rolled up here; re-orged history
            // slots stay empty.
            reorgs: vec![Default::default(); batches.len()],
        })
    }

    /// Drives the production loops until the stop signal flips: one batch
    /// per interval, one rollup per configured number of batches. Produced
    /// artifacts go to the host for broadcast and L1 submission.
    pub async fn run(
        mut self,
        mut stop_receiver: watch::Receiver<bool>,
        batch_out: mpsc::Sender<Batch>,
        rollup_out: mpsc::Sender<Rollup>,
    ) -> Result<(), EnclaveError> {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_millis(self.config.batch_interval_ms));
        loop {
            tokio::select! {
                changed = stop_receiver.changed() => {
                    if changed.is_err() || *stop_receiver.borrow() {
                        info!(target: "sequencer", "stop signal received");
                        return Ok(());
                    }
                }
                _ = ticker.tick() => {
                    match self.create_batch().await {
                        Ok(batch) => {
                            let seq_no = batch.seq_no();
                            if batch_out.send(batch).await.is_err() {
                                return Ok(());
                            }
                            let rolled_up = self.last_rollup_seq.map_or(seq_no + 1, |s| seq_no - s);
                            if rolled_up >= self.config.rollup_interval_batches {
                                match self.create_rollup().await {
                                    Ok(rollup) => {
                                        if rollup_out.send(rollup).await.is_err() {
                                            return Ok(());
                                        }
                                    }
                                    Err(e) => error!(target: "sequencer", err = %e, "rollup production failed"),
                                }
                            }
                        }
                        // Batch production retries on the next tick; the L1
                        // head may simply not exist yet.
                        Err(e) => debug!(target: "sequencer", err = %e, "batch production skipped"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::recover_signer,
        gas::StandardGasOracle,
        test_utils::{chain, InMemoryStorage, MockEvm, RecordingMempool, RlpCompressor},
    };
    use alloy_primitives::{Bytes, B256};
    use cloak_primitives::{decode_delta, RawTransaction};

    struct Harness {
        sequencer: Sequencer,
        storage: Arc<InMemoryStorage>,
        mempool: Arc<RecordingMempool>,
        key_address: alloy_primitives::Address,
    }

    fn harness() -> Harness {
        let storage = Arc::new(InMemoryStorage::default());
        let mempool = Arc::new(RecordingMempool::default());
        let key = Arc::new(EnclaveKey::generate());
        let key_address = key.address();
        let config = EnclaveConfig { sequencer_address: key_address, ..Default::default() };
        let sequencer = Sequencer::new(
            storage.clone(),
            Arc::new(MockEvm::default()),
            Arc::new(StandardGasOracle),
            mempool.clone(),
            Arc::new(RlpCompressor),
            key,
            config,
        );
        Harness { sequencer, storage, mempool, key_address }
    }

    async fn seed_l1(h: &mut Harness) -> cloak_primitives::L1BlockRef {
        let b0 = chain(B256::ZERO, 0, 1)[0];
        h.sequencer.on_l1_block(&BlockAndReceipts::new(b0, vec![]), true).await.unwrap();
        b0
    }

    #[tokio::test]
    async fn test_first_batch_is_signed_genesis() {
        let mut h = harness();
        seed_l1(&mut h).await;
        let genesis = h.sequencer.create_batch().await.unwrap();
        assert!(genesis.is_genesis());
        let signer = recover_signer(genesis.hash(), &genesis.header.signature).unwrap();
        assert_eq!(signer, h.key_address);
        assert!(h.storage.batch_was_executed(genesis.hash()).await.unwrap());
    }

    #[tokio::test]
    async fn test_batches_are_dense_and_drain_mempool() {
        let mut h = harness();
        let b0 = seed_l1(&mut h).await;
        h.sequencer.create_batch().await.unwrap();

        h.mempool.push_pending(RawTransaction(Bytes::from(vec![0x01])));
        let batch = h.sequencer.create_batch().await.unwrap();
        assert_eq!(batch.seq_no(), 1);
        assert_eq!(batch.header.l1_proof, b0.hash);
        assert_eq!(batch.transactions.len(), 1);
        assert!(batch.header.gas_used > 0);

        let next = h.sequencer.create_batch().await.unwrap();
        assert_eq!(next.seq_no(), 2);
        assert_eq!(next.header.parent_hash, batch.hash());
        // The mempool saw every produced non-genesis batch.
        assert_eq!(h.mempool.ingested(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_rollup_covers_produced_range() {
        let mut h = harness();
        seed_l1(&mut h).await;
        for _ in 0..3 {
            h.sequencer.create_batch().await.unwrap();
        }

        let rollup = h.sequencer.create_rollup().await.unwrap();
        assert_eq!(rollup.header.last_batch_seq_no, 2);
        assert_eq!(rollup.header.payload_hash, keccak256(&rollup.payload));
        let signer = recover_signer(rollup.header.hash(), &rollup.header.signature).unwrap();
        assert_eq!(signer, h.key_address);

        // The next rollup starts after the previous one.
        h.sequencer.create_batch().await.unwrap();
        let next = h.sequencer.create_rollup().await.unwrap();
        assert_eq!(next.header.last_batch_seq_no, 3);

        // Nothing new to roll up.
        let err = h.sequencer.create_rollup().await.unwrap_err();
        assert_eq!(err, EnclaveError::Storage(StorageError::NotFound));
    }

    #[tokio::test]
    async fn test_manifest_deltas_reconstruct_timestamps() {
        let mut h = harness();
        seed_l1(&mut h).await;
        let mut produced = Vec::new();
        for _ in 0..3 {
            produced.push(h.sequencer.create_batch().await.unwrap());
        }

        let manifest = h.sequencer.build_manifest(&produced).await.unwrap();
        assert_eq!(manifest.first_batch_seq_no, 0);
        assert_eq!(manifest.start_time, produced[0].header.timestamp);

        let mut time = manifest.start_time as i64;
        for (delta, batch) in manifest.batch_time_deltas.iter().zip(&produced[1..]) {
            time += decode_delta(delta).unwrap();
            assert_eq!(time as u64, batch.header.timestamp);
        }
    }
}
