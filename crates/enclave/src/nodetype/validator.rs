//! The validator role: re-executes sequencer-produced batches and verifies
//! their signatures.

use crate::{
    components::{
        BatchExecutor, BatchRegistry, BlockConsumer, BlockIngestionType, CrossChainProcessors,
        SignatureValidator,
    },
    config::EnclaveConfig,
    crypto::EnclaveKey,
    errors::{EnclaveError, StorageError},
    gas::GasOracle,
    traits::{Evm, Mempool, Storage},
};
use alloy_primitives::Bytes;
use cloak_primitives::{
    params::L2_GENESIS_SEQ_NO, Batch, BlockAndReceipts, CrossChainBundle, RawTransaction,
};
use std::sync::Arc;
use tracing::{trace, warn};

/// A validator enclave.
///
/// All state transitions run inside one logical critical section: the host
/// serializes calls into the validator, and the validator never suspends
/// between storing an executed batch and registering it.
#[derive(Debug)]
pub struct Validator {
    consumer: BlockConsumer,
    executor: BatchExecutor,
    registry: BatchRegistry,
    storage: Arc<dyn Storage>,
    sig_validator: SignatureValidator,
    mempool: Arc<dyn Mempool>,
    enclave_key: Arc<EnclaveKey>,
}

impl Validator {
    /// Wires up a validator over the collaborator seams.
    pub fn new(
        storage: Arc<dyn Storage>,
        evm: Arc<dyn Evm>,
        gas_oracle: Arc<dyn GasOracle>,
        mempool: Arc<dyn Mempool>,
        enclave_key: Arc<EnclaveKey>,
        config: EnclaveConfig,
    ) -> Self {
        let cross_chain =
            Arc::new(CrossChainProcessors::new(storage.clone(), config.message_bus_address));
        let consumer = BlockConsumer::new(storage.clone(), cross_chain);
        let sig_validator = SignatureValidator::new(config.sequencer_address);
        let executor = BatchExecutor::new(evm, gas_oracle, storage.clone(), config);
        Self {
            consumer,
            executor,
            registry: BatchRegistry::new(),
            storage,
            sig_validator,
            mempool,
            enclave_key,
        }
    }

    /// Restores the registry head from storage after a restart.
    pub async fn bootstrap(&mut self) -> Result<(), EnclaveError> {
        match self.storage.fetch_head_batch().await {
            Ok(head) => {
                self.registry.restore(&head);
                Ok(())
            }
            Err(StorageError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// The highest executed sequence number, [None] before genesis.
    pub const fn head_batch_seq(&self) -> Option<u64> {
        self.registry.head_batch_seq()
    }

    /// Ingests an L1 block and drives execution of whatever became
    /// executable.
    pub async fn on_l1_block(
        &mut self,
        br: &BlockAndReceipts,
        is_latest: bool,
    ) -> Result<BlockIngestionType, EnclaveError> {
        let ingestion = self.consumer.consume_block(br, is_latest).await?;
        self.execute_stored_batches().await?;
        Ok(ingestion)
    }

    /// Accepts a sequencer-produced batch from the network. The signature is
    /// checked before anything is stored.
    pub async fn receive_batch(&mut self, batch: &Batch) -> Result<(), EnclaveError> {
        self.sig_validator.check_sequencer_signature(batch.hash(), &batch.header.signature)?;
        self.storage.store_batch(batch).await?;
        self.execute_stored_batches().await
    }

    /// Admits a user transaction into the mempool. Requires a running chain:
    /// admission against a near-empty chain would validate against garbage
    /// state.
    pub async fn submit_transaction(&self, tx: &RawTransaction) -> Result<(), EnclaveError> {
        let initialised =
            self.registry.head_batch_seq().is_some_and(|seq| seq > L2_GENESIS_SEQ_NO + 1);
        if !initialised {
            return Err(EnclaveError::NotInitialised);
        }
        Ok(self.mempool.validate(tx).await?)
    }

    /// Executes every stored canonical batch whose prerequisites hold, in
    /// ascending sequence order. Stops (does not skip) at the first batch
    /// that is not yet executable; the next trigger retries from the same
    /// point.
    pub async fn execute_stored_batches(&mut self) -> Result<(), EnclaveError> {
        trace!(target: "validator", "executing stored batches");
        let head_seq = self.registry.head_batch_seq().unwrap_or(L2_GENESIS_SEQ_NO);
        let batches = match self.storage.fetch_canonical_unexecuted_batches(head_seq).await {
            Ok(batches) => batches,
            Err(StorageError::NotFound) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        self.start_mempool_if_ready()?;

        for batch in batches {
            if batch.is_genesis() {
                self.handle_genesis(&batch).await?;
                continue;
            }

            // A competing batch became canonical at an already executed
            // sequence number: rewind to the fork point and re-execute the
            // new canonical suffix from there.
            if let Some(executed) = self.registry.executed_at_seq(batch.seq_no()) {
                if executed != batch.hash() {
                    let fork_point = batch.seq_no() - 1;
                    warn!(
                        target: "validator",
                        seq_no = batch.seq_no(),
                        fork_point,
                        "L2 reorg observed, rewinding"
                    );
                    self.registry.rewind_to(fork_point);
                    self.mempool.rewind_to(fork_point).await?;
                    // A registry seeded from a bare head (restart) may not
                    // hold the fork point itself; reseed it from storage so
                    // the replayed suffix chains onto it.
                    if self.registry.head_batch_seq().is_none() {
                        if let Ok(parent) =
                            self.storage.fetch_batch(batch.header.parent_hash).await
                        {
                            if self.storage.batch_was_executed(parent.hash()).await? {
                                self.registry.restore(&parent);
                            }
                        }
                    }
                }
            }

            if !self.execution_prerequisites(&batch).await? {
                trace!(target: "validator", seq_no = batch.seq_no(), "prerequisites not met, stopping");
                break;
            }

            let receipts = self.executor.execute_batch(&batch).await?;
            // One critical section: the atomic store, the virtual-chain feed
            // and the registry update must not interleave with readers.
            self.storage.store_executed_batch(&batch, &receipts).await?;
            self.mempool.ingest_batch(&batch).await?;
            self.registry.on_batch_executed(&batch);
        }
        Ok(())
    }

    /// A batch is executable iff its `l1_proof` block is stored and its
    /// parent batch has been executed.
    async fn execution_prerequisites(&self, batch: &Batch) -> Result<bool, EnclaveError> {
        match self.storage.fetch_block(batch.header.l1_proof).await {
            Ok(_) => {}
            Err(StorageError::NotFound) => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        let parent_executed = self.storage.batch_was_executed(batch.header.parent_hash).await?;
        trace!(target: "validator", seq_no = batch.seq_no(), parent_executed, "prerequisites checked");
        Ok(parent_executed)
    }

    /// Recomputes the expected genesis from the batch's defining fields and
    /// rejects the batch on any mismatch.
    async fn handle_genesis(&mut self, batch: &Batch) -> Result<(), EnclaveError> {
        let genesis = self
            .executor
            .create_genesis(
                batch.header.l1_proof,
                batch.header.timestamp,
                batch.header.coinbase,
                batch.header.base_fee,
            )
            .await?;
        if genesis.hash() != batch.hash() {
            return Err(EnclaveError::InvalidGenesisBatch);
        }
        self.storage.store_executed_batch(batch, &[]).await?;
        self.registry.on_batch_executed(batch);
        Ok(())
    }

    fn start_mempool_if_ready(&self) -> Result<(), EnclaveError> {
        // Admission needs a couple of executed batches to validate against.
        let ready = self.registry.head_batch_seq().is_some_and(|seq| seq > L2_GENESIS_SEQ_NO + 1);
        if ready && !self.mempool.running() {
            self.mempool.start()?;
        }
        Ok(())
    }

    /// Exports the cross-chain commitments of the canonical batches in
    /// `[from_seq_no, to_seq_no]` as an enclave-signed bundle.
    pub async fn export_cross_chain_data(
        &self,
        from_seq_no: u64,
        to_seq_no: u64,
    ) -> Result<CrossChainBundle, EnclaveError> {
        let l1_head = self.storage.fetch_head_block().await?;
        let mut roots = Vec::with_capacity((to_seq_no.saturating_sub(from_seq_no) + 1) as usize);
        for seq_no in from_seq_no..=to_seq_no {
            let batch = self.storage.fetch_batch_by_seq_no(seq_no).await?;
            roots.push(batch.header.cross_chain_root);
        }
        let mut bundle = CrossChainBundle {
            l1_block_hash: l1_head.hash,
            l1_block_num: l1_head.number,
            from_seq_no,
            to_seq_no,
            cross_chain_roots: roots,
            signature: Bytes::new(),
        };
        bundle.signature = self.enclave_key.sign(bundle.hash_packed())?;
        Ok(bundle)
    }
}
