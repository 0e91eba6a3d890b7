//! Deterministic batch execution against the engine seam.

use crate::{
    components::cross_chain::outbound_leaves,
    config::EnclaveConfig,
    errors::{ExecutorError, StorageError},
    gas::{publishing_gas, GasOracle},
    traits::{BatchEnv, Evm, Storage, TxExecution},
};
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_rlp::Encodable;
use cloak_primitives::{
    cross_chain_root,
    params::{L2_GENESIS_HEIGHT, L2_GENESIS_SEQ_NO},
    Batch, BatchHeader, BatchReceipt, L1BlockRef, RawTransaction,
};
use std::sync::Arc;
use tracing::{debug, trace};

/// The outcome of computing a batch: everything the sequencer needs to build
/// a header and everything a validator needs to check one.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ComputedBatch {
    /// The resulting state root.
    pub state_root: B256,
    /// Receipts in batch order, publication charge included.
    pub receipts: Vec<BatchReceipt>,
    /// The raw per-transaction outcomes, for cross-chain leaf extraction.
    pub executions: Vec<TxExecution>,
    /// Total gas used by the batch, publication charges included.
    pub gas_used: u64,
}

/// Executes batches deterministically: same parent state, environment and
/// transactions produce bit-identical receipts and state roots on any
/// enclave.
#[derive(Debug)]
pub struct BatchExecutor {
    evm: Arc<dyn Evm>,
    gas_oracle: Arc<dyn GasOracle>,
    storage: Arc<dyn Storage>,
    config: EnclaveConfig,
}

impl BatchExecutor {
    /// Creates an executor over the given engine, oracle and storage.
    pub fn new(
        evm: Arc<dyn Evm>,
        gas_oracle: Arc<dyn GasOracle>,
        storage: Arc<dyn Storage>,
        config: EnclaveConfig,
    ) -> Self {
        Self { evm, gas_oracle, storage, config }
    }

    /// Runs the transactions in the given environment and prices each one's
    /// L1 publication against `l1_head`. This is the shared body of batch
    /// production (sequencer) and batch replay (validator).
    pub async fn compute(
        &self,
        env: &BatchEnv,
        txs: &[RawTransaction],
        l1_head: &L1BlockRef,
    ) -> Result<ComputedBatch, ExecutorError> {
        if env.base_fee < self.config.min_base_fee {
            return Err(ExecutorError::BaseFeeBelowFloor);
        }

        let result = self.evm.execute_batch(env, txs).await?;

        let mut receipts = Vec::with_capacity(result.executions.len());
        let mut cumulative_gas_used = 0u64;
        for (tx, execution) in txs.iter().zip(&result.executions) {
            // Each user transaction additionally pays for its eventual L1
            // publication, converted into L2 gas at the batch base fee.
            let l1_cost = self.gas_oracle.l1_cost_for_tx(tx, l1_head);
            let gas_used = execution.gas_used + publishing_gas(l1_cost, env.base_fee);
            cumulative_gas_used += gas_used;
            receipts.push(BatchReceipt {
                tx_hash: execution.tx_hash,
                success: execution.success,
                gas_used,
                cumulative_gas_used,
                logs: execution.logs.clone(),
            });
        }
        trace!(
            target: "batch_executor",
            number = env.number,
            txs = txs.len(),
            gas_used = cumulative_gas_used,
            "batch computed"
        );

        Ok(ComputedBatch {
            state_root: result.state_root,
            receipts,
            executions: result.executions,
            gas_used: cumulative_gas_used,
        })
    }

    /// Replays a stored batch against its parent state and verifies that the
    /// header's commitments hold. Storage rejects re-execution, which keeps
    /// the validator loop idempotent.
    pub async fn execute_batch(&self, batch: &Batch) -> Result<Vec<BatchReceipt>, ExecutorError> {
        let hash = batch.hash();
        if self.storage.batch_was_executed(hash).await? {
            return Err(ExecutorError::AlreadyExecuted(hash));
        }

        let parent = self.storage.fetch_batch(batch.header.parent_hash).await.map_err(
            |e| match e {
                StorageError::NotFound => ExecutorError::ParentNotFound(batch.header.parent_hash),
                other => other.into(),
            },
        )?;
        // The L1 block the sequencer declared is what keeps publication
        // pricing deterministic across re-executing enclaves.
        let l1_head = self.storage.fetch_block(batch.header.l1_proof).await?;

        let env = BatchEnv {
            parent_state_root: parent.header.state_root,
            number: batch.header.number,
            timestamp: batch.header.timestamp,
            coinbase: batch.header.coinbase,
            base_fee: batch.header.base_fee,
            gas_limit: batch.header.gas_limit,
        };
        let computed = self.compute(&env, &batch.transactions, &l1_head).await?;

        if computed.state_root != batch.header.state_root {
            return Err(ExecutorError::StateRootMismatch {
                batch: hash,
                expected: batch.header.state_root,
                got: computed.state_root,
            });
        }
        let leaves = outbound_leaves(&computed.executions);
        if cross_chain_root(&leaves) != batch.header.cross_chain_root {
            return Err(ExecutorError::CrossChainRootMismatch(hash));
        }

        debug!(target: "batch_executor", seq_no = batch.seq_no(), hash = %hash, "batch executed");
        Ok(computed.receipts)
    }

    /// Recomputes the genesis batch from its defining inputs. Genesis has no
    /// transactions and therefore no receipts; everything is derived from
    /// the empty engine state.
    pub async fn create_genesis(
        &self,
        l1_proof: B256,
        timestamp: u64,
        coinbase: Address,
        base_fee: U256,
    ) -> Result<Batch, ExecutorError> {
        let state_root = self.evm.genesis_state_root().await?;
        let header = BatchHeader {
            parent_hash: B256::ZERO,
            state_root,
            transactions_root: list_hash::<RawTransaction>(&[]),
            receipts_root: list_hash::<BatchReceipt>(&[]),
            number: L2_GENESIS_HEIGHT,
            seq_no: L2_GENESIS_SEQ_NO,
            gas_limit: self.config.batch_gas_limit,
            timestamp,
            base_fee,
            coinbase,
            l1_proof,
            ..Default::default()
        };
        Ok(Batch { header, transactions: Vec::new() })
    }
}

/// The deterministic commitment to an ordered list: keccak256 of its RLP
/// encoding.
pub(crate) fn list_hash<T: Encodable>(items: &[T]) -> B256 {
    let mut out = Vec::new();
    alloy_rlp::encode_list(items, &mut out);
    keccak256(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gas::StandardGasOracle,
        test_utils::{InMemoryStorage, MockEvm},
    };
    use alloy_primitives::Bytes;

    fn executor(storage: Arc<InMemoryStorage>, evm: MockEvm) -> BatchExecutor {
        BatchExecutor::new(
            Arc::new(evm),
            Arc::new(StandardGasOracle),
            storage,
            EnclaveConfig::default(),
        )
    }

    fn env(parent_state_root: B256) -> BatchEnv {
        BatchEnv {
            parent_state_root,
            number: 1,
            timestamp: 10,
            base_fee: EnclaveConfig::default().base_fee,
            gas_limit: 30_000_000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_compute_charges_publication_gas() {
        let storage = Arc::new(InMemoryStorage::default());
        let executor = executor(storage, MockEvm::default());
        let txs = vec![RawTransaction(Bytes::from(vec![0x01; 8]))];
        let l1_head = L1BlockRef { base_fee: U256::from(1u64), ..Default::default() };

        let computed = executor.compute(&env(B256::ZERO), &txs, &l1_head).await.unwrap();
        assert_eq!(computed.receipts.len(), 1);
        // Execution gas plus the converted L1 cost plus the remainder unit.
        assert!(computed.receipts[0].gas_used > MockEvm::TX_GAS_USED);
        assert_eq!(computed.gas_used, computed.receipts[0].cumulative_gas_used);
    }

    #[tokio::test]
    async fn test_compute_rejects_base_fee_below_floor() {
        let storage = Arc::new(InMemoryStorage::default());
        let executor = executor(storage, MockEvm::default());
        let mut low = env(B256::ZERO);
        low.base_fee = U256::from(1u64);
        let err = executor.compute(&low, &[], &L1BlockRef::default()).await.unwrap_err();
        assert_eq!(err, ExecutorError::BaseFeeBelowFloor);
    }

    #[tokio::test]
    async fn test_execute_batch_is_deterministic_and_checked() {
        let storage = Arc::new(InMemoryStorage::default());
        let executor = executor(storage.clone(), MockEvm::default());

        // Stored genesis parent and the L1 proof block.
        let genesis = executor
            .create_genesis(B256::repeat_byte(1), 5, Address::ZERO, EnclaveConfig::default().base_fee)
            .await
            .unwrap();
        storage.store_executed_batch(&genesis, &[]).await.unwrap();
        let l1_proof = L1BlockRef { hash: B256::repeat_byte(1), ..Default::default() };
        storage.store_block(&l1_proof).await.unwrap();

        // A well-formed child batch whose header commits to the recomputed
        // state.
        let txs = vec![RawTransaction(Bytes::from(vec![0xAA]))];
        let env = BatchEnv {
            parent_state_root: genesis.header.state_root,
            number: 1,
            timestamp: 6,
            base_fee: EnclaveConfig::default().base_fee,
            gas_limit: 30_000_000,
            ..Default::default()
        };
        let computed = executor.compute(&env, &txs, &l1_proof).await.unwrap();
        let batch = Batch {
            header: BatchHeader {
                parent_hash: genesis.hash(),
                state_root: computed.state_root,
                number: 1,
                seq_no: 1,
                timestamp: 6,
                base_fee: env.base_fee,
                gas_limit: env.gas_limit,
                l1_proof: l1_proof.hash,
                ..Default::default()
            },
            transactions: txs,
        };

        let receipts = executor.execute_batch(&batch).await.unwrap();
        assert_eq!(receipts, computed.receipts);

        // A header lying about its state root is rejected.
        let mut forged = batch.clone();
        forged.header.state_root = B256::repeat_byte(0xEE);
        let err = executor.execute_batch(&forged).await.unwrap_err();
        assert!(matches!(err, ExecutorError::StateRootMismatch { .. }));
    }

    #[tokio::test]
    async fn test_execute_rejects_missing_parent() {
        let storage = Arc::new(InMemoryStorage::default());
        let executor = executor(storage, MockEvm::default());
        let batch = Batch {
            header: BatchHeader {
                parent_hash: B256::repeat_byte(7),
                number: 3,
                seq_no: 3,
                base_fee: EnclaveConfig::default().base_fee,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = executor.execute_batch(&batch).await.unwrap_err();
        assert_eq!(err, ExecutorError::ParentNotFound(B256::repeat_byte(7)));
    }

    #[tokio::test]
    async fn test_genesis_is_reproducible() {
        let storage = Arc::new(InMemoryStorage::default());
        let executor = executor(storage, MockEvm::default());
        let base_fee = EnclaveConfig::default().base_fee;
        let a = executor.create_genesis(B256::repeat_byte(1), 5, Address::ZERO, base_fee).await.unwrap();
        let b = executor.create_genesis(B256::repeat_byte(1), 5, Address::ZERO, base_fee).await.unwrap();
        assert_eq!(a.hash(), b.hash());
        assert!(a.is_genesis());

        let c = executor.create_genesis(B256::repeat_byte(2), 5, Address::ZERO, base_fee).await.unwrap();
        assert_ne!(a.hash(), c.hash());
    }
}
