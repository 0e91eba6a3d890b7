//! Test utilities for the enclave core: in-memory implementations of the
//! collaborator seams and deterministic chain builders.

use crate::{
    errors::{EvmError, MempoolError, StorageError, StorageResult, UserError},
    rpc::EnvelopeCrypto,
    traits::{
        BatchEnv, BlockSpec, CallOutcome, CallRequest, Evm, EvmBatchResult, Mempool, Storage,
        TxExecution, VmFailure,
    },
};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use cloak_primitives::{
    Batch, BatchHeader, BatchReceipt, CrossChainMessage, L1BlockRef, RawTransaction,
};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

/// An in-memory [Storage] implementation with the same consistency contract
/// as the production backend: writes happen under one lock, and
/// `store_executed_batch` is a single atomic unit.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    inner: Mutex<StorageInner>,
}

#[derive(Debug, Default)]
struct StorageInner {
    blocks: HashMap<B256, L1BlockRef>,
    l1_head: Option<B256>,
    batches: HashMap<B256, Batch>,
    canonical: BTreeMap<u64, B256>,
    executed: HashSet<B256>,
    receipts: HashMap<B256, Vec<BatchReceipt>>,
    inbound: HashMap<B256, Vec<CrossChainMessage>>,
}

impl InMemoryStorage {
    /// The receipts stored for the given batch hash.
    pub fn receipts(&self, batch_hash: B256) -> Option<Vec<BatchReceipt>> {
        self.inner.lock().unwrap().receipts.get(&batch_hash).cloned()
    }

    /// The inbound messages stored for the given L1 block.
    pub fn inbound_messages(&self, block_hash: B256) -> Option<Vec<CrossChainMessage>> {
        self.inner.lock().unwrap().inbound.get(&block_hash).cloned()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn fetch_block(&self, hash: B256) -> StorageResult<L1BlockRef> {
        self.inner.lock().unwrap().blocks.get(&hash).copied().ok_or(StorageError::NotFound)
    }

    async fn store_block(&self, block: &L1BlockRef) -> StorageResult<()> {
        self.inner.lock().unwrap().blocks.insert(block.hash, *block);
        Ok(())
    }

    async fn fetch_head_block(&self) -> StorageResult<L1BlockRef> {
        let inner = self.inner.lock().unwrap();
        let head = inner.l1_head.ok_or(StorageError::NotFound)?;
        inner.blocks.get(&head).copied().ok_or(StorageError::NotFound)
    }

    async fn update_l1_head(&self, hash: B256) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.blocks.contains_key(&hash) {
            return Err(StorageError::Backend(format!("head block {hash} not stored")));
        }
        inner.l1_head = Some(hash);
        Ok(())
    }

    async fn fetch_batch(&self, hash: B256) -> StorageResult<Batch> {
        self.inner.lock().unwrap().batches.get(&hash).cloned().ok_or(StorageError::NotFound)
    }

    async fn fetch_batch_by_seq_no(&self, seq_no: u64) -> StorageResult<Batch> {
        let inner = self.inner.lock().unwrap();
        let hash = inner.canonical.get(&seq_no).ok_or(StorageError::NotFound)?;
        inner.batches.get(hash).cloned().ok_or(StorageError::NotFound)
    }

    async fn fetch_head_batch(&self) -> StorageResult<Batch> {
        let inner = self.inner.lock().unwrap();
        inner
            .canonical
            .values()
            .rev()
            .find(|hash| inner.executed.contains(*hash))
            .and_then(|hash| inner.batches.get(hash).cloned())
            .ok_or(StorageError::NotFound)
    }

    async fn store_batch(&self, batch: &Batch) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let hash = batch.hash();
        inner.batches.insert(hash, batch.clone());
        // Exactly one canonical batch per sequence number: storing a
        // competitor demotes the previous one.
        inner.canonical.insert(batch.seq_no(), hash);
        Ok(())
    }

    async fn fetch_canonical_unexecuted_batches(
        &self,
        from_seq_no: u64,
    ) -> StorageResult<Vec<Batch>> {
        let inner = self.inner.lock().unwrap();
        let batches = inner
            .canonical
            .range(from_seq_no..)
            .filter(|(_, hash)| !inner.executed.contains(*hash))
            .filter_map(|(_, hash)| inner.batches.get(hash).cloned())
            .collect::<Vec<_>>();
        if batches.is_empty() {
            return Err(StorageError::NotFound);
        }
        Ok(batches)
    }

    async fn store_executed_batch(
        &self,
        batch: &Batch,
        receipts: &[BatchReceipt],
    ) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let hash = batch.hash();
        if inner.executed.contains(&hash) {
            return Err(StorageError::Backend(format!("batch {hash} already executed")));
        }
        inner.batches.insert(hash, batch.clone());
        inner.canonical.insert(batch.seq_no(), hash);
        inner.receipts.insert(hash, receipts.to_vec());
        inner.executed.insert(hash);
        Ok(())
    }

    async fn batch_was_executed(&self, hash: B256) -> StorageResult<bool> {
        Ok(self.inner.lock().unwrap().executed.contains(&hash))
    }

    async fn store_inbound_messages(
        &self,
        block_hash: B256,
        messages: &[CrossChainMessage],
    ) -> StorageResult<()> {
        self.inner.lock().unwrap().inbound.insert(block_hash, messages.to_vec());
        Ok(())
    }
}

/// A deterministic in-memory execution engine.
///
/// State roots are derived from the parent root and the transaction hashes,
/// so re-execution always reproduces them. Call behavior is controlled by
/// the public knobs.
#[derive(Debug, Clone, Default)]
pub struct MockEvm {
    /// Account balances visible to [Evm::balance]. Unknown accounts are
    /// treated as unconstrained.
    pub balances: HashMap<Address, U256>,
    /// Calls below this gas limit fail with [EvmError::IntrinsicGas].
    pub intrinsic_gas_floor: u64,
    /// Calls below this gas limit run out of gas; calls at or above succeed.
    pub call_gas_required: u64,
    /// When set, every call reverts with this data regardless of gas.
    pub revert_data: Option<Bytes>,
    /// Messages emitted per transaction hash during batch execution.
    pub messages: HashMap<B256, Vec<CrossChainMessage>>,
}

impl MockEvm {
    /// Execution gas the mock charges per transaction.
    pub const TX_GAS_USED: u64 = 21_000;
}

#[async_trait]
impl Evm for MockEvm {
    async fn execute_batch(
        &self,
        env: &BatchEnv,
        txs: &[RawTransaction],
    ) -> Result<EvmBatchResult, EvmError> {
        let mut preimage = Vec::new();
        preimage.extend_from_slice(env.parent_state_root.as_slice());
        preimage.extend_from_slice(&env.number.to_be_bytes());
        let executions = txs
            .iter()
            .map(|tx| {
                preimage.extend_from_slice(tx.hash().as_slice());
                TxExecution {
                    tx_hash: tx.hash(),
                    success: true,
                    gas_used: Self::TX_GAS_USED,
                    messages: self.messages.get(&tx.hash()).cloned().unwrap_or_default(),
                    ..Default::default()
                }
            })
            .collect();
        Ok(EvmBatchResult { state_root: keccak256(&preimage), executions })
    }

    async fn call(
        &self,
        _call: &CallRequest,
        gas_limit: u64,
        _at: BlockSpec,
    ) -> Result<CallOutcome, EvmError> {
        if gas_limit < self.intrinsic_gas_floor {
            return Err(EvmError::IntrinsicGas);
        }
        if let Some(data) = &self.revert_data {
            return Ok(CallOutcome {
                gas_used: gas_limit,
                output: Bytes::new(),
                failure: Some(VmFailure::Revert(data.clone())),
            });
        }
        if gas_limit < self.call_gas_required {
            return Ok(CallOutcome {
                gas_used: gas_limit,
                output: Bytes::new(),
                failure: Some(VmFailure::OutOfGas),
            });
        }
        Ok(CallOutcome {
            gas_used: self.call_gas_required.max(Self::TX_GAS_USED),
            output: Bytes::new(),
            failure: None,
        })
    }

    async fn balance(&self, account: Address, _at: BlockSpec) -> Result<U256, EvmError> {
        Ok(self.balances.get(&account).copied().unwrap_or(U256::MAX))
    }

    async fn genesis_state_root(&self) -> Result<B256, EvmError> {
        Ok(keccak256(b"genesis"))
    }
}

/// A [Mempool] that records every interaction.
#[derive(Debug, Default)]
pub struct RecordingMempool {
    running: AtomicBool,
    ingested: Mutex<Vec<u64>>,
    rewinds: Mutex<Vec<u64>>,
    pending: Mutex<Vec<RawTransaction>>,
}

impl RecordingMempool {
    /// Sequence numbers of the batches fed into the virtual chain, in order.
    pub fn ingested(&self) -> Vec<u64> {
        self.ingested.lock().unwrap().clone()
    }

    /// Fork points the pool was rewound to, in order.
    pub fn rewinds(&self) -> Vec<u64> {
        self.rewinds.lock().unwrap().clone()
    }

    /// Queues a transaction for the next [Mempool::pending] drain.
    pub fn push_pending(&self, tx: RawTransaction) {
        self.pending.lock().unwrap().push(tx);
    }
}

#[async_trait]
impl Mempool for RecordingMempool {
    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn start(&self) -> Result<(), MempoolError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn validate(&self, _tx: &RawTransaction) -> Result<(), UserError> {
        Ok(())
    }

    async fn ingest_batch(&self, batch: &Batch) -> Result<(), MempoolError> {
        self.ingested.lock().unwrap().push(batch.seq_no());
        Ok(())
    }

    async fn rewind_to(&self, seq_no: u64) -> Result<(), MempoolError> {
        self.rewinds.lock().unwrap().push(seq_no);
        Ok(())
    }

    async fn pending(&self, _gas_limit: u64, max_txs: usize) -> Vec<RawTransaction> {
        let mut pending = self.pending.lock().unwrap();
        let take = pending.len().min(max_txs);
        pending.drain(..take).collect()
    }
}

/// A [Compressor] that just RLP-encodes the manifest and batches, for tests
/// that exercise rollup assembly rather than the codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct RlpCompressor;

impl crate::nodetype::Compressor for RlpCompressor {
    fn compress(
        &self,
        manifest: &cloak_primitives::CalldataRollupHeader,
        batches: &[Batch],
    ) -> Result<Vec<u8>, crate::errors::CompressionError> {
        let mut out = alloy_rlp::encode(manifest);
        for batch in batches {
            out.extend(alloy_rlp::encode(batch));
        }
        Ok(out)
    }
}

/// An [EnvelopeCrypto] that passes everything through unchanged, for tests
/// that exercise the boundary logic rather than the cipher.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainEnvelope;

impl EnvelopeCrypto for PlainEnvelope {
    fn decrypt_request(&self, ciphertext: &[u8]) -> Result<Vec<u8>, crate::rpc::EnvelopeError> {
        Ok(ciphertext.to_vec())
    }

    fn encrypt_response(
        &self,
        _vk_public_key: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, crate::rpc::EnvelopeError> {
        Ok(plaintext.to_vec())
    }
}

/// Builds a deterministic L1 chain of `count` blocks off `parent`.
pub fn chain(parent: B256, start_number: u64, count: usize) -> Vec<L1BlockRef> {
    let mut out = Vec::with_capacity(count);
    let mut parent_hash = parent;
    for i in 0..count as u64 {
        let number = start_number + i;
        let timestamp = 1_000 + 12 * i;
        let mut preimage = Vec::with_capacity(48);
        preimage.extend_from_slice(parent_hash.as_slice());
        preimage.extend_from_slice(&number.to_be_bytes());
        preimage.extend_from_slice(&timestamp.to_be_bytes());
        let hash = keccak256(&preimage);
        out.push(L1BlockRef { hash, parent_hash, number, timestamp, base_fee: U256::from(7u64) });
        parent_hash = hash;
    }
    out
}

/// Builds a dense batch chain starting at genesis, suitable for feeding the
/// registry directly.
pub fn batch_chain(count: usize) -> Vec<Batch> {
    let mut out = Vec::with_capacity(count);
    let mut parent_hash = B256::ZERO;
    for seq in 0..count as u64 {
        let header = BatchHeader {
            parent_hash,
            number: seq,
            seq_no: seq,
            timestamp: 1_000 + seq,
            base_fee: U256::from(1_000_000_000u64),
            gas_limit: 30_000_000,
            ..Default::default()
        };
        let batch = Batch { header, transactions: Vec::new() };
        parent_hash = batch.hash();
        out.push(batch);
    }
    out
}
