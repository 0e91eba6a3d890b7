//! The seam to the transaction pool.
//!
//! The pool runs outside the core but admission decisions must see the same
//! world state as the upcoming batch, so the core feeds every executed batch
//! into the pool's virtual chain view.

use crate::errors::{MempoolError, UserError};
use async_trait::async_trait;
use cloak_primitives::{Batch, RawTransaction};

/// The transaction pool contract consumed by the node roles.
#[async_trait]
pub trait Mempool: Send + Sync + core::fmt::Debug {
    /// Whether the pool has been started.
    fn running(&self) -> bool;

    /// Starts the pool. Called once enough batches exist for admission
    /// checks to be meaningful.
    fn start(&self) -> Result<(), MempoolError>;

    /// Validates a user transaction for admission.
    async fn validate(&self, tx: &RawTransaction) -> Result<(), UserError>;

    /// Feeds an executed batch into the pool's virtual chain view.
    async fn ingest_batch(&self, batch: &Batch) -> Result<(), MempoolError>;

    /// Rewinds the virtual chain view to the given sequence number after an
    /// L2 reorg; the canonical suffix is replayed through
    /// [Mempool::ingest_batch].
    async fn rewind_to(&self, seq_no: u64) -> Result<(), MempoolError>;

    /// Drains up to `max_txs` pending transactions fitting the gas limit,
    /// in admission order.
    async fn pending(&self, gas_limit: u64, max_txs: usize) -> Vec<RawTransaction>;
}
