//! An alloy-backed L1 chain provider feeding the enclave's block consumer.

use alloy_consensus::{Header, Receipt, ReceiptWithBloom, TxType};
use alloy_primitives::{Bytes, Log, B256, U256, U64};
use alloy_provider::{Provider, ReqwestProvider};
use alloy_rlp::{Buf, Decodable};
use alloy_transport::{RpcError, TransportErrorKind};
use cloak_primitives::{BlockAndReceipts, L1BlockRef, L1Receipt};
use lru::LruCache;
use std::num::NonZeroUsize;

const CACHE_SIZE: usize = 16;

/// An error for the [AlloyChainProvider].
#[derive(Debug, thiserror::Error)]
pub enum ChainProviderError {
    /// Failed to fetch the raw header.
    #[error("failed to fetch raw header for hash {0}")]
    RawHeaderFetch(B256),
    /// Failed to decode the raw header.
    #[error("failed to decode raw header for hash {0}")]
    RawHeaderDecoding(B256),
    /// Failed to fetch the raw receipts.
    #[error("failed to fetch raw receipts for hash {0}")]
    RawReceiptsFetch(B256),
    /// Failed to decode the raw receipts.
    #[error("failed to decode raw receipts for hash {0}")]
    RawReceiptsDecoding(B256),
}

/// Fetches L1 headers and receipts over Ethereum JSON-RPC using an alloy
/// provider as the backend, reduced to the enclave's view of the chain.
///
/// **Note**:
/// This provider fetches data using the `debug_getRawHeader` and
/// `debug_getRawReceipts` methods. The RPC must support this namespace.
#[derive(Debug, Clone)]
pub struct AlloyChainProvider {
    /// The inner Ethereum JSON-RPC provider.
    inner: ReqwestProvider,
    /// `block_by_hash` LRU cache.
    block_by_hash_cache: LruCache<B256, L1BlockRef>,
    /// `receipts_by_hash` LRU cache.
    receipts_by_hash_cache: LruCache<B256, Vec<L1Receipt>>,
}

impl AlloyChainProvider {
    /// Creates a new [AlloyChainProvider] with the given alloy provider.
    pub fn new(inner: ReqwestProvider) -> Self {
        Self {
            inner,
            block_by_hash_cache: LruCache::new(NonZeroUsize::new(CACHE_SIZE).unwrap()),
            receipts_by_hash_cache: LruCache::new(NonZeroUsize::new(CACHE_SIZE).unwrap()),
        }
    }

    /// Creates a new [AlloyChainProvider] from the provided [reqwest::Url].
    pub fn new_http(url: reqwest::Url) -> Self {
        Self::new(ReqwestProvider::new_http(url))
    }

    /// Returns the latest L1 block number.
    pub async fn latest_block_number(&mut self) -> Result<u64, RpcError<TransportErrorKind>> {
        self.inner.get_block_number().await
    }

    /// Returns the chain ID.
    pub async fn chain_id(&mut self) -> Result<u64, RpcError<TransportErrorKind>> {
        self.inner.get_chain_id().await
    }

    /// Fetches the L1 block reference for the given hash.
    pub async fn block_by_hash(&mut self, hash: B256) -> Result<L1BlockRef, ChainProviderError> {
        if let Some(block) = self.block_by_hash_cache.get(&hash) {
            return Ok(*block);
        }

        let raw_header: Bytes = self
            .inner
            .raw_request("debug_getRawHeader".into(), [hash])
            .await
            .map_err(|_| ChainProviderError::RawHeaderFetch(hash))?;
        let header = Header::decode(&mut raw_header.as_ref())
            .map_err(|_| ChainProviderError::RawHeaderDecoding(hash))?;

        let block = block_ref(&header);
        self.block_by_hash_cache.put(hash, block);
        Ok(block)
    }

    /// Fetches the L1 block reference at the given height.
    pub async fn block_by_number(&mut self, number: u64) -> Result<L1BlockRef, ChainProviderError> {
        let raw_header: Bytes = self
            .inner
            .raw_request("debug_getRawHeader".into(), [U64::from(number)])
            .await
            .map_err(|_| ChainProviderError::RawHeaderFetch(B256::default()))?;
        let header = Header::decode(&mut raw_header.as_ref())
            .map_err(|_| ChainProviderError::RawHeaderDecoding(B256::default()))?;
        Ok(block_ref(&header))
    }

    /// Fetches all receipts in the block with the given hash, reduced to the
    /// enclave's view.
    pub async fn receipts_by_hash(
        &mut self,
        hash: B256,
    ) -> Result<Vec<L1Receipt>, ChainProviderError> {
        if let Some(receipts) = self.receipts_by_hash_cache.get(&hash) {
            return Ok(receipts.clone());
        }

        let raw_receipts: Vec<Bytes> = self
            .inner
            .raw_request("debug_getRawReceipts".into(), [hash])
            .await
            .map_err(|_| ChainProviderError::RawReceiptsFetch(hash))?;

        let receipts = raw_receipts
            .iter()
            .map(|r| {
                let r = &mut r.as_ref();

                // Skip the transaction type byte if it exists
                if !r.is_empty() && r[0] <= TxType::Eip7702 as u8 {
                    r.advance(1);
                }

                let decoded: ReceiptWithBloom<Receipt<Log>> = ReceiptWithBloom::decode(r)
                    .map_err(|_| ChainProviderError::RawReceiptsDecoding(hash))?;
                Ok(L1Receipt {
                    status: decoded.receipt.status.coerce_status(),
                    logs: decoded.receipt.logs,
                })
            })
            .collect::<Result<Vec<_>, ChainProviderError>>()?;
        self.receipts_by_hash_cache.put(hash, receipts.clone());
        Ok(receipts)
    }

    /// Fetches the `(block, receipts)` ingestion unit for the given hash.
    pub async fn block_and_receipts(
        &mut self,
        hash: B256,
    ) -> Result<BlockAndReceipts, ChainProviderError> {
        let block = self.block_by_hash(hash).await?;
        let receipts = self.receipts_by_hash(hash).await?;
        Ok(BlockAndReceipts::new(block, receipts))
    }
}

fn block_ref(header: &Header) -> L1BlockRef {
    L1BlockRef {
        hash: header.hash_slow(),
        parent_hash: header.parent_hash,
        number: header.number,
        timestamp: header.timestamp,
        base_fee: header.base_fee_per_gas.map(U256::from).unwrap_or_default(),
    }
}
