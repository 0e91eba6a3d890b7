//! Blob fetching with verification and round-robin failover.

use crate::{
    beacon_client::{APIBlobSidecar, APIConfigResponse, APIGenesisResponse},
    BeaconClient,
};
use alloy_eips::eip4844::{BlobTransactionSidecarItem, IndexedBlobHash};
use alloy_primitives::Bytes;
use async_trait::async_trait;
use cloak_primitives::{Blob, L1BlockRef};
use thiserror::Error;
use tracing::warn;

/// An error encountered while fetching or verifying blobs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobFetchError {
    /// The block timestamp precedes the beacon genesis.
    #[error("slot derivation: timestamp precedes beacon genesis")]
    SlotDerivation,
    /// Fewer sidecars were returned than hashes requested.
    #[error("expected {0} sidecars but got {1}")]
    SidecarLengthMismatch(usize, usize),
    /// A blob failed its KZG or versioned-hash verification.
    #[error("blob at index {0} failed verification: {1}")]
    Verification(u64, String),
    /// The backing API failed.
    #[error("beacon backend failure: {0}")]
    Backend(String),
}

/// The minimal interface required to fetch sidecars from a remote blob
/// store.
#[async_trait]
pub trait BlobSidecarFetcher: Send + Sync + core::fmt::Debug {
    /// Fetches blob sidecars that were confirmed in the given slot.
    async fn beacon_blob_sidecars(&self, slot: u64)
        -> Result<Vec<APIBlobSidecar>, BlobFetchError>;
}

/// Blanket implementation of the [BlobSidecarFetcher] trait for all types
/// that implement [BeaconClient], which has a superset of the required
/// functionality.
#[async_trait]
impl<B: BeaconClient> BlobSidecarFetcher for B {
    async fn beacon_blob_sidecars(
        &self,
        slot: u64,
    ) -> Result<Vec<APIBlobSidecar>, BlobFetchError> {
        BeaconClient::beacon_blob_sidecars(self, slot)
            .await
            .map_err(|e| BlobFetchError::Backend(e.to_string()))
    }
}

/// A round-robin pool of sidecar fetchers, rotated whenever the current one
/// errors. Blobs are evicted from beacon nodes after a retention window, so
/// archives behind the same interface act as fallbacks.
#[derive(Debug, Clone)]
pub struct ClientPool<T> {
    clients: Vec<T>,
    index: usize,
}

impl<T> ClientPool<T> {
    /// Creates a pool over the given fetchers. The first one is the
    /// preferred client.
    pub fn new(clients: Vec<T>) -> Self {
        Self { clients, index: 0 }
    }

    /// Number of pooled clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// The current client.
    pub fn get(&self) -> &T {
        &self.clients[self.index]
    }

    /// Rotates to the next client.
    pub fn move_to_next(&mut self) {
        self.index += 1;
        if self.index == self.clients.len() {
            self.index = 0;
        }
    }
}

/// Fetches blobs confirmed in L1 blocks and verifies them against the
/// requested versioned hashes.
///
/// The beacon client resolves the time-to-slot parameters once; sidecar
/// fetching goes through the pool so a failing node rotates out instead of
/// stalling ingestion.
#[derive(Debug)]
pub struct BlobPoolProvider<B: BeaconClient, F: BlobSidecarFetcher> {
    beacon: B,
    pool: ClientPool<F>,
    genesis_time: Option<u64>,
    slot_interval: Option<u64>,
}

impl<B: BeaconClient, F: BlobSidecarFetcher> BlobPoolProvider<B, F> {
    /// Creates a provider over a beacon client and sidecar fallbacks.
    pub fn new(beacon: B, fallbacks: Vec<F>) -> Self {
        Self { beacon, pool: ClientPool::new(fallbacks), genesis_time: None, slot_interval: None }
    }

    /// Loads the beacon genesis and config spec if not already cached.
    pub async fn load_configs(&mut self) -> Result<(), BlobFetchError> {
        if self.genesis_time.is_none() {
            let genesis: APIGenesisResponse = self
                .beacon
                .beacon_genesis()
                .await
                .map_err(|e| BlobFetchError::Backend(e.to_string()))?;
            self.genesis_time = Some(genesis.data.genesis_time);
        }
        if self.slot_interval.is_none() {
            let spec: APIConfigResponse = self
                .beacon
                .config_spec()
                .await
                .map_err(|e| BlobFetchError::Backend(e.to_string()))?;
            if spec.data.seconds_per_slot == 0 {
                return Err(BlobFetchError::Backend(
                    "got bad value for seconds per slot: 0".to_string(),
                ));
            }
            self.slot_interval = Some(spec.data.seconds_per_slot);
        }
        Ok(())
    }

    /// Computes the slot for the given timestamp.
    pub fn slot(genesis: u64, slot_interval: u64, timestamp: u64) -> Result<u64, BlobFetchError> {
        if timestamp < genesis {
            return Err(BlobFetchError::SlotDerivation);
        }
        Ok((timestamp - genesis) / slot_interval)
    }

    /// Fetches sidecars for a slot, rotating through the pool on errors.
    async fn fetch_sidecars(&mut self, slot: u64) -> Result<Vec<APIBlobSidecar>, BlobFetchError> {
        let mut errors = Vec::new();
        for _ in 0..self.pool.len() {
            match self.pool.get().beacon_blob_sidecars(slot).await {
                Ok(sidecars) => return Ok(sidecars),
                Err(e) => {
                    warn!(target: "blob_provider", err = %e, "sidecar fetch failed, rotating client");
                    errors.push(e.to_string());
                    self.pool.move_to_next();
                }
            }
        }
        Err(BlobFetchError::Backend(errors.join("; ")))
    }

    /// Fetches the blobs confirmed in `block` for the given indexed hashes.
    /// The returned blobs match the order of `hashes`; each blob's KZG
    /// commitment must hash to the requested versioned hash and its proof
    /// must verify against the commitment.
    pub async fn get_blobs(
        &mut self,
        block: &L1BlockRef,
        hashes: &[IndexedBlobHash],
    ) -> Result<Vec<Blob>, BlobFetchError> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        self.load_configs().await?;
        let genesis = self.genesis_time.expect("genesis config loaded");
        let interval = self.slot_interval.expect("config spec loaded");
        let slot = Self::slot(genesis, interval, block.timestamp)?;

        let sidecars = self.fetch_sidecars(slot).await?;
        let filtered = filter_sidecars(sidecars, hashes)?;

        filtered
            .into_iter()
            .zip(hashes)
            .map(|(sidecar, hash)| {
                sidecar
                    .verify_blob(hash)
                    .map_err(|e| BlobFetchError::Verification(hash.index, e.to_string()))?;
                Ok(Blob::new(hash.hash, Bytes::copy_from_slice(sidecar.blob.as_slice())))
            })
            .collect()
    }
}

/// Filters and reorders sidecars to match the requested indexed hashes.
fn filter_sidecars(
    sidecars: Vec<APIBlobSidecar>,
    hashes: &[IndexedBlobHash],
) -> Result<Vec<BlobTransactionSidecarItem>, BlobFetchError> {
    let mut filtered = Vec::with_capacity(hashes.len());
    for hash in hashes {
        if let Some(sidecar) = sidecars.iter().find(|sidecar| sidecar.index == hash.index) {
            filtered.push(BlobTransactionSidecarItem {
                index: sidecar.index,
                blob: sidecar.blob.clone(),
                kzg_commitment: sidecar.kzg_commitment,
                kzg_proof: sidecar.kzg_proof,
            });
        }
    }
    if filtered.len() != hashes.len() {
        return Err(BlobFetchError::SidecarLengthMismatch(hashes.len(), filtered.len()));
    }
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sidecar_at, MockBeaconClient};
    use alloy_primitives::B256;

    fn provider(
        beacon: MockBeaconClient,
        fallbacks: Vec<MockBeaconClient>,
    ) -> BlobPoolProvider<MockBeaconClient, MockBeaconClient> {
        BlobPoolProvider::new(beacon, fallbacks)
    }

    fn configured() -> MockBeaconClient {
        MockBeaconClient {
            beacon_genesis: Some(APIGenesisResponse::new(10)),
            config_spec: Some(APIConfigResponse::new(12)),
            ..Default::default()
        }
    }

    #[test]
    fn test_slot_derivation() {
        assert_eq!(BlobPoolProvider::<MockBeaconClient, MockBeaconClient>::slot(10, 12, 34), Ok(2));
        assert_eq!(
            BlobPoolProvider::<MockBeaconClient, MockBeaconClient>::slot(10, 12, 5),
            Err(BlobFetchError::SlotDerivation)
        );
    }

    #[test]
    fn test_filter_sidecars_orders_by_request() {
        let sidecars = vec![sidecar_at(2), sidecar_at(0), sidecar_at(1)];
        let hashes = [
            IndexedBlobHash { index: 1, hash: B256::repeat_byte(1) },
            IndexedBlobHash { index: 0, hash: B256::repeat_byte(0) },
        ];
        let filtered = filter_sidecars(sidecars, &hashes).unwrap();
        assert_eq!(filtered.iter().map(|s| s.index).collect::<Vec<_>>(), vec![1, 0]);
    }

    #[test]
    fn test_filter_sidecars_length_mismatch() {
        let sidecars = vec![sidecar_at(0)];
        let hashes = [
            IndexedBlobHash { index: 0, hash: B256::ZERO },
            IndexedBlobHash { index: 1, hash: B256::ZERO },
        ];
        assert_eq!(
            filter_sidecars(sidecars, &hashes),
            Err(BlobFetchError::SidecarLengthMismatch(2, 1))
        );
    }

    #[tokio::test]
    async fn test_get_blobs_empty_hashes() {
        let mut provider = provider(configured(), vec![configured()]);
        let blobs = provider.get_blobs(&L1BlockRef::default(), &[]).await.unwrap();
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn test_get_blobs_config_fetch_fails() {
        let mut provider = provider(MockBeaconClient::default(), vec![configured()]);
        let block = L1BlockRef { timestamp: 15, ..Default::default() };
        let hashes = [IndexedBlobHash { index: 0, hash: B256::ZERO }];
        let err = provider.get_blobs(&block, &hashes).await.unwrap_err();
        assert!(matches!(err, BlobFetchError::Backend(_)));
    }

    #[tokio::test]
    async fn test_get_blobs_before_genesis_fails() {
        let mut provider = provider(configured(), vec![configured()]);
        let block = L1BlockRef { timestamp: 5, ..Default::default() };
        let hashes = [IndexedBlobHash { index: 0, hash: B256::ZERO }];
        let err = provider.get_blobs(&block, &hashes).await.unwrap_err();
        assert_eq!(err, BlobFetchError::SlotDerivation);
    }

    #[tokio::test]
    async fn test_pool_rotates_to_fallback() {
        // The primary fetcher has no sidecars and errors; the fallback
        // serves them.
        let failing = configured();
        let mut serving = configured();
        serving.blob_sidecars = Some(vec![sidecar_at(0)]);
        let mut provider = provider(configured(), vec![failing, serving]);

        let block = L1BlockRef { timestamp: 15, ..Default::default() };
        let hashes = [IndexedBlobHash { index: 0, hash: B256::repeat_byte(1) }];
        // The sidecar is found through the fallback; verification then fails
        // because the mock sidecar cannot carry a valid commitment.
        let err = provider.get_blobs(&block, &hashes).await.unwrap_err();
        assert!(matches!(err, BlobFetchError::Verification(0, _)));
        // The pool rotated off the failing client.
        assert_eq!(provider.pool.index, 1);
    }

    #[tokio::test]
    async fn test_all_fetchers_failing_joins_errors() {
        let mut provider = provider(configured(), vec![configured(), configured()]);
        let block = L1BlockRef { timestamp: 15, ..Default::default() };
        let hashes = [IndexedBlobHash { index: 0, hash: B256::ZERO }];
        let err = provider.get_blobs(&block, &hashes).await.unwrap_err();
        assert!(matches!(err, BlobFetchError::Backend(msg) if msg.contains(';')));
    }
}
