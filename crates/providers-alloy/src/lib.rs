//! Online collaborators of the cloak enclave host: an alloy-backed L1 chain
//! provider and a Beacon API client with a failover blob fetcher.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod chain_provider;
pub use chain_provider::{AlloyChainProvider, ChainProviderError};

mod beacon_client;
pub use beacon_client::{
    APIBlobSidecar, APIConfigResponse, APIGenesisResponse, APIGetBlobSidecarsResponse,
    APIVersionResponse, BeaconClient, OnlineBeaconClient, ReducedConfigData, ReducedGenesisData,
    VersionData,
};

mod blob_provider;
pub use blob_provider::{BlobFetchError, BlobPoolProvider, BlobSidecarFetcher, ClientPool};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
