//! Test utilities for the providers.

use crate::{
    beacon_client::{APIBlobSidecar, APIConfigResponse, APIGenesisResponse},
    BeaconClient,
};
use async_trait::async_trait;
use thiserror::Error;

/// An error for the [MockBeaconClient]: a field was not set before use.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0} not set")]
pub struct MockBeaconClientError(pub &'static str);

/// A [BeaconClient] serving pre-seeded responses. Unset fields produce
/// errors, mimicking an unreachable or pruned beacon node.
#[derive(Debug, Default, Clone)]
pub struct MockBeaconClient {
    /// The node version response.
    pub node_version: Option<String>,
    /// The beacon genesis response.
    pub beacon_genesis: Option<APIGenesisResponse>,
    /// The config spec response.
    pub config_spec: Option<APIConfigResponse>,
    /// The sidecars returned for any slot.
    pub blob_sidecars: Option<Vec<APIBlobSidecar>>,
}

#[async_trait]
impl BeaconClient for MockBeaconClient {
    type Error = MockBeaconClientError;

    async fn node_version(&self) -> Result<String, Self::Error> {
        self.node_version.clone().ok_or(MockBeaconClientError("node_version"))
    }

    async fn config_spec(&self) -> Result<APIConfigResponse, Self::Error> {
        self.config_spec.clone().ok_or(MockBeaconClientError("config_spec"))
    }

    async fn beacon_genesis(&self) -> Result<APIGenesisResponse, Self::Error> {
        self.beacon_genesis.clone().ok_or(MockBeaconClientError("beacon_genesis"))
    }

    async fn beacon_blob_sidecars(&self, _slot: u64) -> Result<Vec<APIBlobSidecar>, Self::Error> {
        self.blob_sidecars.clone().ok_or(MockBeaconClientError("blob_sidecars"))
    }
}

/// A zeroed sidecar at the given index. Its commitment is not valid for any
/// real hash; verification paths are expected to reject it.
pub fn sidecar_at(index: u64) -> APIBlobSidecar {
    APIBlobSidecar { index, ..Default::default() }
}
