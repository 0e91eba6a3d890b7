//! A thin client over the Beacon node API.

use alloy_eips::eip4844::{Blob, Bytes48};
use alloy_rpc_types_beacon::sidecar::{BeaconBlobBundle, BlobData};
use async_trait::async_trait;
use reqwest::Client;

/// The node version API method.
const VERSION_METHOD: &str = "eth/v1/node/version";

/// The config spec API method.
const SPEC_METHOD: &str = "eth/v1/config/spec";

/// The beacon genesis API method.
const GENESIS_METHOD: &str = "eth/v1/beacon/genesis";

/// The blob sidecars API method prefix.
const SIDECARS_METHOD_PREFIX: &str = "eth/v1/beacon/blob_sidecars";

/// A reduced genesis response.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReducedGenesisData {
    /// The genesis time.
    #[serde(rename = "genesis_time")]
    #[serde(with = "alloy_serde::quantity")]
    pub genesis_time: u64,
}

/// An API genesis response.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct APIGenesisResponse {
    /// The data.
    pub data: ReducedGenesisData,
}

impl APIGenesisResponse {
    /// Creates a new API genesis response.
    pub const fn new(genesis_time: u64) -> Self {
        Self { data: ReducedGenesisData { genesis_time } }
    }
}

/// A reduced config response.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReducedConfigData {
    /// The seconds per slot.
    #[serde(rename = "SECONDS_PER_SLOT")]
    #[serde(with = "alloy_serde::quantity")]
    pub seconds_per_slot: u64,
}

/// An API config response.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct APIConfigResponse {
    /// The data.
    pub data: ReducedConfigData,
}

impl APIConfigResponse {
    /// Creates a new API config response.
    pub const fn new(seconds_per_slot: u64) -> Self {
        Self { data: ReducedConfigData { seconds_per_slot } }
    }
}

/// A node version response.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct APIVersionResponse {
    /// The data.
    pub data: VersionData,
}

/// The version payload of an [APIVersionResponse].
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VersionData {
    /// The version string of the beacon node.
    pub version: String,
}

/// A blob sidecar as returned by the Beacon API, reduced to the fields the
/// enclave verifies. Unknown response fields are ignored on parse.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct APIBlobSidecar {
    /// The sidecar index within the slot.
    #[serde(with = "alloy_serde::quantity")]
    pub index: u64,
    /// The blob data.
    pub blob: Box<Blob>,
    /// The KZG commitment of the blob.
    pub kzg_commitment: Bytes48,
    /// The KZG proof for the commitment.
    pub kzg_proof: Bytes48,
}

impl From<BlobData> for APIBlobSidecar {
    fn from(data: BlobData) -> Self {
        Self {
            index: data.index,
            blob: data.blob,
            kzg_commitment: data.kzg_commitment,
            kzg_proof: data.kzg_proof,
        }
    }
}

/// The blob sidecars response payload.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct APIGetBlobSidecarsResponse {
    /// The sidecars of the requested slot.
    pub data: Vec<APIBlobSidecar>,
}

/// The [BeaconClient] is a thin wrapper around the Beacon API.
#[async_trait]
pub trait BeaconClient: Send + Sync + core::fmt::Debug {
    /// The error type for [BeaconClient] implementations.
    type Error: core::fmt::Display + Send + Sync;

    /// Returns the version of the connected beacon node.
    async fn node_version(&self) -> Result<String, Self::Error>;

    /// Returns the config spec.
    async fn config_spec(&self) -> Result<APIConfigResponse, Self::Error>;

    /// Returns the beacon genesis.
    async fn beacon_genesis(&self) -> Result<APIGenesisResponse, Self::Error>;

    /// Fetches blob sidecars that were confirmed in the given slot. Order
    /// and completeness are the caller's concern; blob data is not checked
    /// for validity here.
    async fn beacon_blob_sidecars(&self, slot: u64) -> Result<Vec<APIBlobSidecar>, Self::Error>;
}

/// An online implementation of the [BeaconClient] trait.
#[derive(Debug, Clone)]
pub struct OnlineBeaconClient {
    /// The base URL of the beacon API.
    base: String,
    /// The inner HTTP client.
    inner: Client,
}

impl OnlineBeaconClient {
    /// Creates a new [OnlineBeaconClient] from the provided base URL.
    pub fn new_http(mut base: String) -> Self {
        // If base ends with a slash, remove it
        if base.ends_with('/') {
            base.remove(base.len() - 1);
        }
        Self { base, inner: Client::new() }
    }
}

#[async_trait]
impl BeaconClient for OnlineBeaconClient {
    type Error = reqwest::Error;

    async fn node_version(&self) -> Result<String, Self::Error> {
        let response = self.inner.get(format!("{}/{}", self.base, VERSION_METHOD)).send().await?;
        Ok(response.json::<APIVersionResponse>().await?.data.version)
    }

    async fn config_spec(&self) -> Result<APIConfigResponse, Self::Error> {
        let response = self.inner.get(format!("{}/{}", self.base, SPEC_METHOD)).send().await?;
        response.json::<APIConfigResponse>().await
    }

    async fn beacon_genesis(&self) -> Result<APIGenesisResponse, Self::Error> {
        let response = self.inner.get(format!("{}/{}", self.base, GENESIS_METHOD)).send().await?;
        response.json::<APIGenesisResponse>().await
    }

    async fn beacon_blob_sidecars(&self, slot: u64) -> Result<Vec<APIBlobSidecar>, Self::Error> {
        let raw_response = self
            .inner
            .get(format!("{}/{}/{}", self.base, SIDECARS_METHOD_PREFIX, slot))
            .send()
            .await?;
        let bundle = raw_response.json::<BeaconBlobBundle>().await?;
        Ok(bundle.data.into_iter().map(APIBlobSidecar::from).collect())
    }
}
