//! Enclave configuration.

use alloy_primitives::{Address, U256};

/// Static configuration of an enclave instance. Loaded once at attestation
/// time; every field is public knowledge except for what it implies about
/// the deployment.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnclaveConfig {
    /// The L2 chain id.
    pub chain_id: u64,
    /// The attested sequencer enclave address. Batch and rollup signatures
    /// must recover to this address.
    pub sequencer_address: Address,
    /// The L1 message-bus contract whose events carry inbound cross-chain
    /// messages.
    pub message_bus_address: Address,
    /// The floor for batch base fees.
    pub min_base_fee: U256,
    /// The base fee batches are currently produced with.
    pub base_fee: U256,
    /// The gas limit of a batch.
    pub batch_gas_limit: u64,
    /// The upper bound for gas estimation probes.
    pub gas_estimation_cap: u64,
    /// The most transactions the sequencer will pack into one batch.
    pub max_batch_transactions: usize,
    /// The sequencer's fee recipient.
    pub coinbase: Address,
    /// How often the sequencer produces a batch.
    pub batch_interval_ms: u64,
    /// How many batches the sequencer accumulates before rolling them up.
    pub rollup_interval_batches: u64,
}

impl Default for EnclaveConfig {
    fn default() -> Self {
        Self {
            chain_id: 443,
            sequencer_address: Address::ZERO,
            message_bus_address: Address::ZERO,
            min_base_fee: U256::from(1_000_000_000u64),
            base_fee: U256::from(1_000_000_000u64),
            batch_gas_limit: 30_000_000,
            gas_estimation_cap: 50_000_000,
            max_batch_transactions: 1_000,
            coinbase: Address::ZERO,
            batch_interval_ms: 1_000,
            rollup_interval_batches: 10,
        }
    }
}
