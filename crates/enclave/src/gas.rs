//! L1 publication cost pricing.
//!
//! Every user transaction the sequencer publishes eventually pays for L1
//! calldata. The oracle prices that cost against the current L1 head; the
//! executor and the estimator convert it into L2 gas at the batch base fee.

use crate::traits::CallRequest;
use alloy_primitives::U256;
use cloak_primitives::{
    params::{CALLDATA_NON_ZERO_GAS, CALLDATA_ZERO_GAS},
    L1BlockRef, RawTransaction,
};

/// Fixed per-transaction overhead charged on top of calldata gas when
/// pricing publication: the share of the batch envelope attributed to one
/// transaction.
const PUBLISH_OVERHEAD_GAS: u64 = 2_100;

/// Prices the L1 publication cost of L2 traffic.
pub trait GasOracle: Send + Sync + core::fmt::Debug {
    /// The L1 cost of publishing a call message, in wei.
    fn l1_cost_for_call(&self, call: &CallRequest, l1_head: &L1BlockRef) -> U256;

    /// The L1 cost of publishing a raw transaction, in wei.
    fn l1_cost_for_tx(&self, tx: &RawTransaction, l1_head: &L1BlockRef) -> U256;
}

/// The production oracle: calldata gas at the L1 head's base fee.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardGasOracle;

impl StandardGasOracle {
    fn price(&self, payload: &[u8], l1_head: &L1BlockRef) -> U256 {
        U256::from(calldata_gas(payload) + PUBLISH_OVERHEAD_GAS) * l1_head.base_fee
    }
}

impl GasOracle for StandardGasOracle {
    fn l1_cost_for_call(&self, call: &CallRequest, l1_head: &L1BlockRef) -> U256 {
        self.price(&call.data, l1_head)
    }

    fn l1_cost_for_tx(&self, tx: &RawTransaction, l1_head: &L1BlockRef) -> U256 {
        self.price(&tx.0, l1_head)
    }
}

/// Converts an L1 publication cost into L2 gas at the given base fee. The
/// extra unit covers the modulo leftover, so the charge never rounds below
/// the true cost.
pub fn publishing_gas(l1_cost: U256, base_fee: U256) -> u64 {
    let converted = l1_cost.checked_div(base_fee).unwrap_or_default();
    converted.saturating_to::<u64>().saturating_add(1)
}

fn calldata_gas(payload: &[u8]) -> u64 {
    payload.iter().fold(0u64, |gas, byte| {
        gas + if *byte == 0 { CALLDATA_ZERO_GAS } else { CALLDATA_NON_ZERO_GAS }
    })
}
