//! The encryption manager: the enclave-side owner of the RPC boundary and
//! the gas estimation it serves.

use crate::{
    config::EnclaveConfig,
    errors::{EvmError, InternalError, UserError},
    gas::{publishing_gas, GasOracle},
    rpc::{
        estimate_gas::extract_estimate_gas_request, with_vk_encryption, EnclaveResponse,
        EnvelopeCrypto, EstimateGasParams, UserRpcRequest,
    },
    traits::{BlockSpec, CallOutcome, CallRequest, Evm, Storage, VmFailure},
};
use alloy_primitives::U256;
use cloak_primitives::params::TX_GAS;
use std::sync::Arc;
use tracing::debug;

/// Manages the decryption and encryption of enclave comms and executes the
/// read-only user queries behind them.
pub struct EncryptionManager {
    crypto: Arc<dyn EnvelopeCrypto>,
    storage: Arc<dyn Storage>,
    evm: Arc<dyn Evm>,
    gas_oracle: Arc<dyn GasOracle>,
    config: EnclaveConfig,
}

impl core::fmt::Debug for EncryptionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EncryptionManager").field("config", &self.config).finish_non_exhaustive()
    }
}

impl EncryptionManager {
    /// Creates the manager over the envelope cipher and the query backends.
    pub fn new(
        crypto: Arc<dyn EnvelopeCrypto>,
        storage: Arc<dyn Storage>,
        evm: Arc<dyn Evm>,
        gas_oracle: Arc<dyn GasOracle>,
        config: EnclaveConfig,
    ) -> Self {
        Self { crypto, storage, evm, gas_oracle, config }
    }

    /// Serves an encrypted `estimateGas` request.
    pub async fn estimate_gas(
        &self,
        encrypted_request: &[u8],
    ) -> Result<EnclaveResponse, InternalError> {
        with_vk_encryption(
            self.crypto.as_ref(),
            encrypted_request,
            extract_estimate_gas_request,
            |req| async move { self.execute_estimate_gas(req).await },
        )
        .await
    }

    /// The estimation body: L2 execution gas from a binary search plus the
    /// L1 publication charge at the current head.
    pub(crate) async fn execute_estimate_gas(
        &self,
        req: UserRpcRequest<EstimateGasParams>,
    ) -> Result<Result<u64, UserError>, InternalError> {
        // The message is run through the L1 publishing cost estimation for
        // the current known head block, then converted into L2 gas at the
        // head batch's base fee.
        let l1_head = self.storage.fetch_head_block().await.map_err(InternalError::from)?;
        let l1_cost = self.gas_oracle.l1_cost_for_call(&req.params.call, &l1_head);
        let head_batch = self.storage.fetch_head_batch().await.map_err(InternalError::from)?;
        let publishing = publishing_gas(l1_cost, head_batch.header.base_fee);

        match self.do_estimate_gas(&req.params.call, req.params.block).await? {
            Ok(execution_gas) => Ok(Ok(execution_gas + publishing)),
            Err(user_err) => Ok(Err(user_err)),
        }
    }

    /// Binary-searches the minimum gas limit the call succeeds with.
    async fn do_estimate_gas(
        &self,
        call: &CallRequest,
        at: BlockSpec,
    ) -> Result<Result<u64, UserError>, InternalError> {
        let mut lo = TX_GAS - 1;
        // Determine the highest gas limit usable during the estimation.
        let mut hi = match call.gas {
            Some(gas) if gas >= TX_GAS => gas,
            _ => self.config.gas_estimation_cap,
        };

        // Recap the highest gas limit with the account's available balance.
        let fee_cap = match call.fee_cap() {
            Ok(fee_cap) => fee_cap,
            Err(e) => return Ok(Err(e)),
        };
        if !fee_cap.is_zero() {
            let from = call.from.unwrap_or_default();
            let balance = self
                .evm
                .balance(from, at)
                .await
                .map_err(|e| InternalError(format!("unable to fetch account balance - {e}")))?;
            let mut available = balance;
            if let Some(value) = call.value {
                if value >= available {
                    return Ok(Err(UserError::InsufficientFunds));
                }
                available -= value;
            }
            let allowance = available / fee_cap;
            if allowance < U256::from(hi) {
                debug!(
                    target: "rpc",
                    original = hi,
                    %balance,
                    %fee_cap,
                    fundable = %allowance,
                    "gas estimation capped by limited funds"
                );
                hi = allowance.saturating_to::<u64>();
            }
        }
        // Recap with the configured ceiling.
        if self.config.gas_estimation_cap != 0 && hi > self.config.gas_estimation_cap {
            debug!(target: "rpc", requested = hi, cap = self.config.gas_estimation_cap, "caller gas above allowance, capping");
            hi = self.config.gas_estimation_cap;
        }
        let cap = hi;

        // Execute the binary search and hone in on a sufficient gas limit.
        while lo + 1 < hi {
            let mid = (hi + lo) / 2;
            match self.is_gas_enough(call, mid, at).await? {
                Err(user_err) => return Ok(Err(user_err)),
                Ok((true, _)) => lo = mid,
                Ok((false, _)) => hi = mid,
            }
        }

        // Reject the call as invalid if it still fails at the highest
        // allowance.
        if hi == cap {
            match self.is_gas_enough(call, hi, at).await? {
                Err(user_err) => return Ok(Err(user_err)),
                Ok((false, _)) => {}
                Ok((true, outcome)) => {
                    return Ok(Err(match outcome.and_then(|o| o.failure) {
                        Some(VmFailure::Revert(data)) => UserError::Reverted { data },
                        Some(VmFailure::Halt(reason)) => UserError::Failed(reason),
                        // Out of gas, or intrinsic gas all the way up to the
                        // cap: the cap is simply too low.
                        Some(VmFailure::OutOfGas) | None => UserError::GasExceedsAllowance(cap),
                    }));
                }
            }
        }
        Ok(Ok(hi))
    }

    /// Probes whether a gas allowance results in an executable call:
    /// `(should raise, outcome)`. A returned user error means no amount of
    /// gas will ever make the call acceptable.
    async fn is_gas_enough(
        &self,
        call: &CallRequest,
        gas: u64,
        at: BlockSpec,
    ) -> Result<Result<(bool, Option<CallOutcome>), UserError>, InternalError> {
        match self.evm.call(call, gas, at).await {
            Ok(outcome) => Ok(Ok((outcome.failed(), Some(outcome)))),
            // Special case: raise the gas limit.
            Err(EvmError::IntrinsicGas) => Ok(Ok((true, None))),
            Err(EvmError::InsufficientFunds) => Ok(Err(UserError::InsufficientFunds)),
            Err(EvmError::Engine(e)) => Err(InternalError(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::REVERT_ERROR_CODE,
        gas::StandardGasOracle,
        rpc::RpcErrorPayload,
        test_utils::{batch_chain, chain, InMemoryStorage, MockEvm, PlainEnvelope},
    };
    use alloy_primitives::{Address, Bytes};

    async fn manager_with(evm: MockEvm) -> EncryptionManager {
        let storage = Arc::new(InMemoryStorage::default());
        let block = chain(alloy_primitives::B256::ZERO, 0, 1)[0];
        storage.store_block(&block).await.unwrap();
        storage.update_l1_head(block.hash).await.unwrap();
        storage.store_executed_batch(&batch_chain(1)[0], &[]).await.unwrap();
        EncryptionManager::new(
            Arc::new(PlainEnvelope),
            storage,
            Arc::new(evm),
            Arc::new(StandardGasOracle),
            EnclaveConfig::default(),
        )
    }

    fn call_from(from: Address) -> CallRequest {
        CallRequest { from: Some(from), ..Default::default() }
    }

    #[tokio::test]
    async fn test_estimate_converges_on_required_gas() {
        let evm = MockEvm { call_gas_required: 123_456, ..Default::default() };
        let manager = manager_with(evm).await;
        let req = UserRpcRequest {
            sender: Address::repeat_byte(1),
            params: EstimateGasParams {
                call: call_from(Address::repeat_byte(1)),
                block: BlockSpec::Latest,
            },
        };
        let estimate = manager.execute_estimate_gas(req).await.unwrap().unwrap();
        // Execution estimate plus a non-zero publication charge.
        assert!(estimate > 123_456);
        let publishing = estimate - 123_456;
        assert!(publishing >= 1);
    }

    #[tokio::test]
    async fn test_estimate_monotonicity_of_probes() {
        // If a probe succeeds at g, it succeeds at every g' >= g; the search
        // result is therefore the smallest sufficient limit.
        let required = 500_000u64;
        let evm = MockEvm { call_gas_required: required, ..Default::default() };
        let manager = manager_with(evm.clone()).await;
        let outcome = manager
            .do_estimate_gas(&call_from(Address::repeat_byte(1)), BlockSpec::Latest)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, required);
        for gas in [required, required + 1, required * 2] {
            let (failed, _) = manager
                .is_gas_enough(&call_from(Address::repeat_byte(1)), gas, BlockSpec::Latest)
                .await
                .unwrap()
                .unwrap();
            assert!(!failed);
        }
    }

    #[tokio::test]
    async fn test_revert_surfaces_code_3_with_data() {
        // ABI-encoded Error("bad").
        let revert_bytes = Bytes::from(alloy_primitives::hex!(
            "08c379a0"
            "0000000000000000000000000000000000000000000000000000000000000020"
            "0000000000000000000000000000000000000000000000000000000000000003"
            "6261640000000000000000000000000000000000000000000000000000000000"
        ).to_vec());
        let evm = MockEvm { revert_data: Some(revert_bytes.clone()), ..Default::default() };
        let manager = manager_with(evm).await;

        let req = UserRpcRequest {
            sender: Address::repeat_byte(1),
            params: EstimateGasParams {
                call: call_from(Address::repeat_byte(1)),
                block: BlockSpec::Latest,
            },
        };
        let err = manager.execute_estimate_gas(req).await.unwrap().unwrap_err();
        assert_eq!(err, UserError::Reverted { data: revert_bytes.clone() });

        let payload = RpcErrorPayload::from(&err);
        assert_eq!(payload.code, REVERT_ERROR_CODE);
        let data = payload.error_data.unwrap();
        assert_eq!(data, alloy_primitives::hex::encode_prefixed(&revert_bytes));
        assert!(data.contains("626164"), "revert data carries the ABI-encoded reason");
    }

    #[tokio::test]
    async fn test_cap_too_low_is_gas_exceeds_allowance() {
        let cap = EnclaveConfig::default().gas_estimation_cap;
        let evm = MockEvm { call_gas_required: cap + 1, ..Default::default() };
        let manager = manager_with(evm).await;
        let err = manager
            .do_estimate_gas(&call_from(Address::repeat_byte(1)), BlockSpec::Latest)
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(err, UserError::GasExceedsAllowance(cap));
    }

    #[tokio::test]
    async fn test_funds_constrain_the_allowance() {
        let from = Address::repeat_byte(1);
        let mut evm = MockEvm::default();
        evm.balances.insert(from, U256::from(10u64));
        let manager = manager_with(evm).await;

        let mut call = call_from(from);
        call.gas_price = Some(U256::from(1u64));
        call.value = Some(U256::from(10u64));
        let err = manager.do_estimate_gas(&call, BlockSpec::Latest).await.unwrap().unwrap_err();
        assert_eq!(err, UserError::InsufficientFunds);
    }

    #[tokio::test]
    async fn test_full_envelope_roundtrip_surfaces_revert() {
        use crate::{crypto::EnclaveKey, rpc::ViewingKey};
        use alloy_primitives::keccak256;

        let revert_bytes = Bytes::from(vec![0xde, 0xad]);
        let evm = MockEvm { revert_data: Some(revert_bytes.clone()), ..Default::default() };
        let manager = manager_with(evm).await;

        // A viewing key signed by the account the call claims to come from.
        let account_key = EnclaveKey::generate();
        let public_key = Bytes::from(vec![0x04; 33]);
        let mut preimage = Vec::new();
        preimage.extend_from_slice(account_key.address().as_slice());
        preimage.extend_from_slice(&public_key);
        let vk = ViewingKey {
            account: account_key.address(),
            public_key: public_key.clone(),
            signature: account_key.sign(keccak256(preimage)).unwrap(),
            signature_type: 0,
        };

        let request = serde_json::to_vec(&vec![
            serde_json::to_value(&vk).unwrap(),
            serde_json::json!({ "from": account_key.address() }),
        ])
        .unwrap();

        let response = manager.estimate_gas(&request).await.unwrap();
        let crate::rpc::EnclaveResponse::Encrypted(payload) = response else {
            panic!("expected an encrypted error");
        };
        let err: RpcErrorPayload = serde_json::from_slice(&payload).unwrap();
        assert_eq!(err.code, REVERT_ERROR_CODE);
        assert_eq!(err.error_data.unwrap(), alloy_primitives::hex::encode_prefixed(&revert_bytes));
    }

    #[tokio::test]
    async fn test_conflicting_fee_fields_rejected() {
        let mut call = call_from(Address::repeat_byte(1));
        call.gas_price = Some(U256::from(1u64));
        call.max_fee_per_gas = Some(U256::from(1u64));
        let manager = manager_with(MockEvm::default()).await;
        let err = manager.do_estimate_gas(&call, BlockSpec::Latest).await.unwrap().unwrap_err();
        assert!(matches!(err, UserError::InvalidParams(_)));
    }
}
