//! Parameter extraction for the `estimateGas` RPC method.

use crate::{
    errors::UserError,
    rpc::UserRpcRequest,
    traits::{BlockSpec, CallRequest},
};
use alloy_primitives::{Address, Bytes, U256};
use serde_json::Value;

/// The decoded parameters of an `estimateGas` request: the call message and
/// an optional block anchor.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EstimateGasParams {
    /// The call to estimate.
    pub call: CallRequest,
    /// The block to estimate against. Defaults to the latest batch.
    pub block: BlockSpec,
}

/// The JSON wire form of a call message.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallRequestJson {
    from: Option<Address>,
    to: Option<Address>,
    #[serde(default, with = "alloy_serde::quantity::opt")]
    gas: Option<u64>,
    gas_price: Option<U256>,
    max_fee_per_gas: Option<U256>,
    max_priority_fee_per_gas: Option<U256>,
    value: Option<U256>,
    #[serde(default, alias = "input")]
    data: Option<Bytes>,
}

/// Extracts the call message and optional block number from the raw request
/// parameters. The `from` address is mandatory: without it the response
/// could not be attributed to a viewing key.
pub fn extract_estimate_gas_request(
    params: &[Value],
) -> Result<UserRpcRequest<EstimateGasParams>, UserError> {
    // Parameters are [call message, block number (optional)].
    let call_value = params
        .first()
        .ok_or_else(|| UserError::InvalidParams("unexpected number of parameters".to_string()))?;
    let decoded: CallRequestJson = serde_json::from_value(call_value.clone())
        .map_err(|e| UserError::InvalidParams(format!("unable to decode call params - {e}")))?;

    let from = decoded
        .from
        .ok_or_else(|| UserError::InvalidParams("no from address provided".to_string()))?;

    let call = CallRequest {
        from: Some(from),
        to: decoded.to,
        gas: decoded.gas,
        gas_price: decoded.gas_price,
        max_fee_per_gas: decoded.max_fee_per_gas,
        max_priority_fee_per_gas: decoded.max_priority_fee_per_gas,
        value: decoded.value,
        data: decoded.data.unwrap_or_default(),
    };
    let block = extract_optional_block_number(params, 1)?;

    Ok(UserRpcRequest { sender: from, params: EstimateGasParams { call, block } })
}

/// Extracts an optional block number at `index`, defaulting to the latest
/// batch.
fn extract_optional_block_number(params: &[Value], index: usize) -> Result<BlockSpec, UserError> {
    let Some(value) = params.get(index) else {
        return Ok(BlockSpec::Latest);
    };
    match value {
        Value::Null => Ok(BlockSpec::Latest),
        Value::String(tag) if tag == "latest" || tag == "pending" || tag == "safe" => {
            Ok(BlockSpec::Latest)
        }
        Value::String(number) => {
            let number = number.strip_prefix("0x").ok_or_else(|| {
                UserError::InvalidParams(format!("unable to extract requested block number - {number}"))
            })?;
            u64::from_str_radix(number, 16)
                .map(BlockSpec::Number)
                .map_err(|e| UserError::InvalidParams(format!("unable to extract requested block number - {e}")))
        }
        other => Err(UserError::InvalidParams(format!(
            "unable to extract requested block number - {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_call_and_block() {
        let params = vec![
            json!({
                "from": "0x1111111111111111111111111111111111111111",
                "to": "0x2222222222222222222222222222222222222222",
                "gas": "0x5208",
                "value": "0x1",
                "data": "0xdeadbeef",
            }),
            json!("0x10"),
        ];
        let request = extract_estimate_gas_request(&params).unwrap();
        assert_eq!(request.sender, Address::repeat_byte(0x11));
        assert_eq!(request.params.call.gas, Some(21_000));
        assert_eq!(request.params.call.value, Some(U256::from(1u64)));
        assert_eq!(request.params.block, BlockSpec::Number(16));
    }

    #[test]
    fn test_from_is_mandatory() {
        let params = vec![json!({"to": "0x2222222222222222222222222222222222222222"})];
        let err = extract_estimate_gas_request(&params).unwrap_err();
        assert!(matches!(err, UserError::InvalidParams(msg) if msg.contains("from")));
    }

    #[test]
    fn test_block_defaults_to_latest() {
        let params = vec![json!({"from": "0x1111111111111111111111111111111111111111"})];
        let request = extract_estimate_gas_request(&params).unwrap();
        assert_eq!(request.params.block, BlockSpec::Latest);

        let params = vec![
            json!({"from": "0x1111111111111111111111111111111111111111"}),
            json!("latest"),
        ];
        assert_eq!(extract_estimate_gas_request(&params).unwrap().params.block, BlockSpec::Latest);
    }

    #[test]
    fn test_input_alias_for_data() {
        let params = vec![json!({
            "from": "0x1111111111111111111111111111111111111111",
            "input": "0xbeef",
        })];
        let request = extract_estimate_gas_request(&params).unwrap();
        assert_eq!(request.params.call.data, Bytes::from(vec![0xbe, 0xef]));
    }
}
