use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stakebridge_http::{HttpClient, HttpError};
use tracing::debug;

use crate::amount::SCALE;
use crate::error::{Result, SdkError};
use crate::transaction::{DecodedOutput, DecodedTransaction};

/// The blockchain node as consumed by the bridge. Confirmation lookups run
/// against the ledger mirror, not the node, so the surface here is small.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Decode a raw transaction hex into its on-chain structure. A node-side
    /// decode failure (malformed hex) is an `SdkError::Rpc`.
    async fn decode_raw_transaction(&self, raw_tx: &str) -> Result<DecodedTransaction>;

    /// Verify a signed message against an address.
    async fn verify_message(&self, address: &str, signature: &str, message: &str) -> Result<bool>;
}

/// JSON-RPC 1.0 client for a Bitcoin-family node.
pub struct RpcClient {
    http: HttpClient,
    url: String,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'a str,
    id: &'a str,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl RpcClient {
    pub fn new(http: HttpClient, url: &str) -> Self {
        Self {
            http,
            url: url.to_string(),
        }
    }

    // Nodes answer failed method calls with a non-2xx status carrying a
    // JSON-RPC error body, so the body is parsed before the status is judged.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = RpcRequest {
            jsonrpc: "1.0",
            id: "stakebridge",
            method,
            params,
        };
        let response = self.http.post(&self.url, &request).await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SdkError::Decode(format!("RPC response read failed: {}", e)))?;

        let parsed: RpcResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(SdkError::Http(HttpError::Status {
                    status: status.as_u16(),
                    body,
                }))
            }
            Err(e) => return Err(SdkError::Decode(format!("RPC response parse failed: {}", e))),
        };

        if let Some(error) = parsed.error {
            return Err(SdkError::Rpc(format!(
                "{} (code {})",
                error.message, error.code
            )));
        }
        parsed
            .result
            .ok_or_else(|| SdkError::Rpc(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl ChainRpc for RpcClient {
    async fn decode_raw_transaction(&self, raw_tx: &str) -> Result<DecodedTransaction> {
        let result = self.call("decoderawtransaction", json!([raw_tx])).await?;
        let decoded = parse_decoded(&result)?;
        debug!(
            "Decoded transaction {} with {} outputs",
            decoded.txid,
            decoded.outputs.len()
        );
        Ok(decoded)
    }

    async fn verify_message(&self, address: &str, signature: &str, message: &str) -> Result<bool> {
        let result = self
            .call("verifymessage", json!([address, signature, message]))
            .await?;
        result
            .as_bool()
            .ok_or_else(|| SdkError::Decode("verifymessage returned a non-boolean".into()))
    }
}

fn parse_decoded(value: &Value) -> Result<DecodedTransaction> {
    let txid = value
        .get("txid")
        .and_then(Value::as_str)
        .ok_or_else(|| SdkError::Decode("decoded transaction missing txid".into()))?;

    let vouts = value
        .get("vout")
        .and_then(Value::as_array)
        .map(|outputs| outputs.as_slice())
        .unwrap_or(&[]);

    let mut outputs = Vec::with_capacity(vouts.len());
    for vout in vouts {
        let amount = vout
            .get("value")
            .ok_or_else(|| SdkError::Decode("output missing value".into()))
            .and_then(decimal_from_json)?;
        outputs.push(DecodedOutput {
            address: output_address(vout),
            amount,
        });
    }

    Ok(DecodedTransaction {
        txid: txid.to_string(),
        outputs,
    })
}

// Older nodes report `scriptPubKey.addresses: [..]`, newer ones a single
// `scriptPubKey.address`.
fn output_address(vout: &Value) -> Option<String> {
    let script = vout.get("scriptPubKey")?;
    if let Some(address) = script.get("address").and_then(Value::as_str) {
        return Some(address.to_string());
    }
    script
        .get("addresses")
        .and_then(Value::as_array)
        .and_then(|addresses| addresses.first())
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn decimal_from_json(value: &Value) -> Result<Decimal> {
    let number = value
        .as_number()
        .ok_or_else(|| SdkError::Decode(format!("expected numeric amount, got {}", value)))?;
    let parsed = Decimal::from_str(&number.to_string())
        .map_err(|e| SdkError::Decode(format!("unrepresentable amount {}: {}", number, e)))?;
    Ok(parsed.round_dp(SCALE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_decoded_transaction_with_both_address_forms() {
        let value = json!({
            "txid": "aa".repeat(32),
            "vout": [
                { "value": 150.0, "n": 0, "scriptPubKey": { "addresses": ["dCustomer1"] } },
                { "value": 0.5, "n": 1, "scriptPubKey": { "address": "dChange" } },
                { "value": 0.0, "n": 2, "scriptPubKey": { "type": "nulldata" } }
            ]
        });
        let decoded = parse_decoded(&value).unwrap();
        assert_eq!(decoded.txid, "aa".repeat(32));
        assert_eq!(decoded.outputs.len(), 3);
        assert_eq!(decoded.outputs[0].address.as_deref(), Some("dCustomer1"));
        assert_eq!(decoded.outputs[0].amount, dec!(150));
        assert_eq!(decoded.outputs[1].address.as_deref(), Some("dChange"));
        assert_eq!(decoded.outputs[2].address, None);
    }

    #[test]
    fn rejects_decoded_transaction_without_txid() {
        assert!(parse_decoded(&json!({ "vout": [] })).is_err());
    }

    #[test]
    fn json_amounts_keep_eight_decimal_precision() {
        assert_eq!(decimal_from_json(&json!(0.1)).unwrap(), dec!(0.1));
        assert_eq!(
            decimal_from_json(&json!(24.99999999)).unwrap(),
            dec!(24.99999999)
        );
        assert!(decimal_from_json(&json!("150")).is_err());
    }
}
