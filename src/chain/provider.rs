//! Starknet JSON-RPC provider over HTTP

use super::{BlockId, ChainClient, FeeEstimate, TransactionStatus};
use crate::config::ChainConfig;
use crate::error::ChainError;
use crate::tx::TransactionEnvelope;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use starknet_types_core::felt::Felt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// JSON-RPC client for a single Starknet node.
///
/// Requests are never retried or failed over: a broadcast that errors may
/// still have reached the node, so recovery is left to the caller.
pub struct ChainProvider {
    /// HTTP client with the request timeout applied
    http: reqwest::Client,
    url: url::Url,
    /// JSON-RPC request id counter
    next_id: AtomicU64,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "R: Deserialize<'de>"))]
struct JsonRpcResponse<R> {
    #[serde(default)]
    result: Option<R>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl From<JsonRpcErrorObject> for ChainError {
    fn from(err: JsonRpcErrorObject) -> Self {
        let data = err.data.map(|d| match d {
            Value::String(s) => s,
            other => other.to_string(),
        });
        ChainError::Rpc {
            code: err.code,
            message: err.message,
            data,
        }
    }
}

/// INVOKE v1 transaction as carried by `starknet_estimateFee` and
/// `starknet_addInvokeTransaction`
#[derive(Debug, Serialize)]
struct BroadcastedInvokeV1<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    sender_address: Felt,
    calldata: &'a [Felt],
    max_fee: Felt,
    version: Felt,
    signature: Vec<Felt>,
    nonce: Felt,
}

impl<'a> From<&'a TransactionEnvelope> for BroadcastedInvokeV1<'a> {
    fn from(envelope: &'a TransactionEnvelope) -> Self {
        Self {
            kind: "INVOKE",
            sender_address: envelope.sender_address(),
            calldata: envelope.calldata(),
            max_fee: Felt::from(envelope.max_fee()),
            version: envelope.version(),
            signature: envelope.signature().to_vec(),
            nonce: envelope.nonce(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AddInvokeResult {
    transaction_hash: Felt,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: ChainConfig) -> Result<Self, ChainError> {
        let url: url::Url = config
            .rpc_url
            .parse()
            .map_err(|e| {
                ChainError::Transport(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        debug!("Created JSON-RPC provider for {} ({})", config.chain_id, url);

        Ok(Self {
            http,
            url,
            next_id: AtomicU64::new(1),
        })
    }

    /// Perform one JSON-RPC call
    async fn request<P, R>(&self, method: &str, params: P) -> Result<R, ChainError>
    where
        P: Serialize + Send,
        R: DeserializeOwned + Send,
    {
        let body = encode_request(self.next_id.fetch_add(1, Ordering::Relaxed), method, params);

        let response = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChainError::Timeout {
                        operation: method.to_string(),
                    }
                } else {
                    ChainError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        match decode_response(&text) {
            Err(ChainError::Decode(reason)) if !status.is_success() => {
                warn!("{} returned HTTP {}: {}", method, status, reason);
                Err(ChainError::Transport(format!("HTTP {} from node", status)))
            }
            other => other,
        }
    }
}

fn encode_request<P: Serialize>(id: u64, method: &str, params: P) -> JsonRpcRequest<'_, P> {
    JsonRpcRequest {
        jsonrpc: "2.0",
        id,
        method,
        params,
    }
}

fn decode_response<R: DeserializeOwned>(text: &str) -> Result<R, ChainError> {
    let response: JsonRpcResponse<R> =
        serde_json::from_str(text).map_err(|e| ChainError::Decode(e.to_string()))?;

    if let Some(err) = response.error {
        return Err(err.into());
    }

    response
        .result
        .ok_or_else(|| ChainError::Decode("response carries neither result nor error".to_string()))
}

#[async_trait]
impl ChainClient for ChainProvider {
    async fn get_nonce(&self, block: BlockId, account: Felt) -> Result<Felt, ChainError> {
        self.request(
            "starknet_getNonce",
            serde_json::json!({
                "block_id": block,
                "contract_address": account,
            }),
        )
        .await
    }

    async fn estimate_fee(
        &self,
        envelope: &TransactionEnvelope,
        block: BlockId,
    ) -> Result<FeeEstimate, ChainError> {
        let estimates: Vec<FeeEstimate> = self
            .request(
                "starknet_estimateFee",
                serde_json::json!({
                    "request": [BroadcastedInvokeV1::from(envelope)],
                    "simulation_flags": [],
                    "block_id": block,
                }),
            )
            .await?;

        estimates
            .into_iter()
            .next()
            .ok_or_else(|| ChainError::Decode("empty fee estimate list".to_string()))
    }

    async fn broadcast(&self, envelope: &TransactionEnvelope) -> Result<Felt, ChainError> {
        let result: AddInvokeResult = self
            .request(
                "starknet_addInvokeTransaction",
                serde_json::json!({
                    "invoke_transaction": BroadcastedInvokeV1::from(envelope),
                }),
            )
            .await?;

        Ok(result.transaction_hash)
    }

    async fn get_status(&self, transaction_hash: Felt) -> Result<TransactionStatus, ChainError> {
        self.request(
            "starknet_getTransactionStatus",
            serde_json::json!({ "transaction_hash": transaction_hash }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Signature;
    use crate::chain::FinalityStatus;
    use serde_json::json;

    fn envelope() -> TransactionEnvelope {
        TransactionEnvelope::new_signed(
            Felt::from(3u64),
            Felt::from_hex_unchecked("0x1234"),
            100,
            vec![Felt::ONE, Felt::from(2u64)],
            Signature {
                r: Felt::from(10u64),
                s: Felt::from(11u64),
            },
        )
    }

    #[test]
    fn test_request_envelope() {
        let body = encode_request(
            7,
            "starknet_getNonce",
            json!({"block_id": BlockId::Latest, "contract_address": Felt::from(255u64)}),
        );
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "starknet_getNonce",
                "params": {"block_id": "latest", "contract_address": "0xff"}
            })
        );
    }

    #[test]
    fn test_invoke_transaction_wire_format() {
        let envelope = envelope();
        let value = serde_json::to_value(BroadcastedInvokeV1::from(&envelope)).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "INVOKE",
                "sender_address": "0x1234",
                "calldata": ["0x1", "0x2"],
                "max_fee": "0x64",
                "version": "0x1",
                "signature": ["0xa", "0xb"],
                "nonce": "0x3"
            })
        );
    }

    #[test]
    fn test_decode_result() {
        let nonce: Felt = decode_response(r#"{"jsonrpc":"2.0","id":1,"result":"0x5"}"#).unwrap();
        assert_eq!(nonce, Felt::from(5u64));

        let status: TransactionStatus = decode_response(
            r#"{"jsonrpc":"2.0","id":2,"result":{"finality_status":"ACCEPTED_ON_L2","execution_status":"SUCCEEDED"}}"#,
        )
        .unwrap();
        assert_eq!(status.finality_status, FinalityStatus::AcceptedOnL2);
    }

    #[test]
    fn test_decode_rpc_error() {
        let err = decode_response::<Felt>(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":55,"message":"Account validation failed","data":"Invalid signature"}}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ChainError::Rpc {
                code: 55,
                message: "Account validation failed".to_string(),
                data: Some("Invalid signature".to_string()),
            }
        );
    }

    #[test]
    fn test_decode_structured_error_data() {
        let err = decode_response::<Felt>(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":41,"message":"Transaction execution error","data":{"transaction_index":0}}}"#,
        )
        .unwrap_err();
        match err {
            ChainError::Rpc { code, data, .. } => {
                assert_eq!(code, 41);
                assert_eq!(data.as_deref(), Some(r#"{"transaction_index":0}"#));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode_response::<Felt>("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, ChainError::Decode(_)));

        let err = decode_response::<Felt>(r#"{"jsonrpc":"2.0","id":1}"#).unwrap_err();
        assert!(matches!(err, ChainError::Decode(_)));
    }

    #[test]
    fn test_rejects_invalid_url() {
        let config = ChainConfig {
            rpc_url: "not a url".to_string(),
            chain_id: "SN_SEPOLIA".to_string(),
            request_timeout_ms: 1000,
        };
        assert!(matches!(
            ChainProvider::new(config),
            Err(ChainError::Transport(_))
        ));
    }
}
