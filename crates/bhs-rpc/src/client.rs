//! JSON-RPC 2.0 over HTTP.
//!
//! Transient transport failures (connect, timeout, dropped connection) are
//! retried a few times with a short linear backoff. Everything else is
//! returned to the caller as a typed [`RpcError`] so adapters can tell a
//! reverted call apart from an unreachable node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

const MAX_ATTEMPTS: u64 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum RpcError {
    /// The request never produced an HTTP response.
    Transport(String),
    /// Non-2xx HTTP status.
    Http { status: u16, body: String },
    /// The node answered with a JSON-RPC error object.
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    /// The response (or a field in it) could not be decoded.
    Decode(String),
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Transport(e) => write!(f, "transport error: {e}"),
            RpcError::Http { status, body } => write!(f, "HTTP {status}: {body}"),
            RpcError::Rpc { code, message, .. } => write!(f, "RPC error {code}: {message}"),
            RpcError::Decode(e) => write!(f, "decode error: {e}"),
        }
    }
}

impl std::error::Error for RpcError {}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Block reference for log filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Number(u64),
    Latest,
}

impl Serialize for BlockTag {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            BlockTag::Number(n) => s.serialize_str(&to_quantity(*n)),
            BlockTag::Latest => s.serialize_str("latest"),
        }
    }
}

/// `eth_getLogs` filter for a single contract and a single event topic.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub address: String,
    pub from_block: BlockTag,
    pub to_block: BlockTag,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    /// `None` for pending logs.
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

/// `eth_sendTransaction` payload. The node signs with `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRequest {
    pub from: String,
    pub to: String,
    pub gas: String,
    pub data: String,
}

#[derive(Clone, Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
        };

        let mut attempt = 0;
        let text = loop {
            attempt += 1;
            match self.send_once(&request).await {
                Ok(text) => break text,
                Err(SendError::Transient(e)) if attempt < MAX_ATTEMPTS => {
                    warn!(method, attempt, error = %e, "transient RPC transport error; retrying");
                    tokio::time::sleep(Duration::from_millis(50 * attempt)).await;
                }
                Err(SendError::Transient(e)) | Err(SendError::Fatal(e)) => return Err(e),
            }
        };

        let response: JsonRpcResponse = serde_json::from_str(&text)
            .map_err(|e| RpcError::Decode(format!("{method}: invalid JSON-RPC response: {e}")))?;

        if let Some(err) = response.error {
            debug!(method, code = err.code, message = %err.message, "RPC error response");
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn send_once(&self, request: &JsonRpcRequest<'_>) -> Result<String, SendError> {
        let response = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(SendError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Fatal(RpcError::Http {
                status: status.as_u16(),
                body,
            }));
        }
        response.text().await.map_err(SendError::from_reqwest)
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let v = self.call("eth_blockNumber", json!([])).await?;
        parse_quantity_value(&v)
    }

    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        let v = self.call("eth_chainId", json!([])).await?;
        parse_quantity_value(&v)
    }

    /// Read-only call against the latest block. Returns the raw `0x` data.
    pub async fn eth_call(&self, to: &str, data: &str) -> Result<String, RpcError> {
        let v = self
            .call("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?;
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::Decode(format!("eth_call: expected hex string, got {v}")))
    }

    pub async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, RpcError> {
        let v = self.call("eth_getLogs", json!([filter])).await?;
        serde_json::from_value(v).map_err(|e| RpcError::Decode(format!("eth_getLogs: {e}")))
    }

    /// Returns the transaction hash.
    pub async fn send_transaction(&self, tx: &TransactionRequest) -> Result<String, RpcError> {
        let v = self.call("eth_sendTransaction", json!([tx])).await?;
        v.as_str().map(str::to_string).ok_or_else(|| {
            RpcError::Decode(format!("eth_sendTransaction: expected tx hash, got {v}"))
        })
    }
}

enum SendError {
    Transient(RpcError),
    Fatal(RpcError),
}

impl SendError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        let transient = err.is_connect() || err.is_timeout() || {
            let msg = err.to_string().to_lowercase();
            msg.contains("connection closed")
                || msg.contains("connection reset")
                || msg.contains("broken pipe")
                || msg.contains("unexpected eof")
        };
        let e = RpcError::Transport(err.to_string());
        if transient {
            SendError::Transient(e)
        } else {
            SendError::Fatal(e)
        }
    }
}

/// Parse a JSON-RPC hex quantity (`"0x1a"`).
pub fn parse_quantity(s: &str) -> Result<u64, RpcError> {
    let body = s
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Decode(format!("quantity missing 0x prefix: {s}")))?;
    if body.is_empty() {
        return Err(RpcError::Decode("empty quantity".to_string()));
    }
    u64::from_str_radix(body, 16).map_err(|e| RpcError::Decode(format!("bad quantity {s}: {e}")))
}

pub fn to_quantity(n: u64) -> String {
    format!("0x{n:x}")
}

fn parse_quantity_value(v: &Value) -> Result<u64, RpcError> {
    match v.as_str() {
        Some(s) => parse_quantity(s),
        None => Err(RpcError::Decode(format!("expected hex quantity, got {v}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert!(parse_quantity("1a").is_err());
        assert!(parse_quantity("0x").is_err());
        assert_eq!(to_quantity(255), "0xff");
    }

    #[test]
    fn log_filter_serializes_block_tags() {
        let f = LogFilter {
            address: "0xabc".to_string(),
            from_block: BlockTag::Number(16),
            to_block: BlockTag::Latest,
            topics: vec!["0x01".to_string()],
        };
        assert_eq!(
            serde_json::to_value(&f).unwrap(),
            json!({"address": "0xabc", "fromBlock": "0x10", "toBlock": "latest", "topics": ["0x01"]})
        );
    }

    #[test]
    fn rpc_error_display() {
        let e = RpcError::Rpc {
            code: -32000,
            message: "execution reverted".to_string(),
            data: None,
        };
        assert_eq!(e.to_string(), "RPC error -32000: execution reverted");
    }
}
