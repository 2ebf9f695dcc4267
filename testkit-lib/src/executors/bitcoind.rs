//! bitcoind JSON-RPC client.
//!
//! Implements [`ChainControl`] with JSON-RPC 1.0 calls. Amounts cross the RPC
//! boundary as decimal BTC and are converted to satoshis exactly.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "http-executor")]
use std::time::Duration;

use super::config::{BitcoindConfig, RpcEndpoint};
use crate::chain::ChainControl;
use crate::link::{btc_to_sat, sat_to_btc};
use crate::{Result, TestkitError};

/// bitcoind reached over JSON-RPC.
pub struct BitcoindRpc {
    config: BitcoindConfig,
    endpoint: RpcEndpoint,
    next_id: AtomicU64,
    #[cfg(feature = "http-executor")]
    client: reqwest::Client,
}

impl BitcoindRpc {
    /// Create a client for the bitcoind described by `config`.
    pub fn new(config: BitcoindConfig) -> Result<Self> {
        let endpoint = config.endpoint()?;

        #[cfg(feature = "http-executor")]
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TestkitError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            endpoint,
            next_id: AtomicU64::new(0),
            #[cfg(feature = "http-executor")]
            client,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &BitcoindConfig {
        &self.config
    }

    /// URL requests are sent to.
    pub fn url(&self) -> &str {
        &self.endpoint.url
    }

    /// Call `method` with positional `params`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let request = RpcRequest {
            jsonrpc: "1.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let (status, body) = self.send(&request).await?;
        decode_response(method, status, &body)
    }

    #[cfg(feature = "http-executor")]
    async fn send(&self, request: &RpcRequest<'_>) -> Result<(u16, String)> {
        let mut builder = self.client.post(&self.endpoint.url).json(request);
        if let Some((user, password)) = &self.endpoint.credentials {
            builder = builder.basic_auth(user, Some(password));
        }

        let response = builder.send().await.map_err(|e| self.map_reqwest_error(e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.map_reqwest_error(e))?;
        Ok((status, body))
    }

    #[cfg(not(feature = "http-executor"))]
    async fn send(&self, _request: &RpcRequest<'_>) -> Result<(u16, String)> {
        Err(TestkitError::Transport(
            "bitcoind HTTP client not compiled - enable the 'http-executor' feature".to_string(),
        ))
    }

    #[cfg(feature = "http-executor")]
    fn map_reqwest_error(&self, e: reqwest::Error) -> TestkitError {
        if e.is_timeout() {
            TestkitError::Timeout {
                operation: "bitcoind request".to_string(),
                waited_ms: self.config.timeout_secs * 1000,
            }
        } else if e.is_connect() {
            TestkitError::ConnectionFailed {
                target: self.endpoint.host_port.clone(),
                reason: e.to_string(),
            }
        } else {
            TestkitError::Transport(format!("bitcoind request failed: {}", e))
        }
    }
}

/// bitcoind answers RPC errors with HTTP 500 and a regular error body, so the
/// body is inspected before the status.
fn decode_response<T: DeserializeOwned>(method: &str, status: u16, body: &str) -> Result<T> {
    let response: RpcResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(_) if !(200..300).contains(&status) => {
            let text = body.trim();
            return Err(TestkitError::remote_status(
                method,
                i64::from(status),
                (!text.is_empty()).then(|| text.to_string()),
            ));
        }
        Err(e) => {
            return Err(TestkitError::Serialization(format!(
                "invalid bitcoind response to {}: {}",
                method, e
            )))
        }
    };

    if let Some(error) = response.error {
        return Err(TestkitError::remote_status(method, error.code, Some(error.message)));
    }
    if !(200..300).contains(&status) {
        return Err(TestkitError::remote_status(method, i64::from(status), None));
    }

    serde_json::from_value(response.result).map_err(|e| {
        TestkitError::Serialization(format!("unexpected result of {}: {}", method, e))
    })
}

/// Satoshis in a BTC amount as returned by bitcoind.
///
/// Small amounts come back from the JSON parser in exponent notation.
fn sat_from_value(field: &str, value: &Value) -> Result<u64> {
    if !value.is_number() {
        return Err(TestkitError::invalid_data(field, format!("{} is not an amount", value)));
    }
    let mut text = value.to_string();
    if text.contains(['e', 'E']) {
        text = Decimal::from_scientific(&text)
            .map_err(|e| TestkitError::invalid_data(field, e.to_string()))?
            .normalize()
            .to_string();
    }
    btc_to_sat(&text).map_err(|e| TestkitError::invalid_data(field, e.to_string()))
}

#[async_trait]
impl ChainControl for BitcoindRpc {
    async fn list_wallets(&self) -> Result<Vec<String>> {
        self.call("listwallets", json!([])).await
    }

    async fn create_wallet(&self, name: &str) -> Result<()> {
        let _: Value = self.call("createwallet", json!([name])).await?;
        Ok(())
    }

    async fn block_height(&self) -> Result<u64> {
        let info: BlockchainInfo = self.call("getblockchaininfo", json!([])).await?;
        Ok(info.blocks)
    }

    async fn mempool_size(&self) -> Result<u64> {
        let info: MempoolInfo = self.call("getmempoolinfo", json!([])).await?;
        Ok(info.size)
    }

    async fn new_address(&self) -> Result<String> {
        self.call("getnewaddress", json!([])).await
    }

    async fn generate_to_address(&self, count: u64, address: &str) -> Result<Vec<String>> {
        self.call("generatetoaddress", json!([count, address])).await
    }

    async fn balance_sat(&self) -> Result<u64> {
        let balance: Value = self.call("getbalance", json!([])).await?;
        sat_from_value("getbalance", &balance)
    }

    async fn send_to_address(&self, address: &str, amount_sat: u64) -> Result<String> {
        // bitcoind accepts amounts as strings, which keeps them exact
        self.call("sendtoaddress", json!([address, sat_to_btc(amount_sat)]))
            .await
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct BlockchainInfo {
    blocks: u64,
}

#[derive(Deserialize)]
struct MempoolInfo {
    size: u64,
}
