//! LND REST API client.
//!
//! Implements [`LightningNode`] on top of the REST gateway of an LND node.

use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "http-executor")]
use std::time::Duration;

use super::config::LndConfig;
use crate::lightning::{Channel, ChannelPolicy, LightningNode, P2PAddress, ParsedInvoice};
use crate::wait::WaitConfig;
use crate::{Result, TestkitError};

/// Header LND reads the macaroon from.
pub const MACAROON_HEADER: &str = "Grpc-Metadata-macaroon";

/// LND node reached over REST.
pub struct LndRestNode {
    config: LndConfig,
    wait: WaitConfig,
    initialized: AtomicBool,
    #[cfg(feature = "http-executor")]
    client: reqwest::Client,
}

impl LndRestNode {
    /// Create a client for the node described by `config`.
    ///
    /// `wait` governs how long [`LightningNode::wait_init`] and the graph sync
    /// before opening channels may take.
    pub fn new(config: LndConfig, wait: WaitConfig) -> Result<Self> {
        if config.rest_url.is_empty() {
            return Err(TestkitError::invalid_data(
                "rest_url",
                "REST URL cannot be empty",
            ));
        }
        if config.macaroon_hex.is_empty() {
            return Err(TestkitError::invalid_data(
                "macaroon_hex",
                "Macaroon cannot be empty",
            ));
        }

        Ok(Self {
            #[cfg(feature = "http-executor")]
            client: build_client(&config)?,
            config,
            wait,
            initialized: AtomicBool::new(false),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &LndConfig {
        &self.config
    }

    /// Build the full URL for an API endpoint.
    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.rest_url.trim_end_matches('/'), path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request("GET", path, Option::<&()>::None).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<T> {
        self.request("POST", path, Some(body)).await
    }

    #[cfg(feature = "http-executor")]
    async fn request<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        method: &str,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let url = self.url(path);
        let mut request = match method {
            "POST" => self.client.post(&url),
            _ => self.client.get(&url),
        }
        .header(MACAROON_HEADER, &self.config.macaroon_hex);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.map_reqwest_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_reqwest_error(e))?;

        if status != reqwest::StatusCode::OK {
            return Err(TestkitError::remote_status(
                rpc_method(path),
                i64::from(status.as_u16()),
                error_message(&text),
            ));
        }

        serde_json::from_str(&text).map_err(|e| {
            TestkitError::Serialization(format!("invalid LND response to {}: {}", rpc_method(path), e))
        })
    }

    #[cfg(not(feature = "http-executor"))]
    async fn request<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        _method: &str,
        path: &str,
        _body: Option<&B>,
    ) -> Result<T> {
        let _ = self.url(path);
        Err(TestkitError::Transport(
            "LND HTTP client not compiled - enable the 'http-executor' feature".to_string(),
        ))
    }

    #[cfg(feature = "http-executor")]
    fn map_reqwest_error(&self, e: reqwest::Error) -> TestkitError {
        if e.is_timeout() {
            TestkitError::Timeout {
                operation: "LND request".to_string(),
                waited_ms: self.config.timeout_secs * 1000,
            }
        } else if e.is_connect() {
            TestkitError::ConnectionFailed {
                target: self.config.rest_url.clone(),
                reason: e.to_string(),
            }
        } else {
            TestkitError::Transport(format!("LND request failed: {}", e))
        }
    }

    async fn info(&self) -> Result<GetInfoResponse> {
        self.get("getinfo").await
    }
}

#[cfg(feature = "http-executor")]
fn build_client(config: &LndConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));

    if let Some(path) = &config.tls_cert_path {
        let pem = std::fs::read(path)
            .map_err(|e| TestkitError::Io(format!("reading {}: {}", path.display(), e)))?;
        let cert = reqwest::Certificate::from_pem(&pem)
            .map_err(|e| TestkitError::invalid_data("tls_cert_path", e.to_string()))?;
        builder = builder.add_root_certificate(cert);
    }
    if config.accept_invalid_certs {
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| TestkitError::Transport(format!("Failed to build HTTP client: {}", e)))
}

/// Endpoint name used in errors: the path without query string.
fn rpc_method(path: &str) -> &str {
    path.split('?').next().unwrap_or(path)
}

/// The `error` (or `message`) field of an LND error body.
#[cfg_attr(not(feature = "http-executor"), allow(dead_code))]
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "message"]
        .iter()
        .find_map(|key| value.get(key)?.as_str().map(str::to_string))
}

fn is_loopback(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host == "localhost"
        || host
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
}

/// Pick the address peers should use to reach the node.
fn select_p2p_address(info: &GetInfoResponse, fallback_port: Option<u16>) -> Result<P2PAddress> {
    let uris: Vec<P2PAddress> = info.uris.iter().filter_map(|uri| uri.parse().ok()).collect();
    if let Some(address) = uris
        .iter()
        .find(|address| is_loopback(&address.host))
        .or_else(|| uris.first())
    {
        return Ok(address.clone());
    }

    match fallback_port {
        Some(port) => Ok(P2PAddress::new(&info.identity_pubkey, "127.0.0.1", port)),
        None => Err(TestkitError::invalid_data(
            "uris",
            "node advertises no P2P address and no P2P port is configured",
        )),
    }
}

/// Funding txid from the base64 `funding_txid_bytes` field.
///
/// LND sends the hash in internal byte order, RPCs display it reversed.
fn txid_from_bytes(encoded: &str) -> Result<String> {
    let mut bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| TestkitError::invalid_data("funding_txid_bytes", e.to_string()))?;
    bytes.reverse();
    Ok(hex::encode(bytes))
}

fn channel_from_point(point: ChannelPointResponse) -> Result<Channel> {
    let txid = match (point.funding_txid_str, point.funding_txid_bytes) {
        (Some(txid), _) if !txid.is_empty() => txid,
        (_, Some(bytes)) if !bytes.is_empty() => txid_from_bytes(&bytes)?,
        _ => {
            return Err(TestkitError::invalid_data(
                "funding_txid",
                "LND returned a channel point without txid",
            ))
        }
    };
    Ok(Channel::new(txid, point.output_index))
}

#[async_trait]
impl LightningNode for LndRestNode {
    async fn p2p_address(&self) -> Result<P2PAddress> {
        let info = self.info().await?;
        select_p2p_address(&info, self.config.p2p_port)
    }

    async fn identity(&self) -> Result<String> {
        Ok(self.info().await?.identity_pubkey)
    }

    #[tracing::instrument(skip(self), fields(node = %self.config.rest_url))]
    async fn open_channel(
        &self,
        peer: &P2PAddress,
        capacity_sat: u64,
        push_sat: u64,
        private: bool,
    ) -> Result<Channel> {
        let connect = ConnectPeerRequest {
            addr: LightningAddress {
                pubkey: peer.identity.clone(),
                host: peer.host_port(),
            },
            perm: false,
        };
        match self.post::<serde_json::Value, _>("peers", &connect).await {
            Ok(_) => {}
            Err(TestkitError::UnexpectedRemoteStatus {
                error: Some(message),
                ..
            }) if message.contains("already connected") => {
                tracing::debug!(%peer, "peer already connected");
            }
            Err(err) => return Err(err),
        }

        self.wait
            .until_ok("lnd graph sync", move || async move {
                let info = self.info().await?;
                Ok((info.synced_to_chain && info.synced_to_graph).then_some(()))
            })
            .await?;

        let request = OpenChannelRequest {
            node_pubkey_string: peer.identity.clone(),
            local_funding_amount: capacity_sat.to_string(),
            push_sat: push_sat.to_string(),
            private,
        };
        let point: ChannelPointResponse = self.post("channels", &request).await?;
        channel_from_point(point)
    }

    async fn spendable_sat(&self, destination: &str) -> Result<u64> {
        let response: ListChannelsResponse = self.get("channels").await?;
        Ok(response
            .channels
            .iter()
            .filter(|channel| channel.active && channel.remote_pubkey == destination)
            .map(|channel| {
                channel
                    .local_balance
                    .saturating_sub(channel.local_chan_reserve_sat)
            })
            .max()
            .unwrap_or(0))
    }

    async fn chain_balance_sat(&self) -> Result<u64> {
        let response: WalletBalanceResponse = self.get("balance/blockchain").await?;
        Ok(response.confirmed_balance)
    }

    async fn chain_address(&self) -> Result<String> {
        let response: NewAddressResponse = self
            .get("newaddress?type=WITNESS_PUBKEY_HASH")
            .await?;
        Ok(response.address)
    }

    async fn parse_invoice(&self, invoice: &str) -> Result<ParsedInvoice> {
        let response: PayReqResponse = self.get(&format!("payreq/{}", invoice)).await?;
        Ok(ParsedInvoice {
            destination: response.destination,
            amount_msat: response.num_msat,
            expiry: response.expiry,
            payment_hash: response.payment_hash,
            timestamp: response.timestamp,
        })
    }

    async fn pay_invoice(&self, invoice: &str) -> Result<()> {
        let request = SendRequest {
            payment_request: invoice.to_string(),
        };
        let response: SendResponse = self.post("channels/transactions", &request).await?;
        if !response.payment_error.is_empty() {
            return Err(TestkitError::Payment {
                reason: response.payment_error,
            });
        }
        Ok(())
    }

    async fn create_invoice(&self, amount_msat: u64, memo: Option<&str>) -> Result<String> {
        let request = AddInvoiceRequest {
            value_msat: amount_msat.to_string(),
            memo: memo.unwrap_or_default().to_string(),
        };
        let response: AddInvoiceResponse = self.post("invoices", &request).await?;
        Ok(response.payment_request)
    }

    async fn is_invoice_paid(&self, invoice: &str) -> Result<bool> {
        let parsed = self.parse_invoice(invoice).await?;
        let response: InvoiceResponse = self
            .get(&format!("invoice/{}", parsed.payment_hash))
            .await?;
        Ok(response.state == "SETTLED" || response.settled)
    }

    async fn wait_init(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        self.wait
            .until_ok("lnd chain sync", move || async move {
                Ok(self.info().await?.synced_to_chain.then_some(()))
            })
            .await?;

        self.initialized.store(true, Ordering::Release);
        tracing::debug!(node = %self.config.rest_url, "node synced to chain");
        Ok(())
    }

    async fn update_channel_policy(&self, channel: &Channel, policy: &ChannelPolicy) -> Result<()> {
        let request = PolicyUpdateRequest {
            chan_point: ChannelPointRequest {
                funding_txid_str: channel.funding_txid.clone(),
                output_index: channel.output_index,
            },
            base_fee_msat: policy.base_fee_msat.to_string(),
            fee_rate_ppm: policy.fee_rate_ppm,
            time_lock_delta: policy.time_lock_delta,
        };
        let _: serde_json::Value = self.post("chanpolicy", &request).await?;
        Ok(())
    }
}

/// LND encodes 64-bit integers as JSON strings.
fn u64_from_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) if s.is_empty() => Ok(0),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

// LND REST API types

#[derive(Deserialize)]
struct GetInfoResponse {
    #[serde(default)]
    identity_pubkey: String,
    #[serde(default)]
    uris: Vec<String>,
    #[serde(default)]
    synced_to_chain: bool,
    #[serde(default)]
    synced_to_graph: bool,
}

#[derive(Serialize)]
struct ConnectPeerRequest {
    addr: LightningAddress,
    perm: bool,
}

#[derive(Serialize)]
struct LightningAddress {
    pubkey: String,
    host: String,
}

#[derive(Serialize)]
struct OpenChannelRequest {
    node_pubkey_string: String,
    local_funding_amount: String,
    push_sat: String,
    private: bool,
}

#[derive(Deserialize)]
struct ChannelPointResponse {
    #[serde(default)]
    funding_txid_bytes: Option<String>,
    #[serde(default)]
    funding_txid_str: Option<String>,
    #[serde(default)]
    output_index: u32,
}

#[derive(Deserialize)]
struct ListChannelsResponse {
    #[serde(default)]
    channels: Vec<LndChannel>,
}

#[derive(Deserialize)]
struct LndChannel {
    #[serde(default)]
    remote_pubkey: String,
    #[serde(default)]
    active: bool,
    #[serde(default, deserialize_with = "u64_from_string")]
    local_balance: u64,
    #[serde(default, deserialize_with = "u64_from_string")]
    local_chan_reserve_sat: u64,
}

#[derive(Deserialize)]
struct WalletBalanceResponse {
    #[serde(default, deserialize_with = "u64_from_string")]
    confirmed_balance: u64,
}

#[derive(Deserialize)]
struct NewAddressResponse {
    address: String,
}

#[derive(Deserialize)]
struct PayReqResponse {
    #[serde(default)]
    destination: String,
    #[serde(default)]
    payment_hash: String,
    #[serde(default, deserialize_with = "u64_from_string")]
    num_msat: u64,
    #[serde(default, deserialize_with = "u64_from_string")]
    expiry: u64,
    #[serde(default, deserialize_with = "u64_from_string")]
    timestamp: u64,
}

#[derive(Serialize)]
struct SendRequest {
    payment_request: String,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    payment_error: String,
}

#[derive(Serialize)]
struct AddInvoiceRequest {
    value_msat: String,
    memo: String,
}

#[derive(Deserialize)]
struct AddInvoiceResponse {
    payment_request: String,
}

#[derive(Deserialize)]
struct InvoiceResponse {
    #[serde(default)]
    state: String,
    #[serde(default)]
    settled: bool,
}

#[derive(Serialize)]
struct PolicyUpdateRequest {
    chan_point: ChannelPointRequest,
    base_fee_msat: String,
    fee_rate_ppm: u64,
    time_lock_delta: u32,
}

#[derive(Serialize)]
struct ChannelPointRequest {
    funding_txid_str: String,
    output_index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(url: &str) -> LndRestNode {
        LndRestNode::new(LndConfig::new(url, "0201"), WaitConfig::default()).unwrap()
    }

    fn info(uris: &[&str]) -> GetInfoResponse {
        GetInfoResponse {
            identity_pubkey: "02aa".to_string(),
            uris: uris.iter().map(|uri| uri.to_string()).collect(),
            synced_to_chain: true,
            synced_to_graph: true,
        }
    }

    #[test]
    fn test_lnd_node_validation() {
        let config = LndConfig::new("", "0201");
        assert!(LndRestNode::new(config, WaitConfig::default()).is_err());

        let config = LndConfig::new("https://localhost:8080", "");
        assert!(LndRestNode::new(config, WaitConfig::default()).is_err());
    }

    #[test]
    fn test_url_building() {
        let node = node("https://localhost:8080/");

        assert_eq!(node.config().rest_url, "https://localhost:8080/");
        assert_eq!(
            node.url("channels/transactions"),
            "https://localhost:8080/v1/channels/transactions"
        );
        assert_eq!(rpc_method("newaddress?type=WITNESS_PUBKEY_HASH"), "newaddress");
    }

    #[test]
    fn test_p2p_address_prefers_loopback() {
        let info = info(&["02aa@10.0.0.5:9735", "02aa@127.0.0.1:9735"]);
        assert_eq!(select_p2p_address(&info, None).unwrap().host, "127.0.0.1");

        let info = self::info(&["02aa@10.0.0.5:9735"]);
        assert_eq!(select_p2p_address(&info, Some(1)).unwrap().host, "10.0.0.5");
    }

    #[test]
    fn test_p2p_address_fallback() {
        let address = select_p2p_address(&info(&[]), Some(29735)).unwrap();
        assert_eq!(address.to_string(), "02aa@127.0.0.1:29735");

        let err = select_p2p_address(&info(&[]), None).unwrap_err();
        assert!(matches!(err, TestkitError::InvalidData { .. }));
    }

    #[test]
    fn test_txid_is_byte_reversed() {
        // bytes 00 01 .. 1f
        let bytes: Vec<u8> = (0u8..32).collect();
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let txid = txid_from_bytes(&encoded).unwrap();

        assert!(txid.starts_with("1f1e1d"));
        assert!(txid.ends_with("020100"));
    }

    #[test]
    fn test_channel_point_prefers_string() {
        let point = ChannelPointResponse {
            funding_txid_bytes: Some("AAE=".to_string()),
            funding_txid_str: Some("abcd".to_string()),
            output_index: 1,
        };
        assert_eq!(channel_from_point(point).unwrap(), Channel::new("abcd", 1));

        let point = ChannelPointResponse {
            funding_txid_bytes: None,
            funding_txid_str: None,
            output_index: 0,
        };
        assert!(channel_from_point(point).is_err());
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"error":"already connected to peer","code":2}"#).as_deref(),
            Some("already connected to peer")
        );
        assert_eq!(
            error_message(r#"{"message":"invoice expired"}"#).as_deref(),
            Some("invoice expired")
        );
        assert_eq!(error_message("Not Found"), None);
    }

    #[test]
    fn test_string_encoded_integers() {
        let channel: LndChannel = serde_json::from_str(
            r#"{"remote_pubkey":"02bb","active":true,"local_balance":"90000","local_chan_reserve_sat":1000}"#,
        )
        .unwrap();

        assert_eq!(channel.local_balance, 90_000);
        assert_eq!(channel.local_chan_reserve_sat, 1000);
    }
}
