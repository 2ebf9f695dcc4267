//! Lightning node collaborator.
//!
//! The orchestrator never talks to a Lightning implementation directly; it
//! goes through [`LightningNode`]. [`LndRestNode`](crate::executors::LndRestNode)
//! is the production implementation, [`test_utils`](crate::test_utils) holds
//! an in-memory one.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                     Network                      │
//! │   Dispatcher ─┐                                  │
//! │   Liquidity  ─┼──► Arc<dyn LightningNode>        │
//! │   Topology   ─┘     - LndRestNode (REST API)     │
//! │                     - MockLightningNode (tests)  │
//! └──────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

use crate::wait::WaitConfig;
use crate::{Result, TestkitError};

/// Network address of a Lightning node: `identity@host:port`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct P2PAddress {
    /// Node public key (hex).
    pub identity: String,
    /// Host name or IP address.
    pub host: String,
    /// P2P port.
    pub port: u16,
}

impl P2PAddress {
    /// Create a new address.
    pub fn new(identity: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            identity: identity.into(),
            host: host.into(),
            port,
        }
    }

    /// `host:port` part of the address.
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for P2PAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.identity, self.host, self.port)
    }
}

impl FromStr for P2PAddress {
    type Err = TestkitError;

    fn from_str(s: &str) -> Result<Self> {
        let (identity, host_port) = s
            .split_once('@')
            .ok_or_else(|| TestkitError::invalid_data("p2p address", "missing '@'"))?;
        let (host, port) = host_port
            .rsplit_once(':')
            .ok_or_else(|| TestkitError::invalid_data("p2p address", "missing ':'"))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| TestkitError::invalid_data("p2p address", format!("port: {}", e)))?;

        Ok(Self::new(identity, host, port))
    }
}

/// Read-only view of an invoice, as decoded by a node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedInvoice {
    /// Identity of the node that will receive the payment.
    pub destination: String,
    /// Requested amount.
    pub amount_msat: u64,
    /// Validity in seconds, counted from `timestamp`.
    pub expiry: u64,
    /// Payment hash (hex).
    pub payment_hash: String,
    /// Creation time in Unix seconds, 0 if the node did not report it.
    #[serde(default)]
    pub timestamp: u64,
}

impl ParsedInvoice {
    /// Requested amount in whole satoshis, rounded up.
    pub fn amount_sat(&self) -> u64 {
        self.amount_msat.div_ceil(1000)
    }

    /// Time left until the invoice expires, as seen at `now_unix`.
    ///
    /// Without a creation time the full expiry is left.
    pub fn remaining_validity(&self, now_unix: u64) -> Duration {
        let remaining = if self.timestamp == 0 {
            self.expiry
        } else {
            self.timestamp
                .saturating_add(self.expiry)
                .saturating_sub(now_unix)
        };
        Duration::from_secs(remaining)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Funding outpoint of a channel.
///
/// The outpoint is the only identifier that survives reorgs, so it is what
/// fee policy updates take.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    /// Funding transaction id (hex, RPC byte order).
    pub funding_txid: String,
    /// Funding output index.
    pub output_index: u32,
}

impl Channel {
    /// Create a new channel handle.
    pub fn new(funding_txid: impl Into<String>, output_index: u32) -> Self {
        Self {
            funding_txid: funding_txid.into(),
            output_index,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.funding_txid, self.output_index)
    }
}

/// Routing policy of one direction of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPolicy {
    /// Flat fee per forwarded HTLC.
    pub base_fee_msat: u64,
    /// Proportional fee in parts per million.
    pub fee_rate_ppm: u64,
    /// CLTV delta required by this hop.
    pub time_lock_delta: u32,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            base_fee_msat: 1000,
            fee_rate_ppm: 100,
            time_lock_delta: 144,
        }
    }
}

/// Administrative interface of a Lightning node.
///
/// Implement this trait to plug another Lightning implementation into the
/// orchestrator.
#[async_trait]
pub trait LightningNode: Send + Sync {
    /// Address other nodes connect to.
    async fn p2p_address(&self) -> Result<P2PAddress>;

    /// Public key of the node.
    async fn identity(&self) -> Result<String> {
        Ok(self.p2p_address().await?.identity)
    }

    /// Connect to `peer` and open a channel funded from the node's chain wallet.
    ///
    /// # Arguments
    ///
    /// * `peer` - Address of the remote node
    /// * `capacity_sat` - Total channel capacity
    /// * `push_sat` - Amount given to the remote side on open
    /// * `private` - Do not announce the channel
    async fn open_channel(
        &self,
        peer: &P2PAddress,
        capacity_sat: u64,
        push_sat: u64,
        private: bool,
    ) -> Result<Channel>;

    /// How much this node can send to `destination` over direct channels.
    async fn spendable_sat(&self, destination: &str) -> Result<u64>;

    /// Confirmed on-chain wallet balance.
    async fn chain_balance_sat(&self) -> Result<u64>;

    /// Fresh on-chain deposit address.
    async fn chain_address(&self) -> Result<String>;

    /// Decode an invoice.
    async fn parse_invoice(&self, invoice: &str) -> Result<ParsedInvoice>;

    /// Pay an invoice, failing with [`TestkitError::Payment`] if the node
    /// reports an error.
    async fn pay_invoice(&self, invoice: &str) -> Result<()>;

    /// Issue an invoice and return its encoded form.
    async fn create_invoice(&self, amount_msat: u64, memo: Option<&str>) -> Result<String>;

    /// Whether an invoice issued by this node has been settled.
    async fn is_invoice_paid(&self, invoice: &str) -> Result<bool>;

    /// Wait for an invoice issued by this node to be paid.
    ///
    /// Returns `false` once the invoice expired without payment. The default
    /// implementation polls [`LightningNode::is_invoice_paid`] with the
    /// interval of `wait`; a timeout in `wait` shortens the expiry.
    async fn wait_invoice_paid(&self, invoice: &str, wait: &WaitConfig) -> Result<bool> {
        let parsed = self.parse_invoice(invoice).await?;
        let mut validity = parsed.remaining_validity(unix_now());
        if let Some(timeout) = wait.timeout() {
            validity = validity.min(timeout);
        }

        let started = Instant::now();
        loop {
            if self.is_invoice_paid(invoice).await? {
                return Ok(true);
            }
            if started.elapsed() >= validity {
                return Ok(false);
            }
            tokio::time::sleep(wait.poll_interval()).await;
        }
    }

    /// Block until the node is synced and ready to take commands.
    async fn wait_init(&self) -> Result<()>;

    /// Set the routing policy of this node's side of `channel`.
    async fn update_channel_policy(&self, channel: &Channel, policy: &ChannelPolicy)
        -> Result<()>;
}

/// An invoice together with the node that issued it.
#[derive(Clone)]
pub struct InvoiceHandle {
    invoice: String,
    node: Arc<dyn LightningNode>,
    wait: WaitConfig,
}

impl InvoiceHandle {
    /// Wrap an invoice issued by `node`.
    pub fn new(invoice: impl Into<String>, node: Arc<dyn LightningNode>, wait: WaitConfig) -> Self {
        Self {
            invoice: invoice.into(),
            node,
            wait,
        }
    }

    /// The encoded invoice.
    pub fn invoice(&self) -> &str {
        &self.invoice
    }

    /// `lightning:` URI of the invoice, as shown in QR codes.
    pub fn payment_uri(&self) -> String {
        format!("lightning:{}", self.invoice)
    }

    /// Whether the invoice has been paid.
    pub async fn is_paid(&self) -> Result<bool> {
        self.node.is_invoice_paid(&self.invoice).await
    }

    /// Wait until the invoice is paid; `false` if it expired first.
    pub async fn wait_paid(&self) -> Result<bool> {
        self.node.wait_invoice_paid(&self.invoice, &self.wait).await
    }
}

impl fmt::Debug for InvoiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvoiceHandle")
            .field("invoice", &self.invoice)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for InvoiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.invoice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockLightningNode;

    const PUBKEY: &str = "02a1633cafcc01ebfb6d78e39f687a1f0995c62fc95f51ead10a02ee0be551b5dc";

    #[test]
    fn test_p2p_address_round_trip() {
        let addr = P2PAddress::new(PUBKEY, "127.0.0.1", 9735);
        let text = addr.to_string();
        assert_eq!(text, format!("{}@127.0.0.1:9735", PUBKEY));
        assert_eq!(text.parse::<P2PAddress>().unwrap(), addr);
    }

    #[test]
    fn test_p2p_address_errors() {
        assert!("no-at-sign:9735".parse::<P2PAddress>().is_err());
        assert!(format!("{}@localhost", PUBKEY).parse::<P2PAddress>().is_err());
        assert!(format!("{}@localhost:70000", PUBKEY)
            .parse::<P2PAddress>()
            .is_err());
    }

    #[test]
    fn test_invoice_amount_rounds_up() {
        let invoice = ParsedInvoice {
            destination: PUBKEY.into(),
            amount_msat: 1_001,
            expiry: 3600,
            payment_hash: "00".into(),
            timestamp: 0,
        };
        assert_eq!(invoice.amount_sat(), 2);
    }

    #[test]
    fn test_remaining_validity_counts_from_creation() {
        let invoice = ParsedInvoice {
            destination: PUBKEY.into(),
            amount_msat: 1_000,
            expiry: 3600,
            payment_hash: "00".into(),
            timestamp: 1_700_000_000,
        };

        assert_eq!(invoice.remaining_validity(1_700_000_000), Duration::from_secs(3600));
        assert_eq!(invoice.remaining_validity(1_700_003_000), Duration::from_secs(600));
        assert_eq!(invoice.remaining_validity(1_800_000_000), Duration::ZERO);

        let unknown = ParsedInvoice {
            timestamp: 0,
            ..invoice.clone()
        };
        assert_eq!(unknown.remaining_validity(1_800_000_000), Duration::from_secs(3600));

        let endless = ParsedInvoice {
            expiry: u64::MAX,
            ..invoice
        };
        assert_eq!(
            endless.remaining_validity(1_700_000_000),
            Duration::from_secs(u64::MAX - 1_700_000_000)
        );
    }

    #[test]
    fn test_channel_display() {
        assert_eq!(Channel::new("abcd", 1).to_string(), "abcd:1");
    }

    #[test]
    fn test_default_policy() {
        let policy = ChannelPolicy::default();
        assert_eq!(policy.base_fee_msat, 1000);
        assert_eq!(policy.fee_rate_ppm, 100);
        assert_eq!(policy.time_lock_delta, 144);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoice_handle_waits_for_payment() {
        let node = Arc::new(MockLightningNode::new("bob"));
        let invoice = node.create_invoice(5_000, Some("coffee")).await.unwrap();
        let handle = InvoiceHandle::new(
            invoice.clone(),
            node.clone(),
            WaitConfig::every(Duration::from_millis(100)),
        );

        assert_eq!(handle.payment_uri(), format!("lightning:{}", invoice));
        assert!(!handle.is_paid().await.unwrap());

        let payer = node.clone();
        let paid = invoice.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            payer.settle_invoice(&paid);
        });

        assert!(handle.wait_paid().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoice_handle_expires() {
        let node = Arc::new(MockLightningNode::new("bob"));
        let invoice = node.create_invoice(5_000, None).await.unwrap();
        let handle = InvoiceHandle::new(
            invoice,
            node,
            WaitConfig::every(Duration::from_secs(1)).with_timeout(Duration::from_secs(10)),
        );

        assert!(!handle.wait_paid().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_expiry_is_bounded_by_timeout() {
        let node = Arc::new(MockLightningNode::new("bob"));
        node.set_invoice_expiry(u64::MAX);
        let invoice = node.create_invoice(5_000, None).await.unwrap();
        let handle = InvoiceHandle::new(
            invoice,
            node,
            WaitConfig::every(Duration::from_secs(1)).with_timeout(Duration::from_secs(5)),
        );

        assert!(!handle.wait_paid().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_expiry_ends_wait() {
        let node = Arc::new(MockLightningNode::new("bob"));
        node.set_invoice_expiry(3);
        let invoice = node.create_invoice(5_000, None).await.unwrap();
        let handle = InvoiceHandle::new(invoice, node, WaitConfig::every(Duration::from_secs(1)));

        let started = Instant::now();
        assert!(!handle.wait_paid().await.unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
