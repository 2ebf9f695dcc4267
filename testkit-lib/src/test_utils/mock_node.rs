//! In-memory Lightning node.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::lightning::{Channel, ChannelPolicy, LightningNode, P2PAddress, ParsedInvoice};
use crate::{Result, TestkitError};

/// Expiry of invoices issued by the mock.
pub const MOCK_INVOICE_EXPIRY: u64 = 3600;

/// A channel opened by a [`MockLightningNode`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockChannel {
    /// Funding outpoint.
    pub channel: Channel,
    /// Remote node identity.
    pub remote: String,
    /// Channel capacity.
    pub capacity_sat: u64,
    /// Balance on this node's side.
    pub local_balance_sat: u64,
    /// Whether the channel was opened private.
    pub private: bool,
}

impl MockChannel {
    /// Reserve the remote side requires us to keep (1% of capacity).
    pub fn reserve_sat(&self) -> u64 {
        self.capacity_sat / 100
    }

    /// Amount that can be sent over the channel.
    pub fn spendable_sat(&self) -> u64 {
        self.local_balance_sat.saturating_sub(self.reserve_sat())
    }
}

#[derive(Debug, Default)]
struct NodeState {
    channels: Vec<MockChannel>,
    policies: Vec<(Channel, ChannelPolicy)>,
    issued: Vec<String>,
    settled: HashSet<String>,
    paid: Vec<String>,
    next_address: u64,
    wait_init_calls: u32,
    invoice_expiry: Option<u64>,
}

/// A Lightning node whose channels open instantly.
///
/// Invoices are plain strings of the form
/// `lnbcrt<amount_msat>m1p<destination>h<payment_hash>`, so any mock node
/// can decode invoices issued by any other.
#[derive(Debug)]
pub struct MockLightningNode {
    name: String,
    identity: String,
    port: u16,
    state: Mutex<NodeState>,
}

impl MockLightningNode {
    fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Node with an identity derived from `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            identity: Self::identity_for(&name),
            name,
            port: 9735,
            state: Mutex::new(NodeState::default()),
        }
    }

    /// Identity a node called `name` gets.
    pub fn identity_for(name: &str) -> String {
        format!("02{}", hex::encode(Sha256::digest(name.as_bytes())))
    }

    /// Encode an invoice the mocks understand.
    pub fn encode_invoice(destination: &str, amount_msat: u64, payment_hash: &str) -> String {
        format!("lnbcrt{}m1p{}h{}", amount_msat, destination, payment_hash)
    }

    /// Node name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mark an invoice issued by this node as paid.
    pub fn settle_invoice(&self, invoice: &str) {
        self.state().settled.insert(invoice.to_string());
    }

    /// Channels opened by this node.
    pub fn channels(&self) -> Vec<MockChannel> {
        self.state().channels.clone()
    }

    /// Policy updates applied to this node, in order.
    pub fn policies(&self) -> Vec<(Channel, ChannelPolicy)> {
        self.state().policies.clone()
    }

    /// Invoices this node paid.
    pub fn paid_invoices(&self) -> Vec<String> {
        self.state().paid.clone()
    }

    /// Invoices this node issued.
    pub fn issued_invoices(&self) -> Vec<String> {
        self.state().issued.clone()
    }

    /// How often `wait_init` was called.
    pub fn wait_init_calls(&self) -> u32 {
        self.state().wait_init_calls
    }

    /// Expiry reported for invoices this node decodes, instead of
    /// [`MOCK_INVOICE_EXPIRY`].
    pub fn set_invoice_expiry(&self, expiry: u64) {
        self.state().invoice_expiry = Some(expiry);
    }

    /// Add an already open channel, as if it existed before the test.
    pub fn add_channel(&self, remote: &str, capacity_sat: u64, local_balance_sat: u64) {
        let mut state = self.state();
        let index = state.channels.len() as u32;
        state.channels.push(MockChannel {
            channel: Channel::new(self.funding_txid(index), 0),
            remote: remote.to_string(),
            capacity_sat,
            local_balance_sat,
            private: false,
        });
    }

    fn funding_txid(&self, index: u32) -> String {
        let digest = Sha256::digest(format!("{}/{}", self.identity, index).as_bytes());
        hex::encode(digest)
    }

    fn decode(&self, invoice: &str) -> Result<ParsedInvoice> {
        let invalid = || TestkitError::remote_status("payreq", 400, Some("invalid payment request".into()));

        let rest = invoice
            .get(..6)
            .filter(|prefix| prefix.eq_ignore_ascii_case("lnbcrt"))
            .map(|_| &invoice[6..])
            .ok_or_else(invalid)?;
        let (amount, rest) = rest.split_once("m1p").ok_or_else(invalid)?;
        let (destination, payment_hash) = rest.split_once('h').ok_or_else(invalid)?;

        Ok(ParsedInvoice {
            destination: destination.to_string(),
            amount_msat: amount.parse().map_err(|_| invalid())?,
            expiry: self.state().invoice_expiry.unwrap_or(MOCK_INVOICE_EXPIRY),
            payment_hash: payment_hash.to_string(),
            timestamp: 0,
        })
    }
}

#[async_trait]
impl LightningNode for MockLightningNode {
    async fn p2p_address(&self) -> Result<P2PAddress> {
        Ok(P2PAddress::new(&self.identity, "127.0.0.1", self.port))
    }

    async fn identity(&self) -> Result<String> {
        Ok(self.identity.clone())
    }

    async fn open_channel(
        &self,
        peer: &P2PAddress,
        capacity_sat: u64,
        push_sat: u64,
        private: bool,
    ) -> Result<Channel> {
        if peer.identity == self.identity {
            return Err(TestkitError::remote_status(
                "peers",
                500,
                Some("cannot make connection to self".into()),
            ));
        }

        let mut state = self.state();
        let index = state.channels.len() as u32;
        let channel = Channel::new(self.funding_txid(index), 0);
        state.channels.push(MockChannel {
            channel: channel.clone(),
            remote: peer.identity.clone(),
            capacity_sat,
            local_balance_sat: capacity_sat - push_sat,
            private,
        });
        Ok(channel)
    }

    async fn spendable_sat(&self, destination: &str) -> Result<u64> {
        Ok(self
            .state()
            .channels
            .iter()
            .filter(|c| c.remote == destination)
            .map(MockChannel::spendable_sat)
            .max()
            .unwrap_or(0))
    }

    async fn chain_balance_sat(&self) -> Result<u64> {
        Ok(0)
    }

    async fn chain_address(&self) -> Result<String> {
        let mut state = self.state();
        state.next_address += 1;
        Ok(format!("bcrt1q{}{:04}", self.name, state.next_address))
    }

    async fn parse_invoice(&self, invoice: &str) -> Result<ParsedInvoice> {
        self.decode(invoice)
    }

    async fn pay_invoice(&self, invoice: &str) -> Result<()> {
        let parsed = self.decode(invoice)?;
        let amount_sat = parsed.amount_sat();

        let mut state = self.state();
        let channel = state
            .channels
            .iter_mut()
            .filter(|c| c.remote == parsed.destination)
            .max_by_key(|c| c.spendable_sat())
            .filter(|c| c.spendable_sat() >= amount_sat)
            .ok_or_else(|| TestkitError::Payment {
                reason: "unable to find a path to destination".to_string(),
            })?;
        channel.local_balance_sat -= amount_sat;
        state.paid.push(invoice.to_string());
        Ok(())
    }

    async fn create_invoice(&self, amount_msat: u64, memo: Option<&str>) -> Result<String> {
        let mut state = self.state();
        let seed = format!("{}/{}/{}", self.identity, state.issued.len(), memo.unwrap_or(""));
        let payment_hash = hex::encode(Sha256::digest(seed.as_bytes()));
        let invoice = Self::encode_invoice(&self.identity, amount_msat, &payment_hash);
        state.issued.push(invoice.clone());
        Ok(invoice)
    }

    async fn is_invoice_paid(&self, invoice: &str) -> Result<bool> {
        Ok(self.state().settled.contains(invoice))
    }

    async fn wait_init(&self) -> Result<()> {
        self.state().wait_init_calls += 1;
        Ok(())
    }

    async fn update_channel_policy(&self, channel: &Channel, policy: &ChannelPolicy) -> Result<()> {
        self.state().policies.push((channel.clone(), *policy));
        Ok(())
    }
}

/// Convenience for tests holding the concrete type.
pub fn mock_node(name: &str) -> Arc<MockLightningNode> {
    Arc::new(MockLightningNode::new(name))
}
