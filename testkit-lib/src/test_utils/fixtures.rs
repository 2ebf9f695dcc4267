//! Test fixtures and data generators.

use crate::scenario::{ChannelParams, NodeType, ScenarioSpec};

/// Collection of commonly used test fixtures.
pub struct TestFixtures;

impl TestFixtures {
    /// Valid regtest P2WPKH addresses.
    pub const REGTEST_ADDRESSES: &'static [&'static str] = &[
        "bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080",
        "bcrt1q6rhpng9evdsfnn833a4f4vej0asu6dk5srld6x",
    ];

    /// Links in formats the testkit refuses to pay.
    pub const INVALID_LINKS: &'static [&'static str] = &[
        // bare address without amount
        "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2",
        // mainnet invoice
        "lnbc10u1pmainnet",
        // BIP21 without amount
        "bitcoin:bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080",
        "mailto:someone@example.com",
    ];

    /// Sample payment amounts in satoshis.
    pub const SAMPLE_AMOUNTS: &'static [u64] = &[
        1_000,     // Small
        25_000,    // Below the minimal channel
        100_000,   // Medium
        1_000_000, // Large (0.01 BTC)
    ];

    /// A regtest address.
    pub fn address(index: usize) -> &'static str {
        Self::REGTEST_ADDRESSES[index % Self::REGTEST_ADDRESSES.len()]
    }

    /// Get a sample amount.
    pub fn sample_amount(index: usize) -> u64 {
        Self::SAMPLE_AMOUNTS[index % Self::SAMPLE_AMOUNTS.len()]
    }
}

/// BIP21 URI paying `amount_btc` to `address`.
pub fn bip21(address: &str, amount_btc: &str) -> String {
    format!("bitcoin:{}?amount={}", address, amount_btc)
}

/// Two LND nodes, `alice` and `bob`, with a channel from alice to bob.
pub fn alice_bob_scenario(capacity_sats: u64) -> ScenarioSpec {
    ScenarioSpec::new()
        .with_node("alice", NodeType::Lnd)
        .with_node("bob", NodeType::Lnd)
        .with_channel("alice", "bob", ChannelParams::new(capacity_sats))
}
