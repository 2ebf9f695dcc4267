//! LNP/BP testkit.
//!
//! Drives a regtest bitcoind and a set of LND nodes so that integration tests
//! of Lightning-enabled applications can say "pay this" and have the
//! orchestrator make sure coins and channel liquidity exist first.
//!
//! # Features
//!
//! - **Auto payment**: BIP21 links are paid on chain, regtest invoices over
//!   Lightning from a lazily spawned secondary node
//! - **Liquidity**: channels are opened on demand, sized to the payment
//! - **Auto mining**: a background task confirms whatever lands in the mempool
//! - **Scenarios**: declarative multi-node topologies from JSON or TOML
//!
//! Every collaborator (chain, Lightning node, node spawner, port allocator) is
//! a trait so the orchestration logic can be exercised with the in-memory
//! doubles from [`test_utils`].
//!
//! # Example
//!
//! ```ignore
//! use lnpbp_testkit::{Network, NetworkConfig, WarmUp};
//!
//! let network = Network::from_config(&NetworkConfig::from_env()?)?;
//! network.warm_up(WarmUp::default()).await?;
//!
//! // the app under test produced an invoice, pay it
//! network.auto_pay("lnbcrt10u1p...").await?;
//!
//! // and now let it pay us
//! let invoice = network.create_lightning_invoice(100_000, Some("refund")).await?;
//! app.pay(&invoice.payment_uri()).await?;
//! invoice.wait_paid().await?;
//! ```

pub mod chain;
pub mod dispatch;
pub mod errors;
pub mod executors;
pub mod funding;
pub mod lightning;
pub mod link;
pub mod liquidity;
pub mod miner;
pub mod network;
pub mod parsing;
pub mod ports;
pub mod prelude;
pub mod registry;
pub mod scenario;
pub mod spawn;
pub mod topology;
pub mod wait;

/// In-memory collaborators for orchestrator tests.
///
/// This module is only available with the `test-utils` feature or in test builds.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use chain::ChainControl;
pub use dispatch::PaymentReceipt;
pub use errors::{TestkitError, TestkitErrorCode};
pub use executors::{BitcoindConfig, LndConfig, NetworkConfig};
pub use lightning::{
    Channel, ChannelPolicy, InvoiceHandle, LightningNode, P2PAddress, ParsedInvoice,
};
pub use link::{parse_link, PaymentIntent};
pub use network::{Network, NetworkBuilder, WarmUp};
pub use ports::PortAllocator;
pub use scenario::{ChannelParams, NodeType, ScenarioSpec};
pub use spawn::NodeSpawner;
pub use topology::LoadedScenario;
pub use wait::WaitConfig;

/// Common result alias for testkit operations.
pub type Result<T> = std::result::Result<T, TestkitError>;
