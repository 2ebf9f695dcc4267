//! Test utilities for the testkit.
//!
//! In-memory stand-ins for every collaborator, so orchestration logic can be
//! exercised without bitcoind or LND:
//! - [`MockChain`] - a regtest chain with one wallet
//! - [`MockLightningNode`] - a node whose channels open instantly
//! - [`MockSpawner`] - spawns [`MockLightningNode`]s by name
//! - [`TestNetwork`] - a [`Network`](crate::Network) over all of the above
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lnpbp_testkit::test_utils::TestNetwork;
//!
//! let t = TestNetwork::new();
//! let invoice = t.primary.create_invoice(10_000, None).await?;
//!
//! t.network.auto_pay(&invoice).await?;
//!
//! // paid by the lazily spawned secondary node
//! let secondary = t.spawner.node(SECONDARY_NODE_ID).unwrap();
//! assert_eq!(secondary.paid_invoices(), vec![invoice]);
//! ```

mod fixtures;
mod mock_chain;
mod mock_node;
mod mock_spawner;
mod test_network;

pub use fixtures::{alice_bob_scenario, bip21, TestFixtures};
pub use mock_chain::{ChainCall, MockChain, BLOCK_REWARD_SAT, SEND_FEE_SAT};
pub use mock_node::{mock_node, MockChannel, MockLightningNode, MOCK_INVOICE_EXPIRY};
pub use mock_spawner::MockSpawner;
pub use test_network::{TestNetwork, PRIMARY};
