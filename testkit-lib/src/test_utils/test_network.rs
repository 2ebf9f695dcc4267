//! A [`Network`] wired to in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use super::{MockChain, MockLightningNode, MockSpawner};
use crate::network::Network;
use crate::wait::WaitConfig;

/// Name of the primary mock node.
pub const PRIMARY: &str = "primary";

/// A network over [`MockChain`], [`MockLightningNode`] and [`MockSpawner`].
///
/// Waits poll every 10ms and give up after five seconds so a broken test
/// fails instead of hanging.
pub struct TestNetwork {
    /// The network under test.
    pub network: Network,
    /// Its chain.
    pub chain: Arc<MockChain>,
    /// Its primary node.
    pub primary: Arc<MockLightningNode>,
    /// Spawner of the secondary and scenario nodes.
    pub spawner: Arc<MockSpawner>,
}

impl TestNetwork {
    /// Network whose chain has a wallet and mature coins.
    pub fn new() -> Self {
        Self::with_chain(MockChain::with_height(101))
    }

    /// Network whose chain has no wallet and no blocks.
    pub fn empty_chain() -> Self {
        Self::with_chain(MockChain::new())
    }

    /// Network over `chain`.
    pub fn with_chain(chain: Arc<MockChain>) -> Self {
        let primary = Arc::new(MockLightningNode::new(PRIMARY));
        let spawner = Arc::new(MockSpawner::new());
        let network = Network::builder(chain.clone(), primary.clone(), spawner.clone())
            .wait(Self::wait())
            .retry_pause(Duration::from_millis(10))
            .build();

        Self {
            network,
            chain,
            primary,
            spawner,
        }
    }

    /// Wait policy used by the test network.
    pub fn wait() -> WaitConfig {
        WaitConfig::every(Duration::from_millis(10)).with_timeout(Duration::from_secs(5))
    }

    /// Identity of the primary node.
    pub fn primary_identity(&self) -> String {
        MockLightningNode::identity_for(PRIMARY)
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}
