//! Scenario topology builder.
//!
//! Turns a validated [`ScenarioSpec`] into running nodes and configured
//! channels. Nodes are launched in one pass and waited on in a second, so
//! their startup overlaps.

use std::sync::Arc;

use crate::chain::COINBASE_MATURITY;
use crate::funding::ChainFunder;
use crate::lightning::{Channel, LightningNode};
use crate::liquidity::LiquidityEngine;
use crate::registry::NodeRegistry;
use crate::scenario::{ScenarioSpec, SYSTEM_NODE};
use crate::{Result, TestkitError};

/// A node started by a scenario.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedNode {
    /// Scenario name.
    pub name: String,
    /// Node public key.
    pub identity: String,
}

/// A channel opened by a scenario.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedChannel {
    /// Initiator name (or `$system`).
    pub initiator: String,
    /// Receiver name (or `$system`).
    pub receiver: String,
    /// Funding outpoint.
    pub channel: Channel,
}

/// Outcome of loading a scenario.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadedScenario {
    /// Nodes, in spawn order.
    pub nodes: Vec<LoadedNode>,
    /// Channels, in open order.
    pub channels: Vec<LoadedChannel>,
}

/// Builds scenario topologies.
#[derive(Clone)]
pub struct TopologyBuilder {
    registry: Arc<NodeRegistry>,
    funder: ChainFunder,
    liquidity: LiquidityEngine,
}

impl TopologyBuilder {
    /// Builder registering nodes in `registry`.
    pub fn new(registry: Arc<NodeRegistry>, funder: ChainFunder, liquidity: LiquidityEngine) -> Self {
        Self {
            registry,
            funder,
            liquidity,
        }
    }

    /// Spawn the scenario's nodes and open its channels.
    ///
    /// The whole document is checked first; an invalid scenario, or one that
    /// reuses the name of an already registered node, has no side effects.
    #[tracing::instrument(skip_all, fields(nodes = spec.nodes.len()))]
    pub async fn load(&self, spec: &ScenarioSpec) -> Result<LoadedScenario> {
        let scenario = spec.validate()?;
        if let Some((name, _)) = scenario
            .nodes
            .iter()
            .find(|(name, _)| self.registry.contains(name))
        {
            return Err(TestkitError::InvalidScenario(format!(
                "node {} already exists",
                name
            )));
        }

        let spawner = self.registry.spawner();
        for (name, node_type) in &scenario.nodes {
            tracing::info!(%name, %node_type, "spawning node");
            spawner.spawn(name, *node_type).await?;
        }

        self.funder.ensure_height(COINBASE_MATURITY).await?;

        let mut loaded = LoadedScenario::default();
        for (name, node_type) in &scenario.nodes {
            let node = spawner.connect(name, *node_type).await?;
            node.wait_init().await?;
            let identity = self.registry.register(name, node).await?;
            loaded.nodes.push(LoadedNode {
                name: name.clone(),
                identity,
            });
        }

        for (initiator_name, receiver_name, params) in &scenario.channels {
            let initiator = self.lookup(initiator_name)?;
            let receiver = self.lookup(receiver_name)?;
            let receiver_identity = receiver.identity().await?;

            let channel = self
                .liquidity
                .open_channel(
                    &initiator,
                    &receiver_identity,
                    params.capacity_sats,
                    params.push_sats,
                    params.private,
                )
                .await?;
            initiator
                .update_channel_policy(&channel, &params.forward_policy())
                .await?;
            receiver
                .update_channel_policy(&channel, &params.reverse_policy())
                .await?;

            tracing::info!(initiator = %initiator_name, receiver = %receiver_name, %channel, "scenario channel ready");
            loaded.channels.push(LoadedChannel {
                initiator: initiator_name.clone(),
                receiver: receiver_name.clone(),
                channel,
            });
        }

        Ok(loaded)
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn LightningNode>> {
        if name == SYSTEM_NODE {
            return Ok(self.registry.primary());
        }
        self.registry
            .node(name)
            .ok_or_else(|| TestkitError::InvalidScenario(format!("node {} is not running", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lightning::ChannelPolicy;
    use crate::registry::SECONDARY_NODE_ID;
    use crate::scenario::{ChannelParams, NodeType};
    use crate::test_utils::{MockChain, MockLightningNode, MockSpawner};
    use crate::wait::WaitConfig;
    use std::time::Duration;

    struct Setup {
        chain: Arc<MockChain>,
        primary: Arc<MockLightningNode>,
        spawner: Arc<MockSpawner>,
        registry: Arc<NodeRegistry>,
        builder: TopologyBuilder,
    }

    fn setup(height: u64) -> Setup {
        let chain = MockChain::with_height(height);
        let primary = Arc::new(MockLightningNode::new("primary"));
        let spawner = Arc::new(MockSpawner::new());
        let registry = Arc::new(NodeRegistry::new(primary.clone(), spawner.clone()));
        let funder = ChainFunder::new(chain.clone());
        let liquidity = LiquidityEngine::new(
            funder.clone(),
            registry.clone(),
            WaitConfig::every(Duration::from_millis(10)),
        );
        Setup {
            chain,
            primary,
            spawner,
            registry: registry.clone(),
            builder: TopologyBuilder::new(registry, funder, liquidity),
        }
    }

    #[tokio::test]
    async fn test_system_channel_with_custom_policies() {
        let s = setup(0);
        let params = ChannelParams {
            forward_fee_base_msat: 0,
            reverse_fee_proportional_ppm: 1,
            ..ChannelParams::new(300_000).with_push(50_000).private()
        };
        let spec = ScenarioSpec::new()
            .with_node("carol", NodeType::Lnd)
            .with_channel(SYSTEM_NODE, "carol", params);

        let loaded = s.builder.load(&spec).await.unwrap();

        assert!(s.chain.height() >= COINBASE_MATURITY);
        assert_eq!(loaded.nodes[0].name, "carol");
        assert_eq!(loaded.channels[0].initiator, SYSTEM_NODE);

        let opened = s.primary.channels();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].private);
        assert_eq!(opened[0].local_balance_sat, 250_000);

        let (_, forward) = &s.primary.policies()[0];
        assert_eq!(forward.base_fee_msat, 0);
        let carol = s.spawner.node("carol").unwrap();
        let (_, reverse) = &carol.policies()[0];
        assert_eq!(
            *reverse,
            ChannelPolicy {
                fee_rate_ppm: 1,
                ..ChannelPolicy::default()
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_scenario_has_no_side_effects() {
        let s = setup(0);
        let spec = ScenarioSpec::new()
            .with_node("alice", NodeType::Lnd)
            .with_channel("alice", "mallory", ChannelParams::new(100_000));

        let err = s.builder.load(&spec).await.unwrap_err();

        assert!(matches!(err, TestkitError::InvalidScenario(_)));
        assert!(s.spawner.spawned().is_empty());
        assert_eq!(s.chain.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_node_names_cannot_be_reused() {
        let s = setup(101);
        let spec = ScenarioSpec::new().with_node("alice", NodeType::Lnd);

        s.builder.load(&spec).await.unwrap();
        let err = s.builder.load(&spec).await.unwrap_err();

        assert!(matches!(err, TestkitError::InvalidScenario(_)));
        assert_eq!(s.spawner.spawned(), vec!["alice".to_string()]);
        assert_eq!(s.registry.names(), vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_scenario_cannot_claim_secondary_node() {
        let s = setup(101);
        let secondary = s.registry.secondary().await.unwrap();
        let spec = ScenarioSpec::new().with_node(SECONDARY_NODE_ID, NodeType::Lnd);

        let err = s.builder.load(&spec).await.unwrap_err();

        assert!(matches!(err, TestkitError::InvalidScenario(_)));
        assert_eq!(s.spawner.spawned(), vec![SECONDARY_NODE_ID.to_string()]);
        assert!(s.registry.names().is_empty());
        assert!(s
            .registry
            .node_by_identity(&secondary.identity().await.unwrap())
            .is_none());
    }

    #[tokio::test]
    async fn test_oversized_channel_has_no_side_effects() {
        let s = setup(0);
        let spec = ScenarioSpec::new()
            .with_node("alice", NodeType::Lnd)
            .with_channel(SYSTEM_NODE, "alice", ChannelParams::new(u64::MAX));

        let err = s.builder.load(&spec).await.unwrap_err();

        assert!(matches!(err, TestkitError::InvalidScenario(_)));
        assert!(s.spawner.spawned().is_empty());
        assert_eq!(s.chain.mutation_count(), 0);
    }
}
