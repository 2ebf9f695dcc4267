//! Channel liquidity.
//!
//! [`LiquidityEngine::ensure_liquidity`] makes sure a node can send a given
//! amount to a destination over a direct channel, opening one if needed. The
//! channel is sized at twice the amount so that follow-up payments of the
//! same size do not need another channel.

use std::sync::Arc;

use crate::funding::{ChainFunder, CONFIRMATIONS, FEE_BUFFER_SAT};
use crate::lightning::{Channel, LightningNode};
use crate::registry::NodeRegistry;
use crate::wait::WaitConfig;
use crate::{Result, TestkitError};

/// Smallest channel LND accepts.
pub const MIN_CHANNEL_CAPACITY: u64 = 20_000;

/// Largest channel a node without `option_support_large_channel` accepts.
pub const MAX_NON_WUMBO_CAPACITY: u64 = (1 << 24) - 1;

/// Most liquidity a single new channel can provide.
///
/// The remote side makes the opener keep 1% of the capacity as reserve.
pub const MAX_CHANNEL_LIQUIDITY: u64 = MAX_NON_WUMBO_CAPACITY - MAX_NON_WUMBO_CAPACITY / 100;

/// Capacity of a channel opened to provide `amount_sat` of liquidity.
pub fn channel_capacity_for(amount_sat: u64) -> u64 {
    amount_sat
        .saturating_mul(2)
        .clamp(MIN_CHANNEL_CAPACITY, MAX_NON_WUMBO_CAPACITY)
}

/// Opens and waits for channels.
#[derive(Clone)]
pub struct LiquidityEngine {
    funder: ChainFunder,
    registry: Arc<NodeRegistry>,
    wait: WaitConfig,
}

impl LiquidityEngine {
    /// Engine funding channels through `funder` and resolving peers in
    /// `registry`.
    pub fn new(funder: ChainFunder, registry: Arc<NodeRegistry>, wait: WaitConfig) -> Self {
        Self {
            funder,
            registry,
            wait,
        }
    }

    /// Make sure `source` can send `amount_sat` to `destination`.
    ///
    /// Returns the channel that was opened, or `None` if there already was
    /// enough liquidity.
    #[tracing::instrument(skip(self, source))]
    pub async fn ensure_liquidity(
        &self,
        source: &Arc<dyn LightningNode>,
        destination: &str,
        amount_sat: u64,
    ) -> Result<Option<Channel>> {
        if source.spendable_sat(destination).await? >= amount_sat {
            tracing::debug!("enough liquidity");
            return Ok(None);
        }
        if amount_sat > MAX_CHANNEL_LIQUIDITY {
            return Err(TestkitError::invariant(format!(
                "{} sat exceeds what the largest non-wumbo channel can send ({} sat)",
                amount_sat, MAX_CHANNEL_LIQUIDITY
            )));
        }

        let capacity = channel_capacity_for(amount_sat);
        let channel = self
            .open_channel(source, destination, capacity, 0, false)
            .await?;

        self.wait
            .until("channel activation", move || async move {
                let spendable = source.spendable_sat(destination).await?;
                Ok((spendable >= amount_sat).then_some(()))
            })
            .await?;

        Ok(Some(channel))
    }

    /// Fund `source`, open a channel to `destination` and confirm it.
    #[tracing::instrument(skip(self, source))]
    pub async fn open_channel(
        &self,
        source: &Arc<dyn LightningNode>,
        destination: &str,
        capacity_sat: u64,
        push_sat: u64,
        private: bool,
    ) -> Result<Channel> {
        let funding_sat = capacity_sat.checked_add(FEE_BUFFER_SAT).ok_or_else(|| {
            TestkitError::invariant(format!("channel capacity {} sat is out of range", capacity_sat))
        })?;
        let funding_address = source.chain_address().await?;
        self.funder.pay_to_address(&funding_address, funding_sat).await?;

        let peer = self.registry.resolve_address(destination).await?;
        let channel = source
            .open_channel(&peer, capacity_sat, push_sat, private)
            .await?;
        tracing::info!(%channel, %peer, capacity_sat, "channel opened");

        self.funder.confirm_with_retry(CONFIRMATIONS).await?;
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ChainCall, MockChain, MockLightningNode, MockSpawner};
    use std::time::Duration;

    struct Setup {
        chain: Arc<MockChain>,
        engine: LiquidityEngine,
        source: Arc<MockLightningNode>,
        primary_id: String,
    }

    fn setup() -> Setup {
        let chain = MockChain::with_height(101);
        let primary = Arc::new(MockLightningNode::new("primary"));
        let registry = Arc::new(NodeRegistry::new(
            primary,
            Arc::new(MockSpawner::new()),
        ));
        let engine = LiquidityEngine::new(
            ChainFunder::new(chain.clone()),
            registry,
            WaitConfig::every(Duration::from_millis(10)),
        );
        Setup {
            chain,
            engine,
            source: Arc::new(MockLightningNode::new("source")),
            primary_id: MockLightningNode::identity_for("primary"),
        }
    }

    #[test]
    fn test_capacity_is_clamped() {
        assert_eq!(channel_capacity_for(1), MIN_CHANNEL_CAPACITY);
        assert_eq!(channel_capacity_for(50_000), 100_000);
        assert_eq!(channel_capacity_for(MAX_NON_WUMBO_CAPACITY), MAX_NON_WUMBO_CAPACITY);
        assert_eq!(channel_capacity_for(u64::MAX), MAX_NON_WUMBO_CAPACITY);
    }

    #[tokio::test]
    async fn test_opens_funded_channel() {
        let s = setup();
        let source: Arc<dyn LightningNode> = s.source.clone();

        let channel = s
            .engine
            .ensure_liquidity(&source, &s.primary_id, 50_000)
            .await
            .unwrap()
            .expect("a channel should be opened");

        let channels = s.source.channels();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].channel, channel);
        assert_eq!(channels[0].capacity_sat, 100_000);
        assert_eq!(channels[0].remote, s.primary_id);

        // funded with capacity plus fee reserve, then confirmed twice
        assert_eq!(
            s.chain.sends(),
            vec![("bcrt1qsource0001".to_string(), 200_000)]
        );
        let confirmations = s
            .chain
            .calls()
            .iter()
            .filter(|c| matches!(c, ChainCall::Generate { count: 6, .. }))
            .count();
        assert_eq!(confirmations, 2);

        assert!(source.spendable_sat(&s.primary_id).await.unwrap() >= 50_000);
    }

    #[tokio::test]
    async fn test_second_call_is_idempotent() {
        let s = setup();
        let source: Arc<dyn LightningNode> = s.source.clone();

        s.engine
            .ensure_liquidity(&source, &s.primary_id, 10_000)
            .await
            .unwrap();
        let chain_mutations = s.chain.mutation_count();

        let opened = s
            .engine
            .ensure_liquidity(&source, &s.primary_id, 10_000)
            .await
            .unwrap();

        assert!(opened.is_none());
        assert_eq!(s.chain.mutation_count(), chain_mutations);
        assert_eq!(s.source.channels().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_liquidity_is_used() {
        let s = setup();
        s.source.add_channel(&s.primary_id, 1_000_000, 500_000);
        let source: Arc<dyn LightningNode> = s.source.clone();

        let opened = s
            .engine
            .ensure_liquidity(&source, &s.primary_id, 400_000)
            .await
            .unwrap();

        assert!(opened.is_none());
        assert_eq!(s.chain.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_amount_beyond_non_wumbo() {
        let s = setup();
        let source: Arc<dyn LightningNode> = s.source.clone();

        let err = s
            .engine
            .ensure_liquidity(&source, &s.primary_id, MAX_NON_WUMBO_CAPACITY + 1)
            .await
            .unwrap_err();

        assert!(matches!(err, TestkitError::InvariantViolation(_)));
        assert_eq!(s.chain.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_amount_eaten_by_channel_reserve() {
        let s = setup();
        let source: Arc<dyn LightningNode> = s.source.clone();

        let err = s
            .engine
            .ensure_liquidity(&source, &s.primary_id, MAX_CHANNEL_LIQUIDITY + 1)
            .await
            .unwrap_err();

        assert!(matches!(err, TestkitError::InvariantViolation(_)));
        assert_eq!(s.chain.mutation_count(), 0);
        assert!(s.source.channels().is_empty());
    }

    #[tokio::test]
    async fn test_largest_reachable_amount() {
        let s = setup();
        let source: Arc<dyn LightningNode> = s.source.clone();

        s.engine
            .ensure_liquidity(&source, &s.primary_id, MAX_CHANNEL_LIQUIDITY)
            .await
            .unwrap();

        assert_eq!(s.source.channels()[0].capacity_sat, MAX_NON_WUMBO_CAPACITY);
        assert!(source.spendable_sat(&s.primary_id).await.unwrap() >= MAX_CHANNEL_LIQUIDITY);
    }

    #[tokio::test]
    async fn test_capacity_out_of_range() {
        let s = setup();
        let source: Arc<dyn LightningNode> = s.source.clone();

        let err = s
            .engine
            .open_channel(&source, &s.primary_id, u64::MAX, 0, false)
            .await
            .unwrap_err();

        assert!(matches!(err, TestkitError::InvariantViolation(_)));
        assert_eq!(s.chain.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_destination() {
        let s = setup();
        let source: Arc<dyn LightningNode> = s.source.clone();

        let err = s
            .engine
            .ensure_liquidity(&source, "03deadbeef", 10_000)
            .await
            .unwrap_err();

        assert!(matches!(err, TestkitError::UnknownNode { identity } if identity == "03deadbeef"));
        assert!(s.source.channels().is_empty());
    }
}
