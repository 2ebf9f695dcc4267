//! The test network façade.
//!
//! [`Network`] is what test suites hold on to. It owns the chain client, the
//! node registry, the auto-miner and the engines built on top of them, and
//! exposes the handful of operations a test needs: warm the network up, pay a
//! link, create an invoice to be paid, mine, and load scenarios.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::{ChainControl, COINBASE_MATURITY};
use crate::dispatch::{Dispatcher, PaymentReceipt};
use crate::executors::{BitcoindRpc, LndRestNode, NetworkConfig, SystemdLndSpawner};
use crate::funding::ChainFunder;
use crate::lightning::{InvoiceHandle, LightningNode};
use crate::link::{parse_link, PaymentIntent};
use crate::liquidity::{LiquidityEngine, MAX_NON_WUMBO_CAPACITY};
use crate::miner::AutoMiner;
use crate::ports::{FilePortAllocator, PortAllocator};
use crate::registry::NodeRegistry;
use crate::scenario::ScenarioSpec;
use crate::spawn::NodeSpawner;
use crate::topology::{LoadedScenario, TopologyBuilder};
use crate::wait::WaitConfig;
use crate::{Result, TestkitError};

/// Liquidity the warm-up provides from the secondary to the primary node.
///
/// Half the non-wumbo limit, so the doubled channel still fits in it.
pub const WARMUP_LIQUIDITY_SAT: u64 = MAX_NON_WUMBO_CAPACITY / 2;

/// Name of the wallet created when bitcoind has none loaded.
pub const DEFAULT_WALLET_NAME: &str = "testkit";

/// What [`Network::warm_up`] should prepare.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WarmUp {
    /// Mine until coinbase outputs are spendable.
    pub mine_blocks: bool,
    /// Spawn the secondary node and wait for it.
    pub spawn_secondary: bool,
    /// Open a channel from the secondary to the primary node.
    pub open_channels: bool,
}

impl Default for WarmUp {
    fn default() -> Self {
        Self {
            mine_blocks: true,
            spawn_secondary: true,
            open_channels: false,
        }
    }
}

impl WarmUp {
    /// Everything, including the warm-up channel.
    pub fn full() -> Self {
        Self {
            open_channels: true,
            ..Self::default()
        }
    }
}

/// Builder for [`Network`].
pub struct NetworkBuilder {
    chain: Arc<dyn ChainControl>,
    primary: Arc<dyn LightningNode>,
    spawner: Arc<dyn NodeSpawner>,
    secondary: Option<Arc<dyn LightningNode>>,
    wait: WaitConfig,
    retry_pause: Duration,
    wallet_name: String,
}

impl NetworkBuilder {
    /// Use a running node as the secondary instead of spawning one.
    pub fn secondary(mut self, node: Arc<dyn LightningNode>) -> Self {
        self.secondary = Some(node);
        self
    }

    /// Polling policy for channel activation and invoice waits.
    pub fn wait(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    /// Pause before retrying a failed mining-address request.
    pub fn retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = pause;
        self
    }

    /// Wallet created when bitcoind has none loaded.
    pub fn wallet_name(mut self, name: impl Into<String>) -> Self {
        self.wallet_name = name.into();
        self
    }

    /// Assemble the network.
    pub fn build(self) -> Network {
        let mut registry = NodeRegistry::new(self.primary, self.spawner);
        if let Some(secondary) = self.secondary {
            registry = registry.with_secondary(secondary);
        }
        let registry = Arc::new(registry);

        let funder = ChainFunder::new(self.chain.clone()).with_retry_pause(self.retry_pause);
        let liquidity = LiquidityEngine::new(funder.clone(), registry.clone(), self.wait.clone());

        Network {
            dispatcher: Dispatcher::new(funder.clone(), liquidity.clone(), registry.clone()),
            topology: TopologyBuilder::new(registry.clone(), funder.clone(), liquidity.clone()),
            miner: AutoMiner::new(self.chain.clone()),
            chain: self.chain,
            registry,
            funder,
            liquidity,
            wait: self.wait,
            wallet_name: self.wallet_name,
        }
    }
}

/// A regtest network of one bitcoind and any number of Lightning nodes.
pub struct Network {
    chain: Arc<dyn ChainControl>,
    registry: Arc<NodeRegistry>,
    funder: ChainFunder,
    liquidity: LiquidityEngine,
    dispatcher: Dispatcher,
    topology: TopologyBuilder,
    miner: AutoMiner,
    wait: WaitConfig,
    wallet_name: String,
}

impl Network {
    /// Start building a network around the given collaborators.
    pub fn builder(
        chain: Arc<dyn ChainControl>,
        primary: Arc<dyn LightningNode>,
        spawner: Arc<dyn NodeSpawner>,
    ) -> NetworkBuilder {
        NetworkBuilder {
            chain,
            primary,
            spawner,
            secondary: None,
            wait: WaitConfig::default(),
            retry_pause: Duration::from_secs(5),
            wallet_name: DEFAULT_WALLET_NAME.to_string(),
        }
    }

    /// Network with default settings.
    pub fn new(
        chain: Arc<dyn ChainControl>,
        primary: Arc<dyn LightningNode>,
        spawner: Arc<dyn NodeSpawner>,
    ) -> Self {
        Self::builder(chain, primary, spawner).build()
    }

    /// Network talking to the bitcoind and LND described by `config`.
    ///
    /// Secondary and scenario nodes are launched as systemd user services.
    pub fn from_config(config: &NetworkConfig) -> Result<Self> {
        let chain = Arc::new(BitcoindRpc::new(config.bitcoind.clone())?);
        let primary = Arc::new(LndRestNode::new(config.lnd.clone(), config.wait.clone())?);

        let ports: Arc<dyn PortAllocator> = match &config.ports_file {
            Some(path) => Arc::new(FilePortAllocator::new(path)),
            None => Arc::new(FilePortAllocator::in_data_dir()?),
        };
        let spawner = Arc::new(SystemdLndSpawner::from_network_config(config, ports)?);

        let mut builder = Self::builder(chain, primary, spawner)
            .wait(config.wait.clone())
            .retry_pause(Duration::from_secs(config.confirm_retry_pause_secs))
            .wallet_name(config.wallet_name.clone());
        if let Some(secondary) = &config.secondary_lnd {
            builder = builder.secondary(Arc::new(LndRestNode::new(
                secondary.clone(),
                config.wait.clone(),
            )?));
        }

        Ok(builder.build())
    }

    /// Load a JSON or TOML config file and build the network from it.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Self::from_config(&NetworkConfig::from_file(path)?)
    }

    /// Network backed by the system regtest packages installed from CADR.
    pub fn from_system() -> Result<Self> {
        Self::from_config(&NetworkConfig::from_system()?)
    }

    /// Prepare the network for a test run.
    ///
    /// # Errors
    ///
    /// [`TestkitError::InvariantViolation`] if channels are requested without
    /// the secondary node.
    #[tracing::instrument(skip(self))]
    pub async fn warm_up(&self, warm_up: WarmUp) -> Result<()> {
        if warm_up.open_channels && !warm_up.spawn_secondary {
            return Err(TestkitError::invariant(
                "impossible to prepare channels without also preparing the secondary node",
            ));
        }

        self.ensure_wallet().await?;
        if warm_up.mine_blocks {
            self.funder.ensure_height(COINBASE_MATURITY).await?;
        }

        if warm_up.spawn_secondary {
            let secondary = self.registry.secondary().await?;
            if warm_up.open_channels {
                let primary = self.registry.primary().identity().await?;
                self.liquidity
                    .ensure_liquidity(&secondary, &primary, WARMUP_LIQUIDITY_SAT)
                    .await?;
            }
        }

        tracing::info!("network warmed up");
        Ok(())
    }

    async fn ensure_wallet(&self) -> Result<()> {
        if self.chain.list_wallets().await?.is_empty() {
            tracing::info!(wallet = %self.wallet_name, "creating wallet");
            self.chain.create_wallet(&self.wallet_name).await?;
        }
        Ok(())
    }

    /// Pay a BIP21 URI or a regtest invoice, funding whatever is missing.
    pub async fn auto_pay(&self, link: &str) -> Result<PaymentReceipt> {
        let intent = parse_link(link)?;
        self.dispatcher.auto_pay(&intent).await
    }

    /// Send a decimal BTC `amount` to `address` on chain.
    pub async fn auto_pay_legacy(&self, address: &str, amount: &str) -> Result<PaymentReceipt> {
        let intent = PaymentIntent::chain(address, amount);
        self.dispatcher.auto_pay(&intent).await
    }

    /// Issue an invoice from the primary node for the app under test to pay.
    pub async fn create_lightning_invoice(
        &self,
        amount_msat: u64,
        memo: Option<&str>,
    ) -> Result<InvoiceHandle> {
        let primary = self.registry.primary();
        let invoice = primary.create_invoice(amount_msat, memo).await?;
        Ok(InvoiceHandle::new(invoice, primary, self.wait.clone()))
    }

    /// Mine `count` blocks.
    ///
    /// Takes a signed count so that callers passing a computed value get an
    /// error instead of a wrap-around.
    pub async fn mine_blocks(&self, count: i64) -> Result<Vec<String>> {
        if count < 1 {
            return Err(TestkitError::invariant(format!(
                "can't mine {} blocks, at least one is required",
                count
            )));
        }
        self.funder.mine(count as u64).await
    }

    /// Start confirming mempool transactions in the background.
    ///
    /// See [`miner::DEFAULT_POLL_INTERVAL`](crate::miner::DEFAULT_POLL_INTERVAL)
    /// and [`miner::DEFAULT_CONFIRM_BLOCKS`](crate::miner::DEFAULT_CONFIRM_BLOCKS)
    /// for the usual values.
    pub async fn start_auto_mining(&self, poll_interval: Duration, confirm_blocks: u64) -> Result<()> {
        self.miner.start(poll_interval, confirm_blocks).await
    }

    /// Stop background mining.
    pub async fn stop_auto_mining(&self) -> Result<()> {
        self.miner.stop().await
    }

    /// Whether background mining runs.
    pub async fn is_auto_mining(&self) -> bool {
        self.miner.is_running().await
    }

    /// Spawn the nodes of a scenario and open its channels.
    pub async fn load_scenario(&self, spec: &ScenarioSpec) -> Result<LoadedScenario> {
        self.topology.load(spec).await
    }

    /// [`Network::load_scenario`] from a JSON or TOML file.
    pub async fn load_scenario_file(&self, path: &Path) -> Result<LoadedScenario> {
        let spec = ScenarioSpec::from_file(path)?;
        self.load_scenario(&spec).await
    }

    /// Scenario node by name.
    pub fn node(&self, name: &str) -> Option<Arc<dyn LightningNode>> {
        self.registry.node(name)
    }

    /// The primary node.
    pub fn primary_node(&self) -> Arc<dyn LightningNode> {
        self.registry.primary()
    }

    /// The secondary node, spawning it if needed.
    pub async fn secondary_node(&self) -> Result<Arc<dyn LightningNode>> {
        self.registry.secondary().await
    }

    /// The chain client.
    pub fn chain(&self) -> Arc<dyn ChainControl> {
        self.chain.clone()
    }

    /// The node registry.
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SECONDARY_NODE_ID;
    use crate::test_utils::{ChainCall, TestNetwork};

    #[tokio::test]
    async fn test_warm_up_creates_wallet_and_blocks() {
        let t = TestNetwork::empty_chain();

        t.network
            .warm_up(WarmUp {
                spawn_secondary: false,
                ..WarmUp::default()
            })
            .await
            .unwrap();

        assert_eq!(t.chain.calls()[0], ChainCall::CreateWallet("testkit".into()));
        assert_eq!(t.chain.height(), COINBASE_MATURITY);
        assert!(t.spawner.spawned().is_empty());
    }

    #[tokio::test]
    async fn test_warm_up_channels_need_secondary() {
        let t = TestNetwork::new();

        let err = t
            .network
            .warm_up(WarmUp {
                spawn_secondary: false,
                open_channels: true,
                mine_blocks: true,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TestkitError::InvariantViolation(_)));
        assert_eq!(t.chain.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_full_warm_up_opens_channel_to_primary() {
        let t = TestNetwork::new();

        t.network.warm_up(WarmUp::full()).await.unwrap();

        let secondary = t.spawner.node(SECONDARY_NODE_ID).unwrap();
        let channels = secondary.channels();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].remote, t.primary_identity());
        assert!(channels[0].capacity_sat <= MAX_NON_WUMBO_CAPACITY);

        // a second warm-up changes nothing
        let mutations = t.chain.mutation_count();
        t.network.warm_up(WarmUp::full()).await.unwrap();
        assert_eq!(t.chain.mutation_count(), mutations);
        assert_eq!(t.spawner.spawned().len(), 1);
    }

    #[tokio::test]
    async fn test_mine_blocks_bounds() {
        let t = TestNetwork::new();
        let height = t.chain.height();

        for count in [0, -1] {
            assert!(matches!(
                t.network.mine_blocks(count).await,
                Err(TestkitError::InvariantViolation(_))
            ));
        }
        assert_eq!(t.chain.height(), height);

        let hashes = t.network.mine_blocks(1).await.unwrap();
        assert_eq!(hashes.len(), 1);
        assert_eq!(t.chain.height(), height + 1);
    }

    #[tokio::test]
    async fn test_auto_pay_rejects_bad_links_without_side_effects() {
        let t = TestNetwork::new();

        for link in [
            "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2",
            "lnbc10u1pmainnet",
            "bitcoin:bcrt1qxyz",
        ] {
            assert!(matches!(
                t.network.auto_pay(link).await,
                Err(TestkitError::InvalidLink(_))
            ));
        }
        assert_eq!(t.chain.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_auto_pay_legacy() {
        let t = TestNetwork::new();

        t.network
            .auto_pay_legacy("bcrt1qlegacy", "0.25")
            .await
            .unwrap();

        assert_eq!(t.chain.sends(), vec![("bcrt1qlegacy".to_string(), 25_000_000)]);
    }

    #[tokio::test]
    async fn test_invoice_from_primary() {
        let t = TestNetwork::new();

        let invoice = t
            .network
            .create_lightning_invoice(42_000, Some("refund"))
            .await
            .unwrap();

        assert!(invoice.payment_uri().starts_with("lightning:lnbcrt42000"));
        assert!(!invoice.is_paid().await.unwrap());
        t.primary.settle_invoice(invoice.invoice());
        assert!(invoice.is_paid().await.unwrap());
    }
}
