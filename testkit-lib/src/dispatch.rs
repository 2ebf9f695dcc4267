//! Payment dispatch.
//!
//! Executes a [`PaymentIntent`] end to end: on-chain intents are paid from the
//! bitcoind wallet, Lightning intents from the secondary node after making
//! sure it has a channel to the payee.

use std::sync::Arc;

use crate::funding::ChainFunder;
use crate::link::PaymentIntent;
use crate::liquidity::LiquidityEngine;
use crate::registry::NodeRegistry;
use crate::Result;

/// What a dispatched payment produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentReceipt {
    /// Confirmed on-chain payment.
    Chain {
        /// Transaction id
        txid: String,
    },
    /// Lightning payment.
    Lightning {
        /// Payment hash of the paid invoice
        payment_hash: String,
        /// Amount paid
        amount_msat: u64,
    },
}

/// Pays parsed payment links.
#[derive(Clone)]
pub struct Dispatcher {
    funder: ChainFunder,
    liquidity: LiquidityEngine,
    registry: Arc<NodeRegistry>,
}

impl Dispatcher {
    /// Dispatcher over the given collaborators.
    pub fn new(funder: ChainFunder, liquidity: LiquidityEngine, registry: Arc<NodeRegistry>) -> Self {
        Self {
            funder,
            liquidity,
            registry,
        }
    }

    /// Pay `intent`.
    #[tracing::instrument(skip(self, intent), fields(intent = %intent))]
    pub async fn auto_pay(&self, intent: &PaymentIntent) -> Result<PaymentReceipt> {
        match intent {
            PaymentIntent::Chain { address, .. } => {
                let amount_sat = intent.amount_sat()?.unwrap_or_default();
                let txid = self.funder.pay_to_address(address, amount_sat).await?;
                Ok(PaymentReceipt::Chain { txid })
            }
            PaymentIntent::Lightning { invoice } => {
                let payer = self.registry.secondary().await?;
                let parsed = self.registry.primary().parse_invoice(invoice).await?;

                self.liquidity
                    .ensure_liquidity(&payer, &parsed.destination, parsed.amount_sat())
                    .await?;
                payer.pay_invoice(invoice).await?;

                tracing::info!(payment_hash = %parsed.payment_hash, "invoice paid");
                Ok(PaymentReceipt::Lightning {
                    payment_hash: parsed.payment_hash,
                    amount_msat: parsed.amount_msat,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainControl;
    use crate::lightning::LightningNode;
    use crate::registry::SECONDARY_NODE_ID;
    use crate::test_utils::{MockChain, MockLightningNode, MockSpawner};
    use crate::wait::WaitConfig;
    use crate::TestkitError;
    use std::time::Duration;

    struct Setup {
        chain: Arc<MockChain>,
        primary: Arc<MockLightningNode>,
        spawner: Arc<MockSpawner>,
        dispatcher: Dispatcher,
    }

    fn setup() -> Setup {
        let chain = MockChain::with_height(101);
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
            dispatcher: Dispatcher::new(funder, liquidity, registry),
        }
    }

    #[tokio::test]
    async fn test_chain_payment() {
        let s = setup();
        let intent = PaymentIntent::chain("bcrt1qmerchant", "0.001");

        let receipt = s.dispatcher.auto_pay(&intent).await.unwrap();

        assert!(matches!(receipt, PaymentReceipt::Chain { .. }));
        assert_eq!(s.chain.sends(), vec![("bcrt1qmerchant".to_string(), 100_000)]);
        assert_eq!(s.chain.mempool_size().await.unwrap(), 0);
        assert!(s.spawner.spawned().is_empty());
    }

    #[tokio::test]
    async fn test_lightning_payment_opens_channel_from_secondary() {
        let s = setup();
        let invoice = s.primary.create_invoice(25_000_500, None).await.unwrap();

        let receipt = s
            .dispatcher
            .auto_pay(&PaymentIntent::lightning(invoice.clone()))
            .await
            .unwrap();

        match receipt {
            PaymentReceipt::Lightning { amount_msat, .. } => assert_eq!(amount_msat, 25_000_500),
            other => panic!("unexpected receipt {:?}", other),
        }

        let secondary = s.spawner.node(SECONDARY_NODE_ID).unwrap();
        assert!(secondary.wait_init_calls() >= 1);
        assert_eq!(secondary.paid_invoices(), vec![invoice]);

        let channels = secondary.channels();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].remote, MockLightningNode::identity_for("primary"));
        // ceil(25_000_500 msat) = 25_001 sat, doubled
        assert_eq!(channels[0].capacity_sat, 50_002);
    }

    #[tokio::test]
    async fn test_lightning_payment_to_unknown_node() {
        let s = setup();
        let stranger = MockLightningNode::new("stranger");
        let invoice = stranger.create_invoice(1_000_000, None).await.unwrap();

        let err = s
            .dispatcher
            .auto_pay(&PaymentIntent::lightning(invoice))
            .await
            .unwrap_err();

        assert!(matches!(err, TestkitError::UnknownNode { .. }));
    }
}
