//! End-to-end orchestration tests over the in-memory collaborators.

#![cfg(feature = "test-utils")]

use std::time::Duration;

use lnpbp_testkit::lightning::ChannelPolicy;
use lnpbp_testkit::liquidity::MAX_NON_WUMBO_CAPACITY;
use lnpbp_testkit::registry::SECONDARY_NODE_ID;
use lnpbp_testkit::test_utils::{alice_bob_scenario, bip21, TestFixtures, TestNetwork};
use lnpbp_testkit::{ChainControl, LightningNode, PaymentReceipt, TestkitError, WarmUp};

#[tokio::test]
async fn test_alice_bob_scenario() {
    let t = TestNetwork::empty_chain();
    t.network
        .warm_up(WarmUp {
            spawn_secondary: false,
            ..WarmUp::default()
        })
        .await
        .unwrap();

    let loaded = t
        .network
        .load_scenario(&alice_bob_scenario(1_000_000))
        .await
        .unwrap();

    assert_eq!(loaded.nodes.len(), 2);
    for node in &loaded.nodes {
        let by_name = t.network.node(&node.name).expect("registered by name");
        let by_identity = t
            .network
            .registry()
            .node_by_identity(&node.identity)
            .expect("registered by identity");
        assert_eq!(
            by_name.identity().await.unwrap(),
            by_identity.identity().await.unwrap()
        );
    }

    let alice = t.spawner.node("alice").unwrap();
    let bob = t.spawner.node("bob").unwrap();
    let channels = alice.channels();
    assert_eq!(channels.len(), 1);
    assert!(channels[0].capacity_sat >= 1_000_000);
    assert_eq!(channels[0].remote, bob.identity().await.unwrap());

    assert_eq!(alice.policies()[0].1, ChannelPolicy::default());
    assert_eq!(bob.policies()[0].1, ChannelPolicy::default());
    assert_eq!(
        ChannelPolicy::default(),
        ChannelPolicy {
            base_fee_msat: 1000,
            fee_rate_ppm: 100,
            time_lock_delta: 144
        }
    );
}

#[tokio::test]
async fn test_pay_scenario_node_invoice() {
    let t = TestNetwork::new();
    t.network
        .load_scenario(&alice_bob_scenario(500_000))
        .await
        .unwrap();
    let bob = t.spawner.node("bob").unwrap();
    let invoice = bob.create_invoice(10_000_000, Some("coffee")).await.unwrap();

    let receipt = t.network.auto_pay(&invoice).await.unwrap();

    assert!(matches!(
        receipt,
        PaymentReceipt::Lightning {
            amount_msat: 10_000_000,
            ..
        }
    ));
    let secondary = t.spawner.node(SECONDARY_NODE_ID).unwrap();
    assert_eq!(secondary.paid_invoices(), vec![invoice]);
    assert_eq!(secondary.channels()[0].remote, bob.identity().await.unwrap());
}

#[tokio::test]
async fn test_chain_payment_is_confirmed() {
    let t = TestNetwork::empty_chain();
    t.network
        .warm_up(WarmUp {
            spawn_secondary: false,
            ..WarmUp::default()
        })
        .await
        .unwrap();
    let address = TestFixtures::address(0);

    let receipt = t.network.auto_pay(&bip21(address, "1.5")).await.unwrap();

    assert!(matches!(receipt, PaymentReceipt::Chain { .. }));
    assert_eq!(t.chain.sends(), vec![(address.to_string(), 150_000_000)]);
    assert_eq!(t.chain.mempool_size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_links_have_no_side_effects() {
    let t = TestNetwork::new();

    for link in TestFixtures::INVALID_LINKS {
        let err = t.network.auto_pay(link).await.unwrap_err();
        assert!(matches!(err, TestkitError::InvalidLink(_)), "{}: {:?}", link, err);
    }

    assert_eq!(t.chain.mutation_count(), 0);
    assert!(t.spawner.spawned().is_empty());
}

#[tokio::test]
async fn test_mine_blocks() {
    let t = TestNetwork::new();
    let height = t.chain.block_height().await.unwrap();

    assert!(matches!(t.network.mine_blocks(0).await, Err(TestkitError::InvariantViolation(_))));
    assert!(matches!(t.network.mine_blocks(-1).await, Err(TestkitError::InvariantViolation(_))));
    t.network.mine_blocks(1).await.unwrap();

    assert_eq!(t.chain.block_height().await.unwrap(), height + 1);
}

#[tokio::test(start_paused = true)]
async fn test_auto_mining_lifecycle() {
    let t = TestNetwork::new();

    assert!(matches!(
        t.network.stop_auto_mining().await,
        Err(TestkitError::InvariantViolation(_))
    ));
    t.network.start_auto_mining(Duration::from_secs(3), 6).await.unwrap();
    assert!(t.network.is_auto_mining().await);
    assert!(matches!(
        t.network.start_auto_mining(Duration::from_secs(3), 6).await,
        Err(TestkitError::InvariantViolation(_))
    ));

    t.chain.broadcast("app-tx");
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(t.chain.mempool_size().await.unwrap(), 0);

    t.network.stop_auto_mining().await.unwrap();
    assert!(!t.network.is_auto_mining().await);
}

#[tokio::test]
async fn test_refund_invoice_flow() {
    let t = TestNetwork::new();
    let invoice = t.network.create_lightning_invoice(5_000, None).await.unwrap();

    // the app under test pays it
    t.primary.settle_invoice(invoice.invoice());

    assert!(invoice.wait_paid().await.unwrap());
}

#[tokio::test]
async fn test_unreachable_invoice_amount_fails_before_funding() {
    let t = TestNetwork::new();
    let amount_sat = MAX_NON_WUMBO_CAPACITY - 10_000;
    let invoice = t
        .primary
        .create_invoice(amount_sat * 1000, None)
        .await
        .unwrap();

    let err = t.network.auto_pay(&invoice).await.unwrap_err();

    assert!(matches!(err, TestkitError::InvariantViolation(_)), "{:?}", err);
    assert_eq!(t.chain.mutation_count(), 0);
    let secondary = t.spawner.node(SECONDARY_NODE_ID).unwrap();
    assert!(secondary.channels().is_empty());
}
