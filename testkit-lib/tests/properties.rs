//! Property tests for address and link parsing.

use lnpbp_testkit::{parse_link, P2PAddress, PaymentIntent};
use proptest::prelude::*;

fn any_identity() -> impl Strategy<Value = String> {
    "0[23][0-9a-f]{64}"
}

fn any_host() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z][a-z0-9-]{0,20}(\\.[a-z]{2,5})?",
        (any::<u8>(), any::<u8>(), any::<u8>(), any::<u8>())
            .prop_map(|(a, b, c, d)| format!("{}.{}.{}.{}", a, b, c, d)),
    ]
}

fn any_amount() -> impl Strategy<Value = String> {
    (0u64..21_000_000, 0u32..100_000_000).prop_map(|(btc, sats)| format!("{}.{:08}", btc, sats))
}

proptest! {
    #[test]
    fn p2p_address_round_trip(identity in any_identity(), host in any_host(), port in any::<u16>()) {
        let address = P2PAddress::new(identity, host, port);
        let parsed: P2PAddress = address.to_string().parse().unwrap();
        prop_assert_eq!(parsed, address);
    }

    #[test]
    fn bip21_amount_position_does_not_matter(
        address in "bcrt1q[02-9ac-hj-np-z]{38}",
        amount in any_amount(),
        label in "[a-zA-Z0-9]{1,12}",
    ) {
        let first = format!("bitcoin:{}?amount={}&label={}", address, amount, label);
        let later = format!("bitcoin:{}?label={}&amount={}", address, label, amount);
        let expected = PaymentIntent::chain(address.clone(), amount.clone());

        prop_assert_eq!(parse_link(&first).unwrap(), expected.clone());
        prop_assert_eq!(parse_link(&later).unwrap(), expected);
    }

    #[test]
    fn bip21_amount_alone(address in "bcrt1q[02-9ac-hj-np-z]{38}", amount in any_amount()) {
        let link = format!("BITCOIN:{}?amount={}", address, amount);
        prop_assert_eq!(parse_link(&link).unwrap(), PaymentIntent::chain(address, amount));
    }
}
