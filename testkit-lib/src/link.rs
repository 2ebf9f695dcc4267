//! Payment link parser.
//!
//! Classifies the strings a test hands to [`Network::auto_pay`](crate::Network::auto_pay)
//! into a typed [`PaymentIntent`]:
//!
//! - `bitcoin:<address>?amount=<btc>[&...]` (BIP21, amount is mandatory)
//! - `lightning:<invoice>` or a bare regtest invoice (`lnbcrt...`)
//!
//! Anything that could be a payment on another network, or an on-chain
//! payment without an amount, is rejected instead of guessed at.
//!
//! # Examples
//!
//! ```rust
//! use lnpbp_testkit::link::{parse_link, PaymentIntent};
//!
//! let intent = parse_link("bitcoin:bcrt1qexample?amount=0.001").unwrap();
//! assert_eq!(intent.amount_sat().unwrap(), Some(100_000));
//!
//! let intent = parse_link("lightning:lnbcrt10u1pexample").unwrap();
//! assert!(matches!(intent, PaymentIntent::Lightning { .. }));
//!
//! assert!(parse_link("lnbc10u1pmainnet").is_err());
//! ```

use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use crate::{Result, TestkitError};

/// Human-readable prefix of regtest BOLT11 invoices.
pub const REGTEST_INVOICE_PREFIX: &str = "lnbcrt";

const SATS_PER_BTC: i64 = 100_000_000;

/// A parsed payment link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PaymentIntent {
    /// Send `amount` BTC to `address` on chain.
    Chain {
        /// Destination address, passed to the chain unmodified.
        address: String,
        /// Decimal BTC amount exactly as written in the link.
        amount: String,
    },
    /// Pay a BOLT11 invoice.
    Lightning {
        /// The invoice without any `lightning:` scheme.
        invoice: String,
    },
}

impl PaymentIntent {
    /// On-chain payment of a decimal BTC amount.
    pub fn chain(address: impl Into<String>, amount: impl Into<String>) -> Self {
        Self::Chain {
            address: address.into(),
            amount: amount.into(),
        }
    }

    /// Lightning payment of an invoice.
    pub fn lightning(invoice: impl Into<String>) -> Self {
        Self::Lightning {
            invoice: invoice.into(),
        }
    }

    /// The chain amount converted to satoshis, `None` for Lightning intents.
    pub fn amount_sat(&self) -> Result<Option<u64>> {
        match self {
            Self::Chain { amount, .. } => btc_to_sat(amount).map(Some),
            Self::Lightning { .. } => Ok(None),
        }
    }
}

impl fmt::Display for PaymentIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chain { address, amount } => write!(f, "bitcoin:{}?amount={}", address, amount),
            Self::Lightning { invoice } => write!(f, "lightning:{}", invoice),
        }
    }
}

impl FromStr for PaymentIntent {
    type Err = TestkitError;

    fn from_str(s: &str) -> Result<Self> {
        parse_link(s)
    }
}

/// Parse a payment link.
///
/// # Errors
///
/// Returns [`TestkitError::InvalidLink`] when the link is not a BIP21 URI with
/// an amount, a `lightning:` URI, or a bare regtest invoice.
pub fn parse_link(link: &str) -> Result<PaymentIntent> {
    let link = link.trim();

    let Some((schema, rest)) = link.split_once(':') else {
        return parse_bare(link);
    };

    if schema.eq_ignore_ascii_case("bitcoin") {
        parse_bip21(rest)
    } else if schema.eq_ignore_ascii_case("lightning") {
        parse_bare(rest)
    } else {
        Err(TestkitError::invalid_link("unknown schema"))
    }
}

/// A link without a scheme: only regtest invoices are accepted.
fn parse_bare(link: &str) -> Result<PaymentIntent> {
    let lower = link.to_ascii_lowercase();

    if lower.starts_with('1') || lower.starts_with('3') || lower.starts_with("bc1") {
        return Err(TestkitError::invalid_link(
            "address can't be used as a payment link because it's missing amount",
        ));
    }
    if lower.starts_with(REGTEST_INVOICE_PREFIX) {
        return Ok(PaymentIntent::lightning(link));
    }
    if lower.starts_with("ln") {
        return Err(TestkitError::invalid_link(
            "attempt to pay an invoice from a different network, only regtest is allowed",
        ));
    }

    Err(TestkitError::invalid_link("unknown payment link format"))
}

/// `address?amount=<btc>[&...]`, the part after `bitcoin:`.
fn parse_bip21(uri: &str) -> Result<PaymentIntent> {
    let mut parts = uri.split('?');
    let address = parts.next().unwrap_or_default();
    let params = parts
        .next()
        .ok_or_else(|| TestkitError::invalid_link("unknown amount"))?;
    if parts.next().is_some() {
        return Err(TestkitError::invalid_link(
            "invalid character '?' in the parameters",
        ));
    }
    if address.is_empty() {
        return Err(TestkitError::invalid_link("missing address"));
    }

    let start = if params.starts_with("amount=") {
        "amount=".len()
    } else {
        params
            .find("&amount=")
            .map(|pos| pos + "&amount=".len())
            .ok_or_else(|| TestkitError::invalid_link("unknown amount"))?
    };
    let end = params[start..]
        .find('&')
        .map(|len| start + len)
        .unwrap_or(params.len());

    let amount = &params[start..end];
    if amount.is_empty() {
        return Err(TestkitError::invalid_link("unknown amount"));
    }

    Ok(PaymentIntent::chain(address, amount))
}

/// Convert a decimal BTC amount to satoshis without rounding.
pub fn btc_to_sat(amount: &str) -> Result<u64> {
    let invalid = |reason: &str| TestkitError::invalid_link(format!("amount {}: {}", amount, reason));

    let btc = Decimal::from_str(amount).map_err(|e| invalid(&e.to_string()))?;
    if btc.is_sign_negative() {
        return Err(invalid("must not be negative"));
    }
    let sats = btc * Decimal::from(SATS_PER_BTC);
    if !sats.fract().is_zero() {
        return Err(invalid("more than 8 decimal places"));
    }
    u64::try_from(sats).map_err(|e| invalid(&e.to_string()))
}

/// Render satoshis as a decimal BTC amount (`12345` → `"0.00012345"`).
pub fn sat_to_btc(sats: u64) -> String {
    Decimal::from_i128_with_scale(i128::from(sats), 8).to_string()
}
