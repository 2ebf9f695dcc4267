//! Loading a [`NetworkConfig`] from environment variables.
//!
//! # Environment Variables
//!
//! ## bitcoind
//! - `TESTKIT_BITCOIND_URL` - RPC URL with credentials (required)
//! - `TESTKIT_BITCOIND_PUBLIC_PORT` - RPC port spawned nodes use (optional)
//! - `TESTKIT_ZMQ_TX_PORT` - ZMQ `rawtx` port (required)
//! - `TESTKIT_ZMQ_BLOCK_PORT` - ZMQ `rawblock` port (required)
//!
//! ## Primary LND node
//! - `TESTKIT_LND_URL` - REST URL (required)
//! - `TESTKIT_LND_MACAROON` - admin macaroon in hex (required)
//! - `TESTKIT_LND_TLS_CERT` - path of the PEM certificate (optional)
//! - `TESTKIT_LND_P2P_PORT` - P2P port if the node advertises no URI (optional)
//!
//! ## Waiting
//! - `TESTKIT_WAIT_TIMEOUT` - give up waiting on nodes after this many seconds

use std::str::FromStr;
use std::time::Duration;

use super::config::{BitcoindConfig, LndConfig, NetworkConfig};
use crate::wait::WaitConfig;
use crate::{Result, TestkitError};

/// `TESTKIT_BITCOIND_URL`
pub const BITCOIND_URL: &str = "TESTKIT_BITCOIND_URL";
/// `TESTKIT_BITCOIND_PUBLIC_PORT`
pub const BITCOIND_PUBLIC_PORT: &str = "TESTKIT_BITCOIND_PUBLIC_PORT";
/// `TESTKIT_ZMQ_TX_PORT`
pub const ZMQ_TX_PORT: &str = "TESTKIT_ZMQ_TX_PORT";
/// `TESTKIT_ZMQ_BLOCK_PORT`
pub const ZMQ_BLOCK_PORT: &str = "TESTKIT_ZMQ_BLOCK_PORT";
/// `TESTKIT_LND_URL`
pub const LND_URL: &str = "TESTKIT_LND_URL";
/// `TESTKIT_LND_MACAROON`
pub const LND_MACAROON: &str = "TESTKIT_LND_MACAROON";
/// `TESTKIT_LND_TLS_CERT`
pub const LND_TLS_CERT: &str = "TESTKIT_LND_TLS_CERT";
/// `TESTKIT_LND_P2P_PORT`
pub const LND_P2P_PORT: &str = "TESTKIT_LND_P2P_PORT";
/// `TESTKIT_WAIT_TIMEOUT`
pub const WAIT_TIMEOUT: &str = "TESTKIT_WAIT_TIMEOUT";

impl NetworkConfig {
    /// Load the configuration from `TESTKIT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let bitcoind = BitcoindConfig::new(vars.required(BITCOIND_URL)?);
        let mut lnd = LndConfig::new(vars.required(LND_URL)?, vars.required(LND_MACAROON)?);
        if let Some(path) = vars.optional(LND_TLS_CERT) {
            lnd = lnd.with_tls_cert(path);
        }
        if let Some(port) = vars.parsed(LND_P2P_PORT)? {
            lnd = lnd.with_p2p_port(port);
        }

        let zmq_tx = vars.parsed(ZMQ_TX_PORT)?.ok_or_else(|| missing(ZMQ_TX_PORT))?;
        let zmq_block = vars
            .parsed(ZMQ_BLOCK_PORT)?
            .ok_or_else(|| missing(ZMQ_BLOCK_PORT))?;
        let mut config = NetworkConfig::new(bitcoind, lnd, zmq_tx, zmq_block);

        if let Some(port) = vars.parsed(BITCOIND_PUBLIC_PORT)? {
            config = config.with_bitcoind_public_port(port);
        }
        if let Some(secs) = vars.parsed::<u64>(WAIT_TIMEOUT)? {
            config = config.with_wait(WaitConfig::default().with_timeout(Duration::from_secs(secs)));
        }

        Ok(config)
    }
}

fn missing(name: &str) -> TestkitError {
    TestkitError::invalid_data(name, "environment variable not set")
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, name: &str) -> Result<String> {
        self.optional(name).ok_or_else(|| missing(name))
    }

    fn parsed<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.optional(name)
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|_| TestkitError::invalid_data(name, format!("invalid value {}", value)))
            })
            .transpose()
    }
}
