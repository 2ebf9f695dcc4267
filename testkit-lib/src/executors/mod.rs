//! Collaborators talking to real bitcoind and LND processes.
//!
//! ## Feature Flags
//!
//! The `http-executor` feature (on by default) compiles the HTTP clients.
//! Without it [`BitcoindRpc`] and [`LndRestNode`] still construct, but every
//! call fails with a transport error.
//!
//! ## Backends
//!
//! - [`BitcoindRpc`] - JSON-RPC 1.0 client, implements
//!   [`ChainControl`](crate::ChainControl)
//! - [`LndRestNode`] - LND REST client, implements
//!   [`LightningNode`](crate::LightningNode)
//! - [`SystemdLndSpawner`] - launches additional LND nodes as systemd user
//!   services, implements [`NodeSpawner`](crate::NodeSpawner)
//!
//! [`NetworkConfig::from_system`] reads the configuration of the regtest
//! packages from the Cryptoanarchy Debian Repository under `/etc`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lnpbp_testkit::executors::{LndConfig, LndRestNode};
//! use lnpbp_testkit::{LightningNode, WaitConfig};
//!
//! let config = LndConfig::new("https://127.0.0.1:8080", "0201...")
//!     .with_tls_cert("/var/lib/lnd/tls.cert");
//! let node = LndRestNode::new(config, WaitConfig::default())?;
//!
//! node.wait_init().await?;
//! println!("{}", node.p2p_address().await?);
//! ```

mod bitcoind;
mod cadr;
mod config;
pub mod env;
mod lnd;
mod systemd;

pub use bitcoind::BitcoindRpc;
pub use cadr::SystemPaths;
pub use config::{BitcoindConfig, LndConfig, NetworkConfig, RpcEndpoint};
pub use lnd::{LndRestNode, MACAROON_HEADER};
pub use systemd::{
    alias_color, resource, unit_name, BitcoindPorts, NodePorts, SystemdLndSpawner,
};
