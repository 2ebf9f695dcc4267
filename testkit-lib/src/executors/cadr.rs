//! System regtest network installed from the Cryptoanarchy Debian Repository.
//!
//! The `bitcoin-regtest`, `bitcoin-rpc-proxy-regtest` and
//! `lnd-system-regtest` packages describe everything the testkit needs in
//! their config files under `/etc`. Reading them requires membership in the
//! `bitcoin-regtest` and `lnd-system-regtest` groups; files the user cannot
//! read are retried through passwordless `sudo`.

use serde::Deserialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::config::{BitcoindConfig, LndConfig, NetworkConfig};
use crate::parsing::{parse_simple_config, port_from_host_port, port_from_uri};
use crate::{Result, TestkitError};

/// Locations of the system config files.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemPaths {
    /// bitcoind config with `rpcport` and `rpccookiefile`.
    pub bitcoind: PathBuf,
    /// bitcoind ZMQ endpoints.
    pub zmq: PathBuf,
    /// RPC proxy listening config (TOML).
    pub rpc_proxy: PathBuf,
    /// System LND config.
    pub lnd: PathBuf,
}

impl Default for SystemPaths {
    fn default() -> Self {
        Self::under("/")
    }
}

impl SystemPaths {
    /// The standard layout below `root` instead of `/`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let etc = root.as_ref().join("etc");
        Self {
            bitcoind: etc.join("bitcoin-regtest/bitcoin.conf"),
            zmq: etc.join("bitcoin-regtest/conf.d/zmq.conf"),
            rpc_proxy: etc.join("bitcoin-rpc-proxy-regtest/conf.d/interface.conf"),
            lnd: etc.join("lnd-system-regtest/lnd.conf"),
        }
    }
}

#[derive(Deserialize)]
struct ProxyInterface {
    bind_port: u16,
}

impl NetworkConfig {
    /// Configuration of the system regtest network.
    pub fn from_system() -> Result<Self> {
        Self::from_system_paths(&SystemPaths::default())
    }

    /// Configuration of a system regtest network laid out as in `paths`.
    pub fn from_system_paths(paths: &SystemPaths) -> Result<Self> {
        let bitcoind = read_config(&paths.bitcoind)?;
        let cookie = read_text(Path::new(lookup(&bitcoind, "rpccookiefile", &paths.bitcoind)?))?;
        let rpc_port: u16 = lookup(&bitcoind, "rpcport", &paths.bitcoind)?
            .parse()
            .map_err(|_| TestkitError::invalid_data("rpcport", "not a port"))?;

        let zmq = read_config(&paths.zmq)?;
        let zmq_block = port_from_uri(lookup(&zmq, "zmqpubrawblock", &paths.zmq)?)?;
        let zmq_tx = port_from_uri(lookup(&zmq, "zmqpubrawtx", &paths.zmq)?)?;

        let proxy: ProxyInterface = toml::from_str(&read_text(&paths.rpc_proxy)?).map_err(|e| {
            TestkitError::Serialization(format!("invalid {}: {}", paths.rpc_proxy.display(), e))
        })?;

        let lnd = read_config(&paths.lnd)?;
        let rest_port = port_from_host_port(lookup(&lnd, "restlisten", &paths.lnd)?)?;
        let p2p_port = port_from_host_port(lookup(&lnd, "listen", &paths.lnd)?)?;
        let macaroon = read_bytes(Path::new(lookup(&lnd, "adminmacaroonpath", &paths.lnd)?))?;
        let tls_cert = lookup(&lnd, "tlscertpath", &paths.lnd)?;

        let lnd = LndConfig::new(format!("https://127.0.0.1:{}", rest_port), hex::encode(macaroon))
            .with_tls_cert(tls_cert)
            .with_p2p_port(p2p_port);
        let bitcoind = BitcoindConfig::new(format!("http://{}@127.0.0.1:{}", cookie.trim(), rpc_port));

        Ok(NetworkConfig::new(bitcoind, lnd, zmq_tx, zmq_block)
            .with_bitcoind_public_port(proxy.bind_port))
    }
}

fn lookup<'a>(config: &'a HashMap<String, String>, key: &str, path: &Path) -> Result<&'a str> {
    config
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| TestkitError::invalid_data(key, format!("missing in {}", path.display())))
}

fn read_config(path: &Path) -> Result<HashMap<String, String>> {
    parse_simple_config(&read_text(path)?)
}

fn read_text(path: &Path) -> Result<String> {
    String::from_utf8(read_bytes(path)?)
        .map_err(|_| TestkitError::invalid_data(path.display().to_string(), "not UTF-8"))
}

/// Read a file, falling back to `sudo -n cat` when access is denied.
fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            tracing::debug!(path = %path.display(), "permission denied, retrying with sudo");
            let output = Command::new("sudo")
                .arg("-n")
                .arg("cat")
                .arg(path)
                .output()
                .map_err(|e| TestkitError::Io(format!("running sudo: {}", e)))?;
            if !output.status.success() {
                return Err(TestkitError::Io(format!(
                    "sudo cat {} failed: {}",
                    path.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            Ok(output.stdout)
        }
        Err(e) => Err(TestkitError::Io(format!("reading {}: {}", path.display(), e))),
    }
}
