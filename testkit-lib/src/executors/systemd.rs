//! LND nodes launched as systemd user services.
//!
//! Every node gets its own configuration under
//! `$XDG_CONFIG_HOME/lnd-testkit-<name>/lnd.conf` and data directory under
//! `$XDG_DATA_HOME/lnd-testkit-<name>`, and is started through the
//! `lnd-testkit-regtest@<name>.service` template unit.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::config::{LndConfig, NetworkConfig};
use super::lnd::LndRestNode;
use crate::lightning::LightningNode;
use crate::parsing::{parse_simple_config_file, port_from_host_port};
use crate::ports::PortAllocator;
use crate::scenario::NodeType;
use crate::spawn::NodeSpawner;
use crate::wait::WaitConfig;
use crate::{Result, TestkitError};

const CONFIG_FILE: &str = "lnd.conf";
const ADMIN_MACAROON: &str = "chain/bitcoin/regtest/admin.macaroon";

/// bitcoind endpoints spawned nodes connect to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitcoindPorts {
    /// RPC port.
    pub rpc: u16,
    /// ZMQ `rawtx` port.
    pub zmq_tx: u16,
    /// ZMQ `rawblock` port.
    pub zmq_block: u16,
}

/// Ports of one LND instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodePorts {
    /// Peer-to-peer port.
    pub p2p: u16,
    /// gRPC port.
    pub grpc: u16,
    /// REST port.
    pub rest: u16,
}

/// Spawns LND nodes with `systemctl --user`.
pub struct SystemdLndSpawner {
    bitcoind: BitcoindPorts,
    ports: Arc<dyn PortAllocator>,
    wait: WaitConfig,
    config_root: PathBuf,
    data_root: PathBuf,
    alias_prefix: String,
}

impl SystemdLndSpawner {
    /// Spawner using the XDG config and data directories.
    pub fn new(bitcoind: BitcoindPorts, ports: Arc<dyn PortAllocator>, wait: WaitConfig) -> Result<Self> {
        let missing = |what: &str| TestkitError::Io(format!("no XDG {} directory", what));
        let config_root = dirs::config_dir().ok_or_else(|| missing("config"))?;
        let data_root = dirs::data_dir().ok_or_else(|| missing("data"))?;
        Ok(Self::with_dirs(bitcoind, ports, wait, config_root, data_root))
    }

    /// Spawner keeping configs and data under the given roots.
    pub fn with_dirs(
        bitcoind: BitcoindPorts,
        ports: Arc<dyn PortAllocator>,
        wait: WaitConfig,
        config_root: impl Into<PathBuf>,
        data_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bitcoind,
            ports,
            wait,
            config_root: config_root.into(),
            data_root: data_root.into(),
            alias_prefix: alias_prefix(),
        }
    }

    /// Spawner for the network described by `config`.
    pub fn from_network_config(config: &NetworkConfig, ports: Arc<dyn PortAllocator>) -> Result<Self> {
        let bitcoind = BitcoindPorts {
            rpc: config.bitcoind_public_port()?,
            zmq_tx: config.zmq_tx_port,
            zmq_block: config.zmq_block_port,
        };
        Self::new(bitcoind, ports, config.wait.clone())
    }

    /// Path of the generated `lnd.conf` of node `name`.
    pub fn config_path(&self, name: &str) -> PathBuf {
        self.config_root.join(resource(name)).join(CONFIG_FILE)
    }

    /// Data directory of node `name`.
    pub fn data_dir(&self, name: &str) -> PathBuf {
        self.data_root.join(resource(name))
    }

    /// Alias advertised by node `name`.
    pub fn alias(&self, name: &str) -> String {
        format!("{}-{}", self.alias_prefix, name)
    }

    /// Contents of `lnd.conf` for node `name`.
    pub fn render_config(&self, name: &str, ports: NodePorts) -> String {
        let alias = self.alias(name);
        let data_dir = self.data_dir(name);
        let entries = [
            ("datadir", data_dir.display().to_string()),
            ("noseedbackup", "1".to_string()),
            ("alias", alias.clone()),
            ("bitcoin.defaultchanconfs", "1".to_string()),
            ("color", format!("#{}", alias_color(&alias))),
            ("debuglevel", "info".to_string()),
            ("listen", format!("0.0.0.0:{}", ports.p2p)),
            ("restlisten", format!("0.0.0.0:{}", ports.rest)),
            ("rpclisten", format!("0.0.0.0:{}", ports.grpc)),
            ("bitcoin.active", "1".to_string()),
            ("bitcoin.regtest", "1".to_string()),
            ("bitcoin.node", "bitcoind".to_string()),
            ("bitcoind.rpchost", format!("127.0.0.1:{}", self.bitcoind.rpc)),
            ("bitcoind.rpcpass", "public".to_string()),
            ("bitcoind.rpcuser", "public".to_string()),
            (
                "bitcoind.zmqpubrawblock",
                format!("tcp://127.0.0.1:{}", self.bitcoind.zmq_block),
            ),
            (
                "bitcoind.zmqpubrawtx",
                format!("tcp://127.0.0.1:{}", self.bitcoind.zmq_tx),
            ),
            ("tlscertpath", data_dir.join("tls.cert").display().to_string()),
            ("tlskeypath", data_dir.join("tls.key").display().to_string()),
            ("logdir", data_dir.join("logs").display().to_string()),
        ];

        entries
            .iter()
            .map(|(key, value)| format!("{}={}\n", key, value))
            .collect()
    }

    /// Write the configuration of node `name` unless it already exists.
    ///
    /// Returns whether a new configuration was written.
    pub fn ensure_config(&self, name: &str) -> Result<bool> {
        let path = self.config_path(name);
        if path.exists() {
            return Ok(false);
        }

        let range = self.ports.allocate(3)?;
        let ports = NodePorts {
            p2p: range.start,
            grpc: range.start + 1,
            rest: range.start + 2,
        };
        let config = self.render_config(name, ports);

        std::fs::create_dir_all(self.data_dir(name))?;
        write_atomically(&path, config.as_bytes())?;
        tracing::debug!(%name, path = %path.display(), ?ports, "node configuration written");
        Ok(true)
    }

    /// Read the connection details of node `name` once it has started.
    async fn client_config(&self, name: &str) -> Result<LndConfig> {
        let config = parse_simple_config_file(&self.config_path(name))?;
        let setting = |key: &str| {
            config
                .get(key)
                .ok_or_else(|| TestkitError::invalid_data(key, format!("missing in {} config", name)))
        };

        let rest_port = port_from_host_port(setting("restlisten")?)?;
        let p2p_port = port_from_host_port(setting("listen")?)?;
        let data_dir = self.data_dir(name);
        let macaroon_path = config
            .get("adminmacaroonpath")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(ADMIN_MACAROON));
        let tls_cert_path = config
            .get("tlscertpath")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("tls.cert"));

        self.wait_for_file(&macaroon_path).await?;
        self.wait_for_file(&tls_cert_path).await?;

        let macaroon = tokio::fs::read(&macaroon_path)
            .await
            .map_err(|e| TestkitError::Io(format!("reading {}: {}", macaroon_path.display(), e)))?;

        // The certificate is self-signed and the node listens on loopback only.
        Ok(
            LndConfig::new(format!("https://127.0.0.1:{}", rest_port), hex::encode(macaroon))
                .with_tls_cert(tls_cert_path)
                .with_invalid_certs()
                .with_p2p_port(p2p_port),
        )
    }

    async fn wait_for_file(&self, path: &Path) -> Result<()> {
        let operation = format!("file {}", path.display());
        self.wait
            .until(&operation, move || async move {
                let exists = tokio::fs::try_exists(path).await?;
                Ok(exists.then_some(()))
            })
            .await
    }
}

#[async_trait]
impl NodeSpawner for SystemdLndSpawner {
    #[tracing::instrument(skip(self))]
    async fn spawn(&self, name: &str, node_type: NodeType) -> Result<()> {
        match node_type {
            NodeType::Lnd => {}
        }

        self.ensure_config(name)?;

        let unit = unit_name(name);
        let output = tokio::process::Command::new("systemctl")
            .args(["--user", "start", &unit])
            .output()
            .await
            .map_err(|e| TestkitError::Io(format!("running systemctl: {}", e)))?;
        if !output.status.success() {
            return Err(TestkitError::Io(format!(
                "systemctl --user start {} failed ({}): {}",
                unit,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        tracing::info!(%unit, "node launched");
        Ok(())
    }

    async fn connect(&self, name: &str, node_type: NodeType) -> Result<Arc<dyn LightningNode>> {
        match node_type {
            NodeType::Lnd => {
                let config = self.client_config(name).await?;
                Ok(Arc::new(LndRestNode::new(config, self.wait.clone())?))
            }
        }
    }
}

/// XDG resource name of node `name`.
pub fn resource(name: &str) -> String {
    format!("lnd-testkit-{}", name)
}

/// systemd unit starting node `name`.
pub fn unit_name(name: &str) -> String {
    format!("lnd-testkit-regtest@{}.service", name)
}

/// First six hex digits of the alias hash, so every node gets a stable color.
pub fn alias_color(alias: &str) -> String {
    let digest = Sha256::digest(alias.as_bytes());
    hex::encode(&digest[..3])
}

fn alias_prefix() -> String {
    let host = std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|host| host.trim().to_string())
        .ok()
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    let user = std::env::var("USER").unwrap_or_else(|_| "user".to_string());
    format!("testkit-lnd-{}-{}", host, user)
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");

    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(contents)?;
    file.sync_data()?;
    drop(file);

    std::fs::rename(&tmp, path)?;
    Ok(())
}
