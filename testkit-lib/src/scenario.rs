//! Declarative multi-node scenarios.
//!
//! A scenario names the nodes a test needs and the channels between them:
//!
//! ```json
//! {
//!   "nodes": { "alice": { "type": "lnd" }, "bob": { "type": "lnd" } },
//!   "channels": {
//!     "alice": { "bob": { "capacitySats": 1000000, "pushSats": 10000 } },
//!     "$system": { "alice": { "capacity_sats": 500000 } }
//!   }
//! }
//! ```
//!
//! The same document can be written in TOML. `$system` is the primary node the
//! network was configured with; it is never spawned.
//!
//! [`ScenarioSpec::validate`] checks the whole document before
//! [`topology`](crate::topology) touches any node, so a bad scenario fails
//! without side effects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::lightning::ChannelPolicy;
use crate::liquidity::MAX_NON_WUMBO_CAPACITY;
use crate::registry::SECONDARY_NODE_ID;
use crate::{Result, TestkitError};

/// Channel endpoint name of the primary node.
pub const SYSTEM_NODE: &str = "$system";

/// Lightning implementation of a scenario node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// LND driven through its REST API.
    Lnd,
}

impl NodeType {
    /// Name used in scenario documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lnd => "lnd",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = TestkitError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lnd" => Ok(Self::Lnd),
            other => Err(TestkitError::InvalidScenario(format!(
                "unknown node type {:?}",
                other
            ))),
        }
    }
}

/// A node entry as written in the document.
///
/// The type is kept as a string so that an unknown type is reported as a
/// scenario error naming the node, not as a generic parse error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Node implementation, see [`NodeType`].
    #[serde(rename = "type")]
    pub node_type: String,
}

impl NodeSpec {
    /// Entry for a node of the given type.
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type: node_type.as_str().to_string(),
        }
    }
}

/// Parameters of one scenario channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelParams {
    /// Channel capacity.
    #[serde(alias = "capacitySats")]
    pub capacity_sats: u64,

    /// Amount pushed to the receiver on open.
    #[serde(default, alias = "pushSats")]
    pub push_sats: u64,

    /// Do not announce the channel.
    #[serde(default)]
    pub private: bool,

    /// Base fee charged by the initiator.
    #[serde(default = "default_fee_base_msat", alias = "forwardFeeBaseMsat")]
    pub forward_fee_base_msat: u64,

    /// Proportional fee charged by the initiator.
    #[serde(
        default = "default_fee_proportional_ppm",
        alias = "forwardFeeProportionalPpm"
    )]
    pub forward_fee_proportional_ppm: u64,

    /// CLTV delta of the initiator.
    #[serde(default = "default_timelock_delta", alias = "forwardTimelockDelta")]
    pub forward_timelock_delta: u32,

    /// Base fee charged by the receiver.
    #[serde(default = "default_fee_base_msat", alias = "reverseFeeBaseMsat")]
    pub reverse_fee_base_msat: u64,

    /// Proportional fee charged by the receiver.
    #[serde(
        default = "default_fee_proportional_ppm",
        alias = "reverseFeeProportionalPpm"
    )]
    pub reverse_fee_proportional_ppm: u64,

    /// CLTV delta of the receiver.
    #[serde(default = "default_timelock_delta", alias = "reverseTimelockDelta")]
    pub reverse_timelock_delta: u32,
}

fn default_fee_base_msat() -> u64 {
    1000
}

fn default_fee_proportional_ppm() -> u64 {
    100
}

fn default_timelock_delta() -> u32 {
    144
}

impl ChannelParams {
    /// Public channel of `capacity_sats` with default policies.
    pub fn new(capacity_sats: u64) -> Self {
        Self {
            capacity_sats,
            push_sats: 0,
            private: false,
            forward_fee_base_msat: default_fee_base_msat(),
            forward_fee_proportional_ppm: default_fee_proportional_ppm(),
            forward_timelock_delta: default_timelock_delta(),
            reverse_fee_base_msat: default_fee_base_msat(),
            reverse_fee_proportional_ppm: default_fee_proportional_ppm(),
            reverse_timelock_delta: default_timelock_delta(),
        }
    }

    /// Set the push amount.
    pub fn with_push(mut self, push_sats: u64) -> Self {
        self.push_sats = push_sats;
        self
    }

    /// Make the channel private.
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// Policy the initiator applies.
    pub fn forward_policy(&self) -> ChannelPolicy {
        ChannelPolicy {
            base_fee_msat: self.forward_fee_base_msat,
            fee_rate_ppm: self.forward_fee_proportional_ppm,
            time_lock_delta: self.forward_timelock_delta,
        }
    }

    /// Policy the receiver applies.
    pub fn reverse_policy(&self) -> ChannelPolicy {
        ChannelPolicy {
            base_fee_msat: self.reverse_fee_base_msat,
            fee_rate_ppm: self.reverse_fee_proportional_ppm,
            time_lock_delta: self.reverse_timelock_delta,
        }
    }
}

/// A parsed scenario document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Nodes to spawn, by name.
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeSpec>,

    /// Channels to open: initiator → receiver → parameters.
    #[serde(default)]
    pub channels: BTreeMap<String, BTreeMap<String, ChannelParams>>,
}

/// A scenario that passed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidScenario {
    /// Nodes to spawn, in a stable order.
    pub nodes: Vec<(String, NodeType)>,
    /// Channels as `(initiator, receiver, params)`.
    pub channels: Vec<(String, String, ChannelParams)>,
}

impl ScenarioSpec {
    /// Empty scenario.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node.
    pub fn with_node(mut self, name: impl Into<String>, node_type: NodeType) -> Self {
        self.nodes.insert(name.into(), NodeSpec::new(node_type));
        self
    }

    /// Add a channel from `initiator` to `receiver`.
    pub fn with_channel(
        mut self,
        initiator: impl Into<String>,
        receiver: impl Into<String>,
        params: ChannelParams,
    ) -> Self {
        self.channels
            .entry(initiator.into())
            .or_default()
            .insert(receiver.into(), params);
        self
    }

    /// Parse a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| TestkitError::InvalidScenario(format!("malformed JSON: {}", e)))
    }

    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| TestkitError::InvalidScenario(format!("malformed TOML: {}", e)))
    }

    /// Load a scenario file, picking the format from the extension.
    ///
    /// `.toml` files are read as TOML, everything else as JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TestkitError::Io(format!("reading {}: {}", path.display(), e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::from_toml(&text),
            _ => Self::from_json(&text),
        }
    }

    /// Check names, types and channel endpoints.
    pub fn validate(&self) -> Result<ValidScenario> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (name, spec) in &self.nodes {
            validate_node_name(name)?;
            let node_type = spec.node_type.parse::<NodeType>().map_err(|_| {
                TestkitError::InvalidScenario(format!(
                    "node {} has unknown type {:?}",
                    name, spec.node_type
                ))
            })?;
            nodes.push((name.clone(), node_type));
        }

        let mut channels = Vec::new();
        for (initiator, receivers) in &self.channels {
            self.validate_endpoint(initiator)?;
            for (receiver, params) in receivers {
                self.validate_endpoint(receiver)?;
                if initiator == receiver {
                    return Err(TestkitError::InvalidScenario(format!(
                        "channel from {} to itself",
                        initiator
                    )));
                }
                if params.capacity_sats == 0 {
                    return Err(TestkitError::InvalidScenario(format!(
                        "channel {} -> {} has zero capacity",
                        initiator, receiver
                    )));
                }
                if params.capacity_sats > MAX_NON_WUMBO_CAPACITY {
                    return Err(TestkitError::InvalidScenario(format!(
                        "channel {} -> {} exceeds the non-wumbo limit of {} sat",
                        initiator, receiver, MAX_NON_WUMBO_CAPACITY
                    )));
                }
                if params.push_sats > params.capacity_sats {
                    return Err(TestkitError::InvalidScenario(format!(
                        "channel {} -> {} pushes more than its capacity",
                        initiator, receiver
                    )));
                }
                channels.push((initiator.clone(), receiver.clone(), params.clone()));
            }
        }

        Ok(ValidScenario { nodes, channels })
    }

    fn validate_endpoint(&self, name: &str) -> Result<()> {
        if name == SYSTEM_NODE || self.nodes.contains_key(name) {
            Ok(())
        } else {
            Err(TestkitError::InvalidScenario(format!(
                "channel endpoint {} is not a declared node",
                name
            )))
        }
    }
}

impl FromStr for ScenarioSpec {
    type Err = TestkitError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json(s)
    }
}

/// Node names become file and service names, so only non-empty `[a-z0-9_-]`
/// names are allowed. The secondary node's instance name is reserved.
pub fn validate_node_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TestkitError::InvalidScenario("empty node name".to_string()));
    }
    if name == SECONDARY_NODE_ID {
        return Err(TestkitError::InvalidScenario(format!(
            "node name {:?} is reserved for the secondary node",
            name
        )));
    }

    let valid = name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');

    if valid {
        Ok(())
    } else {
        Err(TestkitError::InvalidScenario(format!(
            "invalid node name {:?}, only [a-z0-9_-] is allowed",
            name
        )))
    }
}
