//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use lnpbp_testkit::prelude::*;
//! ```
//!
//! ## What's Included
//!
//! - The façade: `Network`, `WarmUp`, `NetworkConfig`
//! - Error types: `TestkitError`, `TestkitErrorCode`, `Result`
//! - Collaborator traits: `ChainControl`, `LightningNode`, `NodeSpawner`, `PortAllocator`
//! - Payment links and receipts: `PaymentIntent`, `parse_link`, `PaymentReceipt`
//! - Scenarios: `ScenarioSpec`, `ChannelParams`, `NodeType`, `LoadedScenario`

// Façade
pub use crate::network::{Network, NetworkBuilder, WarmUp};
pub use crate::executors::NetworkConfig;
pub use crate::wait::WaitConfig;

// Error handling
pub use crate::errors::{TestkitError, TestkitErrorCode};
pub use crate::Result;

// Collaborator traits
pub use crate::chain::ChainControl;
pub use crate::lightning::LightningNode;
pub use crate::ports::PortAllocator;
pub use crate::spawn::NodeSpawner;

// Lightning types
pub use crate::lightning::{Channel, ChannelPolicy, InvoiceHandle, P2PAddress, ParsedInvoice};

// Payments
pub use crate::dispatch::PaymentReceipt;
pub use crate::link::{parse_link, PaymentIntent};

// Scenarios
pub use crate::scenario::{ChannelParams, NodeType, ScenarioSpec};
pub use crate::topology::{LoadedChannel, LoadedNode, LoadedScenario};
