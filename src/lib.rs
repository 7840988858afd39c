//! Smuggle CNI plugin
//!
//! This plugin does not build networks itself. It:
//! - Reads a per-network subnet file named after the requested network
//! - Turns it into a bridge configuration with host-local IPAM
//! - Persists that configuration per container before delegating ADD
//! - Replays the persisted configuration to the delegate on DEL

pub mod commands;
pub mod config;
pub mod conflist;
pub mod delegate;
pub mod error;
pub mod plugin;
pub mod state;
pub mod types;
pub mod version;

// Re-export commonly used items
pub use commands::{cmd_add, cmd_check, cmd_del, run_cni};
pub use config::{NetworkConfig, PluginConfig};
pub use delegate::{Delegate, ExecDelegate};
pub use error::Error;
pub use plugin::BridgePlugin;
pub use state::StateStore;
