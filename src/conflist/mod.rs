//! Generation of the bridge delegate configuration.
//!
//! A [`NetworkConfig`] only says which bridge to use and which subnet this
//! host owns. The bridge plugin wants a full configuration with a host-local
//! IPAM block, which is built here.

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::NetworkConfig;
use crate::error::Error;

/// Delegate plugin that sets up the container interface
pub const BRIDGE_PLUGIN_TYPE: &str = "bridge";
/// IPAM plugin the bridge delegate is told to use
pub const HOST_LOCAL_IPAM_TYPE: &str = "host-local";
/// Destination of the default route
pub const DEFAULT_ROUTE: &str = "0.0.0.0/0";

/// Configuration handed to the bridge delegate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegateConfigList {
    /// Delegate plugin type
    #[serde(rename = "type")]
    pub plugin_type: String,
    /// Network name
    pub name: String,
    /// Host bridge interface name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bridge: String,
    /// Masquerade traffic leaving the subnet
    #[serde(rename = "ipMasq")]
    pub ip_masq: bool,
    /// Assign the gateway address to the bridge
    #[serde(rename = "isGateway")]
    pub is_gateway: bool,
    /// Container interface MTU
    pub mtu: u32,
    /// Address management
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<Ipam>,
}

/// IPAM block of a [`DelegateConfigList`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ipam {
    /// IPAM plugin type
    #[serde(rename = "type")]
    pub ipam_type: String,
    /// Range sets to allocate from
    pub ranges: Vec<Vec<Range>>,
    /// Routes to install in the container
    pub routes: Vec<Route>,
    /// Where the IPAM plugin keeps its allocations
    #[serde(rename = "dataDir", default, skip_serializing_if = "String::is_empty")]
    pub data_dir: String,
}

/// One allocation range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Range {
    /// Subnet in canonical network form
    pub subnet: String,
    /// Gateway for the subnet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gw: Option<String>,
}

/// Route configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Destination CIDR
    pub dst: String,
    /// Gateway for this route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gw: Option<String>,
}

impl DelegateConfigList {
    /// Build the bridge configuration for a network.
    ///
    /// `ipam_data_dir` is the host-local plugin's own bookkeeping directory.
    pub fn from_network(config: &NetworkConfig, ipam_data_dir: &Path) -> Self {
        let gateway = Some(config.ipv4.gateway.clone()).filter(|gw| !gw.is_empty());

        Self {
            plugin_type: BRIDGE_PLUGIN_TYPE.to_string(),
            name: config.name.clone(),
            bridge: config.bridge.clone(),
            ip_masq: config.ipmasq,
            is_gateway: true,
            mtu: config.mtu,
            ipam: Some(Ipam {
                ipam_type: HOST_LOCAL_IPAM_TYPE.to_string(),
                ranges: vec![vec![Range {
                    subnet: normalize_subnet(&config.ipv4.subnet),
                    gw: gateway.clone(),
                }]],
                routes: vec![
                    Route {
                        dst: config.ipv4.network.clone(),
                        gw: None,
                    },
                    Route {
                        dst: DEFAULT_ROUTE.to_string(),
                        gw: gateway,
                    },
                ],
                data_dir: ipam_data_dir.display().to_string(),
            }),
        }
    }

    /// Compact JSON bytes, exactly as sent to the delegate
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(Error::Generate)
    }
}

/// Generate the serialized bridge configuration for a network
pub fn generate(config: &NetworkConfig, ipam_data_dir: &Path) -> Result<Vec<u8>, Error> {
    DelegateConfigList::from_network(config, ipam_data_dir).to_bytes()
}

/// Clear the host bits of a CIDR string.
///
/// Anything that does not parse as `<addr>/<prefix>` is returned untouched so
/// the delegate reports the problem itself.
pub fn normalize_subnet(cidr: &str) -> String {
    // The prefix must be plain decimal digits; `u8` parsing alone allows a sign.
    match cidr.split_once('/') {
        Some((_, prefix)) if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) => {}
        _ => return cidr.to_string(),
    }
    match cidr.parse::<IpNetwork>() {
        Ok(net) => match IpNetwork::new(net.network(), net.prefix()) {
            Ok(canonical) => canonical.to_string(),
            Err(_) => cidr.to_string(),
        },
        Err(_) => cidr.to_string(),
    }
}
