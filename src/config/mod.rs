use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ConfigError;

/// Environment variable overriding [`PluginConfig::config_dir`]
pub const CONFIG_DIR_ENV: &str = "SMUGGLE_CONFIG_DIR";
/// Environment variable overriding [`PluginConfig::state_dir`]
pub const STATE_DIR_ENV: &str = "SMUGGLE_STATE_DIR";
/// Environment variable overriding [`PluginConfig::ipam_data_dir`]
pub const IPAM_DATA_DIR_ENV: &str = "SMUGGLE_IPAM_DATA_DIR";

/// Configuration for the plugin itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    /// Where the per-network `<name>.conf` files live
    pub config_dir: PathBuf,
    /// Where delegate payloads are persisted between ADD and DEL
    pub state_dir: PathBuf,
    /// Data directory handed to the host-local IPAM delegate
    pub ipam_data_dir: PathBuf,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("/opt/smuggle/config"),
            state_dir: PathBuf::from("/var/lib/cni/smuggle"),
            ipam_data_dir: PathBuf::from("/var/lib/cni/smuggle-ipam"),
        }
    }
}

impl PluginConfig {
    /// Defaults, overridden by `SMUGGLE_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults, overridden by whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let overrides = [
            (CONFIG_DIR_ENV, &mut config.config_dir),
            (STATE_DIR_ENV, &mut config.state_dir),
            (IPAM_DATA_DIR_ENV, &mut config.ipam_data_dir),
        ];
        for (key, slot) in overrides {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = PathBuf::from(value);
            }
        }
        config
    }
}

/// The part of the runtime's network configuration this plugin reads.
///
/// Everything else in the payload is ignored; the delegate gets a freshly
/// generated configuration instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConf {
    /// Name of the network
    pub name: String,
}

impl NetConf {
    /// Parse NetConf from bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, ConfigError> {
        serde_json::from_slice(bytes).map_err(ConfigError::InvalidInput)
    }

    /// The `cniVersion` the runtime sent, read even when the rest of the
    /// payload is unusable
    pub fn cni_version_of(bytes: &[u8]) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
        value
            .get("cniVersion")?
            .as_str()
            .filter(|version| !version.is_empty())
            .map(str::to_string)
    }
}

/// Local per-network configuration, `<config-dir>/<name>.conf`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network name
    #[serde(default)]
    pub name: String,
    /// Host bridge interface name
    #[serde(default)]
    pub bridge: String,
    /// MTU for the container interface
    #[serde(default)]
    pub mtu: u32,
    /// Masquerade traffic leaving the subnet
    #[serde(default)]
    pub ipmasq: bool,
    /// IPv4 addressing
    pub ipv4: Ipv4Config,
}

/// IPv4 block of a [`NetworkConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ipv4Config {
    /// CIDR of the whole network, routed directly
    #[serde(default)]
    pub network: String,
    /// CIDR this host allocates container addresses from
    #[serde(default)]
    pub subnet: String,
    /// Gateway address on the bridge
    #[serde(default)]
    pub gateway: String,
}

/// Reads per-network configuration files from a directory
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Create a loader rooted at `config_dir`
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Directory the loader reads from
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Path of the config file for a network name
    pub fn path_for(&self, name: &str) -> Result<PathBuf, ConfigError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
            return Err(ConfigError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.config_dir.join(format!("{name}.conf")))
    }

    /// Read and parse the config file for a network name
    pub fn load(&self, name: &str) -> Result<NetworkConfig, ConfigError> {
        let path = self.path_for(name)?;
        debug!(path = %path.display(), "Loading network config");

        let data = fs::read(&path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => ConfigError::NotFound { path: path.clone() },
            _ => ConfigError::Read {
                path: path.clone(),
                source,
            },
        })?;

        serde_json::from_slice(&data).map_err(|source| ConfigError::Malformed { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const NET0: &str = r#"{"name":"net0","bridge":"br0","mtu":1500,"ipmasq":true,"ipv4":{"network":"10.1.0.0/24","subnet":"10.1.0.5/24","gateway":"10.1.0.1"}}"#;

    #[test]
    fn netconf_needs_only_a_name() {
        let conf =
            NetConf::parse(br#"{"cniVersion":"1.0.0","name":"net0","type":"smuggle-cni","extra":1}"#)
                .unwrap();
        assert_eq!(conf.name, "net0");
    }

    #[rstest]
    #[case::present(&br#"{"cniVersion":"0.4.0","name":"net0"}"#[..], Some("0.4.0"))]
    #[case::without_name(&br#"{"cniVersion":"0.3.1"}"#[..], Some("0.3.1"))]
    #[case::empty(&br#"{"cniVersion":"","name":"net0"}"#[..], None)]
    #[case::not_a_string(&br#"{"cniVersion":1}"#[..], None)]
    #[case::not_json(&b"{"[..], None)]
    fn cni_version_is_read_leniently(#[case] input: &[u8], #[case] expected: Option<&str>) {
        assert_eq!(NetConf::cni_version_of(input).as_deref(), expected);
    }

    #[rstest]
    #[case::not_json(&b"not json"[..])]
    #[case::missing_name(&br#"{"cniVersion":"1.0.0"}"#[..])]
    fn netconf_rejects_bad_input(#[case] input: &[u8]) {
        assert!(matches!(NetConf::parse(input), Err(ConfigError::InvalidInput(_))));
    }

    #[test]
    fn loads_network_config() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("net0.conf"), NET0).unwrap();

        let config = ConfigLoader::new(dir.path()).load("net0").unwrap();
        assert_eq!(config.name, "net0");
        assert_eq!(config.bridge, "br0");
        assert_eq!(config.mtu, 1500);
        assert!(config.ipmasq);
        assert_eq!(config.ipv4.subnet, "10.1.0.5/24");
        assert_eq!(config.ipv4.gateway, "10.1.0.1");
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = ConfigLoader::new(dir.path()).load("net0").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { path } if path == dir.path().join("net0.conf")));
    }

    #[rstest]
    #[case::garbage("{{{")]
    #[case::missing_ipv4(r#"{"name":"net0","bridge":"br0"}"#)]
    #[case::wrong_type(r#"{"name":"net0","mtu":"big","ipv4":{}}"#)]
    fn bad_file_is_malformed(#[case] contents: &str) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("net0.conf"), contents).unwrap();

        let err = ConfigLoader::new(dir.path()).load("net0").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[rstest]
    #[case("")]
    #[case("..")]
    #[case("../etc/passwd")]
    #[case("a/b")]
    fn unsafe_names_are_rejected(#[case] name: &str) {
        let loader = ConfigLoader::new("/opt/smuggle/config");
        assert!(matches!(loader.path_for(name), Err(ConfigError::InvalidName { .. })));
    }

    #[test]
    fn env_overrides_defaults() {
        let env: HashMap<&str, &str> = [(STATE_DIR_ENV, "/run/smuggle"), (CONFIG_DIR_ENV, "")].into();
        let config = PluginConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.state_dir, PathBuf::from("/run/smuggle"));
        assert_eq!(config.config_dir, PluginConfig::default().config_dir);
        assert_eq!(config.ipam_data_dir, PluginConfig::default().ipam_data_dir);
    }

    #[test]
    fn plugin_config_uses_camel_case_keys() {
        let config: PluginConfig = serde_json::from_str(
            r#"{"configDir":"/etc/smuggle","stateDir":"/tmp/state","ipamDataDir":"/tmp/ipam"}"#,
        )
        .unwrap();
        assert_eq!(config.config_dir, PathBuf::from("/etc/smuggle"));
        assert_eq!(config.state_dir, PathBuf::from("/tmp/state"));
    }
}
