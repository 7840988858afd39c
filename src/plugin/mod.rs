use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, error, info};

use crate::config::{ConfigLoader, NetConf, PluginConfig};
use crate::conflist::{self, BRIDGE_PLUGIN_TYPE};
use crate::delegate::Delegate;
use crate::error::{Error, StateError};
use crate::state::StateStore;
use crate::types::{CmdArgs, Command, Result as CniResult};

/// Just enough of a persisted payload to know which delegate owns it
#[derive(Debug, Deserialize)]
struct DelegateNetConf {
    #[serde(rename = "type")]
    plugin_type: String,
}

/// Bridge plugin: maps a network name onto a bridge delegate configuration
pub struct BridgePlugin<D> {
    loader: ConfigLoader,
    store: StateStore,
    ipam_data_dir: PathBuf,
    delegate: D,
}

impl<D: Delegate> BridgePlugin<D> {
    /// Create a plugin using the directories in `config`
    pub fn new(config: &PluginConfig, delegate: D) -> Self {
        Self {
            loader: ConfigLoader::new(&config.config_dir),
            store: StateStore::new(&config.state_dir),
            ipam_data_dir: config.ipam_data_dir.clone(),
            delegate,
        }
    }

    /// Generate the delegate configuration for the invocation's network
    pub fn render(&self, stdin_data: &[u8]) -> Result<Vec<u8>, Error> {
        let conf = NetConf::parse(stdin_data)?;
        let network = self.loader.load(&conf.name)?;
        conflist::generate(&network, &self.ipam_data_dir)
    }

    /// Attach a container.
    ///
    /// The delegate payload is persisted before the delegate runs so that DEL
    /// can always find it, even if this process dies mid-ADD.
    pub fn add(&self, args: &CmdArgs) -> Result<CniResult, Error> {
        let conf_bytes = self.render(&args.stdin_data)?;

        let path = self.store.save(&args.container_id, &conf_bytes)?;
        debug!(container_id = %args.container_id, path = %path.display(), "Saved delegate config");

        let result = self
            .delegate
            .add(BRIDGE_PLUGIN_TYPE, &conf_bytes)
            .map_err(|source| Error::Delegation {
                op: Command::Add,
                source,
            })?;

        info!(container_id = %args.container_id, "Container attached");
        Ok(result)
    }

    /// Detach a container using the payload persisted at ADD time.
    ///
    /// Missing or unreadable state never blocks teardown.
    pub fn del(&self, args: &CmdArgs) -> Result<(), Error> {
        let (conf_bytes, cleanup) = match self.store.load(&args.container_id) {
            Ok(loaded) => loaded,
            Err(StateError::NotFound { .. }) => {
                debug!(container_id = %args.container_id, "No persisted state, nothing to delete");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        // Without a delegate type there is nothing to call. Leave the file for
        // an operator and let the container go.
        let conf: DelegateNetConf = match serde_json::from_slice(&conf_bytes) {
            Ok(conf) => conf,
            Err(err) => {
                error!(
                    container_id = %args.container_id,
                    path = %cleanup.path().display(),
                    error = %err,
                    "failed to parse netconf"
                );
                return Ok(());
            }
        };

        let outcome = self
            .delegate
            .del(&conf.plugin_type, &conf_bytes)
            .map_err(|source| Error::Delegation {
                op: Command::Del,
                source,
            });
        cleanup.finish(&outcome);

        if outcome.is_ok() {
            info!(container_id = %args.container_id, "Container detached");
        }
        outcome
    }

    /// Verify a container's attachment against the current network config
    pub fn check(&self, args: &CmdArgs) -> Result<(), Error> {
        let conf_bytes = self.render(&args.stdin_data)?;

        self.delegate
            .check(BRIDGE_PLUGIN_TYPE, &conf_bytes)
            .map_err(|source| Error::Delegation {
                op: Command::Check,
                source,
            })
    }
}
