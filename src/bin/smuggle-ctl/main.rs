use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use smuggle_cni::config::{ConfigLoader, PluginConfig};
use smuggle_cni::conflist::DelegateConfigList;
use smuggle_cni::state::StateStore;
use smuggle_cni::version;

/// Inspect smuggle networks and the state kept for attached containers
#[derive(Parser)]
#[command(name = "smuggle-ctl", author, version, about)]
struct Cli {
    /// Directory holding per-network `<name>.conf` files
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Directory holding persisted delegate configs
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Data directory handed to the host-local IPAM plugin
    #[arg(long)]
    ipam_data_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the bridge configuration ADD would send for a network
    Render {
        /// Network name
        network: String,
    },

    /// Inspect or clean up persisted container state
    State {
        #[command(subcommand)]
        action: StateAction,
    },

    /// Print the effective plugin configuration
    Config,

    /// Print the plugin version
    Version,
}

#[derive(Subcommand)]
enum StateAction {
    /// List containers with persisted state
    List,

    /// Print the persisted delegate config of a container
    Show {
        /// Container ID
        container_id: String,
    },

    /// Remove the persisted state of a container without calling the delegate
    Purge {
        /// Container ID
        container_id: String,
    },
}

impl Cli {
    /// Environment-derived config with command line overrides applied
    fn plugin_config(&self) -> PluginConfig {
        let mut config = PluginConfig::from_env();
        if let Some(dir) = &self.config_dir {
            config.config_dir = dir.clone();
        }
        if let Some(dir) = &self.state_dir {
            config.state_dir = dir.clone();
        }
        if let Some(dir) = &self.ipam_data_dir {
            config.ipam_data_dir = dir.clone();
        }
        config
    }
}

fn render(config: &PluginConfig, network: &str) -> Result<()> {
    let loader = ConfigLoader::new(&config.config_dir);
    let network_config = loader
        .load(network)
        .with_context(|| format!("Failed to load network {network}"))?;

    let list = DelegateConfigList::from_network(&network_config, &config.ipam_data_dir);
    print_json(&list)
}

fn state(config: &PluginConfig, action: &StateAction) -> Result<()> {
    let store = StateStore::new(&config.state_dir);

    match action {
        StateAction::List => {
            let mut out = io::stdout().lock();
            for container_id in store.list()? {
                writeln!(out, "{container_id}")?;
            }
        }
        StateAction::Show { container_id } => {
            let (bytes, _cleanup) = store
                .load(container_id)
                .with_context(|| format!("Failed to load state for {container_id}"))?;

            // Corrupt state is exactly what an operator wants to see, so fall
            // back to the raw bytes.
            match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(value) => print_json(&value)?,
                Err(err) => {
                    warn!("State for {} is not valid JSON: {}", container_id, err);
                    io::stdout().write_all(&bytes)?;
                }
            }
        }
        StateAction::Purge { container_id } => {
            if store.remove(container_id)? {
                info!("Removed state for {}", container_id);
            } else {
                warn!("No state persisted for {}", container_id);
            }
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("SMUGGLE_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = cli.plugin_config();

    match &cli.command {
        Commands::Render { network } => render(&config, network),
        Commands::State { action } => state(&config, action),
        Commands::Config => print_json(&config),
        Commands::Version => {
            println!("{}", version::about());
            Ok(())
        }
    }
}
