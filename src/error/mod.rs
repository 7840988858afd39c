//! Error taxonomy for the plugin.
//!
//! Each layer has its own enum so callers can match on the conditions they
//! care about (a missing state file on DEL, a delegate's own error code). The
//! top-level [`Error`] maps every failure onto a CNI error code.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Command;

/// Well-known CNI error codes.
pub mod codes {
    /// Invalid or missing `CNI_*` environment variables.
    pub const INVALID_ENVIRONMENT: u32 = 4;
    /// I/O failure.
    pub const IO_FAILURE: u32 = 5;
    /// Failed to decode content.
    pub const DECODING_FAILURE: u32 = 6;
    /// Invalid network configuration.
    pub const INVALID_NETWORK_CONFIG: u32 = 7;
    /// Catch-all for plugin internal errors.
    pub const INTERNAL: u32 = 999;
}

/// Problems with the invocation input or the local per-network file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The runtime's stdin payload could not be decoded.
    #[error("failed to load netconf: {0}")]
    InvalidInput(#[source] serde_json::Error),

    /// The network name cannot be mapped onto a config file.
    #[error("invalid network name {name:?}")]
    InvalidName {
        /// The offending name.
        name: String,
    },

    /// No config file exists for the network.
    #[error("network config file not found: {}", .path.display())]
    NotFound {
        /// Where the file was expected.
        path: PathBuf,
    },

    /// The config file exists but could not be read.
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not a valid network config.
    #[error("failed to unmarshal config {}: {source}", .path.display())]
    Malformed {
        /// Config file path.
        path: PathBuf,
        /// Decoding error.
        #[source]
        source: serde_json::Error,
    },
}

/// Failures of the on-disk state store.
#[derive(Debug, Error)]
pub enum StateError {
    /// The container ID is not safe to use as a file name.
    #[error("invalid container id {container_id:?}")]
    InvalidContainerId {
        /// The offending ID.
        container_id: String,
    },

    /// No state is persisted for this container.
    #[error("no state persisted for container {container_id}")]
    NotFound {
        /// Container ID that was looked up.
        container_id: String,
    },

    /// The state directory could not be created.
    #[error("failed to create state directory {}: {source}", .path.display())]
    CreateDir {
        /// State directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Opening or writing the state file failed.
    #[error("failed to write state file {}: {source}", .path.display())]
    Write {
        /// State file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Fewer bytes than expected reached the state file.
    #[error("short write to state file {}: wrote {written} of {expected} bytes", .path.display())]
    ShortWrite {
        /// State file.
        path: PathBuf,
        /// Bytes actually written.
        written: usize,
        /// Bytes that should have been written.
        expected: usize,
    },

    /// Flushing the state file to disk failed.
    #[error("failed to sync state file {}: {source}", .path.display())]
    Sync {
        /// State file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Closing the state file failed.
    #[error("failed to close state file {}: {source}", .path.display())]
    Close {
        /// State file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading the state file failed for a reason other than absence.
    #[error("failed to read state file {}: {source}", .path.display())]
    Read {
        /// State file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Removing a state file failed.
    #[error("failed to remove state file {}: {source}", .path.display())]
    Remove {
        /// State file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The state directory could not be listed.
    #[error("failed to list state directory {}: {source}", .path.display())]
    List {
        /// State directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Failures reported by, or while reaching, a delegate plugin.
#[derive(Debug, Error)]
pub enum DelegateError {
    /// The delegate type is not a plain executable name.
    #[error("invalid delegate plugin type {plugin_type:?}")]
    InvalidPluginType {
        /// The offending type.
        plugin_type: String,
    },

    /// No executable for the type exists on the plugin search path.
    #[error("failed to find plugin {plugin_type:?} in path {search_path:?}")]
    PluginNotFound {
        /// Delegate type that was searched for.
        plugin_type: String,
        /// Directories that were searched, `:`-separated.
        search_path: String,
    },

    /// The delegate executable could not be started.
    #[error("failed to execute plugin {}: {source}", .path.display())]
    Spawn {
        /// Executable path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Talking to the running delegate failed.
    #[error("failed to communicate with plugin {}: {source}", .path.display())]
    Io {
        /// Executable path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The delegate ran and reported a CNI error.
    #[error("{msg}{}", details_suffix(.details))]
    Plugin {
        /// CNI error code reported by the delegate.
        code: u32,
        /// Error message.
        msg: String,
        /// Additional details.
        details: String,
    },

    /// The delegate succeeded but its output is not JSON.
    #[error("failed to decode plugin result: {0}")]
    Decode(#[source] serde_json::Error),
}

fn details_suffix(details: &str) -> String {
    if details.is_empty() {
        String::new()
    } else {
        format!("; {details}")
    }
}

/// Missing or unusable process-level invocation arguments.
#[derive(Debug, Error)]
pub enum ArgsError {
    /// A required `CNI_*` environment variable is unset or empty.
    #[error("required env variable {var} missing")]
    MissingVariable {
        /// Variable name.
        var: &'static str,
    },

    /// `CNI_COMMAND` holds something other than ADD, DEL, CHECK or VERSION.
    #[error("unknown CNI_COMMAND: {command}")]
    UnknownCommand {
        /// The value that was supplied.
        command: String,
    },

    /// Standard input could not be read.
    #[error("error reading from stdin: {0}")]
    Stdin(#[source] std::io::Error),
}

/// Every failure the plugin can report to the runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// Invocation arguments.
    #[error(transparent)]
    Args(#[from] ArgsError),

    /// Invocation or network configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// State persistence.
    #[error(transparent)]
    State(#[from] StateError),

    /// The generated conflist could not be serialized.
    #[error("failed to marshal CNI conflist: {0}")]
    Generate(#[source] serde_json::Error),

    /// The delegate plugin failed.
    #[error("failed to delegate {}: {source}", .op.verb())]
    Delegation {
        /// Operation that was delegated.
        op: Command,
        /// What went wrong.
        #[source]
        source: DelegateError,
    },

    /// Writing the result to stdout failed.
    #[error("failed to print result: {0}")]
    Output(#[source] std::io::Error),
}

impl Error {
    /// The CNI error code reported to the runtime for this error.
    pub fn code(&self) -> u32 {
        match self {
            Error::Args(ArgsError::Stdin(_)) => codes::IO_FAILURE,
            Error::Args(_) => codes::INVALID_ENVIRONMENT,
            Error::Config(ConfigError::InvalidInput(_)) => codes::DECODING_FAILURE,
            Error::Config(_) => codes::INVALID_NETWORK_CONFIG,
            Error::State(_) => codes::IO_FAILURE,
            Error::Delegation {
                source: DelegateError::Plugin { code, .. },
                ..
            } => *code,
            Error::Generate(_) | Error::Delegation { .. } | Error::Output(_) => codes::INTERNAL,
        }
    }
}
