use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};

/// CNI spec version this plugin speaks in its own replies
pub const CURRENT_CNI_VERSION: &str = "1.0.0";

/// CNI spec versions accepted from the runtime
pub const SUPPORTED_VERSIONS: &[&str] = &["0.1.0", "0.2.0", "0.3.0", "0.3.1", "0.4.0", "1.0.0"];

/// Operation requested by the runtime via `CNI_COMMAND`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Attach the container to the network
    Add,
    /// Detach the container from the network
    Del,
    /// Verify the container's attachment
    Check,
}

impl Command {
    /// Value used for `CNI_COMMAND`
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Add => "ADD",
            Command::Del => "DEL",
            Command::Check => "CHECK",
        }
    }

    /// Lowercase name used in error messages
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Add => "add",
            Command::Del => "del",
            Command::Check => "check",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CNI command arguments
#[derive(Debug, Clone, Default)]
pub struct CmdArgs {
    /// Container ID
    pub container_id: String,
    /// Network namespace path (may be empty on DEL)
    pub netns: String,
    /// Interface name
    pub ifname: String,
    /// Raw `CNI_ARGS` value
    pub args: String,
    /// Plugin search path, `:`-separated
    pub path: String,
    /// Standard input data
    pub stdin_data: Vec<u8>,
}

/// Result of a delegated ADD.
///
/// Kept as opaque JSON: the delegate's result format depends on the CNI
/// version it negotiated, and the runtime must see it unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Result(pub serde_json::Value);

impl Result {
    /// CNI version the delegate reported, if any
    pub fn cni_version(&self) -> Option<&str> {
        self.0.get("cniVersion").and_then(serde_json::Value::as_str)
    }

    /// Write the result as JSON to `out`
    pub fn write_to<W: Write>(&self, mut out: W) -> io::Result<()> {
        serde_json::to_writer(&mut out, &self.0)?;
        out.flush()
    }

    /// Print result as JSON
    pub fn print(&self) -> io::Result<()> {
        self.write_to(io::stdout().lock())
    }
}

/// CNI error object, written to stdout when a command fails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    /// CNI specification version
    #[serde(rename = "cniVersion", default, skip_serializing_if = "String::is_empty")]
    pub cni_version: String,
    /// Error code
    pub code: u32,
    /// Short message
    pub msg: String,
    /// Longer explanation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
}

impl Error {
    /// Build the error object for a plugin failure
    pub fn from_plugin_error(err: &crate::error::Error, cni_version: &str) -> Self {
        Self {
            cni_version: cni_version.to_string(),
            code: err.code(),
            msg: err.to_string(),
            details: String::new(),
        }
    }

    /// Print error as JSON
    pub fn print(&self) -> io::Result<()> {
        let mut out = io::stdout().lock();
        serde_json::to_writer(&mut out, self)?;
        out.flush()
    }
}

/// Reply to the VERSION command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    /// CNI specification version of this reply
    #[serde(rename = "cniVersion")]
    pub cni_version: String,
    /// Versions the plugin accepts
    #[serde(rename = "supportedVersions")]
    pub supported_versions: Vec<String>,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            cni_version: CURRENT_CNI_VERSION.to_string(),
            supported_versions: SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl VersionInfo {
    /// Print version info as JSON
    pub fn print(&self) -> io::Result<()> {
        let mut out = io::stdout().lock();
        serde_json::to_writer(&mut out, self)?;
        out.flush()
    }
}
