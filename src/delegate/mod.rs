use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command as Process, Stdio};
use tracing::{debug, info};

use crate::error::{codes, DelegateError};
use crate::types::{CmdArgs, Command, Error as CniError, Result as CniResult};

/// Invokes a delegate plugin's ADD, DEL or CHECK.
///
/// `plugin_type` names the delegate executable and `conf` is passed to it
/// verbatim.
#[cfg_attr(test, mockall::automock)]
pub trait Delegate {
    /// Delegate ADD, returning the delegate's result
    fn add(&self, plugin_type: &str, conf: &[u8]) -> Result<CniResult, DelegateError>;
    /// Delegate DEL
    fn del(&self, plugin_type: &str, conf: &[u8]) -> Result<(), DelegateError>;
    /// Delegate CHECK
    fn check(&self, plugin_type: &str, conf: &[u8]) -> Result<(), DelegateError>;
}

/// Runs delegate plugins found on the CNI plugin search path
#[derive(Debug, Clone)]
pub struct ExecDelegate {
    container_id: String,
    netns: String,
    ifname: String,
    args: String,
    path: String,
}

impl ExecDelegate {
    /// Create a delegate runner that forwards the invocation's arguments
    pub fn new(args: &CmdArgs) -> Self {
        Self {
            container_id: args.container_id.clone(),
            netns: args.netns.clone(),
            ifname: args.ifname.clone(),
            args: args.args.clone(),
            path: args.path.clone(),
        }
    }

    /// Locate the executable for `plugin_type` on the search path
    pub fn find_plugin(&self, plugin_type: &str) -> Result<PathBuf, DelegateError> {
        if plugin_type.is_empty() || plugin_type.contains('/') || plugin_type == ".." {
            return Err(DelegateError::InvalidPluginType {
                plugin_type: plugin_type.to_string(),
            });
        }

        self.path
            .split(':')
            .filter(|dir| !dir.is_empty())
            .map(|dir| Path::new(dir).join(plugin_type))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| DelegateError::PluginNotFound {
                plugin_type: plugin_type.to_string(),
                search_path: self.path.clone(),
            })
    }

    /// Run the delegate for `op` and return its stdout
    fn exec(&self, op: Command, plugin_type: &str, conf: &[u8]) -> Result<Vec<u8>, DelegateError> {
        let plugin = self.find_plugin(plugin_type)?;
        info!(plugin = %plugin.display(), command = %op, "Delegating to plugin");

        let mut child = Process::new(&plugin)
            .env("CNI_COMMAND", op.as_str())
            .env("CNI_CONTAINERID", &self.container_id)
            .env("CNI_NETNS", &self.netns)
            .env("CNI_IFNAME", &self.ifname)
            .env("CNI_ARGS", &self.args)
            .env("CNI_PATH", &self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| DelegateError::Spawn {
                path: plugin.clone(),
                source,
            })?;

        let io_err = |source| DelegateError::Io {
            path: plugin.clone(),
            source,
        };

        // Dropping stdin closes the pipe so the delegate sees EOF. A delegate
        // that exits without reading still gets its exit status reported.
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(conf) {
                Err(err) if err.kind() != ErrorKind::BrokenPipe => return Err(io_err(err)),
                _ => {}
            }
        }
        let output = child.wait_with_output().map_err(io_err)?;

        if output.status.success() {
            debug!(plugin = %plugin.display(), command = %op, "Delegate succeeded");
            return Ok(output.stdout);
        }
        Err(plugin_error(&output.stdout, output.status.code()))
    }
}

/// Turn a failed delegate's stdout into an error, preferring its CNI error object
fn plugin_error(stdout: &[u8], exit_code: Option<i32>) -> DelegateError {
    match serde_json::from_slice::<CniError>(stdout) {
        Ok(err) => DelegateError::Plugin {
            code: err.code,
            msg: err.msg,
            details: err.details,
        },
        Err(_) => {
            let text = String::from_utf8_lossy(stdout).trim().to_string();
            let msg = match exit_code {
                Some(code) => format!("plugin exited with status {code}"),
                None => "plugin terminated by signal".to_string(),
            };
            DelegateError::Plugin {
                code: codes::INTERNAL,
                msg,
                details: text,
            }
        }
    }
}

impl Delegate for ExecDelegate {
    fn add(&self, plugin_type: &str, conf: &[u8]) -> Result<CniResult, DelegateError> {
        let stdout = self.exec(Command::Add, plugin_type, conf)?;
        serde_json::from_slice(&stdout).map_err(DelegateError::Decode)
    }

    fn del(&self, plugin_type: &str, conf: &[u8]) -> Result<(), DelegateError> {
        self.exec(Command::Del, plugin_type, conf).map(|_| ())
    }

    fn check(&self, plugin_type: &str, conf: &[u8]) -> Result<(), DelegateError> {
        self.exec(Command::Check, plugin_type, conf).map(|_| ())
    }
}
