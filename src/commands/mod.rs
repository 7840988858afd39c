use std::env;
use std::io::{self, Read};
use tracing::{debug, error};

use crate::config::{NetConf, PluginConfig};
use crate::delegate::ExecDelegate;
use crate::error::{ArgsError, Error};
use crate::plugin::BridgePlugin;
use crate::types::{CmdArgs, Command, Error as CniError, VersionInfo, CURRENT_CNI_VERSION};
use crate::version;

/// Parse command arguments from the process environment and stdin
pub fn parse_args(command: Command) -> Result<CmdArgs, Error> {
    parse_args_from(command, |key| env::var(key).ok(), io::stdin().lock())
}

/// Parse command arguments from `lookup` and `stdin`.
///
/// `CNI_NETNS` may be absent on DEL; the container may already be gone.
pub fn parse_args_from<F, R>(command: Command, lookup: F, mut stdin: R) -> Result<CmdArgs, Error>
where
    F: Fn(&str) -> Option<String>,
    R: Read,
{
    let required = |var: &'static str| {
        lookup(var)
            .filter(|value| !value.is_empty())
            .ok_or(ArgsError::MissingVariable { var })
    };

    let container_id = required("CNI_CONTAINERID")?;
    let netns = match command {
        Command::Del => lookup("CNI_NETNS").unwrap_or_default(),
        Command::Add | Command::Check => required("CNI_NETNS")?,
    };
    let ifname = required("CNI_IFNAME")?;
    let path = required("CNI_PATH")?;
    let args = lookup("CNI_ARGS").unwrap_or_default();

    let mut stdin_data = Vec::new();
    stdin
        .read_to_end(&mut stdin_data)
        .map_err(ArgsError::Stdin)?;

    Ok(CmdArgs {
        container_id,
        netns,
        ifname,
        args,
        path,
        stdin_data,
    })
}

fn bridge_plugin(config: &PluginConfig, args: &CmdArgs) -> BridgePlugin<ExecDelegate> {
    BridgePlugin::new(config, ExecDelegate::new(args))
}

/// Execute the add command
pub fn cmd_add(config: &PluginConfig, args: &CmdArgs) -> Result<(), Error> {
    let result = bridge_plugin(config, args).add(args)?;

    // Output result as JSON
    result.print().map_err(Error::Output)
}

/// Execute the delete command
pub fn cmd_del(config: &PluginConfig, args: &CmdArgs) -> Result<(), Error> {
    bridge_plugin(config, args).del(args)
}

/// Execute the check command
pub fn cmd_check(config: &PluginConfig, args: &CmdArgs) -> Result<(), Error> {
    bridge_plugin(config, args).check(args)
}

/// Parse a `CNI_COMMAND` value
pub fn parse_command(value: &str) -> Result<Option<Command>, ArgsError> {
    match value {
        "ADD" => Ok(Some(Command::Add)),
        "DEL" => Ok(Some(Command::Del)),
        "CHECK" => Ok(Some(Command::Check)),
        "VERSION" => Ok(None),
        _ => Err(ArgsError::UnknownCommand {
            command: value.to_string(),
        }),
    }
}

/// Build the CNI error object for a failed invocation.
///
/// The object echoes the `cniVersion` of the invocation's input when there
/// is one.
pub fn error_reply(err: &Error, stdin_data: &[u8]) -> CniError {
    error!("CNI plugin error: {}", err);
    let cni_version =
        NetConf::cni_version_of(stdin_data).unwrap_or_else(|| CURRENT_CNI_VERSION.to_string());
    CniError::from_plugin_error(err, &cni_version)
}

/// Main entry point for the CNI plugin.
///
/// On failure returns the error object to print for the runtime.
pub fn run_cni() -> Result<(), CniError> {
    // Without a command there is nothing to do but say who we are.
    let cmd = match env::var("CNI_COMMAND") {
        Ok(cmd) if !cmd.is_empty() => cmd,
        _ => {
            eprintln!("{}", version::about());
            return Ok(());
        }
    };

    let config = PluginConfig::from_env();
    debug!(command = %cmd, ?config, "Running CNI command");

    let command = parse_command(&cmd).map_err(|err| error_reply(&Error::from(err), &[]))?;
    let Some(command) = command else {
        // Output supported CNI versions
        return VersionInfo::default()
            .print()
            .map_err(|err| error_reply(&Error::Output(err), &[]));
    };

    let args = parse_args(command).map_err(|err| error_reply(&err, &[]))?;
    let outcome = match command {
        Command::Add => cmd_add(&config, &args),
        Command::Del => cmd_del(&config, &args),
        Command::Check => cmd_check(&config, &args),
    };
    outcome.map_err(|err| error_reply(&err, &args.stdin_data))
}
