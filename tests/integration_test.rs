// File: tests/integration_test.rs
//
// Drives BridgePlugin with the real ExecDelegate against a shell script that
// stands in for the bridge executable. The script records each invocation's
// command and stdin, and fails when a marker file is present.

use smuggle_cni::config::PluginConfig;
use smuggle_cni::delegate::ExecDelegate;
use smuggle_cni::error::Error;
use smuggle_cni::plugin::BridgePlugin;
use smuggle_cni::types::CmdArgs;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const NET0: &str = r#"{"name":"net0","bridge":"br0","mtu":1500,"ipmasq":true,"ipv4":{"network":"10.1.0.0/24","subnet":"10.1.0.5/24","gateway":"10.1.0.1"}}"#;

const FAKE_BRIDGE: &str = r#"#!/bin/sh
dir=$(dirname "$0")
cat > "$dir/last.stdin"
echo "$CNI_COMMAND" >> "$dir/calls"
if [ -e "$dir/fail" ]; then
  echo '{"cniVersion":"1.0.0","code":11,"msg":"bridge unavailable"}'
  exit 1
fi
if [ "$CNI_COMMAND" = "ADD" ]; then
  echo '{"cniVersion":"1.0.0","interfaces":[{"name":"eth0","sandbox":"'"$CNI_NETNS"'"}],"ips":[{"address":"10.1.0.2/24","gateway":"10.1.0.1","interface":0}]}'
fi
"#;

struct Harness {
    _tmp: TempDir,
    config: PluginConfig,
    bin_dir: PathBuf,
}

impl Harness {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let bin_dir = tmp.path().join("bin");
        let config = PluginConfig {
            config_dir: tmp.path().join("config"),
            state_dir: tmp.path().join("state"),
            ipam_data_dir: tmp.path().join("ipam"),
        };

        fs::create_dir_all(&bin_dir)?;
        fs::create_dir_all(&config.config_dir)?;
        fs::write(config.config_dir.join("net0.conf"), NET0)?;

        let bridge = bin_dir.join("bridge");
        fs::write(&bridge, FAKE_BRIDGE)?;
        fs::set_permissions(&bridge, fs::Permissions::from_mode(0o755))?;

        Ok(Self {
            _tmp: tmp,
            config,
            bin_dir,
        })
    }

    fn args(&self, container_id: &str, stdin: &str) -> CmdArgs {
        CmdArgs {
            container_id: container_id.to_string(),
            netns: "/var/run/netns/test".to_string(),
            ifname: "eth0".to_string(),
            args: String::new(),
            path: self.bin_dir.display().to_string(),
            stdin_data: stdin.as_bytes().to_vec(),
        }
    }

    fn plugin(&self, args: &CmdArgs) -> BridgePlugin<ExecDelegate> {
        BridgePlugin::new(&self.config, ExecDelegate::new(args))
    }

    fn state_file(&self, container_id: &str) -> PathBuf {
        self.config.state_dir.join(container_id)
    }

    fn calls(&self) -> Vec<String> {
        read_lines(&self.bin_dir.join("calls"))
    }

    fn last_stdin(&self) -> Vec<u8> {
        fs::read(self.bin_dir.join("last.stdin")).unwrap_or_default()
    }

    fn set_failing(&self, failing: bool) {
        let marker = self.bin_dir.join("fail");
        if failing {
            fs::write(marker, "").unwrap();
        } else {
            let _ = fs::remove_file(marker);
        }
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

#[test]
fn add_then_del_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new()?;
    let add_args = h.args("abc123", r#"{"cniVersion":"1.0.0","name":"net0","type":"smuggle-cni"}"#);

    let result = h.plugin(&add_args).add(&add_args)?;
    assert_eq!(result.0["ips"][0]["address"], "10.1.0.2/24");
    assert_eq!(result.0["interfaces"][0]["sandbox"], "/var/run/netns/test");

    // The delegate saw exactly what was persisted.
    let persisted = fs::read(h.state_file("abc123"))?;
    assert_eq!(persisted, h.last_stdin());

    let sent: serde_json::Value = serde_json::from_slice(&persisted)?;
    assert_eq!(sent["bridge"], "br0");
    assert_eq!(sent["ipam"]["ranges"][0][0]["subnet"], "10.1.0.0/24");

    // DEL gets no useful stdin; everything comes from the state file.
    let del_args = h.args("abc123", "");
    h.plugin(&del_args).del(&del_args)?;

    assert_eq!(h.calls(), vec!["ADD", "DEL"]);
    assert_eq!(h.last_stdin(), persisted);
    assert!(!h.state_file("abc123").exists());
    Ok(())
}

#[test]
fn failed_del_keeps_state_until_retry_succeeds() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new()?;
    let add_args = h.args("abc123", r#"{"name":"net0"}"#);
    h.plugin(&add_args).add(&add_args)?;

    h.set_failing(true);
    let del_args = h.args("abc123", "");
    let err = h.plugin(&del_args).del(&del_args).unwrap_err();
    assert_eq!(err.to_string(), "failed to delegate del: bridge unavailable");
    assert_eq!(err.code(), 11);
    assert!(h.state_file("abc123").exists());

    h.set_failing(false);
    h.plugin(&del_args).del(&del_args)?;
    assert!(!h.state_file("abc123").exists());
    assert_eq!(h.calls(), vec!["ADD", "DEL", "DEL"]);
    Ok(())
}

#[test]
fn repeated_del_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new()?;
    let del_args = h.args("never-added", "");

    h.plugin(&del_args).del(&del_args)?;
    h.plugin(&del_args).del(&del_args)?;
    assert!(h.calls().is_empty());
    Ok(())
}

#[test]
fn failed_add_leaves_state_and_re_add_overwrites() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new()?;
    let args = h.args("abc123", r#"{"name":"net0"}"#);

    h.set_failing(true);
    let err = h.plugin(&args).add(&args).unwrap_err();
    assert!(matches!(err, Error::Delegation { .. }));
    assert!(h.state_file("abc123").exists());

    // Network config changed between attempts.
    fs::write(
        h.config.config_dir.join("net0.conf"),
        NET0.replace("\"mtu\":1500", "\"mtu\":9000"),
    )?;
    h.set_failing(false);
    h.plugin(&args).add(&args)?;

    let sent: serde_json::Value = serde_json::from_slice(&fs::read(h.state_file("abc123"))?)?;
    assert_eq!(sent["mtu"], 9000);
    Ok(())
}

#[test]
fn check_does_not_touch_state() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new()?;
    let args = h.args("abc123", r#"{"name":"net0"}"#);

    h.plugin(&args).check(&args)?;
    assert_eq!(h.calls(), vec!["CHECK"]);
    assert!(!h.config.state_dir.exists());
    Ok(())
}

#[test]
fn corrupt_state_does_not_block_teardown() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new()?;
    fs::create_dir_all(&h.config.state_dir)?;
    fs::write(h.state_file("abc123"), "{\"name\":\"net0\"")?;

    let args = h.args("abc123", "");
    h.plugin(&args).del(&args)?;

    assert!(h.calls().is_empty());
    assert!(h.state_file("abc123").exists());
    Ok(())
}

#[test]
fn state_without_delegate_type_does_not_block_teardown() -> Result<(), Box<dyn std::error::Error>> {
    let h = Harness::new()?;
    fs::create_dir_all(&h.config.state_dir)?;
    fs::write(h.state_file("abc123"), r#"{"name":"net0","bridge":"br0"}"#)?;

    let args = h.args("abc123", "");
    h.plugin(&args).del(&args)?;

    assert!(h.calls().is_empty());
    assert!(h.state_file("abc123").exists());
    Ok(())
}
