//! Common test utilities for bitferry integration tests.
//!
//! Provides `TestEnv` for isolated test environments that never look at
//! the user's configuration or the host's mount points.

#![allow(dead_code)]

use assert_cmd::Command;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// A test environment with isolated volume roots and configuration.
///
/// The `bitferry()` method returns a `Command` that points the search path
/// at every root created through `root()` and disables mount scanning, so
/// tests are parallel-safe.
pub struct TestEnv {
    /// Parent directory of the volume roots
    pub dir: TempDir,
    /// Holds config.kdl (via `BITFERRY_CONFIG_DIR`)
    pub config_dir: TempDir,
    roots: RefCell<Vec<PathBuf>>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
            roots: RefCell::new(Vec::new()),
        }
    }

    /// Create a directory and add it to the search path.
    pub fn root(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::create_dir_all(&path).unwrap();
        let path = path.canonicalize().unwrap();
        self.roots.borrow_mut().push(path.clone());
        path
    }

    /// Create a directory and a volume on it, returning the volume tag.
    pub fn volume(&self, name: &str) -> (PathBuf, String) {
        let root = self.root(name);
        let output = self
            .bitferry()
            .args(["create", "volume"])
            .arg(&root)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "{}",
            String::from_utf8_lossy(&output.stderr)
        );
        let json = parse_json(&output.stdout);
        (root, json["tag"].as_str().unwrap().to_string())
    }

    /// Get a Command for the bitferry binary with an isolated environment.
    pub fn bitferry(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_bitferry"));
        cmd.current_dir(self.dir.path());
        cmd.env("BITFERRY_CONFIG_DIR", self.config_dir.path());
        cmd.env(
            "BITFERRY_SEARCH_PATH",
            std::env::join_paths(self.roots.borrow().iter()).unwrap(),
        );
        cmd.env("BITFERRY_SCAN_MOUNTS", "0");
        cmd.env("BITFERRY_LOG", "warn");
        cmd.env_remove("BITFERRY_PASSWORD");
        cmd.env_remove("BITFERRY_RCLONE");
        cmd.env_remove("BITFERRY_RESTIC");
        cmd
    }

    /// Write an executable shell script that logs its arguments to `<name>.log`.
    ///
    /// `rclone obscure -` echoes `obscured-` plus stdin and `rclone reveal`
    /// strips that prefix again. A set `RESTIC_PASSWORD` is logged as well.
    #[cfg(unix)]
    pub fn fake_tool(&self, name: &str, exit_code: i32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.config_dir.path().join(name);
        let log = self.tool_log(name);
        let script = format!(
            r#"#!/bin/sh
case "$1" in
  obscure) printf 'obscured-%s\n' "$(cat)"; exit 0 ;;
  reveal) printf '%s\n' "${{2#obscured-}}"; exit 0 ;;
esac
echo "$@" >> '{log}'
if [ -n "$RESTIC_PASSWORD" ]; then echo "password=$RESTIC_PASSWORD" >> '{log}'; fi
exit {code}
"#,
            log = log.display(),
            code = exit_code
        );
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Path of the argument log written by a fake tool.
    pub fn tool_log(&self, name: &str) -> PathBuf {
        self.config_dir.path().join(format!("{}.log", name))
    }

    /// Lines logged by a fake tool (empty when it never ran).
    pub fn tool_calls(&self, name: &str) -> Vec<String> {
        fs::read_to_string(self.tool_log(name))
            .map(|s| s.lines().map(String::from).collect())
            .unwrap_or_default()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse command stdout as JSON.
pub fn parse_json(stdout: &[u8]) -> serde_json::Value {
    serde_json::from_slice(stdout).unwrap()
}

/// Read the metadata file of a volume root.
pub fn metadata(root: &Path) -> serde_json::Value {
    let contents = fs::read_to_string(root.join(".bitferry")).unwrap();
    serde_json::from_str(&contents).unwrap()
}
