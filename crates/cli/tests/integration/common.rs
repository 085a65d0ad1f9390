//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the manifests it writes.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
  }

  pub fn path(&self, relative_path: &str) -> PathBuf {
    self.temp.path().join(relative_path)
  }

  /// An `mpp` command with a scratch cache directory.
  pub fn mpp(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("mpp");
    cmd.arg("--cache").arg(self.path("cache"));
    cmd
  }

  /// Run `mpp SRC -` with extra arguments and parse stdout.
  pub fn expand(&self, src: &str, args: &[&str]) -> Value {
    let output = self
      .mpp()
      .arg(self.path(src))
      .arg("-")
      .args(args)
      .output()
      .unwrap();
    assert!(
      output.status.success(),
      "mpp failed: {}",
      String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
  }
}
