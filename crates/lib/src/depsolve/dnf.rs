//! Dependency resolution through the osbuild dnf helper.
//!
//! The helper reads one JSON request on stdin and answers with JSON on
//! stdout. Failures are reported as `{ "kind": ..., "reason": ... }` with a
//! non-zero exit status.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{DepsolveError, DepsolveRequest, Depsolver, PackageInfo};

const DEFAULT_PROGRAM: &str = "/usr/libexec/osbuild-depsolve-dnf";

/// Runs an external dnf-json compatible solver.
#[derive(Debug, Clone)]
pub struct DnfJsonSolver {
  program: PathBuf,
}

impl Default for DnfJsonSolver {
  fn default() -> Self {
    Self::new(DEFAULT_PROGRAM)
  }
}

#[derive(Deserialize)]
struct Response {
  #[serde(default)]
  packages: Vec<RawPackage>,
}

#[derive(Deserialize)]
struct RawPackage {
  name: String,
  #[serde(default)]
  epoch: u64,
  version: String,
  release: String,
  arch: String,
  checksum: String,
  remote_location: String,
  #[serde(default)]
  repo_id: Option<String>,
}

#[derive(Deserialize)]
struct SolverFailure {
  kind: String,
  reason: String,
}

impl DnfJsonSolver {
  pub fn new(program: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
    }
  }

  fn program_name(&self) -> String {
    self.program.display().to_string()
  }

  /// The JSON document sent to the helper.
  pub fn request_body(request: &DepsolveRequest) -> Value {
    let repo_ids: Vec<&str> = request.repos.iter().map(|repo| repo.id.as_str()).collect();
    json!({
      "command": "depsolve",
      "arch": request.architecture,
      "module_platform_id": request.module_platform_id,
      "cachedir": request.cache_dir,
      "arguments": {
        "repos": request.repos,
        "transactions": [{
          "package-specs": request.packages,
          "exclude-specs": request.excludes,
          "repo-ids": repo_ids,
          "install_weak_deps": !request.ignore_weak_deps,
        }],
      },
    })
  }

  /// The error for a failed run, preferring the helper's own report.
  fn failure(&self, stdout: &[u8], stderr: &[u8], code: Option<i32>) -> DepsolveError {
    match serde_json::from_slice::<SolverFailure>(stdout) {
      Ok(failure) => DepsolveError::Solver {
        kind: failure.kind,
        reason: failure.reason,
      },
      Err(_) => DepsolveError::SolverExit {
        program: self.program_name(),
        code,
        stderr: String::from_utf8_lossy(stderr).trim().to_string(),
      },
    }
  }

  /// Read the helper's stdout into packages.
  pub fn parse_response(stdout: &[u8]) -> Result<Vec<PackageInfo>, DepsolveError> {
    let response: Response = serde_json::from_slice(stdout).map_err(DepsolveError::Response)?;
    Ok(
      response
        .packages
        .into_iter()
        .map(|raw| PackageInfo {
          name: raw.name,
          epoch: raw.epoch,
          version: raw.version,
          release: raw.release,
          arch: raw.arch,
          checksum: raw.checksum,
          url: raw.remote_location,
          repo_id: raw.repo_id,
          secrets: None,
        })
        .collect(),
    )
  }
}

impl Depsolver for DnfJsonSolver {
  fn depsolve(&mut self, request: &DepsolveRequest) -> Result<Vec<PackageInfo>, DepsolveError> {
    let body = Self::request_body(request).to_string();
    debug!(program = %self.program_name(), "running solver");

    let spawn_err = |source| DepsolveError::Spawn {
      program: self.program_name(),
      source,
    };
    let mut child = Command::new(&self.program)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(spawn_err)?;

    if let Some(mut stdin) = child.stdin.take() {
      stdin.write_all(body.as_bytes()).map_err(spawn_err)?;
    }
    let output = child.wait_with_output().map_err(spawn_err)?;

    if !output.status.success() {
      return Err(self.failure(&output.stdout, &output.stderr, output.status.code()));
    }

    Self::parse_response(&output.stdout)
  }
}
