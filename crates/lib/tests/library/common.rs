//! Shared helpers for library integration tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tempfile::TempDir;

use mpp_lib::depsolve::{DepsolveError, DepsolveRequest, DepsolveSession, Depsolver, PackageInfo};
use mpp_lib::image::AlignedLayout;
use mpp_lib::preprocess::{PreprocessConfig, PreprocessError, Preprocessor};

/// Resolves package names from a fixed table.
#[derive(Default, Clone)]
pub struct TableSolver {
  packages: BTreeMap<String, (String, String)>,
}

impl TableSolver {
  /// Add a package resolving to `url`; its checksum is derived from the name.
  pub fn package(mut self, name: &str, url: &str) -> Self {
    self
      .packages
      .insert(name.to_string(), (format!("sha256:{name:0>64}"), url.to_string()));
    self
  }

  pub fn checksum(name: &str) -> String {
    format!("sha256:{name:0>64}")
  }
}

impl Depsolver for TableSolver {
  fn depsolve(&mut self, request: &DepsolveRequest) -> Result<Vec<PackageInfo>, DepsolveError> {
    request
      .packages
      .iter()
      .map(|name| {
        let (checksum, url) = self.packages.get(name).ok_or_else(|| DepsolveError::Solver {
          kind: "MarkingErrors".to_string(),
          reason: format!("no package matches '{name}'"),
        })?;
        Ok(PackageInfo {
          name: name.clone(),
          epoch: 0,
          version: "1.0".to_string(),
          release: "1".to_string(),
          arch: request.architecture.clone(),
          checksum: checksum.clone(),
          url: url.clone(),
          repo_id: request.repos.first().map(|repo| repo.id.clone()),
          secrets: None,
        })
      })
      .collect()
  }
}

pub fn object(value: Value) -> Map<String, Value> {
  match value {
    Value::Object(map) => map,
    other => panic!("expected an object, found {other}"),
  }
}

/// A directory of manifests for one test.
pub struct Workspace {
  pub temp: TempDir,
}

impl Workspace {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn write(&self, name: &str, value: &Value) -> PathBuf {
    let path = self.temp.path().join(name);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
  }

  pub fn path(&self) -> &Path {
    self.temp.path()
  }
}

pub fn run_with(path: &Path, config: &PreprocessConfig, solver: TableSolver) -> Result<Value, PreprocessError> {
  let mut session = DepsolveSession::new(Box::new(solver), None).unwrap();
  Preprocessor::new(config, &AlignedLayout).run_file(path, &mut session)
}

pub fn run(path: &Path) -> Result<Value, PreprocessError> {
  run_with(path, &PreprocessConfig::default(), TableSolver::default())
}
