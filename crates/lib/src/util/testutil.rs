//! Test helpers: an in-memory package solver.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use crate::depsolve::{DepsolveError, DepsolveRequest, DepsolveSession, Depsolver, PackageInfo};
use crate::util::hash::hash_bytes;

/// Answers requests from a fixed package list and records every request.
#[derive(Default)]
pub struct FakeDepsolver {
  packages: Vec<(String, String, String)>,
  requests: Rc<RefCell<Vec<DepsolveRequest>>>,
}

impl FakeDepsolver {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_package(mut self, name: &str, version: &str, release: &str) -> Self {
    self
      .packages
      .push((name.to_string(), version.to_string(), release.to_string()));
    self
  }

  /// Requests seen so far; stays readable after the solver moves into a session.
  pub fn requests(&self) -> Rc<RefCell<Vec<DepsolveRequest>>> {
    self.requests.clone()
  }
}

impl Depsolver for FakeDepsolver {
  fn depsolve(&mut self, request: &DepsolveRequest) -> Result<Vec<PackageInfo>, DepsolveError> {
    self.requests.borrow_mut().push(request.clone());
    let repo = request.repos.first();
    let base = repo.and_then(|r| r.url()).unwrap_or("https://repo.invalid/");

    let mut resolved = Vec::new();
    for wanted in &request.packages {
      let Some((name, version, release)) = self.packages.iter().find(|(name, ..)| name == wanted) else {
        return Err(DepsolveError::Solver {
          kind: "MarkingErrors".to_string(),
          reason: format!("no package matches '{wanted}'"),
        });
      };
      let file = format!("{name}-{version}-{release}.{}.rpm", request.architecture);
      resolved.push(PackageInfo {
        name: name.clone(),
        epoch: 0,
        version: version.clone(),
        release: release.clone(),
        arch: request.architecture.clone(),
        checksum: hash_bytes(file.as_bytes()).digest(),
        url: format!("{base}Packages/{file}"),
        repo_id: repo.map(|r| r.id.clone()),
        secrets: None,
      });
    }
    Ok(resolved)
  }
}

/// A session around `solver` with a fixed cache path.
pub fn session(solver: FakeDepsolver) -> DepsolveSession {
  DepsolveSession::new(Box::new(solver), Some(PathBuf::from("/var/cache/mpp-test"))).unwrap()
}
