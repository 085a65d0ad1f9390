//! Package dependency resolution for `mpp-depsolve` stages.
//!
//! The directive lists repositories and packages; a [`Depsolver`] turns
//! them into the full, ordered set of package builds to install. Resolution
//! runs through a [`DepsolveSession`] owned by the caller for the length of
//! one run, which holds the solver, its cache directory and the repository
//! secrets looked up so far.
//!
//! # Directive parameters
//!
//! ```json
//! {
//!   "architecture": "x86_64",
//!   "module-platform-id": "platform:el9",
//!   "baseurl": "https://mirror.example.com/9/",
//!   "repos": [{ "id": "baseos", "baseurl": "BaseOS/x86_64/os/" }],
//!   "packages": ["kernel", "bash"],
//!   "excludes": ["dracut-config-rescue"],
//!   "ignore-weak-deps": true
//! }
//! ```

mod dnf;
mod secrets;

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

pub use dnf::DnfJsonSolver;
pub use secrets::{EntitlementSecrets, RepoSecrets, SecretProvider, SecretStore, SecretsError};

/// Errors raised while resolving packages.
#[derive(Debug, Error)]
pub enum DepsolveError {
  #[error("invalid parameters: {0}")]
  InvalidParameters(#[source] serde_json::Error),

  #[error("repository '{repo}' has none of baseurl, metalink or mirrorlist")]
  RepoWithoutUrl { repo: String },

  #[error("cannot join '{url}' onto '{base}': {source}")]
  InvalidUrl {
    base: String,
    url: String,
    #[source]
    source: url::ParseError,
  },

  #[error("repository '{repo}' uses unknown secret provider '{name}'")]
  UnknownSecretProvider { repo: String, name: String },

  #[error("secrets for repository '{repo}': {source}")]
  Secrets {
    repo: String,
    #[source]
    source: SecretsError,
  },

  #[error("failed to create cache directory: {0}")]
  Cache(#[source] io::Error),

  #[error("failed to run {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("{program} exited with code {code:?}: {stderr}")]
  SolverExit {
    program: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("dependency resolution failed ({kind}): {reason}")]
  Solver { kind: String, reason: String },

  #[error("invalid solver response: {0}")]
  Response(#[source] serde_json::Error),
}

/// A repository the solver may pull packages from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Repo {
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub baseurl: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub metalink: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mirrorlist: Option<String>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub gpgkeys: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sslverify: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sslcacert: Option<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sslclientkey: Option<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sslclientcert: Option<PathBuf>,
  /// Secret provider named by the manifest.
  #[serde(skip)]
  pub secrets: Option<String>,
}

impl Repo {
  /// The URL used to look up secrets: the first of baseurl, metalink, mirrorlist.
  pub fn url(&self) -> Option<&str> {
    self
      .baseurl
      .as_deref()
      .or(self.metalink.as_deref())
      .or(self.mirrorlist.as_deref())
  }

  fn apply(&mut self, secrets: RepoSecrets) {
    self.sslcacert = secrets.ca_cert.or(self.sslcacert.take());
    self.sslclientkey = secrets.client_key.or(self.sslclientkey.take());
    self.sslclientcert = secrets.client_cert.or(self.sslclientcert.take());
  }
}

/// A resolution request built from directive parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DepsolveRequest {
  pub architecture: String,
  pub module_platform_id: String,
  pub ignore_weak_deps: bool,
  pub repos: Vec<Repo>,
  pub packages: Vec<String>,
  pub excludes: Vec<String>,
  pub cache_dir: PathBuf,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawParams {
  architecture: String,
  module_platform_id: String,
  #[serde(default)]
  baseurl: Option<String>,
  #[serde(default)]
  repos: Vec<RawRepo>,
  #[serde(default)]
  packages: Vec<String>,
  #[serde(default)]
  excludes: Vec<String>,
  #[serde(default)]
  ignore_weak_deps: bool,
}

#[derive(Deserialize)]
struct RawRepo {
  id: String,
  #[serde(default)]
  baseurl: Option<String>,
  #[serde(default)]
  metalink: Option<String>,
  #[serde(default)]
  mirrorlist: Option<String>,
  #[serde(default)]
  gpgkey: Option<String>,
  #[serde(default)]
  gpgkeys: Vec<String>,
  #[serde(default)]
  sslverify: Option<bool>,
  #[serde(default)]
  sslcacert: Option<PathBuf>,
  #[serde(default)]
  sslclientkey: Option<PathBuf>,
  #[serde(default)]
  sslclientcert: Option<PathBuf>,
  #[serde(default)]
  secrets: Option<RawSecretsRef>,
}

#[derive(Deserialize)]
struct RawSecretsRef {
  name: String,
}

fn join_url(base: Option<&Url>, base_text: &str, url: Option<String>) -> Result<Option<String>, DepsolveError> {
  match (base, url) {
    (Some(base), Some(url)) => base
      .join(&url)
      .map(|joined| Some(joined.to_string()))
      .map_err(|source| DepsolveError::InvalidUrl {
        base: base_text.to_string(),
        url,
        source,
      }),
    (_, url) => Ok(url),
  }
}

impl DepsolveRequest {
  /// Build a request from evaluated directive parameters.
  pub fn from_value(params: Value, cache_dir: &Path) -> Result<Self, DepsolveError> {
    let raw: RawParams = serde_json::from_value(params).map_err(DepsolveError::InvalidParameters)?;

    let base = match &raw.baseurl {
      Some(text) => Some(Url::parse(text).map_err(|source| DepsolveError::InvalidUrl {
        base: text.clone(),
        url: text.clone(),
        source,
      })?),
      None => None,
    };
    let base_text = raw.baseurl.as_deref().unwrap_or_default();

    let mut repos = Vec::with_capacity(raw.repos.len());
    for repo in raw.repos {
      if repo.baseurl.is_none() && repo.metalink.is_none() && repo.mirrorlist.is_none() {
        return Err(DepsolveError::RepoWithoutUrl { repo: repo.id });
      }
      let mut gpgkeys = repo.gpgkeys;
      gpgkeys.extend(repo.gpgkey);
      repos.push(Repo {
        baseurl: join_url(base.as_ref(), base_text, repo.baseurl)?,
        metalink: join_url(base.as_ref(), base_text, repo.metalink)?,
        mirrorlist: join_url(base.as_ref(), base_text, repo.mirrorlist)?,
        id: repo.id,
        gpgkeys,
        sslverify: repo.sslverify,
        sslcacert: repo.sslcacert,
        sslclientkey: repo.sslclientkey,
        sslclientcert: repo.sslclientcert,
        secrets: repo.secrets.map(|s| s.name),
      });
    }

    Ok(Self {
      architecture: raw.architecture,
      module_platform_id: raw.module_platform_id,
      ignore_weak_deps: raw.ignore_weak_deps,
      repos,
      packages: raw.packages,
      excludes: raw.excludes,
      cache_dir: cache_dir.to_path_buf(),
    })
  }
}

/// One resolved package build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
  pub name: String,
  pub epoch: u64,
  pub version: String,
  pub release: String,
  pub arch: String,
  pub checksum: String,
  pub url: String,
  /// Repository the package came from, when the solver reports it.
  pub repo_id: Option<String>,
  /// Secret provider needed to download the package.
  pub secrets: Option<String>,
}

impl PackageInfo {
  /// `[epoch:]version-release`, the epoch left out when zero.
  pub fn evr(&self) -> String {
    if self.epoch == 0 {
      format!("{}-{}", self.version, self.release)
    } else {
      format!("{}:{}-{}", self.epoch, self.version, self.release)
    }
  }

  /// The value bound under `rpms.<pipeline>.<name>`.
  pub fn descriptor(&self) -> Value {
    json!({
      "name": self.name,
      "epoch": self.epoch,
      "version": self.version,
      "release": self.release,
      "evr": self.evr(),
      "arch": self.arch,
      "checksum": self.checksum,
      "url": self.url,
    })
  }
}

/// Resolves package sets.
pub trait Depsolver {
  fn depsolve(&mut self, request: &DepsolveRequest) -> Result<Vec<PackageInfo>, DepsolveError>;
}

/// Resolution state for one run.
pub struct DepsolveSession {
  solver: Box<dyn Depsolver>,
  cache_dir: PathBuf,
  _scratch: Option<TempDir>,
  secrets: SecretStore,
}

impl std::fmt::Debug for DepsolveSession {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("DepsolveSession")
      .field("cache_dir", &self.cache_dir)
      .field("secrets", &self.secrets)
      .finish_non_exhaustive()
  }
}

impl DepsolveSession {
  /// Create a session; without `cache_dir` a temporary one lives as long as the session.
  pub fn new(solver: Box<dyn Depsolver>, cache_dir: Option<PathBuf>) -> Result<Self, DepsolveError> {
    let (cache_dir, scratch) = match cache_dir {
      Some(dir) => (dir, None),
      None => {
        let scratch = tempfile::Builder::new()
          .prefix("mpp-depsolve-")
          .tempdir()
          .map_err(DepsolveError::Cache)?;
        (scratch.path().to_path_buf(), Some(scratch))
      }
    };
    Ok(Self {
      solver,
      cache_dir,
      _scratch: scratch,
      secrets: SecretStore::with_defaults(),
    })
  }

  /// Replace the secret providers.
  pub fn with_secrets(mut self, secrets: SecretStore) -> Self {
    self.secrets = secrets;
    self
  }

  pub fn cache_dir(&self) -> &Path {
    &self.cache_dir
  }

  /// Resolve one `mpp-depsolve` directive's parameters.
  pub fn depsolve(&mut self, params: Value) -> Result<Vec<PackageInfo>, DepsolveError> {
    let mut request = DepsolveRequest::from_value(params, &self.cache_dir)?;

    for repo in &mut request.repos {
      let Some(name) = repo.secrets.clone() else {
        continue;
      };
      let url = repo.url().unwrap_or_default().to_string();
      match self.secrets.get(&name, &url) {
        None => {
          return Err(DepsolveError::UnknownSecretProvider {
            repo: repo.id.clone(),
            name,
          });
        }
        Some(Err(source)) => {
          return Err(DepsolveError::Secrets {
            repo: repo.id.clone(),
            source,
          });
        }
        Some(Ok(secrets)) => repo.apply(secrets),
      }
    }

    info!(
      arch = %request.architecture,
      repos = request.repos.len(),
      packages = request.packages.len(),
      "resolving dependencies"
    );
    let mut packages = self.solver.depsolve(&request)?;

    for package in &mut packages {
      let repo = request
        .repos
        .iter()
        .find(|repo| package.repo_id.as_deref() == Some(repo.id.as_str()));
      if let Some(repo) = repo {
        package.secrets = repo.secrets.clone();
      }
    }
    debug!(count = packages.len(), "resolved packages");
    Ok(packages)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn params() -> Value {
    json!({
      "architecture": "x86_64",
      "module-platform-id": "platform:el9",
      "baseurl": "https://mirror.example.com/9/",
      "repos": [
        {"id": "baseos", "baseurl": "BaseOS/x86_64/os/"},
        {"id": "epel", "metalink": "https://mirrors.fedoraproject.org/metalink?repo=epel-9", "gpgkey": "KEY"}
      ],
      "packages": ["kernel"],
      "ignore-weak-deps": true
    })
  }

  // ==========================================================================
  // Request building
  // ==========================================================================

  #[test]
  fn relative_repo_urls_join_the_baseurl() {
    let request = DepsolveRequest::from_value(params(), Path::new("/cache")).unwrap();
    assert_eq!(
      request.repos[0].baseurl.as_deref(),
      Some("https://mirror.example.com/9/BaseOS/x86_64/os/")
    );
    assert_eq!(
      request.repos[1].metalink.as_deref(),
      Some("https://mirrors.fedoraproject.org/metalink?repo=epel-9")
    );
    assert_eq!(request.repos[1].gpgkeys, ["KEY"]);
    assert!(request.ignore_weak_deps);
    assert_eq!(request.cache_dir, PathBuf::from("/cache"));
  }

  #[test]
  fn urls_are_kept_without_baseurl() {
    let request = DepsolveRequest::from_value(
      json!({
        "architecture": "aarch64",
        "module-platform-id": "platform:f39",
        "repos": [{"id": "fedora", "mirrorlist": "relative/list"}]
      }),
      Path::new("/cache"),
    )
    .unwrap();
    assert_eq!(request.repos[0].mirrorlist.as_deref(), Some("relative/list"));
    assert!(!request.ignore_weak_deps);
  }

  #[test]
  fn repo_without_url_is_rejected() {
    let err = DepsolveRequest::from_value(
      json!({"architecture": "x86_64", "module-platform-id": "p", "repos": [{"id": "empty"}]}),
      Path::new("/cache"),
    )
    .unwrap_err();
    assert!(matches!(err, DepsolveError::RepoWithoutUrl { ref repo } if repo == "empty"));
  }

  #[test]
  fn missing_architecture_is_rejected() {
    let err = DepsolveRequest::from_value(json!({"module-platform-id": "p"}), Path::new("/c")).unwrap_err();
    assert!(matches!(err, DepsolveError::InvalidParameters(_)));
  }

  // ==========================================================================
  // Packages
  // ==========================================================================

  fn package(epoch: u64) -> PackageInfo {
    PackageInfo {
      name: "bash".to_string(),
      epoch,
      version: "5.1.8".to_string(),
      release: "6.el9".to_string(),
      arch: "x86_64".to_string(),
      checksum: "sha256:aa".to_string(),
      url: "https://repo/bash.rpm".to_string(),
      repo_id: None,
      secrets: None,
    }
  }

  #[test]
  fn evr_omits_zero_epoch() {
    assert_eq!(package(0).evr(), "5.1.8-6.el9");
    assert_eq!(package(2).evr(), "2:5.1.8-6.el9");
  }

  #[test]
  fn descriptor_includes_evr() {
    let descriptor = package(0).descriptor();
    assert_eq!(descriptor["evr"], json!("5.1.8-6.el9"));
    assert_eq!(descriptor["checksum"], json!("sha256:aa"));
  }

  // ==========================================================================
  // Session
  // ==========================================================================

  struct Recording {
    requests: std::rc::Rc<std::cell::RefCell<Vec<DepsolveRequest>>>,
  }

  impl Depsolver for Recording {
    fn depsolve(&mut self, request: &DepsolveRequest) -> Result<Vec<PackageInfo>, DepsolveError> {
      self.requests.borrow_mut().push(request.clone());
      let mut pkg = package(0);
      pkg.repo_id = request.repos.first().map(|r| r.id.clone());
      Ok(vec![pkg])
    }
  }

  struct Fixed;

  impl SecretProvider for Fixed {
    fn lookup(&self, _url: &str) -> Result<RepoSecrets, SecretsError> {
      Ok(RepoSecrets {
        ca_cert: Some(PathBuf::from("/ca.pem")),
        client_key: Some(PathBuf::from("/key.pem")),
        client_cert: Some(PathBuf::from("/cert.pem")),
      })
    }
  }

  #[test]
  fn session_applies_secrets_and_tags_packages() {
    let requests = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let mut secrets = SecretStore::default();
    secrets.register("org.osbuild.rhsm", Box::new(Fixed));
    let mut session = DepsolveSession::new(
      Box::new(Recording {
        requests: requests.clone(),
      }),
      Some(PathBuf::from("/cache")),
    )
    .unwrap()
    .with_secrets(secrets);

    let packages = session
      .depsolve(json!({
        "architecture": "x86_64",
        "module-platform-id": "platform:el9",
        "repos": [{"id": "rhel", "baseurl": "https://cdn/rhel", "secrets": {"name": "org.osbuild.rhsm"}}],
        "packages": ["bash"]
      }))
      .unwrap();

    assert_eq!(packages[0].secrets.as_deref(), Some("org.osbuild.rhsm"));
    let sent = &requests.borrow()[0];
    assert_eq!(sent.repos[0].sslclientcert, Some(PathBuf::from("/cert.pem")));
    assert_eq!(sent.cache_dir, PathBuf::from("/cache"));
  }

  #[test]
  fn unknown_secret_provider_is_rejected() {
    let mut session = DepsolveSession::new(
      Box::new(Recording {
        requests: Default::default(),
      }),
      None,
    )
    .unwrap();
    let err = session
      .depsolve(json!({
        "architecture": "x86_64",
        "module-platform-id": "p",
        "repos": [{"id": "r", "baseurl": "https://x/", "secrets": {"name": "org.example.vault"}}]
      }))
      .unwrap_err();
    assert!(matches!(
      err,
      DepsolveError::UnknownSecretProvider { ref name, .. } if name == "org.example.vault"
    ));
  }

  #[test]
  fn scratch_cache_dir_exists_for_session_lifetime() {
    let session = DepsolveSession::new(
      Box::new(Recording {
        requests: Default::default(),
      }),
      None,
    )
    .unwrap();
    assert!(session.cache_dir().is_dir());
  }
}
