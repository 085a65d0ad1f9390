//! Client certificates for repositories that require authentication.
//!
//! A repository names its provider with `secrets: { name: ... }`. Providers
//! are looked up at most once per run; the result is reused for every
//! repository naming the same provider.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::consts::RHSM_SECRETS;

const ENTITLEMENT_DIR: &str = "/etc/pki/entitlement";
const RHSM_CA: &str = "/etc/rhsm/ca/redhat-uep.pem";

/// Errors raised while looking up repository secrets.
#[derive(Debug, Error)]
pub enum SecretsError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("no entitlement certificate and key pair found in {0}")]
  NoEntitlement(PathBuf),
}

/// TLS material for one repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoSecrets {
  pub ca_cert: Option<PathBuf>,
  pub client_key: Option<PathBuf>,
  pub client_cert: Option<PathBuf>,
}

/// Source of repository secrets.
pub trait SecretProvider {
  fn lookup(&self, url: &str) -> Result<RepoSecrets, SecretsError>;
}

/// Subscription entitlements: `<serial>.pem` and `<serial>-key.pem` pairs.
#[derive(Debug, Clone)]
pub struct EntitlementSecrets {
  entitlement_dir: PathBuf,
  ca_cert: PathBuf,
}

impl Default for EntitlementSecrets {
  fn default() -> Self {
    Self::new(ENTITLEMENT_DIR, RHSM_CA)
  }
}

impl EntitlementSecrets {
  pub fn new(entitlement_dir: impl Into<PathBuf>, ca_cert: impl Into<PathBuf>) -> Self {
    Self {
      entitlement_dir: entitlement_dir.into(),
      ca_cert: ca_cert.into(),
    }
  }

  /// First certificate (by file name) that has a matching key.
  fn find_pair(dir: &Path) -> Result<Option<(PathBuf, PathBuf)>, SecretsError> {
    let read_err = |source| SecretsError::Read {
      path: dir.to_path_buf(),
      source,
    };
    let mut certs: Vec<PathBuf> = fs::read_dir(dir)
      .map_err(read_err)?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| {
        path
          .file_name()
          .and_then(|n| n.to_str())
          .is_some_and(|name| name.ends_with(".pem") && !name.ends_with("-key.pem"))
      })
      .collect();
    certs.sort();

    for cert in certs {
      let Some(serial) = cert.file_stem().and_then(|s| s.to_str()) else {
        continue;
      };
      let key = dir.join(format!("{serial}-key.pem"));
      if key.is_file() {
        return Ok(Some((cert, key)));
      }
    }
    Ok(None)
  }
}

impl SecretProvider for EntitlementSecrets {
  fn lookup(&self, url: &str) -> Result<RepoSecrets, SecretsError> {
    let (cert, key) = Self::find_pair(&self.entitlement_dir)?
      .ok_or_else(|| SecretsError::NoEntitlement(self.entitlement_dir.clone()))?;
    debug!(url, cert = %cert.display(), "using entitlement");
    Ok(RepoSecrets {
      ca_cert: Some(self.ca_cert.clone()),
      client_key: Some(key),
      client_cert: Some(cert),
    })
  }
}

/// Known providers and the secrets already looked up from them.
#[derive(Default)]
pub struct SecretStore {
  providers: HashMap<String, Box<dyn SecretProvider>>,
  resolved: HashMap<String, RepoSecrets>,
}

impl std::fmt::Debug for SecretStore {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SecretStore")
      .field("providers", &self.providers.keys().collect::<Vec<_>>())
      .field("resolved", &self.resolved)
      .finish()
  }
}

impl SecretStore {
  /// A store knowing the subscription entitlement provider.
  pub fn with_defaults() -> Self {
    let mut store = Self::default();
    store.register(RHSM_SECRETS, Box::new(EntitlementSecrets::default()));
    store
  }

  pub fn register(&mut self, name: impl Into<String>, provider: Box<dyn SecretProvider>) {
    self.providers.insert(name.into(), provider);
  }

  pub fn knows(&self, name: &str) -> bool {
    self.providers.contains_key(name)
  }

  /// Secrets from provider `name`, looked up on first use.
  ///
  /// Returns `None` for an unknown provider.
  pub fn get(&mut self, name: &str, url: &str) -> Option<Result<RepoSecrets, SecretsError>> {
    if let Some(secrets) = self.resolved.get(name) {
      return Some(Ok(secrets.clone()));
    }
    let provider = self.providers.get(name)?;
    info!(provider = name, "looking up repository secrets");
    Some(provider.lookup(url).inspect(|secrets| {
      self.resolved.insert(name.to_string(), secrets.clone());
    }))
  }
}
