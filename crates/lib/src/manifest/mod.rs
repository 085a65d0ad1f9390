//! Manifest documents and their per-version structure.
//!
//! A [`Document`] is a parsed manifest plus its schema version. Where
//! pipelines, stages and URL sources live differs between versions; the
//! [`Adapter`] selected at load time hides those differences from the
//! phases that rewrite the tree.
//!
//! # Versions
//!
//! - version 1: no `version` key (or `"1"`), a single `pipeline` with an
//!   optional nested `build.pipeline` chain
//! - version 2: `"version": "2"` and a list of named `pipelines`

mod v1;
mod v2;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

pub use v1::V1;
pub use v2::V2;

use crate::consts::RPM_STAGE;
use crate::value::{object_entry, type_name};

/// Errors raised while loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("{path}: manifest root must be an object, found {found}")]
  NotAnObject { path: PathBuf, found: &'static str },

  #[error("{path}: unsupported manifest version {version}")]
  UnsupportedVersion { path: PathBuf, version: String },
}

/// Manifest schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
  V1,
  V2,
}

impl Version {
  /// Read the version discriminant from a manifest root.
  pub fn detect(root: &Map<String, Value>) -> Result<Version, String> {
    match root.get("version") {
      None => Ok(Version::V1),
      Some(Value::String(v)) if v == "1" => Ok(Version::V1),
      Some(Value::String(v)) if v == "2" => Ok(Version::V2),
      Some(other) => Err(other.to_string()),
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Version::V1 => "1",
      Version::V2 => "2",
    }
  }

  /// The adapter implementing this version's structure.
  pub fn adapter(&self) -> &'static dyn Adapter {
    match self {
      Version::V1 => &V1,
      Version::V2 => &V2,
    }
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// A stage reached through an adapter, with the variable bucket of its pipeline.
#[derive(Debug)]
pub struct Stage<'a> {
  pub pipeline: String,
  pub node: &'a mut Map<String, Value>,
}

/// Version-specific access to pipelines, stages and URL sources.
pub trait Adapter: Sync {
  fn version(&self) -> Version;

  /// Source type and field holding the checksum → URL registry.
  fn url_source(&self) -> (&'static str, &'static str);

  /// Every stage of every pipeline, in document order.
  fn stages_mut<'a>(&self, root: &'a mut Map<String, Value>) -> Vec<Stage<'a>>;

  /// The mapping holding this stage's `mpp-depsolve`, if it is a dependency resolution stage.
  fn depsolve_site<'a>(&self, stage: &'a mut Map<String, Value>) -> Option<&'a mut Map<String, Value>>;

  /// Attach resolved package checksums to the site `depsolve_site` returned.
  fn add_package_refs(&self, site: &mut Map<String, Value>, checksums: &[String]);

  /// Whether a stage is a dependency resolution stage.
  fn is_depsolve_stage(&self, stage: &Map<String, Value>) -> bool;
}

/// Version 1 stages name their kind under `name`, version 2 under `type`.
fn is_rpm_stage(stage: &Map<String, Value>) -> bool {
  ["type", "name"]
    .iter()
    .any(|key| stage.get(*key).and_then(Value::as_str) == Some(RPM_STAGE))
}

/// A loaded manifest.
#[derive(Debug, Clone)]
pub struct Document {
  path: PathBuf,
  version: Version,
  root: Map<String, Value>,
}

impl Document {
  /// Read and parse a manifest file.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(path.to_path_buf(), &text)
  }

  /// Parse manifest text; `path` is used for relative lookups and messages.
  pub fn parse(path: PathBuf, text: &str) -> Result<Self, ManifestError> {
    let root: Value = serde_json::from_str(text).map_err(|source| ManifestError::Parse {
      path: path.clone(),
      source,
    })?;
    Self::from_value(path, root)
  }

  pub fn from_value(path: PathBuf, root: Value) -> Result<Self, ManifestError> {
    let Value::Object(root) = root else {
      return Err(ManifestError::NotAnObject {
        found: type_name(&root),
        path,
      });
    };
    let version =
      Version::detect(&root).map_err(|version| ManifestError::UnsupportedVersion { path: path.clone(), version })?;
    Ok(Self { path, version, root })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Directory the manifest lives in; relative imports and embeds resolve here.
  pub fn dir(&self) -> &Path {
    match self.path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent,
      _ => Path::new("."),
    }
  }

  pub fn version(&self) -> Version {
    self.version
  }

  pub fn adapter(&self) -> &'static dyn Adapter {
    self.version.adapter()
  }

  pub fn root(&self) -> &Map<String, Value> {
    &self.root
  }

  pub fn root_mut(&mut self) -> &mut Map<String, Value> {
    &mut self.root
  }

  pub fn into_root(self) -> Map<String, Value> {
    self.root
  }
}

/// Checksum → URL entries for a document's URL source.
///
/// Entries are only ever added. [`SourceRegistry::store`] writes them back
/// sorted by URL.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
  items: Map<String, Value>,
  present: bool,
}

impl SourceRegistry {
  /// Read the registry of `root` as laid out by `adapter`.
  pub fn load(adapter: &dyn Adapter, root: &Map<String, Value>) -> Self {
    let (kind, field) = adapter.url_source();
    let items = root
      .get("sources")
      .and_then(|sources| sources.get(kind))
      .and_then(|source| source.get(field))
      .and_then(Value::as_object);
    match items {
      Some(items) => Self {
        items: items.clone(),
        present: true,
      },
      None => Self::default(),
    }
  }

  /// Record a package source. Returns `false` if the checksum was already known.
  pub fn add(&mut self, checksum: &str, url: &str, secrets: Option<&str>) -> bool {
    if self.items.contains_key(checksum) {
      return false;
    }
    let entry = match secrets {
      Some(provider) => serde_json::json!({"url": url, "secrets": {"name": provider}}),
      None => Value::String(url.to_string()),
    };
    self.items.insert(checksum.to_string(), entry);
    true
  }

  pub fn get(&self, checksum: &str) -> Option<&Value> {
    self.items.get(checksum)
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// Write the registry into `root`, sorted by URL.
  ///
  /// A document that had no registry and gained no entries is left alone.
  pub fn store(self, adapter: &dyn Adapter, root: &mut Map<String, Value>) {
    if !self.present && self.items.is_empty() {
      return;
    }
    let (kind, field) = adapter.url_source();
    let source = object_entry(object_entry(root, "sources"), kind);
    source.insert(field.to_string(), Value::Object(sorted_by_url(self.items)));
  }
}

/// URL of a registry entry, either a plain string or `{ "url": ... }`.
pub fn entry_url(entry: &Value) -> &str {
  match entry {
    Value::String(url) => url,
    Value::Object(map) => map.get("url").and_then(Value::as_str).unwrap_or(""),
    _ => "",
  }
}

fn sorted_by_url(items: Map<String, Value>) -> Map<String, Value> {
  let mut entries: Vec<(String, Value)> = items.into_iter().collect();
  entries.sort_by(|a, b| entry_url(&a.1).cmp(entry_url(&b.1)));
  entries.into_iter().collect()
}
