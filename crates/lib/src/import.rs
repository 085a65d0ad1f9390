//! Pipeline imports.
//!
//! An imported manifest is loaded as a document of its own: its `mpp-vars`
//! and its own imports are expanded first, with the same defaults, overrides
//! and search directories as the importer. Its base variables are then
//! merged into the importer's, and its pipelines and sources are merged into
//! the importing tree.
//!
//! # Directives
//!
//! - version 1: `mpp-import-pipeline: { path }` at the root or on a `build`
//!   object; the imported `pipeline` replaces the site's `pipeline`
//! - version 2: `mpp-import-pipeline: { path, id }` on a pipeline entry; the
//!   named pipeline's fields are laid over the entry
//! - version 2: `mpp-import-pipelines: { path, ids? }` on a pipeline entry;
//!   the entry is replaced by the imported pipelines
//!
//! # Search order
//!
//! The importer's own directory, then each configured search directory. The
//! first existing file wins.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{FILES_SOURCE, IMPORT_PIPELINE, IMPORT_PIPELINES, VARS};
use crate::eval;
use crate::manifest::{Document, Version};
use crate::preprocess::{PreprocessConfig, PreprocessError};
use crate::template;
use crate::value::type_name;
use crate::vars::VarEnv;

/// Errors specific to importing manifests.
#[derive(Debug, Error)]
pub enum ImportError {
  #[error("invalid parameters: {0}")]
  InvalidParameters(String),

  #[error("'{name}' not found, tried: {}", join_paths(.candidates))]
  NotFound { name: String, candidates: Vec<PathBuf> },

  #[error("import cycle: {}", join_paths(.chain))]
  Cycle { chain: Vec<PathBuf> },

  #[error("{path} is a version {found} manifest, expected version {expected}")]
  VersionMismatch {
    path: PathBuf,
    expected: Version,
    found: Version,
  },

  #[error("{path}: unsupported top-level key '{key}' in a version 1 import")]
  UnexpectedKey { path: PathBuf, key: String },

  #[error("{path}: unsupported source type '{kind}' in a version 1 import")]
  UnsupportedSource { path: PathBuf, kind: String },

  #[error("{path}: no pipeline named '{id}'")]
  MissingPipeline { path: PathBuf, id: String },
}

fn join_paths(paths: &[PathBuf]) -> String {
  let mut out = String::new();
  for (i, path) in paths.iter().enumerate() {
    if i > 0 {
      out.push_str(", ");
    }
    let _ = write!(out, "{}", path.display());
  }
  out
}

/// Manifests currently being expanded, outermost first.
#[derive(Debug, Default)]
pub struct ImportStack(Vec<PathBuf>);

impl ImportStack {
  fn enter(&mut self, path: &Path) -> Result<(), ImportError> {
    let canonical = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if self.0.contains(&canonical) {
      let mut chain = self.0.clone();
      chain.push(canonical);
      return Err(ImportError::Cycle { chain });
    }
    self.0.push(canonical);
    Ok(())
  }

  fn leave(&mut self) {
    self.0.pop();
  }
}

/// Find `name` in the importer's directory, then in each search directory.
pub fn resolve_path(name: &str, importer_dir: &Path, search_dirs: &[PathBuf]) -> Result<PathBuf, ImportError> {
  let name_path = Path::new(name);
  let candidates: Vec<PathBuf> = if name_path.is_absolute() {
    vec![name_path.to_path_buf()]
  } else {
    std::iter::once(importer_dir)
      .chain(search_dirs.iter().map(PathBuf::as_path))
      .map(|dir| dir.join(name_path))
      .collect()
  };

  match candidates.iter().find(|candidate| candidate.is_file()) {
    Some(found) => Ok(found.clone()),
    None => Err(ImportError::NotFound {
      name: name.to_string(),
      candidates,
    }),
  }
}

/// Initialize variables and resolve every import of `doc`.
pub fn expand(
  mut doc: Document,
  config: &PreprocessConfig,
  stack: &mut ImportStack,
) -> Result<(Document, VarEnv), PreprocessError> {
  stack.enter(doc.path()).map_err(|source| PreprocessError::Import {
    path: doc.path().to_path_buf(),
    directive: IMPORT_PIPELINE,
    source,
  })?;

  let mut env = VarEnv::new(config.defaults.clone(), config.overrides.clone());
  if let Some(declarations) = doc.root_mut().shift_remove(VARS) {
    env.declare(declarations).map_err(|source| PreprocessError::Vars {
      path: doc.path().to_path_buf(),
      source,
    })?;
  }

  let mut importer = Importer {
    config,
    stack,
    path: doc.path().to_path_buf(),
    dir: doc.dir().to_path_buf(),
    version: doc.version(),
  };
  match doc.version() {
    Version::V1 => importer.resolve_v1(doc.root_mut(), &mut env)?,
    Version::V2 => importer.resolve_v2(doc.root_mut(), &mut env)?,
  }

  importer.stack.leave();
  Ok((doc, env))
}

struct Importer<'a> {
  config: &'a PreprocessConfig,
  stack: &'a mut ImportStack,
  path: PathBuf,
  dir: PathBuf,
  version: Version,
}

struct Params {
  path: String,
  id: Option<String>,
  ids: Option<Vec<String>>,
}

impl Importer<'_> {
  fn error(&self, directive: &'static str, source: ImportError) -> PreprocessError {
    PreprocessError::Import {
      path: self.path.clone(),
      directive,
      source,
    }
  }

  fn params(&self, directive: &'static str, raw: Value, env: &VarEnv) -> Result<Params, PreprocessError> {
    let mut raw = raw;
    let snapshot = env.effective();
    template::substitute_tree(&mut raw, &snapshot);
    let raw = eval::resolved(raw, &snapshot).map_err(|source| PreprocessError::Eval {
      path: self.path.clone(),
      source,
    })?;

    let invalid = |message: String| self.error(directive, ImportError::InvalidParameters(message));
    let Value::Object(raw) = raw else {
      return Err(invalid(format!("expected a mapping, found {}", type_name(&raw))));
    };
    let path = match raw.get("path") {
      Some(Value::String(path)) => path.clone(),
      Some(other) => return Err(invalid(format!("'path' must be a string, found {}", type_name(other)))),
      None => return Err(invalid("missing 'path'".to_string())),
    };
    let id = match raw.get("id") {
      None => None,
      Some(Value::String(id)) => Some(id.clone()),
      Some(other) => return Err(invalid(format!("'id' must be a string, found {}", type_name(other)))),
    };
    let ids = match raw.get("ids") {
      None => None,
      Some(Value::Array(items)) => Some(
        items
          .iter()
          .map(|item| item.as_str().map(str::to_string))
          .collect::<Option<Vec<_>>>()
          .ok_or_else(|| invalid("'ids' must be a list of strings".to_string()))?,
      ),
      Some(other) => return Err(invalid(format!("'ids' must be a list, found {}", type_name(other)))),
    };
    Ok(Params { path, id, ids })
  }

  /// Load, version-check and expand an imported manifest, merging its variables.
  fn load(&mut self, directive: &'static str, params: &Params, env: &mut VarEnv) -> Result<Document, PreprocessError> {
    let found =
      resolve_path(&params.path, &self.dir, &self.config.search_dirs).map_err(|e| self.error(directive, e))?;
    info!(path = %found.display(), from = %self.path.display(), "importing manifest");

    let doc = Document::load(&found)?;
    if doc.version() != self.version {
      return Err(self.error(
        directive,
        ImportError::VersionMismatch {
          path: found,
          expected: self.version,
          found: doc.version(),
        },
      ));
    }

    let (doc, imported_env) = expand(doc, self.config, self.stack)?;
    env.merge_base(imported_env.base());
    Ok(doc)
  }

  // ==========================================================================
  // Version 1
  // ==========================================================================

  fn resolve_v1(&mut self, root: &mut Map<String, Value>, env: &mut VarEnv) -> Result<(), PreprocessError> {
    let mut urls = Map::new();
    self.walk_v1(root, env, &mut urls)?;

    if !urls.is_empty() {
      let registry = crate::value::object_entry(
        crate::value::object_entry(crate::value::object_entry(root, "sources"), FILES_SOURCE),
        "urls",
      );
      for (checksum, url) in urls {
        registry.insert(checksum, url);
      }
    }
    Ok(())
  }

  /// Handle the import at `site` (the root or a `build` object), then descend the build chain.
  fn walk_v1(
    &mut self,
    site: &mut Map<String, Value>,
    env: &mut VarEnv,
    urls: &mut Map<String, Value>,
  ) -> Result<(), PreprocessError> {
    if let Some(raw) = site.shift_remove(IMPORT_PIPELINE) {
      let params = self.params(IMPORT_PIPELINE, raw, env)?;
      let imported = self.load(IMPORT_PIPELINE, &params, env)?;
      let path = imported.path().to_path_buf();
      let mut imported = imported.into_root();

      if let Some(key) = imported.keys().find(|key| !matches!(key.as_str(), "sources" | "pipeline")) {
        return Err(self.error(
          IMPORT_PIPELINE,
          ImportError::UnexpectedKey {
            path,
            key: key.clone(),
          },
        ));
      }

      if let Some(Value::Object(sources)) = imported.shift_remove("sources") {
        for (kind, source) in sources {
          if kind != FILES_SOURCE {
            return Err(self.error(IMPORT_PIPELINE, ImportError::UnsupportedSource { path, kind }));
          }
          if let Some(Value::Object(imported_urls)) = source.get("urls") {
            for (checksum, url) in imported_urls {
              urls.insert(checksum.clone(), url.clone());
            }
          }
        }
      }

      if let Some(pipeline) = imported.shift_remove("pipeline") {
        debug!(path = %path.display(), "replacing pipeline with import");
        site.insert("pipeline".to_string(), pipeline);
      }
    }

    let build = site
      .get_mut("pipeline")
      .and_then(Value::as_object_mut)
      .and_then(|pipeline| pipeline.get_mut("build"))
      .and_then(Value::as_object_mut);
    if let Some(build) = build {
      self.walk_v1(build, env, urls)?;
    }
    Ok(())
  }

  // ==========================================================================
  // Version 2
  // ==========================================================================

  fn resolve_v2(&mut self, root: &mut Map<String, Value>, env: &mut VarEnv) -> Result<(), PreprocessError> {
    let pipelines = match root.get_mut("pipelines") {
      Some(Value::Array(pipelines)) => std::mem::take(pipelines),
      _ => return Ok(()),
    };

    let mut expanded = Vec::with_capacity(pipelines.len());
    let mut imported_sources = Vec::new();

    for entry in pipelines {
      let Value::Object(mut entry) = entry else {
        expanded.push(entry);
        continue;
      };

      if let Some(raw) = entry.shift_remove(IMPORT_PIPELINE) {
        let params = self.params(IMPORT_PIPELINE, raw, env)?;
        let Some(id) = params.id.clone() else {
          return Err(self.error(
            IMPORT_PIPELINE,
            ImportError::InvalidParameters("missing 'id'".to_string()),
          ));
        };
        let imported = self.load(IMPORT_PIPELINE, &params, env)?;
        let path = imported.path().to_path_buf();
        let mut imported = imported.into_root();
        imported_sources.push(imported.shift_remove("sources"));

        let pipeline = take_pipelines(&mut imported)
          .into_iter()
          .find(|pipeline| pipeline_name(pipeline) == Some(id.as_str()))
          .ok_or_else(|| self.error(IMPORT_PIPELINE, ImportError::MissingPipeline { path, id }))?;
        if let Value::Object(fields) = pipeline {
          for (key, value) in fields {
            entry.insert(key, value);
          }
        }
        expanded.push(Value::Object(entry));
      } else if let Some(raw) = entry.shift_remove(IMPORT_PIPELINES) {
        let params = self.params(IMPORT_PIPELINES, raw, env)?;
        let imported = self.load(IMPORT_PIPELINES, &params, env)?;
        let path = imported.path().to_path_buf();
        let mut imported = imported.into_root();
        imported_sources.push(imported.shift_remove("sources"));

        let pipelines = take_pipelines(&mut imported);
        match &params.ids {
          None => expanded.extend(pipelines),
          Some(ids) => {
            if let Some(missing) = ids
              .iter()
              .find(|id| !pipelines.iter().any(|p| pipeline_name(p) == Some(id.as_str())))
            {
              return Err(self.error(
                IMPORT_PIPELINES,
                ImportError::MissingPipeline {
                  path,
                  id: missing.clone(),
                },
              ));
            }
            expanded.extend(
              pipelines
                .into_iter()
                .filter(|p| pipeline_name(p).is_some_and(|name| ids.iter().any(|id| id == name))),
            );
          }
        }
      } else {
        expanded.push(Value::Object(entry));
      }
    }

    root.insert("pipelines".to_string(), Value::Array(expanded));
    for sources in imported_sources.into_iter().flatten() {
      if let Value::Object(sources) = sources {
        merge_sources_v2(root, sources);
      }
    }
    Ok(())
  }
}

fn take_pipelines(root: &mut Map<String, Value>) -> Vec<Value> {
  match root.shift_remove("pipelines") {
    Some(Value::Array(pipelines)) => pipelines,
    _ => Vec::new(),
  }
}

fn pipeline_name(pipeline: &Value) -> Option<&str> {
  pipeline.get("name").and_then(Value::as_str)
}

/// Merge imported version 2 sources into `root`.
///
/// A source type the importer lacks is copied whole. Otherwise its `options`
/// and `items` are merged key by key, the import winning.
pub fn merge_sources_v2(root: &mut Map<String, Value>, imported: Map<String, Value>) {
  let sources = crate::value::object_entry(root, "sources");
  for (kind, source) in imported {
    let Some(Value::Object(existing)) = sources.get_mut(&kind) else {
      sources.insert(kind, source);
      continue;
    };
    let Value::Object(source) = source else {
      continue;
    };
    for (field, value) in source {
      match (field.as_str(), value) {
        ("options" | "items", Value::Object(entries)) => {
          let target = crate::value::object_entry(existing, &field);
          for (key, value) in entries {
            target.insert(key, value);
          }
        }
        (_, value) => {
          existing.entry(field.clone()).or_insert(value);
        }
      }
    }
  }
}
