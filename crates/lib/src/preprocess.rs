//! Runs the expansion phases over a document.
//!
//! # Phases
//!
//! 1. `mpp-vars` and imports, recursively ([`crate::import::expand`])
//! 2. `mpp-define-image` at the root
//! 3. `mpp-depsolve` in every dependency resolution stage
//! 4. `mpp-embed` in stage inputs (version 2)
//! 5. every remaining expression directive, anywhere in the tree
//! 6. URL sources sorted by their final URL
//!
//! The order is fixed: imports can add stages that resolve packages, and
//! resolved packages are bound as `rpms.<pipeline>.<name>` before the
//! final pass so any directive in the document can refer to them.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{DEFINE_IMAGE, DEPSOLVE, DIRECTIVE_PREFIX, RPMS_VAR};
use crate::depsolve::{DepsolveError, DepsolveSession};
use crate::embed::{self, EmbedError};
use crate::eval::{self, EvalError};
use crate::image::{self, ImageError, ImageSpec, PartitionSynthesizer};
use crate::import::{self, ImportError, ImportStack};
use crate::manifest::{Document, ManifestError, SourceRegistry, Version};
use crate::template;
use crate::value::{find_key_with_prefix, sort_keys};
use crate::vars::{VarEnv, VarsError};

/// Errors from any phase, naming the manifest they occurred in.
#[derive(Debug, Error)]
pub enum PreprocessError {
  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error("{path}: {source}")]
  Vars {
    path: PathBuf,
    #[source]
    source: VarsError,
  },

  #[error("{path}: {source}")]
  Eval {
    path: PathBuf,
    #[source]
    source: EvalError,
  },

  #[error("{path}: {directive}: {source}")]
  Import {
    path: PathBuf,
    directive: &'static str,
    #[source]
    source: ImportError,
  },

  #[error("{path}: mpp-define-image: {source}")]
  Image {
    path: PathBuf,
    #[source]
    source: ImageError,
  },

  #[error("{path}: mpp-depsolve in pipeline '{pipeline}': {source}")]
  Depsolve {
    path: PathBuf,
    pipeline: String,
    #[source]
    source: DepsolveError,
  },

  #[error("{path}: mpp-embed: {source}")]
  Embed {
    path: PathBuf,
    #[source]
    source: EmbedError,
  },

  #[error("{path}: directive '{key}' is not valid here")]
  Unconsumed { path: PathBuf, key: String },

  #[error("failed to serialize manifest: {0}")]
  Serialize(#[source] serde_json::Error),
}

/// Settings for one run.
#[derive(Debug, Clone, Default)]
pub struct PreprocessConfig {
  /// Directories searched for imports after the importer's own directory.
  pub search_dirs: Vec<PathBuf>,
  /// Base variables every document starts with.
  pub defaults: Map<String, Value>,
  /// Variables that win over anything a document declares.
  pub overrides: Map<String, Value>,
  /// Sort object keys in the output.
  pub sort_keys: bool,
}

/// Expands documents with the given configuration and collaborators.
pub struct Preprocessor<'a> {
  config: &'a PreprocessConfig,
  partitions: &'a dyn PartitionSynthesizer,
}

impl<'a> Preprocessor<'a> {
  pub fn new(config: &'a PreprocessConfig, partitions: &'a dyn PartitionSynthesizer) -> Self {
    Self { config, partitions }
  }

  /// Load `path` and expand it.
  pub fn run_file(&self, path: &Path, session: &mut DepsolveSession) -> Result<Value, PreprocessError> {
    let doc = Document::load(path)?;
    self.run(doc, session)
  }

  /// Expand a loaded document into a directive-free tree.
  pub fn run(&self, doc: Document, session: &mut DepsolveSession) -> Result<Value, PreprocessError> {
    let path = doc.path().to_path_buf();
    info!(path = %path.display(), version = %doc.version(), "preprocessing manifest");

    let (mut doc, mut env) = import::expand(doc, self.config, &mut ImportStack::default())?;
    self.define_image(&mut doc, &mut env)?;
    self.depsolve(&mut doc, &mut env, session)?;

    if doc.version() == Version::V2 {
      embed::embed_all(&mut doc, &mut env).map_err(|source| PreprocessError::Embed {
        path: path.clone(),
        source,
      })?;
    }

    let adapter = doc.adapter();
    let mut root = Value::Object(doc.into_root());
    eval::resolve(&mut root, &env.effective()).map_err(|source| PreprocessError::Eval {
      path: path.clone(),
      source,
    })?;
    // Source URLs may themselves be directives; order only once they are final.
    if let Value::Object(map) = &mut root {
      SourceRegistry::load(adapter, map).store(adapter, map);
    }

    if let Some(key) = find_key_with_prefix(&root, DIRECTIVE_PREFIX) {
      return Err(PreprocessError::Unconsumed {
        path,
        key: key.to_string(),
      });
    }

    if self.config.sort_keys {
      sort_keys(&mut root);
    }
    Ok(root)
  }

  fn define_image(&self, doc: &mut Document, env: &mut VarEnv) -> Result<(), PreprocessError> {
    let Some(mut raw) = doc.root_mut().shift_remove(DEFINE_IMAGE) else {
      return Ok(());
    };
    let path = doc.path().to_path_buf();
    let image_err = |source| PreprocessError::Image {
      path: path.clone(),
      source,
    };

    let snapshot = env.effective();
    template::substitute_tree(&mut raw, &snapshot);
    eval::resolve(&mut raw, &snapshot).map_err(|source| PreprocessError::Eval {
      path: path.clone(),
      source,
    })?;

    let spec = ImageSpec::from_value(raw).map_err(image_err)?;
    let table = self.partitions.synthesize(spec.size, &spec.table).map_err(image_err)?;
    info!(
      id = %spec.id,
      label = %table.label,
      partitions = table.partitions.len(),
      "defined image"
    );
    let value = image::image_value(spec.size, &table).map_err(image_err)?;
    env.set(spec.id, value);
    Ok(())
  }

  fn depsolve(&self, doc: &mut Document, env: &mut VarEnv, session: &mut DepsolveSession) -> Result<(), PreprocessError> {
    let path = doc.path().to_path_buf();
    let adapter = doc.adapter();
    let mut registry = SourceRegistry::load(adapter, doc.root());
    let mut stages = 0usize;

    for stage in adapter.stages_mut(doc.root_mut()) {
      if !adapter.is_depsolve_stage(stage.node) {
        continue;
      }
      let Some(site) = adapter.depsolve_site(stage.node) else {
        continue;
      };
      let Some(mut params) = site.shift_remove(DEPSOLVE) else {
        continue;
      };

      let snapshot = env.effective();
      template::substitute_tree(&mut params, &snapshot);
      eval::resolve(&mut params, &snapshot).map_err(|source| PreprocessError::Eval {
        path: path.clone(),
        source,
      })?;

      let packages = session.depsolve(params).map_err(|source| PreprocessError::Depsolve {
        path: path.clone(),
        pipeline: stage.pipeline.clone(),
        source,
      })?;

      let mut checksums = Vec::with_capacity(packages.len());
      for package in &packages {
        if !registry.add(&package.checksum, &package.url, package.secrets.as_deref()) {
          debug!(checksum = %package.checksum, "source already registered");
        }
        checksums.push(package.checksum.clone());
        env.set_path(&[RPMS_VAR, &stage.pipeline, &package.name], package.descriptor());
      }
      adapter.add_package_refs(site, &checksums);

      info!(pipeline = %stage.pipeline, count = packages.len(), "resolved packages");
      stages += 1;
    }

    if stages > 0 {
      debug!(stages, sources = registry.len(), "dependency resolution done");
    }
    registry.store(adapter, doc.root_mut());
    Ok(())
  }
}

/// Serialize an expanded tree: two-space indentation and a trailing newline.
pub fn to_json_string(value: &Value) -> Result<String, PreprocessError> {
  let mut out = serde_json::to_string_pretty(value).map_err(PreprocessError::Serialize)?;
  out.push('\n');
  Ok(out)
}
