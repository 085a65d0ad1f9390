//! The `mpp-embed` directive: inline file or text content (version 2).
//!
//! Placed in a stage input, the directive hashes its content, stores it
//! base64-encoded under the `org.osbuild.inline` source, and references the
//! digest from the input:
//!
//! ```json
//! "inputs": {
//!   "files": {
//!     "type": "org.osbuild.files",
//!     "origin": "org.osbuild.source",
//!     "mpp-embed": { "id": "motd", "text": "Welcome\n" }
//!   }
//! }
//! ```
//!
//! With an `id`, the digest is also bound as `embedded.<id>`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{EMBED, EMBEDDED_VAR, INLINE_SOURCE};
use crate::eval::{self, EvalError};
use crate::manifest::Document;
use crate::template;
use crate::util::hash::hash_bytes;
use crate::value::{object_entry, type_name};
use crate::vars::VarEnv;

const FILES_INPUT: &str = "org.osbuild.files";

/// Errors raised while embedding content.
#[derive(Debug, Error)]
pub enum EmbedError {
  #[error("invalid parameters: {0}")]
  InvalidParameters(String),

  #[error(transparent)]
  Eval(#[from] EvalError),

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("input type '{0}' cannot reference embedded content")]
  UnsupportedInput(String),
}

struct Content {
  id: Option<String>,
  data: Vec<u8>,
}

fn read_params(raw: Value, base_dir: &Path, env: &VarEnv) -> Result<Content, EmbedError> {
  let mut raw = raw;
  let snapshot = env.effective();
  template::substitute_tree(&mut raw, &snapshot);
  let Value::Object(params) = eval::resolved(raw, &snapshot)? else {
    return Err(EmbedError::InvalidParameters("expected a mapping".to_string()));
  };

  let id = match params.get("id") {
    None => None,
    Some(Value::String(id)) => Some(id.clone()),
    Some(other) => {
      return Err(EmbedError::InvalidParameters(format!(
        "'id' must be a string, found {}",
        type_name(other)
      )));
    }
  };

  let data = match (params.get("path"), params.get("text")) {
    (Some(Value::String(path)), None) => {
      let path = base_dir.join(path);
      fs::read(&path).map_err(|source| EmbedError::Read { path, source })?
    }
    (None, Some(Value::String(text))) => text.clone().into_bytes(),
    (Some(_), Some(_)) => {
      return Err(EmbedError::InvalidParameters(
        "'path' and 'text' are mutually exclusive".to_string(),
      ));
    }
    _ => {
      return Err(EmbedError::InvalidParameters(
        "one of 'path' or 'text' must be a string".to_string(),
      ));
    }
  };

  Ok(Content { id, data })
}

/// Resolve every `mpp-embed` in the stage inputs of a version 2 document.
///
/// Returns the number of directives processed.
pub fn embed_all(doc: &mut Document, env: &mut VarEnv) -> Result<usize, EmbedError> {
  let base_dir = doc.dir().to_path_buf();
  let adapter = doc.adapter();
  let mut inline = Map::new();
  let mut bindings = Vec::new();

  for stage in adapter.stages_mut(doc.root_mut()) {
    let Some(Value::Object(inputs)) = stage.node.get_mut("inputs") else {
      continue;
    };
    for (name, input) in inputs.iter_mut() {
      let Value::Object(input) = input else {
        continue;
      };
      let Some(raw) = input.shift_remove(EMBED) else {
        continue;
      };
      if let Some(kind) = input.get("type").and_then(Value::as_str)
        && kind != FILES_INPUT
      {
        return Err(EmbedError::UnsupportedInput(kind.to_string()));
      }

      let content = read_params(raw, &base_dir, env)?;
      let digest = hash_bytes(&content.data).digest();
      debug!(pipeline = %stage.pipeline, input = %name, digest = %digest, "embedding content");

      match input
        .entry("references")
        .or_insert_with(|| Value::Object(Map::new()))
      {
        Value::Array(list) => list.push(Value::String(digest.clone())),
        Value::Object(map) => {
          map.insert(digest.clone(), Value::Object(Map::new()));
        }
        other => *other = json!({ digest.clone(): {} }),
      }

      inline.insert(
        digest.clone(),
        json!({"encoding": "base64", "data": STANDARD.encode(&content.data)}),
      );
      if let Some(id) = content.id {
        bindings.push((id, digest));
      }
    }
  }

  let count = inline.len();
  if !inline.is_empty() {
    let items = object_entry(
      object_entry(object_entry(doc.root_mut(), "sources"), INLINE_SOURCE),
      "items",
    );
    for (digest, entry) in inline {
      items.insert(digest, entry);
    }
  }
  for (id, digest) in bindings {
    env.set_path(&[EMBEDDED_VAR, &id], Value::String(digest));
  }

  if count > 0 {
    info!(count, "embedded inline content");
  }
  Ok(count)
}
