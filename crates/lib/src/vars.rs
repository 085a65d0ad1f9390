//! The variable environment directives are evaluated against.
//!
//! Two layers: a base layer (defaults, `mpp-vars`, variables merged in from
//! imports, values bound by later phases) and an override layer supplied by
//! the caller. Overrides always win when the effective environment is built.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::eval::{self, EvalError};
use crate::expr::{self, ExprError};
use crate::template;
use crate::value::object_entry;

/// Errors raised while building the variable environment.
#[derive(Debug, Error)]
pub enum VarsError {
  #[error("invalid override '{definition}': {source}")]
  InvalidOverride {
    definition: String,
    #[source]
    source: ExprError,
  },

  #[error("override '{0}' has an empty name")]
  EmptyName(String),

  #[error("mpp-vars must be a mapping, found {0}")]
  NotAMapping(&'static str),

  #[error("variable '{name}': {source}")]
  Eval {
    name: String,
    #[source]
    source: EvalError,
  },
}

/// Layered variable environment.
#[derive(Debug, Clone, Default)]
pub struct VarEnv {
  base: Map<String, Value>,
  overrides: Map<String, Value>,
}

impl VarEnv {
  pub fn new(defaults: Map<String, Value>, overrides: Map<String, Value>) -> Self {
    Self {
      base: defaults,
      overrides,
    }
  }

  pub fn base(&self) -> &Map<String, Value> {
    &self.base
  }

  pub fn overrides(&self) -> &Map<String, Value> {
    &self.overrides
  }

  /// Base variables with override keys replacing same-named base keys.
  ///
  /// The result is a snapshot; later changes to the environment do not
  /// affect it.
  pub fn effective(&self) -> Map<String, Value> {
    let mut vars = self.base.clone();
    for (name, value) in &self.overrides {
      vars.insert(name.clone(), value.clone());
    }
    vars
  }

  /// Look up a single variable, honoring overrides.
  pub fn get(&self, name: &str) -> Option<&Value> {
    self.overrides.get(name).or_else(|| self.base.get(name))
  }

  /// Bind a base variable.
  pub fn set(&mut self, name: impl Into<String>, value: Value) {
    self.base.insert(name.into(), value);
  }

  /// Bind a value below nested base mappings, creating them as needed.
  ///
  /// `set_path(&["rpms", "build", "bash"], v)` makes `rpms.build.bash` equal `v`
  /// while keeping any siblings already present.
  pub fn set_path(&mut self, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
      return;
    };
    let mut map = &mut self.base;
    for key in parents {
      map = object_entry(map, key);
    }
    map.insert((*last).to_string(), value);
  }

  /// Shallow key-wise merge into the base layer; `other` wins.
  pub fn merge_base(&mut self, other: &Map<String, Value>) {
    for (name, value) in other {
      self.base.insert(name.clone(), value.clone());
    }
  }

  /// Bind the entries of an `mpp-vars` mapping in declaration order.
  ///
  /// Expression directives are evaluated one entry at a time against the
  /// environment as it stands, so they can use earlier entries. `$name`
  /// placeholders are substituted afterwards in a single pass over the whole
  /// base layer, so they can name any declared variable.
  pub fn declare(&mut self, declarations: Value) -> Result<(), VarsError> {
    let Value::Object(declarations) = declarations else {
      return Err(VarsError::NotAMapping(crate::value::type_name(&declarations)));
    };

    for (name, value) in declarations {
      let value = eval::resolved(value, &self.effective()).map_err(|source| VarsError::Eval {
        name: name.clone(),
        source,
      })?;
      debug!(name = %name, "declared variable");
      self.base.insert(name, value);
    }

    let snapshot = self.effective();
    for value in self.base.values_mut() {
      template::substitute_tree(value, &snapshot);
    }
    Ok(())
  }
}

/// Parse a `name[=value]` override.
///
/// The value is a literal of the expression language. A bare name binds `true`.
pub fn parse_override(definition: &str) -> Result<(String, Value), VarsError> {
  let (name, value) = match definition.split_once('=') {
    Some((name, raw)) => {
      let value = expr::literal(raw.trim()).map_err(|source| VarsError::InvalidOverride {
        definition: definition.to_string(),
        source,
      })?;
      (name.trim(), value)
    }
    None => (definition.trim(), Value::Bool(true)),
  };

  if name.is_empty() {
    return Err(VarsError::EmptyName(definition.to_string()));
  }
  Ok((name.to_string(), value))
}
