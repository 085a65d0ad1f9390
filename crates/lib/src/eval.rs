//! Evaluation of the expression directives anywhere in a tree.
//!
//! A mapping holding one of the keys below is replaced, in its parent, by
//! the directive's result:
//!
//! - `mpp-format-string`: format template, result is a string
//! - `mpp-format-int`: format template, result parsed as an integer
//! - `mpp-format-json`: format template, result parsed as JSON
//! - `mpp-eval`: expression, result is the typed value
//! - `mpp-join`: list of lists, result is their concatenation
//!
//! Arguments are resolved before the directive that holds them, so
//! directives nest freely.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::consts::{EVAL, FORMAT_INT, FORMAT_JSON, FORMAT_STRING, JOIN};
use crate::expr::{self, ExprError};
use crate::value::type_name;

const EXPRESSION_DIRECTIVES: [&str; 5] = [FORMAT_STRING, FORMAT_INT, FORMAT_JSON, EVAL, JOIN];

/// Errors that can occur while evaluating a directive.
#[derive(Debug, Error)]
pub enum EvalError {
  /// The expression or format template failed.
  #[error("{directive}: {source}")]
  Expr {
    directive: &'static str,
    #[source]
    source: ExprError,
  },

  /// `mpp-format-int` produced something that is not an integer.
  #[error("mpp-format-int: '{0}' is not an integer")]
  NotAnInteger(String),

  /// `mpp-format-json` produced invalid JSON.
  #[error("mpp-format-json: {0}")]
  Json(#[source] serde_json::Error),

  /// The directive's argument has the wrong shape.
  #[error("{directive}: expected {expected}, found {found}")]
  Argument {
    directive: &'static str,
    expected: &'static str,
    found: &'static str,
  },
}

/// Resolve every expression directive in `value`, in place.
pub fn resolve(value: &mut Value, vars: &Map<String, Value>) -> Result<(), EvalError> {
  match value {
    Value::Array(items) => {
      for item in items {
        resolve(item, vars)?;
      }
    }
    Value::Object(map) => {
      if let Some((directive, mut arg)) = take_directive(map) {
        if !map.is_empty() {
          let dropped: Vec<&String> = map.keys().collect();
          warn!(directive, ?dropped, "keys next to a directive are discarded");
        }
        resolve(&mut arg, vars)?;
        *value = apply(directive, arg, vars)?;
        return Ok(());
      }
      for (_, child) in map.iter_mut() {
        resolve(child, vars)?;
      }
    }
    _ => {}
  }
  Ok(())
}

/// Resolve an owned value and return it.
pub fn resolved(mut value: Value, vars: &Map<String, Value>) -> Result<Value, EvalError> {
  resolve(&mut value, vars)?;
  Ok(value)
}

fn take_directive(map: &mut Map<String, Value>) -> Option<(&'static str, Value)> {
  let directive = EXPRESSION_DIRECTIVES.into_iter().find(|key| map.contains_key(*key))?;
  map.shift_remove(directive).map(|arg| (directive, arg))
}

fn expect_template(directive: &'static str, arg: &Value) -> Result<String, EvalError> {
  arg.as_str().map(str::to_string).ok_or(EvalError::Argument {
    directive,
    expected: "a string",
    found: type_name(arg),
  })
}

fn apply(directive: &'static str, arg: Value, vars: &Map<String, Value>) -> Result<Value, EvalError> {
  let expr_err = |source| EvalError::Expr { directive, source };

  let result = match directive {
    FORMAT_STRING => Value::String(expr::format(&expect_template(directive, &arg)?, vars).map_err(expr_err)?),
    FORMAT_INT => {
      let text = expr::format(&expect_template(directive, &arg)?, vars).map_err(expr_err)?;
      let n = text
        .trim()
        .parse::<i64>()
        .map_err(|_| EvalError::NotAnInteger(text.clone()))?;
      Value::from(n)
    }
    FORMAT_JSON => {
      let text = expr::format(&expect_template(directive, &arg)?, vars).map_err(expr_err)?;
      serde_json::from_str(&text).map_err(EvalError::Json)?
    }
    EVAL => expr::eval(&expect_template(directive, &arg)?, vars).map_err(expr_err)?,
    JOIN => {
      let Value::Array(parts) = arg else {
        return Err(EvalError::Argument {
          directive,
          expected: "a list of lists",
          found: type_name(&arg),
        });
      };
      let mut joined = Vec::new();
      for part in parts {
        match part {
          Value::Array(items) => joined.extend(items),
          other => {
            return Err(EvalError::Argument {
              directive,
              expected: "a list of lists",
              found: type_name(&other),
            });
          }
        }
      }
      Value::Array(joined)
    }
    _ => unreachable!("not an expression directive: {directive}"),
  };

  debug!(directive, "evaluated directive");
  Ok(result)
}
