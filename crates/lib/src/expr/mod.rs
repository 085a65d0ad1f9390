//! The embedded expression language used by `mpp-eval` and format templates.
//!
//! Expressions are evaluated against an immutable snapshot of the variable
//! environment. The language is deliberately small: literals, arithmetic,
//! comparisons, boolean logic, conditionals, attribute and index lookup into
//! nested values, and an allow-list of builtin functions and methods. There
//! is no assignment and no way to reach outside the snapshot.
//!
//! # Example
//!
//! ```
//! use mpp_lib::expr;
//! use serde_json::{Map, json};
//!
//! let mut vars = Map::new();
//! vars.insert("image".to_string(), json!({"size": 4194304}));
//!
//! assert_eq!(expr::eval("image.size // 512", &vars).unwrap(), json!(8192));
//! assert_eq!(expr::format("{image.size:x}", &vars).unwrap(), "400000");
//! ```

mod format;
mod interp;
mod lexer;
mod parser;

use serde_json::{Map, Value};
use thiserror::Error;

pub use format::format;
pub use parser::{BinaryOp, Expr, UnaryOp, parse};

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
  #[error("syntax error at offset {pos}: {message}")]
  Parse { pos: usize, message: String },

  #[error("name '{0}' is not defined")]
  UndefinedVariable(String),

  #[error("{0}")]
  Type(String),

  #[error("unknown function '{0}'")]
  UnknownFunction(String),

  #[error("'{type_name}' has no method '{method}'")]
  UnknownMethod { type_name: &'static str, method: String },

  #[error("index {0} out of range")]
  IndexOutOfRange(i64),

  #[error("key '{0}' not found")]
  MissingKey(String),

  #[error("division by zero")]
  DivisionByZero,

  #[error("integer overflow")]
  Overflow,

  #[error("invalid format template: {0}")]
  Format(String),
}

/// Parse and evaluate `input` against `vars`.
pub fn eval(input: &str, vars: &Map<String, Value>) -> Result<Value, ExprError> {
  let expr = parse(input)?;
  interp::evaluate(&expr, vars)
}

/// Evaluate an already parsed expression.
pub fn evaluate(expr: &Expr, vars: &Map<String, Value>) -> Result<Value, ExprError> {
  interp::evaluate(expr, vars)
}

/// Parse `input` as a literal: numbers, strings, `True`/`False`/`None` and lists of literals.
///
/// Used for command-line variable overrides, where names must not be looked up.
pub fn literal(input: &str) -> Result<Value, ExprError> {
  let expr = parse(input)?;
  if !is_literal(&expr) {
    return Err(ExprError::Type(format!("'{input}' is not a literal value")));
  }
  interp::evaluate(&expr, &Map::new())
}

fn is_literal(expr: &Expr) -> bool {
  match expr {
    Expr::Int(_) | Expr::Float(_) | Expr::Str(_) | Expr::Bool(_) | Expr::None => true,
    Expr::List(items) => items.iter().all(is_literal),
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn literal_accepts_scalars_and_lists() {
    assert_eq!(literal("42").unwrap(), json!(42));
    assert_eq!(literal("'9.4'").unwrap(), json!("9.4"));
    assert_eq!(literal("False").unwrap(), json!(false));
    assert_eq!(literal("[1, 'a', [None]]").unwrap(), json!([1, "a", [null]]));
  }

  #[test]
  fn literal_rejects_names_and_arithmetic() {
    assert!(matches!(literal("x86_64"), Err(ExprError::Type(_))));
    assert!(matches!(literal("1 + 1"), Err(ExprError::Type(_))));
  }
}
