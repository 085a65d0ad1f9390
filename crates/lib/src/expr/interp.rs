//! Tree-walking evaluator for parsed expressions.

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use super::ExprError;
use super::parser::{BinaryOp, Expr, UnaryOp};
use crate::value::{render, truthy, type_name};

/// Numeric view of a value.
#[derive(Debug, Clone, Copy)]
enum Num {
  Int(i64),
  Float(f64),
}

impl Num {
  fn of(value: &Value) -> Option<Num> {
    match value {
      Value::Number(n) => n
        .as_i64()
        .map(Num::Int)
        .or_else(|| n.as_f64().map(Num::Float)),
      Value::Bool(b) => Some(Num::Int(*b as i64)),
      _ => None,
    }
  }

  fn as_f64(self) -> f64 {
    match self {
      Num::Int(i) => i as f64,
      Num::Float(f) => f,
    }
  }
}

fn float(f: f64) -> Result<Value, ExprError> {
  Number::from_f64(f)
    .map(Value::Number)
    .ok_or_else(|| ExprError::Type(format!("result {f} is not a finite number")))
}

pub fn evaluate(expr: &Expr, vars: &Map<String, Value>) -> Result<Value, ExprError> {
  match expr {
    Expr::Int(i) => Ok(Value::from(*i)),
    Expr::Float(f) => float(*f),
    Expr::Str(s) => Ok(Value::String(s.clone())),
    Expr::Bool(b) => Ok(Value::Bool(*b)),
    Expr::None => Ok(Value::Null),
    Expr::List(items) => items
      .iter()
      .map(|item| evaluate(item, vars))
      .collect::<Result<Vec<_>, _>>()
      .map(Value::Array),
    Expr::Var(name) => vars
      .get(name)
      .cloned()
      .ok_or_else(|| ExprError::UndefinedVariable(name.clone())),
    Expr::Attr(target, name) => {
      let target = evaluate(target, vars)?;
      match target {
        Value::Object(mut map) => map.remove(name).ok_or_else(|| ExprError::MissingKey(name.clone())),
        other => Err(ExprError::Type(format!(
          "'{}' object has no attribute '{name}'",
          type_name(&other)
        ))),
      }
    }
    Expr::Index(target, index) => {
      let target = evaluate(target, vars)?;
      let index = evaluate(index, vars)?;
      index_value(target, &index)
    }
    Expr::Call(name, args) => {
      let args = args
        .iter()
        .map(|arg| evaluate(arg, vars))
        .collect::<Result<Vec<_>, _>>()?;
      call_builtin(name, args)
    }
    Expr::Method(receiver, name, args) => {
      let receiver = evaluate(receiver, vars)?;
      let args = args
        .iter()
        .map(|arg| evaluate(arg, vars))
        .collect::<Result<Vec<_>, _>>()?;
      call_method(receiver, name, args)
    }
    Expr::Unary(UnaryOp::Not, inner) => Ok(Value::Bool(!truthy(&evaluate(inner, vars)?))),
    Expr::Unary(UnaryOp::Neg, inner) => {
      let value = evaluate(inner, vars)?;
      match Num::of(&value) {
        Some(Num::Int(i)) => i.checked_neg().map(Value::from).ok_or(ExprError::Overflow),
        Some(Num::Float(f)) => float(-f),
        None => Err(ExprError::Type(format!(
          "bad operand type for unary -: '{}'",
          type_name(&value)
        ))),
      }
    }
    Expr::Binary(BinaryOp::And, left, right) => {
      let left = evaluate(left, vars)?;
      if truthy(&left) { evaluate(right, vars) } else { Ok(left) }
    }
    Expr::Binary(BinaryOp::Or, left, right) => {
      let left = evaluate(left, vars)?;
      if truthy(&left) { Ok(left) } else { evaluate(right, vars) }
    }
    Expr::Binary(op, left, right) => {
      let left = evaluate(left, vars)?;
      let right = evaluate(right, vars)?;
      binary(*op, left, right)
    }
    Expr::Cond { cond, then, otherwise } => {
      if truthy(&evaluate(cond, vars)?) {
        evaluate(then, vars)
      } else {
        evaluate(otherwise, vars)
      }
    }
  }
}

fn index_value(target: Value, index: &Value) -> Result<Value, ExprError> {
  match (target, index) {
    (Value::Array(mut items), Value::Number(_)) => {
      let i = expect_int(index, "list index")?;
      let pos = resolve_position(i, items.len())?;
      Ok(items.swap_remove(pos))
    }
    // lists of records can be looked up by their `id` field
    (Value::Array(items), Value::String(key)) => items
      .into_iter()
      .find(|item| item.get("id").and_then(Value::as_str) == Some(key.as_str()))
      .ok_or_else(|| ExprError::MissingKey(key.clone())),
    (Value::Object(mut map), Value::String(key)) => map.remove(key).ok_or_else(|| ExprError::MissingKey(key.clone())),
    (Value::String(s), Value::Number(_)) => {
      let i = expect_int(index, "string index")?;
      let chars: Vec<char> = s.chars().collect();
      let pos = resolve_position(i, chars.len())?;
      Ok(Value::String(chars[pos].to_string()))
    }
    (target, index) => Err(ExprError::Type(format!(
      "'{}' cannot be indexed by '{}'",
      type_name(&target),
      type_name(index)
    ))),
  }
}

/// Map a possibly negative index onto `0..len`.
fn resolve_position(i: i64, len: usize) -> Result<usize, ExprError> {
  let len_i = len as i64;
  let pos = if i < 0 { len_i + i } else { i };
  if pos < 0 || pos >= len_i {
    return Err(ExprError::IndexOutOfRange(i));
  }
  Ok(pos as usize)
}

fn expect_int(value: &Value, what: &str) -> Result<i64, ExprError> {
  match Num::of(value) {
    Some(Num::Int(i)) if !value.is_boolean() => Ok(i),
    _ => Err(ExprError::Type(format!(
      "{what} must be an integer, not '{}'",
      type_name(value)
    ))),
  }
}

fn expect_str<'a>(value: &'a Value, what: &str) -> Result<&'a str, ExprError> {
  value
    .as_str()
    .ok_or_else(|| ExprError::Type(format!("{what} must be a string, not '{}'", type_name(value))))
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ExprError> {
  match op {
    BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
    BinaryOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
    BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
      let ordering = compare(&left, &right)?;
      Ok(Value::Bool(match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
      }))
    }
    BinaryOp::In => contains(&right, &left).map(Value::Bool),
    BinaryOp::NotIn => contains(&right, &left).map(|found| Value::Bool(!found)),
    BinaryOp::Add => add(left, right),
    BinaryOp::Mul => multiply(left, right),
    BinaryOp::Sub | BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod => arithmetic(op, &left, &right),
    BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit operators are evaluated lazily"),
  }
}

fn values_equal(left: &Value, right: &Value) -> bool {
  match (Num::of(left), Num::of(right)) {
    (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
    (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
    _ => left == right,
  }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, ExprError> {
  match (left, right) {
    (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
    (Value::Array(a), Value::Array(b)) => {
      for (x, y) in a.iter().zip(b) {
        let ordering = compare(x, y)?;
        if ordering != Ordering::Equal {
          return Ok(ordering);
        }
      }
      Ok(a.len().cmp(&b.len()))
    }
    _ => match (Num::of(left), Num::of(right)) {
      (Some(Num::Int(a)), Some(Num::Int(b))) => Ok(a.cmp(&b)),
      (Some(a), Some(b)) => a
        .as_f64()
        .partial_cmp(&b.as_f64())
        .ok_or_else(|| ExprError::Type("cannot order NaN".to_string())),
      _ => Err(ExprError::Type(format!(
        "'<' not supported between '{}' and '{}'",
        type_name(left),
        type_name(right)
      ))),
    },
  }
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool, ExprError> {
  match haystack {
    Value::String(s) => Ok(s.contains(expect_str(needle, "left operand of 'in'")?)),
    Value::Array(items) => Ok(items.iter().any(|item| values_equal(item, needle))),
    Value::Object(map) => Ok(map.contains_key(expect_str(needle, "dict key")?)),
    other => Err(ExprError::Type(format!(
      "argument of type '{}' is not iterable",
      type_name(other)
    ))),
  }
}

fn add(left: Value, right: Value) -> Result<Value, ExprError> {
  match (left, right) {
    (Value::String(mut a), Value::String(b)) => {
      a.push_str(&b);
      Ok(Value::String(a))
    }
    (Value::Array(mut a), Value::Array(b)) => {
      a.extend(b);
      Ok(Value::Array(a))
    }
    (left, right) => arithmetic(BinaryOp::Add, &left, &right),
  }
}

/// Upper bound on the length of a repeated string or list.
const MAX_REPEAT_LEN: usize = 1 << 24;

/// Clamp a repeat count to zero and check the resulting length. Empty operands repeat zero times.
fn repeat_count(count: i64, len: usize) -> Result<usize, ExprError> {
  let count = usize::try_from(count.max(0)).map_err(|_| ExprError::Overflow)?;
  if len == 0 {
    return Ok(0);
  }
  match len.checked_mul(count) {
    Some(total) if total <= MAX_REPEAT_LEN => Ok(count),
    _ => Err(ExprError::Overflow),
  }
}

fn multiply(left: Value, right: Value) -> Result<Value, ExprError> {
  match (&left, &right) {
    (Value::String(s), Value::Number(_)) | (Value::Number(_), Value::String(s)) => {
      let count = expect_int(if left.is_string() { &right } else { &left }, "repeat count")?;
      Ok(Value::String(s.repeat(repeat_count(count, s.len())?)))
    }
    (Value::Array(items), Value::Number(_)) => {
      let count = repeat_count(expect_int(&right, "repeat count")?, items.len())?;
      let mut out = Vec::with_capacity(items.len() * count);
      for _ in 0..count {
        out.extend(items.iter().cloned());
      }
      Ok(Value::Array(out))
    }
    _ => arithmetic(BinaryOp::Mul, &left, &right),
  }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExprError> {
  let (Some(a), Some(b)) = (Num::of(left), Num::of(right)) else {
    return Err(ExprError::Type(format!(
      "unsupported operand types for {op:?}: '{}' and '{}'",
      type_name(left),
      type_name(right)
    )));
  };

  if let (Num::Int(a), Num::Int(b)) = (a, b) {
    return match op {
      BinaryOp::Add => a.checked_add(b).map(Value::from).ok_or(ExprError::Overflow),
      BinaryOp::Sub => a.checked_sub(b).map(Value::from).ok_or(ExprError::Overflow),
      BinaryOp::Mul => a.checked_mul(b).map(Value::from).ok_or(ExprError::Overflow),
      BinaryOp::Div if b == 0 => Err(ExprError::DivisionByZero),
      BinaryOp::Div => float(a as f64 / b as f64),
      BinaryOp::FloorDiv | BinaryOp::Mod if b == 0 => Err(ExprError::DivisionByZero),
      BinaryOp::FloorDiv => {
        let q = a.checked_div(b).ok_or(ExprError::Overflow)?;
        let adjust = a % b != 0 && ((a < 0) != (b < 0));
        Ok(Value::from(if adjust { q - 1 } else { q }))
      }
      BinaryOp::Mod => {
        let r = a.checked_rem(b).ok_or(ExprError::Overflow)?;
        let adjust = r != 0 && ((r < 0) != (b < 0));
        Ok(Value::from(if adjust { r + b } else { r }))
      }
      _ => unreachable!("not an arithmetic operator"),
    };
  }

  let (a, b) = (a.as_f64(), b.as_f64());
  match op {
    BinaryOp::Add => float(a + b),
    BinaryOp::Sub => float(a - b),
    BinaryOp::Mul => float(a * b),
    BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => Err(ExprError::DivisionByZero),
    BinaryOp::Div => float(a / b),
    BinaryOp::FloorDiv => float((a / b).floor()),
    BinaryOp::Mod => float(a - b * (a / b).floor()),
    _ => unreachable!("not an arithmetic operator"),
  }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ExprError> {
  if args.len() < min || args.len() > max {
    return Err(ExprError::Type(format!(
      "{name}() takes {} arguments ({} given)",
      if min == max { min.to_string() } else { format!("{min} to {max}") },
      args.len()
    )));
  }
  Ok(())
}

fn call_builtin(name: &str, mut args: Vec<Value>) -> Result<Value, ExprError> {
  match name {
    "len" => {
      arity(name, &args, 1, 1)?;
      let len = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        other => {
          return Err(ExprError::Type(format!(
            "object of type '{}' has no len()",
            type_name(other)
          )));
        }
      };
      Ok(Value::from(len as u64))
    }
    "str" => {
      arity(name, &args, 1, 1)?;
      Ok(Value::String(render(&args[0])))
    }
    "int" => {
      arity(name, &args, 1, 1)?;
      to_int(&args[0]).map(Value::from)
    }
    "float" => {
      arity(name, &args, 1, 1)?;
      match &args[0] {
        Value::String(s) => s
          .trim()
          .parse::<f64>()
          .map_err(|_| ExprError::Type(format!("could not convert string to float: '{s}'")))
          .and_then(float),
        other => match Num::of(other) {
          Some(n) => float(n.as_f64()),
          None => Err(ExprError::Type(format!(
            "float() argument must be a string or a number, not '{}'",
            type_name(other)
          ))),
        },
      }
    }
    "bool" => {
      arity(name, &args, 1, 1)?;
      Ok(Value::Bool(truthy(&args[0])))
    }
    "abs" => {
      arity(name, &args, 1, 1)?;
      match Num::of(&args[0]) {
        Some(Num::Int(i)) => i.checked_abs().map(Value::from).ok_or(ExprError::Overflow),
        Some(Num::Float(f)) => float(f.abs()),
        None => Err(ExprError::Type(format!(
          "bad operand type for abs(): '{}'",
          type_name(&args[0])
        ))),
      }
    }
    "min" | "max" => {
      let candidates = match args.len() {
        0 => return Err(ExprError::Type(format!("{name}() expected at least 1 argument"))),
        1 => match args.pop() {
          Some(Value::Array(items)) => items,
          Some(other) => {
            return Err(ExprError::Type(format!(
              "'{}' object is not iterable",
              type_name(&other)
            )));
          }
          None => Vec::new(),
        },
        _ => args,
      };
      let mut best: Option<Value> = None;
      for candidate in candidates {
        best = Some(match best {
          None => candidate,
          Some(current) => {
            let ordering = compare(&candidate, &current)?;
            let replace = if name == "min" {
              ordering == Ordering::Less
            } else {
              ordering == Ordering::Greater
            };
            if replace { candidate } else { current }
          }
        });
      }
      best.ok_or_else(|| ExprError::Type(format!("{name}() arg is an empty sequence")))
    }
    _ => Err(ExprError::UnknownFunction(name.to_string())),
  }
}

fn to_int(value: &Value) -> Result<i64, ExprError> {
  match value {
    Value::String(s) => s
      .trim()
      .parse::<i64>()
      .map_err(|_| ExprError::Type(format!("invalid literal for int(): '{s}'"))),
    other => match Num::of(other) {
      Some(Num::Int(i)) => Ok(i),
      Some(Num::Float(f)) if f.is_finite() && f.abs() < i64::MAX as f64 => Ok(f.trunc() as i64),
      Some(Num::Float(_)) => Err(ExprError::Overflow),
      None => Err(ExprError::Type(format!(
        "int() argument must be a string or a number, not '{}'",
        type_name(other)
      ))),
    },
  }
}

fn call_method(receiver: Value, name: &str, args: Vec<Value>) -> Result<Value, ExprError> {
  match receiver {
    Value::String(s) => string_method(&s, name, &args),
    Value::Object(map) => object_method(map, name, args),
    other => Err(ExprError::UnknownMethod {
      type_name: type_name(&other),
      method: name.to_string(),
    }),
  }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Result<Value, ExprError> {
  let strip_chars = |args: &[Value]| -> Result<Option<Vec<char>>, ExprError> {
    match args.first() {
      None | Some(Value::Null) => Ok(None),
      Some(chars) => Ok(Some(expect_str(chars, "strip characters")?.chars().collect())),
    }
  };

  let result = match name {
    "upper" => {
      arity(name, args, 0, 0)?;
      Value::String(s.to_uppercase())
    }
    "lower" => {
      arity(name, args, 0, 0)?;
      Value::String(s.to_lowercase())
    }
    "strip" | "lstrip" | "rstrip" => {
      arity(name, args, 0, 1)?;
      let chars = strip_chars(args)?;
      let matches = |c: char| match &chars {
        Some(set) => set.contains(&c),
        None => c.is_whitespace(),
      };
      Value::String(
        match name {
          "strip" => s.trim_matches(matches),
          "lstrip" => s.trim_start_matches(matches),
          _ => s.trim_end_matches(matches),
        }
        .to_string(),
      )
    }
    "startswith" => {
      arity(name, args, 1, 1)?;
      Value::Bool(s.starts_with(expect_str(&args[0], "prefix")?))
    }
    "endswith" => {
      arity(name, args, 1, 1)?;
      Value::Bool(s.ends_with(expect_str(&args[0], "suffix")?))
    }
    "replace" => {
      arity(name, args, 2, 2)?;
      Value::String(s.replace(expect_str(&args[0], "old")?, expect_str(&args[1], "new")?))
    }
    "split" => {
      arity(name, args, 0, 1)?;
      let parts: Vec<Value> = match args.first() {
        None | Some(Value::Null) => s.split_whitespace().map(Value::from).collect(),
        Some(sep) => {
          let sep = expect_str(sep, "separator")?;
          if sep.is_empty() {
            return Err(ExprError::Type("empty separator".to_string()));
          }
          s.split(sep).map(Value::from).collect()
        }
      };
      Value::Array(parts)
    }
    "join" => {
      arity(name, args, 1, 1)?;
      let Value::Array(items) = &args[0] else {
        return Err(ExprError::Type(format!(
          "can only join a list, not '{}'",
          type_name(&args[0])
        )));
      };
      Value::String(items.iter().map(render).collect::<Vec<_>>().join(s))
    }
    _ => {
      return Err(ExprError::UnknownMethod {
        type_name: "str",
        method: name.to_string(),
      });
    }
  };
  Ok(result)
}

fn object_method(mut map: Map<String, Value>, name: &str, mut args: Vec<Value>) -> Result<Value, ExprError> {
  match name {
    "get" => {
      arity(name, &args, 1, 2)?;
      let default = if args.len() == 2 { args.pop().unwrap_or(Value::Null) } else { Value::Null };
      let key = expect_str(&args[0], "dict key")?;
      Ok(map.remove(key).unwrap_or(default))
    }
    "keys" => {
      arity(name, &args, 0, 0)?;
      Ok(Value::Array(map.into_iter().map(|(k, _)| Value::String(k)).collect()))
    }
    "values" => {
      arity(name, &args, 0, 0)?;
      Ok(Value::Array(map.into_iter().map(|(_, v)| v).collect()))
    }
    _ => Err(ExprError::UnknownMethod {
      type_name: "dict",
      method: name.to_string(),
    }),
  }
}
