//! Format templates: literal text with `{expression:spec}` replacement fields.
//!
//! `{{` and `}}` produce literal braces. The part before a top-level `:` is
//! an expression; the optional spec is `[[fill]align][0][width][.precision][type]`
//! with `align` one of `<`, `>`, `^` and `type` one of `s d x X o b f`.

use serde_json::{Map, Value};

use super::{ExprError, interp, parser};
use crate::value::{render, type_name};

/// Render a format template against `vars`.
pub fn format(template: &str, vars: &Map<String, Value>) -> Result<String, ExprError> {
  let mut out = String::with_capacity(template.len());
  let mut chars = template.char_indices().peekable();

  while let Some((pos, c)) = chars.next() {
    match c {
      '{' if matches!(chars.peek(), Some((_, '{'))) => {
        chars.next();
        out.push('{');
      }
      '}' if matches!(chars.peek(), Some((_, '}'))) => {
        chars.next();
        out.push('}');
      }
      '}' => return Err(ExprError::Format(format!("single '}}' at offset {pos}"))),
      '{' => {
        let body_start = pos + 1;
        let body_end = find_field_end(template, body_start)
          .ok_or_else(|| ExprError::Format(format!("unclosed '{{' at offset {pos}")))?;
        let body = &template[body_start..body_end];
        out.push_str(&render_field(body, vars)?);
        while let Some((i, _)) = chars.peek() {
          if *i > body_end {
            break;
          }
          chars.next();
        }
      }
      c => out.push(c),
    }
  }

  Ok(out)
}

/// Find the `}` closing a field that starts at `start`, skipping nested
/// brackets and quoted strings inside the expression.
fn find_field_end(template: &str, start: usize) -> Option<usize> {
  let mut depth = 0usize;
  let mut quote: Option<char> = None;
  let mut escaped = false;

  for (offset, c) in template[start..].char_indices() {
    if let Some(q) = quote {
      if escaped {
        escaped = false;
      } else if c == '\\' {
        escaped = true;
      } else if c == q {
        quote = None;
      }
      continue;
    }
    match c {
      '\'' | '"' => quote = Some(c),
      '[' | '(' | '{' => depth += 1,
      ']' | ')' => depth = depth.saturating_sub(1),
      '}' if depth == 0 => return Some(start + offset),
      '}' => depth -= 1,
      _ => {}
    }
  }
  None
}

/// Split a field body at its top-level `:` into expression and spec.
fn split_spec(body: &str) -> (&str, Option<&str>) {
  let mut depth = 0usize;
  let mut quote: Option<char> = None;

  for (offset, c) in body.char_indices() {
    if let Some(q) = quote {
      if c == q {
        quote = None;
      }
      continue;
    }
    match c {
      '\'' | '"' => quote = Some(c),
      '[' | '(' => depth += 1,
      ']' | ')' => depth = depth.saturating_sub(1),
      ':' if depth == 0 => return (&body[..offset], Some(&body[offset + 1..])),
      _ => {}
    }
  }
  (body, None)
}

fn render_field(body: &str, vars: &Map<String, Value>) -> Result<String, ExprError> {
  let (expr_src, spec) = split_spec(body);
  if expr_src.trim().is_empty() {
    return Err(ExprError::Format("empty replacement field".to_string()));
  }
  let expr = parser::parse(expr_src)?;
  let value = interp::evaluate(&expr, vars)?;
  match spec {
    None | Some("") => Ok(render(&value)),
    Some(spec) => apply_spec(&value, &Spec::parse(spec)?),
  }
}

#[derive(Debug, Default, PartialEq)]
struct Spec {
  fill: Option<char>,
  align: Option<char>,
  zero: bool,
  width: usize,
  precision: Option<usize>,
  kind: Option<char>,
}

impl Spec {
  fn parse(spec: &str) -> Result<Spec, ExprError> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;

    let is_align = |c: char| matches!(c, '<' | '>' | '^');
    if chars.len() >= 2 && is_align(chars[1]) {
      out.fill = Some(chars[0]);
      out.align = Some(chars[1]);
      i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
      out.align = Some(chars[0]);
      i = 1;
    }

    if chars.get(i) == Some(&'0') {
      out.zero = true;
      i += 1;
    }

    let width_start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
      i += 1;
    }
    if i > width_start {
      let digits: String = chars[width_start..i].iter().collect();
      out.width = digits.parse().map_err(|_| ExprError::Format(format!("bad width in '{spec}'")))?;
    }

    if chars.get(i) == Some(&'.') {
      i += 1;
      let start = i;
      while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
      }
      let digits: String = chars[start..i].iter().collect();
      out.precision = Some(
        digits
          .parse()
          .map_err(|_| ExprError::Format(format!("bad precision in '{spec}'")))?,
      );
    }

    if let Some(&kind) = chars.get(i) {
      if !matches!(kind, 's' | 'd' | 'x' | 'X' | 'o' | 'b' | 'f') {
        return Err(ExprError::Format(format!("unknown format code '{kind}'")));
      }
      out.kind = Some(kind);
      i += 1;
    }

    if i != chars.len() {
      return Err(ExprError::Format(format!("invalid format spec '{spec}'")));
    }
    Ok(out)
  }
}

fn apply_spec(value: &Value, spec: &Spec) -> Result<String, ExprError> {
  let numeric = value.is_number();
  let body = match spec.kind {
    None | Some('s') => {
      let s = render(value);
      match (spec.precision, value) {
        (Some(p), Value::String(_)) => s.chars().take(p).collect(),
        (Some(p), Value::Number(n)) if n.is_f64() => format!("{:.*}", p, n.as_f64().unwrap_or(0.0)),
        _ => s,
      }
    }
    Some('f') => {
      let f = value
        .as_f64()
        .ok_or_else(|| ExprError::Format(format!("'f' needs a number, got '{}'", type_name(value))))?;
      format!("{:.*}", spec.precision.unwrap_or(6), f)
    }
    Some(kind) => {
      let i = value.as_i64().ok_or_else(|| {
        ExprError::Format(format!("'{kind}' needs an integer, got '{}'", type_name(value)))
      })?;
      let magnitude = i.unsigned_abs();
      let digits = match kind {
        'x' => format!("{magnitude:x}"),
        'X' => format!("{magnitude:X}"),
        'o' => format!("{magnitude:o}"),
        'b' => format!("{magnitude:b}"),
        _ => magnitude.to_string(),
      };
      if i < 0 { format!("-{digits}") } else { digits }
    }
  };

  let len = body.chars().count();
  if len >= spec.width {
    return Ok(body);
  }
  let pad = spec.width - len;

  // zero padding goes between the sign and the digits
  if spec.zero && spec.align.is_none() && (numeric || spec.kind.is_some_and(|k| k != 's')) {
    let (sign, digits) = match body.strip_prefix('-') {
      Some(rest) => ("-", rest),
      None => ("", body.as_str()),
    };
    return Ok(format!("{sign}{}{digits}", "0".repeat(pad)));
  }

  let fill = spec.fill.unwrap_or(if spec.zero { '0' } else { ' ' });
  let fill_str = |n: usize| fill.to_string().repeat(n);
  let align = spec.align.unwrap_or(if numeric { '>' } else { '<' });
  Ok(match align {
    '>' => format!("{}{body}", fill_str(pad)),
    '^' => format!("{}{body}{}", fill_str(pad / 2), fill_str(pad - pad / 2)),
    _ => format!("{body}{}", fill_str(pad)),
  })
}
