//! `$name` placeholder substitution inside directive parameters.
//!
//! Substitution is tolerant: a placeholder naming a variable that does not
//! exist is left in the output exactly as written, and so is any `$` that
//! does not start a placeholder.
//!
//! # Placeholder Formats
//!
//! - `$name` - identifier made of ASCII letters, digits and `_`, not starting with a digit
//! - `${name}` - braced form, for placeholders followed by identifier characters
//!
//! # Escaping
//!
//! `$$` produces a single literal `$`.
//!
//! # Example
//!
//! ```
//! use mpp_lib::template::{parse, Segment};
//!
//! let segments = parse("${arch}-$undefined");
//! assert_eq!(segments, vec![
//!     Segment::Placeholder { name: "arch".to_string(), raw: "${arch}".to_string() },
//!     Segment::Literal("-".to_string()),
//!     Segment::Placeholder { name: "undefined".to_string(), raw: "$undefined".to_string() },
//! ]);
//! ```

use serde_json::{Map, Value};

use crate::value::render;

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A placeholder, with its source spelling kept for the unresolved case
  Placeholder { name: String, raw: String },
}

fn is_ident_start(c: char) -> bool {
  c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_'
}

/// Parse a string into literal and placeholder segments.
///
/// Parsing never fails; anything that is not a well-formed placeholder is
/// literal text.
pub fn parse(input: &str) -> Vec<Segment> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '$')) => {
        chars.next();
        literal.push('$');
      }
      Some((_, '{')) => {
        let rest = &input[pos + 2..];
        let close = rest.find('}');
        let name = close.map(|end| &rest[..end]);
        match name {
          Some(name) if name.starts_with(is_ident_start) && name.chars().all(is_ident_char) => {
            if !literal.is_empty() {
              segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder {
              name: name.to_string(),
              raw: format!("${{{name}}}"),
            });
            // consume `{`, the name and `}`
            for _ in 0..name.chars().count() + 2 {
              chars.next();
            }
          }
          _ => literal.push('$'),
        }
      }
      Some((_, c)) if is_ident_start(*c) => {
        let mut name = String::new();
        while let Some((_, c)) = chars.peek() {
          if !is_ident_char(*c) {
            break;
          }
          name.push(*c);
          chars.next();
        }
        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Placeholder {
          raw: format!("${name}"),
          name,
        });
      }
      _ => literal.push('$'),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  segments
}

/// Substitute placeholders in a string against `vars`.
pub fn substitute(input: &str, vars: &Map<String, Value>) -> String {
  if !input.contains('$') {
    return input.to_string();
  }

  let mut result = String::with_capacity(input.len());
  for segment in parse(input) {
    match segment {
      Segment::Literal(s) => result.push_str(&s),
      Segment::Placeholder { name, raw } => match vars.get(&name) {
        Some(value) => result.push_str(&render(value)),
        None => result.push_str(&raw),
      },
    }
  }
  result
}

/// Substitute placeholders in every string of a tree, in place.
///
/// Object keys are left alone; only string leaves are rewritten.
pub fn substitute_tree(value: &mut Value, vars: &Map<String, Value>) {
  match value {
    Value::String(s) => {
      let substituted = substitute(s, vars);
      *s = substituted;
    }
    Value::Array(items) => {
      for item in items {
        substitute_tree(item, vars);
      }
    }
    Value::Object(map) => {
      for (_, child) in map.iter_mut() {
        substitute_tree(child, vars);
      }
    }
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn vars(value: Value) -> Map<String, Value> {
    match value {
      Value::Object(map) => map,
      _ => panic!("test vars must be an object"),
    }
  }

  // ==========================================================================
  // Realistic Scenario Tests
  // ==========================================================================

  #[test]
  fn repo_url_with_release_and_arch() {
    let vars = vars(json!({"release": "9", "arch": "aarch64"}));
    let url = "https://mirror.example.com/$release/BaseOS/${arch}/os/";
    assert_eq!(
      substitute(url, &vars),
      "https://mirror.example.com/9/BaseOS/aarch64/os/"
    );
  }

  #[test]
  fn braced_form_allows_adjacent_text() {
    let vars = vars(json!({"name": "kernel"}));
    assert_eq!(substitute("${name}core", &vars), "kernelcore");
    assert_eq!(substitute("$namecore", &vars), "$namecore");
  }

  #[test]
  fn non_string_values_are_rendered() {
    let vars = vars(json!({"size": 4096, "debug": false}));
    assert_eq!(substitute("size=$size debug=$debug", &vars), "size=4096 debug=False");
  }

  #[test]
  fn tree_substitution_rewrites_nested_leaves_only() {
    let vars = vars(json!({"arch": "x86_64"}));
    let mut tree = json!({
      "architecture": "$arch",
      "repos": [{"id": "baseos", "baseurl": "http://example.com/$arch"}],
      "ignore-weak-deps": true
    });
    substitute_tree(&mut tree, &vars);
    assert_eq!(
      tree,
      json!({
        "architecture": "x86_64",
        "repos": [{"id": "baseos", "baseurl": "http://example.com/x86_64"}],
        "ignore-weak-deps": true
      })
    );
  }

  // ==========================================================================
  // Tolerance
  // ==========================================================================

  #[test]
  fn undefined_placeholder_left_verbatim() {
    let vars = Map::new();
    assert_eq!(substitute("$undefined", &vars), "$undefined");
    assert_eq!(substitute("${undefined}/x", &vars), "${undefined}/x");
  }

  #[test]
  fn malformed_placeholders_pass_through() {
    let vars = vars(json!({"a": "A"}));
    assert_eq!(substitute("costs $5 or more$", &vars), "costs $5 or more$");
    assert_eq!(substitute("${unclosed", &vars), "${unclosed");
    assert_eq!(substitute("${not valid}", &vars), "${not valid}");
  }

  #[test]
  fn double_dollar_escapes() {
    let vars = vars(json!({"a": "A"}));
    assert_eq!(substitute("$$a is $a", &vars), "$a is A");
  }

  #[test]
  fn empty_input() {
    assert!(parse("").is_empty());
  }
}
