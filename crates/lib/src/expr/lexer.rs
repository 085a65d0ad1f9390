//! Tokenizer for the expression language.

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
  Int(i64),
  Float(f64),
  Str(String),
  Ident(String),
  // keywords
  True,
  False,
  None,
  And,
  Or,
  Not,
  In,
  If,
  Else,
  // punctuation
  Plus,
  Minus,
  Star,
  Slash,
  DoubleSlash,
  Percent,
  EqEq,
  NotEq,
  Lt,
  Le,
  Gt,
  Ge,
  LParen,
  RParen,
  LBracket,
  RBracket,
  Comma,
  Dot,
}

/// A token with the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
  pub token: Token,
  pub pos: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ExprError> {
  let bytes = input.as_bytes();
  let mut tokens = Vec::new();
  let mut pos = 0;

  while pos < bytes.len() {
    let c = bytes[pos];
    let start = pos;

    if c.is_ascii_whitespace() {
      pos += 1;
      continue;
    }

    let token = match c {
      b'0'..=b'9' => {
        while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'_') {
          pos += 1;
        }
        let is_float = pos + 1 < bytes.len() && bytes[pos] == b'.' && bytes[pos + 1].is_ascii_digit();
        if is_float {
          pos += 1;
          while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
          }
          let text = input[start..pos].replace('_', "");
          let value = text.parse::<f64>().map_err(|_| ExprError::Parse {
            pos: start,
            message: format!("invalid float literal '{text}'"),
          })?;
          Token::Float(value)
        } else {
          let text = input[start..pos].replace('_', "");
          let value = text.parse::<i64>().map_err(|_| ExprError::Parse {
            pos: start,
            message: format!("integer literal '{text}' out of range"),
          })?;
          Token::Int(value)
        }
      }
      b'\'' | b'"' => {
        let (value, end) = lex_string(input, pos)?;
        pos = end;
        Token::Str(value)
      }
      c if c.is_ascii_alphabetic() || c == b'_' => {
        while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
          pos += 1;
        }
        match &input[start..pos] {
          "True" => Token::True,
          "False" => Token::False,
          "None" => Token::None,
          "and" => Token::And,
          "or" => Token::Or,
          "not" => Token::Not,
          "in" => Token::In,
          "if" => Token::If,
          "else" => Token::Else,
          ident => Token::Ident(ident.to_string()),
        }
      }
      _ => {
        let two = input.get(pos..pos + 2).unwrap_or("");
        let (token, len) = match two {
          "//" => (Token::DoubleSlash, 2),
          "==" => (Token::EqEq, 2),
          "!=" => (Token::NotEq, 2),
          "<=" => (Token::Le, 2),
          ">=" => (Token::Ge, 2),
          _ => match c {
            b'+' => (Token::Plus, 1),
            b'-' => (Token::Minus, 1),
            b'*' => (Token::Star, 1),
            b'/' => (Token::Slash, 1),
            b'%' => (Token::Percent, 1),
            b'<' => (Token::Lt, 1),
            b'>' => (Token::Gt, 1),
            b'(' => (Token::LParen, 1),
            b')' => (Token::RParen, 1),
            b'[' => (Token::LBracket, 1),
            b']' => (Token::RBracket, 1),
            b',' => (Token::Comma, 1),
            b'.' => (Token::Dot, 1),
            _ => {
              let ch = input[pos..].chars().next().unwrap_or('?');
              return Err(ExprError::Parse {
                pos,
                message: format!("unexpected character '{ch}'"),
              });
            }
          },
        };
        pos += len;
        token
      }
    };

    tokens.push(Spanned { token, pos: start });
  }

  Ok(tokens)
}

/// Lex a quoted string starting at `start`, returning the value and the end offset.
fn lex_string(input: &str, start: usize) -> Result<(String, usize), ExprError> {
  let mut chars = input[start..].char_indices();
  let (_, quote) = chars.next().ok_or(ExprError::Parse {
    pos: start,
    message: "expected string".to_string(),
  })?;

  let mut value = String::new();
  while let Some((offset, c)) = chars.next() {
    if c == quote {
      return Ok((value, start + offset + c.len_utf8()));
    }
    if c == '\\' {
      let (_, escaped) = chars.next().ok_or(ExprError::Parse {
        pos: start,
        message: "unterminated escape in string literal".to_string(),
      })?;
      value.push(match escaped {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
      });
    } else {
      value.push(c);
    }
  }

  Err(ExprError::Parse {
    pos: start,
    message: "unterminated string literal".to_string(),
  })
}
