//! Recursive descent parser producing an [`Expr`] tree.
//!
//! Precedence, lowest first: conditional (`a if c else b`), `or`, `and`,
//! `not`, comparisons (including `in` / `not in`), `+ -`, `* / // %`,
//! unary minus, then postfix attribute / index / call.

use super::ExprError;
use super::lexer::{Spanned, Token, tokenize};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
  Int(i64),
  Float(f64),
  Str(String),
  Bool(bool),
  None,
  List(Vec<Expr>),
  Var(String),
  Attr(Box<Expr>, String),
  Index(Box<Expr>, Box<Expr>),
  /// Call of a builtin function by name.
  Call(String, Vec<Expr>),
  /// Method call on a receiver.
  Method(Box<Expr>, String, Vec<Expr>),
  Unary(UnaryOp, Box<Expr>),
  Binary(BinaryOp, Box<Expr>, Box<Expr>),
  Cond {
    cond: Box<Expr>,
    then: Box<Expr>,
    otherwise: Box<Expr>,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
  Neg,
  Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  FloorDiv,
  Mod,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  In,
  NotIn,
  And,
  Or,
}

/// Parse a complete expression.
pub fn parse(input: &str) -> Result<Expr, ExprError> {
  let tokens = tokenize(input)?;
  let mut parser = Parser {
    tokens,
    pos: 0,
    end: input.len(),
  };
  let expr = parser.parse_ternary()?;
  if let Some(tok) = parser.tokens.get(parser.pos) {
    return Err(ExprError::Parse {
      pos: tok.pos,
      message: format!("unexpected {:?} after end of expression", tok.token),
    });
  }
  Ok(expr)
}

struct Parser {
  tokens: Vec<Spanned>,
  pos: usize,
  /// Offset reported for errors at end of input.
  end: usize,
}

impl Parser {
  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos).map(|s| &s.token)
  }

  fn peek_at(&self, offset: usize) -> Option<&Token> {
    self.tokens.get(self.pos + offset).map(|s| &s.token)
  }

  fn current_pos(&self) -> usize {
    self.tokens.get(self.pos).map(|s| s.pos).unwrap_or(self.end)
  }

  fn advance(&mut self) -> Option<Token> {
    let tok = self.tokens.get(self.pos).map(|s| s.token.clone());
    if tok.is_some() {
      self.pos += 1;
    }
    tok
  }

  fn eat(&mut self, token: &Token) -> bool {
    if self.peek() == Some(token) {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn expect(&mut self, token: Token) -> Result<(), ExprError> {
    if self.eat(&token) {
      Ok(())
    } else {
      Err(self.error(format!("expected {token:?}")))
    }
  }

  fn error(&self, message: String) -> ExprError {
    let found = match self.peek() {
      Some(tok) => format!("{tok:?}"),
      None => "end of input".to_string(),
    };
    ExprError::Parse {
      pos: self.current_pos(),
      message: format!("{message}, found {found}"),
    }
  }

  fn parse_ternary(&mut self) -> Result<Expr, ExprError> {
    let then = self.parse_or()?;
    if !self.eat(&Token::If) {
      return Ok(then);
    }
    let cond = self.parse_or()?;
    self.expect(Token::Else)?;
    let otherwise = self.parse_ternary()?;
    Ok(Expr::Cond {
      cond: Box::new(cond),
      then: Box::new(then),
      otherwise: Box::new(otherwise),
    })
  }

  fn parse_or(&mut self) -> Result<Expr, ExprError> {
    let mut left = self.parse_and()?;
    while self.eat(&Token::Or) {
      let right = self.parse_and()?;
      left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn parse_and(&mut self) -> Result<Expr, ExprError> {
    let mut left = self.parse_not()?;
    while self.eat(&Token::And) {
      let right = self.parse_not()?;
      left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn parse_not(&mut self) -> Result<Expr, ExprError> {
    if self.eat(&Token::Not) {
      let inner = self.parse_not()?;
      return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
    }
    self.parse_comparison()
  }

  fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
    let left = self.parse_sum()?;
    let op = match self.peek() {
      Some(Token::EqEq) => BinaryOp::Eq,
      Some(Token::NotEq) => BinaryOp::Ne,
      Some(Token::Lt) => BinaryOp::Lt,
      Some(Token::Le) => BinaryOp::Le,
      Some(Token::Gt) => BinaryOp::Gt,
      Some(Token::Ge) => BinaryOp::Ge,
      Some(Token::In) => BinaryOp::In,
      Some(Token::Not) if self.peek_at(1) == Some(&Token::In) => {
        self.pos += 1;
        BinaryOp::NotIn
      }
      _ => return Ok(left),
    };
    self.pos += 1;
    let right = self.parse_sum()?;
    Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
  }

  fn parse_sum(&mut self) -> Result<Expr, ExprError> {
    let mut left = self.parse_term()?;
    loop {
      let op = match self.peek() {
        Some(Token::Plus) => BinaryOp::Add,
        Some(Token::Minus) => BinaryOp::Sub,
        _ => break,
      };
      self.pos += 1;
      let right = self.parse_term()?;
      left = Expr::Binary(op, Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn parse_term(&mut self) -> Result<Expr, ExprError> {
    let mut left = self.parse_unary()?;
    loop {
      let op = match self.peek() {
        Some(Token::Star) => BinaryOp::Mul,
        Some(Token::Slash) => BinaryOp::Div,
        Some(Token::DoubleSlash) => BinaryOp::FloorDiv,
        Some(Token::Percent) => BinaryOp::Mod,
        _ => break,
      };
      self.pos += 1;
      let right = self.parse_unary()?;
      left = Expr::Binary(op, Box::new(left), Box::new(right));
    }
    Ok(left)
  }

  fn parse_unary(&mut self) -> Result<Expr, ExprError> {
    if self.eat(&Token::Minus) {
      let inner = self.parse_unary()?;
      return Ok(match inner {
        Expr::Int(i) => Expr::Int(-i),
        Expr::Float(f) => Expr::Float(-f),
        other => Expr::Unary(UnaryOp::Neg, Box::new(other)),
      });
    }
    if self.eat(&Token::Plus) {
      return self.parse_unary();
    }
    self.parse_postfix()
  }

  fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
    let mut expr = self.parse_primary()?;
    loop {
      match self.peek() {
        Some(Token::Dot) => {
          self.pos += 1;
          let name = match self.peek() {
            Some(Token::Ident(name)) => name.clone(),
            _ => return Err(self.error("expected attribute name after '.'".to_string())),
          };
          self.pos += 1;
          if self.eat(&Token::LParen) {
            let args = self.parse_args(Token::RParen)?;
            expr = Expr::Method(Box::new(expr), name, args);
          } else {
            expr = Expr::Attr(Box::new(expr), name);
          }
        }
        Some(Token::LBracket) => {
          self.pos += 1;
          let index = self.parse_ternary()?;
          self.expect(Token::RBracket)?;
          expr = Expr::Index(Box::new(expr), Box::new(index));
        }
        Some(Token::LParen) => {
          let Expr::Var(name) = expr else {
            return Err(self.error("only named functions can be called".to_string()));
          };
          self.pos += 1;
          let args = self.parse_args(Token::RParen)?;
          expr = Expr::Call(name, args);
        }
        _ => return Ok(expr),
      }
    }
  }

  /// Parse a comma separated list up to and including `close`.
  fn parse_args(&mut self, close: Token) -> Result<Vec<Expr>, ExprError> {
    let mut args = Vec::new();
    if self.eat(&close) {
      return Ok(args);
    }
    loop {
      args.push(self.parse_ternary()?);
      if self.eat(&close) {
        return Ok(args);
      }
      self.expect(Token::Comma)?;
      // trailing comma
      if self.eat(&close) {
        return Ok(args);
      }
    }
  }

  fn parse_primary(&mut self) -> Result<Expr, ExprError> {
    let pos = self.current_pos();
    match self.advance() {
      Some(Token::Int(i)) => Ok(Expr::Int(i)),
      Some(Token::Float(f)) => Ok(Expr::Float(f)),
      Some(Token::Str(s)) => {
        // adjacent string literals concatenate
        let mut s = s;
        while let Some(Token::Str(next)) = self.peek() {
          s.push_str(next);
          self.pos += 1;
        }
        Ok(Expr::Str(s))
      }
      Some(Token::True) => Ok(Expr::Bool(true)),
      Some(Token::False) => Ok(Expr::Bool(false)),
      Some(Token::None) => Ok(Expr::None),
      Some(Token::Ident(name)) => Ok(Expr::Var(name)),
      Some(Token::LParen) => {
        let inner = self.parse_ternary()?;
        self.expect(Token::RParen)?;
        Ok(inner)
      }
      Some(Token::LBracket) => Ok(Expr::List(self.parse_args(Token::RBracket)?)),
      Some(tok) => Err(ExprError::Parse {
        pos,
        message: format!("unexpected {tok:?}"),
      }),
      None => Err(ExprError::Parse {
        pos,
        message: "unexpected end of expression".to_string(),
      }),
    }
  }
}
