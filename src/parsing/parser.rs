
//! Recursive-descent parser for expressions, statements, and method
//! declarations.

use super::error::ParseError;
use super::source::{SourceOffset, Span};
use super::tokenizer::{Token, TokenKind};
use crate::ast::{
  BinaryOp, Call, Declaration, Expr, Lambda, Literal, MethodDefinition, NumericType,
  Parameter, Stmt, TypeRef, UnaryOp,
};
use crate::value::Number;
use crate::value::ops::negate;

use phf::{phf_set, Set};

use std::rc::Rc;

/// Type names that, followed by `.`, start a static member access.
static STATIC_TYPES: Set<&'static str> = phf_set! {
  "Math", "MathF", "Enumerable", "BitConverter", "MidpointRounding", "Convert",
  "String", "Char", "Boolean", "Object",
};

/// Namespace segments skipped before a type name.
static NAMESPACES: Set<&'static str> = phf_set! {
  "System", "Linq", "Collections", "Generic", "Numerics",
};

static MODIFIERS: Set<&'static str> = phf_set! {
  "private", "public", "internal", "protected", "static", "const", "readonly",
};

const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone)]
pub struct Parser {
  tokens: Vec<Token>,
  pos: usize,
  end: SourceOffset,
  depth: usize,
}

impl Parser {
  pub fn new(tokens: Vec<Token>, input_len: usize) -> Self {
    Self { tokens, pos: 0, end: SourceOffset(input_len), depth: 0 }
  }

  pub fn is_eof(&self) -> bool {
    self.pos >= self.tokens.len()
  }

  fn peek(&self) -> Option<&TokenKind> {
    self.peek_at(0)
  }

  fn peek_at(&self, n: usize) -> Option<&TokenKind> {
    self.tokens.get(self.pos + n).map(|t| &t.kind)
  }

  fn span(&self) -> Span {
    self.tokens.get(self.pos).map_or(Span::at(self.end), |t| t.span)
  }

  fn advance(&mut self) -> Option<Token> {
    let token = self.tokens.get(self.pos).cloned();
    if token.is_some() {
      self.pos += 1;
    }
    token
  }

  fn error<T>(&self, message: impl Into<String>) -> Result<T, ParseError> {
    let message = message.into();
    let message = match self.peek() {
      None => format!("{message}, found end of input"),
      Some(_) => message,
    };
    Err(ParseError::new(message, self.span()))
  }

  fn is_punct(&self, punct: &str) -> bool {
    self.is_punct_at(0, punct)
  }

  fn is_punct_at(&self, n: usize, punct: &str) -> bool {
    matches!(self.peek_at(n), Some(TokenKind::Punct(p)) if *p == punct)
  }

  fn is_keyword(&self, keyword: &str) -> bool {
    matches!(self.peek(), Some(TokenKind::Ident(name)) if name == keyword)
  }

  fn eat_punct(&mut self, punct: &str) -> bool {
    let found = self.is_punct(punct);
    if found {
      self.pos += 1;
    }
    found
  }

  fn eat_keyword(&mut self, keyword: &str) -> bool {
    let found = self.is_keyword(keyword);
    if found {
      self.pos += 1;
    }
    found
  }

  fn expect_punct(&mut self, punct: &str) -> Result<(), ParseError> {
    if self.eat_punct(punct) {
      Ok(())
    } else {
      self.error(format!("Expected '{punct}'"))
    }
  }

  fn expect_ident(&mut self) -> Result<String, ParseError> {
    match self.peek() {
      Some(TokenKind::Ident(name)) => {
        let name = name.clone();
        self.pos += 1;
        Ok(name)
      }
      _ => self.error("Expected identifier"),
    }
  }

  /// Runs `f`, restoring the position if it fails.
  fn attempt<T, F>(&mut self, f: F) -> Option<T>
  where F: FnOnce(&mut Self) -> Result<T, ParseError> {
    let saved = self.pos;
    match f(self) {
      Ok(value) => Some(value),
      Err(_) => {
        self.pos = saved;
        None
      }
    }
  }

  /// Two `>` tokens with nothing between them form a right shift.
  fn is_shift_right(&self) -> bool {
    match (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)) {
      (Some(a), Some(b)) => a.kind == TokenKind::Punct(">") && b.kind == TokenKind::Punct(">") && a.span.end == b.span.start,
      _ => false,
    }
  }

  fn skip_namespaces(&mut self) {
    while let Some(TokenKind::Ident(name)) = self.peek() {
      let is_namespace = NAMESPACES.contains(name.as_str()) &&
        self.is_punct_at(1, ".") &&
        matches!(self.peek_at(2), Some(TokenKind::Ident(_)));
      if !is_namespace {
        break;
      }
      self.pos += 2;
    }
  }

  // ---- Types ----

  pub fn parse_type(&mut self) -> Result<TypeRef, ParseError> {
    self.skip_namespaces();
    let name = self.expect_ident()?;
    let mut ty = match TypeRef::from_name(&name) {
      TypeRef::Named { name, .. } if self.is_punct("<") => {
        let args = self.parse_type_args()?;
        TypeRef::generic(name, args)
      }
      ty => ty,
    };
    while self.is_punct("[") && self.is_punct_at(1, "]") {
      self.pos += 2;
      ty = TypeRef::array(ty);
    }
    Ok(ty)
  }

  fn parse_type_args(&mut self) -> Result<Vec<TypeRef>, ParseError> {
    self.expect_punct("<")?;
    let mut args = vec![self.parse_type()?];
    while self.eat_punct(",") {
      args.push(self.parse_type()?);
    }
    self.expect_punct(">")?;
    Ok(args)
  }

  /// Explicit type arguments on a method call: `<T, ...>` directly
  /// followed by `(`. Leaves the position unchanged otherwise, since
  /// the `<` may be a comparison.
  fn try_call_type_args(&mut self) -> Option<Vec<TypeRef>> {
    if !self.is_punct("<") {
      return None;
    }
    self.attempt(|p| {
      let args = p.parse_type_args()?;
      if p.is_punct("(") { Ok(args) } else { p.error("Expected '('") }
    })
  }

  // ---- Expressions ----

  pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
    if self.depth >= MAX_DEPTH {
      return self.error("Expression is nested too deeply");
    }
    self.depth += 1;
    let result = self.parse_conditional();
    self.depth -= 1;
    result
  }

  fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
    let cond = self.parse_binary(2)?;
    if !self.eat_punct("?") {
      return Ok(cond);
    }
    let then = self.parse_expr()?;
    self.expect_punct(":")?;
    let otherwise = self.parse_expr()?;
    Ok(Expr::Conditional(Rc::new(cond), Rc::new(then), Rc::new(otherwise)))
  }

  fn peek_binary_op(&self) -> Option<(BinaryOp, usize)> {
    if self.is_shift_right() {
      return Some((BinaryOp::Shr, 2));
    }
    let op = match self.peek()? {
      TokenKind::Punct(p) => match *p {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" => BinaryOp::Rem,
        "<<" => BinaryOp::Shl,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "&" => BinaryOp::BitAnd,
        "^" => BinaryOp::BitXor,
        "|" => BinaryOp::BitOr,
        "&&" => BinaryOp::And,
        "||" => BinaryOp::Or,
        "??" => BinaryOp::Coalesce,
        _ => return None,
      },
      _ => return None,
    };
    Some((op, 1))
  }

  /// Precedence climbing over the binary operators whose precedence is
  /// at least `min`.
  fn parse_binary(&mut self, min: u8) -> Result<Expr, ParseError> {
    let mut lhs = self.parse_range()?;
    while let Some((op, width)) = self.peek_binary_op() {
      let prec = op.precedence();
      if prec < min {
        break;
      }
      self.pos += width;
      let next_min = if op.is_right_associative() { prec } else { prec + 1 };
      let rhs = if op == BinaryOp::Coalesce && self.is_keyword("throw") {
        self.parse_throw()?
      } else {
        self.parse_binary(next_min)?
      };
      lhs = Expr::binary(op, lhs, rhs);
    }
    Ok(lhs)
  }

  fn can_start_operand(&self) -> bool {
    match self.peek() {
      None => false,
      Some(TokenKind::Punct(p)) => matches!(*p, "(" | "[" | "-" | "+" | "!" | "~" | "^"),
      Some(_) => true,
    }
  }

  fn parse_range(&mut self) -> Result<Expr, ParseError> {
    if self.eat_punct("..") {
      let end = if self.can_start_operand() { Some(Rc::new(self.parse_unary()?)) } else { None };
      return Ok(Expr::Range(None, end));
    }
    let start = self.parse_unary()?;
    if !self.eat_punct("..") {
      return Ok(start);
    }
    let end = if self.can_start_operand() { Some(Rc::new(self.parse_unary()?)) } else { None };
    Ok(Expr::Range(Some(Rc::new(start)), end))
  }

  fn parse_unary(&mut self) -> Result<Expr, ParseError> {
    let op = match self.peek() {
      Some(TokenKind::Punct("-")) => UnaryOp::Neg,
      Some(TokenKind::Punct("+")) => UnaryOp::Plus,
      Some(TokenKind::Punct("!")) => UnaryOp::Not,
      Some(TokenKind::Punct("~")) => UnaryOp::BitNot,
      Some(TokenKind::Punct("^")) => {
        self.pos += 1;
        let operand = self.parse_unary()?;
        return Ok(Expr::FromEnd(Rc::new(operand)));
      }
      Some(TokenKind::Punct("(")) => {
        if let Some(cast) = self.attempt(Self::parse_cast) {
          return Ok(cast);
        }
        return self.parse_postfix();
      }
      _ => return self.parse_postfix(),
    };
    self.pos += 1;
    let literal_operand = matches!(self.peek(), Some(TokenKind::Number(_)));
    let operand = self.parse_unary()?;
    if op == UnaryOp::Neg && literal_operand {
      if let Expr::Literal(Literal::Number(n)) = &operand {
        if let Some(negated) = negate_literal(n) {
          return Ok(Expr::number(negated));
        }
      }
    }
    Ok(Expr::unary(op, operand))
  }

  /// `(T)operand`. Keyword types always form a cast; other type names
  /// only when what follows cannot continue a parenthesized
  /// expression.
  fn parse_cast(&mut self) -> Result<Expr, ParseError> {
    self.expect_punct("(")?;
    let ty = self.parse_type()?;
    self.expect_punct(")")?;
    let is_keyword_type = !matches!(ty, TypeRef::Named { .. });
    let follows = match self.peek() {
      Some(TokenKind::Ident(_) | TokenKind::Number(_) | TokenKind::Str(_) | TokenKind::Char(_)) => true,
      Some(TokenKind::Punct(p)) => matches!(*p, "(" | "!" | "~") || (is_keyword_type && matches!(*p, "-" | "+")),
      None => false,
    };
    if !follows {
      return self.error("Not a cast");
    }
    let operand = self.parse_unary()?;
    // Small integer literals print as casts; read them back as literals.
    if let (TypeRef::Numeric(target), Expr::Literal(Literal::Number(n))) = (&ty, &operand) {
      let small = matches!(target, NumericType::SByte | NumericType::Byte | NumericType::Int16 | NumericType::UInt16);
      if small && n.ty().is_integer() {
        if let Ok(converted) = n.convert(*target) {
          return Ok(Expr::number(converted));
        }
      }
    }
    Ok(Expr::cast(ty, operand))
  }

  fn parse_args(&mut self, close: &str) -> Result<Vec<Expr>, ParseError> {
    let mut args = Vec::new();
    if self.eat_punct(close) {
      return Ok(args);
    }
    loop {
      args.push(self.parse_expr()?);
      if self.eat_punct(close) {
        return Ok(args);
      }
      self.expect_punct(",")?;
      // Trailing comma in an initializer.
      if self.eat_punct(close) {
        return Ok(args);
      }
    }
  }

  fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
    let mut expr = self.parse_primary()?;
    loop {
      if self.eat_punct(".") {
        let name = self.expect_ident()?;
        let type_args = self.try_call_type_args().unwrap_or_default();
        if self.eat_punct("(") {
          let args = self.parse_args(")")?;
          expr = Expr::Call(Call::on(expr, name, args).with_type_args(type_args));
        } else {
          expr = Expr::member(expr, name);
        }
      } else if self.eat_punct("[") {
        let index = self.parse_expr()?;
        self.expect_punct("]")?;
        expr = Expr::index(expr, index);
      } else {
        return Ok(expr);
      }
    }
  }

  fn parse_primary(&mut self) -> Result<Expr, ParseError> {
    let Some(token) = self.tokens.get(self.pos).cloned() else {
      return self.error("Expected expression");
    };
    match token.kind {
      TokenKind::Number(n) => {
        self.pos += 1;
        Ok(Expr::number(n))
      }
      TokenKind::Str(s) => {
        self.pos += 1;
        Ok(Expr::Literal(Literal::String(s)))
      }
      TokenKind::Char(c) => {
        self.pos += 1;
        Ok(Expr::Literal(Literal::Char(c)))
      }
      TokenKind::Punct("(") => self.parse_parenthesized(),
      TokenKind::Punct("[") => {
        self.pos += 1;
        let items = self.parse_args("]")?;
        Ok(Expr::ArrayLit(None, items))
      }
      TokenKind::Ident(name) => self.parse_identifier(name),
      TokenKind::Punct(_) => self.error("Expected expression"),
    }
  }

  fn parse_identifier(&mut self, name: String) -> Result<Expr, ParseError> {
    match name.as_str() {
      "true" => {
        self.pos += 1;
        return Ok(Expr::bool(true));
      }
      "false" => {
        self.pos += 1;
        return Ok(Expr::bool(false));
      }
      "null" => {
        self.pos += 1;
        return Ok(Expr::Literal(Literal::Null));
      }
      "new" => return self.parse_new(),
      "throw" => return self.parse_throw(),
      _ => {}
    }
    if self.is_punct_at(1, "=>") {
      self.pos += 2;
      let body = self.parse_expr()?;
      return Ok(Expr::Lambda(Lambda::new(vec![name], body)));
    }
    self.skip_namespaces();
    let name = self.expect_ident()?;
    let ty = TypeRef::from_name(&name);
    let is_static_type = !matches!(ty, TypeRef::Named { .. }) || STATIC_TYPES.contains(name.as_str());
    if is_static_type && self.is_punct(".") {
      self.pos += 1;
      let member = self.expect_ident()?;
      let type_args = self.try_call_type_args().unwrap_or_default();
      if self.eat_punct("(") {
        let args = self.parse_args(")")?;
        return Ok(Expr::Call(Call::on_type(ty, member, args).with_type_args(type_args)));
      }
      return Ok(special_float(&ty, &member).unwrap_or(Expr::StaticMember(ty, member)));
    }
    let type_args = self.try_call_type_args().unwrap_or_default();
    if self.eat_punct("(") {
      let args = self.parse_args(")")?;
      return Ok(Expr::Call(Call::free(name, args).with_type_args(type_args)));
    }
    Ok(Expr::Ident(name))
  }

  /// A parenthesized expression, a tuple, or a lambda with a
  /// parenthesized parameter list.
  fn parse_parenthesized(&mut self) -> Result<Expr, ParseError> {
    if let Some(params) = self.attempt(Self::parse_lambda_params) {
      let body = self.parse_expr()?;
      return Ok(Expr::Lambda(Lambda::new(params, body)));
    }
    self.expect_punct("(")?;
    let first = self.parse_expr()?;
    if self.eat_punct(")") {
      return Ok(Expr::Paren(Rc::new(first)));
    }
    let mut items = vec![first];
    while self.eat_punct(",") {
      items.push(self.parse_expr()?);
    }
    self.expect_punct(")")?;
    Ok(Expr::Tuple(items))
  }

  /// `(a, b) =>` or `(T a, U b) =>`, consuming the arrow.
  fn parse_lambda_params(&mut self) -> Result<Vec<String>, ParseError> {
    self.expect_punct("(")?;
    let mut params = Vec::new();
    if !self.eat_punct(")") {
      loop {
        let name = match (self.peek_at(1), self.peek_at(0)) {
          (Some(TokenKind::Punct("," | ")")), _) => self.expect_ident()?,
          _ => {
            self.parse_type()?;
            self.expect_ident()?
          }
        };
        params.push(name);
        if self.eat_punct(")") {
          break;
        }
        self.expect_punct(",")?;
      }
    }
    self.expect_punct("=>")?;
    Ok(params)
  }

  fn parse_new(&mut self) -> Result<Expr, ParseError> {
    self.pos += 1;
    if self.eat_punct("[") {
      self.expect_punct("]")?;
      self.expect_punct("{")?;
      let items = self.parse_args("}")?;
      return Ok(Expr::ArrayLit(None, items));
    }
    let ty = self.parse_type()?;
    if let TypeRef::Array(element) = ty {
      self.expect_punct("{")?;
      let items = self.parse_args("}")?;
      return Ok(Expr::ArrayLit(Some(*element), items));
    }
    let args = if self.eat_punct("(") { self.parse_args(")")? } else { Vec::new() };
    let init = if self.eat_punct("{") { Some(self.parse_args("}")?) } else { None };
    Ok(Expr::New(ty, args, init))
  }

  /// `throw new Type("message")`.
  fn parse_throw(&mut self) -> Result<Expr, ParseError> {
    self.pos += 1;
    if !self.eat_keyword("new") {
      return self.error("Expected 'new'");
    }
    let mut exception_type = self.expect_ident()?;
    while self.eat_punct(".") {
      exception_type.push('.');
      exception_type.push_str(&self.expect_ident()?);
    }
    self.expect_punct("(")?;
    let message = match self.peek() {
      Some(TokenKind::Str(s)) => {
        let s = s.clone();
        self.pos += 1;
        s
      }
      _ => String::new(),
    };
    self.expect_punct(")")?;
    Ok(Expr::Throw { exception_type, message })
  }

  // ---- Statements ----

  pub fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
    self.expect_punct("{")?;
    let mut stmts = Vec::new();
    while !self.eat_punct("}") {
      if self.is_eof() {
        return self.error("Expected '}'");
      }
      stmts.push(self.parse_stmt()?);
    }
    Ok(stmts)
  }

  /// A statement in `if` position, which may be a block or a single
  /// statement.
  fn parse_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
    if self.is_punct("{") {
      self.parse_block()
    } else {
      Ok(vec![self.parse_stmt()?])
    }
  }

  pub fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
    if self.is_punct("{") {
      return self.parse_block().map(Stmt::Block);
    }
    if self.eat_keyword("if") {
      self.expect_punct("(")?;
      let cond = self.parse_expr()?;
      self.expect_punct(")")?;
      let then = self.parse_body()?;
      let otherwise = if self.eat_keyword("else") { self.parse_body()? } else { Vec::new() };
      return Ok(Stmt::If { cond, then, otherwise });
    }
    if self.eat_keyword("return") {
      let expr = self.parse_expr()?;
      self.expect_punct(";")?;
      return Ok(Stmt::Return(expr));
    }
    if let Some(stmt) = self.attempt(Self::parse_declaration) {
      return Ok(stmt);
    }
    if let Some(stmt) = self.attempt(Self::parse_assignment) {
      return Ok(stmt);
    }
    let expr = self.parse_expr()?;
    self.expect_punct(";")?;
    Ok(Stmt::Expr(expr))
  }

  fn parse_declaration(&mut self) -> Result<Stmt, ParseError> {
    while matches!(self.peek(), Some(TokenKind::Ident(m)) if MODIFIERS.contains(m.as_str())) {
      self.pos += 1;
    }
    let ty = if self.is_keyword("var") {
      self.pos += 1;
      None
    } else {
      Some(self.parse_type()?)
    };
    let name = self.expect_ident()?;
    self.expect_punct("=")?;
    let init = self.parse_expr()?;
    self.expect_punct(";")?;
    Ok(Stmt::Let { ty, name, init })
  }

  fn parse_assignment(&mut self) -> Result<Stmt, ParseError> {
    let name = self.expect_ident()?;
    let op = match self.advance().map(|t| t.kind) {
      Some(TokenKind::Punct("=")) => None,
      Some(TokenKind::Punct("+=")) => Some(BinaryOp::Add),
      Some(TokenKind::Punct("-=")) => Some(BinaryOp::Sub),
      Some(TokenKind::Punct("*=")) => Some(BinaryOp::Mul),
      Some(TokenKind::Punct("/=")) => Some(BinaryOp::Div),
      Some(TokenKind::Punct("%=")) => Some(BinaryOp::Rem),
      _ => return self.error("Expected assignment"),
    };
    let value = self.parse_expr()?;
    self.expect_punct(";")?;
    Ok(Stmt::Assign { name, op, value })
  }

  // ---- Methods ----

  fn parse_attributes(&mut self) -> Result<Vec<String>, ParseError> {
    let mut attributes = Vec::new();
    while self.eat_punct("[") {
      loop {
        attributes.push(self.expect_ident()?);
        if self.eat_punct("(") {
          self.parse_args(")")?;
        }
        if !self.eat_punct(",") {
          break;
        }
      }
      self.expect_punct("]")?;
    }
    Ok(attributes)
  }

  /// A static method with a block body or an expression body.
  pub fn parse_method(&mut self) -> Result<MethodDefinition, ParseError> {
    while matches!(self.peek(), Some(TokenKind::Ident(m)) if MODIFIERS.contains(m.as_str())) {
      self.pos += 1;
    }
    let return_type = self.parse_type()?;
    let name = self.expect_ident()?;
    self.expect_punct("(")?;
    let mut params = Vec::new();
    if !self.eat_punct(")") {
      loop {
        let ty = self.parse_type()?;
        params.push(Parameter::new(self.expect_ident()?, ty));
        if self.eat_punct(")") {
          break;
        }
        self.expect_punct(",")?;
      }
    }
    let body = if self.eat_punct("=>") {
      let expr = self.parse_expr()?;
      self.expect_punct(";")?;
      vec![Stmt::Return(expr)]
    } else {
      self.parse_block()?
    };
    Ok(MethodDefinition { name, return_type, params, body })
  }

  pub fn parse_declaration_item(&mut self) -> Result<Declaration, ParseError> {
    let attributes = self.parse_attributes()?;
    let method = self.parse_method()?;
    Ok(Declaration { attributes, method })
  }

  pub fn expect_eof(&self) -> Result<(), ParseError> {
    if self.is_eof() {
      Ok(())
    } else {
      self.error("Unexpected trailing input")
    }
  }
}

/// Negates a literal written after a unary minus. The magnitudes of
/// `int.MinValue` and `long.MinValue` only fit the unsigned literal
/// types, so those two are read back into the signed type.
fn negate_literal(n: &Number) -> Option<Number> {
  match n {
    Number::UInt32(0x8000_0000) => Some(Number::Int32(i32::MIN)),
    Number::UInt64(0x8000_0000_0000_0000) => Some(Number::Int64(i64::MIN)),
    n => negate(n).ok().flatten(),
  }
}

/// `double.NaN` and friends, which the printer uses to spell
/// non-finite literals.
fn special_float(ty: &TypeRef, member: &str) -> Option<Expr> {
  let value = match member {
    "NaN" => f64::NAN,
    "PositiveInfinity" => f64::INFINITY,
    "NegativeInfinity" => f64::NEG_INFINITY,
    _ => return None,
  };
  match ty.as_numeric()? {
    NumericType::Double => Some(Expr::number(Number::Double(value))),
    NumericType::Single => Some(Expr::number(Number::Single(value as f32))),
    _ => None,
  }
}

