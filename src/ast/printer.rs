
//! Renders trees back to C#-style source text.
//!
//! Parentheses are inserted only where the precedence of the
//! surrounding context requires them, so printing a parsed tree that
//! has had its [`Expr::Paren`] nodes dropped still reads correctly.

use super::{BinaryOp, Call, CallTarget, Expr, Literal, MethodDefinition, Stmt, UnaryOp};
use crate::ast::NumericType;
use crate::value::Number;

use itertools::Itertools;

use std::fmt::{self, Display, Formatter, Write};

const PREC_LAMBDA: u8 = 0;
const PREC_CONDITIONAL: u8 = 1;
const PREC_UNARY: u8 = 14;
pub const PREC_PRIMARY: u8 = 15;

const INDENT: &str = "    ";

impl BinaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
      BinaryOp::Rem => "%",
      BinaryOp::Shl => "<<",
      BinaryOp::Shr => ">>",
      BinaryOp::Lt => "<",
      BinaryOp::Le => "<=",
      BinaryOp::Gt => ">",
      BinaryOp::Ge => ">=",
      BinaryOp::Eq => "==",
      BinaryOp::Ne => "!=",
      BinaryOp::BitAnd => "&",
      BinaryOp::BitXor => "^",
      BinaryOp::BitOr => "|",
      BinaryOp::And => "&&",
      BinaryOp::Or => "||",
      BinaryOp::Coalesce => "??",
    }
  }

  pub fn precedence(self) -> u8 {
    match self {
      BinaryOp::Coalesce => 2,
      BinaryOp::Or => 3,
      BinaryOp::And => 4,
      BinaryOp::BitOr => 5,
      BinaryOp::BitXor => 6,
      BinaryOp::BitAnd => 7,
      BinaryOp::Eq | BinaryOp::Ne => 8,
      BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 9,
      BinaryOp::Shl | BinaryOp::Shr => 10,
      BinaryOp::Add | BinaryOp::Sub => 11,
      BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 12,
    }
  }

  pub fn is_right_associative(self) -> bool {
    self == BinaryOp::Coalesce
  }
}

impl UnaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      UnaryOp::Neg => "-",
      UnaryOp::Plus => "+",
      UnaryOp::Not => "!",
      UnaryOp::BitNot => "~",
    }
  }
}

/// The binding strength of `expr` when printed.
pub fn precedence(expr: &Expr) -> u8 {
  match expr {
    Expr::Lambda(_) | Expr::Throw { .. } => PREC_LAMBDA,
    Expr::Conditional(..) => PREC_CONDITIONAL,
    Expr::Binary(op, _, _) => op.precedence(),
    Expr::Range(..) => 13,
    Expr::Unary(..) | Expr::Cast(..) | Expr::FromEnd(_) => PREC_UNARY,
    Expr::Literal(Literal::Number(n)) if needs_cast_spelling(n) || n.is_sign_negative() => PREC_UNARY,
    _ => PREC_PRIMARY,
  }
}

fn needs_cast_spelling(n: &Number) -> bool {
  matches!(n.ty(), NumericType::SByte | NumericType::Byte | NumericType::Int16 | NumericType::UInt16)
}

fn write_prec(f: &mut Formatter<'_>, expr: &Expr, min: u8) -> fmt::Result {
  if precedence(expr) < min {
    write!(f, "(")?;
    write_expr(f, expr)?;
    write!(f, ")")
  } else {
    write_expr(f, expr)
  }
}

fn write_list(f: &mut Formatter<'_>, exprs: &[Expr]) -> fmt::Result {
  for (i, expr) in exprs.iter().enumerate() {
    if i > 0 {
      write!(f, ", ")?;
    }
    write_prec(f, expr, PREC_LAMBDA)?;
  }
  Ok(())
}

fn write_number(f: &mut Formatter<'_>, n: &Number) -> fmt::Result {
  let float_type = match n {
    Number::Single(x) if !x.is_finite() => Some(("float", *x as f64)),
    Number::Double(x) if !x.is_finite() => Some(("double", *x)),
    _ => None,
  };
  if let Some((ty, x)) = float_type {
    let member = if x.is_nan() {
      "NaN"
    } else if x > 0.0 {
      "PositiveInfinity"
    } else {
      "NegativeInfinity"
    };
    return write!(f, "{ty}.{member}");
  }
  if needs_cast_spelling(n) {
    write!(f, "({}){}", n.ty(), n)
  } else {
    write!(f, "{n}")
  }
}

fn write_literal(f: &mut Formatter<'_>, lit: &Literal) -> fmt::Result {
  match lit {
    Literal::Number(n) => write_number(f, n),
    Literal::Bool(b) => write!(f, "{b}"),
    Literal::Char(c) => write!(f, "'{}'", escape(&c.to_string(), '\'')),
    Literal::String(s) => write!(f, "\"{}\"", escape(s, '"')),
    Literal::Null => write!(f, "null"),
  }
}

fn escape(s: &str, quote: char) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    match c {
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\t' => out.push_str("\\t"),
      '\0' => out.push_str("\\0"),
      c if c == quote => {
        out.push('\\');
        out.push(c);
      }
      c => out.push(c),
    }
  }
  out
}

/// A unary minus directly before another minus would print as `--`.
fn collides_with_sign(op: UnaryOp, operand: &Expr) -> bool {
  let first = match operand {
    Expr::Unary(inner, _) => Some(inner.symbol()),
    Expr::Literal(Literal::Number(n)) if n.is_sign_negative() && !needs_cast_spelling(n) => Some("-"),
    _ => None,
  };
  matches!((op, first), (UnaryOp::Neg, Some("-")) | (UnaryOp::Plus, Some("+")))
}

fn write_expr(f: &mut Formatter<'_>, expr: &Expr) -> fmt::Result {
  match expr {
    Expr::Literal(lit) => write_literal(f, lit),
    Expr::Ident(name) => write!(f, "{name}"),
    Expr::Paren(inner) => {
      write!(f, "(")?;
      write_prec(f, inner, PREC_LAMBDA)?;
      write!(f, ")")
    }
    Expr::Unary(op, operand) => {
      write!(f, "{}", op.symbol())?;
      if collides_with_sign(*op, operand) {
        write!(f, "(")?;
        write_expr(f, operand)?;
        write!(f, ")")
      } else {
        write_prec(f, operand, PREC_UNARY)
      }
    }
    Expr::Binary(op, lhs, rhs) => {
      let prec = op.precedence();
      let (lmin, rmin) = if op.is_right_associative() { (prec + 1, prec) } else { (prec, prec + 1) };
      write_prec(f, lhs, lmin)?;
      write!(f, " {} ", op.symbol())?;
      write_prec(f, rhs, rmin)
    }
    Expr::Conditional(cond, then, otherwise) => {
      write_prec(f, cond, PREC_CONDITIONAL + 1)?;
      write!(f, " ? ")?;
      write_prec(f, then, PREC_CONDITIONAL)?;
      write!(f, " : ")?;
      write_prec(f, otherwise, PREC_LAMBDA)
    }
    Expr::Call(call) => {
      match &call.target {
        CallTarget::Free => {}
        CallTarget::Static(ty) => write!(f, "{ty}.")?,
        CallTarget::Instance(receiver) => {
          write_prec(f, receiver, PREC_PRIMARY)?;
          write!(f, ".")?;
        }
      }
      write!(f, "{}", call.name)?;
      if !call.type_args.is_empty() {
        write!(f, "<{}>", call.type_args.iter().join(", "))?;
      }
      write!(f, "(")?;
      write_list(f, &call.args)?;
      write!(f, ")")
    }
    Expr::Member(receiver, name) => {
      write_prec(f, receiver, PREC_PRIMARY)?;
      write!(f, ".{name}")
    }
    Expr::StaticMember(ty, name) => write!(f, "{ty}.{name}"),
    Expr::Index(receiver, index) => {
      write_prec(f, receiver, PREC_PRIMARY)?;
      write!(f, "[")?;
      write_prec(f, index, PREC_LAMBDA)?;
      write!(f, "]")
    }
    Expr::Lambda(lambda) => {
      match lambda.params.as_slice() {
        [param] => write!(f, "{param}")?,
        params => write!(f, "({})", params.iter().join(", "))?,
      }
      write!(f, " => ")?;
      write_prec(f, &lambda.body, PREC_LAMBDA)
    }
    Expr::Cast(ty, operand) => {
      write!(f, "({ty})")?;
      write_prec(f, operand, PREC_UNARY)
    }
    Expr::ArrayLit(Some(ty), items) if items.is_empty() => write!(f, "new {ty}[] {{ }}"),
    Expr::ArrayLit(Some(ty), items) => {
      write!(f, "new {ty}[] {{ ")?;
      write_list(f, items)?;
      write!(f, " }}")
    }
    Expr::ArrayLit(None, items) if items.is_empty() => write!(f, "new[] {{ }}"),
    Expr::ArrayLit(None, items) => {
      write!(f, "new[] {{ ")?;
      write_list(f, items)?;
      write!(f, " }}")
    }
    Expr::New(ty, args, init) => {
      write!(f, "new {ty}")?;
      if !args.is_empty() || init.is_none() {
        write!(f, "(")?;
        write_list(f, args)?;
        write!(f, ")")?;
      }
      if let Some(init) = init {
        if init.is_empty() {
          write!(f, " {{ }}")?;
        } else {
          write!(f, " {{ ")?;
          write_list(f, init)?;
          write!(f, " }}")?;
        }
      }
      Ok(())
    }
    Expr::Tuple(items) => {
      write!(f, "(")?;
      write_list(f, items)?;
      write!(f, ")")
    }
    Expr::Range(start, end) => {
      if let Some(start) = start {
        write_prec(f, start, PREC_UNARY)?;
      }
      write!(f, "..")?;
      if let Some(end) = end {
        write_prec(f, end, PREC_UNARY)?;
      }
      Ok(())
    }
    Expr::FromEnd(inner) => {
      write!(f, "^")?;
      write_prec(f, inner, PREC_UNARY)
    }
    Expr::Throw { exception_type, message } => {
      write!(f, "throw new {exception_type}(\"{}\")", escape(message, '"'))
    }
  }
}

impl Display for Expr {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write_expr(f, self)
  }
}

impl Display for Call {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write_expr(f, &Expr::Call(self.clone()))
  }
}

fn write_block(out: &mut String, stmts: &[Stmt], depth: usize) -> fmt::Result {
  writeln!(out, "{}{{", INDENT.repeat(depth))?;
  for stmt in stmts {
    write_stmt(out, stmt, depth + 1)?;
  }
  writeln!(out, "{}}}", INDENT.repeat(depth))
}

fn write_stmt(out: &mut String, stmt: &Stmt, depth: usize) -> fmt::Result {
  let pad = INDENT.repeat(depth);
  match stmt {
    Stmt::Let { ty: Some(ty), name, init } => writeln!(out, "{pad}{ty} {name} = {init};"),
    Stmt::Let { ty: None, name, init } => writeln!(out, "{pad}var {name} = {init};"),
    Stmt::Assign { name, op: None, value } => writeln!(out, "{pad}{name} = {value};"),
    Stmt::Assign { name, op: Some(op), value } => writeln!(out, "{pad}{name} {}= {value};", op.symbol()),
    Stmt::If { cond, then, otherwise } => {
      writeln!(out, "{pad}if ({cond})")?;
      write_block(out, then, depth)?;
      let mut otherwise = otherwise;
      loop {
        match otherwise.as_slice() {
          [] => return Ok(()),
          [Stmt::If { cond, then, otherwise: rest }] => {
            writeln!(out, "{pad}else if ({cond})")?;
            write_block(out, then, depth)?;
            otherwise = rest;
          }
          stmts => {
            writeln!(out, "{pad}else")?;
            return write_block(out, stmts, depth);
          }
        }
      }
    }
    Stmt::Block(stmts) => write_block(out, stmts, depth),
    Stmt::Return(expr) => writeln!(out, "{pad}return {expr};"),
    Stmt::Expr(expr) => writeln!(out, "{pad}{expr};"),
  }
}

impl Display for Stmt {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    let mut out = String::new();
    write_stmt(&mut out, self, 0)?;
    write!(f, "{}", out.trim_end())
  }
}

impl Display for MethodDefinition {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    let params = self.params.iter().map(|p| format!("{} {}", p.ty, p.name)).join(", ");
    writeln!(f, "private static {} {}({})", self.return_type, self.name, params)?;
    let mut out = String::new();
    write_block(&mut out, &self.body, 0)?;
    write!(f, "{}", out.trim_end())
  }
}
