
//! Parsing of C#-style source text into [`ast`](crate::ast) trees.

pub mod error;
pub mod parser;
pub mod source;
pub mod tokenizer;

pub use error::ParseError;
pub use source::{SourceOffset, Span};

use parser::Parser;
use crate::ast::{Declaration, Expr, MethodDefinition, Stmt};

fn parser_for(input: &str) -> Result<Parser, ParseError> {
  let tokens = tokenizer::tokenize(input)?;
  Ok(Parser::new(tokens, input.len()))
}

/// Parses a single expression, which must span the whole input.
pub fn parse_expr(input: &str) -> Result<Expr, ParseError> {
  let mut parser = parser_for(input)?;
  let expr = parser.parse_expr()?;
  parser.expect_eof()?;
  Ok(expr)
}

/// Parses a sequence of statements.
pub fn parse_stmts(input: &str) -> Result<Vec<Stmt>, ParseError> {
  let mut parser = parser_for(input)?;
  let mut stmts = Vec::new();
  while !parser.is_eof() {
    stmts.push(parser.parse_stmt()?);
  }
  Ok(stmts)
}

/// Parses one static method definition.
pub fn parse_helper(input: &str) -> Result<MethodDefinition, ParseError> {
  let mut parser = parser_for(input)?;
  let method = parser.parse_method()?;
  parser.expect_eof()?;
  Ok(method)
}

/// Parses a compilation unit: any number of method declarations, each
/// optionally preceded by attributes.
pub fn parse_unit(input: &str) -> Result<Vec<Declaration>, ParseError> {
  let mut parser = parser_for(input)?;
  let mut declarations = Vec::new();
  while !parser.is_eof() {
    declarations.push(parser.parse_declaration_item()?);
  }
  Ok(declarations)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::{BinaryOp, Call, CallTarget, Literal, NumericType, Parameter, TypeRef, UnaryOp};
  use crate::value::Number;

  use std::rc::Rc;

  #[test]
  fn test_precedence() {
    let expr = parse_expr("a + b * c").unwrap();
    let expected = Expr::binary(
      BinaryOp::Add,
      Expr::ident("a"),
      Expr::binary(BinaryOp::Mul, Expr::ident("b"), Expr::ident("c")),
    );
    assert_eq!(expr, expected);
  }

  #[test]
  fn test_left_associativity() {
    let expr = parse_expr("a - b - c").unwrap();
    let expected = Expr::binary(
      BinaryOp::Sub,
      Expr::binary(BinaryOp::Sub, Expr::ident("a"), Expr::ident("b")),
      Expr::ident("c"),
    );
    assert_eq!(expr, expected);
  }

  #[test]
  fn test_shift_right_from_two_tokens() {
    let expr = parse_expr("a >> 2").unwrap();
    assert_eq!(expr, Expr::binary(BinaryOp::Shr, Expr::ident("a"), Expr::int(2)));
    assert!(parse_expr("a > > 2").is_err());
  }

  #[test]
  fn test_negative_literals() {
    assert_eq!(parse_expr("-1").unwrap(), Expr::int(-1));
    assert_eq!(parse_expr("-2147483648").unwrap(), Expr::int(i32::MIN));
    assert_eq!(parse_expr("-9223372036854775808").unwrap(), Expr::number(Number::Int64(i64::MIN)));
    assert_eq!(parse_expr("-0.0").unwrap(), Expr::number(Number::Double(-0.0)));
    assert_eq!(parse_expr("-x").unwrap(), Expr::unary(UnaryOp::Neg, Expr::ident("x")));
  }

  #[test]
  fn test_static_calls() {
    let expr = parse_expr("System.Math.Abs(x)").unwrap();
    assert_eq!(expr, Expr::Call(Call::on_type(TypeRef::named("Math"), "Abs", vec![Expr::ident("x")])));
    let expr = parse_expr("double.Floor(x)").unwrap();
    assert_eq!(expr, Expr::Call(Call::on_type(TypeRef::Numeric(NumericType::Double), "Floor", vec![Expr::ident("x")])));
    let expr = parse_expr("Enumerable.Empty<int>()").unwrap();
    let call = expr.as_call().unwrap();
    assert_eq!(call.type_args, vec![TypeRef::Numeric(NumericType::Int32)]);
    assert!(call.args.is_empty());
  }

  #[test]
  fn test_special_float_members() {
    assert_eq!(parse_expr("double.NaN").unwrap(), Expr::number(Number::Double(f64::NAN)));
    assert_eq!(parse_expr("float.NegativeInfinity").unwrap(), Expr::number(Number::Single(f32::NEG_INFINITY)));
    let max = parse_expr("int.MaxValue").unwrap();
    assert_eq!(max, Expr::StaticMember(TypeRef::Numeric(NumericType::Int32), "MaxValue".into()));
  }

  #[test]
  fn test_method_chain() {
    let expr = parse_expr("xs.Where(x => x > 2).Count()").unwrap();
    let count = expr.as_call().unwrap();
    assert_eq!(count.name, "Count");
    let CallTarget::Instance(receiver) = &count.target else { panic!("expected instance call") };
    let filter = receiver.as_call().unwrap();
    assert_eq!(filter.name, "Where");
    let lambda = filter.args[0].as_lambda().unwrap();
    assert_eq!(lambda.params, vec!["x".to_owned()]);
  }

  #[test]
  fn test_generic_call_versus_comparison() {
    let expr = parse_expr("xs.OfType<double>()").unwrap();
    assert_eq!(expr.as_call().unwrap().type_args, vec![TypeRef::Numeric(NumericType::Double)]);
    let expr = parse_expr("a < b && c > d").unwrap();
    assert!(matches!(expr, Expr::Binary(BinaryOp::And, _, _)));
  }

  #[test]
  fn test_casts_and_parens() {
    let expr = parse_expr("(double)x").unwrap();
    assert_eq!(expr, Expr::cast(TypeRef::Numeric(NumericType::Double), Expr::ident("x")));
    let expr = parse_expr("(a) - b").unwrap();
    assert_eq!(expr, Expr::binary(BinaryOp::Sub, Expr::Paren(Rc::new(Expr::ident("a"))), Expr::ident("b")));
    assert_eq!(parse_expr("(byte)3").unwrap(), Expr::number(Number::Byte(3)));
  }

  #[test]
  fn test_lambdas_and_tuples() {
    let expr = parse_expr("(a, v) => a + v").unwrap();
    assert_eq!(expr.as_lambda().unwrap().params, vec!["a".to_owned(), "v".to_owned()]);
    let expr = parse_expr("(int a) => a").unwrap();
    assert_eq!(expr.as_lambda().unwrap().params, vec!["a".to_owned()]);
    let expr = parse_expr("(1, 2)").unwrap();
    assert_eq!(expr, Expr::Tuple(vec![Expr::int(1), Expr::int(2)]));
  }

  #[test]
  fn test_collections() {
    let expr = parse_expr("new[] { 1, 2 }").unwrap();
    assert_eq!(expr, Expr::ArrayLit(None, vec![Expr::int(1), Expr::int(2)]));
    let expr = parse_expr("[1, 2]").unwrap();
    assert_eq!(expr, Expr::ArrayLit(None, vec![Expr::int(1), Expr::int(2)]));
    let expr = parse_expr("new List<int> { 3 }").unwrap();
    assert_eq!(expr, Expr::New(TypeRef::list(NumericType::Int32.into()), vec![], Some(vec![Expr::int(3)])));
  }

  #[test]
  fn test_ranges_and_indices() {
    let expr = parse_expr("xs[^1]").unwrap();
    assert_eq!(expr, Expr::index(Expr::ident("xs"), Expr::FromEnd(Rc::new(Expr::int(1)))));
    let expr = parse_expr("xs[1..]").unwrap();
    assert_eq!(expr, Expr::index(Expr::ident("xs"), Expr::Range(Some(Rc::new(Expr::int(1))), None)));
  }

  #[test]
  fn test_throw_expression() {
    let expr = parse_expr("x ?? throw new System.ArgumentException(\"bad\")").unwrap();
    let Expr::Binary(BinaryOp::Coalesce, _, rhs) = expr else { panic!("expected coalesce") };
    assert_eq!(*rhs, Expr::Throw { exception_type: "System.ArgumentException".into(), message: "bad".into() });
  }

  #[test]
  fn test_statements() {
    let stmts = parse_stmts("var y = x * 2; int z = 1; z += y; if (z > 3) return z; else { return 0; }").unwrap();
    assert_eq!(stmts.len(), 4);
    assert!(matches!(&stmts[0], Stmt::Let { ty: None, name, .. } if name == "y"));
    assert!(matches!(&stmts[1], Stmt::Let { ty: Some(TypeRef::Numeric(NumericType::Int32)), .. }));
    assert!(matches!(&stmts[2], Stmt::Assign { op: Some(BinaryOp::Add), .. }));
    let Stmt::If { then, otherwise, .. } = &stmts[3] else { panic!("expected if") };
    assert_eq!(then.len(), 1);
    assert_eq!(otherwise, &vec![Stmt::Return(Expr::int(0))]);
  }

  #[test]
  fn test_helper() {
    let helper = parse_helper("private static double Square(double x) => x * x;").unwrap();
    assert_eq!(helper.name, "Square");
    assert_eq!(helper.params, vec![Parameter::new("x", TypeRef::Numeric(NumericType::Double))]);
    assert_eq!(helper.body.len(), 1);
  }

  #[test]
  fn test_unit_with_attributes() {
    let unit = parse_unit("[FastApprox] static double F(double x) { return Math.Sin(x); } static int G() => 1;").unwrap();
    assert_eq!(unit.len(), 2);
    assert_eq!(unit[0].attributes, vec!["FastApprox".to_owned()]);
    assert!(unit[1].attributes.is_empty());
    assert_eq!(unit[1].method.body, vec![Stmt::Return(Expr::int(1))]);
  }

  #[test]
  fn test_trailing_input_is_an_error() {
    assert!(parse_expr("a b").is_err());
    assert!(parse_expr("").is_err());
    assert!(parse_expr("\"text\"").is_ok_and(|e| e == Expr::Literal(Literal::String("text".into()))));
  }
}
