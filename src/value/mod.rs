
//! Runtime values produced by partial evaluation.

pub mod number;
pub mod ops;

pub use number::Number;

use crate::ast::{Call, Expr, Literal, TypeRef};
use crate::host::HostException;

use std::fmt::{self, Debug, Formatter};
use std::rc::Rc;

/// An index into a sequence, counted from the front or, for `^n`,
/// from the back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Index {
  pub value: i64,
  pub from_end: bool,
}

/// What kind of collection a [`Sequence`] is. Only arrays, lists and
/// sets have a literal spelling; the lazy kinds exist during
/// evaluation and never fold back into source.
#[derive(Debug, Clone, PartialEq)]
pub enum SequenceKind {
  Array,
  List,
  HashSet,
  Enumerable,
  /// The result of an ordering operator. Keeps the unsorted source
  /// and the keys so that `ThenBy` can refine the order.
  Ordered { source: Rc<Vec<Value>>, keys: Rc<Vec<SortKey>> },
  /// One group produced by `GroupBy`.
  Grouping { key: Rc<Value> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
  /// `None` sorts by the element itself.
  pub selector: Option<Delegate>,
  pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
  pub kind: SequenceKind,
  pub element: TypeRef,
  pub items: Rc<Vec<Value>>,
}

type DelegateFn = dyn Fn(&[Value]) -> Result<Value, HostException>;

/// A callable value, such as a compiled lambda. Two delegates are
/// equal only if they are the same closure.
#[derive(Clone)]
pub struct Delegate(Rc<DelegateFn>);

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Number(Number),
  Bool(bool),
  Char(char),
  String(String),
  Null,
  Sequence(Sequence),
  Index(Index),
  /// A range; an omitted start is `0` and an omitted end is `^0`.
  Range(Index, Index),
  Tuple(Vec<Value>),
  Enum { ty: String, member: String },
  Delegate(Delegate),
}

impl Index {
  pub fn start(value: i64) -> Index {
    Index { value, from_end: false }
  }

  pub fn end(value: i64) -> Index {
    Index { value, from_end: true }
  }

  /// The offset from the front in a sequence of `len` elements, which
  /// may be out of bounds.
  pub fn offset(self, len: usize) -> i64 {
    if self.from_end { len as i64 - self.value } else { self.value }
  }

  fn to_expr(self) -> Expr {
    let value = Expr::number(Number::Int32(self.value as i32));
    if self.from_end { Expr::FromEnd(Rc::new(value)) } else { value }
  }
}

impl Sequence {
  pub fn new(kind: SequenceKind, element: TypeRef, items: Vec<Value>) -> Sequence {
    Sequence { kind, element, items: Rc::new(items) }
  }

  pub fn array(element: TypeRef, items: Vec<Value>) -> Sequence {
    Sequence::new(SequenceKind::Array, element, items)
  }

  pub fn enumerable(element: TypeRef, items: Vec<Value>) -> Sequence {
    Sequence::new(SequenceKind::Enumerable, element, items)
  }

  /// True for the kinds whose contents are computed on enumeration.
  pub fn is_lazy(&self) -> bool {
    matches!(self.kind, SequenceKind::Enumerable | SequenceKind::Ordered { .. } | SequenceKind::Grouping { .. })
  }

  /// The static type this sequence has in source.
  pub fn ty(&self) -> TypeRef {
    let element = self.element.clone();
    match &self.kind {
      SequenceKind::Array => TypeRef::array(element),
      SequenceKind::List => TypeRef::list(element),
      SequenceKind::HashSet => TypeRef::generic("HashSet", vec![element]),
      SequenceKind::Enumerable => TypeRef::enumerable(element),
      SequenceKind::Ordered { .. } => TypeRef::generic("IOrderedEnumerable", vec![element]),
      SequenceKind::Grouping { key } => TypeRef::generic("IGrouping", vec![key.ty(), element]),
    }
  }
}

impl Delegate {
  pub fn new<F>(f: F) -> Delegate
  where F: Fn(&[Value]) -> Result<Value, HostException> + 'static {
    Delegate(Rc::new(f))
  }

  pub fn invoke(&self, args: &[Value]) -> Result<Value, HostException> {
    (self.0)(args)
  }
}

impl Debug for Delegate {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "Delegate({:p})", Rc::as_ptr(&self.0))
  }
}

impl PartialEq for Delegate {
  fn eq(&self, other: &Delegate) -> bool {
    Rc::ptr_eq(&self.0, &other.0)
  }
}

impl Value {
  pub fn from_literal(lit: &Literal) -> Value {
    match lit {
      Literal::Number(n) => Value::Number(n.clone()),
      Literal::Bool(b) => Value::Bool(*b),
      Literal::Char(c) => Value::Char(*c),
      Literal::String(s) => Value::String(s.clone()),
      Literal::Null => Value::Null,
    }
  }

  pub fn ty(&self) -> TypeRef {
    match self {
      Value::Number(n) => TypeRef::Numeric(n.ty()),
      Value::Bool(_) => TypeRef::Bool,
      Value::Char(_) => TypeRef::Char,
      Value::String(_) => TypeRef::String,
      Value::Null => TypeRef::Object,
      Value::Sequence(seq) => seq.ty(),
      Value::Index(_) => TypeRef::named("Index"),
      Value::Range(..) => TypeRef::named("Range"),
      Value::Tuple(items) => TypeRef::generic("ValueTuple", items.iter().map(Value::ty).collect()),
      Value::Enum { ty, .. } => TypeRef::named(ty.clone()),
      Value::Delegate(_) => TypeRef::named("Func"),
    }
  }

  pub fn as_number(&self) -> Option<&Number> {
    match self {
      Value::Number(n) => Some(n),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_sequence(&self) -> Option<&Sequence> {
    match self {
      Value::Sequence(seq) => Some(seq),
      _ => None,
    }
  }

  pub fn as_delegate(&self) -> Option<&Delegate> {
    match self {
      Value::Delegate(d) => Some(d),
      _ => None,
    }
  }

  /// An integer argument such as a count or an index.
  pub fn as_i64(&self) -> Option<i64> {
    let n = self.as_number()?;
    if !n.ty().is_integer() {
      return None;
    }
    n.to_i128().and_then(|x| i64::try_from(x).ok())
  }

  /// Equality under the default equality comparer: floating values
  /// are equal when they compare equal or are both NaN.
  pub fn host_equals(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Number(a), Value::Number(b)) if a.ty() == b.ty() => {
        a.compare(b) == Some(std::cmp::Ordering::Equal) || (a.is_nan() && b.is_nan())
      }
      (Value::Number(_), Value::Number(_)) => false,
      (Value::Sequence(a), Value::Sequence(b)) => Rc::ptr_eq(&a.items, &b.items),
      (Value::Tuple(a), Value::Tuple(b)) => {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.host_equals(y))
      }
      (a, b) => a == b,
    }
  }

  /// The source spelling of this value, if it has one. Lazy sequences
  /// and delegates have none.
  pub fn to_expr(&self) -> Option<Expr> {
    let expr = match self {
      Value::Number(n) => Expr::number(n.clone()),
      Value::Bool(b) => Expr::bool(*b),
      Value::Char(c) => Expr::Literal(Literal::Char(*c)),
      Value::String(s) => Expr::Literal(Literal::String(s.clone())),
      Value::Null => Expr::Literal(Literal::Null),
      Value::Sequence(seq) => {
        let items = seq.items.iter().map(Value::to_expr).collect::<Option<Vec<_>>>()?;
        match seq.kind {
          SequenceKind::Array => Expr::ArrayLit(Some(seq.element.clone()), items),
          SequenceKind::List | SequenceKind::HashSet => Expr::New(seq.ty(), Vec::new(), Some(items)),
          SequenceKind::Enumerable | SequenceKind::Ordered { .. } | SequenceKind::Grouping { .. } => return None,
        }
      }
      Value::Index(index) => index.to_expr(),
      Value::Range(start, end) => {
        let start = (*start != Index::start(0)).then(|| Rc::new(start.to_expr()));
        let end = (*end != Index::end(0)).then(|| Rc::new(end.to_expr()));
        Expr::Range(start, end)
      }
      Value::Tuple(items) => Expr::Tuple(items.iter().map(Value::to_expr).collect::<Option<Vec<_>>>()?),
      Value::Enum { ty, member } => Expr::StaticMember(TypeRef::named(ty.clone()), member.clone()),
      Value::Delegate(_) => return None,
    };
    Some(expr)
  }

  /// A `Enumerable.Empty<T>()` call, the spelling of an empty lazy
  /// sequence.
  pub fn empty_sequence_expr(element: TypeRef) -> Expr {
    Expr::Call(Call::on_type(TypeRef::named("Enumerable"), "Empty", Vec::new()).with_type_args(vec![element]))
  }
}

impl From<Number> for Value {
  fn from(n: Number) -> Value {
    Value::Number(n)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Value {
    Value::Bool(b)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::NumericType;

  fn ints(values: &[i32]) -> Vec<Value> {
    values.iter().map(|x| Value::Number(Number::Int32(*x))).collect()
  }

  #[test]
  fn test_array_to_expr() {
    let value = Value::Sequence(Sequence::array(NumericType::Int32.into(), ints(&[1, 2])));
    assert_eq!(value.to_expr().unwrap().to_string(), "new int[] { 1, 2 }");
  }

  #[test]
  fn test_lazy_sequences_have_no_spelling() {
    let value = Value::Sequence(Sequence::enumerable(NumericType::Int32.into(), ints(&[1])));
    assert_eq!(value.to_expr(), None);
    let delegate = Value::Delegate(Delegate::new(|_| Ok(Value::Null)));
    assert_eq!(delegate.to_expr(), None);
  }

  #[test]
  fn test_list_to_expr() {
    let value = Value::Sequence(Sequence::new(SequenceKind::List, TypeRef::Bool, vec![Value::Bool(true)]));
    assert_eq!(value.to_expr().unwrap().to_string(), "new List<bool> { true }");
  }

  #[test]
  fn test_range_to_expr() {
    let value = Value::Range(Index::start(1), Index::end(0));
    assert_eq!(value.to_expr().unwrap().to_string(), "1..");
    let value = Value::Range(Index::start(0), Index::end(2));
    assert_eq!(value.to_expr().unwrap().to_string(), "..^2");
  }

  #[test]
  fn test_host_equals() {
    let nan = Value::Number(Number::Double(f64::NAN));
    assert!(nan.host_equals(&nan.clone()));
    let zero = Value::Number(Number::Double(0.0));
    let negative_zero = Value::Number(Number::Double(-0.0));
    assert!(zero.host_equals(&negative_zero));
    assert_ne!(zero, negative_zero);
    assert!(!Value::Number(Number::Int32(1)).host_equals(&Value::Number(Number::Int64(1))));
  }

  #[test]
  fn test_delegate_identity() {
    let a = Delegate::new(|args| Ok(args[0].clone()));
    let b = Delegate::new(|args| Ok(args[0].clone()));
    assert_eq!(a, a.clone());
    assert_ne!(a, b);
    assert_eq!(a.invoke(&[Value::Bool(true)]).unwrap(), Value::Bool(true));
  }

  #[test]
  fn test_index_offset() {
    assert_eq!(Index::end(1).offset(5), 4);
    assert_eq!(Index::start(2).offset(5), 2);
  }
}
