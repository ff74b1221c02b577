
//! Execution of `System.Linq.Enumerable` over sequence values.
//!
//! Every operator runs eagerly. Operators that are lazy at runtime
//! produce a [`SequenceKind::Enumerable`] (or ordered) sequence, which
//! has no literal spelling, so only terminal results fold into source.

use super::{HostException, Signature};
use crate::ast::{NumericType, TypeRef};
use crate::value::{Delegate, Index, Number, Sequence, SequenceKind, SortKey, Value};
use crate::value::ops::{decimal_result, total_compare};

use num::{BigRational, Zero};

use std::cmp::Ordering;
use std::rc::Rc;

const NO_ELEMENTS: &str = "Sequence contains no elements";
const NO_MATCH: &str = "Sequence contains no matching element";
const MORE_THAN_ONE: &str = "Sequence contains more than one element";
const MORE_THAN_ONE_MATCH: &str = "Sequence contains more than one matching element";

type QueryResult = Result<Option<Value>, HostException>;

/// The default value of a type: zero, `false`, `'\0'`, or `null`.
pub fn default_value(ty: &TypeRef) -> Value {
  match ty {
    TypeRef::Numeric(t) => Value::Number(Number::zero(*t)),
    TypeRef::Bool => Value::Bool(false),
    TypeRef::Char => Value::Char('\0'),
    _ => Value::Null,
  }
}

/// The items of a sequence value. Strings enumerate their characters.
pub fn items_of(value: &Value) -> Option<Rc<Vec<Value>>> {
  match value {
    Value::Sequence(seq) => Some(Rc::clone(&seq.items)),
    Value::String(s) => Some(Rc::new(s.chars().map(Value::Char).collect())),
    _ => None,
  }
}

fn predicate(delegate: &Delegate, args: &[Value]) -> Result<bool, HostException> {
  match delegate.invoke(args)? {
    Value::Bool(b) => Ok(b),
    other => Err(HostException::new(
      "System.InvalidCastException",
      format!("Unable to cast object of type '{}' to type 'System.Boolean'.", runtime_name(&other.ty())),
    )),
  }
}

fn runtime_name(ty: &TypeRef) -> String {
  match ty {
    TypeRef::Numeric(t) => format!("System.{}", t.runtime_name()),
    TypeRef::Bool => "System.Boolean".to_owned(),
    TypeRef::Char => "System.Char".to_owned(),
    TypeRef::String => "System.String".to_owned(),
    other => other.to_string(),
  }
}

fn int32(n: usize) -> Value {
  Value::Number(Number::Int32(n as i32))
}

fn contains(items: &[Value], value: &Value) -> bool {
  items.iter().any(|item| item.host_equals(value))
}

fn distinct(items: impl IntoIterator<Item = Value>) -> Vec<Value> {
  let mut out: Vec<Value> = Vec::new();
  for item in items {
    if !contains(&out, &item) {
      out.push(item);
    }
  }
  out
}

/// Stable sort of `source` under `keys`, the first key most
/// significant.
fn sort(source: &[Value], keys: &[SortKey]) -> Result<Vec<Value>, HostException> {
  let mut keyed = Vec::with_capacity(source.len());
  for item in source {
    let mut row = Vec::with_capacity(keys.len());
    for key in keys {
      let value = match &key.selector {
        Some(selector) => selector.invoke(std::slice::from_ref(item))?,
        None => item.clone(),
      };
      row.push(value);
    }
    keyed.push((row, item.clone()));
  }
  keyed.sort_by(|(a, _), (b, _)| {
    keys.iter()
      .zip(a.iter().zip(b))
      .map(|(key, (x, y))| {
        let order = total_compare(x, y);
        if key.descending { order.reverse() } else { order }
      })
      .find(|order| *order != Ordering::Equal)
      .unwrap_or(Ordering::Equal)
  });
  Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

/// Sums numbers of one type the way `Enumerable.Sum` does: integer
/// sums are checked and `float` sums accumulate in `double`.
fn sum(element: NumericType, values: &[Value]) -> Result<Number, HostException> {
  let numbers = values.iter().filter_map(Value::as_number);
  match element {
    NumericType::Int32 | NumericType::Int64 => {
      let (lo, hi) = Number::integer_bounds(element).unwrap_or((0, 0));
      let mut total = 0i128;
      for n in numbers {
        total += n.to_i128().unwrap_or_default();
        if total < lo || total > hi {
          return Err(HostException::overflow());
        }
      }
      Ok(Number::from_i128_wrapping(total, element))
    }
    NumericType::Single => Ok(Number::Single(numbers.map(Number::to_f64).sum::<f64>() as f32)),
    NumericType::Double => {
      let mut total = 0.0;
      for n in numbers {
        total += n.to_f64();
      }
      Ok(Number::Double(total))
    }
    NumericType::Decimal => {
      let mut total = BigRational::zero();
      for n in numbers {
        total += n.to_rational().unwrap_or_else(BigRational::zero);
      }
      decimal_result(total)
    }
    _ => Err(HostException::invalid_operation(format!("Sum is not defined over {element}"))),
  }
}

fn average(element: NumericType, values: &[Value]) -> Result<Number, HostException> {
  if values.is_empty() {
    return Err(HostException::invalid_operation(NO_ELEMENTS));
  }
  let count = values.len();
  match element {
    NumericType::Decimal => {
      let total = sum(element, values)?.to_rational().unwrap_or_else(BigRational::zero);
      decimal_result(total / BigRational::from_integer(count.into()))
    }
    NumericType::Single => {
      let total = values.iter().filter_map(Value::as_number).map(Number::to_f64).sum::<f64>();
      Ok(Number::Single((total / count as f64) as f32))
    }
    NumericType::Int32 | NumericType::Int64 => {
      let total = sum(NumericType::Int64, values)?;
      Ok(Number::Double(total.to_f64() / count as f64))
    }
    _ => Ok(Number::Double(sum(NumericType::Double, values)?.to_f64() / count as f64)),
  }
}

/// `Min` or `Max` of values without a selector. For floating values
/// NaN is the smallest value, so `Min` reports it and `Max` skips it.
fn extreme(values: &[Value], want: Ordering, element: &TypeRef) -> QueryResult {
  let candidates = values.iter().filter(|v| **v != Value::Null);
  let mut best: Option<&Value> = None;
  for value in candidates {
    best = match best {
      Some(current) if total_compare(value, current) != want => Some(current),
      _ => Some(value),
    };
  }
  match best {
    Some(value) => Ok(Some(value.clone())),
    None if matches!(element, TypeRef::Numeric(_) | TypeRef::Bool | TypeRef::Char) => {
      Err(HostException::invalid_operation(NO_ELEMENTS))
    }
    None => Ok(Some(Value::Null)),
  }
}

/// One call of an extension operator.
struct Query<'a> {
  signature: &'a Signature,
  element: TypeRef,
  items: Rc<Vec<Value>>,
  source: &'a Value,
  args: &'a [Value],
}

impl<'a> Query<'a> {
  fn result_element(&self) -> TypeRef {
    self.signature.return_type.element_type().cloned().unwrap_or_else(|| self.element.clone())
  }

  fn lazy(&self, items: Vec<Value>) -> QueryResult {
    Ok(Some(Value::Sequence(Sequence::enumerable(self.result_element(), items))))
  }

  fn delegate(&self, i: usize) -> Option<&'a Delegate> {
    self.args.get(i)?.as_delegate()
  }

  fn other_items(&self, i: usize) -> Option<Rc<Vec<Value>>> {
    items_of(self.args.get(i)?)
  }

  fn count_arg(&self, i: usize) -> Option<i64> {
    self.args.get(i)?.as_i64()
  }

  /// Whether the lambda at argument `i` also receives the element
  /// index, as in `Where((x, i) => ...)`.
  fn indexed(&self, i: usize) -> bool {
    match self.signature.parameter_types.get(i + 1) {
      Some(TypeRef::Named { name, args }) if name == "Func" => args.len() == 3,
      _ => false,
    }
  }

  fn map(&self, delegate: &Delegate, indexed: bool) -> Result<Vec<Value>, HostException> {
    self.items.iter()
      .enumerate()
      .map(|(i, item)| {
        if indexed { delegate.invoke(&[item.clone(), int32(i)]) } else { delegate.invoke(std::slice::from_ref(item)) }
      })
      .collect()
  }

  fn filter(&self, delegate: &Delegate, indexed: bool) -> Result<Vec<Value>, HostException> {
    let mut out = Vec::new();
    for (i, item) in self.items.iter().enumerate() {
      let keep = if indexed {
        predicate(delegate, &[item.clone(), int32(i)])?
      } else {
        predicate(delegate, std::slice::from_ref(item))?
      };
      if keep {
        out.push(item.clone());
      }
    }
    Ok(out)
  }

  /// Items that pass the optional predicate at argument 0.
  fn matching(&self) -> Result<Option<Vec<Value>>, HostException> {
    match self.args.len() {
      0 => Ok(Some(self.items.to_vec())),
      1 => match self.delegate(0) {
        Some(d) => self.filter(d, false).map(Some),
        None => Ok(None),
      },
      _ => Ok(None),
    }
  }

  fn ordered(&self, key: SortKey, then: bool) -> QueryResult {
    let (source, mut keys) = match (self.source, then) {
      (Value::Sequence(Sequence { kind: SequenceKind::Ordered { source, keys }, .. }), true) => {
        (Rc::clone(source), keys.to_vec())
      }
      (_, true) => return Ok(None),
      (_, false) => (Rc::clone(&self.items), Vec::new()),
    };
    keys.push(key);
    let items = sort(&source, &keys)?;
    let kind = SequenceKind::Ordered { source, keys: Rc::new(keys) };
    Ok(Some(Value::Sequence(Sequence::new(kind, self.element.clone(), items))))
  }

  fn keyed_set(&self, other: &[Value], key: &Delegate, keep: bool) -> QueryResult {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for item in self.items.iter() {
      let k = key.invoke(std::slice::from_ref(item))?;
      if contains(&seen, &k) {
        continue;
      }
      if contains(other, &k) == keep {
        out.push(item.clone());
      }
      seen.push(k);
    }
    self.lazy(out)
  }

  fn single(&self, items: Vec<Value>, or_default: bool, filtered: bool) -> QueryResult {
    match items.len() {
      1 => Ok(items.into_iter().next()),
      0 if or_default => Ok(Some(default_value(&self.element))),
      0 => Err(HostException::invalid_operation(if filtered { NO_MATCH } else { NO_ELEMENTS })),
      _ => Err(HostException::invalid_operation(if filtered { MORE_THAN_ONE_MATCH } else { MORE_THAN_ONE })),
    }
  }

  fn pick(&self, item: Option<&Value>, or_default: bool) -> QueryResult {
    match item {
      Some(value) => Ok(Some(value.clone())),
      None if or_default => Ok(Some(default_value(&self.element))),
      None if self.args.is_empty() => Err(HostException::invalid_operation(NO_ELEMENTS)),
      None => Err(HostException::invalid_operation(NO_MATCH)),
    }
  }

  fn element_index(&self) -> Option<i64> {
    match self.args.first()? {
      Value::Index(index) => Some(index.offset(self.items.len())),
      other => other.as_i64(),
    }
  }

  fn numeric_values(&self) -> Result<Option<(NumericType, Vec<Value>)>, HostException> {
    let (values, ty) = match self.args.len() {
      0 => (self.items.to_vec(), self.element.clone()),
      1 => match (self.delegate(0), self.signature.parameter_types.get(1)) {
        (Some(d), Some(TypeRef::Named { args, .. })) => (self.map(d, false)?, args.last().cloned().unwrap_or(TypeRef::Object)),
        _ => return Ok(None),
      },
      _ => return Ok(None),
    };
    Ok(ty.as_numeric().map(|t| (t, values)))
  }

  fn run(&self) -> QueryResult {
    let items = &self.items;
    let arity = self.args.len();
    match (self.signature.name.as_str(), arity) {
      ("Where", 1) => match self.delegate(0) {
        Some(d) => self.lazy(self.filter(d, self.indexed(0))?),
        None => Ok(None),
      },
      ("Select", 1) => match self.delegate(0) {
        Some(d) => self.lazy(self.map(d, self.indexed(0))?),
        None => Ok(None),
      },
      ("SelectMany", 1) => {
        let Some(d) = self.delegate(0) else { return Ok(None) };
        let mut out = Vec::new();
        for inner in self.map(d, self.indexed(0))? {
          match items_of(&inner) {
            Some(inner) => out.extend(inner.iter().cloned()),
            None => return Ok(None),
          }
        }
        self.lazy(out)
      }
      ("Count" | "LongCount", _) => {
        let Some(matching) = self.matching()? else { return Ok(None) };
        let n = matching.len();
        if self.signature.name == "Count" {
          if n > i32::MAX as usize {
            return Err(HostException::overflow());
          }
          Ok(Some(int32(n)))
        } else {
          Ok(Some(Value::Number(Number::Int64(n as i64))))
        }
      }
      ("Any", _) => Ok(self.matching()?.map(|m| Value::Bool(!m.is_empty()))),
      ("All", 1) => {
        let Some(d) = self.delegate(0) else { return Ok(None) };
        for item in items.iter() {
          if !predicate(d, std::slice::from_ref(item))? {
            return Ok(Some(Value::Bool(false)));
          }
        }
        Ok(Some(Value::Bool(true)))
      }
      ("Contains", 1) => Ok(Some(Value::Bool(contains(items, &self.args[0])))),
      ("First" | "FirstOrDefault", _) => {
        let Some(matching) = self.matching()? else { return Ok(None) };
        self.pick(matching.first(), self.signature.name.ends_with("OrDefault"))
      }
      ("Last" | "LastOrDefault", _) => {
        let Some(matching) = self.matching()? else { return Ok(None) };
        self.pick(matching.last(), self.signature.name.ends_with("OrDefault"))
      }
      ("Single" | "SingleOrDefault", _) => {
        let Some(matching) = self.matching()? else { return Ok(None) };
        self.single(matching, self.signature.name.ends_with("OrDefault"), arity == 1)
      }
      ("ElementAt" | "ElementAtOrDefault", 1) => {
        let Some(index) = self.element_index() else { return Ok(None) };
        let item = usize::try_from(index).ok().and_then(|i| items.get(i));
        match item {
          Some(value) => Ok(Some(value.clone())),
          None if self.signature.name == "ElementAtOrDefault" => Ok(Some(default_value(&self.element))),
          None => Err(HostException::argument_out_of_range("index")),
        }
      }
      ("Sum", _) => match self.numeric_values()? {
        Some((ty, values)) => Ok(Some(Value::Number(sum(ty, &values)?))),
        None => Ok(None),
      },
      ("Average", _) => match self.numeric_values()? {
        Some((ty, values)) => Ok(Some(Value::Number(average(ty, &values)?))),
        None => Ok(None),
      },
      ("Min" | "Max", 0) => {
        let want = if self.signature.name == "Max" { Ordering::Greater } else { Ordering::Less };
        extreme(items, want, &self.element)
      }
      ("Min" | "Max", 1) => {
        let Some(d) = self.delegate(0) else { return Ok(None) };
        let want = if self.signature.name == "Max" { Ordering::Greater } else { Ordering::Less };
        let values = self.map(d, false)?;
        extreme(&values, want, &self.signature.return_type)
      }
      ("MinBy" | "MaxBy", 1) => {
        let Some(d) = self.delegate(0) else { return Ok(None) };
        let want = if self.signature.name == "MaxBy" { Ordering::Greater } else { Ordering::Less };
        let keys = self.map(d, false)?;
        let mut best: Option<(usize, &Value)> = None;
        for (i, key) in keys.iter().enumerate() {
          best = match best {
            Some((j, current)) if total_compare(key, current) != want => Some((j, current)),
            _ => Some((i, key)),
          };
        }
        match best {
          Some((i, _)) => Ok(Some(items[i].clone())),
          None if matches!(self.element, TypeRef::Numeric(_) | TypeRef::Bool | TypeRef::Char) => {
            Err(HostException::invalid_operation(NO_ELEMENTS))
          }
          None => Ok(Some(Value::Null)),
        }
      }
      ("Aggregate", 1 | 2 | 3) => {
        let (mut acc, rest) = match arity {
          1 => match items.split_first() {
            Some((first, rest)) => (first.clone(), rest),
            None => return Err(HostException::invalid_operation(NO_ELEMENTS)),
          },
          _ => (self.args[0].clone(), &items[..]),
        };
        let Some(func) = self.delegate(if arity == 1 { 0 } else { 1 }) else { return Ok(None) };
        for item in rest {
          acc = func.invoke(&[acc, item.clone()])?;
        }
        if arity == 3 {
          let Some(result) = self.delegate(2) else { return Ok(None) };
          acc = result.invoke(&[acc])?;
        }
        Ok(Some(acc))
      }
      ("Distinct", 0) => self.lazy(distinct(items.iter().cloned())),
      ("DistinctBy", 1) => match self.delegate(0) {
        Some(d) => self.keyed_set(&[], d, false),
        None => Ok(None),
      },
      ("Reverse", 0) => self.lazy(items.iter().rev().cloned().collect()),
      ("AsEnumerable", 0) => self.lazy(items.to_vec()),
      ("ToArray", 0) => Ok(Some(Value::Sequence(Sequence::array(self.element.clone(), items.to_vec())))),
      ("ToList", 0) => Ok(Some(Value::Sequence(Sequence::new(SequenceKind::List, self.element.clone(), items.to_vec())))),
      ("ToHashSet", 0) => {
        let set = Sequence::new(SequenceKind::HashSet, self.element.clone(), distinct(items.iter().cloned()));
        Ok(Some(Value::Sequence(set)))
      }
      ("Append", 1) => self.lazy(items.iter().chain(&self.args[..1]).cloned().collect()),
      ("Prepend", 1) => self.lazy(self.args[..1].iter().chain(items.iter()).cloned().collect()),
      ("Concat", 1) => match self.other_items(0) {
        Some(other) => self.lazy(items.iter().chain(other.iter()).cloned().collect()),
        None => Ok(None),
      },
      ("Union", 1) => match self.other_items(0) {
        Some(other) => self.lazy(distinct(items.iter().chain(other.iter()).cloned())),
        None => Ok(None),
      },
      ("Intersect", 1) => match self.other_items(0) {
        Some(other) => self.lazy(distinct(items.iter().filter(|x| contains(&other, x)).cloned())),
        None => Ok(None),
      },
      ("Except", 1) => match self.other_items(0) {
        Some(other) => self.lazy(distinct(items.iter().filter(|x| !contains(&other, x)).cloned())),
        None => Ok(None),
      },
      ("ExceptBy" | "IntersectBy", 2) => match (self.other_items(0), self.delegate(1)) {
        (Some(other), Some(key)) => self.keyed_set(&other, key, self.signature.name == "IntersectBy"),
        _ => Ok(None),
      },
      ("UnionBy", 2) => {
        let (Some(other), Some(key)) = (self.other_items(0), self.delegate(1)) else { return Ok(None) };
        let mut seen = Vec::new();
        let mut out = Vec::new();
        for item in items.iter().chain(other.iter()) {
          let k = key.invoke(std::slice::from_ref(item))?;
          if !contains(&seen, &k) {
            seen.push(k);
            out.push(item.clone());
          }
        }
        self.lazy(out)
      }
      ("SequenceEqual", 1) => match self.other_items(0) {
        Some(other) => {
          let equal = items.len() == other.len() && items.iter().zip(other.iter()).all(|(a, b)| a.host_equals(b));
          Ok(Some(Value::Bool(equal)))
        }
        None => Ok(None),
      },
      ("Skip" | "Take" | "SkipLast" | "TakeLast", 1) => {
        let Some(n) = self.count_arg(0) else { return Ok(None) };
        let len = items.len();
        let n = n.clamp(0, len as i64) as usize;
        let slice = match self.signature.name.as_str() {
          "Skip" => &items[n..],
          "Take" => &items[..n],
          "SkipLast" => &items[..len - n],
          _ => &items[len - n..],
        };
        self.lazy(slice.to_vec())
      }
      ("SkipWhile" | "TakeWhile", 1) => {
        let Some(d) = self.delegate(0) else { return Ok(None) };
        let indexed = self.indexed(0);
        let mut split = items.len();
        for (i, item) in items.iter().enumerate() {
          let holds = if indexed { predicate(d, &[item.clone(), int32(i)])? } else { predicate(d, std::slice::from_ref(item))? };
          if !holds {
            split = i;
            break;
          }
        }
        let slice = if self.signature.name == "SkipWhile" { &items[split..] } else { &items[..split] };
        self.lazy(slice.to_vec())
      }
      ("DefaultIfEmpty", 0) => {
        if items.is_empty() { self.lazy(vec![default_value(&self.element)]) } else { self.lazy(items.to_vec()) }
      }
      ("Chunk", 1) => {
        let Some(size) = self.count_arg(0) else { return Ok(None) };
        if size < 1 {
          return Err(HostException::argument_out_of_range("size"));
        }
        let chunks = items.chunks(size as usize)
          .map(|chunk| Value::Sequence(Sequence::array(self.element.clone(), chunk.to_vec())))
          .collect();
        self.lazy(chunks)
      }
      ("Zip", 1) => match self.other_items(0) {
        Some(other) => self.lazy(items.iter().zip(other.iter()).map(|(a, b)| Value::Tuple(vec![a.clone(), b.clone()])).collect()),
        None => Ok(None),
      },
      ("Cast" | "OfType", 0) => {
        let target = self.result_element();
        let fits = |v: &Value| target == TypeRef::Object || v.ty() == target;
        if self.signature.name == "OfType" {
          return self.lazy(items.iter().filter(|v| **v != Value::Null && fits(v)).cloned().collect());
        }
        if let Some(bad) = items.iter().find(|v| **v != Value::Null && !fits(v)) {
          return Err(HostException::new(
            "System.InvalidCastException",
            format!("Unable to cast object of type '{}' to type '{}'.", runtime_name(&bad.ty()), runtime_name(&target)),
          ));
        }
        self.lazy(items.to_vec())
      }
      ("Order" | "OrderDescending", 0) => {
        self.ordered(SortKey { selector: None, descending: self.signature.name == "OrderDescending" }, false)
      }
      ("OrderBy" | "OrderByDescending" | "ThenBy" | "ThenByDescending", 1) => {
        let Some(d) = self.delegate(0) else { return Ok(None) };
        let name = self.signature.name.as_str();
        let key = SortKey { selector: Some(d.clone()), descending: name.ends_with("Descending") };
        self.ordered(key, name.starts_with("Then"))
      }
      ("GroupBy", 1) => {
        let Some(d) = self.delegate(0) else { return Ok(None) };
        let keys = self.map(d, false)?;
        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
        for (key, item) in keys.into_iter().zip(items.iter()) {
          match groups.iter_mut().find(|(k, _)| k.host_equals(&key)) {
            Some((_, members)) => members.push(item.clone()),
            None => groups.push((key, vec![item.clone()])),
          }
        }
        let groups = groups.into_iter()
          .map(|(key, members)| {
            let kind = SequenceKind::Grouping { key: Rc::new(key) };
            Value::Sequence(Sequence::new(kind, self.element.clone(), members))
          })
          .collect();
        self.lazy(groups)
      }
      _ => Ok(None),
    }
  }
}

fn static_call(signature: &Signature, args: &[Value]) -> QueryResult {
  let element = signature.return_type.element_type().cloned().unwrap_or(TypeRef::Object);
  let items = match (signature.name.as_str(), args) {
    ("Range", [start, count]) => {
      let (Some(start), Some(count)) = (start.as_i64(), count.as_i64()) else { return Ok(None) };
      if count < 0 || start + count - 1 > i32::MAX as i64 {
        return Err(HostException::argument_out_of_range("count"));
      }
      (start..start + count).map(|i| Value::Number(Number::Int32(i as i32))).collect()
    }
    ("Repeat", [value, count]) => {
      let Some(count) = count.as_i64() else { return Ok(None) };
      if count < 0 {
        return Err(HostException::argument_out_of_range("count"));
      }
      vec![value.clone(); count as usize]
    }
    ("Empty", []) => Vec::new(),
    _ => return Ok(None),
  };
  Ok(Some(Value::Sequence(Sequence::enumerable(element, items))))
}

/// Runs an `Enumerable` member. For extension methods the receiver is
/// the first argument.
pub fn invoke(signature: &Signature, args: &[Value]) -> QueryResult {
  if !signature.is_extension {
    return static_call(signature, args);
  }
  let Some((source, rest)) = args.split_first() else {
    return Ok(None);
  };
  let Some(items) = items_of(source) else {
    return Ok(None);
  };
  let element = match source {
    Value::Sequence(seq) => seq.element.clone(),
    _ => signature.source_element_type().cloned().unwrap_or(TypeRef::Object),
  };
  let query = Query { signature, element, items, source, args: rest };
  query.run()
}

/// The `Key` of a grouping.
pub fn grouping_key(value: &Value) -> Option<Value> {
  match value {
    Value::Sequence(Sequence { kind: SequenceKind::Grouping { key }, .. }) => Some(Value::clone(key)),
    _ => None,
  }
}

/// `value[index]` on an indexable value.
pub fn element_at(value: &Value, index: &Value) -> QueryResult {
  let Some(items) = items_of(value) else {
    return Ok(None);
  };
  let offset = match index {
    Value::Index(index) => index.offset(items.len()),
    other => match other.as_i64() {
      Some(i) => i,
      None => return Ok(None),
    },
  };
  match usize::try_from(offset).ok().and_then(|i| items.get(i)) {
    Some(item) => Ok(Some(item.clone())),
    None => Err(HostException::new("System.IndexOutOfRangeException", "Index was outside the bounds of the array.")),
  }
}

/// `value[start..end]` on an array or string.
pub fn slice(value: &Value, start: Index, end: Index) -> QueryResult {
  let Some(items) = items_of(value) else {
    return Ok(None);
  };
  let len = items.len();
  let (lo, hi) = (start.offset(len), end.offset(len));
  if lo < 0 || hi > len as i64 || lo > hi {
    return Err(HostException::argument_out_of_range("length"));
  }
  let slice = items[lo as usize..hi as usize].to_vec();
  match value {
    Value::String(_) => Ok(Some(Value::String(slice.iter().filter_map(|c| match c {
      Value::Char(c) => Some(*c),
      _ => None,
    }).collect()))),
    Value::Sequence(seq) if seq.kind == SequenceKind::Array => Ok(Some(Value::Sequence(Sequence::array(seq.element.clone(), slice)))),
    _ => Ok(None),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn int(x: i32) -> Value {
    Value::Number(Number::Int32(x))
  }

  fn ints(values: &[i32]) -> Value {
    Value::Sequence(Sequence::array(NumericType::Int32.into(), values.iter().map(|x| int(*x)).collect()))
  }

  fn element() -> TypeRef {
    NumericType::Int32.into()
  }

  fn sig(name: &str, params: Vec<TypeRef>, ret: TypeRef) -> Signature {
    let mut all = vec![TypeRef::enumerable(element())];
    all.extend(params);
    Signature::method(TypeRef::named("Enumerable"), name, all, ret).extension()
  }

  fn func(args: Vec<TypeRef>) -> TypeRef {
    TypeRef::generic("Func", args)
  }

  fn items(value: Value) -> Vec<Value> {
    items_of(&value).unwrap().to_vec()
  }

  fn is_even() -> Value {
    Value::Delegate(Delegate::new(|args| match args {
      [Value::Number(Number::Int32(x))] => Ok(Value::Bool(x % 2 == 0)),
      _ => Ok(Value::Bool(false)),
    }))
  }

  #[test]
  fn test_where_then_count() {
    let pred = func(vec![element(), TypeRef::Bool]);
    let filtered = invoke(&sig("Where", vec![pred], TypeRef::enumerable(element())), &[ints(&[1, 2, 3, 4, 5, 6]), is_even()])
      .unwrap()
      .unwrap();
    assert!(filtered.as_sequence().unwrap().is_lazy());
    let count = invoke(&sig("Count", vec![], element()), &[filtered]).unwrap();
    assert_eq!(count, Some(int(3)));
  }

  #[test]
  fn test_first_of_empty_throws() {
    let err = invoke(&sig("First", vec![], element()), &[ints(&[])]).unwrap_err();
    assert_eq!(err, HostException::invalid_operation("Sequence contains no elements"));
    let pred = func(vec![element(), TypeRef::Bool]);
    let err = invoke(&sig("First", vec![pred], element()), &[ints(&[1, 3]), is_even()]).unwrap_err();
    assert_eq!(err.message, "Sequence contains no matching element");
    let value = invoke(&sig("FirstOrDefault", vec![], element()), &[ints(&[])]).unwrap();
    assert_eq!(value, Some(int(0)));
  }

  #[test]
  fn test_single() {
    let err = invoke(&sig("Single", vec![], element()), &[ints(&[1, 2])]).unwrap_err();
    assert_eq!(err.message, "Sequence contains more than one element");
    let value = invoke(&sig("Single", vec![], element()), &[ints(&[7])]).unwrap();
    assert_eq!(value, Some(int(7)));
  }

  #[test]
  fn test_sum_is_checked() {
    let err = invoke(&sig("Sum", vec![], element()), &[ints(&[i32::MAX, 1])]).unwrap_err();
    assert_eq!(err.type_name, "System.OverflowException");
    let total = invoke(&sig("Sum", vec![], element()), &[ints(&[1, 2, 3])]).unwrap();
    assert_eq!(total, Some(int(6)));
  }

  #[test]
  fn test_average_of_ints_is_double() {
    let avg = invoke(&sig("Average", vec![], NumericType::Double.into()), &[ints(&[1, 2])]).unwrap();
    assert_eq!(avg, Some(Value::Number(Number::Double(1.5))));
  }

  #[test]
  fn test_min_max() {
    let max = invoke(&sig("Max", vec![], element()), &[ints(&[3, 9, 2])]).unwrap();
    assert_eq!(max, Some(int(9)));
    let doubles = Value::Sequence(Sequence::array(
      NumericType::Double.into(),
      vec![Value::Number(Number::Double(1.0)), Value::Number(Number::Double(f64::NAN))],
    ));
    let min = invoke(&sig("Min", vec![], NumericType::Double.into()), &[doubles.clone()]).unwrap().unwrap();
    assert!(min.as_number().unwrap().is_nan());
    let max = invoke(&sig("Max", vec![], NumericType::Double.into()), &[doubles]).unwrap();
    assert_eq!(max, Some(Value::Number(Number::Double(1.0))));
  }

  #[test]
  fn test_set_operations() {
    let seq = TypeRef::enumerable(element());
    let union = invoke(&sig("Union", vec![seq.clone()], seq.clone()), &[ints(&[1, 2, 2]), ints(&[2, 3])]).unwrap().unwrap();
    assert_eq!(items(union), vec![int(1), int(2), int(3)]);
    let except = invoke(&sig("Except", vec![seq.clone()], seq.clone()), &[ints(&[1, 2, 1, 3]), ints(&[2])]).unwrap().unwrap();
    assert_eq!(items(except), vec![int(1), int(3)]);
    let intersect = invoke(&sig("Intersect", vec![seq.clone()], seq), &[ints(&[1, 2, 3]), ints(&[3, 1])]).unwrap().unwrap();
    assert_eq!(items(intersect), vec![int(1), int(3)]);
  }

  #[test]
  fn test_order_then_by() {
    let key = func(vec![element(), element()]);
    let seq = TypeRef::generic("IOrderedEnumerable", vec![element()]);
    let parity = Value::Delegate(Delegate::new(|args| match args {
      [Value::Number(Number::Int32(x))] => Ok(int(x % 2)),
      _ => Ok(int(0)),
    }));
    let ordered = invoke(&sig("OrderBy", vec![key.clone()], seq.clone()), &[ints(&[5, 2, 3, 4]), parity]).unwrap().unwrap();
    assert_eq!(items(ordered.clone()), vec![int(2), int(4), int(5), int(3)]);
    let identity = Value::Delegate(Delegate::new(|args| Ok(args[0].clone())));
    let refined = invoke(&sig("ThenByDescending", vec![key], seq), &[ordered, identity]).unwrap().unwrap();
    assert_eq!(items(refined), vec![int(4), int(2), int(5), int(3)]);
  }

  #[test]
  fn test_skip_take() {
    let seq = TypeRef::enumerable(element());
    let skipped = invoke(&sig("Skip", vec![element()], seq.clone()), &[ints(&[1, 2, 3]), int(5)]).unwrap().unwrap();
    assert!(items(skipped).is_empty());
    let taken = invoke(&sig("TakeLast", vec![element()], seq), &[ints(&[1, 2, 3]), int(2)]).unwrap().unwrap();
    assert_eq!(items(taken), vec![int(2), int(3)]);
  }

  #[test]
  fn test_element_at_out_of_range() {
    let err = invoke(&sig("ElementAt", vec![element()], element()), &[ints(&[1]), int(3)]).unwrap_err();
    assert_eq!(err.type_name, "System.ArgumentOutOfRangeException");
  }

  #[test]
  fn test_static_members() {
    let range = Signature::method(
      TypeRef::named("Enumerable"),
      "Range",
      vec![element(), element()],
      TypeRef::enumerable(element()),
    );
    let value = invoke(&range, &[int(2), int(3)]).unwrap().unwrap();
    assert_eq!(items(value), vec![int(2), int(3), int(4)]);
    let err = invoke(&range, &[int(0), int(-1)]).unwrap_err();
    assert_eq!(err.type_name, "System.ArgumentOutOfRangeException");
  }

  #[test]
  fn test_cast_between_numeric_types_fails() {
    let ret = TypeRef::enumerable(NumericType::Double.into());
    let err = invoke(&sig("Cast", vec![], ret), &[ints(&[1])]).unwrap_err();
    assert_eq!(err.message, "Unable to cast object of type 'System.Int32' to type 'System.Double'.");
  }

  #[test]
  fn test_slice_and_index() {
    let value = slice(&ints(&[1, 2, 3, 4]), Index::start(1), Index::end(1)).unwrap().unwrap();
    assert_eq!(value, ints(&[2, 3]));
    assert_eq!(element_at(&ints(&[1, 2]), &Value::Index(Index::end(1))).unwrap(), Some(int(2)));
    assert!(element_at(&ints(&[1, 2]), &int(2)).is_err());
  }
}
