
//! A [`Loader`] that executes the supported parts of the runtime
//! library directly over [`Value`]s.

use super::{linq, math, HostException, HostType, Loader, MemberKind, Signature};
use crate::ast::TypeRef;
use crate::value::{Number, Sequence, SequenceKind, Value};

use phf::phf_set;

/// Runtime types the loader knows, by unqualified name.
static HOST_TYPES: phf::Set<&'static str> = phf_set! {
  "Math",
  "MathF",
  "Enumerable",
  "BitConverter",
  "MidpointRounding",
  "List",
  "HashSet",
  "ValueTuple",
};

const MIDPOINT_ROUNDING: [&str; 5] = ["ToEven", "AwayFromZero", "ToZero", "ToNegativeInfinity", "ToPositiveInfinity"];

/// Largest tuple arity with a flat runtime type.
const MAX_TUPLE_ARITY: usize = 7;

#[derive(Debug, Clone, Copy, Default)]
pub struct InterpretingLoader;

impl InterpretingLoader {
  pub fn new() -> InterpretingLoader {
    InterpretingLoader
  }

  fn construct(&self, ty: &TypeRef, args: &[Value]) -> Result<Option<Value>, HostException> {
    let TypeRef::Named { name, args: type_args } = ty else {
      return Ok(None);
    };
    let kind = match name.as_str() {
      "List" => SequenceKind::List,
      "HashSet" => SequenceKind::HashSet,
      _ => return Ok(None),
    };
    let Some(element) = type_args.first() else {
      return Ok(None);
    };
    let items = match args {
      [] => Vec::new(),
      [capacity] if capacity.as_i64().is_some() => {
        if capacity.as_i64().is_some_and(|c| c < 0) {
          return Err(HostException::argument_out_of_range("capacity"));
        }
        Vec::new()
      }
      [source] => match linq::items_of(source) {
        Some(items) => items.to_vec(),
        None => return Ok(None),
      },
      _ => return Ok(None),
    };
    Ok(Some(Value::Sequence(collection(kind, element.clone(), items))))
  }

  /// `Add` on a list or set, which yields the grown collection.
  fn add(&self, receiver: &Value, item: &Value) -> Option<Value> {
    let Value::Sequence(seq) = receiver else {
      return None;
    };
    if !matches!(seq.kind, SequenceKind::List | SequenceKind::HashSet) {
      return None;
    }
    let mut items = seq.items.to_vec();
    items.push(item.clone());
    Some(Value::Sequence(collection(seq.kind.clone(), seq.element.clone(), items)))
  }
}

fn collection(kind: SequenceKind, element: TypeRef, items: Vec<Value>) -> Sequence {
  let items = if kind == SequenceKind::HashSet {
    let mut unique: Vec<Value> = Vec::new();
    for item in items {
      if !unique.iter().any(|u| u.host_equals(&item)) {
        unique.push(item);
      }
    }
    unique
  } else {
    items
  };
  Sequence::new(kind, element, items)
}

fn type_name(ty: &TypeRef) -> Option<String> {
  match ty {
    TypeRef::Numeric(t) => Some(t.runtime_name().to_owned()),
    TypeRef::Named { name, .. } if HOST_TYPES.contains(name.as_str()) => Some(name.clone()),
    _ => None,
  }
}

impl Loader for InterpretingLoader {
  fn host_type(&self, signature: &Signature) -> Option<HostType> {
    let name = type_name(&signature.declaring_type)?;
    let namespace = match name.as_str() {
      "Enumerable" => "System.Linq",
      "List" | "HashSet" => "System.Collections.Generic",
      _ => "System",
    };
    Some(HostType { name: format!("{namespace}.{name}"), ty: signature.declaring_type.clone() })
  }

  fn invoke_method(&self, signature: &Signature, receiver: Option<&Value>, args: &[Value]) -> Result<Option<Value>, HostException> {
    match signature.kind {
      MemberKind::Field => return Ok(None),
      MemberKind::Constructor => return self.construct(&signature.declaring_type, args),
      MemberKind::Method => {}
    }
    if signature.is_enumerable() {
      return match receiver {
        Some(receiver) => {
          let mut all = Vec::with_capacity(args.len() + 1);
          all.push(receiver.clone());
          all.extend_from_slice(args);
          linq::invoke(signature, &all)
        }
        None => linq::invoke(signature, args),
      };
    }
    match &signature.declaring_type {
      TypeRef::Named { name, .. } if name == "BitConverter" => Ok(math::bit_converter(&signature.name, args)),
      TypeRef::Named { name, .. } if (name == "List" || name == "HashSet") && signature.name == "Add" => {
        match (receiver, args) {
          (Some(receiver), [item]) => Ok(self.add(receiver, item)),
          _ => Ok(None),
        }
      }
      TypeRef::Numeric(_) => math::invoke(signature, args),
      _ if signature.is_math_facade() => math::invoke(signature, args),
      _ => Ok(None),
    }
  }

  fn field_value(&self, signature: &Signature, receiver: Option<&Value>) -> Result<Option<Value>, HostException> {
    let name = signature.name.as_str();
    let Some(receiver) = receiver else {
      if signature.declaring_type.is_named("MidpointRounding") && MIDPOINT_ROUNDING.contains(&name) {
        return Ok(Some(Value::Enum { ty: "MidpointRounding".to_owned(), member: name.to_owned() }));
      }
      return Ok(math::constant(&signature.declaring_type, name));
    };
    let value = match (receiver, name) {
      (Value::String(s), "Length") => Some(Value::Number(Number::Int32(s.encode_utf16().count() as i32))),
      (Value::Sequence(seq), "Length" | "Count") => Some(Value::Number(Number::Int32(seq.items.len() as i32))),
      (Value::Sequence(_), "Key") => linq::grouping_key(receiver),
      (Value::Tuple(items), item) => item.strip_prefix("Item")
        .and_then(|n| n.parse::<usize>().ok())
        .and_then(|n| items.get(n.checked_sub(1)?))
        .cloned(),
      _ => None,
    };
    Ok(value)
  }

  fn tuple_type(&self, arity: usize) -> Option<HostType> {
    if arity == 0 || arity > MAX_TUPLE_ARITY {
      return None;
    }
    Some(HostType {
      name: format!("System.ValueTuple`{arity}"),
      ty: TypeRef::generic("ValueTuple", vec![TypeRef::Object; arity]),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::NumericType;

  fn int(x: i32) -> Value {
    Value::Number(Number::Int32(x))
  }

  #[test]
  fn test_construct_list_and_add() {
    let ty = TypeRef::list(NumericType::Int32.into());
    let loader = InterpretingLoader::new();
    let list = loader.invoke_method(&Signature::constructor(ty.clone(), vec![]), None, &[]).unwrap().unwrap();
    let add = Signature { is_static: false, ..Signature::method(ty, "Add", vec![NumericType::Int32.into()], TypeRef::Void) };
    let list = loader.invoke_method(&add, Some(&list), &[int(4)]).unwrap().unwrap();
    assert_eq!(list.to_expr().unwrap().to_string(), "new List<int> { 4 }");
  }

  #[test]
  fn test_hash_set_drops_duplicates() {
    let ty = TypeRef::generic("HashSet", vec![NumericType::Int32.into()]);
    let source = Value::Sequence(Sequence::array(NumericType::Int32.into(), vec![int(1), int(1), int(2)]));
    let loader = InterpretingLoader::new();
    let set = loader.invoke_method(&Signature::constructor(ty, vec![]), None, &[source]).unwrap().unwrap();
    assert_eq!(set.as_sequence().unwrap().items.len(), 2);
  }

  #[test]
  fn test_field_values() {
    let loader = InterpretingLoader::new();
    let length = Signature::field(TypeRef::String, "Length", NumericType::Int32.into(), false);
    let value = loader.field_value(&length, Some(&Value::String("abc".into()))).unwrap();
    assert_eq!(value, Some(int(3)));
    let pi = Signature::field(TypeRef::named("Math"), "PI", NumericType::Double.into(), true);
    assert_eq!(loader.field_value(&pi, None).unwrap(), Some(Value::Number(Number::Double(std::f64::consts::PI))));
    let item = Signature::field(TypeRef::named("ValueTuple"), "Item2", TypeRef::Bool, false);
    let tuple = Value::Tuple(vec![int(1), Value::Bool(true)]);
    assert_eq!(loader.field_value(&item, Some(&tuple)).unwrap(), Some(Value::Bool(true)));
  }

  #[test]
  fn test_unknown_members_are_not_errors() {
    let loader = InterpretingLoader::new();
    let sig = Signature::method(TypeRef::named("Console"), "WriteLine", vec![], TypeRef::Void);
    assert_eq!(loader.invoke_method(&sig, None, &[]), Ok(None));
    assert_eq!(loader.host_type(&sig), None);
  }

  #[test]
  fn test_tuple_type() {
    let loader = InterpretingLoader::new();
    assert_eq!(loader.tuple_type(2).unwrap().name, "System.ValueTuple`2");
    assert_eq!(loader.tuple_type(8), None);
  }
}
