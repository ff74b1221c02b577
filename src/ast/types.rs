
//! Static types as they are spelled in source.

use itertools::Itertools;

use std::fmt::{self, Display, Formatter};

/// The built-in numeric types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NumericType {
  SByte,
  Byte,
  Int16,
  UInt16,
  Int32,
  UInt32,
  Int64,
  UInt64,
  Single,
  Double,
  Decimal,
}

/// A reference to a type, as written in source or as computed by a
/// [`SymbolResolver`](crate::host::SymbolResolver).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
  Numeric(NumericType),
  Bool,
  Char,
  String,
  Object,
  Void,
  Array(Box<TypeRef>),
  /// Any other named type, possibly generic. The name is stored
  /// without its namespace (`Enumerable`, not `System.Linq.Enumerable`).
  Named { name: String, args: Vec<TypeRef> },
}

impl NumericType {
  pub const ALL: [NumericType; 11] = [
    NumericType::SByte,
    NumericType::Byte,
    NumericType::Int16,
    NumericType::UInt16,
    NumericType::Int32,
    NumericType::UInt32,
    NumericType::Int64,
    NumericType::UInt64,
    NumericType::Single,
    NumericType::Double,
    NumericType::Decimal,
  ];

  /// The C# keyword for this type.
  pub fn keyword(self) -> &'static str {
    match self {
      NumericType::SByte => "sbyte",
      NumericType::Byte => "byte",
      NumericType::Int16 => "short",
      NumericType::UInt16 => "ushort",
      NumericType::Int32 => "int",
      NumericType::UInt32 => "uint",
      NumericType::Int64 => "long",
      NumericType::UInt64 => "ulong",
      NumericType::Single => "float",
      NumericType::Double => "double",
      NumericType::Decimal => "decimal",
    }
  }

  /// The runtime type name, without the `System.` namespace.
  pub fn runtime_name(self) -> &'static str {
    match self {
      NumericType::SByte => "SByte",
      NumericType::Byte => "Byte",
      NumericType::Int16 => "Int16",
      NumericType::UInt16 => "UInt16",
      NumericType::Int32 => "Int32",
      NumericType::UInt32 => "UInt32",
      NumericType::Int64 => "Int64",
      NumericType::UInt64 => "UInt64",
      NumericType::Single => "Single",
      NumericType::Double => "Double",
      NumericType::Decimal => "Decimal",
    }
  }

  /// Accepts either the keyword or the runtime name, with or without
  /// the `System.` prefix.
  pub fn from_name(name: &str) -> Option<NumericType> {
    let name = name.strip_prefix("System.").unwrap_or(name);
    NumericType::ALL.into_iter().find(|t| t.keyword() == name || t.runtime_name() == name)
  }

  pub fn is_floating(self) -> bool {
    matches!(self, NumericType::Single | NumericType::Double)
  }

  pub fn is_integer(self) -> bool {
    !matches!(self, NumericType::Single | NumericType::Double | NumericType::Decimal)
  }

  pub fn is_unsigned(self) -> bool {
    matches!(self, NumericType::Byte | NumericType::UInt16 | NumericType::UInt32 | NumericType::UInt64)
  }

  /// The suffix that marks a literal of this type, if the type has one.
  pub fn literal_suffix(self) -> &'static str {
    match self {
      NumericType::UInt32 => "U",
      NumericType::Int64 => "L",
      NumericType::UInt64 => "UL",
      NumericType::Single => "F",
      NumericType::Decimal => "M",
      _ => "",
    }
  }
}

impl TypeRef {
  pub fn named(name: impl Into<String>) -> TypeRef {
    TypeRef::Named { name: name.into(), args: Vec::new() }
  }

  pub fn generic(name: impl Into<String>, args: Vec<TypeRef>) -> TypeRef {
    TypeRef::Named { name: name.into(), args }
  }

  pub fn array(element: TypeRef) -> TypeRef {
    TypeRef::Array(Box::new(element))
  }

  pub fn enumerable(element: TypeRef) -> TypeRef {
    TypeRef::generic("IEnumerable", vec![element])
  }

  pub fn list(element: TypeRef) -> TypeRef {
    TypeRef::generic("List", vec![element])
  }

  /// Parses a keyword or simple type name. Generic and array types
  /// must go through the parser.
  pub fn from_name(name: &str) -> TypeRef {
    if let Some(numeric) = NumericType::from_name(name) {
      return TypeRef::Numeric(numeric);
    }
    match name.strip_prefix("System.").unwrap_or(name) {
      "bool" | "Boolean" => TypeRef::Bool,
      "char" | "Char" => TypeRef::Char,
      "string" | "String" => TypeRef::String,
      "object" | "Object" => TypeRef::Object,
      "void" | "Void" => TypeRef::Void,
      other => TypeRef::named(other),
    }
  }

  pub fn as_numeric(&self) -> Option<NumericType> {
    match self {
      TypeRef::Numeric(t) => Some(*t),
      _ => None,
    }
  }

  pub fn is_numeric(&self) -> bool {
    self.as_numeric().is_some()
  }

  pub fn is_floating(&self) -> bool {
    self.as_numeric().is_some_and(NumericType::is_floating)
  }

  /// True for named types whose name matches, ignoring type
  /// arguments.
  pub fn is_named(&self, expected: &str) -> bool {
    matches!(self, TypeRef::Named { name, .. } if name == expected)
  }

  /// The element type of a sequence type: arrays, and the generic
  /// collection interfaces and classes of one type argument.
  pub fn element_type(&self) -> Option<&TypeRef> {
    match self {
      TypeRef::Array(inner) => Some(inner),
      TypeRef::String => Some(&CHAR),
      TypeRef::Named { name, args } if args.len() == 1 && is_sequence_name(name) => Some(&args[0]),
      TypeRef::Named { name, args } if args.len() == 2 && name == "IGrouping" => Some(&args[1]),
      _ => None,
    }
  }

  pub fn is_sequence(&self) -> bool {
    self.element_type().is_some()
  }

  /// Arrays and lists support `[i]` and a constant-time length.
  pub fn is_indexable(&self) -> bool {
    matches!(self, TypeRef::Array(_)) || self.is_named("List") || self.is_named("IList")
  }

  /// The member that reports the length of an indexable collection.
  pub fn length_member(&self) -> Option<&'static str> {
    match self {
      TypeRef::Array(_) | TypeRef::String => Some("Length"),
      TypeRef::Named { name, .. } if name == "List" || name == "IList" || name == "HashSet" => Some("Count"),
      _ => None,
    }
  }
}

static CHAR: TypeRef = TypeRef::Char;

fn is_sequence_name(name: &str) -> bool {
  matches!(
    name,
    "IEnumerable" | "IOrderedEnumerable" | "List" | "IList" | "ICollection" |
    "IReadOnlyList" | "IReadOnlyCollection" | "HashSet" | "ISet"
  )
}

impl Display for NumericType {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.keyword())
  }
}

impl Display for TypeRef {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      TypeRef::Numeric(t) => write!(f, "{t}"),
      TypeRef::Bool => write!(f, "bool"),
      TypeRef::Char => write!(f, "char"),
      TypeRef::String => write!(f, "string"),
      TypeRef::Object => write!(f, "object"),
      TypeRef::Void => write!(f, "void"),
      TypeRef::Array(inner) => write!(f, "{inner}[]"),
      TypeRef::Named { name, args } if args.is_empty() => write!(f, "{name}"),
      TypeRef::Named { name, args } => write!(f, "{name}<{}>", args.iter().join(", ")),
    }
  }
}

impl From<NumericType> for TypeRef {
  fn from(t: NumericType) -> TypeRef {
    TypeRef::Numeric(t)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_numeric_type_from_name() {
    assert_eq!(NumericType::from_name("double"), Some(NumericType::Double));
    assert_eq!(NumericType::from_name("Double"), Some(NumericType::Double));
    assert_eq!(NumericType::from_name("System.Int32"), Some(NumericType::Int32));
    assert_eq!(NumericType::from_name("Math"), None);
  }

  #[test]
  fn test_display() {
    let ty = TypeRef::generic("Dictionary", vec![TypeRef::String, TypeRef::array(NumericType::Int32.into())]);
    assert_eq!(ty.to_string(), "Dictionary<string, int[]>");
    assert_eq!(TypeRef::from_name("Single").to_string(), "float");
  }

  #[test]
  fn test_element_type() {
    let list = TypeRef::list(NumericType::Int64.into());
    assert_eq!(list.element_type(), Some(&TypeRef::Numeric(NumericType::Int64)));
    assert_eq!(list.length_member(), Some("Count"));
    assert!(list.is_indexable());
    let seq = TypeRef::enumerable(TypeRef::Bool);
    assert_eq!(seq.element_type(), Some(&TypeRef::Bool));
    assert!(!seq.is_indexable());
    assert_eq!(TypeRef::Numeric(NumericType::Double).element_type(), None);
  }
}
