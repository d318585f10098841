use std::fmt;

/// A msgpack integer.
///
/// msgpack integers cover both the full `i64` and the full `u64` range, so a
/// single primitive cannot hold every value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Integer {
  repr: IntRepr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum IntRepr {
  /// Always non-negative.
  Pos(u64),
  /// Always negative.
  Neg(i64),
}

impl Integer {
  pub fn as_i64(self) -> Option<i64> {
    match self.repr {
      IntRepr::Pos(n) => i64::try_from(n).ok(),
      IntRepr::Neg(n) => Some(n),
    }
  }

  pub fn as_u64(self) -> Option<u64> {
    match self.repr {
      IntRepr::Pos(n) => Some(n),
      IntRepr::Neg(_) => None,
    }
  }

  pub fn is_negative(self) -> bool {
    matches!(self.repr, IntRepr::Neg(_))
  }

  /// `Ok` with the value when it is non-negative, `Err` when it is negative.
  pub fn sign_split(self) -> Result<u64, i64> {
    match self.repr {
      IntRepr::Pos(n) => Ok(n),
      IntRepr::Neg(n) => Err(n),
    }
  }

  pub fn as_f64(self) -> f64 {
    match self.repr {
      IntRepr::Pos(n) => n as f64,
      IntRepr::Neg(n) => n as f64,
    }
  }
}

impl From<u64> for Integer {
  fn from(n: u64) -> Self {
    Self {
      repr: IntRepr::Pos(n),
    }
  }
}

impl From<i64> for Integer {
  fn from(n: i64) -> Self {
    if n < 0 {
      Self {
        repr: IntRepr::Neg(n),
      }
    } else {
      Self {
        repr: IntRepr::Pos(n as u64),
      }
    }
  }
}

macro_rules! integer_from {
  ($($unsigned:ty),* ; $($signed:ty),*) => {
    $(
      impl From<$unsigned> for Integer {
        fn from(n: $unsigned) -> Self {
          Self::from(n as u64)
        }
      }
    )*
    $(
      impl From<$signed> for Integer {
        fn from(n: $signed) -> Self {
          Self::from(n as i64)
        }
      }
    )*
  };
}

integer_from!(u8, u16, u32, usize; i8, i16, i32, isize);

impl fmt::Display for Integer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.repr {
      IntRepr::Pos(n) => write!(f, "{n}"),
      IntRepr::Neg(n) => write!(f, "{n}"),
    }
  }
}

/// One decoded unit of the wire format.
///
/// Containers own their children outright. A value is built once per
/// incoming message and dropped after the message has been handled.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
  #[default]
  Nil,
  Bool(bool),
  Int(Integer),
  Float(f64),
  Str(String),
  Bin(Vec<u8>),
  Array(Vec<Value>),
  Map(Vec<(Value, Value)>),
  Ext(i8, Vec<u8>),
}

impl Value {
  pub fn is_nil(&self) -> bool {
    matches!(self, Self::Nil)
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Self::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Self::Int(n) => n.as_i64(),
      _ => None,
    }
  }

  pub fn as_u64(&self) -> Option<u64> {
    match self {
      Self::Int(n) => n.as_u64(),
      _ => None,
    }
  }

  /// Floats, and integers widened to `f64`.
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Float(n) => Some(*n),
      Self::Int(n) => Some(n.as_f64()),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Str(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_bin(&self) -> Option<&[u8]> {
    match self {
      Self::Bin(b) => Some(b),
      _ => None,
    }
  }

  pub fn as_array(&self) -> Option<&[Value]> {
    match self {
      Self::Array(items) => Some(items),
      _ => None,
    }
  }

  pub fn as_map(&self) -> Option<&[(Value, Value)]> {
    match self {
      Self::Map(entries) => Some(entries),
      _ => None,
    }
  }

  pub fn into_array(self) -> Result<Vec<Value>, Self> {
    match self {
      Self::Array(items) => Ok(items),
      other => Err(other),
    }
  }

  pub fn into_string(self) -> Result<String, Self> {
    match self {
      Self::Str(s) => Ok(s),
      other => Err(other),
    }
  }

  /// Looks up a string key in a map value.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self
      .as_map()?
      .iter()
      .find_map(|(k, v)| (k.as_str() == Some(key)).then_some(v))
  }

  /// Short name of the variant, used in diagnostics.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Nil => "nil",
      Self::Bool(_) => "bool",
      Self::Int(_) => "int",
      Self::Float(_) => "float",
      Self::Str(_) => "str",
      Self::Bin(_) => "bin",
      Self::Array(_) => "array",
      Self::Map(_) => "map",
      Self::Ext(..) => "ext",
    }
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Self::Bool(b)
  }
}

macro_rules! value_from_integer {
  ($($ty:ty),*) => {
    $(
      impl From<$ty> for Value {
        fn from(n: $ty) -> Self {
          Self::Int(n.into())
        }
      }
    )*
  };
}

value_from_integer!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, Integer);

impl From<f64> for Value {
  fn from(n: f64) -> Self {
    Self::Float(n)
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Self::Str(s)
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Self::Str(s.to_owned())
  }
}

impl From<Vec<Value>> for Value {
  fn from(items: Vec<Value>) -> Self {
    Self::Array(items)
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Nil => f.write_str("nil"),
      Self::Bool(b) => write!(f, "{b}"),
      Self::Int(n) => write!(f, "{n}"),
      Self::Float(n) => write!(f, "{n}"),
      Self::Str(s) => write!(f, "{s:?}"),
      Self::Bin(b) => write!(f, "<{} bytes>", b.len()),
      Self::Array(items) => {
        f.write_str("[")?;
        for (index, item) in items.iter().enumerate() {
          if index > 0 {
            f.write_str(", ")?;
          }
          write!(f, "{item}")?;
        }
        f.write_str("]")
      },
      Self::Map(entries) => {
        f.write_str("{")?;
        for (index, (key, value)) in entries.iter().enumerate() {
          if index > 0 {
            f.write_str(", ")?;
          }
          write!(f, "{key}: {value}")?;
        }
        f.write_str("}")
      },
      Self::Ext(tag, data) => write!(f, "ext({tag}, <{} bytes>)", data.len()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn integer_covers_both_halves_of_the_range() {
    let big = Integer::from(u64::MAX);
    assert_eq!(big.as_u64(), Some(u64::MAX));
    assert_eq!(big.as_i64(), None);

    let neg = Integer::from(-5i64);
    assert!(neg.is_negative());
    assert_eq!(neg.as_i64(), Some(-5));
    assert_eq!(neg.as_u64(), None);

    // Non-negative signed input normalizes to the positive representation.
    assert_eq!(Integer::from(7i64), Integer::from(7u64));
  }

  #[test]
  fn map_lookup_by_string_key() {
    let map = Value::Map(vec![
      ("rgb".into(), true.into()),
      ("ext_linegrid".into(), false.into()),
    ]);
    assert_eq!(map.get("rgb"), Some(&Value::Bool(true)));
    assert_eq!(map.get("missing"), None);
    assert_eq!(Value::Nil.get("rgb"), None);
  }

  #[test]
  fn display_is_compact() {
    let value = Value::Array(vec!["resize".into(), 80.into(), Value::Nil]);
    assert_eq!(value.to_string(), r#"["resize", 80, nil]"#);
  }
}
