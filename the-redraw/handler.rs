use the_msgpack::Value;
use thiserror::Error;

/// Why a handler could not apply its sub-command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
  #[error("expected {expected} arguments, found {found}")]
  Arity { expected: usize, found: usize },
  #[error("missing argument {0}")]
  MissingArgument(usize),
  #[error("argument {index} should be {expected}, found {found}")]
  ArgumentType {
    index:    usize,
    expected: &'static str,
    found:    &'static str,
  },
  #[error("{0}")]
  Invalid(String),
  #[error("handler panicked: {0}")]
  Panicked(String),
}

impl HandlerError {
  pub fn invalid(message: impl Into<String>) -> Self {
    Self::Invalid(message.into())
  }
}

/// Behavior bound to one sub-command name.
///
/// `Ctx` is the state the owning session threads through dispatch. Handlers
/// should only update that state in memory; painting happens later.
pub trait Handler<Ctx>: Send + Sync {
  fn handle(&self, ctx: &mut Ctx, args: &[Value]) -> Result<(), HandlerError>;
}

impl<Ctx, F> Handler<Ctx> for F
where
  F: Fn(&mut Ctx, &[Value]) -> Result<(), HandlerError> + Send + Sync,
{
  fn handle(&self, ctx: &mut Ctx, args: &[Value]) -> Result<(), HandlerError> {
    (self)(ctx, args)
  }
}

/// Positional view over a sub-command's arguments with typed getters.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
  values: &'a [Value],
}

impl<'a> Args<'a> {
  pub fn new(values: &'a [Value]) -> Self {
    Self { values }
  }

  /// Treats `value` as a nested argument tuple found at `index`.
  pub fn nested(value: &'a Value, index: usize) -> Result<Self, HandlerError> {
    value
      .as_array()
      .map(Self::new)
      .ok_or_else(|| type_error(index, "array", value))
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn as_slice(&self) -> &'a [Value] {
    self.values
  }

  pub fn expect_len(&self, expected: usize) -> Result<(), HandlerError> {
    if self.values.len() != expected {
      return Err(HandlerError::Arity {
        expected,
        found: self.values.len(),
      });
    }
    Ok(())
  }

  pub fn value(&self, index: usize) -> Result<&'a Value, HandlerError> {
    self
      .values
      .get(index)
      .ok_or(HandlerError::MissingArgument(index))
  }

  pub fn i64(&self, index: usize) -> Result<i64, HandlerError> {
    let value = self.value(index)?;
    value.as_i64().ok_or_else(|| type_error(index, "int", value))
  }

  pub fn u64(&self, index: usize) -> Result<u64, HandlerError> {
    let value = self.value(index)?;
    value
      .as_u64()
      .ok_or_else(|| type_error(index, "non-negative int", value))
  }

  pub fn usize(&self, index: usize) -> Result<usize, HandlerError> {
    let n = self.u64(index)?;
    usize::try_from(n).map_err(|_| HandlerError::invalid(format!("argument {index} out of range: {n}")))
  }

  pub fn bool(&self, index: usize) -> Result<bool, HandlerError> {
    let value = self.value(index)?;
    value.as_bool().ok_or_else(|| type_error(index, "bool", value))
  }

  pub fn str(&self, index: usize) -> Result<&'a str, HandlerError> {
    let value = self.value(index)?;
    value.as_str().ok_or_else(|| type_error(index, "str", value))
  }

  pub fn array(&self, index: usize) -> Result<Args<'a>, HandlerError> {
    Self::nested(self.value(index)?, index)
  }

  pub fn iter(&self) -> std::slice::Iter<'a, Value> {
    self.values.iter()
  }
}

fn type_error(index: usize, expected: &'static str, found: &Value) -> HandlerError {
  HandlerError::ArgumentType {
    index,
    expected,
    found: found.kind(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn typed_getters_report_position_and_kind() {
    let values = vec![Value::from(3), "x".into(), Value::Array(vec![true.into()])];
    let args = Args::new(&values);

    assert_eq!(args.i64(0), Ok(3));
    assert_eq!(args.str(1), Ok("x"));
    assert_eq!(args.array(2).and_then(|inner| inner.bool(0)), Ok(true));
    assert_eq!(
      args.i64(1),
      Err(HandlerError::ArgumentType {
        index:    1,
        expected: "int",
        found:    "str",
      })
    );
    assert_eq!(args.str(7), Err(HandlerError::MissingArgument(7)));
    assert_eq!(
      args.expect_len(2),
      Err(HandlerError::Arity {
        expected: 2,
        found:    3,
      })
    );
  }

  #[test]
  fn negative_numbers_are_not_unsigned() {
    let values = vec![Value::from(-1i64)];
    let args = Args::new(&values);
    assert_eq!(args.i64(0), Ok(-1));
    assert!(matches!(
      args.usize(0),
      Err(HandlerError::ArgumentType { index: 0, .. })
    ));
  }

  #[test]
  fn closures_are_handlers() {
    let handler = |count: &mut usize, args: &[Value]| {
      *count += args.len();
      Ok::<(), HandlerError>(())
    };
    let mut count = 0;
    Handler::handle(&handler, &mut count, &[Value::Nil, Value::Nil]).unwrap();
    assert_eq!(count, 2);
  }
}
