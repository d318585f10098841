use std::io::{
  self,
  Write,
};

use rmp::encode::{
  self as rmp_encode,
  ValueWriteError,
};
use thiserror::Error;

use crate::Value;

pub fn encode(value: &Value) -> Result<Vec<u8>, EncodeError> {
  let mut buf = Vec::new();
  write_value(&mut buf, value)?;
  Ok(buf)
}

/// Writes the smallest encoding of `value` to `wr`.
///
/// Lengths are limited to `u32::MAX` by the format itself.
pub fn write_value<W: Write>(wr: &mut W, value: &Value) -> Result<(), EncodeError> {
  match value {
    Value::Nil => rmp_encode::write_nil(wr)?,
    Value::Bool(b) => rmp_encode::write_bool(wr, *b)?,
    Value::Int(n) => {
      match n.sign_split() {
        Ok(n) => rmp_encode::write_uint(wr, n)?,
        Err(n) => rmp_encode::write_sint(wr, n)?,
      };
    },
    Value::Float(n) => rmp_encode::write_f64(wr, *n)?,
    Value::Str(s) => {
      wire_len("str", s.len())?;
      rmp_encode::write_str(wr, s)?;
    },
    Value::Bin(b) => {
      wire_len("bin", b.len())?;
      rmp_encode::write_bin(wr, b)?;
    },
    Value::Array(items) => {
      rmp_encode::write_array_len(wr, wire_len("array", items.len())?)?;
      for item in items {
        write_value(wr, item)?;
      }
    },
    Value::Map(entries) => {
      rmp_encode::write_map_len(wr, wire_len("map", entries.len())?)?;
      for (key, value) in entries {
        write_value(wr, key)?;
        write_value(wr, value)?;
      }
    },
    Value::Ext(tag, data) => {
      rmp_encode::write_ext_meta(wr, wire_len("ext", data.len())?, *tag)?;
      wr.write_all(data)?;
    },
  }
  Ok(())
}

fn wire_len(kind: &'static str, len: usize) -> Result<u32, EncodeError> {
  u32::try_from(len).map_err(|_| EncodeError::TooLong { kind, len })
}

#[derive(Debug, Error)]
pub enum EncodeError {
  #[error("{kind} of length {len} does not fit a msgpack length field")]
  TooLong { kind: &'static str, len: usize },
  #[error("failed to write msgpack data: {0}")]
  Write(#[from] io::Error),
}

impl From<ValueWriteError<io::Error>> for EncodeError {
  fn from(err: ValueWriteError<io::Error>) -> Self {
    match err {
      ValueWriteError::InvalidMarkerWrite(err) | ValueWriteError::InvalidDataWrite(err) => {
        Self::Write(err)
      },
    }
  }
}
