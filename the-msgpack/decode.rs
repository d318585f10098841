use std::borrow::Cow;

use rmp::{
  Marker,
  decode as rmp_decode,
};
use thiserror::Error;

use crate::{
  Integer,
  Value,
};

/// Containers may nest at most this many levels unless configured otherwise.
pub const DEFAULT_MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
  pub max_depth: usize,
}

impl Default for DecodeLimits {
  fn default() -> Self {
    Self {
      max_depth: DEFAULT_MAX_DEPTH,
    }
  }
}

/// Every way a byte buffer can fail to be a well-formed msgpack value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
  #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
  UnexpectedEof { needed: usize, remaining: usize },
  #[error("reserved tag byte 0x{0:02x}")]
  ReservedTag(u8),
  #[error("nesting exceeds the depth limit of {0}")]
  DepthLimitExceeded(usize),
  #[error("{0} trailing bytes after value")]
  TrailingBytes(usize),
  #[error("expected {expected}, found {found}")]
  TypeMismatch {
    expected: &'static str,
    found:    &'static str,
  },
}

impl DecodeError {
  /// Whether appending more bytes to the input could make it decode.
  pub fn is_incomplete(&self) -> bool {
    matches!(self, Self::UnexpectedEof { .. })
  }
}

/// The tag byte plus its length or immediate payload.
#[derive(Debug, Clone, Copy)]
enum Header {
  Nil,
  Bool(bool),
  Int(Integer),
  Float(f64),
  Str(usize),
  Bin(usize),
  Array(usize),
  Map(usize),
  Ext(i8, usize),
}

impl Header {
  fn kind(&self) -> &'static str {
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

/// Cursor over an encoded buffer.
///
/// All reads are bounds-checked against the bytes that remain; a length
/// field is validated before anything of that size is allocated.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
  buf:         &'a [u8],
  pos:         usize,
  limits:      DecodeLimits,
  /// Items declared by open containers and not yet read. Each needs at
  /// least one of the remaining bytes.
  outstanding: usize,
}

impl<'a> Reader<'a> {
  pub fn new(buf: &'a [u8]) -> Self {
    Self::with_limits(buf, DecodeLimits::default())
  }

  pub fn with_limits(buf: &'a [u8], limits: DecodeLimits) -> Self {
    Self {
      buf,
      pos: 0,
      limits,
      outstanding: 0,
    }
  }

  pub fn position(&self) -> usize {
    self.pos
  }

  pub fn remaining(&self) -> usize {
    self.buf.len() - self.pos
  }

  pub fn is_empty(&self) -> bool {
    self.remaining() == 0
  }

  pub fn read_array_len(&mut self) -> Result<usize, DecodeError> {
    match self.read_header()? {
      Header::Array(len) => Ok(len),
      other => Err(mismatch("array", &other)),
    }
  }

  pub fn read_int(&mut self) -> Result<Integer, DecodeError> {
    match self.read_header()? {
      Header::Int(n) => Ok(n),
      other => Err(mismatch("int", &other)),
    }
  }

  /// Reads a string, replacing invalid UTF-8 sequences.
  pub fn read_str(&mut self) -> Result<Cow<'a, str>, DecodeError> {
    match self.read_header()? {
      Header::Str(len) => Ok(String::from_utf8_lossy(self.take(len)?)),
      other => Err(mismatch("str", &other)),
    }
  }

  pub fn read_value(&mut self) -> Result<Value, DecodeError> {
    self.outstanding = 0;
    self.read_value_at(0)
  }

  fn read_value_at(&mut self, depth: usize) -> Result<Value, DecodeError> {
    let value = match self.read_header()? {
      Header::Nil => Value::Nil,
      Header::Bool(b) => Value::Bool(b),
      Header::Int(n) => Value::Int(n),
      Header::Float(n) => Value::Float(n),
      Header::Str(len) => Value::Str(String::from_utf8_lossy(self.take(len)?).into_owned()),
      Header::Bin(len) => Value::Bin(self.take(len)?.to_vec()),
      Header::Ext(tag, len) => Value::Ext(tag, self.take(len)?.to_vec()),
      Header::Array(len) => {
        let depth = self.enter(depth)?;
        self.claim(len)?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
          self.outstanding -= 1;
          items.push(self.read_value_at(depth)?);
        }
        Value::Array(items)
      },
      Header::Map(len) => {
        let depth = self.enter(depth)?;
        self.claim(len.saturating_mul(2))?;
        let mut entries = Vec::with_capacity(len);
        for _ in 0..len {
          self.outstanding -= 1;
          let key = self.read_value_at(depth)?;
          self.outstanding -= 1;
          let value = self.read_value_at(depth)?;
          entries.push((key, value));
        }
        Value::Map(entries)
      },
    };
    Ok(value)
  }

  fn enter(&self, depth: usize) -> Result<usize, DecodeError> {
    let depth = depth + 1;
    if depth > self.limits.max_depth {
      return Err(DecodeError::DepthLimitExceeded(self.limits.max_depth));
    }
    Ok(depth)
  }

  /// Adds a container's items to the outstanding count. Nested containers
  /// share one budget, so their preallocations never add up to more items
  /// than the buffer has bytes left.
  fn claim(&mut self, items: usize) -> Result<(), DecodeError> {
    self.outstanding = self.outstanding.saturating_add(items);
    self.ensure(self.outstanding)
  }

  fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
    let remaining = self.remaining();
    if needed > remaining {
      return Err(DecodeError::UnexpectedEof { needed, remaining });
    }
    Ok(())
  }

  fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
    self.ensure(len)?;
    let bytes = &self.buf[self.pos..self.pos + len];
    self.pos += len;
    Ok(bytes)
  }

  /// The header of a value cut short inside its marker or length field.
  fn short_header(&self) -> DecodeError {
    let remaining = self.remaining();
    DecodeError::UnexpectedEof {
      needed: remaining + 1,
      remaining,
    }
  }

  fn read_header(&mut self) -> Result<Header, DecodeError> {
    let buf = self.buf;
    let Some(&tag) = buf.get(self.pos) else {
      return Err(self.short_header());
    };
    let mut rd = &buf[self.pos..];
    let header = match Marker::from_u8(tag) {
      Marker::Reserved => return Err(DecodeError::ReservedTag(tag)),
      Marker::Null => {
        rmp_decode::read_nil(&mut rd).map_err(|_| self.short_header())?;
        Header::Nil
      },
      Marker::True | Marker::False => {
        Header::Bool(rmp_decode::read_bool(&mut rd).map_err(|_| self.short_header())?)
      },
      Marker::FixPos(_) | Marker::U8 | Marker::U16 | Marker::U32 | Marker::U64 => {
        let n = rmp_decode::read_int::<u64, _>(&mut rd).map_err(|_| self.short_header())?;
        Header::Int(Integer::from(n))
      },
      Marker::FixNeg(_) | Marker::I8 | Marker::I16 | Marker::I32 | Marker::I64 => {
        let n = rmp_decode::read_int::<i64, _>(&mut rd).map_err(|_| self.short_header())?;
        Header::Int(Integer::from(n))
      },
      Marker::F32 => {
        Header::Float(rmp_decode::read_f32(&mut rd).map_err(|_| self.short_header())? as f64)
      },
      Marker::F64 => Header::Float(rmp_decode::read_f64(&mut rd).map_err(|_| self.short_header())?),
      Marker::FixStr(_) | Marker::Str8 | Marker::Str16 | Marker::Str32 => {
        Header::Str(rmp_decode::read_str_len(&mut rd).map_err(|_| self.short_header())? as usize)
      },
      Marker::Bin8 | Marker::Bin16 | Marker::Bin32 => {
        Header::Bin(rmp_decode::read_bin_len(&mut rd).map_err(|_| self.short_header())? as usize)
      },
      Marker::FixArray(_) | Marker::Array16 | Marker::Array32 => {
        Header::Array(rmp_decode::read_array_len(&mut rd).map_err(|_| self.short_header())? as usize)
      },
      Marker::FixMap(_) | Marker::Map16 | Marker::Map32 => {
        Header::Map(rmp_decode::read_map_len(&mut rd).map_err(|_| self.short_header())? as usize)
      },
      Marker::FixExt1
      | Marker::FixExt2
      | Marker::FixExt4
      | Marker::FixExt8
      | Marker::FixExt16
      | Marker::Ext8
      | Marker::Ext16
      | Marker::Ext32 => {
        let meta = rmp_decode::read_ext_meta(&mut rd).map_err(|_| self.short_header())?;
        Header::Ext(meta.typeid, meta.size as usize)
      },
    };
    self.pos = buf.len() - rd.len();
    Ok(header)
  }
}

fn mismatch(expected: &'static str, found: &Header) -> DecodeError {
  DecodeError::TypeMismatch {
    expected,
    found: found.kind(),
  }
}

/// Decodes buffers into [`Value`]s under a fixed set of limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
  limits: DecodeLimits,
}

impl Decoder {
  pub fn new(limits: DecodeLimits) -> Self {
    Self { limits }
  }

  pub fn limits(&self) -> DecodeLimits {
    self.limits
  }

  /// Decodes exactly one value; trailing bytes are an error.
  pub fn decode(&self, bytes: &[u8]) -> Result<Value, DecodeError> {
    let (value, consumed) = self.decode_prefix(bytes)?;
    if consumed != bytes.len() {
      return Err(DecodeError::TrailingBytes(bytes.len() - consumed));
    }
    Ok(value)
  }

  /// Decodes the first value and reports how many bytes it occupied.
  pub fn decode_prefix(&self, bytes: &[u8]) -> Result<(Value, usize), DecodeError> {
    let mut reader = Reader::with_limits(bytes, self.limits);
    let value = reader.read_value()?;
    Ok((value, reader.position()))
  }
}

pub fn decode(bytes: &[u8]) -> Result<Value, DecodeError> {
  Decoder::default().decode(bytes)
}

pub fn decode_prefix(bytes: &[u8]) -> Result<(Value, usize), DecodeError> {
  Decoder::default().decode_prefix(bytes)
}

/// Length in bytes of the first complete value in `bytes`.
///
/// Returns `Ok(None)` while the value is still incomplete. Nothing is
/// allocated and nesting is walked iteratively. For a buffer that keeps
/// growing, use a [`FrameScanner`] instead.
pub fn frame_len(bytes: &[u8]) -> Result<Option<usize>, DecodeError> {
  FrameScanner::new().scan(bytes)
}

/// Resumable [`frame_len`] over a buffer that grows between calls.
///
/// The scanner remembers the offset and the number of items still expected
/// from the previous call, so a frame delivered in many chunks is walked
/// once rather than once per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameScanner {
  offset:  usize,
  pending: usize,
}

impl Default for FrameScanner {
  fn default() -> Self {
    Self {
      offset:  0,
      pending: 1,
    }
  }
}

impl FrameScanner {
  pub fn new() -> Self {
    Self::default()
  }

  /// Bytes of the current frame already walked.
  pub fn scanned(&self) -> usize {
    self.offset
  }

  /// Continues the walk over `bytes`, which must start with everything
  /// passed to the previous call. Once a frame is complete its length is
  /// returned and the scanner starts over for the next one.
  pub fn scan(&mut self, bytes: &[u8]) -> Result<Option<usize>, DecodeError> {
    let mut reader = Reader::new(bytes);
    reader.pos = self.offset.min(bytes.len());
    while self.pending > 0 {
      let start = reader.pos;
      let header = match reader.read_header() {
        Ok(header) => header,
        Err(err) if err.is_incomplete() => {
          self.offset = start;
          return Ok(None);
        },
        Err(err) => {
          *self = Self::default();
          return Err(err);
        },
      };
      let mut pending = self.pending - 1;
      let skip = match header {
        Header::Str(len) | Header::Bin(len) | Header::Ext(_, len) => len,
        Header::Array(len) => {
          pending = pending.saturating_add(len);
          0
        },
        Header::Map(len) => {
          pending = pending.saturating_add(len.saturating_mul(2));
          0
        },
        Header::Nil | Header::Bool(_) | Header::Int(_) | Header::Float(_) => 0,
      };
      if reader.take(skip).is_err() {
        self.offset = start;
        return Ok(None);
      }
      self.pending = pending;
      self.offset = reader.pos;
    }
    let len = self.offset;
    *self = Self::default();
    Ok(Some(len))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::encode;

  fn sample() -> Value {
    Value::Array(vec![
      2.into(),
      "redraw".into(),
      Value::Array(vec![
        Value::Array(vec!["grid_resize".into(), Value::Array(vec![1.into(), 80.into(), 24.into()])]),
        Value::Array(vec![
          "grid_line".into(),
          Value::Array(vec![
            1.into(),
            0.into(),
            0.into(),
            Value::Array(vec![Value::Array(vec!["héllo".into(), 7.into(), 3.into()])]),
          ]),
        ]),
        Value::Array(vec!["flush".into(), Value::Array(vec![])]),
      ]),
    ])
  }

  #[test]
  fn every_truncation_is_malformed_not_a_crash() {
    let bytes = encode(&sample()).unwrap();
    for missing in 1..=bytes.len() {
      let truncated = &bytes[..bytes.len() - missing];
      let err = decode(truncated).unwrap_err();
      assert!(err.is_incomplete(), "prefix of {} bytes gave {err:?}", truncated.len());
    }
  }

  #[test]
  fn decodes_every_integer_width() {
    let cases: &[(&[u8], Value)] = &[
      (&[0x05], 5.into()),
      (&[0xff], (-1i64).into()),
      (&[0xe0], (-32i64).into()),
      (&[0xcc, 0xc8], 200.into()),
      (&[0xcd, 0x01, 0x00], 256.into()),
      (&[0xce, 0x00, 0x01, 0x00, 0x00], 65536.into()),
      (&[0xcf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff], u64::MAX.into()),
      (&[0xd0, 0x80], (-128i64).into()),
      (&[0xd1, 0xff, 0x00], (-256i64).into()),
      (&[0xd2, 0xff, 0xff, 0x00, 0x00], (-65536i64).into()),
      (&[0xd3, 0x80, 0, 0, 0, 0, 0, 0, 0], i64::MIN.into()),
    ];
    for (bytes, expected) in cases {
      assert_eq!(&decode(bytes).unwrap(), expected, "bytes {bytes:02x?}");
    }
  }

  #[test]
  fn decodes_floats_and_ext() {
    assert_eq!(
      decode(&[0xca, 0x3f, 0x80, 0x00, 0x00]).unwrap(),
      Value::Float(1.0)
    );
    assert_eq!(
      decode(&[0xd4, 0x01, 0x2a]).unwrap(),
      Value::Ext(1, vec![0x2a])
    );
    assert_eq!(
      decode(&[0xc7, 0x02, 0xfe, 0x01, 0x02]).unwrap(),
      Value::Ext(-2, vec![1, 2])
    );
  }

  #[test]
  fn reserved_tag_is_rejected() {
    assert_eq!(decode(&[0xc1]), Err(DecodeError::ReservedTag(0xc1)));
    assert_eq!(decode(&[0x92, 0x01, 0xc1]), Err(DecodeError::ReservedTag(0xc1)));
  }

  #[test]
  fn oversized_length_fails_before_allocating() {
    // array32 claiming four billion elements, followed by a single byte.
    let bytes = [0xdd, 0xff, 0xff, 0xff, 0xff, 0x01];
    assert_eq!(
      decode(&bytes),
      Err(DecodeError::UnexpectedEof {
        needed:    u32::MAX as usize,
        remaining: 1,
      })
    );

    let bytes = [0xdb, 0x7f, 0xff, 0xff, 0xff, b'a'];
    assert!(decode(&bytes).unwrap_err().is_incomplete());

    let bytes = [0xdf, 0x00, 0x00, 0x00, 0x02, 0x01, 0x02];
    assert!(decode(&bytes).unwrap_err().is_incomplete());
  }

  #[test]
  fn nested_claims_share_one_budget() {
    // Two array32 headers each claiming every remaining byte: the outer
    // claim fits, the inner one would double it.
    let len: u32 = 1000;
    let mut bytes = vec![0xdd];
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.push(0xdd);
    bytes.extend_from_slice(&len.to_be_bytes());
    bytes.extend(std::iter::repeat_n(0xc0, len as usize));

    assert_eq!(
      decode(&bytes),
      Err(DecodeError::UnexpectedEof {
        needed:    2 * len as usize - 1,
        remaining: len as usize,
      })
    );

    // A map claims two items per entry against the same budget.
    assert!(decode(&[0x91, 0x81, 0xc0]).unwrap_err().is_incomplete());
    assert_eq!(
      decode(&[0x92, 0x81, 0xc0, 0xc0, 0x90]),
      Ok(Value::Array(vec![
        Value::Map(vec![(Value::Nil, Value::Nil)]),
        Value::Array(vec![]),
      ]))
    );
  }

  #[test]
  fn nesting_is_bounded() {
    let limits = DecodeLimits { max_depth: 4 };
    let decoder = Decoder::new(limits);

    let mut ok = vec![0x91; 3];
    ok.push(0x90);
    assert!(decoder.decode(&ok).is_ok());

    let mut deep = vec![0x91; 4];
    deep.push(0x90);
    assert_eq!(decoder.decode(&deep), Err(DecodeError::DepthLimitExceeded(4)));

    // The default limit holds against a pathological input.
    let mut bomb = vec![0x91; 100_000];
    bomb.push(0xc0);
    assert_eq!(
      decode(&bomb),
      Err(DecodeError::DepthLimitExceeded(DEFAULT_MAX_DEPTH))
    );
  }

  #[test]
  fn trailing_bytes_are_rejected_but_prefix_decodes() {
    assert_eq!(decode(&[0x01, 0x02]), Err(DecodeError::TrailingBytes(1)));
    assert_eq!(decode_prefix(&[0x01, 0x02]), Ok((Value::from(1), 1)));
  }

  #[test]
  fn invalid_utf8_is_replaced() {
    let value = decode(&[0xa3, b'a', 0xff, b'b']).unwrap();
    assert_eq!(value, Value::Str("a\u{fffd}b".into()));
  }

  #[test]
  fn frame_len_splits_a_stream() {
    let first = encode(&sample()).unwrap();
    let second = encode(&Value::Array(vec![1.into(), 3.into(), Value::Nil, "ok".into()])).unwrap();
    let mut stream = first.clone();
    stream.extend_from_slice(&second);

    assert_eq!(frame_len(&stream), Ok(Some(first.len())));
    assert_eq!(frame_len(&stream[first.len()..]), Ok(Some(second.len())));
    for end in 0..first.len() {
      assert_eq!(frame_len(&stream[..end]), Ok(None), "prefix of {end} bytes");
    }
    assert_eq!(frame_len(&[0x91, 0xc1]), Err(DecodeError::ReservedTag(0xc1)));
  }

  #[test]
  fn scanner_resumes_where_it_stopped() {
    let entry = Value::Array(vec![
      "grid_line".into(),
      Value::Array(vec![1.into(), 0.into(), 0.into(), Value::Array(vec![Value::Array(vec!["a".into()])])]),
    ]);
    let frame = encode(&Value::Array(vec![
      2.into(),
      "redraw".into(),
      Value::Array(vec![entry; 50_000]),
    ]))
    .unwrap();

    let mut scanner = FrameScanner::new();
    let mut walked = 0;
    for end in (4096..frame.len()).step_by(4096) {
      assert_eq!(scanner.scan(&frame[..end]), Ok(None));
      // Progress is kept between calls and never passes the data seen.
      assert!(scanner.scanned() >= walked && scanner.scanned() <= end);
      assert!(end - scanner.scanned() < 64, "stalled at {} of {end}", scanner.scanned());
      walked = scanner.scanned();
    }
    assert_eq!(scanner.scan(&frame), Ok(Some(frame.len())));
    assert_eq!(scanner, FrameScanner::new());
  }

  #[test]
  fn scanner_waits_on_a_long_string_without_rescanning() {
    let frame = encode(&Value::Array(vec!["x".repeat(100_000).into()])).unwrap();
    let mut scanner = FrameScanner::new();
    assert_eq!(scanner.scan(&frame[..10]), Ok(None));
    // Parked on the string header until its bytes are all buffered.
    assert_eq!(scanner.scanned(), 1);
    assert_eq!(scanner.scan(&frame[..50_000]), Ok(None));
    assert_eq!(scanner.scanned(), 1);
    assert_eq!(scanner.scan(&frame), Ok(Some(frame.len())));
  }

  #[test]
  fn reader_reads_typed_prefix() {
    let bytes = encode(&sample()).unwrap();
    let mut reader = Reader::new(&bytes);
    assert_eq!(reader.read_array_len(), Ok(3));
    assert_eq!(reader.read_int().map(|n| n.as_u64()), Ok(Some(2)));
    assert_eq!(reader.read_str().as_deref(), Ok("redraw"));
    assert_eq!(
      reader.read_str(),
      Err(DecodeError::TypeMismatch {
        expected: "str",
        found:    "array",
      })
    );
  }
}
