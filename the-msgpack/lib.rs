//! # the-msgpack
//!
//! The generic value model of the msgpack serialization used on the wire
//! between the backend and the UI, plus a bounded decoder and an encoder.
//! Markers, length fields and scalars go through `rmp`; this crate owns the
//! value tree and the limits placed on building it.
//!
//! Everything the backend sends is first decoded into a [`Value`]. Decoding
//! is a pure function of the input bytes: it never reads past the buffer,
//! never allocates more than the buffer could possibly describe, and rejects
//! nesting deeper than [`DecodeLimits::max_depth`].
//!
//! ```rust
//! use the_msgpack::{
//!   Value,
//!   decode,
//!   encode,
//! };
//!
//! let value = Value::Array(vec!["grid_clear".into(), Value::Array(vec![1.into()])]);
//! let bytes = encode(&value).unwrap();
//! assert_eq!(decode(&bytes).unwrap(), value);
//! ```

mod decode;
mod encode;
mod value;

pub use decode::{
  DEFAULT_MAX_DEPTH,
  DecodeError,
  DecodeLimits,
  Decoder,
  FrameScanner,
  Reader,
  decode,
  decode_prefix,
  frame_len,
};
pub use encode::{
  EncodeError,
  encode,
  write_value,
};
pub use value::{
  Integer,
  Value,
};
