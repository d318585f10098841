use std::borrow::Cow;

use the_msgpack::{
  DecodeError,
  EncodeError,
  Reader,
  Value,
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
  Request,
  Response,
  Notification,
}

impl MessageKind {
  fn from_tag(tag: u64) -> Option<Self> {
    match tag {
      0 => Some(Self::Request),
      1 => Some(Self::Response),
      2 => Some(Self::Notification),
      _ => None,
    }
  }

  fn tag(self) -> u64 {
    match self {
      Self::Request => 0,
      Self::Response => 1,
      Self::Notification => 2,
    }
  }

  fn arity(self) -> usize {
    match self {
      Self::Request | Self::Response => 4,
      Self::Notification => 3,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
  pub id:     u32,
  pub method: String,
  pub params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
  pub id:     u32,
  pub error:  Value,
  pub result: Value,
}

impl Response {
  pub fn is_error(&self) -> bool {
    !self.error.is_nil()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
  pub method: String,
  pub params: Vec<Value>,
}

/// One msgpack-rpc message: `[0, id, method, params]`,
/// `[1, id, error, result]` or `[2, method, params]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
  Request(Request),
  Response(Response),
  Notification(Notification),
}

impl Message {
  pub fn request(id: u32, method: impl Into<String>, params: Vec<Value>) -> Self {
    Self::Request(Request {
      id,
      method: method.into(),
      params,
    })
  }

  pub fn notification(method: impl Into<String>, params: Vec<Value>) -> Self {
    Self::Notification(Notification {
      method: method.into(),
      params,
    })
  }

  pub fn response_ok(id: u32, result: Value) -> Self {
    Self::Response(Response {
      id,
      error: Value::Nil,
      result,
    })
  }

  /// Error responses carry `[0, message]`, the shape the backend uses for
  /// its own exceptions.
  pub fn response_err(id: u32, message: impl Into<String>) -> Self {
    Self::Response(Response {
      id,
      error: Value::Array(vec![0.into(), Value::Str(message.into())]),
      result: Value::Nil,
    })
  }

  pub fn kind(&self) -> MessageKind {
    match self {
      Self::Request(_) => MessageKind::Request,
      Self::Response(_) => MessageKind::Response,
      Self::Notification(_) => MessageKind::Notification,
    }
  }

  pub fn id(&self) -> Option<u32> {
    match self {
      Self::Request(request) => Some(request.id),
      Self::Response(response) => Some(response.id),
      Self::Notification(_) => None,
    }
  }

  pub fn from_value(value: Value) -> Result<Self, MessageError> {
    let fields = value
      .into_array()
      .map_err(|other| MessageError::NotAnArray(other.kind()))?;
    let mut fields = fields.into_iter();
    let kind = fields
      .next()
      .and_then(|tag| tag.as_u64())
      .and_then(MessageKind::from_tag)
      .ok_or(MessageError::UnknownKind)?;
    let found = fields.len() + 1;
    if found != kind.arity() {
      return Err(MessageError::Arity {
        kind,
        expected: kind.arity(),
        found,
      });
    }

    let message = match kind {
      MessageKind::Request => Self::Request(Request {
        id:     read_id(fields.next())?,
        method: read_method(fields.next())?,
        params: read_params(fields.next())?,
      }),
      MessageKind::Response => Self::Response(Response {
        id:     read_id(fields.next())?,
        error:  fields.next().unwrap_or_default(),
        result: fields.next().unwrap_or_default(),
      }),
      MessageKind::Notification => Self::Notification(Notification {
        method: read_method(fields.next())?,
        params: read_params(fields.next())?,
      }),
    };
    Ok(message)
  }

  pub fn into_value(self) -> Value {
    let tag = Value::from(self.kind().tag());
    let fields = match self {
      Self::Request(request) => vec![
        tag,
        request.id.into(),
        request.method.into(),
        request.params.into(),
      ],
      Self::Response(response) => vec![tag, response.id.into(), response.error, response.result],
      Self::Notification(notification) => {
        vec![tag, notification.method.into(), notification.params.into()]
      },
    };
    Value::Array(fields)
  }

  pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
    Self::from_value(the_msgpack::decode(bytes)?)
  }

  pub fn encode(self) -> Result<Vec<u8>, EncodeError> {
    the_msgpack::encode(&self.into_value())
  }
}

fn read_id(value: Option<Value>) -> Result<u32, MessageError> {
  value
    .and_then(|id| id.as_u64())
    .and_then(|id| u32::try_from(id).ok())
    .ok_or(MessageError::InvalidField("msgid"))
}

fn read_method(value: Option<Value>) -> Result<String, MessageError> {
  value
    .and_then(|method| method.into_string().ok())
    .ok_or(MessageError::InvalidField("method"))
}

fn read_params(value: Option<Value>) -> Result<Vec<Value>, MessageError> {
  value
    .and_then(|params| params.into_array().ok())
    .ok_or(MessageError::InvalidField("params"))
}

/// Kind and method of a frame, read without decoding the params.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader<'a> {
  pub kind:   MessageKind,
  pub id:     Option<u32>,
  pub method: Option<Cow<'a, str>>,
}

impl<'a> MessageHeader<'a> {
  pub fn peek(bytes: &'a [u8]) -> Result<Self, MessageError> {
    let mut reader = Reader::new(bytes);
    let len = reader.read_array_len()?;
    let kind = reader
      .read_int()?
      .as_u64()
      .and_then(MessageKind::from_tag)
      .ok_or(MessageError::UnknownKind)?;
    if len != kind.arity() {
      return Err(MessageError::Arity {
        kind,
        expected: kind.arity(),
        found: len,
      });
    }

    let id = match kind {
      MessageKind::Request | MessageKind::Response => {
        let id = reader
          .read_int()?
          .as_u64()
          .and_then(|id| u32::try_from(id).ok())
          .ok_or(MessageError::InvalidField("msgid"))?;
        Some(id)
      },
      MessageKind::Notification => None,
    };
    let method = match kind {
      MessageKind::Request | MessageKind::Notification => Some(reader.read_str()?),
      MessageKind::Response => None,
    };
    Ok(Self { kind, id, method })
  }

  pub fn is_notification(&self, method: &str) -> bool {
    self.kind == MessageKind::Notification && self.method.as_deref() == Some(method)
  }
}

/// Allocates request ids; wraps around after `u32::MAX`.
#[derive(Debug, Default)]
pub struct RequestIds {
  next: u32,
}

impl RequestIds {
  pub fn next(&mut self) -> u32 {
    let id = self.next;
    self.next = self.next.wrapping_add(1);
    id
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
  #[error("malformed message: {0}")]
  Decode(#[from] DecodeError),
  #[error("message must be an array, found {0}")]
  NotAnArray(&'static str),
  #[error("unknown message type")]
  UnknownKind,
  #[error("{kind:?} must have {expected} fields, found {found}")]
  Arity {
    kind:     MessageKind,
    expected: usize,
    found:    usize,
  },
  #[error("invalid {0} field")]
  InvalidField(&'static str),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn messages_survive_the_wire() {
    let messages = [
      Message::request(7, "nvim_ui_attach", vec![80.into(), 24.into(), Value::Map(vec![])]),
      Message::response_ok(7, Value::Nil),
      Message::response_err(3, "not implemented"),
      Message::notification("redraw", vec![Value::Array(vec!["flush".into()])]),
    ];
    for message in messages {
      assert_eq!(Message::decode(&message.clone().encode().unwrap()), Ok(message));
    }
  }

  #[test]
  fn rejects_bad_shapes() {
    assert_eq!(
      Message::from_value(Value::from(2)),
      Err(MessageError::NotAnArray("int"))
    );
    assert_eq!(
      Message::from_value(Value::Array(vec![9.into(), "x".into(), Value::Array(vec![])])),
      Err(MessageError::UnknownKind)
    );
    assert_eq!(
      Message::from_value(Value::Array(vec![2.into(), "redraw".into()])),
      Err(MessageError::Arity {
        kind:     MessageKind::Notification,
        expected: 3,
        found:    2,
      })
    );
    assert_eq!(
      Message::from_value(Value::Array(vec![2.into(), 5.into(), Value::Array(vec![])])),
      Err(MessageError::InvalidField("method"))
    );
  }

  #[test]
  fn header_peek_reads_only_the_prefix() {
    let bytes = Message::notification("redraw", vec![Value::Array(vec!["flush".into()])]).encode().unwrap();
    let header = MessageHeader::peek(&bytes).unwrap();
    assert!(header.is_notification("redraw"));
    assert!(!header.is_notification("nvim_buf_lines_event"));
    assert_eq!(header.id, None);

    // The params may be cut off entirely; the header is still readable.
    let header = MessageHeader::peek(&bytes[..9]).unwrap();
    assert_eq!(header.method.as_deref(), Some("redraw"));

    let bytes = Message::request(42, "vim_get_api_info", vec![]).encode().unwrap();
    let header = MessageHeader::peek(&bytes).unwrap();
    assert_eq!(header.kind, MessageKind::Request);
    assert_eq!(header.id, Some(42));

    let bytes = Message::response_ok(5, Value::Nil).encode().unwrap();
    let header = MessageHeader::peek(&bytes).unwrap();
    assert_eq!((header.kind, header.id, header.method), (MessageKind::Response, Some(5), None));
  }

  #[test]
  fn request_ids_increase() {
    let mut ids = RequestIds::default();
    assert_eq!((ids.next(), ids.next(), ids.next()), (0, 1, 2));
  }
}
