//! msgpack-rpc plumbing between the UI and an embedded backend process.

mod message;
mod transport;

pub use message::{
  Message,
  MessageError,
  MessageHeader,
  MessageKind,
  Notification,
  Request,
  RequestIds,
  Response,
};
pub use transport::{
  MAX_FRAME_BYTES,
  StdioTransport,
  TransportError,
  TransportEvent,
};
