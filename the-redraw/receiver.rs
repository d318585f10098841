use the_msgpack::{
  DecodeError,
  DecodeLimits,
  Decoder,
  Value,
};
use the_rpc::{
  Message,
  MessageError,
  MessageKind,
};
use thiserror::Error;
use tracing::warn;

use crate::{
  BatchError,
  DispatchReport,
  HandlerRegistry,
  dispatch,
  extract_batch,
};

pub const REDRAW_METHOD: &str = "redraw";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
  /// Notification method this receiver accepts.
  pub method: String,
  pub limits: DecodeLimits,
}

impl Default for ReceiverConfig {
  fn default() -> Self {
    Self {
      method: REDRAW_METHOD.to_owned(),
      limits: DecodeLimits::default(),
    }
  }
}

/// Reasons a whole notification was dropped before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReceiveError {
  #[error("malformed wire format: {0}")]
  Malformed(#[from] DecodeError),
  #[error("not an rpc message: {0}")]
  NotAMessage(#[from] MessageError),
  #[error("expected a notification, got a {0:?}")]
  NotANotification(MessageKind),
  #[error("unexpected notification method {0:?}")]
  UnexpectedMethod(String),
  #[error(transparent)]
  Batch(#[from] BatchError),
}

/// Entry point for raw notification frames from the transport.
///
/// Holds no state between calls besides the shared registry, and runs each
/// notification's decode and dispatch to completion before returning.
pub struct NotificationReceiver<Ctx> {
  registry: HandlerRegistry<Ctx>,
  decoder:  Decoder,
  method:   String,
}

impl<Ctx> NotificationReceiver<Ctx> {
  pub fn new(registry: HandlerRegistry<Ctx>) -> Self {
    Self::with_config(registry, ReceiverConfig::default())
  }

  pub fn with_config(registry: HandlerRegistry<Ctx>, config: ReceiverConfig) -> Self {
    Self {
      registry,
      decoder: Decoder::new(config.limits),
      method: config.method,
    }
  }

  pub fn registry(&self) -> &HandlerRegistry<Ctx> {
    &self.registry
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  /// Decodes one encoded notification and dispatches its batch.
  ///
  /// If the frame is not a well-formed notification for this receiver's
  /// method, nothing is dispatched and the error is logged and returned.
  pub fn on_notification(&self, ctx: &mut Ctx, raw: &[u8]) -> Result<DispatchReport, ReceiveError> {
    self.receive(ctx, raw).inspect_err(|err| {
      warn!(error = %err, len = raw.len(), "dropping notification");
    })
  }

  /// Dispatches the params of an already decoded notification.
  pub fn on_params(&self, ctx: &mut Ctx, params: Value) -> Result<DispatchReport, ReceiveError> {
    let batch = extract_batch(params)?;
    Ok(dispatch(&batch, &self.registry, ctx))
  }

  fn receive(&self, ctx: &mut Ctx, raw: &[u8]) -> Result<DispatchReport, ReceiveError> {
    let value = self.decoder.decode(raw)?;
    let notification = match Message::from_value(value)? {
      Message::Notification(notification) => notification,
      other => return Err(ReceiveError::NotANotification(other.kind())),
    };
    if notification.method != self.method {
      return Err(ReceiveError::UnexpectedMethod(notification.method));
    }
    self.on_params(ctx, Value::Array(notification.params))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn receiver() -> NotificationReceiver<Vec<String>> {
    let registry = HandlerRegistry::new();
    registry.register_fn("flush", |log: &mut Vec<String>, _| {
      log.push("flush".into());
      Ok(())
    });
    NotificationReceiver::new(registry)
  }

  fn flush_batch() -> Vec<Value> {
    vec![Value::Array(vec!["flush".into()])]
  }

  #[test]
  fn other_methods_and_kinds_are_dropped() {
    let receiver = receiver();
    let mut log = Vec::new();

    let raw = Message::notification("nvim_buf_lines_event", flush_batch()).encode().unwrap();
    assert_eq!(
      receiver.on_notification(&mut log, &raw),
      Err(ReceiveError::UnexpectedMethod("nvim_buf_lines_event".into()))
    );

    let raw = Message::request(1, "redraw", flush_batch()).encode().unwrap();
    assert_eq!(
      receiver.on_notification(&mut log, &raw),
      Err(ReceiveError::NotANotification(MessageKind::Request))
    );
    assert!(log.is_empty());
  }

  #[test]
  fn custom_method_is_honored() {
    let registry = receiver().registry().clone();
    let receiver = NotificationReceiver::with_config(registry, ReceiverConfig {
      method: "ui_event".into(),
      ..ReceiverConfig::default()
    });
    let mut log = Vec::new();
    let raw = Message::notification("ui_event", flush_batch()).encode().unwrap();
    assert!(receiver.on_notification(&mut log, &raw).is_ok());
    assert_eq!(log, ["flush"]);
    assert_eq!(receiver.method(), "ui_event");
  }

  #[test]
  fn decode_limits_apply() {
    let registry = HandlerRegistry::<Vec<String>>::new();
    let receiver = NotificationReceiver::with_config(registry, ReceiverConfig {
      limits: DecodeLimits { max_depth: 2 },
      ..ReceiverConfig::default()
    });
    let raw = Message::notification("redraw", flush_batch()).encode().unwrap();
    assert_eq!(
      receiver.on_notification(&mut Vec::new(), &raw),
      Err(ReceiveError::Malformed(DecodeError::DepthLimitExceeded(2)))
    );
  }
}
