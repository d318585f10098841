//! # the-redraw
//!
//! Routes the backend's batched `redraw` notifications to UI handlers.
//!
//! One notification carries an ordered list of sub-commands such as
//! `grid_resize`, `grid_line` or `flush`. The pipeline is:
//!
//! 1. [`NotificationReceiver::on_notification`] decodes the raw frame.
//! 2. [`extract_batch`] turns the params into a [`Batch`] of [`SubCommand`]s,
//!    skipping entries without a usable name.
//! 3. [`dispatch`] looks each sub-command up in the [`HandlerRegistry`] and
//!    runs its handler, in order, one at a time.
//!
//! Unknown sub-commands are ignored. A handler that fails or panics is
//! reported and the rest of the batch still runs.
//!
//! ```rust
//! use the_msgpack::Value;
//! use the_redraw::{
//!   HandlerRegistry,
//!   NotificationReceiver,
//! };
//! use the_rpc::Message;
//!
//! let registry = HandlerRegistry::<Vec<String>>::new();
//! registry.register_fn("grid_clear", |log, _args| {
//!   log.push("clear".into());
//!   Ok(())
//! });
//!
//! let receiver = NotificationReceiver::new(registry);
//! let raw = Message::notification("redraw", vec![
//!   Value::Array(vec!["grid_clear".into(), Value::Array(vec![1.into()])]),
//!   Value::Array(vec!["mode_change".into()]),
//! ])
//! .encode()
//! .unwrap();
//!
//! let mut log = Vec::new();
//! let report = receiver.on_notification(&mut log, &raw).unwrap();
//! assert_eq!(log, ["clear"]);
//! assert_eq!((report.invoked, report.unknown), (1, 1));
//! ```

mod batch;
mod dispatcher;
mod handler;
mod receiver;
mod registry;

pub use batch::{
  Batch,
  BatchError,
  MalformedReason,
  MalformedSubCommand,
  SubCommand,
  extract_batch,
};
pub use dispatcher::{
  DispatchReport,
  HandlerFailure,
  dispatch,
  panic_message,
};
pub use handler::{
  Args,
  Handler,
  HandlerError,
};
pub use receiver::{
  REDRAW_METHOD,
  NotificationReceiver,
  ReceiveError,
  ReceiverConfig,
};
pub use registry::{
  HandlerRegistry,
  SharedHandler,
};
