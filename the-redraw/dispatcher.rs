use std::{
  any::Any,
  panic::{
    AssertUnwindSafe,
    catch_unwind,
  },
};

use thiserror::Error;
use tracing::{
  debug,
  trace,
  warn,
};

use crate::{
  Batch,
  HandlerError,
  HandlerRegistry,
  SubCommand,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler for {command} (index {index}) failed: {error}")]
pub struct HandlerFailure {
  pub index:   usize,
  pub command: String,
  pub error:   HandlerError,
}

/// What happened to each sub-command of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
  /// Handlers that ran, including ones that failed.
  pub invoked:   usize,
  /// Sub-commands with no registered handler.
  pub unknown:   usize,
  pub failed:    Vec<HandlerFailure>,
  /// Entries dropped while extracting the batch.
  pub malformed: usize,
}

impl DispatchReport {
  pub fn is_clean(&self) -> bool {
    self.failed.is_empty() && self.malformed == 0
  }
}

/// Runs every sub-command of `batch` against `registry`, strictly in order.
///
/// Each handler runs to completion before the next lookup. Missing handlers
/// are skipped. A handler error or panic is recorded for that entry only and
/// the remaining entries still run.
pub fn dispatch<Ctx>(batch: &Batch, registry: &HandlerRegistry<Ctx>, ctx: &mut Ctx) -> DispatchReport {
  let mut report = DispatchReport {
    malformed: batch.warnings.len(),
    ..DispatchReport::default()
  };
  for warning in &batch.warnings {
    warn!(index = warning.index, reason = %warning.reason, "skipping malformed sub-command");
  }

  for (index, command) in batch.iter().enumerate() {
    let Some(handler) = registry.lookup(&command.name) else {
      trace!(command = %command.name, "no handler registered");
      report.unknown += 1;
      continue;
    };

    report.invoked += 1;
    if let Err(error) = invoke(command, ctx, |ctx| handler.handle(ctx, &command.args)) {
      warn!(command = %command.name, index, error = %error, "sub-command handler failed");
      report.failed.push(HandlerFailure {
        index,
        command: command.name.clone(),
        error,
      });
    }
  }

  debug!(
    invoked = report.invoked,
    unknown = report.unknown,
    failed = report.failed.len(),
    malformed = report.malformed,
    "dispatched batch"
  );
  report
}

fn invoke<Ctx>(
  command: &SubCommand,
  ctx: &mut Ctx,
  call: impl FnOnce(&mut Ctx) -> Result<(), HandlerError>,
) -> Result<(), HandlerError> {
  match catch_unwind(AssertUnwindSafe(|| call(ctx))) {
    Ok(result) => result,
    Err(payload) => {
      trace!(command = %command.name, "caught handler panic");
      Err(HandlerError::Panicked(panic_message(payload.as_ref())))
    },
  }
}

/// Text of a panic payload, for payloads raised with a message.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_owned()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "non-string panic payload".to_owned()
  }
}

#[cfg(test)]
mod tests {
  use the_msgpack::Value;

  use super::*;

  #[test]
  fn panics_are_contained_to_their_entry() {
    let registry = HandlerRegistry::<Vec<String>>::new();
    registry.register_fn("boom", |_, _| panic!("index out of bounds"));
    registry.register_fn("ok", |log, _| {
      log.push("ok".into());
      Ok(())
    });

    let batch = Batch::from_commands(vec![
      SubCommand::new("boom", vec![]),
      SubCommand::new("ok", vec![]),
    ]);
    let mut log = Vec::new();
    let report = dispatch(&batch, &registry, &mut log);

    assert_eq!(log, ["ok"]);
    assert_eq!(report.invoked, 2);
    assert_eq!(
      report.failed,
      vec![HandlerFailure {
        index:   0,
        command: "boom".into(),
        error:   HandlerError::Panicked("index out of bounds".into()),
      }]
    );
  }

  #[test]
  fn formatted_panics_keep_their_message() {
    let registry = HandlerRegistry::<()>::new();
    registry.register_fn("grid_line", |_, args: &[Value]| panic!("row {}", args.len()));

    let batch = Batch::from_commands(vec![SubCommand::new("grid_line", vec![Value::Nil])]);
    let report = dispatch(&batch, &registry, &mut ());
    assert_eq!(report.failed[0].error, HandlerError::Panicked("row 1".into()));
    assert!(!report.is_clean());
  }
}
