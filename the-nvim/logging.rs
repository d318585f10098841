use std::{
  fs::OpenOptions,
  io::{
    self,
    IsTerminal,
  },
  panic,
  path::Path,
  sync::Arc,
  thread,
};

use anyhow::{
  Context,
  Result,
};
use tracing_subscriber::{
  EnvFilter,
  fmt::writer::BoxMakeWriter,
};

/// Filter used when neither `RUST_LOG` nor the config names one.
pub fn default_filter(verbosity: u8) -> &'static str {
  match verbosity {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  }
}

/// Installs the global subscriber. `RUST_LOG` beats `configured`, which
/// beats the verbosity default.
pub fn init(verbosity: u8, configured: Option<&str>, log_file: Option<&Path>) -> Result<()> {
  let directives = configured.unwrap_or_else(|| default_filter(verbosity));
  let filter = match EnvFilter::try_from_default_env() {
    Ok(filter) => filter,
    Err(_) => EnvFilter::try_new(directives)
      .with_context(|| format!("invalid log filter {directives:?}"))?,
  };

  let (writer, ansi) = match log_file {
    Some(path) => {
      let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;
      (BoxMakeWriter::new(Arc::new(file)), false)
    },
    None => (BoxMakeWriter::new(io::stderr), io::stderr().is_terminal()),
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(ansi)
    .with_target(true)
    .try_init()
    .map_err(|err| anyhow::anyhow!("failed to install log subscriber: {err}"))
}

/// Sends panic reports to the log instead of raw stderr. Handler panics are
/// caught by dispatch and would otherwise print over the UI.
pub fn install_panic_hook() {
  panic::set_hook(Box::new(|info| {
    let thread = thread::current();
    let location = info
      .location()
      .map(|location| location.to_string())
      .unwrap_or_default();
    tracing::error!(
      thread = thread.name().unwrap_or("<unnamed>"),
      %location,
      "panic: {}",
      the_redraw::panic_message(info.payload())
    );
  }));
}
