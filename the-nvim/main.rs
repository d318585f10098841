//! Headless front end for an embedded Neovim.
//!
//! Attaches as a line-grid UI, mirrors the screen in memory through the
//! redraw dispatch engine and, with `--dump`, prints it after every flush.

mod cli;
mod config;
mod grid;
mod logging;
mod session;

use std::process::ExitCode;

use anyhow::{
  Context,
  Result,
};
use clap::Parser;

use crate::{
  cli::Cli,
  config::Config,
  session::Session,
};

fn main() -> ExitCode {
  match run() {
    Ok(code) => ExitCode::from(code),
    Err(err) => {
      tracing::error!("fatal: {err:#}");
      eprintln!("the-nvim: {err:#}");
      ExitCode::FAILURE
    },
  }
}

fn run() -> Result<u8> {
  let cli = Cli::parse();
  let mut config = Config::load(cli.config_file.as_deref())?;
  cli.apply(&mut config);
  logging::init(cli.verbosity, config.log.filter.as_deref(), cli.log_file.as_deref())?;
  logging::install_panic_hook();

  let working_dir = std::env::current_dir().context("failed to read working directory")?;
  let mut session = Session::start(&config, &working_dir, cli.dump)?;
  let exit_code = session.run()?;
  tracing::info!(?exit_code, "backend exited");

  Ok(exit_status(exit_code))
}

/// Mirrors the backend's exit code. A backend killed by a signal, or one
/// whose code does not fit a process status, counts as a failure.
fn exit_status(code: Option<i32>) -> u8 {
  code.and_then(|code| u8::try_from(code).ok()).unwrap_or(FAILURE)
}

const FAILURE: u8 = 1;
