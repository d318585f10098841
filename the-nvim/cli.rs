use std::path::PathBuf;

use clap::{
  ArgAction,
  Parser,
};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "the-nvim", about, long_about = None, version)]
pub struct Cli {
  /// Backend executable (overrides `nvim.path`)
  #[arg(long = "nvim", value_name = "PATH")]
  pub nvim: Option<String>,

  /// Load configuration from a specific file
  #[arg(short = 'c', long = "config", value_name = "FILE")]
  pub config_file: Option<PathBuf>,

  /// Increase logging verbosity (repeat for more detail)
  #[arg(short = 'v', action = ArgAction::Count)]
  pub verbosity: u8,

  /// Save logs to a specific file
  #[arg(long = "log", value_name = "FILE")]
  pub log_file: Option<PathBuf>,

  /// Grid width in cells
  #[arg(long)]
  pub width: Option<u16>,

  /// Grid height in cells
  #[arg(long)]
  pub height: Option<u16>,

  /// Print the default grid to stdout after every flush
  #[arg(long)]
  pub dump: bool,

  /// Arguments forwarded to the backend
  #[arg(last = true)]
  pub backend_args: Vec<String>,
}

impl Cli {
  /// Command-line values win over the config file.
  pub fn apply(&self, config: &mut Config) {
    if let Some(nvim) = &self.nvim {
      config.nvim.path = nvim.clone();
    }
    if let Some(width) = self.width {
      config.ui.width = width;
    }
    if let Some(height) = self.height {
      config.ui.height = height;
    }
    config.nvim.args.extend(self.backend_args.iter().cloned());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn flags_override_config() {
    let cli = Cli::parse_from([
      "the-nvim", "--nvim", "/opt/nvim", "--width", "100", "-vv", "--", "--clean", "README.md",
    ]);
    let mut config = Config::default();
    config.nvim.args.push("-n".into());
    cli.apply(&mut config);

    assert_eq!(cli.verbosity, 2);
    assert_eq!(config.nvim.path, "/opt/nvim");
    assert_eq!(config.nvim.args, ["-n", "--clean", "README.md"]);
    assert_eq!((config.ui.width, config.ui.height), (100, 24));
  }
}
