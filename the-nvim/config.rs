use std::{
  path::{
    Path,
    PathBuf,
  },
  sync::OnceLock,
};

use etcetera::base_strategy::{
  BaseStrategy,
  choose_base_strategy,
};
use serde::Deserialize;
use the_msgpack::{
  DEFAULT_MAX_DEPTH,
  DecodeLimits,
};
use the_redraw::{
  REDRAW_METHOD,
  ReceiverConfig,
};
use thiserror::Error;

static CONFIG_DIR: OnceLock<Option<PathBuf>> = OnceLock::new();

/// `$THE_NVIM_CONFIG_DIR`, else the platform config dir joined with
/// `the-nvim`.
pub fn config_dir() -> Option<PathBuf> {
  CONFIG_DIR
    .get_or_init(|| {
      if let Ok(dir) = std::env::var("THE_NVIM_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
      }
      let strategy = choose_base_strategy().ok()?;
      Some(strategy.config_dir().join("the-nvim"))
    })
    .clone()
}

pub fn default_config_file() -> Option<PathBuf> {
  config_dir().map(|dir| dir.join("config.toml"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub nvim: NvimConfig,
  pub ui:   UiConfig,
  pub log:  LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NvimConfig {
  pub path: String,
  pub args: Vec<String>,
}

impl Default for NvimConfig {
  fn default() -> Self {
    Self {
      path: "nvim".to_owned(),
      args: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UiConfig {
  pub width:     u16,
  pub height:    u16,
  pub rgb:       bool,
  /// Deepest container nesting accepted from the backend.
  pub max_depth: usize,
}

impl Default for UiConfig {
  fn default() -> Self {
    Self {
      width:     80,
      height:    24,
      rgb:       true,
      max_depth: DEFAULT_MAX_DEPTH,
    }
  }
}

impl UiConfig {
  pub fn receiver_config(&self) -> ReceiverConfig {
    ReceiverConfig {
      method: REDRAW_METHOD.to_owned(),
      limits: DecodeLimits {
        max_depth: self.max_depth,
      },
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
  /// `tracing_subscriber::EnvFilter` directives, e.g. `the_redraw=debug`.
  pub filter: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Read {
    path:   PathBuf,
    source: std::io::Error,
  },
  #[error("failed to parse {path}: {source}")]
  Parse {
    path:   PathBuf,
    source: toml::de::Error,
  },
}

impl Config {
  /// Loads `explicit` if given, which must exist, else the default config
  /// file if there is one, else the defaults.
  pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
    match explicit {
      Some(path) => Self::from_file(path),
      None => match default_config_file() {
        Some(path) if path.is_file() => Self::from_file(&path),
        _ => Ok(Self::default()),
      },
    }
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }
}
