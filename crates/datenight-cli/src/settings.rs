//! `config.toml` layered under `DATENIGHT_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use datenight_client::FlowConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CliConfig {
  /// SQLite file shared by the server and every command.
  pub store_path:     PathBuf,
  /// Browsing context this invocation acts as. Sessions and code verifiers
  /// are kept per context.
  pub context:        String,
  /// Where the app (and its `/auth/callback` page) lives.
  pub app_base_url:   String,
  /// Public base URL of `datenight serve`, used in magic and photo links.
  pub api_base_url:   String,
  pub host:           String,
  pub port:           u16,
  pub signing_secret: String,
  pub flow:           FlowConfig,
}

impl Default for CliConfig {
  fn default() -> Self {
    Self {
      store_path:     PathBuf::from("~/.local/share/datenight/datenight.db"),
      context:        "default".into(),
      app_base_url:   "http://localhost:3000".into(),
      api_base_url:   "http://localhost:5240".into(),
      host:           "127.0.0.1".into(),
      port:           5240,
      signing_secret: "datenight-dev-secret".into(),
      flow:           FlowConfig::default(),
    }
  }
}

impl CliConfig {
  /// Read `path` (optional) and the environment.
  ///
  /// Nested keys use a double underscore: `DATENIGHT_FLOW__JOIN_TIMEOUT_MS`.
  pub fn load(path: &Path) -> Result<Self> {
    let builder = Config::builder()
      .add_source(File::from(path).required(false))
      .add_source(
        Environment::with_prefix("DATENIGHT")
          .prefix_separator("_")
          .separator("__"),
      );
    Self::build(builder)
  }

  fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
    let mut cfg: Self = builder
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise CliConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
