//! Configuration loading for atomicstore.
//!
//! TOML file + `ATOMICSTORE_*` environment overrides, layered with
//! `figment`, and translation to [`atomicstore::StoreConfig`]. The core
//! crate never reads files or the environment; hand it the result of
//! [`Config::to_store_config`].
//!
//! The environment layer is optional convenience for applications that
//! embed a store. Stores built directly with [`atomicstore::Store::new`]
//! never consult it.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use atomicstore::StoreConfig;

const ENV_PREFIX: &str = "ATOMICSTORE_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config struct ──────────────────────────────────────────────

/// On-disk store settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Enable the store-wide write lock and change notification.
    #[serde(default = "default_lockable")]
    pub lockable: bool,

    /// Name used in log output.
    #[serde(default = "default_label")]
    pub label: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lockable: default_lockable(),
            label: default_label(),
        }
    }
}

fn default_lockable() -> bool {
    true
}
fn default_label() -> String {
    "default".into()
}

impl Config {
    /// Validate and convert into the core crate's settings.
    pub fn to_store_config(&self) -> Result<StoreConfig, ConfigError> {
        if self.label.is_empty() {
            return Err(ConfigError::Validation {
                field: "label".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.label.chars().any(char::is_whitespace) {
            return Err(ConfigError::Validation {
                field: "label".into(),
                reason: format!("must not contain whitespace, got '{}'", self.label),
            });
        }

        Ok(StoreConfig::new(self.lockable).with_label(self.label.clone()))
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "edge", "atomicstore").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("atomicstore");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path` + environment. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if loading fails. The failure is logged.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_else(|err| {
        warn!(error = %err, path = %config_path().display(), "using default config");
        Config::default()
    })
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to the canonical path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

/// Serialize config to TOML and write it to `path`, creating parents.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}
