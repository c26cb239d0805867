//! Loads `~/.stackrunner/config.toml`.
//!
//! ```toml
//! [runner]
//! server_binary = "${HOME}/.local/bin/stack-json-errors"
//! run_on_save = true
//! exclude = ["*.yaml", "*.cabal"]
//! timeout_ms = 300000
//! ```
//!
//! A missing file is not an error; every field has a default.

use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::Deserialize;
use stackrunner_build::RunnerConfig;
use thiserror::Error;

/// Overrides `runner.server_binary` when set and non-blank.
pub const SERVER_BINARY_ENV: &str = "STACKRUNNER_SERVER_BINARY";

#[derive(Debug, Default, Deserialize)]
pub struct StackRunnerConfig {
    pub runner: Option<RunnerConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

impl StackRunnerConfig {
    /// Load from the default location. `Ok(None)` when there is no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {}: {source}", path.display());
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(source) => {
                tracing::warn!("Failed to parse config at {}: {source}", path.display());
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Effective runner settings: `${VAR}` references in `server_binary`
    /// expanded, then the environment override applied.
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        resolve_runner(self.runner.clone(), env::var(SERVER_BINARY_ENV).ok())
    }
}

fn resolve_runner(runner: Option<RunnerConfig>, binary_override: Option<String>) -> RunnerConfig {
    let mut runner = runner.unwrap_or_default();
    runner.server_binary = runner.server_binary.as_deref().map(expand_env_vars);

    if let Some(binary) = binary_override.filter(|b| !b.trim().is_empty()) {
        tracing::debug!("{SERVER_BINARY_ENV} overrides configured server_binary");
        runner.server_binary = Some(binary);
    }
    runner
}

/// Replace `${VAR}` with the variable's value. Unset variables become empty;
/// an unclosed `${` is kept literally.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".stackrunner").join("config.toml"))
}
