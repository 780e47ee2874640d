//! Client configuration at `~/.cterm/config.toml`.
//!
//! Provides the default dashboard URL and access token. CLI flags always
//! override config file values; the token also falls back to the
//! `CTERM_TOKEN` environment variable.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default connection settings.
    #[serde(default)]
    pub default: DefaultConfig,
}

/// Default connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// Dashboard base URL (empty = none configured).
    #[serde(default)]
    pub dashboard: String,

    /// Access token attached to dashboard requests (empty = anonymous).
    #[serde(default)]
    pub token: String,
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the
    /// file does not exist.
    pub fn load(path: &str) -> Result<Self> {
        let path = Path::new(path);
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}
