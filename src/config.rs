//! Vault configuration.
//!
//! Loaded from an optional TOML file. Every field has a default, so an empty
//! file (or no file at all) yields a working configuration. The journal path
//! can be overridden with `MEMO_VAULT_DATA_FILE`.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::persistence::FlushStrategy;
use crate::stores::StaleTokens;
use crate::token::TokenScheme;

pub const DATA_FILE_ENV: &str = "MEMO_VAULT_DATA_FILE";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Journal file holding accounts and memos.
    pub data_file: PathBuf,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    pub persistence: PersistenceConfig,
    pub tokens: TokenConfig,
    pub renewal: RenewalConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub strategy: FlushStrategy,
    /// Rewrite an append-only journal into its minimal form at startup.
    pub compact_on_load: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub scheme: TokenScheme,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RenewalConfig {
    pub stale_tokens: StaleTokens,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("data.txt"),
            log_level: "info".to_string(),
            persistence: PersistenceConfig::default(),
            tokens: TokenConfig::default(),
            renewal: RenewalConfig::default(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            strategy: FlushStrategy::Rewrite,
            compact_on_load: true,
        }
    }
}

/// Loads the configuration from `path`, or defaults when no path is given,
/// then applies environment overrides and validates the result.
pub fn load_config(path: Option<&Path>) -> Result<VaultConfig> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            parse_config(&content)?
        }
        None => VaultConfig::default(),
    };

    if let Ok(data_file) = env::var(DATA_FILE_ENV) {
        config.data_file = PathBuf::from(data_file);
    }

    validate_config(&config)?;
    Ok(config)
}

impl VaultConfig {
    /// Logs the effective settings. Call once a subscriber is installed.
    pub fn log_summary(&self) {
        info!(
            data_file = %self.data_file.display(),
            strategy = ?self.persistence.strategy,
            tokens = ?self.tokens.scheme,
            stale_tokens = ?self.renewal.stale_tokens,
            "Configuration loaded"
        );
    }
}

pub fn parse_config(content: &str) -> Result<VaultConfig> {
    toml::from_str(content).context("Failed to parse vault configuration")
}

fn validate_config(config: &VaultConfig) -> Result<()> {
    anyhow::ensure!(
        !config.data_file.as_os_str().is_empty(),
        "data_file must not be empty"
    );
    anyhow::ensure!(
        !config.data_file.is_dir(),
        "data_file {} is a directory",
        config.data_file.display()
    );
    anyhow::ensure!(!config.log_level.trim().is_empty(), "log_level must not be empty");
    Ok(())
}
