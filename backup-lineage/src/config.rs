//! Configuration management for the lineage agent.
//!
//! Loads configuration from a TOML file. Every section is optional; command
//! line flags override individual fields.

use crate::lineage::{BackupIdentity, PolicyFlags};
use crate::utils::errors::{LineageError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub policy: PolicyFlags,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Client hostname, part of every object name
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Name of the backup set
    #[serde(default)]
    pub backup_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Whether payloads are encrypted before upload
    #[serde(default)]
    pub encrypt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output (stderr, stdout)
    #[serde(default = "default_log_output")]
    pub output: String,
}

// Default values
fn default_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "backup-agent-01".to_string())
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_output() -> String {
    "stderr".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            backup_name: String::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: default_log_output(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| LineageError::Config(format!("{}: {}", path.display(), e)))
    }

    /// The configured backup identity, validated.
    pub fn identity(&self) -> Result<BackupIdentity> {
        BackupIdentity::new(
            self.identity.hostname.clone(),
            self.identity.backup_name.clone(),
        )
    }
}
