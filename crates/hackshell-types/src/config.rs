//! Runtime configuration loaded from `hackshell.toml`.
//!
//! Every field has a default, so a missing or empty file yields a usable
//! configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, ShellError};

/// Top-level shell configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Root directory holding one subdirectory per machine.
    pub data_dir: PathBuf,
    /// Machine id the launcher starts on.
    pub default_machine: String,
    /// Working directory used when the user's home does not exist.
    pub start_dir: String,
    pub login_attempts: u32,
    pub ssh_attempts: u32,
    pub sudo_attempts: u32,
    /// Audit journal limits.
    pub log: LogConfig,
}

/// Size limits for the in-game audit journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Rotate a journal file once it grows past this many kilobytes.
    pub max_size_kb: u64,
    /// Number of trailing lines kept after rotation.
    pub max_entries: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("machines"),
            default_machine: "local".to_string(),
            start_dir: "/home".to_string(),
            login_attempts: 5,
            ssh_attempts: 5,
            sudo_attempts: 3,
            log: LogConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_size_kb: 1024,
            max_entries: 2000,
        }
    }
}

impl LogConfig {
    pub fn max_bytes(&self) -> u64 {
        self.max_size_kb.saturating_mul(1024)
    }
}

impl ShellConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ShellError::Config(format!("hackshell.toml: {e}")))
    }

    /// Load a configuration file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ShellError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml(&text)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
