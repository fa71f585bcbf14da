//! Application configuration management.
//!
//! Settings are layered with figment, later layers overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. A TOML file: `config.toml` in the platform config directory, or the
//!    path given with `--config`
//! 3. Environment variables prefixed `DEDUPSTORE_` (e.g. `DEDUPSTORE_VERIFY=true`)
//!
//! Command-line flags are applied on top by the caller.
//!
//! # Example
//!
//! ```toml
//! version_prefix = "rev"
//! version_digits = 3
//! verify = true
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::scanner::ScanOptions;
use crate::store::StoreConfig;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "DEDUPSTORE_";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Text placed before the version number in stored names.
    pub version_prefix: String,
    /// Zero-padded width of the version number.
    pub version_digits: usize,
    /// Re-hash every copy after writing it.
    pub verify: bool,
    /// Emit a progress count every this many files.
    pub report_frequency: usize,
    /// Skip dot-files when scanning.
    pub skip_hidden_files: bool,
    /// Skip dot-directories when scanning.
    pub skip_hidden_dirs: bool,
    /// Skip zero-length files when scanning.
    pub skip_zero_len: bool,
    /// Show progress bars.
    pub progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version_prefix: "v".to_string(),
            version_digits: 4,
            verify: false,
            report_frequency: 10,
            skip_hidden_files: false,
            skip_hidden_dirs: false,
            skip_zero_len: true,
            progress: true,
        }
    }
}

impl Config {
    /// Load from the default config file and the environment.
    ///
    /// A broken default file is logged and ignored.
    #[must_use]
    pub fn load() -> Self {
        let file = Self::config_path().filter(|p| p.exists());
        match Self::figment(file.as_deref()).extract() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Failed to load config, using defaults: {}", e);
                Self::figment(None).extract().unwrap_or_default()
            }
        }
    }

    /// Load with an explicit config file.
    ///
    /// # Errors
    ///
    /// Fails if the file does not exist or does not parse.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        Self::figment(Some(path))
            .extract()
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Build the layered provider chain.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Default platform-specific config file location.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "dedupstore", "dedupstore")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Render as TOML, in the same shape the config file uses.
    ///
    /// # Errors
    ///
    /// Fails only if a value cannot be represented in TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }

    /// Scan filters implied by this configuration.
    #[must_use]
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions::default()
            .with_skip_hidden(self.skip_hidden_files, self.skip_hidden_dirs)
            .with_skip_zero_len(self.skip_zero_len)
            .with_report_frequency(self.report_frequency)
    }

    /// Store settings implied by this configuration.
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::default()
            .with_version_prefix(self.version_prefix.clone())
            .with_version_digits(self.version_digits)
            .with_verify(self.verify)
            .with_report_frequency(self.report_frequency)
    }
}
