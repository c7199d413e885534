//! CLI configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use netseal_harness::{DEFAULT_PROBE_TIMEOUT, DEFAULT_SETTLE};
use netseal_observability::LogConfig;
use serde::{Deserialize, Serialize};

/// CLI configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Bundle location.
    #[serde(default)]
    pub bundle: BundleConfig,

    /// Verification settings.
    #[serde(default)]
    pub verify: VerifyConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LogConfig,
}

impl CliConfig {
    /// Load config from a file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path))
        }
    }
}

/// Where the bundle lives. Relative paths resolve against the config file's
/// directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Bundle directory holding `index.html`.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Version metadata; defaults to `version.json` beside the bundle directory.
    #[serde(default)]
    pub version_file: Option<PathBuf>,
}

fn default_root() -> PathBuf {
    PathBuf::from("bundle/app")
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            version_file: None,
        }
    }
}

/// Probe settings for `verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyConfig {
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Fail probes that were blocked only by a raised script.
    #[serde(default)]
    pub strict: bool,
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT.as_millis() as u64
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE.as_millis() as u64
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            settle_ms: default_settle_ms(),
            strict: false,
        }
    }
}

impl VerifyConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}
