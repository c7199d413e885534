//! Bundle version metadata written by the packaging step.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version record for the packaged bundle (`version.json`).
///
/// Purely cosmetic: nothing in the policy or harness depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Release version, without a leading `v`.
    #[serde(default)]
    pub version: String,
    /// When the upstream release was published.
    #[serde(default)]
    pub release_date: Option<DateTime<Utc>>,
    /// Upstream release name.
    #[serde(default)]
    pub release_name: Option<String>,
    /// Where the release was published.
    #[serde(default)]
    pub source_url: Option<String>,
    /// When the packaging step downloaded it.
    #[serde(default)]
    pub downloaded_at: Option<DateTime<Utc>>,
}

impl VersionInfo {
    /// Parse a version record from JSON.
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load `path`, treating a missing or malformed file as absent.
    pub fn load(path: &Path) -> Option<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no version metadata");
                return None;
            }
        };

        match Self::parse(&raw) {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed version metadata");
                None
            }
        }
    }

    /// Display label such as `v10.19.4`.
    pub fn label(&self) -> Option<String> {
        let version = self.version.trim().trim_start_matches('v');
        if version.is_empty() {
            None
        } else {
            Some(format!("v{}", version))
        }
    }
}

/// Display label for optional metadata.
pub fn version_label(info: Option<&VersionInfo>) -> String {
    info.and_then(VersionInfo::label)
        .unwrap_or_else(|| "Unknown version".to_string())
}
