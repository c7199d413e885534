//! Sandbox settings for the isolated host.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Isolation settings an isolated host is created with.
///
/// Bundle script only ever sees a `ContentWindow`, so there is no switch for
/// exposing host capabilities; unknown keys are rejected rather than ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SandboxConfig {
    /// Run bundle script on a dedicated renderer thread with its own runtime.
    pub renderer_sandbox: bool,
    /// Maximum redirect hops followed for a single request.
    pub max_redirects: u32,
    /// Longest budget `evaluate` accepts.
    pub max_evaluate_timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            renderer_sandbox: true,
            max_redirects: 20,
            max_evaluate_timeout: Duration::from_secs(300),
        }
    }
}

impl SandboxConfig {
    /// Create a sandbox config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run bundle script on the controller's runtime instead of a dedicated
    /// renderer. For build environments that cannot spawn the renderer; the
    /// network policy is unaffected.
    pub fn without_renderer_sandbox(mut self) -> Self {
        self.renderer_sandbox = false;
        self
    }

    /// Set the redirect hop limit.
    pub fn with_max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    /// Set the longest accepted evaluation budget.
    pub fn with_max_evaluate_timeout(mut self, timeout: Duration) -> Self {
        self.max_evaluate_timeout = timeout;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), SandboxConfigError> {
        if self.max_redirects == 0 || self.max_redirects > 20 {
            return Err(SandboxConfigError::InvalidRedirectLimit(self.max_redirects));
        }

        if self.max_evaluate_timeout.is_zero() {
            return Err(SandboxConfigError::InvalidTimeout);
        }

        Ok(())
    }
}

/// Errors in sandbox configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxConfigError {
    #[error("redirect limit must be between 1 and 20, got {0}")]
    InvalidRedirectLimit(u32),

    #[error("evaluation timeout limit must be greater than 0")]
    InvalidTimeout,
}

/// Which layer stopped an outbound attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnforcementLayer {
    /// The policy header delivered with the document.
    ContentPolicy,
    /// Request interception in the session.
    RequestGate,
    /// Top-level navigation guard.
    Navigation,
}

/// A blocked outbound attempt, as recorded by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Layer that blocked the attempt.
    pub layer: EnforcementLayer,
    /// Directive or rule that matched.
    pub rule: String,
    /// Target of the attempt.
    pub url: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let layer = match self.layer {
            EnforcementLayer::ContentPolicy => "content policy",
            EnforcementLayer::RequestGate => "request gate",
            EnforcementLayer::Navigation => "navigation guard",
        };
        write!(f, "{} ({}) blocked {}", layer, self.rule, self.url)
    }
}
