//! Error types for hosting and evaluation.

use std::path::PathBuf;
use std::time::Duration;

use netseal_core::UrlError;
use netseal_gate::{GateError, LoadError};
use netseal_security::SandboxConfigError;

use crate::script::ScriptError;

/// Errors from building a host or loading a bundle into it.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("bundle entry document not found: {}", .0.display())]
    EntryMissing(PathBuf),

    #[error("a bundle is already loaded in this host")]
    AlreadyLoaded,

    #[error("invalid sandbox configuration: {0}")]
    Sandbox(#[from] SandboxConfigError),

    #[error("request gate installation failed: {0}")]
    Gate(#[from] GateError),

    #[error("invalid bundle path: {0}")]
    Path(#[from] UrlError),

    #[error("failed to load entry document: {0}")]
    EntryLoad(#[source] LoadError),

    #[error("renderer unavailable: {0}")]
    Renderer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from [`IsolatedHost::evaluate`](crate::IsolatedHost::evaluate).
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("no bundle loaded")]
    NotLoaded,

    #[error("script did not settle within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("evaluation budget must be between 1ms and {}ms, got {}ms", .limit.as_millis(), .requested.as_millis())]
    InvalidTimeout { requested: Duration, limit: Duration },

    #[error("script raised {0}")]
    Script(#[from] ScriptError),

    #[error("renderer stopped before the script settled")]
    RendererGone,
}

impl EvalError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, EvalError::Timeout(_))
    }
}

/// Errors surfaced to bundle script by window primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrimitiveError {
    #[error("invalid URL: {0:?}")]
    Syntax(String),

    #[error("failed to fetch {url}")]
    Network { url: String },

    #[error("navigation to {0} refused")]
    NavigationBlocked(String),

    #[error("{0}")]
    InvalidState(String),
}

impl PrimitiveError {
    /// Script-visible error name.
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveError::Syntax(_) => "SyntaxError",
            PrimitiveError::Network { .. } => "TypeError",
            PrimitiveError::NavigationBlocked(_) => "SecurityError",
            PrimitiveError::InvalidState(_) => "InvalidStateError",
        }
    }
}
