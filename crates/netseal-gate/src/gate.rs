//! The single interception point of a session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use http::HeaderMap;
use netseal_core::{ResourceRequest, ResourceUrl};
use netseal_security::Decision;

use crate::interceptor::Interceptor;

/// Errors from gate installation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("request gate is already installed")]
    AlreadyInstalled,

    #[error("request gate installed after the first resource load")]
    InstalledAfterFirstLoad,
}

/// Gate every request and response of a session passes through.
///
/// The interceptor is installed exactly once, before the first request.
/// Until then every request is denied, and once any request has been seen a
/// late installation is refused.
pub struct RequestGate {
    interceptor: OnceLock<Arc<dyn Interceptor>>,
    first_request_seen: AtomicBool,
}

impl RequestGate {
    /// Create an empty gate.
    pub fn new() -> Self {
        Self {
            interceptor: OnceLock::new(),
            first_request_seen: AtomicBool::new(false),
        }
    }

    /// Install the interceptor.
    pub fn install(&self, interceptor: Arc<dyn Interceptor>) -> Result<(), GateError> {
        if self.first_request_seen.load(Ordering::Acquire) {
            return Err(GateError::InstalledAfterFirstLoad);
        }
        self.interceptor
            .set(interceptor)
            .map_err(|_| GateError::AlreadyInstalled)?;
        tracing::debug!("request gate installed");
        Ok(())
    }

    /// Whether an interceptor is installed.
    pub fn is_installed(&self) -> bool {
        self.interceptor.get().is_some()
    }

    /// Decide a request hop.
    pub fn check(&self, request: &ResourceRequest) -> Decision {
        self.first_request_seen.store(true, Ordering::Release);
        match self.interceptor.get() {
            Some(interceptor) => interceptor.before_request(request),
            None => {
                tracing::warn!(url = %request.url, "request before gate installation, denying");
                Decision::Deny
            }
        }
    }

    /// Rewrite response headers on their way to content.
    pub fn filter_response(&self, url: &ResourceUrl, headers: &HeaderMap) -> HeaderMap {
        match self.interceptor.get() {
            Some(interceptor) => interceptor.on_headers_received(url, headers),
            None => headers.clone(),
        }
    }

    /// Decide a top-level navigation requested by content.
    ///
    /// Content may only navigate within local files.
    pub fn check_navigation(&self, url: &ResourceUrl) -> Decision {
        if url.scheme() == "file" {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

impl Default for RequestGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RequestGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGate")
            .field("installed", &self.is_installed())
            .field(
                "first_request_seen",
                &self.first_request_seen.load(Ordering::Relaxed),
            )
            .finish()
    }
}
