//! The interception seam between the session and the policy.

use http::HeaderMap;
use netseal_core::{ResourceRequest, ResourceUrl};
use netseal_security::{Decision, PolicyEngine};

/// Hooks the session calls for every request and every response.
///
/// Both hooks run synchronously on the load path and must not block on I/O.
pub trait Interceptor: Send + Sync {
    /// Decide whether `request` may proceed. Called once per redirect hop.
    fn before_request(&self, request: &ResourceRequest) -> Decision;

    /// Rewrite the headers of a response before content sees them.
    fn on_headers_received(&self, url: &ResourceUrl, headers: &HeaderMap) -> HeaderMap;
}

impl Interceptor for PolicyEngine {
    fn before_request(&self, request: &ResourceRequest) -> Decision {
        self.decide(request.url.as_str())
    }

    fn on_headers_received(&self, _url: &ResourceUrl, headers: &HeaderMap) -> HeaderMap {
        self.headers(headers)
    }
}
