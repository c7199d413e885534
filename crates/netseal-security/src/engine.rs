//! Request decisions and response header injection.

use std::fmt;
use std::sync::Arc;

use http::header::CONTENT_SECURITY_POLICY;
use http::HeaderMap;
use netseal_core::{is_network_scheme, scheme_of};
use serde::Serialize;

use crate::policy::Policy;

/// Outcome of a request decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allow(self) -> bool {
        self == Decision::Allow
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

/// Pure decision logic over an immutable [`Policy`].
///
/// Both operations are side-effect free and safe to call from any thread.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    policy: Arc<Policy>,
}

impl PolicyEngine {
    /// Create an engine over `policy`.
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }

    /// The policy this engine enforces.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Decide whether a request to `url` may proceed.
    ///
    /// A deny-list over network schemes: the bundle uses several local
    /// schemes (`file:`, `data:`, `blob:`) that must keep working. Only the
    /// scheme is inspected, so the cost does not depend on host, path or
    /// query.
    pub fn decide(&self, url: &str) -> Decision {
        match scheme_of(url) {
            Some(scheme) if is_network_scheme(scheme) => Decision::Deny,
            _ => Decision::Allow,
        }
    }

    /// Return `existing` with the policy header set.
    ///
    /// Any policy header already on the response is replaced, so applying
    /// this twice gives the same result as applying it once.
    pub fn headers(&self, existing: &HeaderMap) -> HeaderMap {
        let mut headers = existing.clone();
        headers.insert(CONTENT_SECURITY_POLICY, self.policy.header_value().clone());
        headers
    }
}
