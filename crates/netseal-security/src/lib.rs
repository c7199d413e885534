//! Network-isolation policy for the netseal offline host.
//!
//! This crate provides:
//! - `Policy` - Immutable scheme set and ordered content-policy directives
//! - `PolicyEngine` - Scheme deny-list decisions and policy header injection
//! - `ContentPolicy` - Parser and source matcher for the delivered policy header
//! - `SandboxConfig` - Host isolation settings and recorded violations
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use netseal_security::{Decision, Policy, PolicyEngine};
//!
//! let engine = PolicyEngine::new(Arc::new(Policy::offline()));
//! assert_eq!(engine.decide("https://example.com/"), Decision::Deny);
//! assert_eq!(engine.decide("data:text/plain,hi"), Decision::Allow);
//! ```

mod content_policy;
mod engine;
mod policy;
mod sandbox;

pub use content_policy::*;
pub use engine::*;
pub use policy::*;
pub use sandbox::*;
