//! Core abstractions for the netseal offline host.
//!
//! This crate provides the fundamental types shared by every layer:
//! - `ResourceUrl` / `Origin` - Scheme-aware URL parsing and resolution
//! - `ResourceRequest` / `ResourceResponse` - What flows through the request gate
//! - `first_of` - First-of-two race between an outcome and a deadline
//! - `VersionInfo` - Bundle version metadata written by the packaging step

mod location;
mod race;
mod request;
mod version;

pub use location::*;
pub use race::*;
pub use request::*;
pub use version::*;

/// Schemes that reach the network. Nothing in the bundle may use them.
pub const NETWORK_SCHEMES: [&str; 4] = ["http", "https", "ws", "wss"];

/// Returns true if `scheme` (any case) is one of [`NETWORK_SCHEMES`].
pub fn is_network_scheme(scheme: &str) -> bool {
    NETWORK_SCHEMES
        .iter()
        .any(|s| s.eq_ignore_ascii_case(scheme))
}
