//! Request interception and resource loading.
//!
//! This crate provides:
//! - `Interceptor` - Synchronous before-request / headers-received hooks
//! - `RequestGate` - One-shot installation point every request passes through
//! - `Session` - Scheme routing with per-hop gate decisions on redirects
//! - `LocalTransport` - `file:`, `data:` and `blob:` resources
//! - `NetworkTransport` - The real network, reachable only through the gate
//! - `SimulatedNetwork` - An always-reachable stand-in for verification runs

mod gate;
mod interceptor;
mod local;
mod network;
mod session;
mod simulated;
mod transport;

pub use gate::*;
pub use interceptor::*;
pub use local::*;
pub use network::*;
pub use session::*;
pub use simulated::*;
pub use transport::*;
