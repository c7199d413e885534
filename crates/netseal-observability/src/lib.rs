//! Observability for netseal.
//!
//! This crate provides:
//! - `LogLevel` / `LogFormat` - Configurable verbosity and output format
//! - `init` - Process-wide `tracing` subscriber writing to stderr

mod logging;

pub use logging::*;
