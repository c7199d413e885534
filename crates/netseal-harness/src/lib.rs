//! Verification harness for the network-isolation boundary.
//!
//! This crate provides:
//! - `Probe` - A scripted attempt to reach the network through one primitive
//! - `battery` - The fixed, ordered probe list
//! - `Scorecard` - Ordered probe results with pass/fail counts
//! - `VerificationHarness` - Loads a bundle and runs the probes one at a time

mod harness;
mod probe;
mod scorecard;

pub use harness::*;
pub use probe::*;
pub use scorecard::*;
