//! CLI commands.

pub mod policy;
pub mod run;
pub mod verify;
pub mod version;

use std::path::PathBuf;

use clap::Args;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Bundle directory (default: from config or NETSEAL_BUNDLE).
    #[arg(short, long)]
    pub bundle: Option<PathBuf>,
}

/// Arguments for the verify command.
#[derive(Args)]
pub struct VerifyArgs {
    /// Bundle directory (default: from config or NETSEAL_BUNDLE).
    #[arg(short, long)]
    pub bundle: Option<PathBuf>,

    /// Budget for each probe in milliseconds.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Wait after loading before probing, in milliseconds.
    #[arg(long)]
    pub settle_ms: Option<u64>,

    /// Fail probes that were only blocked by a raised script.
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for the policy command.
#[derive(Args)]
pub struct PolicyArgs {
    /// URLs to decide against the policy.
    pub urls: Vec<String>,
}

/// Arguments for the version command.
#[derive(Args)]
pub struct VersionArgs {
    /// Bundle directory (default: from config or NETSEAL_BUNDLE).
    #[arg(short, long)]
    pub bundle: Option<PathBuf>,
}
