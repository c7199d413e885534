//! netseal CLI - Run and verify the offline bundle host.
//!
//! Commands:
//! - `netseal run` - Load the bundle in an isolated host and hold the session
//! - `netseal verify` - Run the network-isolation probes against the bundle
//! - `netseal policy` - Print the isolation policy and decide URLs against it
//! - `netseal version` - Show bundle version metadata

mod commands;
mod config;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use netseal_observability::LogLevel;

use commands::{PolicyArgs, RunArgs, VerifyArgs, VersionArgs};

/// netseal - Host an offline bundle with no route to the network
#[derive(Parser)]
#[command(name = "netseal")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use JSON output format
    #[arg(long, global = true)]
    json: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the bundle and keep the session open until interrupted
    Run(RunArgs),

    /// Verify that the bundle cannot reach the network
    Verify(VerifyArgs),

    /// Show the isolation policy
    Policy(PolicyArgs),

    /// Show bundle version metadata
    Version(VersionArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let output = output::Output::new(cli.verbose, cli.json);
    let ctx = match context::Context::load(cli.config.as_deref(), output.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            output.error(&format!("{:#}", e));
            std::process::exit(1);
        }
    };

    let mut logging = ctx.config.logging.clone();
    if cli.verbose {
        logging.level = logging.level.min(LogLevel::Debug);
    }
    if let Err(e) = netseal_observability::init(&logging) {
        ctx.output.warn(&format!("logging disabled: {}", e));
    }

    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args, &ctx).await,
        Commands::Verify(args) => commands::verify::run(args, &ctx).await,
        Commands::Policy(args) => commands::policy::run(args, &ctx).await,
        Commands::Version(args) => commands::version::run(args, &ctx).await,
    };

    if let Err(e) = result {
        ctx.output.error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
