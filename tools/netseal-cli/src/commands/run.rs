//! Run command.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use netseal_core::{version_label, VersionInfo};
use netseal_gate::{NetworkTimeouts, NetworkTransport};
use netseal_host::IsolatedHost;
use netseal_security::SandboxConfig;

use super::RunArgs;
use crate::context::Context;

/// Run the run command.
///
/// The interactive session always keeps the renderer sandbox; only `verify`
/// honours the build-environment relaxation.
pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let root = ctx.bundle_root(args.bundle.as_deref());
    let info = VersionInfo::load(&ctx.version_file(&root));
    let label = version_label(info.as_ref());
    tracing::info!(version = %label, bundle = %root.display(), "starting offline host");

    let network = NetworkTransport::new(NetworkTimeouts::default())
        .context("Failed to set up network transport")?;
    let host = IsolatedHost::builder()
        .sandbox(SandboxConfig::default())
        .network(Arc::new(network))
        .build()
        .context("Failed to create isolated host")?;

    let spinner = ctx.output.spinner(&format!("Loading {}...", root.display()));
    let loaded = host.load(&root).await;
    spinner.finish_and_clear();
    let report = loaded.with_context(|| format!("Failed to load bundle from {}", root.display()))?;

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({
            "version": label,
            "url": report.url,
            "policyEnforced": report.policy_enforced,
            "loaded": report.loaded,
            "blocked": report.blocked,
            "failed": report.failed,
        }));
    } else {
        ctx.output.success(&format!("{} loaded offline", label));
        ctx.output.kv("document", &report.url);
        ctx.output.kv(
            "resources",
            &format!(
                "{} loaded, {} blocked, {} failed",
                report.loaded, report.blocked, report.failed
            ),
        );
        if !report.policy_enforced {
            ctx.output.warn("Document arrived without a content policy");
        }
        ctx.output.info("Press Ctrl-C to exit");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    for violation in host.violations() {
        ctx.output.debug(&violation.to_string());
    }
    tracing::info!(blocked = host.violations().len(), "session ended");
    Ok(())
}
