//! Verify command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use netseal_gate::{NetworkTimeouts, NetworkTransport};
use netseal_harness::{HarnessConfig, HarnessError, VerificationHarness};
use netseal_host::IsolatedHost;
use netseal_security::SandboxConfig;

use super::VerifyArgs;
use crate::context::Context;

/// Whether the environment asks for the renderer sandbox to be relaxed.
/// `CI` counts when non-empty; `NETSEAL_NO_SANDBOX` counts when set at all.
fn sandbox_relaxed(ci: Option<&str>, no_sandbox: Option<&str>) -> bool {
    ci.is_some_and(|v| !v.is_empty()) || no_sandbox.is_some()
}

/// Run the verify command.
pub async fn run(args: VerifyArgs, ctx: &Context) -> Result<()> {
    let root = ctx.bundle_root(args.bundle.as_deref());

    let ci = std::env::var("CI").ok();
    let no_sandbox = std::env::var("NETSEAL_NO_SANDBOX").ok();
    let mut sandbox = SandboxConfig::default();
    if sandbox_relaxed(ci.as_deref(), no_sandbox.as_deref()) {
        ctx.output.debug("Renderer sandbox relaxed for this environment");
        sandbox = sandbox.without_renderer_sandbox();
    }

    let config = HarnessConfig {
        probe_timeout: args
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| ctx.config.verify.probe_timeout()),
        settle: args
            .settle_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| ctx.config.verify.settle()),
        strict: args.strict || ctx.config.verify.strict,
    };

    let network = NetworkTransport::new(NetworkTimeouts::default())
        .context("Failed to set up network transport")?;
    let host = IsolatedHost::builder()
        .sandbox(sandbox)
        .network(Arc::new(network))
        .build()
        .context("Failed to create isolated host")?;
    let harness = VerificationHarness::new(host, config).context("Failed to prepare probes")?;

    ctx.output.header("Network isolation probes");
    ctx.output.kv("bundle", &root.display().to_string());

    let spinner = ctx.output.spinner("Loading bundle...");
    let strict = config.strict;
    let outcome = harness
        .run_with(&root, |result| {
            let line = ctx.output.probe_line(result, strict);
            if !ctx.output.is_json() {
                spinner.suspend(|| println!("{}", line));
            }
        })
        .await;
    spinner.finish_and_clear();

    let scorecard = match outcome {
        Ok(scorecard) => scorecard,
        Err(HarnessError::Configuration(path)) => {
            bail!("Bundle entry document not found: {}", path.display())
        }
        Err(e) => return Err(e).context("Verification could not run"),
    };

    if ctx.output.is_json() {
        ctx.output.json(&scorecard.report());
    } else {
        for result in scorecard.failures() {
            ctx.output.warn(&format!(
                "{}: {} ({}, {})",
                result.name, result.target, result.outcome, result.detail
            ));
        }
        if scorecard.passed() {
            ctx.output.success(&format!(
                "{} ({})",
                scorecard.verdict(),
                scorecard.summary()
            ));
        }
    }

    if !scorecard.passed() {
        bail!("Network isolation failed: {}", scorecard.verdict());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_relaxation_signal() {
        assert!(!sandbox_relaxed(None, None));
        assert!(!sandbox_relaxed(Some(""), None));
        assert!(sandbox_relaxed(Some("true"), None));
        assert!(sandbox_relaxed(Some("1"), None));
        assert!(sandbox_relaxed(None, Some("")));
        assert!(sandbox_relaxed(None, Some("1")));
    }
}
