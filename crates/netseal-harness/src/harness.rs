//! The verification harness.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use netseal_host::{EvalError, HostError, IsolatedHost};
use serde_json::Value;

use crate::probe::{battery, Probe, DEFAULT_PROBE_TIMEOUT};
use crate::scorecard::{ProbeOutcome, ProbeResult, Scorecard};

/// Default wait between bundle load and the first probe.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(800);

/// Errors that stop a verification run before it produces a scorecard.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("bundle entry document not found: {}; package the bundle first", .0.display())]
    Configuration(PathBuf),

    #[error("invalid probe {name}: {reason}")]
    InvalidProbe { name: String, reason: String },

    #[error("failed to start the isolated host: {0}")]
    Host(#[from] HostError),

    #[error("probe {name} could not be evaluated: {source}")]
    Evaluation {
        name: String,
        #[source]
        source: EvalError,
    },
}

/// Harness settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Budget for each probe.
    pub probe_timeout: Duration,
    /// Wait after loading the bundle before probing.
    pub settle: Duration,
    /// Fail probes that were only blocked by a raised script.
    pub strict: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            settle: DEFAULT_SETTLE,
            strict: false,
        }
    }
}

/// Runs the probe battery against its own isolated host.
#[derive(Debug)]
pub struct VerificationHarness {
    host: IsolatedHost,
    config: HarnessConfig,
    probes: Vec<Probe>,
}

impl VerificationHarness {
    /// Create a harness running the standard battery.
    ///
    /// Fails if the probe budget exceeds what the host will evaluate.
    pub fn new(host: IsolatedHost, config: HarnessConfig) -> Result<Self, HarnessError> {
        let probes = battery(config.probe_timeout)?;
        check_budgets(&host, &probes)?;
        Ok(Self {
            host,
            config,
            probes,
        })
    }

    /// Replace the probe list.
    pub fn with_probes(mut self, probes: Vec<Probe>) -> Result<Self, HarnessError> {
        check_budgets(&self.host, &probes)?;
        self.probes = probes;
        Ok(self)
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub fn host(&self) -> &IsolatedHost {
        &self.host
    }

    /// Load the bundle and run every probe.
    pub async fn run(&self, bundle: &Path) -> Result<Scorecard, HarnessError> {
        self.run_with(bundle, |_| {}).await
    }

    /// Like [`run`](Self::run), reporting each result as it is recorded.
    pub async fn run_with<F>(&self, bundle: &Path, mut on_result: F) -> Result<Scorecard, HarnessError>
    where
        F: FnMut(&ProbeResult),
    {
        match self.host.load(bundle).await {
            Ok(_) => {}
            Err(HostError::EntryMissing(path)) => return Err(HarnessError::Configuration(path)),
            Err(e) => return Err(e.into()),
        }

        if !self.config.settle.is_zero() {
            tokio::time::sleep(self.config.settle).await;
        }

        let mut scorecard = Scorecard::new(self.config.strict);
        for probe in &self.probes {
            let result = self.run_probe(probe).await?;
            on_result(&result);
            scorecard.record(result);
        }

        if scorecard.passed() {
            tracing::info!(summary = %scorecard.summary(), "isolation verified");
        } else {
            tracing::error!(summary = %scorecard.summary(), verdict = %scorecard.verdict(), "isolation verification failed");
        }
        Ok(scorecard)
    }

    /// Run one probe. Anything the probe's script does becomes part of the
    /// result; only a host that could not evaluate it at all is an error.
    pub async fn run_probe(&self, probe: &Probe) -> Result<ProbeResult, HarnessError> {
        let started = Instant::now();
        let evaluated = self.host.evaluate(probe.script(), probe.timeout()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let (outcome, detail) = classify(evaluated).map_err(|source| HarnessError::Evaluation {
            name: probe.name().to_string(),
            source,
        })?;
        let result = ProbeResult {
            name: probe.name().to_string(),
            kind: probe.kind(),
            target: probe.target().to_string(),
            blocked: outcome.is_blocked(),
            outcome,
            detail,
            elapsed_ms,
        };

        if result.blocked {
            tracing::info!(
                probe = %result.name,
                target = %result.target,
                outcome = %result.outcome,
                elapsed_ms,
                "probe blocked"
            );
        } else {
            tracing::warn!(
                probe = %result.name,
                target = %result.target,
                elapsed_ms,
                "probe reached the network"
            );
        }
        Ok(result)
    }
}

fn check_budgets(host: &IsolatedHost, probes: &[Probe]) -> Result<(), HarnessError> {
    let limit = host.sandbox().max_evaluate_timeout;
    match probes.iter().find(|p| p.timeout() > limit) {
        Some(probe) => Err(HarnessError::InvalidProbe {
            name: probe.name().to_string(),
            reason: format!(
                "timeout {}ms exceeds the evaluation limit of {}ms",
                probe.timeout().as_millis(),
                limit.as_millis()
            ),
        }),
        None => Ok(()),
    }
}

/// Map an evaluation onto a probe outcome. Errors that mean the script never
/// ran are returned as-is: they prove nothing about the network.
fn classify(evaluated: Result<Value, EvalError>) -> Result<(ProbeOutcome, String), EvalError> {
    Ok(match evaluated {
        Ok(value) => match value.get("ok").and_then(Value::as_bool) {
            Some(true) => (ProbeOutcome::Allowed, "allowed".to_string()),
            Some(false) => {
                let detail = value
                    .get("err")
                    .and_then(Value::as_str)
                    .unwrap_or("blocked")
                    .to_string();
                (ProbeOutcome::Denied, detail)
            }
            None => (ProbeOutcome::Raised, format!("unrecognised probe result: {}", value)),
        },
        Err(EvalError::Timeout(budget)) => (
            ProbeOutcome::TimedOut,
            format!("no result within {}ms", budget.as_millis()),
        ),
        Err(e) => return Err(e),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use netseal_host::ScriptError;

    #[test]
    fn test_classify() {
        assert_eq!(classify(Ok(json!({ "ok": true }))).unwrap().0, ProbeOutcome::Allowed);
        assert_eq!(
            classify(Ok(json!({ "ok": false, "err": "timeout" }))).unwrap(),
            (ProbeOutcome::Denied, "timeout".to_string())
        );
        assert_eq!(
            classify(Ok(json!({ "ok": false }))).unwrap(),
            (ProbeOutcome::Denied, "blocked".to_string())
        );
        assert_eq!(classify(Ok(json!(42))).unwrap().0, ProbeOutcome::Raised);
        assert_eq!(
            classify(Err(EvalError::Timeout(Duration::from_millis(1500)))).unwrap(),
            (ProbeOutcome::TimedOut, "no result within 1500ms".to_string())
        );
        assert_eq!(
            classify(Err(EvalError::Script(ScriptError::new("TypeError", "x"))))
                .unwrap()
                .0,
            ProbeOutcome::Raised
        );
    }

    #[test]
    fn test_classify_rejects_host_failures() {
        let rejected = classify(Err(EvalError::InvalidTimeout {
            requested: Duration::from_secs(301),
            limit: Duration::from_secs(300),
        }));
        assert!(matches!(rejected, Err(EvalError::InvalidTimeout { .. })));
        assert!(matches!(classify(Err(EvalError::NotLoaded)), Err(EvalError::NotLoaded)));
        assert!(matches!(
            classify(Err(EvalError::RendererGone)),
            Err(EvalError::RendererGone)
        ));
    }

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert_eq!(config.probe_timeout, Duration::from_millis(1500));
        assert_eq!(config.settle, Duration::from_millis(800));
        assert!(!config.strict);
    }
}
