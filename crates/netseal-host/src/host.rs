//! The isolated host and its builder.

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use futures::FutureExt;
use netseal_core::{first_of, Race, ResourceKind, ResourceRequest, ResourceUrl};
use netseal_gate::{Interceptor, Session, Transport};
use netseal_security::{EnforcedPolicies, Policy, PolicyEngine, SandboxConfig, Violation};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::document::Document;
use crate::error::{EvalError, HostError};
use crate::renderer::{Renderer, RendererMode};
use crate::script::{Script, ScriptError};
use crate::window::{ContentWindow, ViolationLog};

/// Name of the bundle's entry document.
pub const ENTRY_DOCUMENT: &str = "index.html";

/// Builder for [`IsolatedHost`].
///
/// The interactive application and the verification harness both build
/// their hosts here, so both get the same gate installed the same way.
pub struct HostBuilder {
    sandbox: SandboxConfig,
    policy: Arc<Policy>,
    interceptor: Option<Arc<dyn Interceptor>>,
    network: Option<Arc<dyn Transport>>,
}

impl HostBuilder {
    pub fn new() -> Self {
        Self {
            sandbox: SandboxConfig::default(),
            policy: Arc::new(Policy::offline()),
            interceptor: None,
            network: None,
        }
    }

    /// Set the sandbox configuration.
    pub fn sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Enforce `policy` instead of the offline policy.
    pub fn policy(mut self, policy: Arc<Policy>) -> Self {
        self.policy = policy;
        self
    }

    /// Install `interceptor` in place of a [`PolicyEngine`] over the policy.
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    /// Serve network schemes with `transport`. Without one, allowed network
    /// requests fail with a load error.
    pub fn network(mut self, transport: Arc<dyn Transport>) -> Self {
        self.network = Some(transport);
        self
    }

    /// Build the host. The gate is installed on a fresh session before the
    /// host can issue any request.
    pub fn build(self) -> Result<IsolatedHost, HostError> {
        self.sandbox.validate()?;

        let mut session = Session::builder().max_redirects(self.sandbox.max_redirects);
        if let Some(network) = self.network {
            session = session.network(network);
        }
        let session = Arc::new(session.build());

        let interceptor: Arc<dyn Interceptor> = match self.interceptor {
            Some(interceptor) => interceptor,
            None => Arc::new(PolicyEngine::new(self.policy.clone())),
        };
        session.gate().install(interceptor)?;

        let renderer = if self.sandbox.renderer_sandbox {
            Renderer::dedicated()?
        } else {
            tracing::warn!("renderer sandbox disabled, scripts share the controller runtime");
            Renderer::shared()?
        };

        Ok(IsolatedHost {
            session,
            sandbox: self.sandbox,
            renderer,
            window: OnceLock::new(),
            loading: AtomicBool::new(false),
            violations: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of loading a bundle.
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// URL of the entry document.
    pub url: String,
    /// Whether the document arrived with a content policy.
    pub policy_enforced: bool,
    /// Referenced resources that loaded.
    pub loaded: usize,
    /// Referenced resources that were refused.
    pub blocked: usize,
    /// Referenced resources that failed for other reasons.
    pub failed: usize,
}

/// Hosts one bundle for its whole lifetime.
pub struct IsolatedHost {
    session: Arc<Session>,
    sandbox: SandboxConfig,
    renderer: Renderer,
    window: OnceLock<ContentWindow>,
    loading: AtomicBool,
    violations: ViolationLog,
}

impl IsolatedHost {
    pub fn builder() -> HostBuilder {
        HostBuilder::new()
    }

    /// Load the bundle rooted at `root`.
    ///
    /// The entry document is fetched through the session, so it passes the
    /// gate and arrives with the policy header; that header becomes the
    /// document's content policy. Referenced resources are loaded the same
    /// way and refusals among them are not errors.
    pub async fn load(&self, root: &Path) -> Result<LoadReport, HostError> {
        let entry = root.join(ENTRY_DOCUMENT);
        let is_file = tokio::fs::metadata(&entry)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(HostError::EntryMissing(entry));
        }
        if self.loading.swap(true, Ordering::AcqRel) {
            return Err(HostError::AlreadyLoaded);
        }

        let entry = tokio::fs::canonicalize(&entry).await?;
        let url = ResourceUrl::from_file_path(&entry)?;
        let response = self
            .session
            .load(ResourceRequest::new(url.clone(), ResourceKind::Document))
            .await
            .map_err(HostError::EntryLoad)?;

        let policies = EnforcedPolicies::from_headers(&response.headers);
        if policies.is_empty() {
            tracing::warn!(url = %url, "entry document delivered without a content policy");
        }
        let document = Document::new(url.clone(), policies, &response.text());
        let subresources = document.subresources().to_vec();
        let policy_enforced = !document.policies().is_empty();

        let window = ContentWindow::new(self.session.clone(), document, self.violations.clone());
        let mut report = LoadReport {
            url: url.to_string(),
            policy_enforced,
            loaded: 0,
            blocked: 0,
            failed: 0,
        };

        for resource in &subresources {
            let before = self.violation_count();
            match window
                .load_subresource(&resource.reference, resource.kind, resource.directive)
                .await
            {
                Ok(()) => report.loaded += 1,
                Err(e) if self.violation_count() > before => {
                    tracing::info!(reference = %resource.reference, error = %e, "sub-resource blocked");
                    report.blocked += 1;
                }
                Err(e) => {
                    tracing::warn!(reference = %resource.reference, error = %e, "sub-resource failed");
                    report.failed += 1;
                }
            }
        }

        // `loading` admits one caller, so the cell is always empty here.
        let _ = self.window.set(window);

        tracing::info!(
            url = %report.url,
            loaded = report.loaded,
            blocked = report.blocked,
            failed = report.failed,
            "bundle loaded"
        );
        Ok(report)
    }

    /// Run `script` in the bundle's context and wait at most `timeout`.
    ///
    /// A script that misses its deadline keeps running unobserved; its late
    /// result is discarded.
    pub async fn evaluate(&self, script: &Script, timeout: Duration) -> Result<Value, EvalError> {
        if timeout.is_zero() || timeout > self.sandbox.max_evaluate_timeout {
            return Err(EvalError::InvalidTimeout {
                requested: timeout,
                limit: self.sandbox.max_evaluate_timeout,
            });
        }
        let window = self.window.get().cloned().ok_or(EvalError::NotLoaded)?;

        let (tx, rx) = oneshot::channel();
        let run = AssertUnwindSafe(script.run(window)).catch_unwind();
        self.renderer.spawn(Box::pin(async move {
            let outcome = match run.await {
                Ok(result) => result,
                Err(panic) => Err(ScriptError::new("InternalError", panic_message(&*panic))),
            };
            let _ = tx.send(outcome);
        }))?;

        match first_of(rx, timeout).await {
            Race::Settled(Ok(result)) => Ok(result?),
            Race::Settled(Err(_)) => Err(EvalError::RendererGone),
            Race::Deadline(elapsed) => {
                tracing::debug!(script = script.name(), "evaluation deadline elapsed");
                Err(EvalError::Timeout(elapsed))
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.window.get().is_some()
    }

    /// URL of the current document, once loaded.
    pub fn document_url(&self) -> Option<ResourceUrl> {
        self.window.get().map(ContentWindow::location)
    }

    /// Blocked attempts recorded so far, oldest first.
    pub fn violations(&self) -> Vec<Violation> {
        self.violations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn sandbox(&self) -> &SandboxConfig {
        &self.sandbox
    }

    pub fn renderer_mode(&self) -> RendererMode {
        self.renderer.mode()
    }

    fn violation_count(&self) -> usize {
        self.violations.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl std::fmt::Debug for IsolatedHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedHost")
            .field("session", &self.session)
            .field("renderer", &self.renderer.mode())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "script panicked".to_string()
    }
}
