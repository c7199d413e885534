//! End-to-end verification scenarios.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use support::HeadersOnly;
use http::StatusCode;
use netseal_core::{ResourceKind, ResourceRequest, ResourceResponse, ResourceUrl};
use netseal_gate::{LoadError, Session, SimulatedNetwork, Transport, TransportError};
use netseal_harness::{
    HarnessConfig, HarnessError, Probe, ProbeKind, ProbeOutcome, VerificationHarness,
};
use netseal_host::{ContentWindow, IsolatedHost, Script, ScriptError};
use netseal_security::{Policy, PolicyEngine, SandboxConfig};
use serde_json::json;

mod support {
    use http::HeaderMap;
    use netseal_core::{ResourceRequest, ResourceUrl};
    use netseal_gate::Interceptor;
    use netseal_security::{Decision, PolicyEngine};

    /// Allows every request while still delivering the engine's policy
    /// header, leaving the content policy as the only barrier.
    pub struct HeadersOnly(pub PolicyEngine);

    impl Interceptor for HeadersOnly {
        fn before_request(&self, _request: &ResourceRequest) -> Decision {
            Decision::Allow
        }

        fn on_headers_received(&self, _url: &ResourceUrl, headers: &HeaderMap) -> HeaderMap {
            self.0.headers(headers)
        }
    }
}

fn quick() -> HarnessConfig {
    HarnessConfig {
        settle: Duration::ZERO,
        ..HarnessConfig::default()
    }
}

fn bundle() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("index.html"),
        "<!DOCTYPE html><html><head><title>bundle</title></head><body></body></html>",
    )
    .unwrap();
    dir
}

fn guarded_host(network: &SimulatedNetwork) -> IsolatedHost {
    IsolatedHost::builder()
        .network(Arc::new(network.clone()))
        .build()
        .unwrap()
}

/// Policy whose connect-src lets the data-fetch target through.
fn misconfigured_policy() -> Arc<Policy> {
    Arc::new(
        Policy::offline_builder()
            .replace_directive("connect-src", "'self' https://example.com")
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn scenario_a_every_probe_blocked() {
    let bundle = bundle();
    let network = SimulatedNetwork::reachable();
    let harness = VerificationHarness::new(guarded_host(&network), quick()).unwrap();

    let card = harness.run(bundle.path()).await.unwrap();

    assert_eq!(card.pass_count(), 4);
    assert_eq!(card.fail_count(), 0);
    assert_eq!(card.exit_code(), 0);
    assert!(card.results().iter().all(|r| r.blocked));
    assert_eq!(network.attempts(), 0);

    let names: Vec<_> = card.results().iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "data fetch blocked",
            "request object blocked",
            "external image blocked",
            "socket blocked"
        ]
    );
}

#[tokio::test]
async fn scenario_b_missing_entry_document() {
    let empty = tempfile::tempdir().unwrap();
    let harness = VerificationHarness::new(guarded_host(&SimulatedNetwork::reachable()), quick())
        .unwrap();

    let mut seen = 0;
    let err = harness
        .run_with(empty.path(), |_| seen += 1)
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::Configuration(ref p) if p.ends_with("index.html")));
    assert_eq!(seen, 0);
}

#[tokio::test]
async fn scenario_c_misconfigured_content_policy_is_caught() {
    let bundle = bundle();
    let network = SimulatedNetwork::reachable();
    let host = IsolatedHost::builder()
        .interceptor(Arc::new(HeadersOnly(PolicyEngine::new(misconfigured_policy()))))
        .network(Arc::new(network.clone()))
        .build()
        .unwrap();
    let harness = VerificationHarness::new(host, quick()).unwrap();

    let card = harness.run(bundle.path()).await.unwrap();

    assert_eq!(card.fail_count(), 1);
    assert_eq!(card.verdict(), "1 failed of 4");
    assert_eq!(card.summary(), "3 passed, 1 failed");
    assert_eq!(card.exit_code(), 1);

    let failed: Vec<_> = card.failures().collect();
    assert_eq!(failed[0].kind, ProbeKind::DataFetch);
    assert!(!failed[0].blocked);
    assert_eq!(failed[0].outcome, ProbeOutcome::Allowed);
    assert_eq!(network.attempts(), 1);
}

#[tokio::test]
async fn misconfigured_content_policy_still_stopped_by_gate() {
    let bundle = bundle();
    let network = SimulatedNetwork::reachable();
    let host = IsolatedHost::builder()
        .policy(misconfigured_policy())
        .network(Arc::new(network.clone()))
        .build()
        .unwrap();
    let harness = VerificationHarness::new(host, quick()).unwrap();

    let card = harness.run(bundle.path()).await.unwrap();
    assert!(card.passed());
    assert_eq!(network.attempts(), 0);
}

/// A local scheme whose every resource redirects to the network.
struct RedirectingScheme;

#[async_trait::async_trait]
impl Transport for RedirectingScheme {
    async fn send(&self, request: &ResourceRequest) -> Result<ResourceResponse, TransportError> {
        let target = format!("https://example.com{}", request.url.path());
        Ok(ResourceResponse::redirect(StatusCode::FOUND, &target))
    }
}

#[tokio::test]
async fn scenario_d_redirect_to_network_denied_at_hop() {
    let network = SimulatedNetwork::reachable();
    let session = Session::builder()
        .network(Arc::new(network.clone()))
        .register_scheme("bundle", Arc::new(RedirectingScheme))
        .unwrap()
        .build();
    session
        .gate()
        .install(Arc::new(PolicyEngine::new(Arc::new(Policy::offline()))))
        .unwrap();

    let url = ResourceUrl::parse("bundle://app/update.json").unwrap();
    let err = session
        .load(ResourceRequest::new(url, ResourceKind::Fetch))
        .await
        .unwrap_err();

    match err {
        LoadError::Blocked { url, hop } => {
            assert_eq!(url, "https://example.com/update.json");
            assert_eq!(hop, 1);
        }
        other => panic!("expected a blocked hop, got {}", other),
    }
    assert_eq!(network.attempts(), 0);
}

#[tokio::test]
async fn construction_error_and_silent_probe_count_as_blocked() {
    let bundle = bundle();
    let throws = Probe::new(
        "constructor throws",
        ProbeKind::Custom,
        "wss://echo.websocket.events",
        Duration::from_millis(500),
        Script::new("throws", |window: ContentWindow| async move {
            window.open_socket("https://echo.websocket.events")?;
            Ok::<_, ScriptError>(json!({ "ok": true }))
        }),
    )
    .unwrap();
    let silent = Probe::new(
        "never settles",
        ProbeKind::Custom,
        "https://example.com",
        Duration::from_millis(100),
        Script::new("silent", |_window: ContentWindow| async move {
            std::future::pending::<()>().await;
            Ok::<_, ScriptError>(json!({ "ok": true }))
        }),
    )
    .unwrap();

    let harness = VerificationHarness::new(guarded_host(&SimulatedNetwork::reachable()), quick())
        .unwrap()
        .with_probes(vec![throws, silent])
        .unwrap();

    let started = Instant::now();
    let card = harness.run(bundle.path()).await.unwrap();

    assert_eq!(card.results()[0].outcome, ProbeOutcome::Raised);
    assert!(card.results()[0].detail.contains("SyntaxError"));
    assert_eq!(card.results()[1].outcome, ProbeOutcome::TimedOut);
    assert!(card.results().iter().all(|r| r.blocked));
    assert!(card.passed());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn strict_mode_fails_raised_probes() {
    let bundle = bundle();
    let raises = Probe::new(
        "raises",
        ProbeKind::Custom,
        "https://example.com",
        Duration::from_millis(500),
        Script::new("raises", |_window: ContentWindow| async move {
            Err::<serde_json::Value, _>(ScriptError::new("Error", "primitive unsupported"))
        }),
    )
    .unwrap();

    let config = HarnessConfig {
        strict: true,
        ..quick()
    };
    let harness = VerificationHarness::new(guarded_host(&SimulatedNetwork::reachable()), config)
        .unwrap()
        .with_probes(vec![raises])
        .unwrap();

    let card = harness.run(bundle.path()).await.unwrap();
    assert!(card.results()[0].blocked);
    assert_eq!(card.fail_count(), 1);
    assert_eq!(card.exit_code(), 1);
}

#[tokio::test]
async fn probes_run_one_at_a_time() {
    let bundle = bundle();
    let network = SimulatedNetwork::reachable().with_latency(Duration::from_millis(20));
    let harness = VerificationHarness::new(guarded_host(&network), quick()).unwrap();

    let mut order = Vec::new();
    harness
        .run_with(bundle.path(), |r| order.push(r.kind))
        .await
        .unwrap();
    assert_eq!(
        order,
        vec![
            ProbeKind::DataFetch,
            ProbeKind::RequestObject,
            ProbeKind::ImageLoad,
            ProbeKind::Socket
        ]
    );
}

/// Probe that records when its script starts, then settles after `hold` or
/// never settles at all.
fn timed_probe(name: &str, hold: Option<Duration>, starts: Arc<Mutex<Vec<(String, Instant)>>>) -> Probe {
    let label = name.to_string();
    Probe::new(
        name,
        ProbeKind::Custom,
        "https://example.com",
        Duration::from_millis(150),
        Script::new(name, move |_window: ContentWindow| {
            let label = label.clone();
            let starts = starts.clone();
            async move {
                starts.lock().unwrap().push((label, Instant::now()));
                match hold {
                    Some(hold) => tokio::time::sleep(hold).await,
                    None => std::future::pending::<()>().await,
                }
                Ok::<_, ScriptError>(json!({ "ok": false, "err": "blocked" }))
            }
        }),
    )
    .unwrap()
}

#[tokio::test]
async fn each_probe_starts_after_the_previous_one_finishes() {
    let bundle = bundle();
    let starts = Arc::new(Mutex::new(Vec::new()));
    let probes = vec![
        timed_probe("hangs", None, starts.clone()),
        timed_probe("settles", Some(Duration::from_millis(40)), starts.clone()),
        timed_probe("hangs again", None, starts.clone()),
    ];
    let harness = VerificationHarness::new(guarded_host(&SimulatedNetwork::reachable()), quick())
        .unwrap()
        .with_probes(probes)
        .unwrap();

    let mut finished = Vec::new();
    let card = harness
        .run_with(bundle.path(), |r| finished.push((r.name.clone(), Instant::now())))
        .await
        .unwrap();

    let outcomes: Vec<_> = card.results().iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![ProbeOutcome::TimedOut, ProbeOutcome::Denied, ProbeOutcome::TimedOut]
    );

    let starts = starts.lock().unwrap().clone();
    assert_eq!(starts.len(), 3);
    for (i, (name, started)) in starts.iter().enumerate() {
        assert_eq!(name, &finished[i].0);
        assert!(*started <= finished[i].1);
        if i > 0 {
            assert!(
                *started >= finished[i - 1].1,
                "{} started before {} finished",
                name,
                finished[i - 1].0
            );
        }
    }
    // A hung probe holds the next one back for its whole budget.
    assert!(starts[1].1 - starts[0].1 >= Duration::from_millis(100));
}

#[tokio::test]
async fn probe_budget_above_host_limit_is_rejected() {
    let config = HarnessConfig {
        probe_timeout: Duration::from_secs(301),
        ..quick()
    };
    let err = VerificationHarness::new(guarded_host(&SimulatedNetwork::reachable()), config)
        .unwrap_err();
    assert!(matches!(err, HarnessError::InvalidProbe { ref reason, .. } if reason.contains("300000ms")));

    let host = IsolatedHost::builder()
        .sandbox(SandboxConfig::new().with_max_evaluate_timeout(Duration::from_secs(1)))
        .network(Arc::new(SimulatedNetwork::reachable()))
        .build()
        .unwrap();
    let slow = Probe::new(
        "slow",
        ProbeKind::Custom,
        "https://example.com",
        Duration::from_secs(2),
        Script::new("slow", |_window: ContentWindow| async move {
            Ok::<_, ScriptError>(json!({ "ok": false }))
        }),
    )
    .unwrap();
    let err = VerificationHarness::new(host, quick())
        .unwrap()
        .with_probes(vec![slow])
        .unwrap_err();
    match err {
        HarnessError::InvalidProbe { name, reason } => {
            assert_eq!(name, "slow");
            assert!(reason.contains("1000ms"));
        }
        other => panic!("expected an invalid probe, got {}", other),
    }
}

#[tokio::test]
async fn probe_run_before_load_is_an_error() {
    let harness = VerificationHarness::new(guarded_host(&SimulatedNetwork::reachable()), quick())
        .unwrap();
    assert!(!harness.host().is_loaded());
    let probe = harness.probes()[0].clone();

    let err = harness.run_probe(&probe).await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Evaluation { source: netseal_host::EvalError::NotLoaded, .. }
    ));
}

#[tokio::test]
async fn primitive_timeouts_fire_inside_the_probe_budget() {
    let bundle = bundle();
    let network = SimulatedNetwork::hanging();
    let policy = Policy::offline_builder()
        .replace_directive(
            "connect-src",
            "'self' https://api.github.com wss://echo.websocket.events",
        )
        .build()
        .unwrap();
    let host = IsolatedHost::builder()
        .interceptor(Arc::new(HeadersOnly(PolicyEngine::new(Arc::new(policy)))))
        .network(Arc::new(network.clone()))
        .build()
        .unwrap();
    let budget = Duration::from_millis(400);
    let harness = VerificationHarness::new(host, quick())
        .unwrap()
        .with_probes(vec![
            Probe::request_object(budget).unwrap(),
            Probe::socket(budget).unwrap(),
        ])
        .unwrap();

    let card = harness.run(bundle.path()).await.unwrap();

    for result in card.results() {
        assert_eq!(result.outcome, ProbeOutcome::Denied, "{}", result.name);
        assert_eq!(result.detail, "timeout");
        assert!(result.elapsed_ms < 400);
    }
    assert_eq!(network.attempts(), 2);
    assert!(card.passed());
}
