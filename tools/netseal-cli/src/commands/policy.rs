//! Policy command.

use std::sync::Arc;

use anyhow::Result;
use netseal_security::{Policy, PolicyEngine};
use serde::Serialize;

use super::PolicyArgs;
use crate::context::Context;
use crate::output::decision_badge;

#[derive(Serialize)]
struct UrlDecision<'a> {
    url: &'a str,
    decision: netseal_security::Decision,
}

/// Run the policy command.
pub async fn run(args: PolicyArgs, ctx: &Context) -> Result<()> {
    let engine = PolicyEngine::new(Arc::new(Policy::offline()));
    let summary = engine.policy().summary();
    let decisions: Vec<UrlDecision<'_>> = args
        .urls
        .iter()
        .map(|url| UrlDecision {
            url: url.as_str(),
            decision: engine.decide(url),
        })
        .collect();

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({
            "policy": summary,
            "decisions": decisions,
        }));
        return Ok(());
    }

    ctx.output.header("Network isolation policy");
    ctx.output.kv("allowed schemes", &summary.allowed_schemes.join(", "));
    ctx.output.kv("denied schemes", &summary.denied_schemes.join(", "));
    ctx.output.kv("directives", &summary.directives.to_string());

    ctx.output.header("Content-Security-Policy");
    for (name, value) in engine.policy().directives() {
        ctx.output.list_item(&format!("{} {}", name, value));
    }

    if !decisions.is_empty() {
        ctx.output.header("Decisions");
        for d in &decisions {
            println!("  {}  {}", decision_badge(d.decision.is_allow()), d.url);
        }
    }

    Ok(())
}
