//! Probe results and their aggregation.

use std::fmt;

use serde::Serialize;

use crate::probe::ProbeKind;

/// How a probe ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeOutcome {
    /// The primitive reported an error or its own timeout.
    Denied,
    /// Nothing settled before the probe budget ran out.
    TimedOut,
    /// The script raised instead of settling with a result.
    Raised,
    /// The success signal fired.
    Allowed,
}

impl ProbeOutcome {
    /// Whether the attempt is counted as blocked.
    pub fn is_blocked(self) -> bool {
        self != ProbeOutcome::Allowed
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Denied => write!(f, "denied"),
            Self::TimedOut => write!(f, "timed-out"),
            Self::Raised => write!(f, "raised"),
            Self::Allowed => write!(f, "allowed"),
        }
    }
}

/// Result of one probe execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub name: String,
    pub kind: ProbeKind,
    pub target: String,
    pub blocked: bool,
    pub outcome: ProbeOutcome,
    pub detail: String,
    pub elapsed_ms: u64,
}

impl ProbeResult {
    /// Whether this result counts as a pass. Strict runs also fail results
    /// whose only evidence of blocking is a raised script.
    pub fn passed(&self, strict: bool) -> bool {
        self.blocked && !(strict && self.outcome == ProbeOutcome::Raised)
    }
}

/// Ordered results of one harness run.
#[derive(Debug, Clone, Default)]
pub struct Scorecard {
    results: Vec<ProbeResult>,
    strict: bool,
}

impl Scorecard {
    pub fn new(strict: bool) -> Self {
        Self {
            results: Vec::new(),
            strict,
        }
    }

    /// Append a result; results keep probe order.
    pub fn record(&mut self, result: ProbeResult) {
        self.results.push(result);
    }

    pub fn results(&self) -> &[ProbeResult] {
        &self.results
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn pass_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed(self.strict)).count()
    }

    pub fn fail_count(&self) -> usize {
        self.total() - self.pass_count()
    }

    /// Whether every probe passed.
    pub fn passed(&self) -> bool {
        self.fail_count() == 0
    }

    /// Results that failed.
    pub fn failures(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter().filter(move |r| !r.passed(self.strict))
    }

    /// `"3 passed, 1 failed"`.
    pub fn summary(&self) -> String {
        format!("{} passed, {} failed", self.pass_count(), self.fail_count())
    }

    /// `"all 4 probes blocked"` or `"1 failed of 4"`.
    pub fn verdict(&self) -> String {
        if self.passed() {
            format!("all {} probes blocked", self.total())
        } else {
            format!("{} failed of {}", self.fail_count(), self.total())
        }
    }

    /// Serializable view with the derived counts.
    pub fn report(&self) -> ScorecardReport<'_> {
        ScorecardReport::from(self)
    }

    /// Process exit code for this run.
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }
}

/// JSON view including the derived counts.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorecardReport<'a> {
    pub passed: bool,
    pub pass_count: usize,
    pub fail_count: usize,
    pub strict: bool,
    pub results: &'a [ProbeResult],
}

impl<'a> From<&'a Scorecard> for ScorecardReport<'a> {
    fn from(card: &'a Scorecard) -> Self {
        Self {
            passed: card.passed(),
            pass_count: card.pass_count(),
            fail_count: card.fail_count(),
            strict: card.strict,
            results: &card.results,
        }
    }
}
