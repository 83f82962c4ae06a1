//! Per-host outcomes of best-effort remediation steps.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::models::layer::Layer;

/// Result of one step on one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The step did what it was asked to.
    Succeeded,
    /// Nothing to do (e.g. no log directory).
    Skipped,
    /// The step failed; siblings still ran.
    Failed,
}

/// Outcome of one step on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostOutcome {
    /// Configured host name.
    pub host: String,
    /// Layer the step targeted, if any.
    pub layer: Option<Layer>,
    /// Step label, e.g. `kill`, `archive-logs`, `join`.
    pub step: &'static str,
    /// Result.
    pub status: OutcomeStatus,
    /// Human-readable detail.
    pub detail: String,
}

impl HostOutcome {
    /// Successful step.
    #[must_use]
    pub fn succeeded(
        host: &str,
        layer: Option<Layer>,
        step: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(host, layer, step, OutcomeStatus::Succeeded, detail)
    }

    /// Step with nothing to do.
    #[must_use]
    pub fn skipped(
        host: &str,
        layer: Option<Layer>,
        step: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(host, layer, step, OutcomeStatus::Skipped, detail)
    }

    /// Failed step.
    #[must_use]
    pub fn failed(
        host: &str,
        layer: Option<Layer>,
        step: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(host, layer, step, OutcomeStatus::Failed, detail)
    }

    fn new(
        host: &str,
        layer: Option<Layer>,
        step: &'static str,
        status: OutcomeStatus,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            host: host.to_owned(),
            layer,
            step,
            status,
            detail: detail.into(),
        }
    }

    /// Whether this outcome is a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }
}

impl Display for HostOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.layer {
            Some(layer) => write!(f, "{}@{} {}: {}", layer, self.host, self.step, self.detail),
            None => write!(f, "{} {}: {}", self.host, self.step, self.detail),
        }
    }
}

/// Ordered outcomes of a remediation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemediationReport {
    /// Outcomes in the order steps completed.
    pub outcomes: Vec<HostOutcome>,
}

impl RemediationReport {
    /// Empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one outcome.
    pub fn push(&mut self, outcome: HostOutcome) {
        self.outcomes.push(outcome);
    }

    /// Append every outcome of `other`.
    pub fn merge(&mut self, other: RemediationReport) {
        self.outcomes.extend(other.outcomes);
    }

    /// Failed outcomes.
    pub fn failures(&self) -> impl Iterator<Item = &HostOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_failure())
    }

    /// Whether no step failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Outcomes of `step` on `layer`.
    pub fn for_step(&self, step: &str, layer: Layer) -> impl Iterator<Item = &HostOutcome> + '_ {
        let step = step.to_owned();
        self.outcomes
            .iter()
            .filter(move |outcome| outcome.step == step && outcome.layer == Some(layer))
    }

    /// One line per failure, for alerts.
    #[must_use]
    pub fn failure_summary(&self) -> String {
        self.failures()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
