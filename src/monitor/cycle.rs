//! The monitoring cycle state machine and its periodic driver.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::pipeline::Pipeline;
use crate::alerts::AlertKind;
use crate::config::GlobalConfig;
use crate::context::{CycleContext, Services};
use crate::remediation::primitives::{PollBudget, KILL_GRACE};
use crate::remediation::report::RemediationReport;

/// States of one monitoring cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// Cycle created.
    Init,
    /// Resolving the reference node.
    ResolveReference,
    /// Fetching the latest snapshot.
    FetchSnapshot,
    /// Operator forced a full restart.
    ForceBranch,
    /// Running the restart conditions.
    EvaluateConditions,
    /// Running an orchestrator.
    Remediating,
    /// Closing open alerts.
    CloseAlerts,
    /// Cycle finished normally.
    Idle,
    /// Cycle aborted or remediation failed.
    Error,
}

impl CycleState {
    /// Stable label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ResolveReference => "resolve_reference",
            Self::FetchSnapshot => "fetch_snapshot",
            Self::ForceBranch => "force_branch",
            Self::EvaluateConditions => "evaluate_conditions",
            Self::Remediating => "remediating",
            Self::CloseAlerts => "close_alerts",
            Self::Idle => "idle",
            Self::Error => "error",
        }
    }
}

impl Display for CycleState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CycleOutcome {
    /// No condition fired.
    Healthy,
    /// Remediation ran without failures.
    Remediated {
        /// Condition that fired.
        reason: String,
        /// Scope that was restarted.
        scope: String,
    },
    /// Remediation finished but some hosts failed a step.
    RemediatedWithFailures {
        /// Condition that fired.
        reason: String,
        /// Scope that was restarted.
        scope: String,
        /// One line per failed step.
        detail: String,
    },
    /// Remediation errored.
    RemediationFailed {
        /// Condition that fired.
        reason: String,
        /// What went wrong.
        detail: String,
    },
    /// Reference or snapshot could not be obtained.
    Aborted {
        /// What went wrong.
        detail: String,
    },
}

impl CycleOutcome {
    /// Short label for status output.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Remediated { .. } => "remediated",
            Self::RemediatedWithFailures { .. } => "remediated-with-failures",
            Self::RemediationFailed { .. } => "remediation-failed",
            Self::Aborted { .. } => "aborted",
        }
    }
}

/// Everything that happened in one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Cycle identifier.
    pub cycle_id: String,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// States visited, in order.
    pub transitions: Vec<CycleState>,
    /// Final outcome.
    pub outcome: CycleOutcome,
    /// Per-host outcomes when remediation ran.
    pub remediation: Option<RemediationReport>,
}

impl CycleReport {
    fn new(cycle_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            started_at,
            transitions: vec![CycleState::Init],
            outcome: CycleOutcome::Healthy,
            remediation: None,
        }
    }

    fn enter(&mut self, state: CycleState) {
        info!(state = %state, "cycle state");
        self.transitions.push(state);
    }

    /// Last state visited.
    #[must_use]
    pub fn final_state(&self) -> CycleState {
        self.transitions.last().copied().unwrap_or(CycleState::Init)
    }

    /// Compact view for the status command.
    #[must_use]
    pub fn summary(&self) -> CycleSummary {
        CycleSummary {
            cycle_id: self.cycle_id.clone(),
            started_at: self.started_at,
            final_state: self.final_state(),
            outcome: self.outcome.label().to_owned(),
        }
    }
}

/// Last-cycle view served over IPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    /// Cycle identifier.
    pub cycle_id: String,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Final state.
    pub final_state: CycleState,
    /// Outcome label.
    pub outcome: String,
}

/// One-shot operator switch for a full restart.
#[derive(Debug, Clone, Default)]
pub struct ForceRestartSwitch(Arc<AtomicBool>);

impl ForceRestartSwitch {
    /// Request a forced restart on the next cycle.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a forced restart is pending.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consume the pending request.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Drives monitoring cycles against the configured metagraph.
pub struct Monitor {
    config: Arc<GlobalConfig>,
    services: Arc<Services>,
    force: ForceRestartSwitch,
    poll: PollBudget,
    kill_grace: Duration,
    last: Mutex<Option<CycleSummary>>,
}

impl Monitor {
    /// Monitor with the default polling and kill timings.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, services: Arc<Services>) -> Self {
        Self {
            config,
            services,
            force: ForceRestartSwitch::default(),
            poll: PollBudget::default(),
            kill_grace: KILL_GRACE,
            last: Mutex::new(None),
        }
    }

    /// Override polling and kill timings.
    #[must_use]
    pub fn with_timings(mut self, poll: PollBudget, kill_grace: Duration) -> Self {
        self.poll = poll;
        self.kill_grace = kill_grace;
        self
    }

    /// Handle to the one-shot force switch.
    #[must_use]
    pub fn force_switch(&self) -> ForceRestartSwitch {
        self.force.clone()
    }

    /// Summary of the most recent cycle.
    pub async fn last_summary(&self) -> Option<CycleSummary> {
        self.last.lock().await.clone()
    }

    /// Run one cycle with the standard conditions.
    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_with(Pipeline::standard(self.config.staleness_threshold()))
            .await
    }

    /// Run one cycle with `pipeline` unless a forced restart is pending.
    pub async fn run_cycle_with(&self, pipeline: Pipeline) -> CycleReport {
        let cycle_id = Uuid::new_v4().to_string();
        let span = info_span!("monitor_cycle", cycle_id = %cycle_id);
        let report = self.drive(cycle_id, pipeline).instrument(span).await;
        *self.last.lock().await = Some(report.summary());
        report
    }

    async fn drive(&self, cycle_id: String, pipeline: Pipeline) -> CycleReport {
        let started_at = Utc::now();
        let mut report = CycleReport::new(cycle_id.clone(), started_at);

        report.enter(CycleState::ResolveReference);
        let reference = match self.services.resolver.resolve().await {
            Ok(reference) => reference,
            Err(err) => {
                error!(%err, "reference resolution failed; aborting cycle");
                return abort(report, err.to_string());
            }
        };

        report.enter(CycleState::FetchSnapshot);
        let snapshot = match self
            .services
            .backend
            .latest_metagraph_snapshot(&self.config.metagraph.id)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(%err, "snapshot fetch failed; aborting cycle");
                return abort(report, err.to_string());
            }
        };

        match self.services.backend.latest_global_snapshot().await {
            Ok(global) => info!(
                ordinal = snapshot.ordinal,
                global_ordinal = global.ordinal,
                "snapshots fetched"
            ),
            Err(err) => warn!(%err, ordinal = snapshot.ordinal, "global snapshot unavailable"),
        }

        let ctx = CycleContext {
            cycle_id,
            config: Arc::clone(&self.config),
            services: Arc::clone(&self.services),
            reference,
            snapshot,
            started_at,
            poll: self.poll,
            kill_grace: self.kill_grace,
        };

        let pipeline = if self.force.is_requested() {
            report.enter(CycleState::ForceBranch);
            self.force.take();
            Pipeline::forced()
        } else {
            report.enter(CycleState::EvaluateConditions);
            pipeline
        };

        let Some(trigger) = pipeline.evaluate(&ctx).await else {
            info!(ordinal = ctx.snapshot.ordinal, "metagraph healthy");
            self.close_alerts(&mut report).await;
            return report;
        };

        let decision = &trigger.decision;
        if let Err(err) = self
            .services
            .alerts
            .restart_started(&decision.scope, &decision.reason)
            .await
        {
            warn!(%err, "failed to raise restart-started alert");
        }

        report.enter(CycleState::Remediating);
        match pipeline.remediate(&ctx, &trigger).await {
            Ok(remediation) => {
                report.outcome = if remediation.is_clean() {
                    info!(scope = %decision.scope, reason = %decision.reason, "remediation finished");
                    CycleOutcome::Remediated {
                        reason: decision.reason.clone(),
                        scope: decision.scope.to_string(),
                    }
                } else {
                    let detail = remediation.failure_summary();
                    error!(
                        scope = %decision.scope,
                        failures = %detail,
                        "remediation left failed hosts; next cycle re-evaluates"
                    );
                    CycleOutcome::RemediatedWithFailures {
                        reason: decision.reason.clone(),
                        scope: decision.scope.to_string(),
                        detail,
                    }
                };
                report.remediation = Some(remediation);
                self.close_alerts(&mut report).await;
            }
            Err(err) => {
                error!(scope = %decision.scope, %err, "remediation failed");
                self.fail(&mut report, &decision.reason, err.to_string()).await;
            }
        }
        report
    }

    async fn close_alerts(&self, report: &mut CycleReport) {
        report.enter(CycleState::CloseAlerts);
        for kind in AlertKind::ALL {
            if let Err(err) = self.services.alerts.close_alert(kind).await {
                warn!(alert = %kind, %err, "failed to close alert");
            }
        }
        report.enter(CycleState::Idle);
    }

    async fn fail(&self, report: &mut CycleReport, reason: &str, detail: String) {
        let message = format!("{reason}: {detail}");
        if let Err(err) = self.services.alerts.restart_failed(&message).await {
            warn!(%err, "failed to raise restart-failed alert");
        }
        report.outcome = CycleOutcome::RemediationFailed {
            reason: reason.to_owned(),
            detail,
        };
        report.enter(CycleState::Error);
    }

    /// Run a cycle every configured interval until `cancel` fires.
    #[must_use]
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let period = self.config.cycle_interval();
        tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            info!("monitor loop stopped");
                            return;
                        }
                        _ = ticker.tick() => {}
                    }
                    let report = self.run_cycle().await;
                    info!(
                        cycle_id = %report.cycle_id,
                        outcome = report.outcome.label(),
                        final_state = %report.final_state(),
                        "cycle complete"
                    );
                }
            }
            .instrument(info_span!("monitor_loop")),
        )
    }
}

fn abort(mut report: CycleReport, detail: String) -> CycleReport {
    report.outcome = CycleOutcome::Aborted { detail };
    report.enter(CycleState::Error);
    report
}
