//! Remediation primitives shared by every orchestrator.
//!
//! Kill, archive and cleanup are best-effort: they return a [`HostOutcome`]
//! instead of an error so one stuck host never blocks the others.
//! [`poll_until_state`] is the only bounded wait in the system.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::commands;
use super::report::{HostOutcome, RemediationReport};
use crate::context::CycleContext;
use crate::models::host::HostNode;
use crate::models::layer::Layer;
use crate::models::node::{NodeInfo, NodeState};
use crate::{AppError, Result};

/// Interval between two status queries.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Status queries before giving up (about 8.3 minutes).
pub const MAX_POLL_ATTEMPTS: u32 = 100;
/// Extra wait after a node reports ready-to-join.
pub const READY_TO_JOIN_SETTLE: Duration = Duration::from_secs(10);
/// Wait between a graceful terminate and the liveness check.
pub const KILL_GRACE: Duration = Duration::from_secs(5);
/// Ordinals past the rollback point whose local state is removed.
pub const SNAPSHOT_CLEANUP_WINDOW: u64 = 500;

/// Bounds of [`poll_until_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    /// Wait between attempts.
    pub interval: Duration,
    /// Attempts before [`AppError::ConvergenceTimeout`].
    pub max_attempts: u32,
    /// Wait after reaching ready-to-join.
    pub settle: Duration,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            max_attempts: MAX_POLL_ATTEMPTS,
            settle: READY_TO_JOIN_SETTLE,
        }
    }
}

/// Terminate every process of `layer` on `host`.
///
/// Sends SIGTERM, waits [`CycleContext::kill_grace`], then SIGKILLs whatever
/// is still alive and checks again.
pub async fn kill_layer_process(ctx: &CycleContext, host: &HostNode, layer: Layer) -> HostOutcome {
    const STEP: &str = "kill";

    let jar = match ctx.layer(layer) {
        Ok(cfg) => cfg.jar(layer).to_owned(),
        Err(err) => return HostOutcome::failed(&host.name, Some(layer), STEP, err.to_string()),
    };

    let pids = match ctx
        .run(host, commands::list_processes())
        .await
        .and_then(|output| commands::parse_pids(&output, &jar))
    {
        Ok(pids) => pids,
        Err(err) => {
            warn!(host = %host.name, %layer, %err, "failed to list processes");
            return HostOutcome::failed(&host.name, Some(layer), STEP, err.to_string());
        }
    };

    if pids.is_empty() {
        debug!(host = %host.name, %layer, "no running process");
        return HostOutcome::skipped(&host.name, Some(layer), STEP, "no running process");
    }

    for pid in &pids {
        if let Err(err) = ctx.run(host, &commands::signal_process(*pid, "15")).await {
            warn!(host = %host.name, %layer, pid, %err, "failed to send SIGTERM");
        }
    }
    sleep(ctx.kill_grace).await;

    let mut survivors = Vec::new();
    for pid in &pids {
        if is_alive(ctx, host, *pid).await {
            survivors.push(*pid);
        } else {
            info!(host = %host.name, %layer, pid, "process terminated");
        }
    }

    if !survivors.is_empty() {
        for pid in &survivors {
            warn!(host = %host.name, %layer, pid, "process ignored SIGTERM; sending SIGKILL");
            if let Err(err) = ctx.run(host, &commands::signal_process(*pid, "9")).await {
                warn!(host = %host.name, %layer, pid, %err, "failed to send SIGKILL");
            }
        }
        sleep(Duration::from_secs(1)).await;
    }

    let mut stuck = Vec::new();
    for pid in survivors {
        if is_alive(ctx, host, pid).await {
            warn!(host = %host.name, %layer, pid, "process still alive after SIGKILL");
            stuck.push(pid.to_string());
        } else {
            info!(host = %host.name, %layer, pid, "process killed");
        }
    }

    if stuck.is_empty() {
        HostOutcome::succeeded(
            &host.name,
            Some(layer),
            STEP,
            format!("stopped {} process(es)", pids.len()),
        )
    } else {
        HostOutcome::failed(
            &host.name,
            Some(layer),
            STEP,
            format!("pids still alive: {}", stuck.join(", ")),
        )
    }
}

/// Unknown liveness counts as alive so the kill is retried.
async fn is_alive(ctx: &CycleContext, host: &HostNode, pid: u32) -> bool {
    match ctx.run(host, &commands::probe_process(pid)).await {
        Ok(output) => output.trim() != "dead",
        Err(err) => {
            warn!(host = %host.name, pid, %err, "liveness probe failed");
            true
        }
    }
}

/// Move the layer's log directory to a timestamped archive path.
pub async fn archive_logs(ctx: &CycleContext, host: &HostNode, layer: Layer) -> HostOutcome {
    const STEP: &str = "archive-logs";

    let cfg = match ctx.layer(layer) {
        Ok(cfg) => cfg,
        Err(err) => return HostOutcome::failed(&host.name, Some(layer), STEP, err.to_string()),
    };
    let stamp = archive_stamp(ctx.started_at);

    match ctx.run(host, &commands::archive_logs(cfg, layer, &stamp)).await {
        Ok(output) if output.trim() == "absent" => {
            HostOutcome::skipped(&host.name, Some(layer), STEP, "no log directory")
        }
        Ok(_) => {
            info!(host = %host.name, %layer, %stamp, "logs archived");
            HostOutcome::succeeded(&host.name, Some(layer), STEP, format!("logs-{stamp}"))
        }
        Err(err) => {
            warn!(host = %host.name, %layer, %err, "failed to archive logs");
            HostOutcome::failed(&host.name, Some(layer), STEP, err.to_string())
        }
    }
}

/// Archive directory suffix for a cycle started at `at`.
#[must_use]
pub fn archive_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Remove local snapshot state for ordinals `from_ordinal + 1 ..= to_ordinal`.
pub async fn cleanup_stale_snapshots(
    ctx: &CycleContext,
    host: &HostNode,
    from_ordinal: u64,
    to_ordinal: u64,
) -> HostOutcome {
    const STEP: &str = "cleanup-snapshots";

    let ml0 = match ctx.layer(Layer::MetagraphL0) {
        Ok(cfg) => cfg,
        Err(err) => return HostOutcome::failed(&host.name, None, STEP, err.to_string()),
    };
    let first = from_ordinal + 1;
    if first > to_ordinal {
        return HostOutcome::skipped(&host.name, None, STEP, "empty ordinal range");
    }

    match ctx
        .run(host, &commands::cleanup_snapshots(ml0, first, to_ordinal))
        .await
    {
        Ok(output) if output.trim() == "absent" => {
            HostOutcome::skipped(&host.name, None, STEP, "no local data directory")
        }
        Ok(_) => {
            info!(host = %host.name, first, last = to_ordinal, "stale snapshots removed");
            HostOutcome::succeeded(
                &host.name,
                None,
                STEP,
                format!("ordinals {first}..={to_ordinal}"),
            )
        }
        Err(err) => {
            warn!(host = %host.name, %err, "failed to clean stale snapshots");
            HostOutcome::failed(&host.name, None, STEP, err.to_string())
        }
    }
}

/// Query `layer` on `host` until it reports `desired`.
///
/// Query failures count as "not yet". Reaching ready-to-join additionally
/// waits [`PollBudget::settle`] before returning.
///
/// # Errors
///
/// Returns [`AppError::ConvergenceTimeout`] after `budget.max_attempts`
/// attempts without a match.
pub async fn poll_until_state(
    ctx: &CycleContext,
    host: &HostNode,
    layer: Layer,
    desired: &NodeState,
    budget: PollBudget,
) -> Result<NodeInfo> {
    for attempt in 1..=budget.max_attempts {
        match ctx.node_info(host, layer).await {
            Ok(info) if &info.state == desired => {
                info!(host = %host.name, %layer, state = desired.as_wire(), attempt, "node converged");
                if *desired == NodeState::ReadyToJoin {
                    sleep(budget.settle).await;
                }
                return Ok(info);
            }
            Ok(info) => {
                debug!(host = %host.name, %layer, attempt, state = info.state.as_wire(), "waiting for state");
            }
            Err(err) => {
                debug!(host = %host.name, %layer, attempt, %err, "status query failed; retrying");
            }
        }
        sleep(budget.interval).await;
    }

    Err(AppError::ConvergenceTimeout(format!(
        "{layer} on {} did not reach {} after {} attempts",
        host.name,
        desired.as_wire(),
        budget.max_attempts
    )))
}

/// Kill then archive `layers` on every host in `hosts`.
///
/// Hosts run in parallel; layers on one host run in order.
pub async fn stop_layers(
    ctx: &CycleContext,
    hosts: &[&HostNode],
    layers: &[Layer],
) -> RemediationReport {
    let per_host = join_all(hosts.iter().map(|host| async move {
        let mut outcomes = Vec::with_capacity(layers.len() * 2);
        for layer in layers {
            outcomes.push(kill_layer_process(ctx, host, *layer).await);
            outcomes.push(archive_logs(ctx, host, *layer).await);
        }
        outcomes
    }))
    .await;

    let mut report = RemediationReport::new();
    for outcome in per_host.into_iter().flatten() {
        report.push(outcome);
    }
    report
}

/// Clean stale snapshots past the current rollback point on every host.
pub async fn cleanup_all_hosts(ctx: &CycleContext, hosts: &[&HostNode]) -> RemediationReport {
    let from = ctx.snapshot.ordinal;
    let to = from + SNAPSHOT_CLEANUP_WINDOW;
    let outcomes =
        join_all(hosts.iter().map(|host| cleanup_stale_snapshots(ctx, host, from, to))).await;

    let mut report = RemediationReport::new();
    for outcome in outcomes {
        report.push(outcome);
    }
    report
}
