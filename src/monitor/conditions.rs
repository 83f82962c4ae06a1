//! Restart conditions, evaluated in a fixed priority order.

use std::collections::BTreeSet;
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture};
use tracing::{debug, info};

use super::fork::scan_layer;
use crate::context::CycleContext;
use crate::models::decision::{NodeTarget, RestartDecision, RestartScope};
use crate::models::layer::Layer;
use crate::models::node::NodeState;
use crate::remediation::orchestrator;
use crate::remediation::report::RemediationReport;
use crate::Result;

/// One detector: decides whether to restart and carries out its decision.
pub trait RestartCondition: Send + Sync {
    /// Label used as the decision reason and in logs.
    fn name(&self) -> &'static str;

    /// Inspect the metagraph.
    ///
    /// # Errors
    ///
    /// Any error; the pipeline logs it and moves to the next condition.
    fn evaluate<'a>(&'a self, ctx: &'a CycleContext) -> BoxFuture<'a, Result<RestartDecision>>;

    /// Carry out `decision`. Defaults to the orchestrator for its scope.
    ///
    /// # Errors
    ///
    /// Propagates orchestrator errors.
    fn remediate<'a>(
        &'a self,
        ctx: &'a CycleContext,
        decision: &'a RestartDecision,
    ) -> BoxFuture<'a, Result<RemediationReport>> {
        Box::pin(orchestrator::remediate(ctx, &decision.scope))
    }
}

/// Operator-requested rebuild of the whole metagraph.
pub struct ForceRestart;

impl RestartCondition for ForceRestart {
    fn name(&self) -> &'static str {
        "force-restart"
    }

    fn evaluate<'a>(&'a self, _ctx: &'a CycleContext) -> BoxFuture<'a, Result<RestartDecision>> {
        Box::pin(async move {
            info!("forced restart requested");
            Ok(RestartDecision::restart(
                RestartScope::FullMetagraph,
                self.name(),
            ))
        })
    }
}

/// Triggers a full rebuild when the latest snapshot is older than
/// `threshold`.
pub struct SnapshotStaleness {
    threshold: Duration,
}

impl SnapshotStaleness {
    /// Condition with the given age limit.
    #[must_use]
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }
}

impl RestartCondition for SnapshotStaleness {
    fn name(&self) -> &'static str {
        "snapshot-staleness"
    }

    fn evaluate<'a>(&'a self, ctx: &'a CycleContext) -> BoxFuture<'a, Result<RestartDecision>> {
        Box::pin(async move {
            let age = (ctx.started_at - ctx.snapshot.timestamp)
                .to_std()
                .unwrap_or(Duration::ZERO);

            if age > self.threshold {
                info!(
                    ordinal = ctx.snapshot.ordinal,
                    age_seconds = age.as_secs(),
                    threshold_seconds = self.threshold.as_secs(),
                    "snapshot is stale"
                );
                Ok(RestartDecision::restart(RestartScope::FullMetagraph, self.name()))
            } else {
                debug!(age_seconds = age.as_secs(), "snapshot is fresh");
                Ok(RestartDecision::healthy(self.name()))
            }
        })
    }
}

/// Triggers a full layer rebuild at the first dependent layer whose hosts
/// disagree on cluster membership.
pub struct ForkedCluster;

impl RestartCondition for ForkedCluster {
    fn name(&self) -> &'static str {
        "forked-cluster"
    }

    fn evaluate<'a>(&'a self, ctx: &'a CycleContext) -> BoxFuture<'a, Result<RestartDecision>> {
        Box::pin(async move {
            for layer in ctx.active_layers().into_iter().filter(|l| !l.is_base()) {
                let report = scan_layer(ctx, layer).await?;
                let first = ctx
                    .hosts()
                    .iter()
                    .find(|host| report.forked.contains(&host.name));
                if let Some(host) = first {
                    info!(%layer, host = %host.name, "forked cluster detected");
                    return Ok(RestartDecision::restart(
                        RestartScope::FullLayer { layer },
                        self.name(),
                    ));
                }
            }
            Ok(RestartDecision::healthy(self.name()))
        })
    }
}

/// Restarts hosts that fail their status probe or disagree with their
/// layer's majority view.
///
/// Every host unhealthy on a layer escalates to a full layer rebuild.
pub struct UnhealthyNodes;

impl UnhealthyNodes {
    async fn unhealthy_on(ctx: &CycleContext, layer: Layer) -> Result<BTreeSet<String>> {
        let probes = join_all(ctx.hosts().iter().map(|host| async move {
            match ctx.node_info(host, layer).await {
                Ok(info) if info.state == NodeState::Ready => None,
                Ok(info) => {
                    info!(host = %host.name, %layer, state = info.state.as_wire(), "node not ready");
                    Some(host.name.clone())
                }
                Err(err) => {
                    info!(host = %host.name, %layer, %err, "node probe failed");
                    Some(host.name.clone())
                }
            }
        }))
        .await;

        let mut unhealthy: BTreeSet<String> = probes.into_iter().flatten().collect();
        unhealthy.extend(scan_layer(ctx, layer).await?.forked);
        Ok(unhealthy)
    }
}

impl RestartCondition for UnhealthyNodes {
    fn name(&self) -> &'static str {
        "unhealthy-nodes"
    }

    fn evaluate<'a>(&'a self, ctx: &'a CycleContext) -> BoxFuture<'a, Result<RestartDecision>> {
        Box::pin(async move {
            let mut per_layer = Vec::new();
            for layer in ctx.active_layers() {
                per_layer.push((layer, Self::unhealthy_on(ctx, layer).await?));
            }

            let host_count = ctx.hosts().len();
            if let Some((layer, _)) = per_layer
                .iter()
                .find(|(_, unhealthy)| unhealthy.len() == host_count)
            {
                info!(%layer, "every host unhealthy on layer");
                return Ok(RestartDecision::restart(
                    RestartScope::FullLayer { layer: *layer },
                    self.name(),
                ));
            }

            let targets: Vec<NodeTarget> = per_layer
                .iter()
                .flat_map(|(layer, unhealthy)| {
                    ctx.hosts()
                        .iter()
                        .filter(|host| unhealthy.contains(&host.name))
                        .map(|host| NodeTarget::new(*layer, host.name.clone()))
                })
                .collect();

            if targets.is_empty() {
                Ok(RestartDecision::healthy(self.name()))
            } else {
                Ok(RestartDecision::restart(
                    RestartScope::IndividualNodes { targets },
                    self.name(),
                ))
            }
        })
    }
}

/// Restarts individual base-layer hosts that disagree with the majority.
pub struct ForkedL0Nodes;

impl RestartCondition for ForkedL0Nodes {
    fn name(&self) -> &'static str {
        "forked-l0-nodes"
    }

    fn evaluate<'a>(&'a self, ctx: &'a CycleContext) -> BoxFuture<'a, Result<RestartDecision>> {
        Box::pin(async move {
            let report = scan_layer(ctx, Layer::MetagraphL0).await?;
            let targets: Vec<NodeTarget> = ctx
                .hosts()
                .iter()
                .filter(|host| report.forked.contains(&host.name))
                .map(|host| NodeTarget::new(Layer::MetagraphL0, host.name.clone()))
                .collect();

            if targets.is_empty() {
                Ok(RestartDecision::healthy(self.name()))
            } else {
                Ok(RestartDecision::restart(
                    RestartScope::IndividualNodes { targets },
                    self.name(),
                ))
            }
        })
    }
}
