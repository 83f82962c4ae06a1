//! The three remediation orchestrators, selected by restart scope.
//!
//! All of them stop affected hosts in parallel first, then rebuild.

use futures_util::future::join_all;
use tracing::{error, info, warn};

use super::bringup::{bring_up_layer, join_validator};
use super::primitives::{cleanup_all_hosts, stop_layers};
use super::report::{HostOutcome, RemediationReport};
use super::rollback::{select_layer_bootstrap, select_metagraph_rollback};
use crate::context::CycleContext;
use crate::models::decision::{NodeTarget, RestartScope};
use crate::models::host::HostNode;
use crate::models::layer::Layer;
use crate::models::node::{JoinRequest, NodeState};
use crate::Result;

/// Run the orchestrator matching `scope`.
///
/// # Errors
///
/// Returns an error when a bootstrap node cannot be brought up. Per-host
/// failures are reported in the returned report instead.
pub async fn remediate(ctx: &CycleContext, scope: &RestartScope) -> Result<RemediationReport> {
    match scope {
        RestartScope::None => Ok(RemediationReport::new()),
        RestartScope::IndividualNodes { targets } => restart_individual_nodes(ctx, targets).await,
        RestartScope::FullLayer { layer } => restart_full_layer(ctx, *layer).await,
        RestartScope::FullMetagraph => restart_full_metagraph(ctx).await,
    }
}

/// Restart each target alone, one after another, joining it to a healthy
/// peer of the same layer.
///
/// # Errors
///
/// Returns `AppError::NotFound` when a target names an unknown host.
pub async fn restart_individual_nodes(
    ctx: &CycleContext,
    targets: &[NodeTarget],
) -> Result<RemediationReport> {
    let mut report = RemediationReport::new();

    for target in targets {
        let host = ctx.config.host(&target.host)?;
        let layer = target.layer;
        info!(%target, "restarting individual node");

        report.merge(stop_layers(ctx, &[host], &[layer]).await);

        let Some(peer) = healthy_peer(ctx, layer, targets).await else {
            warn!(%target, "no ready peer to join");
            report.push(HostOutcome::failed(
                &host.name,
                Some(layer),
                "join",
                "no ready peer on the layer",
            ));
            continue;
        };

        match join_validator(ctx, layer, host, &peer).await {
            Ok(()) => {
                info!(%target, peer = %peer.id, "node rejoined");
                report.push(HostOutcome::succeeded(
                    &host.name,
                    Some(layer),
                    "join",
                    format!("joined {}", peer.id),
                ));
            }
            Err(err) => {
                error!(%target, %err, "node failed to rejoin");
                report.push(HostOutcome::failed(&host.name, Some(layer), "join", err.to_string()));
            }
        }
    }

    Ok(report)
}

/// First non-target host, in config order, whose `layer` reports ready.
async fn healthy_peer(
    ctx: &CycleContext,
    layer: Layer,
    targets: &[NodeTarget],
) -> Option<JoinRequest> {
    let candidates = ctx.hosts().iter().filter(|host| {
        !targets
            .iter()
            .any(|target| target.layer == layer && target.host == host.name)
    });

    for host in candidates {
        match ctx.node_info(host, layer).await {
            Ok(info) if info.state == NodeState::Ready => return Some(JoinRequest::from(&info)),
            Ok(_) | Err(_) => {}
        }
    }
    None
}

/// Rebuild `layer` on every host. The base layer escalates to a full
/// metagraph restart.
///
/// # Errors
///
/// Returns an error when the bootstrap node never becomes ready.
pub async fn restart_full_layer(ctx: &CycleContext, layer: Layer) -> Result<RemediationReport> {
    if layer.is_base() {
        warn!(%layer, "full restart of the base layer escalates to the whole metagraph");
        return restart_full_metagraph(ctx).await;
    }

    let hosts: Vec<&HostNode> = ctx.hosts().iter().collect();
    let mut report = stop_layers(ctx, &hosts, &[layer]).await;

    let choice = select_layer_bootstrap(ctx).await?;
    let validators = others(&hosts, choice.host);
    info!(%layer, bootstrap = %choice.host.name, verified = choice.verified, "rebuilding layer");

    report.merge(bring_up_layer(ctx, layer, choice.host, &validators).await?);
    Ok(report)
}

/// Tear down every active layer on every host and rebuild from the
/// rollback host, base layer first.
///
/// # Errors
///
/// Returns an error when the base layer cannot be bootstrapped.
pub async fn restart_full_metagraph(ctx: &CycleContext) -> Result<RemediationReport> {
    let layers = ctx.active_layers();
    let hosts: Vec<&HostNode> = ctx.hosts().iter().collect();

    let mut report = stop_layers(ctx, &hosts, &layers).await;
    report.merge(cleanup_all_hosts(ctx, &hosts).await);

    let choice = select_metagraph_rollback(ctx).await?;
    let validators = others(&hosts, choice.host);
    info!(
        rollback = %choice.host.name,
        verified = choice.verified,
        ordinal = ctx.snapshot.ordinal,
        "rebuilding metagraph"
    );

    report.merge(bring_up_layer(ctx, Layer::MetagraphL0, choice.host, &validators).await?);

    let dependents: Vec<Layer> = layers.into_iter().filter(|layer| !layer.is_base()).collect();
    let results = join_all(
        dependents
            .iter()
            .map(|layer| bring_up_layer(ctx, *layer, choice.host, &validators)),
    )
    .await;

    for (layer, result) in dependents.iter().zip(results) {
        match result {
            Ok(layer_report) => report.merge(layer_report),
            Err(err) => {
                error!(%layer, %err, "dependent layer bring-up failed");
                report.push(HostOutcome::failed(
                    &choice.host.name,
                    Some(*layer),
                    "bootstrap",
                    err.to_string(),
                ));
            }
        }
    }

    Ok(report)
}

fn others<'a>(hosts: &[&'a HostNode], bootstrap: &HostNode) -> Vec<&'a HostNode> {
    hosts
        .iter()
        .copied()
        .filter(|host| host.name != bootstrap.name)
        .collect()
}
