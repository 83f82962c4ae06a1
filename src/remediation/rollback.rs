//! Choice of the bootstrap host for a layer or metagraph rebuild.

use futures_util::future::join_all;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use super::commands;
use crate::context::CycleContext;
use crate::models::host::HostNode;
use crate::models::layer::Layer;
use crate::models::node::NodeState;
use crate::{AppError, Result};

/// The selected bootstrap host.
#[derive(Debug, Clone, Copy)]
pub struct RollbackChoice<'a> {
    /// Host to bootstrap from.
    pub host: &'a HostNode,
    /// `false` when no host qualified and the choice is a blind fallback.
    pub verified: bool,
}

/// Pick a host currently reporting ready on the base layer.
///
/// # Errors
///
/// Returns [`AppError::NotFound`] only when no hosts are configured.
pub async fn select_layer_bootstrap(ctx: &CycleContext) -> Result<RollbackChoice<'_>> {
    let hosts = ctx.hosts();
    let checks = join_all(hosts.iter().map(|host| async move {
        matches!(
            ctx.node_info(host, Layer::MetagraphL0).await,
            Ok(info) if info.state == NodeState::Ready
        )
    }))
    .await;

    let qualified: Vec<&HostNode> = hosts
        .iter()
        .zip(checks)
        .filter_map(|(host, ok)| ok.then_some(host))
        .collect();
    choose(hosts, &qualified, "ready on ml0")
}

/// Pick a host whose disk holds the latest metagraph snapshot and its
/// calculated state.
///
/// # Errors
///
/// Returns [`AppError::NotFound`] only when no hosts are configured.
pub async fn select_metagraph_rollback(ctx: &CycleContext) -> Result<RollbackChoice<'_>> {
    let hosts = ctx.hosts();
    let ml0 = ctx.layer(Layer::MetagraphL0)?;
    let command = commands::check_snapshot_state(ml0, &ctx.snapshot.hash, ctx.snapshot.ordinal);

    let checks = join_all(hosts.iter().map(|host| {
        let command = command.as_str();
        async move {
            match ctx.run(host, command).await {
                Ok(output) => output.trim() == "present",
                Err(err) => {
                    warn!(host = %host.name, %err, "snapshot state check failed");
                    false
                }
            }
        }
    }))
    .await;

    let qualified: Vec<&HostNode> = hosts
        .iter()
        .zip(checks)
        .filter_map(|(host, ok)| ok.then_some(host))
        .collect();
    choose(hosts, &qualified, "holds latest snapshot")
}

/// Uniform choice among `qualified`, else among every host.
fn choose<'a>(
    hosts: &'a [HostNode],
    qualified: &[&'a HostNode],
    criterion: &str,
) -> Result<RollbackChoice<'a>> {
    let mut rng = rand::thread_rng();

    if let Some(host) = qualified.choose(&mut rng) {
        info!(host = %host.name, criterion, candidates = qualified.len(), "rollback host selected");
        return Ok(RollbackChoice {
            host: *host,
            verified: true,
        });
    }

    let host = hosts
        .choose(&mut rng)
        .ok_or_else(|| AppError::NotFound("no hosts configured".into()))?;
    warn!(
        host = %host.name,
        criterion,
        "no host qualified; degraded rollback choice, cluster correctness not guaranteed"
    );
    Ok(RollbackChoice {
        host,
        verified: false,
    })
}
