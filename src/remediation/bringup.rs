//! Layer bring-up: bootstrap, wait for ready, then join validators one by one.

use tracing::{error, info, info_span, warn, Instrument};

use super::commands::{self, L0Peer, StartMode};
use super::primitives::poll_until_state;
use super::report::{HostOutcome, RemediationReport};
use crate::context::CycleContext;
use crate::models::host::HostNode;
use crate::models::layer::Layer;
use crate::models::node::{JoinRequest, NodeState};
use crate::{AppError, Result};

/// Bring `layer` up with `bootstrap` as the initial node and `validators`
/// joining it sequentially.
///
/// Validator failures are recorded in the report and the next validator is
/// still attempted.
///
/// # Errors
///
/// Returns an error when the bootstrap node cannot be started or never
/// reaches ready; the layer is unusable in that case.
pub async fn bring_up_layer(
    ctx: &CycleContext,
    layer: Layer,
    bootstrap: &HostNode,
    validators: &[&HostNode],
) -> Result<RemediationReport> {
    let span = info_span!("bring_up", %layer, bootstrap = %bootstrap.name);
    async move {
        let mut report = RemediationReport::new();

        let mode = StartMode::initial_for(layer);
        start_node(ctx, layer, bootstrap, mode).await?;
        info!(host = %bootstrap.name, mode = mode.as_arg(), "bootstrap started");

        let bootstrap_info =
            poll_until_state(ctx, bootstrap, layer, &NodeState::Ready, ctx.poll).await?;
        report.push(HostOutcome::succeeded(
            &bootstrap.name,
            Some(layer),
            "bootstrap",
            format!("ready as {}", bootstrap_info.id),
        ));

        let target = JoinRequest::from(&bootstrap_info);
        for validator in validators {
            match join_validator(ctx, layer, validator, &target).await {
                Ok(()) => {
                    info!(host = %validator.name, "validator joined");
                    report.push(HostOutcome::succeeded(
                        &validator.name,
                        Some(layer),
                        "join",
                        format!("joined {}", target.id),
                    ));
                }
                Err(err) => {
                    error!(host = %validator.name, %err, "validator failed to join");
                    report.push(HostOutcome::failed(
                        &validator.name,
                        Some(layer),
                        "join",
                        err.to_string(),
                    ));
                }
            }
        }

        Ok(report)
    }
    .instrument(span)
    .await
}

/// Start `host` as a validator, wait for ready-to-join, then ask it to join
/// `target`.
///
/// # Errors
///
/// Propagates start, convergence and join failures.
pub async fn join_validator(
    ctx: &CycleContext,
    layer: Layer,
    host: &HostNode,
    target: &JoinRequest,
) -> Result<()> {
    start_node(ctx, layer, host, StartMode::Validator).await?;
    poll_until_state(ctx, host, layer, &NodeState::ReadyToJoin, ctx.poll).await?;

    let cli_port = ctx.layer(layer)?.cli_port;
    ctx.services
        .nodes
        .join_cluster(&host.ip, cli_port, target)
        .await
}

/// Launch the layer process on `host` in `mode`.
///
/// # Errors
///
/// Returns [`AppError::BringUp`] when the dependent layer's base-layer peer
/// cannot be resolved, and propagates remote failures.
pub async fn start_node(
    ctx: &CycleContext,
    layer: Layer,
    host: &HostNode,
    mode: StartMode,
) -> Result<()> {
    let l0_peer = if layer.is_base() {
        None
    } else {
        Some(resolve_l0_peer(ctx, host).await?)
    };

    let command = commands::start_layer(
        &ctx.config,
        host,
        layer,
        mode,
        &ctx.reference,
        l0_peer.as_ref(),
    )?;
    let output = ctx.run(host, &command).await?;
    if output.trim() != "started" {
        warn!(host = %host.name, %layer, output = %output.trim(), "unexpected start output");
    }
    Ok(())
}

/// Base-layer identity on the same host, needed by dependent layers.
async fn resolve_l0_peer(ctx: &CycleContext, host: &HostNode) -> Result<L0Peer> {
    let port = ctx.layer(Layer::MetagraphL0)?.public_port;
    let info = ctx
        .node_info(host, Layer::MetagraphL0)
        .await
        .map_err(|err| {
            AppError::BringUp(format!("ml0 on {} is not addressable: {err}", host.name))
        })?;

    Ok(L0Peer {
        id: info.id,
        ip: host.ip.clone(),
        port,
    })
}
