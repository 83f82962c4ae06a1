//! Resolution of the trusted reference source node.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::node_api::NodeApi;
use crate::models::node::{NodeState, ReferenceSourceNode};
use crate::{AppError, Result};

/// Determines the node of the wider network the metagraph anchors to.
pub trait ReferenceResolver: Send + Sync {
    /// Resolve a reference node that currently reports ready.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Reference`] when no ready node can be found.
    fn resolve(&self) -> BoxFuture<'_, Result<ReferenceSourceNode>>;
}

/// Entry of the load balancer's `/cluster/info`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadBalancerPeer {
    id: String,
    ip: String,
    public_port: u16,
    #[serde(default = "unknown_state")]
    state: NodeState,
}

fn unknown_state() -> NodeState {
    NodeState::Unknown
}

/// Resolves from a static list when configured, else from the load balancer.
pub struct NetworkReferenceResolver {
    client: reqwest::Client,
    nodes: Arc<dyn NodeApi>,
    load_balancer_url: String,
    static_nodes: Vec<ReferenceSourceNode>,
}

impl NetworkReferenceResolver {
    /// Build a resolver.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        nodes: Arc<dyn NodeApi>,
        load_balancer_url: impl Into<String>,
        static_nodes: Vec<ReferenceSourceNode>,
    ) -> Self {
        Self {
            client,
            nodes,
            load_balancer_url: load_balancer_url.into().trim_end_matches('/').to_owned(),
            static_nodes,
        }
    }

    async fn from_static_list(&self) -> Result<ReferenceSourceNode> {
        let mut candidates = self.static_nodes.clone();
        candidates.shuffle(&mut rand::thread_rng());

        for candidate in candidates {
            match self.nodes.node_info(&candidate.ip, candidate.port).await {
                Ok(info) if info.state == NodeState::Ready => {
                    info!(ip = %candidate.ip, "reference node resolved from static list");
                    return Ok(ReferenceSourceNode {
                        id: info.id,
                        ..candidate
                    });
                }
                Ok(info) => {
                    debug!(ip = %candidate.ip, state = info.state.as_wire(), "reference candidate not ready");
                }
                Err(err) => {
                    warn!(ip = %candidate.ip, %err, "reference candidate unreachable");
                }
            }
        }

        Err(AppError::Reference(
            "none of the configured reference nodes is ready".into(),
        ))
    }

    async fn from_load_balancer(&self) -> Result<ReferenceSourceNode> {
        let url = format!("{}/cluster/info", self.load_balancer_url);
        let peers = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| AppError::Reference(format!("GET {url} failed: {err}")))?
            .json::<Vec<LoadBalancerPeer>>()
            .await
            .map_err(|err| AppError::Reference(format!("GET {url} returned bad body: {err}")))?;

        let ready: Vec<LoadBalancerPeer> = peers
            .into_iter()
            .filter(|peer| peer.state == NodeState::Ready)
            .collect();

        let chosen = ready
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| AppError::Reference(format!("{url} lists no ready peers")))?;

        info!(ip = %chosen.ip, "reference node resolved from load balancer");
        Ok(ReferenceSourceNode {
            ip: chosen.ip.clone(),
            port: chosen.public_port,
            id: chosen.id.clone(),
        })
    }
}

impl ReferenceResolver for NetworkReferenceResolver {
    fn resolve(&self) -> BoxFuture<'_, Result<ReferenceSourceNode>> {
        Box::pin(async move {
            if self.static_nodes.is_empty() {
                self.from_load_balancer().await
            } else {
                self.from_static_list().await
            }
        })
    }
}
