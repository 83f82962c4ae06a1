//! Immutable per-cycle context shared by detectors and orchestrators.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::alerts::AlertSink;
use crate::config::{GlobalConfig, LayerConfig};
use crate::models::host::HostNode;
use crate::models::layer::Layer;
use crate::models::node::{NodeInfo, ReferenceSourceNode};
use crate::models::snapshot::SnapshotInfo;
use crate::network::backend::SnapshotBackend;
use crate::network::node_api::NodeApi;
use crate::network::reference::ReferenceResolver;
use crate::remediation::primitives::PollBudget;
use crate::remote::SessionPool;
use crate::Result;

/// Long-lived collaborators, built once at startup.
pub struct Services {
    /// One remote shell per host.
    pub sessions: SessionPool,
    /// Node HTTP API.
    pub nodes: Arc<dyn NodeApi>,
    /// Snapshot metadata backend.
    pub backend: Arc<dyn SnapshotBackend>,
    /// Reference node resolution.
    pub resolver: Arc<dyn ReferenceResolver>,
    /// Alert delivery.
    pub alerts: Arc<dyn AlertSink>,
}

/// Everything a cycle knows, fixed once the cycle has resolved its inputs.
pub struct CycleContext {
    /// Identifier used in logs and the status report.
    pub cycle_id: String,
    /// Loaded configuration.
    pub config: Arc<GlobalConfig>,
    /// Collaborators.
    pub services: Arc<Services>,
    /// Reference node resolved for this cycle.
    pub reference: ReferenceSourceNode,
    /// Latest metagraph snapshot fetched for this cycle.
    pub snapshot: SnapshotInfo,
    /// Wall-clock time the cycle started.
    pub started_at: DateTime<Utc>,
    /// Polling budget for convergence waits.
    pub poll: PollBudget,
    /// Wait between a graceful terminate and the liveness re-check.
    pub kill_grace: Duration,
}

impl CycleContext {
    /// Configured hosts in config order.
    #[must_use]
    pub fn hosts(&self) -> &[HostNode] {
        self.config.hosts()
    }

    /// Non-ignored layers, base layer first.
    #[must_use]
    pub fn active_layers(&self) -> Vec<Layer> {
        self.config.active_layers()
    }

    /// Settings of `layer`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unconfigured layers.
    pub fn layer(&self, layer: Layer) -> Result<&LayerConfig> {
        self.config.require_layer(layer)
    }

    /// Run `command` on `host` with the configured command timeout.
    ///
    /// # Errors
    ///
    /// Propagates remote session failures.
    pub async fn run(&self, host: &HostNode, command: &str) -> Result<String> {
        let session = self.services.sessions.get(&host.name)?;
        session.execute(command, self.config.command_timeout()).await
    }

    /// Query `node/info` of `layer` on `host`.
    ///
    /// # Errors
    ///
    /// Propagates HTTP failures.
    pub async fn node_info(&self, host: &HostNode, layer: Layer) -> Result<NodeInfo> {
        let cfg = self.layer(layer)?;
        self.services.nodes.node_info(&host.ip, cfg.public_port).await
    }
}
