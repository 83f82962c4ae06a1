//! Majority-hash comparison of per-node cluster views.

use std::collections::{BTreeMap, BTreeSet};

use futures_util::future::join_all;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::context::CycleContext;
use crate::models::layer::Layer;
use crate::models::node::{ClusterPeer, ClusterPov};
use crate::Result;

/// Fork detection result for one layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForkReport {
    /// Digest shared by the most hosts; `None` without any view.
    pub majority_hash: Option<String>,
    /// Hosts whose view differs from the majority.
    pub forked: BTreeSet<String>,
    /// Hosts whose view could not be fetched.
    pub unreachable: BTreeSet<String>,
}

impl ForkReport {
    /// Whether any host disagrees.
    #[must_use]
    pub fn has_fork(&self) -> bool {
        !self.forked.is_empty()
    }
}

/// SHA-256 of the view's peers, sorted by id and serialized as JSON.
///
/// # Errors
///
/// Returns `AppError::Http` if serialization fails.
pub fn pov_fingerprint(pov: &ClusterPov) -> Result<String> {
    let mut peers: Vec<&ClusterPeer> = pov.peers.iter().collect();
    peers.sort();
    let canonical = serde_json::to_vec(&peers)?;

    let digest = Sha256::digest(&canonical);
    Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
}

/// Flag hosts whose view differs from the majority.
///
/// `views` pairs a host name with its view, `None` when unreachable. The
/// result does not depend on the order of `views`; ties between equally
/// common digests go to the smallest digest.
///
/// # Errors
///
/// See [`pov_fingerprint`].
pub fn detect_forks(views: &[(String, Option<ClusterPov>)]) -> Result<ForkReport> {
    let mut report = ForkReport::default();
    let mut by_hash: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for (host, view) in views {
        match view {
            Some(pov) => {
                by_hash
                    .entry(pov_fingerprint(pov)?)
                    .or_default()
                    .insert(host.clone());
            }
            None => {
                report.unreachable.insert(host.clone());
            }
        }
    }

    let mut majority: Option<(&String, usize)> = None;
    for (hash, hosts) in &by_hash {
        if majority.map_or(true, |(_, count)| hosts.len() > count) {
            majority = Some((hash, hosts.len()));
        }
    }

    let Some((majority_hash, _)) = majority else {
        return Ok(report);
    };
    report.majority_hash = Some(majority_hash.clone());

    for (hash, hosts) in &by_hash {
        if hash != majority_hash {
            report.forked.extend(hosts.iter().cloned());
        }
    }
    Ok(report)
}

/// Fetch every host's view of `layer` concurrently and compare them.
///
/// # Errors
///
/// See [`pov_fingerprint`].
pub async fn scan_layer(ctx: &CycleContext, layer: Layer) -> Result<ForkReport> {
    let port = ctx.layer(layer)?.public_port;
    let fetched = join_all(ctx.hosts().iter().map(|host| async move {
        match ctx.services.nodes.cluster_pov(&host.ip, port).await {
            Ok(pov) => (host.name.clone(), Some(pov)),
            Err(err) => {
                debug!(host = %host.name, %layer, %err, "cluster view unavailable");
                (host.name.clone(), None)
            }
        }
    }))
    .await;

    let report = detect_forks(&fetched)?;
    if report.has_fork() {
        warn!(%layer, forked = ?report.forked, majority = ?report.majority_hash, "cluster views disagree");
    }
    Ok(report)
}
