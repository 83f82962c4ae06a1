//! Node status and cluster endpoints exposed by every layer process.

use futures_util::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use crate::models::node::{ClusterPeer, ClusterPov, JoinRequest, NodeInfo};
use crate::{AppError, Result};

/// Node-facing HTTP calls the monitor depends on.
pub trait NodeApi: Send + Sync {
    /// `GET /node/info` on the layer's public port.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Http`] on transport failure or a malformed body.
    fn node_info<'a>(&'a self, ip: &'a str, public_port: u16) -> BoxFuture<'a, Result<NodeInfo>>;

    /// `GET /cluster/info` on the layer's public port.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Http`] on transport failure or a malformed body.
    fn cluster_pov<'a>(&'a self, ip: &'a str, public_port: u16)
        -> BoxFuture<'a, Result<ClusterPov>>;

    /// `POST /cluster/join` on the layer's CLI port.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Http`] if the node rejects the request.
    fn join_cluster<'a>(
        &'a self,
        ip: &'a str,
        cli_port: u16,
        peer: &'a JoinRequest,
    ) -> BoxFuture<'a, Result<()>>;
}

/// Entry of `/cluster/info`; extra fields are ignored.
#[derive(Debug, Deserialize)]
struct ClusterEntry {
    id: String,
    ip: String,
}

/// [`NodeApi`] over plain HTTP.
#[derive(Clone)]
pub struct HttpNodeApi {
    client: reqwest::Client,
}

impl HttpNodeApi {
    /// Wrap a configured client.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl NodeApi for HttpNodeApi {
    fn node_info<'a>(&'a self, ip: &'a str, public_port: u16) -> BoxFuture<'a, Result<NodeInfo>> {
        Box::pin(async move {
            let url = format!("http://{ip}:{public_port}/node/info");
            debug!(%url, "fetching node info");
            let info = self
                .client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json::<NodeInfo>()
                .await?;
            Ok(info)
        })
    }

    fn cluster_pov<'a>(
        &'a self,
        ip: &'a str,
        public_port: u16,
    ) -> BoxFuture<'a, Result<ClusterPov>> {
        Box::pin(async move {
            let url = format!("http://{ip}:{public_port}/cluster/info");
            debug!(%url, "fetching cluster view");
            let entries = self
                .client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<ClusterEntry>>()
                .await?;
            Ok(ClusterPov {
                peers: entries
                    .into_iter()
                    .map(|entry| ClusterPeer {
                        id: entry.id,
                        ip: entry.ip,
                    })
                    .collect(),
            })
        })
    }

    fn join_cluster<'a>(
        &'a self,
        ip: &'a str,
        cli_port: u16,
        peer: &'a JoinRequest,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let url = format!("http://{ip}:{cli_port}/cluster/join");
            let response = self.client.post(&url).json(peer).send().await?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                let body = response.text().await.unwrap_or_default();
                Err(AppError::Http(format!(
                    "join request to {ip}:{cli_port} rejected with {status}: {body}"
                )))
            }
        })
    }
}
