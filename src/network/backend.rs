//! Block explorer backend serving snapshot metadata.

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::models::snapshot::{GlobalSnapshotInfo, SnapshotInfo};
use crate::{AppError, Result};

/// Source of the latest known snapshots.
pub trait SnapshotBackend: Send + Sync {
    /// Latest global network snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Snapshot`] if the backend cannot answer.
    fn latest_global_snapshot(&self) -> BoxFuture<'_, Result<GlobalSnapshotInfo>>;

    /// Latest snapshot of the given metagraph.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Snapshot`] if the backend cannot answer.
    fn latest_metagraph_snapshot<'a>(
        &'a self,
        metagraph_id: &'a str,
    ) -> BoxFuture<'a, Result<SnapshotInfo>>;
}

/// Responses are wrapped in `{"data": ...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// [`SnapshotBackend`] backed by the block explorer REST API.
#[derive(Clone)]
pub struct BlockExplorerClient {
    client: reqwest::Client,
    base_url: String,
}

impl BlockExplorerClient {
    /// Client for the explorer at `base_url`.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| AppError::Snapshot(format!("GET {url} failed: {err}")))?;
        let envelope = response
            .json::<Envelope<T>>()
            .await
            .map_err(|err| AppError::Snapshot(format!("GET {url} returned bad body: {err}")))?;
        Ok(envelope.data)
    }
}

impl SnapshotBackend for BlockExplorerClient {
    fn latest_global_snapshot(&self) -> BoxFuture<'_, Result<GlobalSnapshotInfo>> {
        Box::pin(self.fetch("/global-snapshots/latest"))
    }

    fn latest_metagraph_snapshot<'a>(
        &'a self,
        metagraph_id: &'a str,
    ) -> BoxFuture<'a, Result<SnapshotInfo>> {
        Box::pin(async move {
            self.fetch(&format!("/currency/{metagraph_id}/snapshots/latest"))
                .await
        })
    }
}
