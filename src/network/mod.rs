//! HTTP collaborators: node API, block explorer, reference resolution.

pub mod backend;
pub mod node_api;
pub mod reference;

use std::time::Duration;

use crate::{AppError, Result};

/// Build the shared `reqwest` client.
///
/// # Errors
///
/// Returns `AppError::Http` if the TLS backend cannot be initialized.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("metagraph-monitor/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|err| AppError::Http(format!("failed to build http client: {err}")))
}
