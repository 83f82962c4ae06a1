//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Remote shell session failure (spawn, timeout, non-zero exit).
    Remote(String),
    /// HTTP call to a node or the block explorer failed.
    Http(String),
    /// No trusted reference source node could be resolved.
    Reference(String),
    /// Latest snapshot information could not be fetched.
    Snapshot(String),
    /// A node did not reach the desired lifecycle state in time.
    ConvergenceTimeout(String),
    /// A layer bring-up step failed.
    BringUp(String),
    /// Slack API failure.
    Slack(String),
    /// IPC communication failure.
    Ipc(String),
    /// Requested entity does not exist.
    NotFound(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Remote(msg) => write!(f, "remote: {msg}"),
            Self::Http(msg) => write!(f, "http: {msg}"),
            Self::Reference(msg) => write!(f, "reference: {msg}"),
            Self::Snapshot(msg) => write!(f, "snapshot: {msg}"),
            Self::ConvergenceTimeout(msg) => write!(f, "convergence timeout: {msg}"),
            Self::BringUp(msg) => write!(f, "bring-up: {msg}"),
            Self::Slack(msg) => write!(f, "slack: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Http(format!("invalid json: {err}"))
    }
}
