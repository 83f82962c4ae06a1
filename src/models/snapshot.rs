//! Snapshot metadata fetched from the block explorer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest known metagraph snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    /// Snapshot ordinal.
    pub ordinal: u64,
    /// Snapshot hash.
    pub hash: String,
    /// Time the snapshot was produced.
    pub timestamp: DateTime<Utc>,
}

/// Latest known global (network) snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSnapshotInfo {
    /// Snapshot ordinal.
    pub ordinal: u64,
    /// Snapshot hash.
    pub hash: String,
}
