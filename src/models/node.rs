//! Live node status as reported by the node HTTP API.

use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle state a layer process reports on `node/info`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// No state reported.
    Unknown,
    /// Fully operational member of the cluster.
    Ready,
    /// Operational, waiting for a cluster join request.
    ReadyToJoin,
    /// Any other state (`Observing`, `SessionStarted`, `Offline`, ...).
    Other(String),
}

impl NodeState {
    /// Map the wire representation onto a state.
    #[must_use]
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "" => Self::Unknown,
            "Ready" => Self::Ready,
            "ReadyToJoin" => Self::ReadyToJoin,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Wire representation of the state.
    #[must_use]
    pub fn as_wire(&self) -> &str {
        match self {
            Self::Unknown => "Unknown",
            Self::Ready => "Ready",
            Self::ReadyToJoin => "ReadyToJoin",
            Self::Other(raw) => raw,
        }
    }
}

impl<'de> Deserialize<'de> for NodeState {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map_or(Self::Unknown, |value| Self::from_wire(&value)))
    }
}

impl Serialize for NodeState {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_wire())
    }
}

/// Response of `GET /node/info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// Current lifecycle state.
    #[serde(default = "unknown_state")]
    pub state: NodeState,
    /// Peer identity of the node.
    pub id: String,
    /// Address the node advertises for peer traffic.
    pub host: String,
    /// Public HTTP port.
    #[serde(default)]
    pub public_port: u16,
    /// Peer-to-peer port.
    pub p2p_port: u16,
}

fn unknown_state() -> NodeState {
    NodeState::Unknown
}

/// One peer entry of a node's cluster view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPeer {
    /// Peer identity.
    pub id: String,
    /// Peer address.
    pub ip: String,
}

/// One node's belief about current cluster membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterPov {
    /// Peers the node believes are active.
    pub peers: Vec<ClusterPeer>,
}

/// Body of `POST /cluster/join`: the peer a validator should join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Peer identity of the node to join.
    pub id: String,
    /// Address of the node to join.
    pub ip: String,
    /// Peer-to-peer port of the node to join.
    pub p2p_port: u16,
}

impl From<&NodeInfo> for JoinRequest {
    fn from(info: &NodeInfo) -> Self {
        Self {
            id: info.id.clone(),
            ip: info.host.clone(),
            p2p_port: info.p2p_port,
        }
    }
}

/// The externally trusted anchor node of the wider network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ReferenceSourceNode {
    /// Node address.
    pub ip: String,
    /// Public HTTP port.
    pub port: u16,
    /// Peer identity; resolved from `node/info` when left empty in config.
    #[serde(default)]
    pub id: String,
}
