//! Restart decisions produced by the condition pipeline.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use super::layer::Layer;

/// A single host on a single layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeTarget {
    /// Layer to restart.
    pub layer: Layer,
    /// Configured host name.
    pub host: String,
}

impl NodeTarget {
    /// Construct a target.
    #[must_use]
    pub fn new(layer: Layer, host: impl Into<String>) -> Self {
        Self {
            layer,
            host: host.into(),
        }
    }
}

impl Display for NodeTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.layer, self.host)
    }
}

/// Blast radius of a remediation, smallest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RestartScope {
    /// Nothing to do.
    None,
    /// Restart the listed hosts, one at a time.
    IndividualNodes {
        /// Hosts to restart, grouped by layer.
        targets: Vec<NodeTarget>,
    },
    /// Rebuild one layer across all hosts.
    FullLayer {
        /// Layer to rebuild.
        layer: Layer,
    },
    /// Tear down and rebuild every layer on every host.
    FullMetagraph,
}

impl Display for RestartScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::IndividualNodes { targets } => {
                let names: Vec<String> = targets.iter().map(ToString::to_string).collect();
                write!(f, "individual-nodes({})", names.join(", "))
            }
            Self::FullLayer { layer } => write!(f, "full-layer({layer})"),
            Self::FullMetagraph => f.write_str("full-metagraph"),
        }
    }
}

/// Outcome of one restart condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartDecision {
    /// Whether remediation should run.
    pub should_restart: bool,
    /// What to restart.
    pub scope: RestartScope,
    /// Short label naming why, e.g. `snapshot-staleness`.
    pub reason: String,
}

impl RestartDecision {
    /// A decision that leaves the metagraph alone.
    #[must_use]
    pub fn healthy(reason: impl Into<String>) -> Self {
        Self {
            should_restart: false,
            scope: RestartScope::None,
            reason: reason.into(),
        }
    }

    /// A decision that triggers remediation of `scope`.
    #[must_use]
    pub fn restart(scope: RestartScope, reason: impl Into<String>) -> Self {
        Self {
            should_restart: !matches!(scope, RestartScope::None),
            scope,
            reason: reason.into(),
        }
    }
}
