//! Metagraph layer identifiers.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// One of the three cooperating processes running on every host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Metagraph L0, the base layer every other layer depends on.
    #[serde(rename = "ml0")]
    MetagraphL0,
    /// Currency L1 transaction layer.
    #[serde(rename = "cl1")]
    CurrencyL1,
    /// Data L1 transaction layer.
    #[serde(rename = "dl1")]
    DataL1,
}

impl Layer {
    /// All layers, base layer first.
    pub const ALL: [Layer; 3] = [Layer::MetagraphL0, Layer::CurrencyL1, Layer::DataL1];

    /// Short identifier used in config keys, logs and alerts.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MetagraphL0 => "ml0",
            Self::CurrencyL1 => "cl1",
            Self::DataL1 => "dl1",
        }
    }

    /// Whether this is the base layer.
    #[must_use]
    pub fn is_base(self) -> bool {
        matches!(self, Self::MetagraphL0)
    }

    /// Default remote working directory, relative to the SSH user's home.
    #[must_use]
    pub fn default_directory(self) -> &'static str {
        match self {
            Self::MetagraphL0 => "code/metagraph-l0",
            Self::CurrencyL1 => "code/currency-l1",
            Self::DataL1 => "code/data-l1",
        }
    }

    /// Default jar file name, also used to find the running process.
    #[must_use]
    pub fn default_jar(self) -> &'static str {
        match self {
            Self::MetagraphL0 => "metagraph-l0.jar",
            Self::CurrencyL1 => "currency-l1.jar",
            Self::DataL1 => "data-l1.jar",
        }
    }
}

impl Display for Layer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
