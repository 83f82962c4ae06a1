//! Configured hosts and their credentials.

use serde::{Deserialize, Serialize};

use super::layer::Layer;

fn default_ssh_user() -> String {
    "root".into()
}

fn default_ssh_port() -> u16 {
    22
}

/// Keystore used by one layer process on a host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct KeyMaterial {
    /// Keystore file name inside the layer directory.
    pub file: String,
    /// Key alias inside the keystore.
    pub alias: String,
    /// Keystore password.
    pub password: String,
}

/// Per-layer key material of a host. Ignored layers may omit theirs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HostKeys {
    /// Metagraph L0 keystore.
    pub ml0: Option<KeyMaterial>,
    /// Currency L1 keystore.
    pub cl1: Option<KeyMaterial>,
    /// Data L1 keystore.
    pub dl1: Option<KeyMaterial>,
}

/// One configured machine running metagraph software.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HostNode {
    /// Operator-facing name, unique across the config.
    pub name: String,
    /// Public IP address of the host.
    pub ip: String,
    /// SSH login user.
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    /// SSH port.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    /// Private key used for the SSH session.
    pub ssh_key_file: String,
    /// Keystores per layer.
    #[serde(default)]
    pub keys: HostKeys,
}

impl HostNode {
    /// Key material for `layer`, if configured.
    #[must_use]
    pub fn key_for(&self, layer: Layer) -> Option<&KeyMaterial> {
        match layer {
            Layer::MetagraphL0 => self.keys.ml0.as_ref(),
            Layer::CurrencyL1 => self.keys.cl1.as_ref(),
            Layer::DataL1 => self.keys.dl1.as_ref(),
        }
    }
}
