//! Global configuration parsing, validation, and credential loading.

use std::collections::{BTreeMap, HashSet};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::models::host::HostNode;
use crate::models::layer::Layer;
use crate::models::node::ReferenceSourceNode;
use crate::{AppError, Result};

/// Keychain service name used for runtime credentials.
pub const KEYRING_SERVICE: &str = "metagraph-monitor";

/// Nested Slack configuration for alert delivery.
///
/// The bot token is loaded at runtime via OS keychain or environment
/// variable, never from the TOML config file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SlackConfig {
    /// Channel where alerts are posted. Empty disables Slack delivery.
    #[serde(default)]
    pub channel_id: String,
    /// Bot user token used for posting messages (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

/// Monitoring loop settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MonitorConfig {
    /// Seconds between the start of two monitoring cycles.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// Maximum age of the latest metagraph snapshot before a full restart.
    #[serde(default = "default_staleness_seconds")]
    pub snapshot_staleness_seconds: u64,
    /// Timeout applied to every remote shell command.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
    /// Timeout applied to every HTTP request.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
    /// Named pipe / Unix socket identifier for the control client.
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            snapshot_staleness_seconds: default_staleness_seconds(),
            command_timeout_seconds: default_command_timeout(),
            http_timeout_seconds: default_http_timeout(),
            ipc_name: default_ipc_name(),
        }
    }
}

fn default_interval_seconds() -> u64 {
    300
}

fn default_staleness_seconds() -> u64 {
    240
}

fn default_command_timeout() -> u64 {
    120
}

fn default_http_timeout() -> u64 {
    15
}

fn default_ipc_name() -> String {
    "metagraph-monitor".into()
}

fn default_network_name() -> String {
    "mainnet".into()
}

fn default_load_balancer() -> String {
    "https://l0-lb-mainnet.constellationnetwork.io".into()
}

fn default_block_explorer() -> String {
    "https://be-mainnet.constellationnetwork.io".into()
}

/// The wider network the metagraph anchors to.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NetworkConfig {
    /// Network name, passed to nodes as `CL_APP_ENV`.
    #[serde(default = "default_network_name")]
    pub name: String,
    /// Global L0 load balancer used to discover reference nodes.
    #[serde(default = "default_load_balancer")]
    pub load_balancer_url: String,
    /// Block explorer backend serving snapshot metadata.
    #[serde(default = "default_block_explorer")]
    pub block_explorer_url: String,
    /// Fixed reference nodes; when set, the load balancer is not consulted.
    #[serde(default)]
    pub reference_nodes: Vec<ReferenceSourceNode>,
}

/// Static settings of one layer.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LayerConfig {
    /// Skip this layer entirely (probes, fork checks, kill, bring-up).
    #[serde(default)]
    pub ignore: bool,
    /// Public HTTP port.
    pub public_port: u16,
    /// Peer-to-peer port.
    pub p2p_port: u16,
    /// Local CLI port.
    pub cli_port: u16,
    /// Working directory on the host; relative paths start at the SSH home.
    pub directory: Option<String>,
    /// Jar file name inside the working directory.
    pub jar: Option<String>,
    /// Seed list downloaded before start and passed with `--seedlist`.
    pub seedlist_url: Option<String>,
    /// Allow list downloaded before start and passed with `--allowlist`.
    pub allowlist_url: Option<String>,
    /// Extra JVM arguments placed before `-jar`.
    #[serde(default)]
    pub jvm_args: Vec<String>,
    /// Extra environment variables; override the generated ones.
    #[serde(default)]
    pub additional_env: BTreeMap<String, String>,
}

impl LayerConfig {
    /// Working directory of `layer` on the host.
    #[must_use]
    pub fn directory(&self, layer: Layer) -> &str {
        self.directory
            .as_deref()
            .unwrap_or_else(|| layer.default_directory())
    }

    /// Jar file name of `layer`.
    #[must_use]
    pub fn jar(&self, layer: Layer) -> &str {
        self.jar.as_deref().unwrap_or_else(|| layer.default_jar())
    }
}

/// Layer table; dependent layers may be absent.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LayersConfig {
    /// Metagraph L0 settings.
    pub ml0: LayerConfig,
    /// Currency L1 settings.
    pub cl1: Option<LayerConfig>,
    /// Data L1 settings.
    pub dl1: Option<LayerConfig>,
}

/// The managed metagraph.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MetagraphConfig {
    /// Metagraph (token) identifier on the network.
    pub id: String,
    /// Display name used in alerts.
    pub name: String,
    /// Layer settings.
    pub layers: LayersConfig,
    /// Hosts, each running every non-ignored layer.
    pub nodes: Vec<HostNode>,
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Monitoring loop settings.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Network settings.
    pub network: NetworkConfig,
    /// Managed metagraph.
    pub metagraph: MetagraphConfig,
    /// Slack alert delivery.
    #[serde(default)]
    pub slack: SlackConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the Slack bot token from OS keychain with env-var fallback.
    ///
    /// Skipped when no Slack channel is configured.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a channel is configured but neither
    /// keychain nor env var provide the token.
    pub async fn load_credentials(&mut self) -> Result<()> {
        if self.slack.channel_id.is_empty() {
            return Ok(());
        }
        self.slack.bot_token = load_credential("slack_bot_token", "SLACK_BOT_TOKEN").await?;
        Ok(())
    }

    /// Settings of `layer`, or `None` when the layer is not configured.
    #[must_use]
    pub fn layer(&self, layer: Layer) -> Option<&LayerConfig> {
        match layer {
            Layer::MetagraphL0 => Some(&self.metagraph.layers.ml0),
            Layer::CurrencyL1 => self.metagraph.layers.cl1.as_ref(),
            Layer::DataL1 => self.metagraph.layers.dl1.as_ref(),
        }
    }

    /// Settings of `layer`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when the layer is not configured.
    pub fn require_layer(&self, layer: Layer) -> Result<&LayerConfig> {
        self.layer(layer)
            .ok_or_else(|| AppError::NotFound(format!("layer {layer} is not configured")))
    }

    /// Configured, non-ignored layers, base layer first.
    #[must_use]
    pub fn active_layers(&self) -> Vec<Layer> {
        Layer::ALL
            .into_iter()
            .filter(|layer| self.layer(*layer).is_some_and(|cfg| !cfg.ignore))
            .collect()
    }

    /// Configured hosts in config order.
    #[must_use]
    pub fn hosts(&self) -> &[HostNode] {
        &self.metagraph.nodes
    }

    /// Look up a host by name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown names.
    pub fn host(&self, name: &str) -> Result<&HostNode> {
        self.metagraph
            .nodes
            .iter()
            .find(|host| host.name == name)
            .ok_or_else(|| AppError::NotFound(format!("host {name} is not configured")))
    }

    /// Interval between monitoring cycles.
    #[must_use]
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_seconds)
    }

    /// Maximum tolerated snapshot age.
    #[must_use]
    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.monitor.snapshot_staleness_seconds)
    }

    /// Timeout for one remote shell command.
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.monitor.command_timeout_seconds)
    }

    /// Timeout for one HTTP request.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.monitor.http_timeout_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.monitor.interval_seconds == 0 {
            return Err(AppError::Config(
                "monitor.interval_seconds must be greater than zero".into(),
            ));
        }
        if self.monitor.snapshot_staleness_seconds == 0 {
            return Err(AppError::Config(
                "monitor.snapshot_staleness_seconds must be greater than zero".into(),
            ));
        }
        if self.monitor.command_timeout_seconds == 0 || self.monitor.http_timeout_seconds == 0 {
            return Err(AppError::Config("timeouts must be greater than zero".into()));
        }
        if self.metagraph.id.trim().is_empty() {
            return Err(AppError::Config("metagraph.id must not be empty".into()));
        }
        if self.metagraph.nodes.is_empty() {
            return Err(AppError::Config(
                "metagraph.nodes must list at least one host".into(),
            ));
        }
        if self.metagraph.layers.ml0.ignore {
            return Err(AppError::Config("the ml0 layer cannot be ignored".into()));
        }

        let mut names = HashSet::new();
        let mut ips = HashSet::new();
        for host in &self.metagraph.nodes {
            if !names.insert(host.name.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate host name '{}'",
                    host.name
                )));
            }
            if !ips.insert(host.ip.as_str()) {
                return Err(AppError::Config(format!("duplicate host ip '{}'", host.ip)));
            }
        }

        for layer in self.active_layers() {
            let cfg = self.require_layer(layer)?;
            let ports = [cfg.public_port, cfg.p2p_port, cfg.cli_port];
            if ports.contains(&0) {
                return Err(AppError::Config(format!("layer {layer} ports must be non-zero")));
            }
            if ports.iter().collect::<HashSet<_>>().len() != ports.len() {
                return Err(AppError::Config(format!("layer {layer} ports must be distinct")));
            }
            if let Some(host) = self
                .metagraph
                .nodes
                .iter()
                .find(|host| host.key_for(layer).is_none())
            {
                return Err(AppError::Config(format!(
                    "host '{}' has no key material for layer {layer}",
                    host.name
                )));
            }
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key).map_err(|_| {
        AppError::Config(format!(
            "credential {keyring_key} not found in keychain or {env_key} env var"
        ))
    })
}
