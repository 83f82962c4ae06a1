//! Shell commands executed on hosts.
//!
//! Every builder returns a complete command line for the host's persistent
//! shell. Values from config are shell-quoted. Builders never `export`;
//! environment is passed through `env` so one layer's settings cannot leak
//! into the next command on the same session.

use std::collections::BTreeMap;

use regex::Regex;

use crate::config::{GlobalConfig, LayerConfig};
use crate::models::host::HostNode;
use crate::models::layer::Layer;
use crate::models::node::ReferenceSourceNode;
use crate::remote::shell_quote;
use crate::{AppError, Result};

/// Matches one `ps -eo pid=,args=` line.
const PS_LINE_PATTERN: &str = r"^\s*(\d+)\s+(.+)$";

/// How a layer process is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Base layer bootstrap from the latest snapshot on disk.
    Rollback,
    /// Dependent layer bootstrap; forms a fresh cluster.
    InitialValidator,
    /// Joins an existing cluster after reaching ready-to-join.
    Validator,
}

impl StartMode {
    /// Bootstrap mode of `layer`.
    #[must_use]
    pub fn initial_for(layer: Layer) -> Self {
        if layer.is_base() {
            Self::Rollback
        } else {
            Self::InitialValidator
        }
    }

    /// Jar sub-command.
    #[must_use]
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Rollback => "run-rollback",
            Self::InitialValidator => "run-initial-validator",
            Self::Validator => "run-validator",
        }
    }
}

/// The base-layer node a dependent layer attaches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L0Peer {
    /// Peer identity of the base-layer node.
    pub id: String,
    /// Address of the base-layer node.
    pub ip: String,
    /// Public port of the base-layer node.
    pub port: u16,
}

/// Working directory of `layer` as a shell word.
#[must_use]
pub fn layer_dir(cfg: &LayerConfig, layer: Layer) -> String {
    remote_path(cfg.directory(layer))
}

/// Absolute paths are quoted as-is; relative ones start at `$HOME`.
#[must_use]
pub fn remote_path(path: &str) -> String {
    if path.starts_with('/') {
        shell_quote(path)
    } else {
        format!("\"$HOME\"/{}", shell_quote(path))
    }
}

/// List every process with its full command line.
#[must_use]
pub fn list_processes() -> &'static str {
    "ps -eo pid=,args="
}

/// Pids whose command line runs `jar`.
///
/// # Errors
///
/// Returns `AppError::Remote` if the line pattern fails to compile.
pub fn parse_pids(ps_output: &str, jar: &str) -> Result<Vec<u32>> {
    let pattern = Regex::new(PS_LINE_PATTERN)
        .map_err(|err| AppError::Remote(format!("bad process pattern: {err}")))?;
    let needle = format!("-jar {jar}");

    Ok(ps_output
        .lines()
        .filter_map(|line| pattern.captures(line))
        .filter(|caps| caps.get(2).is_some_and(|args| args.as_str().contains(&needle)))
        .filter_map(|caps| caps.get(1).and_then(|pid| pid.as_str().parse().ok()))
        .collect())
}

/// Send `signal` to `pid`, ignoring already-exited processes.
#[must_use]
pub fn signal_process(pid: u32, signal: &str) -> String {
    format!("kill -{signal} {pid} 2>/dev/null; echo sent")
}

/// Prints `alive` or `dead` for `pid`.
#[must_use]
pub fn probe_process(pid: u32) -> String {
    format!("if kill -0 {pid} 2>/dev/null; then echo alive; else echo dead; fi")
}

/// Move the layer's `logs` directory aside; prints `archived` or `absent`.
#[must_use]
pub fn archive_logs(cfg: &LayerConfig, layer: Layer, stamp: &str) -> String {
    let dir = layer_dir(cfg, layer);
    let target = shell_quote(&format!("logs-{stamp}"));
    format!(
        "if [ -d {dir}/logs ]; then mkdir -p {dir}/archived-logs && \
         mv {dir}/logs {dir}/archived-logs/{target} && echo archived; \
         else echo absent; fi"
    )
}

/// Delete local snapshot state for ordinals `from..=to`; prints `cleaned` or
/// `absent`.
#[must_use]
pub fn cleanup_snapshots(ml0: &LayerConfig, from: u64, to: u64) -> String {
    let data = format!("{}/data", layer_dir(ml0, Layer::MetagraphL0));
    format!(
        "if [ -d {data} ]; then for o in $(seq {from} {to}); do \
         rm -rf {data}/incremental_snapshot/ordinal/$o {data}/calculated_state/$o; \
         done; echo cleaned; else echo absent; fi"
    )
}

/// Prints `present` when the snapshot file and calculated state for the
/// given hash and ordinal exist on disk, `missing` otherwise.
#[must_use]
pub fn check_snapshot_state(ml0: &LayerConfig, hash: &str, ordinal: u64) -> String {
    let data = format!("{}/data", layer_dir(ml0, Layer::MetagraphL0));
    format!(
        "if [ -e {data}/incremental_snapshot/hash/{hash} ] && \
         [ -e {data}/calculated_state/{ordinal} ]; then echo present; else echo missing; fi",
        hash = shell_quote(hash)
    )
}

/// Environment a layer process is started with.
///
/// # Errors
///
/// Returns `AppError::Config` when the host has no key material for `layer`
/// or a dependent layer is started without its base-layer peer.
pub fn start_env(
    config: &GlobalConfig,
    host: &HostNode,
    layer: Layer,
    reference: &ReferenceSourceNode,
    l0_peer: Option<&L0Peer>,
) -> Result<BTreeMap<String, String>> {
    let cfg = config.require_layer(layer)?;
    let key = host.key_for(layer).ok_or_else(|| {
        AppError::Config(format!("host {} has no key material for {layer}", host.name))
    })?;

    let mut env = BTreeMap::new();
    env.insert("CL_KEYSTORE".to_owned(), key.file.clone());
    env.insert("CL_KEYALIAS".to_owned(), key.alias.clone());
    env.insert("CL_PASSWORD".to_owned(), key.password.clone());
    env.insert("CL_PUBLIC_HTTP_PORT".to_owned(), cfg.public_port.to_string());
    env.insert("CL_P2P_HTTP_PORT".to_owned(), cfg.p2p_port.to_string());
    env.insert("CL_CLI_HTTP_PORT".to_owned(), cfg.cli_port.to_string());
    env.insert("CL_APP_ENV".to_owned(), config.network.name.clone());
    env.insert("CL_COLLATERAL".to_owned(), "0".to_owned());
    env.insert("CL_GLOBAL_L0_PEER_HTTP_HOST".to_owned(), reference.ip.clone());
    env.insert("CL_GLOBAL_L0_PEER_HTTP_PORT".to_owned(), reference.port.to_string());
    env.insert("CL_GLOBAL_L0_PEER_ID".to_owned(), reference.id.clone());

    if !layer.is_base() {
        let peer = l0_peer.ok_or_else(|| {
            AppError::Config(format!("{layer} on {} needs its ml0 peer", host.name))
        })?;
        env.insert("CL_L0_PEER_HTTP_HOST".to_owned(), peer.ip.clone());
        env.insert("CL_L0_PEER_HTTP_PORT".to_owned(), peer.port.to_string());
        env.insert("CL_L0_PEER_ID".to_owned(), peer.id.clone());
        env.insert("CL_L0_TOKEN_IDENTIFIER".to_owned(), config.metagraph.id.clone());
    }

    for (name, value) in &cfg.additional_env {
        env.insert(name.clone(), value.clone());
    }

    Ok(env)
}

/// Start `layer` on `host` in `mode`, detached from the session.
///
/// # Errors
///
/// See [`start_env`].
pub fn start_layer(
    config: &GlobalConfig,
    host: &HostNode,
    layer: Layer,
    mode: StartMode,
    reference: &ReferenceSourceNode,
    l0_peer: Option<&L0Peer>,
) -> Result<String> {
    let cfg = config.require_layer(layer)?;
    let env = start_env(config, host, layer, reference, l0_peer)?;

    let mut steps = vec![format!("cd {}", layer_dir(cfg, layer))];
    let mut flags = String::new();
    if let Some(url) = &cfg.seedlist_url {
        steps.push(format!("curl -sfL -o seedlist {}", shell_quote(url)));
        flags.push_str(" --seedlist seedlist");
    }
    if let Some(url) = &cfg.allowlist_url {
        steps.push(format!("curl -sfL -o allowlist {}", shell_quote(url)));
        flags.push_str(" --allowlist allowlist");
    }

    let assignments: Vec<String> = env
        .iter()
        .map(|(name, value)| format!("{name}={}", shell_quote(value)))
        .collect();
    let jvm: String = cfg
        .jvm_args
        .iter()
        .map(|arg| format!(" {}", shell_quote(arg)))
        .collect();

    steps.push(format!(
        "{{ env {assignments} nohup java{jvm} -jar {jar} {mode} --ip {ip}{flags} > /dev/null 2>&1 & }}",
        assignments = assignments.join(" "),
        jar = shell_quote(cfg.jar(layer)),
        mode = mode.as_arg(),
        ip = shell_quote(&host.ip),
    ));
    steps.push("echo started".to_owned());

    Ok(steps.join(" && "))
}
