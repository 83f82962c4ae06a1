//! Shared test doubles for cycle-level integration tests.
//!
//! Every collaborator trait gets a scripted fake so tests can drive the
//! monitor through whole cycles without SSH or HTTP and then assert on the
//! recorded calls.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{Duration as ChronoDuration, Utc};
use futures_util::future::BoxFuture;

use metagraph_monitor::alerts::{AlertKind, AlertSink};
use metagraph_monitor::config::GlobalConfig;
use metagraph_monitor::context::{CycleContext, Services};
use metagraph_monitor::models::decision::RestartScope;
use metagraph_monitor::models::node::{
    ClusterPeer, ClusterPov, JoinRequest, NodeInfo, NodeState, ReferenceSourceNode,
};
use metagraph_monitor::models::snapshot::{GlobalSnapshotInfo, SnapshotInfo};
use metagraph_monitor::monitor::Monitor;
use metagraph_monitor::network::backend::SnapshotBackend;
use metagraph_monitor::network::node_api::NodeApi;
use metagraph_monitor::network::reference::ReferenceResolver;
use metagraph_monitor::remediation::primitives::{PollBudget, KILL_GRACE};
use metagraph_monitor::remote::{RemoteSession, SessionPool};
use metagraph_monitor::{AppError, Result};

pub const ML0_PORT: u16 = 9000;
pub const CL1_PORT: u16 = 9100;
pub const DL1_PORT: u16 = 9200;

/// Host `n` (1-based) address.
pub fn ip(n: usize) -> String {
    format!("10.0.0.{n}")
}

/// Host `n` (1-based) name.
pub fn name(n: usize) -> String {
    format!("node-{n}")
}

fn layer_toml(layer: &str, base: u16, ignore: bool) -> String {
    format!(
        r#"
[metagraph.layers.{layer}]
ignore = {ignore}
public_port = {public}
p2p_port = {p2p}
cli_port = {cli}
"#,
        public = base,
        p2p = base + 1,
        cli = base + 2,
    )
}

/// TOML for `hosts` hosts with every layer configured.
pub fn config_toml(hosts: usize, cl1_ignored: bool, dl1_ignored: bool) -> String {
    let mut toml = String::from(
        r#"
[monitor]
interval_seconds = 300
snapshot_staleness_seconds = 240
command_timeout_seconds = 30
http_timeout_seconds = 5
ipc_name = "metagraph-monitor-test"

[network]
name = "integrationnet"

[metagraph]
id = "DAG0metagraphtoken"
name = "test-metagraph"
"#,
    );
    toml.push_str(&layer_toml("ml0", ML0_PORT, false));
    toml.push_str(&layer_toml("cl1", CL1_PORT, cl1_ignored));
    toml.push_str(&layer_toml("dl1", DL1_PORT, dl1_ignored));

    for n in 1..=hosts {
        toml.push_str(&format!(
            r#"
[[metagraph.nodes]]
name = "{name}"
ip = "{ip}"
ssh_key_file = "/keys/{name}"
"#,
            name = name(n),
            ip = ip(n),
        ));
        for layer in ["ml0", "cl1", "dl1"] {
            toml.push_str(&format!(
                r#"
[metagraph.nodes.keys.{layer}]
file = "{layer}.p12"
alias = "{layer}-alias"
password = "secret-{n}"
"#
            ));
        }
    }
    toml
}

/// Parsed config for `hosts` hosts.
pub fn test_config(hosts: usize, cl1_ignored: bool, dl1_ignored: bool) -> GlobalConfig {
    GlobalConfig::from_toml_str(&config_toml(hosts, cl1_ignored, dl1_ignored))
        .expect("valid test config")
}

// ── Remote sessions ─────────────────────────────────────

/// Scripted reply of a fake remote command.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(String),
    Fail(String),
}

/// `(host, command)` in execution order across all hosts.
pub type CommandLog = Arc<Mutex<Vec<(String, String)>>>;

/// Remote shell answering by substring rules, falling back to replies that
/// make every primitive succeed quietly.
pub struct FakeRemote {
    host: String,
    log: CommandLog,
    rules: Mutex<Vec<(String, VecDeque<Reply>)>>,
}

impl FakeRemote {
    pub fn new(host: &str, log: CommandLog) -> Self {
        Self {
            host: host.to_owned(),
            log,
            rules: Mutex::new(Vec::new()),
        }
    }

    /// Answer commands containing `needle` with `replies` in order; the last
    /// one repeats.
    pub fn reply(&self, needle: &str, replies: Vec<Reply>) {
        self.rules
            .lock()
            .unwrap()
            .push((needle.to_owned(), replies.into_iter().collect()));
    }

    fn answer(&self, command: &str) -> Reply {
        let mut rules = self.rules.lock().unwrap();
        for (needle, replies) in rules.iter_mut() {
            if command.contains(needle.as_str()) {
                return if replies.len() > 1 {
                    replies.pop_front().unwrap()
                } else {
                    replies.front().cloned().unwrap_or(Reply::Ok(String::new()))
                };
            }
        }
        default_reply(command)
    }
}

fn default_reply(command: &str) -> Reply {
    let out = if command.starts_with("ps -eo") {
        ""
    } else if command.contains("kill -0") {
        "dead"
    } else if command.starts_with("kill -") {
        "sent"
    } else if command.contains("archived-logs") {
        "absent"
    } else if command.contains("seq ") {
        "cleaned"
    } else if command.contains("incremental_snapshot/hash") {
        "missing"
    } else if command.contains("nohup java") {
        "started"
    } else {
        ""
    };
    Reply::Ok(out.to_owned())
}

impl RemoteSession for FakeRemote {
    fn execute<'a>(
        &'a self,
        command: &'a str,
        _timeout: std::time::Duration,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.log
                .lock()
                .unwrap()
                .push((self.host.clone(), command.to_owned()));
            match self.answer(command) {
                Reply::Ok(out) => Ok(out),
                Reply::Fail(msg) => Err(AppError::Remote(msg)),
            }
        })
    }
}

// ── Node API ────────────────────────────────────────────

/// One scripted `node/info` answer.
#[derive(Debug, Clone)]
pub enum Probe {
    State(NodeState),
    Fail,
}

/// Calls observed by [`FakeNodeApi`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Info {
        ip: String,
        port: u16,
        state: Option<NodeState>,
    },
    Pov {
        ip: String,
        port: u16,
    },
    Join {
        ip: String,
        port: u16,
        target: String,
    },
}

struct NodeScripts {
    default: Probe,
    scripts: HashMap<(String, u16), VecDeque<Probe>>,
    povs: HashMap<(String, u16), Option<ClusterPov>>,
    failing_joins: HashSet<String>,
    events: Vec<NodeEvent>,
}

/// Node API answering from per-endpoint scripts.
pub struct FakeNodeApi {
    inner: Mutex<NodeScripts>,
}

/// The view every healthy node reports by default.
pub fn shared_pov() -> ClusterPov {
    ClusterPov {
        peers: (1..=3)
            .map(|n| ClusterPeer {
                id: format!("peer-{}", ip(n)),
                ip: ip(n),
            })
            .collect(),
    }
}

/// A view that disagrees with [`shared_pov`].
pub fn split_pov() -> ClusterPov {
    ClusterPov {
        peers: vec![ClusterPeer {
            id: "peer-lonely".into(),
            ip: "10.9.9.9".into(),
        }],
    }
}

impl FakeNodeApi {
    pub fn new(default: Probe) -> Self {
        Self {
            inner: Mutex::new(NodeScripts {
                default,
                scripts: HashMap::new(),
                povs: HashMap::new(),
                failing_joins: HashSet::new(),
                events: Vec::new(),
            }),
        }
    }

    /// Answer `node/info` on `ip:port` with `probes`; the last one repeats.
    pub fn script(&self, ip: &str, port: u16, probes: Vec<Probe>) {
        self.inner
            .lock()
            .unwrap()
            .scripts
            .insert((ip.to_owned(), port), probes.into_iter().collect());
    }

    /// Cluster view of `ip:port`; `None` makes it unreachable.
    pub fn pov(&self, ip: &str, port: u16, pov: Option<ClusterPov>) {
        self.inner
            .lock()
            .unwrap()
            .povs
            .insert((ip.to_owned(), port), pov);
    }

    /// Reject join requests sent to `ip`.
    pub fn fail_join(&self, ip: &str) {
        self.inner.lock().unwrap().failing_joins.insert(ip.to_owned());
    }

    pub fn events(&self) -> Vec<NodeEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn info_calls(&self, ip: &str, port: u16) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, NodeEvent::Info { ip: i, port: p, .. } if i == ip && *p == port))
            .count()
    }

    /// Whether any call hit one of the ports of the layer based at `base`.
    pub fn touched_layer(&self, base: u16) -> bool {
        self.events().iter().any(|e| {
            let port = match e {
                NodeEvent::Info { port, .. }
                | NodeEvent::Pov { port, .. }
                | NodeEvent::Join { port, .. } => *port,
            };
            (base..base + 3).contains(&port)
        })
    }

    pub fn joins(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                NodeEvent::Join { ip, target, .. } => Some((ip, target)),
                _ => None,
            })
            .collect()
    }
}

impl NodeApi for FakeNodeApi {
    fn node_info<'a>(&'a self, ip: &'a str, public_port: u16) -> BoxFuture<'a, Result<NodeInfo>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            let default = inner.default.clone();
            let probe = match inner.scripts.get_mut(&(ip.to_owned(), public_port)) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue.front().cloned().unwrap_or(default),
                None => default,
            };
            let state = match &probe {
                Probe::State(state) => Some(state.clone()),
                Probe::Fail => None,
            };
            inner.events.push(NodeEvent::Info {
                ip: ip.to_owned(),
                port: public_port,
                state: state.clone(),
            });

            state
                .map(|state| NodeInfo {
                    state,
                    id: format!("peer-{ip}"),
                    host: ip.to_owned(),
                    public_port,
                    p2p_port: public_port + 1,
                })
                .ok_or_else(|| AppError::Http(format!("{ip}:{public_port} timed out")))
        })
    }

    fn cluster_pov<'a>(
        &'a self,
        ip: &'a str,
        public_port: u16,
    ) -> BoxFuture<'a, Result<ClusterPov>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            inner.events.push(NodeEvent::Pov {
                ip: ip.to_owned(),
                port: public_port,
            });
            match inner.povs.get(&(ip.to_owned(), public_port)) {
                Some(Some(pov)) => Ok(pov.clone()),
                Some(None) => Err(AppError::Http(format!("{ip}:{public_port} unreachable"))),
                None => Ok(shared_pov()),
            }
        })
    }

    fn join_cluster<'a>(
        &'a self,
        ip: &'a str,
        cli_port: u16,
        peer: &'a JoinRequest,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            inner.events.push(NodeEvent::Join {
                ip: ip.to_owned(),
                port: cli_port,
                target: peer.id.clone(),
            });
            if inner.failing_joins.contains(ip) {
                Err(AppError::Http(format!("join rejected by {ip}")))
            } else {
                Ok(())
            }
        })
    }
}

// ── Backend, resolver, alerts ───────────────────────────

/// Backend serving a fixed snapshot, or failing when none is set.
pub struct FixedBackend {
    snapshot: Mutex<Option<SnapshotInfo>>,
}

impl FixedBackend {
    pub fn new(snapshot: Option<SnapshotInfo>) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn set(&self, snapshot: Option<SnapshotInfo>) {
        *self.snapshot.lock().unwrap() = snapshot;
    }
}

/// Snapshot at ordinal 100 taken `age_seconds` ago.
pub fn snapshot_aged(age_seconds: i64) -> SnapshotInfo {
    SnapshotInfo {
        ordinal: 100,
        hash: "abc123".into(),
        timestamp: Utc::now() - ChronoDuration::seconds(age_seconds),
    }
}

impl SnapshotBackend for FixedBackend {
    fn latest_global_snapshot(&self) -> BoxFuture<'_, Result<GlobalSnapshotInfo>> {
        Box::pin(async move {
            Ok(GlobalSnapshotInfo {
                ordinal: 5_000,
                hash: "global".into(),
            })
        })
    }

    fn latest_metagraph_snapshot<'a>(
        &'a self,
        _metagraph_id: &'a str,
    ) -> BoxFuture<'a, Result<SnapshotInfo>> {
        Box::pin(async move {
            self.snapshot
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| AppError::Snapshot("backend unavailable".into()))
        })
    }
}

/// Resolver returning a fixed node, or failing when none is set.
pub struct FixedResolver {
    node: Mutex<Option<ReferenceSourceNode>>,
}

pub fn reference_node() -> ReferenceSourceNode {
    ReferenceSourceNode {
        ip: "52.0.0.1".into(),
        port: 9000,
        id: "global-peer".into(),
    }
}

impl FixedResolver {
    pub fn new(node: Option<ReferenceSourceNode>) -> Self {
        Self {
            node: Mutex::new(node),
        }
    }

    pub fn set(&self, node: Option<ReferenceSourceNode>) {
        *self.node.lock().unwrap() = node;
    }
}

impl ReferenceResolver for FixedResolver {
    fn resolve(&self) -> BoxFuture<'_, Result<ReferenceSourceNode>> {
        Box::pin(async move {
            self.node
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| AppError::Reference("no ready reference node".into()))
        })
    }
}

/// Alert sink recording every call as a short string.
#[derive(Default)]
pub struct RecordingAlerts {
    calls: Mutex<Vec<String>>,
}

impl RecordingAlerts {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlerts {
    fn restart_started<'a>(
        &'a self,
        scope: &'a RestartScope,
        reason: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push(format!("started {scope} {reason}"));
            Ok(())
        })
    }

    fn restart_failed<'a>(&'a self, reason: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(format!("failed {reason}"));
            Ok(())
        })
    }

    fn close_alert(&self, kind: AlertKind) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(format!("close {kind}"));
            Ok(())
        })
    }
}

// ── Harness ─────────────────────────────────────────────

/// Fakes wired into [`Services`].
pub struct Harness {
    pub config: Arc<GlobalConfig>,
    pub log: CommandLog,
    pub remotes: HashMap<String, Arc<FakeRemote>>,
    pub nodes: Arc<FakeNodeApi>,
    pub backend: Arc<FixedBackend>,
    pub resolver: Arc<FixedResolver>,
    pub alerts: Arc<RecordingAlerts>,
    pub services: Arc<Services>,
}

impl Harness {
    /// Every node ready, shared views, fresh snapshot.
    pub fn new(config: GlobalConfig) -> Self {
        Self::with_default_probe(config, Probe::State(NodeState::Ready))
    }

    pub fn with_default_probe(config: GlobalConfig, default: Probe) -> Self {
        let log: CommandLog = Arc::default();
        let mut pool = SessionPool::new();
        let mut remotes = HashMap::new();
        for host in config.hosts() {
            let remote = Arc::new(FakeRemote::new(&host.name, Arc::clone(&log)));
            pool.insert(host.name.clone(), Arc::clone(&remote) as Arc<dyn RemoteSession>);
            remotes.insert(host.name.clone(), remote);
        }

        let nodes = Arc::new(FakeNodeApi::new(default));
        let backend = Arc::new(FixedBackend::new(Some(snapshot_aged(30))));
        let resolver = Arc::new(FixedResolver::new(Some(reference_node())));
        let alerts = Arc::new(RecordingAlerts::default());

        let services = Arc::new(Services {
            sessions: pool,
            nodes: Arc::clone(&nodes) as Arc<dyn NodeApi>,
            backend: Arc::clone(&backend) as Arc<dyn SnapshotBackend>,
            resolver: Arc::clone(&resolver) as Arc<dyn ReferenceResolver>,
            alerts: Arc::clone(&alerts) as Arc<dyn AlertSink>,
        });

        Self {
            config: Arc::new(config),
            log,
            remotes,
            nodes,
            backend,
            resolver,
            alerts,
            services,
        }
    }

    pub fn remote(&self, n: usize) -> &Arc<FakeRemote> {
        &self.remotes[&name(n)]
    }

    /// Context for a cycle that saw `snapshot`.
    pub fn context_with(&self, snapshot: SnapshotInfo) -> CycleContext {
        CycleContext {
            cycle_id: "test-cycle".into(),
            config: Arc::clone(&self.config),
            services: Arc::clone(&self.services),
            reference: reference_node(),
            snapshot,
            started_at: Utc::now(),
            poll: PollBudget::default(),
            kill_grace: KILL_GRACE,
        }
    }

    /// Context with a fresh snapshot.
    pub fn context(&self) -> CycleContext {
        self.context_with(snapshot_aged(30))
    }

    pub fn monitor(&self) -> Monitor {
        Monitor::new(Arc::clone(&self.config), Arc::clone(&self.services))
    }

    pub fn commands(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().clone()
    }

    pub fn commands_on(&self, n: usize) -> Vec<String> {
        let host = name(n);
        self.commands()
            .into_iter()
            .filter(|(h, _)| *h == host)
            .map(|(_, c)| c)
            .collect()
    }
}
