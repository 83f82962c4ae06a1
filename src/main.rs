#![forbid(unsafe_code)]

//! `metagraph-monitor`: metagraph health monitor daemon.
//!
//! Bootstraps configuration, opens one remote session per host, starts the
//! Slack alert sender and the IPC server for `metagraph-monitor-ctl`, then
//! runs monitoring cycles until shut down.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use metagraph_monitor::alerts::{AlertSink, ChannelAlertSink};
use metagraph_monitor::config::GlobalConfig;
use metagraph_monitor::context::Services;
use metagraph_monitor::ipc::server::spawn_ipc_server;
use metagraph_monitor::monitor::Monitor;
use metagraph_monitor::network::backend::BlockExplorerClient;
use metagraph_monitor::network::http_client;
use metagraph_monitor::network::node_api::{HttpNodeApi, NodeApi};
use metagraph_monitor::network::reference::NetworkReferenceResolver;
use metagraph_monitor::remote::SessionPool;
use metagraph_monitor::slack::client::SlackService;
use metagraph_monitor::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "metagraph-monitor", about = "Metagraph health monitor", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Rebuild the whole metagraph on the first cycle.
    #[arg(long)]
    force_restart: bool,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("metagraph-monitor bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_credentials().await?;
    let config = Arc::new(config);
    info!(
        metagraph = %config.metagraph.name,
        hosts = config.hosts().len(),
        layers = ?config.active_layers(),
        "configuration loaded"
    );

    let ct = CancellationToken::new();

    // ── Alerting ────────────────────────────────────────
    let (alerts, slack_handle): (Arc<dyn AlertSink>, _) = if config.slack.bot_token.is_empty() {
        info!("slack not configured; alerts are logged only");
        (
            Arc::new(ChannelAlertSink::log_only(config.metagraph.name.clone())),
            None,
        )
    } else {
        let (svc, handle) = SlackService::start(&config.slack).map_err(|err| {
            error!(%err, "slack service start failed");
            err
        })?;
        (
            Arc::new(ChannelAlertSink::slack(
                config.metagraph.name.clone(),
                Arc::new(svc),
                &config.slack.channel_id,
            )),
            Some(handle),
        )
    };

    // ── Collaborators ───────────────────────────────────
    let client = http_client(config.http_timeout())?;
    let nodes: Arc<dyn NodeApi> = Arc::new(HttpNodeApi::new(client.clone()));
    let services = Arc::new(Services {
        sessions: SessionPool::ssh(&config),
        nodes: Arc::clone(&nodes),
        backend: Arc::new(BlockExplorerClient::new(
            client.clone(),
            config.network.block_explorer_url.clone(),
        )),
        resolver: Arc::new(NetworkReferenceResolver::new(
            client,
            nodes,
            config.network.load_balancer_url.clone(),
            config.network.reference_nodes.clone(),
        )),
        alerts,
    });

    let monitor = Arc::new(Monitor::new(Arc::clone(&config), services));
    if args.force_restart {
        info!("forced restart requested on the command line");
        monitor.force_switch().request();
    }

    if args.once {
        let report = monitor.run_cycle().await;
        info!(
            cycle_id = %report.cycle_id,
            outcome = report.outcome.label(),
            final_state = %report.final_state(),
            "single cycle complete"
        );
        // Let queued alerts drain before the runtime goes away.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        return Ok(());
    }

    // ── Background tasks ────────────────────────────────
    let ipc_handle = spawn_ipc_server(&config.monitor.ipc_name, Arc::clone(&monitor), ct.clone())?;
    let monitor_handle = Arc::clone(&monitor).spawn(ct.clone());
    info!(interval_seconds = config.monitor.interval_seconds, "monitor running");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = tokio::join!(ipc_handle, monitor_handle);
    if let Some(handle) = slack_handle {
        handle.abort();
    }
    info!("metagraph-monitor shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
