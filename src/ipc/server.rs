//! Local IPC server for `metagraph-monitor-ctl` commands.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Accepts line-delimited JSON commands
//! and answers each with one JSON line.
//!
//! ## Protocol
//!
//! Request:
//! ```json
//! {"command": "force-restart"}
//! {"command": "status"}
//! ```
//!
//! Response:
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "unknown command: foo"}
//! ```

use std::sync::Arc;

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::monitor::Monitor;
use crate::{AppError, Result};

/// Inbound request.
#[derive(Debug, Deserialize)]
struct IpcRequest {
    /// Command verb.
    command: String,
}

/// Outbound response.
#[derive(Debug, Serialize)]
struct IpcResponse {
    /// Whether the command succeeded.
    ok: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl IpcResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Spawn the IPC server task.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_ipc_server(
    name: &str,
    monitor: Arc<Monitor>,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = name.to_owned();
    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "IPC server listening");

    let handle = tokio::spawn(
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                tokio::spawn(handle_connection(stream, Arc::clone(&monitor)));
                            }
                            Err(err) => warn!(%err, "IPC accept failed"),
                        }
                    }
                }
            }
        }
        .instrument(info_span!("ipc_server")),
    );

    Ok(handle)
}

async fn handle_connection(stream: interprocess::local_socket::tokio::Stream, monitor: Arc<Monitor>) {
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let mut response_line = handle_line(trimmed, &monitor).await;
                    response_line.push('\n');
                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                        warn!(%err, "failed to write ipc response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "ipc read error");
                    break;
                }
            }
        }

        info!("IPC connection closed");
    }
    .instrument(info_span!("ipc_conn"))
    .await;
}

/// Answer one request line with one JSON response (without the newline).
pub async fn handle_line(line: &str, monitor: &Monitor) -> String {
    let response = match serde_json::from_str::<IpcRequest>(line) {
        Ok(request) => dispatch_command(&request, monitor).await,
        Err(err) => IpcResponse::error(format!("invalid json: {err}")),
    };

    serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"ok":false,"error":"serialization failed"}"#.to_owned())
}

async fn dispatch_command(request: &IpcRequest, monitor: &Monitor) -> IpcResponse {
    match request.command.as_str() {
        "force-restart" => {
            monitor.force_switch().request();
            info!("forced restart requested via IPC");
            IpcResponse::success(serde_json::json!({ "force_restart": "pending" }))
        }
        "status" => {
            let last = monitor.last_summary().await;
            IpcResponse::success(serde_json::json!({
                "force_restart_pending": monitor.force_switch().is_requested(),
                "last_cycle": last,
            }))
        }
        other => IpcResponse::error(format!("unknown command: {other}")),
    }
}
