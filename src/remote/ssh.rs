//! Persistent SSH shell session.
//!
//! Spawns `ssh ... bash -s` once per host and feeds commands through the
//! child's stdin. Every command is followed by a per-session end marker that
//! carries the exit status, so stdout can be read line by line until the
//! marker shows up. The child has `kill_on_drop(true)`; a timed out or broken
//! session is dropped and reconnected on the next command.

use std::process::Stdio;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::RemoteSession;
use crate::models::host::HostNode;
use crate::{AppError, Result};

/// Longest command output echoed back inside an error message.
const MAX_ERROR_OUTPUT: usize = 512;

/// Live `ssh` child process.
struct ShellProcess {
    /// Kept alive so `kill_on_drop` applies.
    _child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// One persistent shell on a remote host.
pub struct SshSession {
    host: String,
    args: Vec<String>,
    marker: String,
    shell: Mutex<Option<ShellProcess>>,
}

impl SshSession {
    /// Build a session for `host`; the connection opens on first use.
    #[must_use]
    pub fn new(host: &HostNode) -> Self {
        let args = vec![
            "-i".to_owned(),
            host.ssh_key_file.clone(),
            "-p".to_owned(),
            host.ssh_port.to_string(),
            "-o".to_owned(),
            "BatchMode=yes".to_owned(),
            "-o".to_owned(),
            "StrictHostKeyChecking=accept-new".to_owned(),
            "-o".to_owned(),
            "ServerAliveInterval=30".to_owned(),
            format!("{}@{}", host.ssh_user, host.ip),
            "bash".to_owned(),
            "-s".to_owned(),
        ];
        Self {
            host: host.name.clone(),
            args,
            marker: format!("__metagraph_monitor_{}__", Uuid::new_v4().simple()),
            shell: Mutex::new(None),
        }
    }

    fn connect(&self) -> Result<ShellProcess> {
        let mut child = Command::new("ssh")
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| AppError::Remote(format!("{}: failed to spawn ssh: {err}", self.host)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Remote(format!("{}: failed to capture ssh stdin", self.host)))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            AppError::Remote(format!("{}: failed to capture ssh stdout", self.host))
        })?;

        info!(host = %self.host, "ssh session opened");
        Ok(ShellProcess {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Write one command and collect stdout up to the end marker.
    async fn run(&self, shell: &mut ShellProcess, command: &str) -> Result<(i32, String)> {
        // stdin is redirected so the command cannot swallow the rest of the script.
        let script = format!(
            "{{ {command}\n}} < /dev/null\nprintf '\\n%s %s\\n' {marker} \"$?\"\n",
            marker = self.marker
        );
        shell
            .stdin
            .write_all(script.as_bytes())
            .await
            .map_err(|err| AppError::Remote(format!("{}: write failed: {err}", self.host)))?;
        shell
            .stdin
            .flush()
            .await
            .map_err(|err| AppError::Remote(format!("{}: flush failed: {err}", self.host)))?;

        let mut output = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            let read = shell
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|err| AppError::Remote(format!("{}: read failed: {err}", self.host)))?;
            if read == 0 {
                return Err(AppError::Remote(format!(
                    "{}: ssh session closed unexpectedly",
                    self.host
                )));
            }
            if let Some(status) = line.trim_end().strip_prefix(self.marker.as_str()) {
                let code = status.trim().parse::<i32>().unwrap_or(-1);
                return Ok((code, output.trim_end().to_owned()));
            }
            output.push_str(&line);
        }
    }
}

impl RemoteSession for SshSession {
    fn execute<'a>(&'a self, command: &'a str, timeout: Duration) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut guard = self.shell.lock().await;
            if guard.is_none() {
                *guard = Some(self.connect()?);
            }
            let Some(shell) = guard.as_mut() else {
                return Err(AppError::Remote(format!("{}: no shell", self.host)));
            };

            debug!(host = %self.host, command, "remote command");
            let result = tokio::time::timeout(timeout, self.run(shell, command)).await;

            match result {
                Ok(Ok((0, output))) => Ok(output),
                Ok(Ok((code, output))) => Err(AppError::Remote(format!(
                    "{}: command exited with status {code}: {}",
                    self.host,
                    truncate(&output)
                ))),
                Ok(Err(err)) => {
                    warn!(host = %self.host, %err, "ssh session broken; reconnecting on next command");
                    *guard = None;
                    Err(err)
                }
                Err(_) => {
                    warn!(host = %self.host, ?timeout, "remote command timed out; dropping session");
                    *guard = None;
                    Err(AppError::Remote(format!(
                        "{}: command timed out after {}s",
                        self.host,
                        timeout.as_secs()
                    )))
                }
            }
        })
    }
}

fn truncate(text: &str) -> &str {
    if text.len() <= MAX_ERROR_OUTPUT {
        return text;
    }
    let mut end = MAX_ERROR_OUTPUT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
