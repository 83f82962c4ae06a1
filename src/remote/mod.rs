//! Remote command execution on configured hosts.
//!
//! The [`RemoteSession`] trait is the only way the monitor touches a host's
//! shell. One session exists per host for the lifetime of the process and is
//! shared across cycles through the [`SessionPool`].

pub mod ssh;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::config::GlobalConfig;
use crate::{AppError, Result};

/// A shell session on one host.
///
/// Implementations must serialize commands: the session carries working
/// directory state from one command to the next.
pub trait RemoteSession: Send + Sync {
    /// Run `command` and return its stdout.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Remote`] if the session cannot be reached, the
    /// command exceeds `timeout`, or it exits with a non-zero status.
    fn execute<'a>(&'a self, command: &'a str, timeout: Duration) -> BoxFuture<'a, Result<String>>;
}

/// Sessions keyed by configured host name.
#[derive(Clone, Default)]
pub struct SessionPool {
    sessions: HashMap<String, Arc<dyn RemoteSession>>,
}

impl SessionPool {
    /// Empty pool; populate with [`insert`](Self::insert).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One lazily connected SSH session per configured host.
    #[must_use]
    pub fn ssh(config: &GlobalConfig) -> Self {
        let mut pool = Self::new();
        for host in config.hosts() {
            pool.insert(host.name.clone(), Arc::new(ssh::SshSession::new(host)));
        }
        pool
    }

    /// Register the session for `host`.
    pub fn insert(&mut self, host: impl Into<String>, session: Arc<dyn RemoteSession>) {
        self.sessions.insert(host.into(), session);
    }

    /// Session for `host`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if no session was registered.
    pub fn get(&self, host: &str) -> Result<Arc<dyn RemoteSession>> {
        self.sessions
            .get(host)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("no remote session for host {host}")))
    }
}

/// Quote `value` for a POSIX shell.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
