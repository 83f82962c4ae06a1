//! Restart alerting.
//!
//! The monitor raises a "restart started" alert before remediation, a
//! "restart failed" alert when remediation errors, and closes whatever is
//! open once a cycle ends healthy. Delivery is fire-and-forget: an alert
//! failing to send never changes the remediation outcome.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use slack_morphism::prelude::SlackChannelId;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::models::decision::RestartScope;
use crate::slack::blocks;
use crate::slack::client::{SlackMessage, SlackService};
use crate::Result;

/// Alerts the monitor can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlertKind {
    /// Remediation has begun.
    RestartStarted,
    /// Remediation failed.
    RestartFailed,
}

impl AlertKind {
    /// Both alert kinds.
    pub const ALL: [AlertKind; 2] = [AlertKind::RestartStarted, AlertKind::RestartFailed];

    /// Stable label used in messages and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RestartStarted => "restart-started",
            Self::RestartFailed => "restart-failed",
        }
    }
}

impl Display for AlertKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert delivery consumed by the monitor cycle.
pub trait AlertSink: Send + Sync {
    /// Open a "restart started" alert.
    ///
    /// # Errors
    ///
    /// Returns an error only if the alert could not be queued.
    fn restart_started<'a>(
        &'a self,
        scope: &'a RestartScope,
        reason: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    /// Open a "restart failed" alert.
    ///
    /// # Errors
    ///
    /// Returns an error only if the alert could not be queued.
    fn restart_failed<'a>(&'a self, reason: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Close `kind` if it is open; closing a closed alert does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error only if the close notice could not be queued.
    fn close_alert(&self, kind: AlertKind) -> BoxFuture<'_, Result<()>>;
}

/// [`AlertSink`] posting to a Slack channel, or only logging without one.
pub struct ChannelAlertSink {
    metagraph: String,
    slack: Option<(Arc<SlackService>, SlackChannelId)>,
    open: Mutex<BTreeSet<AlertKind>>,
}

impl ChannelAlertSink {
    /// Sink delivering to `channel` through `slack`.
    #[must_use]
    pub fn slack(metagraph: impl Into<String>, slack: Arc<SlackService>, channel: &str) -> Self {
        Self {
            metagraph: metagraph.into(),
            slack: Some((slack, SlackChannelId(channel.to_owned()))),
            open: Mutex::new(BTreeSet::new()),
        }
    }

    /// Sink that records alerts in the log only.
    #[must_use]
    pub fn log_only(metagraph: impl Into<String>) -> Self {
        Self {
            metagraph: metagraph.into(),
            slack: None,
            open: Mutex::new(BTreeSet::new()),
        }
    }

    /// Alerts currently open.
    pub async fn open_alerts(&self) -> Vec<AlertKind> {
        self.open.lock().await.iter().copied().collect()
    }

    fn deliver(&self, fallback: String, blocks: Vec<slack_morphism::prelude::SlackBlock>) -> Result<()> {
        match &self.slack {
            Some((service, channel)) => {
                service.try_enqueue(SlackMessage::with_blocks(channel.clone(), fallback, blocks))
            }
            None => Ok(()),
        }
    }
}

impl AlertSink for ChannelAlertSink {
    fn restart_started<'a>(
        &'a self,
        scope: &'a RestartScope,
        reason: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.open.lock().await.insert(AlertKind::RestartStarted);
            warn!(alert = %AlertKind::RestartStarted, %scope, reason, "alert opened");
            self.deliver(
                blocks::restart_started_message(&self.metagraph, scope, reason),
                blocks::restart_started_blocks(&self.metagraph, scope, reason),
            )
        })
    }

    fn restart_failed<'a>(&'a self, reason: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.open.lock().await.insert(AlertKind::RestartFailed);
            error!(alert = %AlertKind::RestartFailed, reason, "alert opened");
            self.deliver(
                blocks::restart_failed_message(&self.metagraph, reason),
                blocks::restart_failed_blocks(&self.metagraph, reason),
            )
        })
    }

    fn close_alert(&self, kind: AlertKind) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.open.lock().await.remove(&kind) {
                return Ok(());
            }
            info!(alert = %kind, "alert closed");
            self.deliver(
                blocks::alert_closed_message(&self.metagraph, kind.as_str()),
                blocks::alert_closed_blocks(&self.metagraph, kind.as_str()),
            )
        })
    }
}
