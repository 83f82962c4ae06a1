//! Slack Block Kit builders for restart alerts.

use slack_morphism::prelude::{SlackBlock, SlackBlockText, SlackSectionBlock};

use crate::models::decision::RestartScope;

/// Build a severity-formatted section block.
#[must_use]
pub fn severity_section(level: &str, message: &str) -> SlackBlock {
    let prefix = match level {
        "success" => "\u{2705}",
        "warning" => "\u{26a0}\u{fe0f}",
        "error" => "\u{274c}",
        _ => "\u{2139}\u{fe0f}",
    };
    SlackBlock::Section(SlackSectionBlock::new().with_text(SlackBlockText::MarkDown(
        format!("{prefix} {message}").into(),
    )))
}

/// Text of a "restart started" alert.
#[must_use]
pub fn restart_started_message(metagraph: &str, scope: &RestartScope, reason: &str) -> String {
    format!(
        "*Restart started* on metagraph `{metagraph}`\n\
         • Scope: `{scope}`\n\
         • Reason: `{reason}`"
    )
}

/// Text of a "restart failed" alert.
#[must_use]
pub fn restart_failed_message(metagraph: &str, reason: &str) -> String {
    format!(
        "*Restart failed* on metagraph `{metagraph}`\n\
         {reason}\n\
         Manual intervention may be required; the next cycle will re-evaluate."
    )
}

/// Text posted when an open alert is closed.
#[must_use]
pub fn alert_closed_message(metagraph: &str, alert: &str) -> String {
    format!("*Resolved* `{alert}` on metagraph `{metagraph}`: cluster is healthy")
}

/// Blocks of a "restart started" alert.
#[must_use]
pub fn restart_started_blocks(metagraph: &str, scope: &RestartScope, reason: &str) -> Vec<SlackBlock> {
    vec![severity_section(
        "warning",
        &restart_started_message(metagraph, scope, reason),
    )]
}

/// Blocks of a "restart failed" alert.
#[must_use]
pub fn restart_failed_blocks(metagraph: &str, reason: &str) -> Vec<SlackBlock> {
    vec![severity_section(
        "error",
        &restart_failed_message(metagraph, reason),
    )]
}

/// Blocks posted when an alert is closed.
#[must_use]
pub fn alert_closed_blocks(metagraph: &str, alert: &str) -> Vec<SlackBlock> {
    vec![severity_section(
        "success",
        &alert_closed_message(metagraph, alert),
    )]
}
