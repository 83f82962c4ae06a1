//! Slack delivery for restart alerts.

pub mod blocks;
pub mod client;
