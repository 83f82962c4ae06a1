#![forbid(unsafe_code)]

//! Health monitor for a metagraph: detects degraded layers and restarts one
//! node, one layer or the whole metagraph.

pub mod alerts;
pub mod config;
pub mod context;
pub mod errors;
pub mod ipc;
pub mod models;
pub mod monitor;
pub mod network;
pub mod remediation;
pub mod remote;
pub mod slack;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
