//! Remediation: primitives, layer bring-up, rollback selection, and the
//! three orchestrators of increasing blast radius.

pub mod bringup;
pub mod commands;
pub mod orchestrator;
pub mod primitives;
pub mod report;
pub mod rollback;
