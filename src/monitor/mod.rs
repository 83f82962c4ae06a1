//! Detection: fork detector, restart conditions, the condition pipeline and
//! the cycle state machine that drives them.

pub mod conditions;
pub mod cycle;
pub mod fork;
pub mod pipeline;

pub use cycle::{CycleOutcome, CycleReport, CycleState, CycleSummary, ForceRestartSwitch, Monitor};
