//! Ordered restart conditions; the first one that fires wins.

use std::time::Duration;

use tracing::{info, warn};

use super::conditions::{
    ForceRestart, ForkedCluster, ForkedL0Nodes, RestartCondition, SnapshotStaleness,
    UnhealthyNodes,
};
use crate::context::CycleContext;
use crate::models::decision::RestartDecision;
use crate::remediation::report::RemediationReport;
use crate::{AppError, Result};

/// The condition that fired and what it decided.
#[derive(Debug, Clone)]
pub struct Trigger {
    /// Position of the condition in the pipeline.
    pub index: usize,
    /// Condition name.
    pub condition: &'static str,
    /// Its decision.
    pub decision: RestartDecision,
}

/// Fixed, ordered list of restart conditions.
pub struct Pipeline {
    conditions: Vec<Box<dyn RestartCondition>>,
}

impl Pipeline {
    /// Pipeline over `conditions`, evaluated in the given order.
    #[must_use]
    pub fn new(conditions: Vec<Box<dyn RestartCondition>>) -> Self {
        Self { conditions }
    }

    /// Staleness, forked cluster, unhealthy nodes, forked base-layer nodes.
    #[must_use]
    pub fn standard(staleness_threshold: Duration) -> Self {
        Self::new(vec![
            Box::new(SnapshotStaleness::new(staleness_threshold)),
            Box::new(ForkedCluster),
            Box::new(UnhealthyNodes),
            Box::new(ForkedL0Nodes),
        ])
    }

    /// Pipeline holding only the operator's forced restart.
    #[must_use]
    pub fn forced() -> Self {
        Self::new(vec![Box::new(ForceRestart)])
    }

    /// Condition names in evaluation order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.conditions.iter().map(|c| c.name()).collect()
    }

    /// Evaluate conditions in order and stop at the first that fires.
    ///
    /// A condition failing to evaluate is logged and skipped.
    pub async fn evaluate(&self, ctx: &CycleContext) -> Option<Trigger> {
        for (index, condition) in self.conditions.iter().enumerate() {
            match condition.evaluate(ctx).await {
                Ok(decision) if decision.should_restart => {
                    info!(
                        condition = condition.name(),
                        scope = %decision.scope,
                        reason = %decision.reason,
                        "restart condition triggered"
                    );
                    return Some(Trigger {
                        index,
                        condition: condition.name(),
                        decision,
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(condition = condition.name(), %err, "restart condition failed; skipping");
                }
            }
        }
        None
    }

    /// Run the remediation of the condition that fired.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for a trigger from another pipeline and
    /// propagates remediation errors.
    pub async fn remediate(
        &self,
        ctx: &CycleContext,
        trigger: &Trigger,
    ) -> Result<RemediationReport> {
        let condition = self
            .conditions
            .get(trigger.index)
            .ok_or_else(|| AppError::NotFound(format!("condition #{}", trigger.index)))?;
        condition.remediate(ctx, &trigger.decision).await
    }
}
