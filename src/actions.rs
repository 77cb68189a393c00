//! Built-in actions.
//!
//! Each built-in action turns a row into a plan with a [`PlanBuilder`] and hands the plan
//! to a [`PlanExecutor`]. Validation errors surface before anything moves.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::executor::PlanExecutor;
use crate::metadata::ExecutionMetadata;
use crate::plans::builders::{CountBuilder, MoveBuilder, PlanBuilder, StepScanBuilder};
use crate::registry::{ActionHandler, ActionRegistry, ActionReport};
use crate::table::RowParameters;

/// Handler that builds a plan from the row and runs it
pub struct PlanAction<B> {
    builder: B,
    executor: Arc<dyn PlanExecutor>,
}

impl<B: PlanBuilder> PlanAction<B> {
    /// Pair a builder with the executor that will run its plans
    pub fn new(builder: B, executor: Arc<dyn PlanExecutor>) -> Self {
        Self { builder, executor }
    }
}

#[async_trait]
impl<B: PlanBuilder> ActionHandler for PlanAction<B> {
    async fn execute(
        &self,
        params: &RowParameters,
        metadata: &ExecutionMetadata,
    ) -> anyhow::Result<ActionReport> {
        let plan = self.builder.build(params)?;
        let plan_name = plan.plan_name().to_string();
        let summary = self.executor.execute(plan, metadata).await?;

        info!(
            run_uid = %summary.run_uid,
            plan_type = %summary.plan_type,
            num_events = summary.num_events,
            "Row complete"
        );

        Ok(
            ActionReport::message(format!("{} ({} events)", plan_name, summary.num_events))
                .with_run(summary.run_uid, summary.num_events),
        )
    }

    fn description(&self) -> String {
        self.builder.description()
    }
}

/// Registry with the built-in actions
///
/// | action | alias | plan |
/// |---|---|---|
/// | `step_scan` | `scan` | line scan |
/// | `count` | | count |
/// | `mv` | `move` | absolute move |
pub fn standard_registry(executor: Arc<dyn PlanExecutor>) -> ActionRegistry {
    let mut registry = ActionRegistry::new();
    registry.register("step_scan", PlanAction::new(StepScanBuilder, executor.clone()));
    registry.register("count", PlanAction::new(CountBuilder, executor.clone()));
    registry.register("mv", PlanAction::new(MoveBuilder, executor));
    for (alias, target) in [("scan", "step_scan"), ("move", "mv")] {
        let linked = registry.alias(alias, target);
        debug_assert!(linked, "alias '{alias}' targets unregistered action '{target}'");
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::SimulatedExecutor;
    use crate::metadata::MetadataBuilder;

    #[test]
    fn test_standard_registry_names() {
        let registry = standard_registry(Arc::new(SimulatedExecutor::new()));
        assert_eq!(
            registry.action_names(),
            vec!["count", "move", "mv", "scan", "step_scan"]
        );
        assert!(registry.has_action("Step_Scan"));
    }

    #[tokio::test]
    async fn test_plan_action_runs_on_executor() {
        let executor = Arc::new(SimulatedExecutor::new());
        let registry = standard_registry(executor.clone());
        let md = MetadataBuilder::new().action("mv").build();

        let handler = registry.get("MOVE").unwrap();
        let params = RowParameters::from_pairs([("motor", "sx"), ("position", "3.5")]);
        let report = handler.execute(&params, &md).await.unwrap();

        assert!(report.run_uid.is_some());
        assert_eq!(report.num_events, 0);
        assert_eq!(executor.position("sx").await, Some(3.5));
    }

    #[tokio::test]
    async fn test_invalid_row_never_reaches_executor() {
        let executor = Arc::new(SimulatedExecutor::new());
        let registry = standard_registry(executor.clone());
        let md = MetadataBuilder::new().action("step_scan").build();

        let params = RowParameters::from_pairs([
            ("motor", "m1"),
            ("start", "0"),
            ("stop", "oops"),
            ("num", "3"),
        ]);
        let err = registry
            .get("step_scan")
            .unwrap()
            .execute(&params, &md)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stop"));
        assert_eq!(executor.position("m1").await, None);
    }
}
