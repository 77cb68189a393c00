//! Plan execution seam.
//!
//! The scan engine that moves real hardware lives outside this crate. Batch actions reach
//! it through [`PlanExecutor`]. [`SimulatedExecutor`] stands in for it during dry runs and
//! tests: it keeps motor positions between rows, so a row that moves a motor affects the
//! readings of every later row, as on the instrument.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::metadata::ExecutionMetadata;
use crate::plans::{Plan, PlanCommand};

/// Result of running one plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Unique identifier for this run
    pub run_uid: String,
    /// Plan type identifier
    pub plan_type: String,
    /// Plan arguments
    pub plan_args: HashMap<String, String>,
    /// Number of events emitted
    pub num_events: u32,
    /// Last event's detector readings
    pub data: HashMap<String, f64>,
    /// Device positions when the run ended
    pub positions: HashMap<String, f64>,
}

/// Carries out the commands of a plan
#[async_trait]
pub trait PlanExecutor: Send + Sync {
    /// Execute a plan to completion
    async fn execute(
        &self,
        plan: Box<dyn Plan>,
        metadata: &ExecutionMetadata,
    ) -> anyhow::Result<RunSummary>;
}


/// In-process stand-in for the scan engine
#[derive(Debug, Default)]
pub struct SimulatedExecutor {
    known_devices: Option<HashSet<String>>,
    honor_waits: bool,
    positions: Mutex<HashMap<String, f64>>,
}

impl SimulatedExecutor {
    /// Executor that accepts any device name and skips waits
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a fixed set of devices; commands naming others fail
    pub fn with_devices<I, S>(mut self, devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let devices: HashSet<String> = devices.into_iter().map(Into::into).collect();
        self.known_devices = (!devices.is_empty()).then_some(devices);
        self
    }

    /// Actually sleep for `Wait` commands
    pub fn with_waits(mut self, honor_waits: bool) -> Self {
        self.honor_waits = honor_waits;
        self
    }

    /// Current position of a device, if it has been moved
    pub async fn position(&self, device_id: &str) -> Option<f64> {
        self.positions.lock().await.get(device_id).copied()
    }

    fn check_device(&self, device_id: &str) -> anyhow::Result<()> {
        match &self.known_devices {
            Some(known) if !known.contains(device_id) => {
                anyhow::bail!("Device '{}' not found", device_id)
            }
            _ => Ok(()),
        }
    }

    /// Synthetic detector signal: a peak centred on the origin of all motor positions
    fn reading(positions: &HashMap<String, f64>) -> f64 {
        let r2: f64 = positions.values().map(|p| p * p).sum();
        1000.0 * (-r2 / 2.0).exp()
    }
}

#[async_trait]
impl PlanExecutor for SimulatedExecutor {
    #[instrument(
        skip(self, plan, metadata),
        fields(plan_type = %plan.plan_type(), row = metadata.row_index),
        err
    )]
    async fn execute(
        &self,
        mut plan: Box<dyn Plan>,
        metadata: &ExecutionMetadata,
    ) -> anyhow::Result<RunSummary> {
        let run_uid = Uuid::new_v4().to_string();
        info!(run_uid = %run_uid, plan_name = %plan.plan_name(), "Starting run");

        for device in plan.movers().iter().chain(plan.detectors().iter()) {
            self.check_device(device)?;
        }

        let mut num_events = 0u32;
        let mut collected: HashMap<String, f64> = HashMap::new();
        let mut last_data = HashMap::new();

        while let Some(cmd) = plan.next_command() {
            debug!(?cmd, "Processing command");
            match cmd {
                PlanCommand::MoveTo {
                    device_id,
                    position,
                } => {
                    self.check_device(&device_id)?;
                    self.positions.lock().await.insert(device_id, position);
                }
                PlanCommand::Read { device_id } => {
                    self.check_device(&device_id)?;
                    let value = Self::reading(&*self.positions.lock().await);
                    collected.insert(device_id, value);
                }
                PlanCommand::Trigger { device_id } => self.check_device(&device_id)?,
                PlanCommand::Wait { seconds } => {
                    if self.honor_waits && seconds > 0.0 {
                        let Ok(duration) = Duration::try_from_secs_f64(seconds) else {
                            anyhow::bail!("Wait of {} s is out of range", seconds);
                        };
                        sleep(duration).await;
                    }
                }
                PlanCommand::Checkpoint { label } => debug!(label = %label, "Checkpoint"),
                PlanCommand::EmitEvent { stream, .. } => {
                    debug!(stream = %stream, seq_num = num_events, "Event");
                    last_data = std::mem::take(&mut collected);
                    num_events += 1;
                }
            }
        }

        let positions = self.positions.lock().await.clone();
        info!(run_uid = %run_uid, num_events = num_events, "Run complete");

        Ok(RunSummary {
            run_uid,
            plan_type: plan.plan_type().to_string(),
            plan_args: plan.plan_args(),
            num_events,
            data: last_data,
            positions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataBuilder;
    use crate::plans::{Count, LineScan, MovePlan};

    fn md() -> ExecutionMetadata {
        MetadataBuilder::new().action("test").build()
    }

    #[tokio::test]
    async fn test_positions_persist_between_runs() {
        let executor = SimulatedExecutor::new();
        executor
            .execute(Box::new(MovePlan::move_to("sx", 2.0)), &md())
            .await
            .unwrap();
        assert_eq!(executor.position("sx").await, Some(2.0));

        let summary = executor
            .execute(Box::new(Count::new(2).with_detector("I0")), &md())
            .await
            .unwrap();
        assert_eq!(summary.num_events, 2);
        assert_eq!(summary.positions.get("sx"), Some(&2.0));
        let expected = 1000.0 * (-2.0f64).exp();
        assert!((summary.data["I0"] - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_line_scan_events() {
        let executor = SimulatedExecutor::new();
        let plan = LineScan::new("m1", -1.0, 1.0, 5).with_detector("det");
        let summary = executor.execute(Box::new(plan), &md()).await.unwrap();
        assert_eq!(summary.plan_type, "line_scan");
        assert_eq!(summary.num_events, 5);
        assert_eq!(executor.position("m1").await, Some(1.0));
    }

    #[tokio::test]
    async fn test_unknown_device_fails() {
        let executor = SimulatedExecutor::new().with_devices(["m1", "det"]);
        let err = executor
            .execute(Box::new(MovePlan::move_to("m9", 1.0)), &md())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("m9"));
        assert_eq!(executor.position("m9").await, None);
    }

    #[tokio::test]
    async fn test_out_of_range_wait_fails_the_run() {
        let executor = SimulatedExecutor::new().with_waits(true);
        let plan = LineScan::new("m1", 0.0, 1.0, 2).with_settle_time(1e300);
        let err = executor.execute(Box::new(plan), &md()).await.unwrap_err();
        assert!(err.to_string().contains("out of range"));

        // the executor is still usable afterwards
        let summary = executor
            .execute(Box::new(Count::new(1)), &md())
            .await
            .unwrap();
        assert_eq!(summary.num_events, 1);
    }

    #[tokio::test]
    async fn test_waits_are_skipped_by_default() {
        let executor = SimulatedExecutor::new();
        let started = std::time::Instant::now();
        executor
            .execute(Box::new(Count::new(3).with_delay(10.0)), &md())
            .await
            .unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
