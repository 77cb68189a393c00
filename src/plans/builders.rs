//! Building plans from table rows.
//!
//! Each builder reads the parameter columns it needs from a row and validates them before
//! a plan exists. Column names are matched case-insensitively.
//!
//! | builder | required | optional |
//! |---|---|---|
//! | `StepScanBuilder` | `motor`, `start`, `stop`, `num` | `detector`, `settle` |
//! | `CountBuilder` | | `num` (default 1), `detector`, `delay` |
//! | `MoveBuilder` | `motor`, `position` | |
//!
//! `detector` may list several devices separated by spaces, commas or semicolons.

use super::{Count, LineScan, MovePlan, Plan};
use crate::error::{BatchError, BatchResult};
use crate::table::RowParameters;

/// Upper bound on points per row
pub const MAX_POINTS: usize = 100_000;

/// Builds a plan from one row's parameters
pub trait PlanBuilder: Send + Sync {
    /// Build and validate
    fn build(&self, params: &RowParameters) -> BatchResult<Box<dyn Plan>>;

    /// One-line description
    fn description(&self) -> String;
}

fn invalid(message: String) -> BatchError {
    BatchError::Configuration(message)
}

fn finite(params: &RowParameters, label: &str) -> BatchResult<f64> {
    let value = params.number(label)?;
    if !value.is_finite() {
        return Err(invalid(format!(
            "{label} must be a finite number (not NaN or infinity)"
        )));
    }
    Ok(value)
}

fn optional_seconds(params: &RowParameters, label: &str) -> BatchResult<f64> {
    let seconds = params.optional_number(label)?.unwrap_or(0.0);
    if seconds < 0.0 {
        return Err(invalid(format!("{label} must be >= 0")));
    }
    Ok(seconds)
}

fn points(params: &RowParameters, label: &str, default: Option<usize>) -> BatchResult<usize> {
    let num = match (params.has(label), default) {
        (false, Some(default)) => default,
        _ => params.count(label)?,
    };
    if num == 0 {
        return Err(invalid(format!("{label} must be > 0")));
    }
    if num > MAX_POINTS {
        return Err(invalid(format!(
            "{label} must be <= {MAX_POINTS} to prevent resource exhaustion"
        )));
    }
    Ok(num)
}

fn device(params: &RowParameters, label: &str) -> BatchResult<String> {
    let name = params.text(label)?;
    if name.trim().is_empty() {
        return Err(invalid(format!("{label} device name cannot be empty")));
    }
    Ok(name.trim().to_string())
}

/// Split a detector cell into device names
pub fn detector_list(params: &RowParameters) -> Vec<String> {
    params
        .optional_text("detector")
        .map(|cell| {
            cell.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Builder for step (line) scans
pub struct StepScanBuilder;

impl PlanBuilder for StepScanBuilder {
    fn build(&self, params: &RowParameters) -> BatchResult<Box<dyn Plan>> {
        let motor = device(params, "motor")?;
        let start = finite(params, "start")?;
        let stop = finite(params, "stop")?;
        let num = points(params, "num", None)?;
        let settle = optional_seconds(params, "settle")?;
        let delay = optional_seconds(params, "delay")?;

        if num > 1 && start == stop {
            return Err(invalid(
                "start and stop must be different for a multi-point scan".to_string(),
            ));
        }

        let mut plan = LineScan::new(&motor, start, stop, num)
            .with_settle_time(settle)
            .with_delay(delay);
        for det in detector_list(params) {
            plan = plan.with_detector(&det);
        }
        Ok(Box::new(plan))
    }

    fn description(&self) -> String {
        "Step one motor from start to stop, reading detectors at each point".to_string()
    }
}

/// Builder for count plans
pub struct CountBuilder;

impl PlanBuilder for CountBuilder {
    fn build(&self, params: &RowParameters) -> BatchResult<Box<dyn Plan>> {
        let num = points(params, "num", Some(1))?;
        let delay = optional_seconds(params, "delay")?;

        let mut plan = Count::new(num).with_delay(delay);
        for det in detector_list(params) {
            plan = plan.with_detector(&det);
        }
        Ok(Box::new(plan))
    }

    fn description(&self) -> String {
        "Read detectors repeatedly without moving".to_string()
    }
}

/// Builder for absolute moves
pub struct MoveBuilder;

impl PlanBuilder for MoveBuilder {
    fn build(&self, params: &RowParameters) -> BatchResult<Box<dyn Plan>> {
        let motor = device(params, "motor")?;
        let position = finite(params, "position")?;
        Ok(Box::new(MovePlan::move_to(&motor, position)))
    }

    fn description(&self) -> String {
        "Move a motor to an absolute position".to_string()
    }
}
