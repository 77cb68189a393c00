//! Plans: command streams that batch actions hand to the scan engine.
//!
//! Plans don't execute anything themselves. They describe what should happen as a
//! sequence of `PlanCommand` values, and a [`PlanExecutor`](crate::executor::PlanExecutor)
//! carries them out.
//!
//! # Plan Commands
//!
//! - `MoveTo` - Move a device to a position
//! - `Read` - Read a value from a device
//! - `Trigger` - Trigger a device (e.g., start acquisition)
//! - `Wait` - Wait for a duration
//! - `Checkpoint` - Mark a safe point between measurements
//! - `EmitEvent` - Record the data read since the last event
//!
//! A line scan of `m1` from 0 to 10 in 11 points with one detector yields:
//!
//! ```text
//! MoveTo("m1", 0.0)
//! Checkpoint
//! Trigger("det")
//! Read("det")
//! EmitEvent
//! MoveTo("m1", 1.0)
//! ...
//! ```

pub mod builders;

use std::collections::HashMap;

pub use builders::{CountBuilder, MoveBuilder, PlanBuilder, StepScanBuilder};

/// Commands that plans yield for the executor
#[derive(Debug, Clone, PartialEq)]
pub enum PlanCommand {
    /// Move a device to an absolute position
    MoveTo {
        /// Device ID to move
        device_id: String,
        /// Target position
        position: f64,
    },
    /// Read a value from a device
    Read {
        /// Device to read
        device_id: String,
    },
    /// Trigger a device
    Trigger {
        /// Device to trigger
        device_id: String,
    },
    /// Wait for a duration in seconds
    Wait {
        /// Duration in seconds
        seconds: f64,
    },
    /// Safe point between measurements
    Checkpoint {
        /// Checkpoint label
        label: String,
    },
    /// Emit an event with the data collected since the previous event
    EmitEvent {
        /// Stream name (e.g., "primary")
        stream: String,
        /// Device positions at time of event
        positions: HashMap<String, f64>,
    },
}

/// Plan trait - all plans implement this to generate commands
pub trait Plan: Send + Sync {
    /// Plan type identifier (e.g., "line_scan", "count")
    fn plan_type(&self) -> &str;

    /// Human-readable plan name
    fn plan_name(&self) -> &str;

    /// Plan arguments for documentation
    fn plan_args(&self) -> HashMap<String, String>;

    /// Devices that will be moved
    fn movers(&self) -> Vec<String>;

    /// Devices that will be read
    fn detectors(&self) -> Vec<String>;

    /// Total number of points (events) the plan will emit
    fn num_points(&self) -> usize;

    /// Generate the next command, returning None when complete
    fn next_command(&mut self) -> Option<PlanCommand>;
}

/// Steps shared by the point-by-point plans
#[derive(Debug, Clone, Copy, PartialEq)]
enum PointStep {
    Move,
    Settle,
    Checkpoint,
    Trigger { detector_idx: usize },
    Read { detector_idx: usize },
    Emit,
    Delay,
}

/// Line scan - step a single axis and read detectors at each point
#[derive(Debug, Clone)]
pub struct LineScan {
    axis: String,
    start: f64,
    stop: f64,
    num_points: usize,
    detectors: Vec<String>,
    settle_time: f64,
    delay: f64,

    current_point: usize,
    current_step: PointStep,
}

impl LineScan {
    /// Create a new LineScan
    pub fn new(axis: &str, start: f64, stop: f64, num_points: usize) -> Self {
        Self {
            axis: axis.to_string(),
            start,
            stop,
            num_points,
            detectors: Vec::new(),
            settle_time: 0.0,
            delay: 0.0,
            current_point: 0,
            current_step: PointStep::Move,
        }
    }

    /// Add a detector to the scan
    pub fn with_detector(mut self, detector: &str) -> Self {
        self.detectors.push(detector.to_string());
        self
    }

    /// Set settle time in seconds
    pub fn with_settle_time(mut self, seconds: f64) -> Self {
        self.settle_time = seconds;
        self
    }

    /// Dwell after each point except the last
    pub fn with_delay(mut self, seconds: f64) -> Self {
        self.delay = seconds;
        self
    }

    fn position_at(&self, point: usize) -> f64 {
        if self.num_points <= 1 {
            self.start
        } else if point + 1 == self.num_points {
            self.stop
        } else {
            let step = (self.stop - self.start) / (self.num_points - 1) as f64;
            self.start + step * point as f64
        }
    }
}

impl Plan for LineScan {
    fn plan_type(&self) -> &str {
        "line_scan"
    }

    fn plan_name(&self) -> &str {
        "Line Scan"
    }

    fn plan_args(&self) -> HashMap<String, String> {
        let mut args = HashMap::new();
        args.insert("axis".to_string(), self.axis.clone());
        args.insert("start".to_string(), self.start.to_string());
        args.insert("stop".to_string(), self.stop.to_string());
        args.insert("num_points".to_string(), self.num_points.to_string());
        args.insert("detectors".to_string(), self.detectors.join(","));
        if self.delay > 0.0 {
            args.insert("delay".to_string(), self.delay.to_string());
        }
        args
    }

    fn movers(&self) -> Vec<String> {
        vec![self.axis.clone()]
    }

    fn detectors(&self) -> Vec<String> {
        self.detectors.clone()
    }

    fn num_points(&self) -> usize {
        self.num_points
    }

    fn next_command(&mut self) -> Option<PlanCommand> {
        loop {
            if self.current_point >= self.num_points {
                return None;
            }

            match self.current_step {
                PointStep::Move => {
                    self.current_step = if self.settle_time > 0.0 {
                        PointStep::Settle
                    } else {
                        PointStep::Checkpoint
                    };
                    return Some(PlanCommand::MoveTo {
                        device_id: self.axis.clone(),
                        position: self.position_at(self.current_point),
                    });
                }
                PointStep::Settle => {
                    self.current_step = PointStep::Checkpoint;
                    return Some(PlanCommand::Wait {
                        seconds: self.settle_time,
                    });
                }
                PointStep::Checkpoint => {
                    self.current_step = PointStep::Trigger { detector_idx: 0 };
                    return Some(PlanCommand::Checkpoint {
                        label: format!("point_{}", self.current_point),
                    });
                }
                PointStep::Trigger { detector_idx } => match self.detectors.get(detector_idx) {
                    Some(det) => {
                        let device_id = det.clone();
                        self.current_step = PointStep::Trigger {
                            detector_idx: detector_idx + 1,
                        };
                        return Some(PlanCommand::Trigger { device_id });
                    }
                    None => self.current_step = PointStep::Read { detector_idx: 0 },
                },
                PointStep::Read { detector_idx } => match self.detectors.get(detector_idx) {
                    Some(det) => {
                        let device_id = det.clone();
                        self.current_step = PointStep::Read {
                            detector_idx: detector_idx + 1,
                        };
                        return Some(PlanCommand::Read { device_id });
                    }
                    None => self.current_step = PointStep::Emit,
                },
                PointStep::Emit => {
                    let mut positions = HashMap::new();
                    positions.insert(self.axis.clone(), self.position_at(self.current_point));

                    self.current_point += 1;
                    self.current_step =
                        if self.delay > 0.0 && self.current_point < self.num_points {
                            PointStep::Delay
                        } else {
                            PointStep::Move
                        };

                    return Some(PlanCommand::EmitEvent {
                        stream: "primary".to_string(),
                        positions,
                    });
                }
                PointStep::Delay => {
                    self.current_step = PointStep::Move;
                    return Some(PlanCommand::Wait {
                        seconds: self.delay,
                    });
                }
            }
        }
    }
}

/// Count - read detectors repeatedly without moving anything
#[derive(Debug, Clone)]
pub struct Count {
    num_points: usize,
    delay: f64,
    detectors: Vec<String>,
    current_point: usize,
    current_step: PointStep,
}

impl Count {
    /// Create a new Count plan
    pub fn new(num_points: usize) -> Self {
        Self {
            num_points,
            delay: 0.0,
            detectors: Vec::new(),
            current_point: 0,
            current_step: PointStep::Checkpoint,
        }
    }

    /// Add a detector
    pub fn with_detector(mut self, detector: &str) -> Self {
        self.detectors.push(detector.to_string());
        self
    }

    /// Set delay between points in seconds
    pub fn with_delay(mut self, seconds: f64) -> Self {
        self.delay = seconds;
        self
    }
}

impl Plan for Count {
    fn plan_type(&self) -> &str {
        "count"
    }

    fn plan_name(&self) -> &str {
        "Count"
    }

    fn plan_args(&self) -> HashMap<String, String> {
        let mut args = HashMap::new();
        args.insert("num_points".to_string(), self.num_points.to_string());
        args.insert("delay".to_string(), self.delay.to_string());
        args.insert("detectors".to_string(), self.detectors.join(","));
        args
    }

    fn movers(&self) -> Vec<String> {
        Vec::new()
    }

    fn detectors(&self) -> Vec<String> {
        self.detectors.clone()
    }

    fn num_points(&self) -> usize {
        self.num_points
    }

    fn next_command(&mut self) -> Option<PlanCommand> {
        loop {
            if self.current_point >= self.num_points {
                return None;
            }

            match self.current_step {
                PointStep::Move | PointStep::Settle | PointStep::Checkpoint => {
                    self.current_step = PointStep::Trigger { detector_idx: 0 };
                    return Some(PlanCommand::Checkpoint {
                        label: format!("count_{}", self.current_point),
                    });
                }
                PointStep::Trigger { detector_idx } => match self.detectors.get(detector_idx) {
                    Some(det) => {
                        let device_id = det.clone();
                        self.current_step = PointStep::Trigger {
                            detector_idx: detector_idx + 1,
                        };
                        return Some(PlanCommand::Trigger { device_id });
                    }
                    None => self.current_step = PointStep::Read { detector_idx: 0 },
                },
                PointStep::Read { detector_idx } => match self.detectors.get(detector_idx) {
                    Some(det) => {
                        let device_id = det.clone();
                        self.current_step = PointStep::Read {
                            detector_idx: detector_idx + 1,
                        };
                        return Some(PlanCommand::Read { device_id });
                    }
                    None => self.current_step = PointStep::Emit,
                },
                PointStep::Emit => {
                    self.current_point += 1;
                    self.current_step =
                        if self.delay > 0.0 && self.current_point < self.num_points {
                            PointStep::Delay
                        } else {
                            PointStep::Checkpoint
                        };
                    return Some(PlanCommand::EmitEvent {
                        stream: "primary".to_string(),
                        positions: HashMap::new(),
                    });
                }
                PointStep::Delay => {
                    self.current_step = PointStep::Checkpoint;
                    return Some(PlanCommand::Wait {
                        seconds: self.delay,
                    });
                }
            }
        }
    }
}

/// Absolute moves of one or more devices, with no detector reads
#[derive(Debug, Clone)]
pub struct MovePlan {
    moves: Vec<(String, f64)>,
    current_idx: usize,
}

impl MovePlan {
    /// Move a single device
    pub fn move_to(device_id: &str, position: f64) -> Self {
        Self::new(vec![(device_id.to_string(), position)])
    }

    /// Move several devices in order
    pub fn new(moves: Vec<(String, f64)>) -> Self {
        Self {
            moves,
            current_idx: 0,
        }
    }
}

impl Plan for MovePlan {
    fn plan_type(&self) -> &str {
        "mv"
    }

    fn plan_name(&self) -> &str {
        "Move"
    }

    fn plan_args(&self) -> HashMap<String, String> {
        self.moves
            .iter()
            .map(|(device, pos)| (device.clone(), pos.to_string()))
            .collect()
    }

    fn movers(&self) -> Vec<String> {
        self.moves.iter().map(|(device, _)| device.clone()).collect()
    }

    fn detectors(&self) -> Vec<String> {
        Vec::new()
    }

    fn num_points(&self) -> usize {
        0
    }

    fn next_command(&mut self) -> Option<PlanCommand> {
        let (device_id, position) = self.moves.get(self.current_idx)?.clone();
        self.current_idx += 1;
        Some(PlanCommand::MoveTo {
            device_id,
            position,
        })
    }
}
