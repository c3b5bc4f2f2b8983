// src/motion/mod.rs - Trajectory planning types
pub mod action;

#[cfg(test)]
mod action_tests;

pub use action::Action;

use crate::kinematics::Channel;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("step count must be at least 1, got {0}")]
    InvalidStepCount(usize),
    #[error("duration must be non-negative, got {0}")]
    InvalidDuration(f64),
    #[error("pose length mismatch: origin {origin}, target {target}")]
    SizeMismatch { origin: usize, target: usize },
    #[error(transparent)]
    Kinematics(#[from] crate::kinematics::KinematicsError),
}

/// One per-channel hardware command: absolute target value plus the speed
/// the hardware should use to get there.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub channel: Channel,
    pub value: Option<f64>,
    pub speed: f64,
}

/// Non-motor requests a batch may carry alongside its commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideRequest {
    EngageImu,
    DisengageImu,
    RequestHeadData,
}

/// A group of commands dispatched together as one hardware cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandBatch {
    /// Wall-clock duration of this cycle, seconds.
    pub duration: f64,
    pub commands: Vec<Command>,
    pub requests: Vec<SideRequest>,
}

impl CommandBatch {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            commands: Vec::new(),
            requests: Vec::new(),
        }
    }

    pub fn request_only(request: SideRequest) -> Self {
        Self {
            duration: 0.0,
            commands: Vec::new(),
            requests: vec![request],
        }
    }
}

/// One step of a step decomposition. For string-driven channels the value
/// is the step's string-length increment (integer units, remainder folded
/// into the final step); for direct-rotation channels it is the absolute
/// target angle, delivered whole on every step.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub duration: f64,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepPlan {
    pub steps: Vec<PlanStep>,
}

impl StepPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn total_duration(&self) -> f64 {
        self.steps.iter().map(|s| s.duration).sum()
    }
}

/// A step decomposition re-expressed as "move at speed S for T seconds"
/// pairs. Speeds are integer-valued for string channels; `None` marks a
/// channel the profile does not drive (unspecified, or direct-rotation,
/// whose constant speed is supplied by the caller at batch time).
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedStep {
    pub duration: f64,
    pub speeds: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpeedProfile {
    pub steps: Vec<SpeedStep>,
}
