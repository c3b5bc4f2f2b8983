// src/kinematics/mod.rs - Motors, channels, poses and frame chains
pub mod frames;

use crate::config::{Config, MotorConfig};
use frames::FrameTree;
use thiserror::Error;

/// Fixed channel count: 12 body motors plus the two eye axes.
pub const CHANNEL_COUNT: usize = 14;

/// Tolerance used when comparing measured against commanded angles,
/// in native angle units (degrees).
pub const REACH_TOLERANCE: f64 = 1.0;

#[derive(Debug, Error)]
pub enum KinematicsError {
    #[error("angle {0} maps to a negative string length")]
    InvalidAngle(f64),
    #[error("string length {0} is negative")]
    InvalidLength(f64),
    #[error("motor '{0}' is not string-driven")]
    NotStringDriven(String),
    #[error("expected {expected} motors, got {got}")]
    MotorCount { expected: usize, got: usize },
}

/// One of the 14 fixed pose-vector slots. The ordering here is a
/// system-wide convention: every pose vector, command batch and feedback
/// frame indexes channels in exactly this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Head,
    Shoulder,
    Torso,
    RightArm,
    LeftArm,
    RightHand,
    LeftHand,
    RightLeg,
    LeftLeg,
    RightFoot,
    LeftFoot,
    Back,
    EyeX,
    EyeY,
}

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::Head,
        Channel::Shoulder,
        Channel::Torso,
        Channel::RightArm,
        Channel::LeftArm,
        Channel::RightHand,
        Channel::LeftHand,
        Channel::RightLeg,
        Channel::LeftLeg,
        Channel::RightFoot,
        Channel::LeftFoot,
        Channel::Back,
        Channel::EyeX,
        Channel::EyeY,
    ];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|c| *c == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<Channel> {
        Self::ALL.get(index).copied()
    }

    pub fn canonical_name(self) -> &'static str {
        match self {
            Channel::Head => "head",
            Channel::Shoulder => "shoulder",
            Channel::Torso => "torso",
            Channel::RightArm => "right_arm",
            Channel::LeftArm => "left_arm",
            Channel::RightHand => "right_hand",
            Channel::LeftHand => "left_hand",
            Channel::RightLeg => "right_leg",
            Channel::LeftLeg => "left_leg",
            Channel::RightFoot => "right_foot",
            Channel::LeftFoot => "left_foot",
            Channel::Back => "back",
            Channel::EyeX => "eye_x",
            Channel::EyeY => "eye_y",
        }
    }

    /// Channels that settle asynchronously in hardware and are therefore
    /// excluded from the target-reached comparison.
    pub fn settles_async(self) -> bool {
        matches!(self, Channel::Head | Channel::EyeX | Channel::EyeY)
    }
}

/// An ordered per-channel angle vector. `None` means "unspecified": hold
/// the current value for that channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose(Vec<Option<f64>>);

impl Pose {
    /// All channels unspecified.
    pub fn hold() -> Self {
        Pose(vec![None; CHANNEL_COUNT])
    }

    /// All channels at angle zero.
    pub fn zeros() -> Self {
        Pose(vec![Some(0.0); CHANNEL_COUNT])
    }

    /// Builds a pose from a possibly short vector, right-padding with
    /// `None` up to the fixed channel count. Longer vectors are truncated
    /// with a warning.
    pub fn from_vec(mut values: Vec<Option<f64>>) -> Self {
        if values.len() > CHANNEL_COUNT {
            tracing::warn!(
                "pose vector has {} entries, truncating to {}",
                values.len(),
                CHANNEL_COUNT
            );
            values.truncate(CHANNEL_COUNT);
        }
        values.resize(CHANNEL_COUNT, None);
        Pose(values)
    }

    /// Wraps a vector as-is, without padding. Callers that bypass the
    /// persistence boundary own the length invariant; the planner checks
    /// it and fails with a size mismatch when violated.
    pub fn from_raw(values: Vec<Option<f64>>) -> Self {
        Pose(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn value(&self, channel: Channel) -> Option<f64> {
        self.0.get(channel.index()).copied().flatten()
    }

    pub fn at(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied().flatten()
    }

    pub fn set(&mut self, channel: Channel, value: Option<f64>) {
        if let Some(slot) = self.0.get_mut(channel.index()) {
            *slot = value;
        }
    }

    pub fn set_at(&mut self, index: usize, value: Option<f64>) {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = value;
        }
    }

    /// Overlays `other` on top of `self`: specified entries of `other`
    /// replace the corresponding entries, unspecified entries are kept.
    pub fn overlay(&self, other: &Pose) -> Pose {
        let merged = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(base, over)| over.or(*base))
            .collect();
        Pose(merged)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, Option<f64>)> + '_ {
        Channel::ALL.iter().copied().zip(self.0.iter().copied())
    }

    pub fn as_slice(&self) -> &[Option<f64>] {
        &self.0
    }
}

impl Default for Pose {
    fn default() -> Self {
        Pose::hold()
    }
}

/// One physical motor. String-driven ("static") motors spool a string
/// whose length determines a downstream joint position; direct-rotation
/// motors drive the joint angle directly (head, shoulder yaw, eyes).
#[derive(Debug, Clone)]
pub struct Motor {
    name: String,
    radius: f64,
    circumference: f64,
    is_static: bool,
    initial_length: f64,
    min_angle: f64,
    max_angle: f64,
    enabled: bool,
    angle: f64,
}

impl Motor {
    pub fn from_config(cfg: &MotorConfig) -> Self {
        Self {
            name: cfg.name.clone(),
            radius: cfg.radius,
            circumference: 2.0 * std::f64::consts::PI * cfg.radius,
            is_static: cfg.is_static,
            initial_length: cfg.initial_length,
            min_angle: cfg.min_angle,
            max_angle: cfg.max_angle,
            enabled: cfg.enabled,
            angle: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn circumference(&self) -> f64 {
        self.circumference
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min_angle, self.max_angle)
    }

    /// Clamps into the valid range so that feedback ingestion stays total;
    /// out-of-range values are a hardware fault worth surfacing in the log.
    pub fn set_angle(&mut self, angle: f64) {
        let clamped = angle.clamp(self.min_angle, self.max_angle);
        if (clamped - angle).abs() > f64::EPSILON {
            tracing::warn!(
                "motor '{}': angle {:.2} outside [{:.2}, {:.2}], clamped",
                self.name,
                angle,
                self.min_angle,
                self.max_angle
            );
        }
        self.angle = clamped;
    }

    pub fn clamp_angle(&self, angle: f64) -> f64 {
        angle.clamp(self.min_angle, self.max_angle)
    }

    /// String length spooled at `angle`, handling multi-turn wraparound:
    /// the integer number of full revolutions is stripped off, the
    /// remainder converted linearly over one circumference, and the full
    /// turns added back.
    pub fn string_length_from_angle(&self, angle: f64) -> Result<f64, KinematicsError> {
        if !self.is_static {
            return Err(KinematicsError::NotStringDriven(self.name.clone()));
        }
        let turns = (angle / 360.0).floor();
        let remainder = angle - turns * 360.0;
        let length = self.initial_length
            + turns * self.circumference
            + (remainder / 360.0) * self.circumference;
        if length < 0.0 {
            return Err(KinematicsError::InvalidAngle(angle));
        }
        Ok(length)
    }

    /// Exact inverse of [`string_length_from_angle`](Motor::string_length_from_angle).
    pub fn angle_from_string_length(&self, length: f64) -> Result<f64, KinematicsError> {
        if !self.is_static {
            return Err(KinematicsError::NotStringDriven(self.name.clone()));
        }
        if length < 0.0 {
            return Err(KinematicsError::InvalidLength(length));
        }
        let delta = length - self.initial_length;
        let turns = (delta / self.circumference).floor();
        let remainder = delta - turns * self.circumference;
        Ok(turns * 360.0 + (remainder / self.circumference) * 360.0)
    }
}

/// The full puppet: 14 motors in channel order plus the frame tree
/// describing how each motor's local frame composes into world.
#[derive(Debug, Clone)]
pub struct Marionette {
    motors: Vec<Motor>,
    frames: FrameTree,
}

impl Marionette {
    pub fn from_config(config: &Config) -> Result<Self, crate::error::HostError> {
        if config.motors.len() != CHANNEL_COUNT {
            return Err(KinematicsError::MotorCount {
                expected: CHANNEL_COUNT,
                got: config.motors.len(),
            }
            .into());
        }
        for (cfg, channel) in config.motors.iter().zip(Channel::ALL.iter()) {
            if cfg.name != channel.canonical_name() {
                tracing::warn!(
                    "motor slot {} named '{}', canonical name is '{}'",
                    channel.index(),
                    cfg.name,
                    channel.canonical_name()
                );
            }
        }
        let motors: Vec<Motor> = config.motors.iter().map(Motor::from_config).collect();
        let frames = FrameTree::from_config(&config.motors)?;
        Ok(Self { motors, frames })
    }

    pub fn motor(&self, channel: Channel) -> &Motor {
        &self.motors[channel.index()]
    }

    pub fn motor_mut(&mut self, channel: Channel) -> &mut Motor {
        &mut self.motors[channel.index()]
    }

    pub fn frames(&self) -> &FrameTree {
        &self.frames
    }

    /// Snapshot of every motor's current angle as a fully specified pose.
    pub fn pose(&self) -> Pose {
        Pose(self.motors.iter().map(|m| Some(m.angle())).collect())
    }

    /// Homogeneous transform from a motor's local frame to world,
    /// composed outward along the frame chain using current angles.
    pub fn motor_to_world(&self, channel: Channel) -> frames::Mat4 {
        self.frames.motor_to_world(channel, &self.motors)
    }

    /// Transform expressing motor `a`'s frame in motor `b`'s frame.
    pub fn motor_to_motor(&self, a: Channel, b: Channel) -> frames::Mat4 {
        let a_to_world = self.motor_to_world(a);
        let b_to_world = self.motor_to_world(b);
        b_to_world.inverse_rigid().mul(&a_to_world)
    }
}
