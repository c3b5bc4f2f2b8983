// src/tracking.rs - Camera-space aiming and operator calibration
//
// Eye/head aiming maps a 2D point in camera image space to motor angles
// through a calibrated linear mapping: pitch/yaw factors normalized by the
// image extents are scaled by operator-captured extrema, then combined
// with live IMU roll/pitch/yaw. Eye aiming uses direct angles; head
// aiming is IMU-stabilized, which is why combined moves need the fixed
// choreography the scheduler runs.

use crate::config::TrackingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImuReading {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationDirection {
    Up,
    Down,
    Left,
    Right,
}

/// Operator-captured IMU extrema for the four gaze limits, persisted after
/// each capture.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Calibration {
    pub up: [f64; 3],
    pub down: [f64; 3],
    pub left: [f64; 3],
    pub right: [f64; 3],
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            up: [0.0, 25.0, 0.0],
            down: [0.0, -25.0, 0.0],
            left: [0.0, 0.0, 40.0],
            right: [0.0, 0.0, -40.0],
        }
    }
}

impl Calibration {
    pub fn load(path: &Path) -> Result<Self, crate::error::HostError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("calibration file {:?} not found, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), crate::error::HostError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Records one captured extremum and persists immediately.
    pub fn record(
        &mut self,
        direction: CalibrationDirection,
        reading: ImuReading,
        path: &Path,
    ) -> Result<(), crate::error::HostError> {
        let slot = match direction {
            CalibrationDirection::Up => &mut self.up,
            CalibrationDirection::Down => &mut self.down,
            CalibrationDirection::Left => &mut self.left,
            CalibrationDirection::Right => &mut self.right,
        };
        *slot = [reading.roll, reading.pitch, reading.yaw];
        tracing::info!("calibration {:?} captured: {:?}", direction, slot);
        self.save(path)
    }

    fn yaw_half_span(&self) -> f64 {
        (self.left[2] - self.right[2]) / 2.0
    }

    fn pitch_half_span(&self) -> f64 {
        (self.up[1] - self.down[1]) / 2.0
    }
}

/// World pitch/yaw a camera point maps to, before IMU compensation.
fn world_angles(point: CameraPoint, cfg: &TrackingConfig, calib: &Calibration) -> (f64, f64) {
    // Normalized [-1, 1] from the image center; image y grows downward.
    let nx = (point.x - cfg.image_width / 2.0) / (cfg.image_width / 2.0);
    let ny = (point.y - cfg.image_height / 2.0) / (cfg.image_height / 2.0);
    let yaw = nx * calib.yaw_half_span();
    let pitch = -ny * calib.pitch_half_span();
    (pitch, yaw)
}

/// Eye motor angles (x = yaw axis, y = pitch axis) for a camera point,
/// compensated by the live IMU orientation of the head.
pub fn eye_angles(
    point: CameraPoint,
    cfg: &TrackingConfig,
    calib: &Calibration,
    imu: ImuReading,
) -> (f64, f64) {
    let (pitch, yaw) = world_angles(point, cfg, calib);
    (yaw - imu.yaw, pitch - imu.pitch)
}

/// Head move for a camera point: clipped absolute angle plus a coarse or
/// medium speed tier. `None` when the required rotation is too small to be
/// worth a physical move.
pub fn head_move(
    point: CameraPoint,
    cfg: &TrackingConfig,
    calib: &Calibration,
    current_head: f64,
    range: (f64, f64),
) -> Option<(f64, f64)> {
    let (_, yaw) = world_angles(point, cfg, calib);
    let target = yaw.clamp(range.0, range.1);
    let delta = target - current_head;
    if delta.abs() < cfg.head_move_threshold {
        return None;
    }
    let speed = if delta.abs() > cfg.coarse_threshold {
        cfg.coarse_speed
    } else {
        cfg.medium_speed
    };
    Some((target, speed))
}
