// src/error.rs - Top-level error type for the host
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("Kinematics error: {0}")]
    Kinematics(#[from] crate::kinematics::KinematicsError),
    #[error("Frame error: {0}")]
    Frame(#[from] crate::kinematics::frames::FrameError),
    #[error("Planner error: {0}")]
    Planner(#[from] crate::motion::PlannerError),
    #[error("Hardware error: {0}")]
    Hardware(#[from] crate::hardware::HardwareError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Other: {0}")]
    Other(String),
}
