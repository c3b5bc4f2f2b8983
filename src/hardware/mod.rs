// src/hardware/mod.rs - Logical hardware link consumed by the scheduler
pub mod feedback;
pub mod mock;
pub mod serial;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("Serial port error: {0}")]
    Serial(#[from] std::io::Error),
    #[error("Not connected to hardware")]
    NotConnected,
    #[error("Timeout writing to hardware")]
    Timeout,
}

/// The single serial link to the marionette hardware. One worker task owns
/// the only handle; every write is bounded by a timeout so a wedged link
/// can never stall the dispatch loop, and `receive` never blocks.
#[async_trait]
pub trait HardwareLink: Send {
    /// Rotate the head to an absolute angle at the given speed.
    async fn rotate_head(&mut self, angle: f64, speed: f64) -> Result<(), HardwareError>;

    /// Rotate the shoulder bar to an absolute angle.
    async fn rotate_shoulder(&mut self, angle: f64, speed: f64) -> Result<(), HardwareError>;

    /// Rotate a generic string motor, addressed by channel id.
    async fn rotate_motor(
        &mut self,
        channel_id: u8,
        angle: f64,
        speed: f64,
    ) -> Result<(), HardwareError>;

    /// Both eye axes move as one combined call.
    async fn rotate_eyes(
        &mut self,
        angle_x: f64,
        angle_y: f64,
        speed_x: f64,
        speed_y: f64,
    ) -> Result<(), HardwareError>;

    async fn engage_imu(&mut self) -> Result<(), HardwareError>;

    async fn disengage_imu(&mut self) -> Result<(), HardwareError>;

    /// Ask the head controller to report IMU telemetry.
    async fn request_head_data(&mut self) -> Result<(), HardwareError>;

    /// Non-blocking read of one raw feedback frame, if any arrived.
    fn receive(&mut self) -> Option<String>;
}
