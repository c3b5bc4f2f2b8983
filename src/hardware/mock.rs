// src/hardware/mock.rs - In-memory link for the test-suite
//
// Records every call in dispatch order and replays scripted feedback
// frames, one per `receive`.

use super::{HardwareError, HardwareLink};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum LinkCall {
    Head { angle: f64, speed: f64 },
    Shoulder { angle: f64, speed: f64 },
    Motor { id: u8, angle: f64, speed: f64 },
    Eyes { x: f64, y: f64, speed_x: f64, speed_y: f64 },
    EngageImu,
    DisengageImu,
    RequestHeadData,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<LinkCall>,
    feedback: VecDeque<String>,
}

/// Shared handle: clone one side into the test, move the link side into
/// the scheduler.
#[derive(Debug, Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<LinkCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Queues a raw feedback frame for a later `receive`.
    pub fn push_feedback(&self, frame: &str) {
        self.state
            .lock()
            .unwrap()
            .feedback
            .push_back(frame.to_string());
    }

    fn record(&self, call: LinkCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl HardwareLink for MockLink {
    async fn rotate_head(&mut self, angle: f64, speed: f64) -> Result<(), HardwareError> {
        self.record(LinkCall::Head { angle, speed });
        Ok(())
    }

    async fn rotate_shoulder(&mut self, angle: f64, speed: f64) -> Result<(), HardwareError> {
        self.record(LinkCall::Shoulder { angle, speed });
        Ok(())
    }

    async fn rotate_motor(
        &mut self,
        channel_id: u8,
        angle: f64,
        speed: f64,
    ) -> Result<(), HardwareError> {
        self.record(LinkCall::Motor {
            id: channel_id,
            angle,
            speed,
        });
        Ok(())
    }

    async fn rotate_eyes(
        &mut self,
        angle_x: f64,
        angle_y: f64,
        speed_x: f64,
        speed_y: f64,
    ) -> Result<(), HardwareError> {
        self.record(LinkCall::Eyes {
            x: angle_x,
            y: angle_y,
            speed_x,
            speed_y,
        });
        Ok(())
    }

    async fn engage_imu(&mut self) -> Result<(), HardwareError> {
        self.record(LinkCall::EngageImu);
        Ok(())
    }

    async fn disengage_imu(&mut self) -> Result<(), HardwareError> {
        self.record(LinkCall::DisengageImu);
        Ok(())
    }

    async fn request_head_data(&mut self) -> Result<(), HardwareError> {
        self.record(LinkCall::RequestHeadData);
        Ok(())
    }

    fn receive(&mut self) -> Option<String> {
        self.state.lock().unwrap().feedback.pop_front()
    }
}
