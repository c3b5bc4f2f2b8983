// src/scheduler/queue.rs - Two-tier command queue
//
// Tier 0 (time-critical) always drains before tier 1 (ordinary). A global
// atomic sequence number is stamped at enqueue, so dispatch order is
// FIFO-within-tier even under concurrent producers. The mutex is never
// held across an await point and never waits on hardware.

use crate::motion::CommandBatch;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    TimeCritical,
    Ordinary,
}

#[derive(Debug, Clone)]
pub struct QueuedBatch {
    pub tier: Tier,
    pub sequence: u64,
    pub batch: CommandBatch,
}

#[derive(Debug, Default)]
struct Lanes {
    time_critical: VecDeque<QueuedBatch>,
    ordinary: VecDeque<QueuedBatch>,
}

#[derive(Debug, Default)]
pub struct CommandQueue {
    lanes: Mutex<Lanes>,
    sequence: AtomicU64,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a batch, returning its sequence number.
    pub fn push(&self, tier: Tier, batch: CommandBatch) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let queued = QueuedBatch {
            tier,
            sequence,
            batch,
        };
        let mut lanes = self.lanes.lock().unwrap();
        match tier {
            Tier::TimeCritical => lanes.time_critical.push_back(queued),
            Tier::Ordinary => lanes.ordinary.push_back(queued),
        }
        sequence
    }

    /// Pops the lowest `(tier, sequence)` batch, if any.
    pub fn pop(&self) -> Option<QueuedBatch> {
        let mut lanes = self.lanes.lock().unwrap();
        lanes
            .time_critical
            .pop_front()
            .or_else(|| lanes.ordinary.pop_front())
    }

    pub fn is_empty(&self) -> bool {
        let lanes = self.lanes.lock().unwrap();
        lanes.time_critical.is_empty() && lanes.ordinary.is_empty()
    }

    pub fn len(&self) -> usize {
        let lanes = self.lanes.lock().unwrap();
        lanes.time_critical.len() + lanes.ordinary.len()
    }

    /// The only abort primitive: discards everything not yet dispatched.
    /// Already-dispatched commands cannot be recalled.
    pub fn clear(&self) {
        let mut lanes = self.lanes.lock().unwrap();
        let dropped = lanes.time_critical.len() + lanes.ordinary.len();
        lanes.time_critical.clear();
        lanes.ordinary.clear();
        if dropped > 0 {
            tracing::info!("cleared {} pending command batches", dropped);
        }
    }
}
