// src/scheduler/mod.rs - Command scheduler and executor
//
// Owns the mutable runtime state: measured pose (the marionette's motor
// angles), commanded pose, the two-tier command queue and the status
// flags. A single worker task holds the only handle to the hardware link
// and runs the dispatch / feedback / target-reached loop; gesture playback
// and the eye+head choreography run on short-lived tasks that only ever
// enqueue.

pub mod queue;

use crate::config::{Config, MotionConfig, TrackingConfig};
use crate::error::HostError;
use crate::gestures::{Gesture, GestureLibrary, GestureToken};
use crate::hardware::{HardwareLink, feedback};
use crate::kinematics::{CHANNEL_COUNT, Channel, Marionette, Pose, REACH_TOLERANCE};
use crate::motion::{Action, Command, CommandBatch, SideRequest};
use crate::positions::{NamedPosition, PositionStore};
use crate::tracking::{self, Calibration, CalibrationDirection, CameraPoint, ImuReading};
use queue::{CommandQueue, Tier};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Derived per-motion state of the executor, exposed for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Dispatching,
    AwaitingReach,
}

impl DispatchState {
    fn from_u8(v: u8) -> DispatchState {
        match v {
            1 => DispatchState::Dispatching,
            2 => DispatchState::AwaitingReach,
            _ => DispatchState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            DispatchState::Idle => 0,
            DispatchState::Dispatching => 1,
            DispatchState::AwaitingReach => 2,
        }
    }
}

/// State shared between the API surface, the worker task and the helper
/// tasks. Lock order where multiple locks are taken: puppet, commanded.
#[derive(Debug)]
struct Shared {
    puppet: Mutex<Marionette>,
    commanded: Mutex<Pose>,
    queue: CommandQueue,
    idle: AtomicBool,
    target_reached: AtomicBool,
    dispatch_state: AtomicU8,
    gesture_busy: AtomicBool,
    tracking_enabled: AtomicBool,
    imu: Mutex<ImuReading>,
    head_data: Notify,
}

pub struct MotionScheduler {
    shared: Arc<Shared>,
    positions: Arc<Mutex<PositionStore>>,
    gestures: Arc<GestureLibrary>,
    calibration: Arc<Mutex<Calibration>>,
    calibration_path: PathBuf,
    motion: MotionConfig,
    tracking: TrackingConfig,
    shutdown_tx: broadcast::Sender<()>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Clone for MotionScheduler {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            positions: self.positions.clone(),
            gestures: self.gestures.clone(),
            calibration: self.calibration.clone(),
            calibration_path: self.calibration_path.clone(),
            motion: self.motion.clone(),
            tracking: self.tracking.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
            worker: self.worker.clone(),
        }
    }
}

impl MotionScheduler {
    pub fn new(
        config: &Config,
        puppet: Marionette,
        positions: PositionStore,
        gestures: GestureLibrary,
        calibration: Calibration,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shared: Arc::new(Shared {
                puppet: Mutex::new(puppet),
                commanded: Mutex::new(Pose::hold()),
                queue: CommandQueue::new(),
                idle: AtomicBool::new(true),
                target_reached: AtomicBool::new(true),
                dispatch_state: AtomicU8::new(DispatchState::Idle.as_u8()),
                gesture_busy: AtomicBool::new(false),
                tracking_enabled: AtomicBool::new(true),
                imu: Mutex::new(ImuReading::default()),
                head_data: Notify::new(),
            }),
            positions: Arc::new(Mutex::new(positions)),
            gestures: Arc::new(gestures),
            calibration: Arc::new(Mutex::new(calibration)),
            calibration_path: PathBuf::from(&config.files.calibration),
            motion: config.motion.clone(),
            tracking: config.tracking.clone(),
            shutdown_tx,
            worker: Arc::new(Mutex::new(None)),
        }
    }

    /// Spawns the worker loop, handing it the only handle to the link.
    pub fn start(&self, link: Box<dyn HardwareLink>) {
        let shared = self.shared.clone();
        let tracking = self.tracking.clone();
        let tick_ms = self.motion.tick_ms;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut worker = Worker {
                shared,
                tracking,
                link,
                busy_until: Instant::now(),
            };
            let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("scheduler worker shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        worker.step().await;
                    }
                }
            }
        });
        *self.worker.lock().unwrap() = Some(handle);
        tracing::info!("scheduler worker started (tick {} ms)", tick_ms);
    }

    /// Stops the worker and joins it. No state mutation happens after this
    /// returns.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn is_idle(&self) -> bool {
        self.shared.idle.load(Ordering::SeqCst)
    }

    pub fn is_target_reached(&self) -> bool {
        self.shared.target_reached.load(Ordering::SeqCst)
    }

    pub fn dispatch_state(&self) -> DispatchState {
        DispatchState::from_u8(self.shared.dispatch_state.load(Ordering::SeqCst))
    }

    pub fn pending_batches(&self) -> usize {
        self.shared.queue.len()
    }

    /// Discards everything not yet dispatched.
    pub fn clear_pending(&self) {
        self.shared.queue.clear();
    }

    pub fn commanded_pose(&self) -> Pose {
        self.shared.commanded.lock().unwrap().clone()
    }

    pub fn measured_pose(&self) -> Pose {
        self.shared.puppet.lock().unwrap().pose()
    }

    pub fn imu_reading(&self) -> ImuReading {
        *self.shared.imu.lock().unwrap()
    }

    fn normalize_speeds(&self, speeds: &[f64]) -> Vec<f64> {
        let mut out: Vec<f64> = speeds
            .iter()
            .map(|s| if *s > 0.0 { *s } else { self.motion.default_speed })
            .collect();
        out.truncate(CHANNEL_COUNT);
        out.resize(CHANNEL_COUNT, self.motion.default_speed);
        out
    }

    /// Time needed to reach the target at the given per-channel speeds,
    /// never less than one control interval.
    fn plan_duration(&self, puppet: &Marionette, origin: &Pose, target: &Pose, speeds: &[f64]) -> f64 {
        let mut duration: f64 = 0.0;
        for channel in Channel::ALL {
            let i = channel.index();
            let Some(target_angle) = target.at(i) else {
                continue;
            };
            let motor = puppet.motor(channel);
            let origin_angle = origin.at(i).unwrap_or_else(|| motor.angle());
            let needed = if motor.is_static() {
                match (
                    motor.string_length_from_angle(origin_angle),
                    motor.string_length_from_angle(target_angle),
                ) {
                    (Ok(a), Ok(b)) => (b - a).abs() / speeds[i],
                    _ => 0.0,
                }
            } else {
                (target_angle - origin_angle).abs() / speeds[i]
            };
            duration = duration.max(needed);
        }
        duration.max(self.motion.interval)
    }

    /// Plans a motion to `target` from the current measured pose and
    /// enqueues its batches at ordinary priority. Returns the new
    /// commanded pose; unspecified channels keep their previous commanded
    /// value. The commanded pose records the planner's realized end
    /// angles, which integer speed quantization may place slightly off
    /// the raw request; comparing reach against the request instead would
    /// never converge.
    pub fn move_to_angles(&self, target: &Pose, speeds: &[f64]) -> Result<Pose, HostError> {
        let speeds = self.normalize_speeds(speeds);
        let (batches, realized) = {
            let puppet = self.shared.puppet.lock().unwrap();
            let origin = puppet.pose();
            let duration = self.plan_duration(&puppet, &origin, target, &speeds);
            let mut action = Action::new(target.clone(), self.motion.interval);
            let batches = action.command_batches(&puppet, &origin, duration, &speeds)?;
            (batches, action.last_target().clone())
        };
        let commanded = {
            let mut commanded = self.shared.commanded.lock().unwrap();
            *commanded = commanded.overlay(&realized);
            commanded.clone()
        };
        self.shared.target_reached.store(false, Ordering::SeqCst);
        for batch in batches {
            self.shared.queue.push(Tier::Ordinary, batch);
        }
        Ok(commanded)
    }

    /// Looks up a named position. Unknown names are an expected,
    /// recoverable condition: the commanded pose is left untouched and
    /// `None` returned.
    pub fn move_to(&self, name: &str) -> Option<Pose> {
        let position = {
            let positions = self.positions.lock().unwrap();
            positions.get(name).cloned()
        };
        let Some(position) = position else {
            tracing::warn!("unknown named position '{}'", name);
            return None;
        };
        match self.move_to_angles(&position.angles, &position.speeds) {
            Ok(pose) => Some(pose),
            Err(e) => {
                tracing::error!("move to '{}' failed to plan: {}", name, e);
                None
            }
        }
    }

    pub fn go_back_to_zero(&self) -> Option<Pose> {
        self.move_to(&self.motion.rest_position)
    }

    pub fn add_position(
        &self,
        name: &str,
        angles: Pose,
        speeds: Vec<f64>,
    ) -> Result<(), HostError> {
        let speeds = self.normalize_speeds(&speeds);
        let mut positions = self.positions.lock().unwrap();
        positions.add(name, NamedPosition { angles, speeds })
    }

    /// Plays a gesture: numeric tokens pause, string tokens move to the
    /// named position. Gesture playback is single-flight; a request while
    /// one is running is dropped by design and reported as `false`.
    pub async fn execute_gesture(&self, gesture: &Gesture, detach: bool) -> bool {
        if self
            .shared
            .gesture_busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("gesture '{}' dropped, another is playing", gesture.id);
            return false;
        }
        tracing::info!("playing gesture '{}'", gesture.id);
        let this = self.clone();
        let tokens = gesture.tokens.clone();
        let id = gesture.id.clone();
        let playback = async move {
            for token in tokens {
                match token {
                    GestureToken::Delay(seconds) => {
                        tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
                    }
                    GestureToken::Position(name) => {
                        if this.move_to(&name).is_none() {
                            tracing::warn!("gesture '{}': position '{}' skipped", id, name);
                        }
                    }
                }
            }
            this.shared.gesture_busy.store(false, Ordering::SeqCst);
        };
        if detach {
            tokio::spawn(playback);
        } else {
            playback.await;
        }
        true
    }

    /// Weighted pick from an emotion category, then playback.
    pub async fn play_category(&self, category: &str, detach: bool) -> bool {
        let gesture = {
            let mut rng = rand::rng();
            self.gestures.pick(category, &mut rng).cloned()
        };
        match gesture {
            Some(gesture) => self.execute_gesture(&gesture, detach).await,
            None => {
                tracing::warn!("no playable gesture in category '{}'", category);
                false
            }
        }
    }

    pub fn is_gesture_playing(&self) -> bool {
        self.shared.gesture_busy.load(Ordering::SeqCst)
    }

    fn eye_batch(&self, point: CameraPoint) -> CommandBatch {
        let (raw_x, raw_y) = {
            let calibration = self.calibration.lock().unwrap();
            let imu = *self.shared.imu.lock().unwrap();
            tracking::eye_angles(point, &self.tracking, &calibration, imu)
        };
        let (x, y, eye_speed) = {
            let puppet = self.shared.puppet.lock().unwrap();
            (
                puppet.motor(Channel::EyeX).clamp_angle(raw_x),
                puppet.motor(Channel::EyeY).clamp_angle(raw_y),
                self.tracking.eye_speed,
            )
        };
        let mut batch = CommandBatch::new(self.motion.interval);
        batch.commands.push(Command {
            channel: Channel::EyeX,
            value: Some(x),
            speed: eye_speed,
        });
        batch.commands.push(Command {
            channel: Channel::EyeY,
            value: Some(y),
            speed: eye_speed,
        });
        batch
    }

    /// Aims the eyes at a camera-space point at time-critical priority.
    /// Silently a no-op while tracking is disabled (the choreography
    /// guard).
    pub fn move_eyes(&self, point: CameraPoint) -> bool {
        if !self.shared.tracking_enabled.load(Ordering::SeqCst) {
            return false;
        }
        let batch = self.eye_batch(point);
        self.update_commanded_eyes(&batch);
        self.shared.queue.push(Tier::TimeCritical, batch);
        true
    }

    fn update_commanded_eyes(&self, batch: &CommandBatch) {
        let mut commanded = self.shared.commanded.lock().unwrap();
        for command in &batch.commands {
            commanded.set(command.channel, command.value);
        }
    }

    /// Combined eye+head aim. Eye aiming uses direct angles while head
    /// aiming is IMU-stabilized, so the two are sequenced by a fixed
    /// choreography on a helper task: disable tracking, eyes, IMU engage,
    /// head, IMU disengage, re-enable. Returns `false` (no-op) while
    /// tracking is disabled.
    pub fn move_eyes_and_head(&self, point: CameraPoint) -> bool {
        if self
            .shared
            .tracking_enabled
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let this = self.clone();
        tokio::spawn(async move {
            let pause = Duration::from_millis(this.tracking.choreography_pause_ms);

            let eye_batch = this.eye_batch(point);
            this.update_commanded_eyes(&eye_batch);
            this.shared.queue.push(Tier::TimeCritical, eye_batch);
            tokio::time::sleep(pause).await;

            this.shared
                .queue
                .push(Tier::TimeCritical, CommandBatch::request_only(SideRequest::EngageImu));
            tokio::time::sleep(pause).await;

            let (current_head, head_range) = {
                let puppet = this.shared.puppet.lock().unwrap();
                let motor = puppet.motor(Channel::Head);
                (motor.angle(), motor.range())
            };
            let head = {
                let calibration = this.calibration.lock().unwrap();
                tracking::head_move(point, &this.tracking, &calibration, current_head, head_range)
            };
            if let Some((angle, speed)) = head {
                let mut batch = CommandBatch::new(this.motion.interval);
                batch.commands.push(Command {
                    channel: Channel::Head,
                    value: Some(angle),
                    speed,
                });
                {
                    let mut commanded = this.shared.commanded.lock().unwrap();
                    commanded.set(Channel::Head, Some(angle));
                }
                this.shared.queue.push(Tier::TimeCritical, batch);
            } else {
                tracing::debug!("head move below threshold, suppressed");
            }
            tokio::time::sleep(pause).await;

            // Stabilized-head mode is bounded by the move that needs it.
            this.shared
                .queue
                .push(Tier::TimeCritical, CommandBatch::request_only(SideRequest::DisengageImu));
            this.shared.tracking_enabled.store(true, Ordering::SeqCst);
        });
        true
    }

    /// Asks the head controller for fresh IMU telemetry and waits for it,
    /// bounded by the configured timeout. On timeout the last reading is
    /// returned stale rather than blocking the caller.
    pub async fn request_head_data(&self) -> ImuReading {
        // Register the waiter before the request is visible to the
        // worker; an IMU frame arriving before the first poll would
        // otherwise be missed and the caller would eat the full timeout.
        let notified = self.shared.head_data.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        self.shared
            .queue
            .push(Tier::TimeCritical, CommandBatch::request_only(SideRequest::RequestHeadData));
        let timeout = Duration::from_millis(self.tracking.head_data_timeout_ms);
        if tokio::time::timeout(timeout, notified).await.is_err() {
            tracing::warn!(
                "head telemetry not received within {:?}, proceeding with stale data",
                timeout
            );
        }
        *self.shared.imu.lock().unwrap()
    }

    /// Operator calibration step: capture the current IMU extremum for a
    /// gaze direction and persist it.
    pub async fn calibrate(&self, direction: CalibrationDirection) -> Result<(), HostError> {
        let reading = self.request_head_data().await;
        let mut calibration = self.calibration.lock().unwrap();
        calibration.record(direction, reading, &self.calibration_path)
    }
}

/// The dispatch / feedback / target-reached loop. Owns the link.
struct Worker {
    shared: Arc<Shared>,
    tracking: TrackingConfig,
    link: Box<dyn HardwareLink>,
    /// Pacing deadline: the previous batch's hardware cycle runs until
    /// this instant, so the next batch is not popped before then.
    busy_until: Instant,
}

impl Worker {
    async fn step(&mut self) {
        // Idle is defined by queue occupancy at the top of the iteration,
        // before any dispatch below.
        let empty = self.shared.queue.is_empty();
        self.shared.idle.store(empty, Ordering::SeqCst);

        if Instant::now() >= self.busy_until {
            if let Some(queued) = self.shared.queue.pop() {
                self.shared
                    .dispatch_state
                    .store(DispatchState::Dispatching.as_u8(), Ordering::SeqCst);
                tracing::trace!(
                    "dispatching batch seq={} tier={:?} ({} commands)",
                    queued.sequence,
                    queued.tier,
                    queued.batch.commands.len()
                );
                self.dispatch(&queued.batch).await;
                self.busy_until = Instant::now() + Duration::from_secs_f64(queued.batch.duration);
                self.shared
                    .dispatch_state
                    .store(DispatchState::AwaitingReach.as_u8(), Ordering::SeqCst);
            }
        }

        while let Some(frame) = self.link.receive() {
            self.apply_feedback(&frame);
        }

        let reached = self.target_reached();
        self.shared.target_reached.store(reached, Ordering::SeqCst);
        if reached && self.shared.queue.is_empty() {
            self.shared
                .dispatch_state
                .store(DispatchState::Idle.as_u8(), Ordering::SeqCst);
        }
    }

    /// Routes one batch to the link by channel kind. Eye X/Y arrive as
    /// separate commands but the hardware takes one combined call, so they
    /// are coalesced. Unspecified targets and disabled motors are skipped.
    async fn dispatch(&mut self, batch: &CommandBatch) {
        let mut eye_x: Option<(f64, f64)> = None;
        let mut eye_y: Option<(f64, f64)> = None;
        for command in &batch.commands {
            let Some(value) = command.value else {
                continue;
            };
            let enabled = {
                let puppet = self.shared.puppet.lock().unwrap();
                puppet.motor(command.channel).is_enabled()
            };
            if !enabled {
                tracing::trace!("skipping disabled motor {:?}", command.channel);
                continue;
            }
            let result = match command.channel {
                Channel::Head => self.link.rotate_head(value, command.speed).await,
                Channel::Shoulder => self.link.rotate_shoulder(value, command.speed).await,
                Channel::EyeX => {
                    eye_x = Some((value, command.speed));
                    Ok(())
                }
                Channel::EyeY => {
                    eye_y = Some((value, command.speed));
                    Ok(())
                }
                channel => {
                    self.link
                        .rotate_motor(channel.index() as u8, value, command.speed)
                        .await
                }
            };
            if let Err(e) = result {
                tracing::error!("dispatch to {:?} failed: {}", command.channel, e);
            }
        }

        if eye_x.is_some() || eye_y.is_some() {
            // Fill the missing axis from the current measured angle so a
            // single-axis update still forms a valid combined call.
            let (cx, cy) = {
                let puppet = self.shared.puppet.lock().unwrap();
                (
                    puppet.motor(Channel::EyeX).angle(),
                    puppet.motor(Channel::EyeY).angle(),
                )
            };
            let (x, sx) = eye_x.unwrap_or((cx, self.tracking.eye_speed));
            let (y, sy) = eye_y.unwrap_or((cy, self.tracking.eye_speed));
            if let Err(e) = self.link.rotate_eyes(x, y, sx, sy).await {
                tracing::error!("eye dispatch failed: {}", e);
            }
        }

        for request in &batch.requests {
            let result = match request {
                SideRequest::EngageImu => self.link.engage_imu().await,
                SideRequest::DisengageImu => self.link.disengage_imu().await,
                SideRequest::RequestHeadData => self.link.request_head_data().await,
            };
            if let Err(e) = result {
                tracing::error!("side request {:?} failed: {}", request, e);
            }
        }
    }

    fn apply_feedback(&mut self, frame: &str) {
        let Some(parsed) = feedback::parse(frame) else {
            tracing::debug!("dropping unrecognized feedback frame: {:?}", frame);
            return;
        };
        let mut puppet = self.shared.puppet.lock().unwrap();
        match parsed {
            feedback::Feedback::Motor { id, angle } => {
                match Channel::from_index(id as usize) {
                    Some(channel) => puppet.motor_mut(channel).set_angle(angle),
                    None => tracing::debug!("feedback for unknown motor id {}", id),
                }
            }
            feedback::Feedback::Head(angle) => {
                puppet.motor_mut(Channel::Head).set_angle(angle);
            }
            feedback::Feedback::Shoulder(angle) => {
                puppet.motor_mut(Channel::Shoulder).set_angle(angle);
            }
            feedback::Feedback::Eyes { x, y } => {
                puppet.motor_mut(Channel::EyeX).set_angle(x);
                puppet.motor_mut(Channel::EyeY).set_angle(y);
            }
            feedback::Feedback::Imu { roll, pitch, yaw } => {
                drop(puppet);
                *self.shared.imu.lock().unwrap() = ImuReading { roll, pitch, yaw };
                self.shared.head_data.notify_waiters();
                tracing::debug!("IMU update r={} p={} y={}", roll, pitch, yaw);
            }
        }
    }

    /// Every channel except head and the two eyes (which settle
    /// asynchronously) must be within tolerance of its commanded value.
    fn target_reached(&self) -> bool {
        let puppet = self.shared.puppet.lock().unwrap();
        let commanded = self.shared.commanded.lock().unwrap();
        for channel in Channel::ALL {
            if channel.settles_async() {
                continue;
            }
            let Some(wanted) = commanded.value(channel) else {
                continue;
            };
            if !puppet.motor(channel).is_enabled() {
                continue;
            }
            if (puppet.motor(channel).angle() - wanted).abs() > REACH_TOLERANCE {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests;
