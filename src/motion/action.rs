// src/motion/action.rs - Pose-to-command trajectory planner
//
// An Action converts a target pose into time-bounded, discretized motor
// increments. String-driven channels are planned in string-length units
// with explicit remainder carry so integer rounding never accumulates;
// direct-rotation channels are delivered whole, one absolute angle per
// step.

use super::{Command, CommandBatch, PlanStep, PlannerError, SpeedProfile, SpeedStep, StepPlan};
use crate::kinematics::{Channel, Marionette, Pose};

/// Durations smaller than this are treated as zero when splitting a move
/// into interval-sized steps.
const DURATION_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct Action {
    target: Pose,
    /// The hardware's minimum addressable time slice, seconds.
    interval: f64,
    /// Realized final angles of the most recent plan. May differ from the
    /// requested target because hardware speeds are integers; callers that
    /// care about the exact commanded end state read this.
    last_target: Pose,
}

impl Action {
    pub fn new(target: Pose, interval: f64) -> Self {
        Self {
            target,
            interval,
            last_target: Pose::hold(),
        }
    }

    pub fn target(&self) -> &Pose {
        &self.target
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn last_target(&self) -> &Pose {
        &self.last_target
    }

    fn check_origin(&self, origin: &Pose) -> Result<(), PlannerError> {
        if origin.len() != self.target.len() {
            return Err(PlannerError::SizeMismatch {
                origin: origin.len(),
                target: self.target.len(),
            });
        }
        Ok(())
    }

    /// `steps` intermediate poses on the straight line from `origin` to the
    /// target, with the final pose snapped exactly to the target on every
    /// specified channel.
    pub fn linear_sequence(&self, origin: &Pose, steps: usize) -> Result<Vec<Pose>, PlannerError> {
        self.check_origin(origin)?;
        if steps < 1 {
            return Err(PlannerError::InvalidStepCount(steps));
        }
        let n = steps as f64;
        let mut sequence = Vec::with_capacity(steps);
        for k in 1..=steps {
            let mut pose = Pose::hold();
            for i in 0..Channel::ALL.len() {
                let value = match (origin.at(i), self.target.at(i)) {
                    (_, None) => origin.at(i),
                    (None, Some(t)) => Some(t),
                    (Some(o), Some(t)) => {
                        if k == steps {
                            Some(t)
                        } else {
                            Some(o + (t - o) / n * k as f64)
                        }
                    }
                };
                pose.set_at(i, value);
            }
            sequence.push(pose);
        }
        Ok(sequence)
    }

    fn step_durations(&self, duration: f64) -> Result<Vec<f64>, PlannerError> {
        if duration < 0.0 {
            return Err(PlannerError::InvalidDuration(duration));
        }
        let full = (duration / self.interval).floor() as usize;
        let remainder = duration - full as f64 * self.interval;
        let mut durations = vec![self.interval; full];
        if remainder > DURATION_EPSILON {
            durations.push(remainder);
        }
        Ok(durations)
    }

    /// Splits `duration` into interval-sized steps plus one optional final
    /// partial step. String channels get per-step integer increments with
    /// the rounding remainder folded into the final step so the cumulative
    /// increment equals the ideal total; direct channels carry the full
    /// target angle on every step.
    pub fn step_plan(
        &self,
        puppet: &Marionette,
        origin: &Pose,
        duration: f64,
    ) -> Result<StepPlan, PlannerError> {
        self.check_origin(origin)?;
        let durations = self.step_durations(duration)?;
        let n = durations.len();
        if n == 0 {
            return Ok(StepPlan::default());
        }

        let mut per_channel: Vec<Vec<Option<f64>>> = Vec::with_capacity(Channel::ALL.len());
        for channel in Channel::ALL {
            let i = channel.index();
            let motor = puppet.motor(channel);
            let column = match self.target.at(i) {
                None => vec![None; n],
                Some(target) if !motor.is_static() => vec![Some(target); n],
                Some(target) => {
                    let origin_angle = origin.at(i).unwrap_or_else(|| motor.angle());
                    let origin_len = motor.string_length_from_angle(origin_angle)?;
                    let target_len = motor.string_length_from_angle(target)?;
                    let total = target_len - origin_len;
                    let per_step = (total / n as f64).round();
                    let mut column = vec![Some(per_step); n];
                    // Remainder carry: the final step absorbs whatever
                    // rounding left over, never silently dropped.
                    column[n - 1] = Some(total - per_step * (n - 1) as f64);
                    column
                }
            };
            per_channel.push(column);
        }

        let steps = durations
            .into_iter()
            .enumerate()
            .map(|(k, duration)| PlanStep {
                duration,
                values: per_channel.iter().map(|column| column[k]).collect(),
            })
            .collect();
        Ok(StepPlan { steps })
    }

    /// Re-expresses the step decomposition as (duration, integer speed)
    /// pairs. Rounding remainders are carried from step to step, so the
    /// sum of realized `duration * speed` terms converges to the ideal
    /// total increment. Also records the realized final angles as the
    /// plan's last target.
    pub fn speed_profile(
        &mut self,
        puppet: &Marionette,
        origin: &Pose,
        duration: f64,
    ) -> Result<SpeedProfile, PlannerError> {
        let plan = self.step_plan(puppet, origin, duration)?;
        let n = plan.steps.len();
        let channels = Channel::ALL.len();

        let mut carry = vec![0.0; channels];
        let mut realized = vec![0.0; channels];
        let mut steps = Vec::with_capacity(n);
        for step in &plan.steps {
            let mut speeds = vec![None; channels];
            for channel in Channel::ALL {
                let i = channel.index();
                let motor = puppet.motor(channel);
                if !motor.is_static() {
                    continue;
                }
                if let Some(increment) = step.values[i] {
                    let wanted = increment + carry[i];
                    let speed = (wanted / step.duration).round();
                    carry[i] = wanted - step.duration * speed;
                    realized[i] += step.duration * speed;
                    speeds[i] = Some(speed);
                }
            }
            steps.push(SpeedStep {
                duration: step.duration,
                speeds,
            });
        }

        let mut last_target = Pose::hold();
        if n > 0 {
            for channel in Channel::ALL {
                let i = channel.index();
                let Some(target) = self.target.at(i) else {
                    continue;
                };
                let motor = puppet.motor(channel);
                if motor.is_static() {
                    let origin_angle = origin.at(i).unwrap_or_else(|| motor.angle());
                    let origin_len = motor.string_length_from_angle(origin_angle)?;
                    let angle = motor.angle_from_string_length(origin_len + realized[i])?;
                    last_target.set_at(i, Some(angle));
                } else {
                    last_target.set_at(i, Some(target));
                }
            }
        }
        self.last_target = last_target;
        Ok(SpeedProfile { steps })
    }

    /// Bridges the speed profile to the scheduler's queue format: one batch
    /// per step whose commands carry the channel's absolute target for that
    /// step (the running realized angle for string channels, the literal
    /// target plus the caller's constant speed for direct ones).
    pub fn command_batches(
        &mut self,
        puppet: &Marionette,
        origin: &Pose,
        duration: f64,
        direct_speeds: &[f64],
    ) -> Result<Vec<CommandBatch>, PlannerError> {
        if direct_speeds.len() != self.target.len() {
            return Err(PlannerError::SizeMismatch {
                origin: direct_speeds.len(),
                target: self.target.len(),
            });
        }
        let profile = self.speed_profile(puppet, origin, duration)?;

        // Running string length per static channel, advanced step by step.
        let mut running_len = vec![None; Channel::ALL.len()];
        for channel in Channel::ALL {
            let i = channel.index();
            let motor = puppet.motor(channel);
            if motor.is_static() && self.target.at(i).is_some() {
                let origin_angle = origin.at(i).unwrap_or_else(|| motor.angle());
                running_len[i] = Some(motor.string_length_from_angle(origin_angle)?);
            }
        }

        let mut batches = Vec::with_capacity(profile.steps.len());
        for step in &profile.steps {
            let mut batch = CommandBatch::new(step.duration);
            for channel in Channel::ALL {
                let i = channel.index();
                let Some(target) = self.target.at(i) else {
                    continue;
                };
                let motor = puppet.motor(channel);
                if motor.is_static() {
                    let speed = step.speeds[i].unwrap_or(0.0);
                    let len = running_len[i]
                        .map(|l| l + step.duration * speed)
                        .unwrap_or(0.0);
                    running_len[i] = Some(len);
                    batch.commands.push(Command {
                        channel,
                        value: Some(motor.angle_from_string_length(len)?),
                        speed: speed.abs(),
                    });
                } else {
                    batch.commands.push(Command {
                        channel,
                        value: Some(target),
                        speed: direct_speeds[i],
                    });
                }
            }
            batches.push(batch);
        }
        Ok(batches)
    }
}
