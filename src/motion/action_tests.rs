// src/motion/action_tests.rs - Planner unit tests
use super::*;
use crate::config::Config;
use crate::kinematics::{Channel, Marionette, Pose};

fn puppet() -> Marionette {
    Marionette::from_config(&Config::default()).unwrap()
}

fn target_on(channel: Channel, angle: f64) -> Pose {
    let mut pose = Pose::hold();
    pose.set(channel, Some(angle));
    pose
}

#[test]
fn linear_sequence_hits_target_exactly() {
    let mut target = Pose::hold();
    target.set(Channel::Torso, Some(10.0));
    target.set(Channel::Head, Some(-33.3));
    let action = Action::new(target, 0.25);
    let sequence = action.linear_sequence(&Pose::zeros(), 7).unwrap();
    assert_eq!(sequence.len(), 7);
    let last = sequence.last().unwrap();
    assert_eq!(last.value(Channel::Torso), Some(10.0));
    assert_eq!(last.value(Channel::Head), Some(-33.3));
    // Unspecified channels hold the origin value.
    assert_eq!(last.value(Channel::LeftLeg), Some(0.0));
}

#[test]
fn linear_sequence_steps_are_even() {
    let action = Action::new(target_on(Channel::Torso, 8.0), 0.25);
    let sequence = action.linear_sequence(&Pose::zeros(), 4).unwrap();
    let values: Vec<f64> = sequence
        .iter()
        .map(|p| p.value(Channel::Torso).unwrap())
        .collect();
    assert_eq!(values, vec![2.0, 4.0, 6.0, 8.0]);
}

#[test]
fn linear_sequence_rejects_zero_steps() {
    let action = Action::new(Pose::hold(), 0.25);
    assert!(matches!(
        action.linear_sequence(&Pose::zeros(), 0),
        Err(PlannerError::InvalidStepCount(0))
    ));
}

#[test]
fn linear_sequence_rejects_size_mismatch() {
    let action = Action::new(Pose::hold(), 0.25);
    let short_origin = Pose::from_raw(vec![Some(0.0); 3]);
    assert!(matches!(
        action.linear_sequence(&short_origin, 3),
        Err(PlannerError::SizeMismatch {
            origin: 3,
            target: 14
        })
    ));
    assert!(matches!(
        action.step_plan(&puppet(), &short_origin, 1.0),
        Err(PlannerError::SizeMismatch { .. })
    ));
}

#[test]
fn step_durations_sum_to_duration() {
    let action = Action::new(target_on(Channel::Torso, 10.0), 0.25);
    let plan = action.step_plan(&puppet(), &Pose::zeros(), 1.1).unwrap();
    assert_eq!(plan.steps.len(), 5); // 4 full + 1 partial
    assert!((plan.total_duration() - 1.1).abs() < 1e-9);
    assert!((plan.steps[4].duration - 0.1).abs() < 1e-9);
}

#[test]
fn zero_duration_yields_empty_plan() {
    let action = Action::new(target_on(Channel::Torso, 10.0), 0.25);
    let plan = action.step_plan(&puppet(), &Pose::zeros(), 0.0).unwrap();
    assert!(plan.is_empty());
}

#[test]
fn negative_duration_is_rejected() {
    let action = Action::new(target_on(Channel::Torso, 10.0), 0.25);
    assert!(matches!(
        action.step_plan(&puppet(), &Pose::zeros(), -0.5),
        Err(PlannerError::InvalidDuration(_))
    ));
}

#[test]
fn remainder_carry_preserves_total_increment() {
    let puppet = puppet();
    let motor = puppet.motor(Channel::Torso);
    let target_angle = 97.0; // awkward increment, forces rounding
    let action = Action::new(target_on(Channel::Torso, target_angle), 0.25);
    let plan = action.step_plan(&puppet, &Pose::zeros(), 1.75).unwrap();

    let ideal = motor.string_length_from_angle(target_angle).unwrap()
        - motor.string_length_from_angle(0.0).unwrap();
    let sum: f64 = plan
        .steps
        .iter()
        .filter_map(|s| s.values[Channel::Torso.index()])
        .sum();
    assert!(
        (sum - ideal).abs() < 1e-9,
        "carried increments sum {} != ideal {}",
        sum,
        ideal
    );
    // All but the last step use the rounded per-step increment.
    let first = plan.steps[0].values[Channel::Torso.index()].unwrap();
    assert_eq!(first, first.round());
}

#[test]
fn direct_channels_are_not_decomposed() {
    let action = Action::new(target_on(Channel::Head, 42.0), 0.25);
    let plan = action.step_plan(&puppet(), &Pose::zeros(), 1.0).unwrap();
    for step in &plan.steps {
        assert_eq!(step.values[Channel::Head.index()], Some(42.0));
    }
}

#[test]
fn scenario_single_channel_one_second() {
    // Origin all zero, channel 2 (torso, string-driven) to 10 degrees,
    // duration 1.0s at 0.25s interval: exactly 4 equal steps.
    let puppet = puppet();
    let motor = puppet.motor(Channel::Torso);
    let action = Action::new(target_on(Channel::Torso, 10.0), 0.25);
    let plan = action.step_plan(&puppet, &Pose::zeros(), 1.0).unwrap();
    assert_eq!(plan.steps.len(), 4);

    let total = motor.string_length_from_angle(10.0).unwrap()
        - motor.string_length_from_angle(0.0).unwrap();
    let per_step = (total / 4.0).round();
    for step in &plan.steps[..3] {
        assert_eq!(step.duration, 0.25);
        assert_eq!(step.values[Channel::Torso.index()], Some(per_step));
        for channel in Channel::ALL {
            if channel != Channel::Torso {
                assert_eq!(step.values[channel.index()], None);
            }
        }
    }
    assert_eq!(
        plan.steps[3].values[Channel::Torso.index()],
        Some(total - per_step * 3.0)
    );
}

#[test]
fn speed_profile_converges_to_ideal_total() {
    let puppet = puppet();
    let motor = puppet.motor(Channel::RightHand);
    let target_angle = 123.0;
    let mut action = Action::new(target_on(Channel::RightHand, target_angle), 0.25);
    let profile = action
        .speed_profile(&puppet, &Pose::zeros(), 2.0)
        .unwrap();

    let ideal = motor.string_length_from_angle(target_angle).unwrap()
        - motor.string_length_from_angle(0.0).unwrap();
    let realized: f64 = profile
        .steps
        .iter()
        .map(|s| s.duration * s.speeds[Channel::RightHand.index()].unwrap_or(0.0))
        .sum();
    // Integer speeds over 0.25s slices quantize to 0.25-unit granularity.
    assert!(
        (realized - ideal).abs() <= 0.25,
        "realized {} too far from ideal {}",
        realized,
        ideal
    );
    for step in &profile.steps {
        let speed = step.speeds[Channel::RightHand.index()].unwrap();
        assert_eq!(speed, speed.round());
    }
}

#[test]
fn last_target_exposes_realized_angles() {
    let puppet = puppet();
    let mut action = Action::new(target_on(Channel::RightHand, 123.0), 0.25);
    action.speed_profile(&puppet, &Pose::zeros(), 2.0).unwrap();
    let realized = action.last_target().value(Channel::RightHand).unwrap();
    // Realized angle is close to, but not necessarily exactly, the request.
    assert!((realized - 123.0).abs() < 5.0);
    // Direct channels report the raw target.
    let mut action = Action::new(target_on(Channel::Head, 31.0), 0.25);
    action.speed_profile(&puppet, &Pose::zeros(), 1.0).unwrap();
    assert_eq!(action.last_target().value(Channel::Head), Some(31.0));
}

#[test]
fn command_batches_carry_absolute_targets() {
    let puppet = puppet();
    let mut target = Pose::hold();
    target.set(Channel::Torso, Some(40.0));
    target.set(Channel::Head, Some(15.0));
    let mut action = Action::new(target, 0.25);
    let speeds = vec![9.0; 14];
    let batches = action
        .command_batches(&puppet, &Pose::zeros(), 1.0, &speeds)
        .unwrap();
    assert_eq!(batches.len(), 4);

    // String channel: absolute running angle, strictly advancing.
    let mut previous = 0.0;
    for batch in &batches {
        let cmd = batch
            .commands
            .iter()
            .find(|c| c.channel == Channel::Torso)
            .unwrap();
        let value = cmd.value.unwrap();
        assert!(value >= previous);
        previous = value;
    }
    let final_torso = batches
        .last()
        .unwrap()
        .commands
        .iter()
        .find(|c| c.channel == Channel::Torso)
        .unwrap()
        .value
        .unwrap();
    // The final absolute target is exactly the realized end state the
    // planner reports, which quantization may place off the raw request.
    let realized = action.last_target().value(Channel::Torso).unwrap();
    assert!((final_torso - realized).abs() < 1e-9);

    // Direct channel: literal target and the caller-supplied speed.
    for batch in &batches {
        let cmd = batch
            .commands
            .iter()
            .find(|c| c.channel == Channel::Head)
            .unwrap();
        assert_eq!(cmd.value, Some(15.0));
        assert_eq!(cmd.speed, 9.0);
    }
}

#[test]
fn command_batches_reject_short_speed_vector() {
    let puppet = puppet();
    let mut action = Action::new(target_on(Channel::Torso, 10.0), 0.25);
    assert!(matches!(
        action.command_batches(&puppet, &Pose::zeros(), 1.0, &[1.0, 2.0]),
        Err(PlannerError::SizeMismatch { .. })
    ));
}
