// src/scheduler/tests.rs - Executor and API tests against the mock link
use super::*;
use crate::gestures::GestureLibrary;
use crate::hardware::mock::{LinkCall, MockLink};
use crate::positions::PositionStore;

fn test_config() -> Config {
    let mut config = Config::default();
    config.motion.interval = 0.05;
    config.motion.tick_ms = 2;
    config.tracking.choreography_pause_ms = 10;
    config.tracking.head_data_timeout_ms = 50;
    config
}

fn scheduler(dir: &tempfile::TempDir) -> (MotionScheduler, MockLink) {
    let config = test_config();
    let puppet = Marionette::from_config(&config).unwrap();
    let positions = PositionStore::empty(&dir.path().join("positions.json"));
    let scheduler = MotionScheduler::new(
        &config,
        puppet,
        positions,
        GestureLibrary::default(),
        Calibration::default(),
    );
    (scheduler, MockLink::new())
}

fn target(entries: &[(Channel, f64)]) -> Pose {
    let mut pose = Pose::hold();
    for (channel, angle) in entries {
        pose.set(*channel, Some(*angle));
    }
    pose
}

async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[test]
fn move_to_unknown_name_leaves_commanded_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, _) = scheduler(&dir);
    let before = scheduler.commanded_pose();
    assert!(scheduler.move_to("nonexistent").is_none());
    assert_eq!(scheduler.commanded_pose(), before);
    assert_eq!(scheduler.pending_batches(), 0);
}

#[test]
fn move_to_angles_updates_commanded_and_enqueues() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, _) = scheduler(&dir);
    // Direct-rotation channels keep their literal target in the
    // commanded pose; string channels go through speed quantization.
    let commanded = scheduler
        .move_to_angles(&target(&[(Channel::Shoulder, 10.0)]), &[100.0; 14])
        .unwrap();
    assert_eq!(commanded.value(Channel::Shoulder), Some(10.0));
    assert_eq!(commanded.value(Channel::Head), None);
    assert!(scheduler.pending_batches() > 0);
    assert!(!scheduler.is_target_reached());

    // A second move keeps the previous commanded value on unspecified
    // channels.
    let commanded = scheduler
        .move_to_angles(&target(&[(Channel::Head, 5.0)]), &[100.0; 14])
        .unwrap();
    assert_eq!(commanded.value(Channel::Shoulder), Some(10.0));
    assert_eq!(commanded.value(Channel::Head), Some(5.0));
}

#[tokio::test]
async fn reach_converges_on_quantized_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    // Coarse slices make the integer-speed quantization visible: a
    // torso request of 10 degrees at speed 20 realizes well over a
    // tolerance unit away.
    config.motion.interval = 0.25;
    let puppet = Marionette::from_config(&config).unwrap();
    let positions = PositionStore::empty(&dir.path().join("positions.json"));
    let scheduler = MotionScheduler::new(
        &config,
        puppet,
        positions,
        GestureLibrary::default(),
        Calibration::default(),
    );
    let link = MockLink::new();
    scheduler.start(Box::new(link.clone()));

    scheduler
        .move_to_angles(&target(&[(Channel::Torso, 10.0)]), &[20.0; 14])
        .unwrap();
    settle(100).await;

    let dispatched = link
        .calls()
        .iter()
        .find_map(|c| match c {
            LinkCall::Motor { id: 2, angle, .. } => Some(*angle),
            _ => None,
        })
        .expect("no torso command dispatched");
    assert!((dispatched - 10.0).abs() > REACH_TOLERANCE);
    let commanded = scheduler.commanded_pose().value(Channel::Torso).unwrap();
    assert!((commanded - dispatched).abs() < 1e-9);

    // Hardware that faithfully reaches exactly what it was told must
    // satisfy the reach predicate.
    link.push_feedback(&format!("m,2,{}", dispatched));
    settle(100).await;
    assert!(scheduler.is_target_reached());
    scheduler.shutdown().await;
}

#[test]
fn clear_pending_discards_queue() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, _) = scheduler(&dir);
    scheduler
        .move_to_angles(&target(&[(Channel::Torso, 50.0)]), &[10.0; 14])
        .unwrap();
    assert!(scheduler.pending_batches() > 0);
    scheduler.clear_pending();
    assert_eq!(scheduler.pending_batches(), 0);
}

#[tokio::test]
async fn worker_routes_by_channel_kind() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, link) = scheduler(&dir);
    scheduler.start(Box::new(link.clone()));

    scheduler
        .move_to_angles(
            &target(&[
                (Channel::Head, 15.0),
                (Channel::Torso, 10.0),
                (Channel::Back, 5.0),
            ]),
            &[100.0; 14],
        )
        .unwrap();
    settle(600).await;

    let calls = link.calls();
    assert!(
        calls
            .iter()
            .any(|c| matches!(c, LinkCall::Head { angle, .. } if (*angle - 15.0).abs() < 1e-9)),
        "no head call in {:?}",
        calls
    );
    assert!(
        calls
            .iter()
            .any(|c| matches!(c, LinkCall::Motor { id: 2, .. })),
        "no torso motor call in {:?}",
        calls
    );
    // The back motor is disabled on current hardware.
    assert!(
        !calls
            .iter()
            .any(|c| matches!(c, LinkCall::Motor { id: 11, .. })),
        "disabled back motor was commanded: {:?}",
        calls
    );
    scheduler.shutdown().await;
}

#[tokio::test]
async fn eye_commands_are_coalesced_into_one_call() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, link) = scheduler(&dir);
    scheduler.start(Box::new(link.clone()));

    let point = CameraPoint { x: 640.0, y: 240.0 };
    assert!(scheduler.move_eyes(point));
    settle(200).await;

    let calls = link.calls();
    let eye_calls = calls
        .iter()
        .filter(|c| matches!(c, LinkCall::Eyes { .. }))
        .count();
    assert_eq!(eye_calls, 1, "expected one combined eye call: {:?}", calls);
    // No per-axis motor calls leak through for the eye channels.
    assert!(
        !calls
            .iter()
            .any(|c| matches!(c, LinkCall::Motor { id: 12 | 13, .. })),
        "eye axes dispatched separately: {:?}",
        calls
    );
    // Both axes carry the aim: the right image edge maps to the
    // calibrated yaw extremum, mid-height to zero pitch.
    match calls.iter().find(|c| matches!(c, LinkCall::Eyes { .. })) {
        Some(LinkCall::Eyes { x, y, .. }) => {
            assert!((x - 40.0).abs() < 1e-9);
            assert_eq!(*y, 0.0);
        }
        _ => unreachable!(),
    }
    scheduler.shutdown().await;
}

#[tokio::test]
async fn feedback_updates_measured_pose() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, link) = scheduler(&dir);
    scheduler.start(Box::new(link.clone()));

    link.push_feedback("h,20");
    link.push_feedback("e,30,40");
    link.push_feedback("m,2,7");
    link.push_feedback("garbage,frame");
    settle(100).await;

    let measured = scheduler.measured_pose();
    assert_eq!(measured.value(Channel::Head), Some(20.0));
    assert_eq!(measured.value(Channel::EyeX), Some(30.0));
    assert_eq!(measured.value(Channel::EyeY), Some(40.0));
    assert_eq!(measured.value(Channel::Torso), Some(7.0));
    scheduler.shutdown().await;
}

#[tokio::test]
async fn target_reached_ignores_async_channels() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, link) = scheduler(&dir);
    scheduler.start(Box::new(link.clone()));

    scheduler
        .move_to_angles(
            &target(&[(Channel::Torso, 10.0), (Channel::Head, 50.0)]),
            &[100.0; 14],
        )
        .unwrap();
    settle(100).await;
    assert!(!scheduler.is_target_reached());

    // Only the torso converges; the head stays wildly off, but it settles
    // asynchronously and is excluded from the predicate.
    link.push_feedback("m,2,10");
    settle(100).await;
    assert!(scheduler.is_target_reached());
    scheduler.shutdown().await;
}

#[tokio::test]
async fn gesture_playback_is_single_flight() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, link) = scheduler(&dir);
    scheduler.start(Box::new(link.clone()));
    scheduler
        .add_position(
            "wave",
            target(&[(Channel::RightHand, 30.0)]),
            vec![100.0; 14],
        )
        .unwrap();

    let gesture = Gesture {
        id: "hello".to_string(),
        weight: 1.0,
        tokens: vec![
            GestureToken::Delay(0.2),
            GestureToken::Position("wave".to_string()),
        ],
    };
    assert!(scheduler.execute_gesture(&gesture, true).await);
    assert!(scheduler.is_gesture_playing());
    let pending = scheduler.pending_batches();

    // Second request while running: dropped by design, queue untouched.
    assert!(!scheduler.execute_gesture(&gesture, true).await);
    assert_eq!(scheduler.pending_batches(), pending);

    settle(500).await;
    assert!(!scheduler.is_gesture_playing());
    scheduler.shutdown().await;
}

#[tokio::test]
async fn choreography_orders_eyes_imu_head() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, link) = scheduler(&dir);
    scheduler.start(Box::new(link.clone()));

    let point = CameraPoint { x: 640.0, y: 240.0 };
    assert!(scheduler.move_eyes_and_head(point));
    // While the choreography runs, ordinary tracking calls are no-ops.
    assert!(!scheduler.move_eyes(point));
    assert!(!scheduler.move_eyes_and_head(point));

    settle(500).await;
    let calls = link.calls();
    let eyes = calls
        .iter()
        .position(|c| matches!(c, LinkCall::Eyes { .. }))
        .expect("no eye call");
    let imu = calls
        .iter()
        .position(|c| matches!(c, LinkCall::EngageImu))
        .expect("no IMU engage");
    let head = calls
        .iter()
        .position(|c| matches!(c, LinkCall::Head { .. }))
        .expect("no head call");
    let disengage = calls
        .iter()
        .position(|c| matches!(c, LinkCall::DisengageImu))
        .expect("no IMU disengage");
    assert!(
        eyes < imu && imu < head && head < disengage,
        "order was {:?}",
        calls
    );

    // Tracking is re-enabled afterwards.
    assert!(scheduler.move_eyes(point));
    scheduler.shutdown().await;
}

#[tokio::test]
async fn head_data_request_times_out_to_stale_reading() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, link) = scheduler(&dir);
    scheduler.start(Box::new(link.clone()));

    // Seed a stale IMU reading through the feedback path.
    link.push_feedback("i,1,2,3");
    settle(50).await;

    let started = std::time::Instant::now();
    let reading = scheduler.request_head_data().await;
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(
        reading,
        ImuReading {
            roll: 1.0,
            pitch: 2.0,
            yaw: 3.0
        }
    );
    // The request itself was dispatched at time-critical priority.
    assert!(link.calls().contains(&LinkCall::RequestHeadData));
    scheduler.shutdown().await;
}

#[tokio::test]
async fn head_data_request_wakes_on_imu_frame() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, link) = scheduler(&dir);
    scheduler.start(Box::new(link.clone()));

    let waiter = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.request_head_data().await }
    });
    settle(10).await;
    link.push_feedback("i,4,5,6");

    let reading = waiter.await.unwrap();
    assert_eq!(
        reading,
        ImuReading {
            roll: 4.0,
            pitch: 5.0,
            yaw: 6.0
        }
    );
    scheduler.shutdown().await;
}

#[tokio::test]
async fn idle_tracks_queue_occupancy() {
    let dir = tempfile::tempdir().unwrap();
    let (scheduler, link) = scheduler(&dir);
    scheduler.start(Box::new(link.clone()));
    settle(50).await;
    assert!(scheduler.is_idle());

    scheduler
        .move_to_angles(&target(&[(Channel::Torso, 40.0)]), &[10.0; 14])
        .unwrap();
    settle(20).await;
    assert!(!scheduler.is_idle());
    scheduler.shutdown().await;
}
