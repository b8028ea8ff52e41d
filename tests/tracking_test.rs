mod common;

use std::sync::Arc;

use common::{MockPtz, pos};
use ptz_arbiter::config::AssociationConfig;
use ptz_arbiter::control::{SwitchReason, TargetChange, TrackingCore, TrackingState};
use ptz_arbiter::device::CommandGate;
use ptz_arbiter::integration::{DetectionBuilder, filter_detections};
use ptz_arbiter::{AssociationTracker, TrackingConfig};

fn core(config: TrackingConfig, device: &MockPtz) -> TrackingCore {
    let gate = Arc::new(CommandGate::new(device.boxed()));
    TrackingCore::new(config, gate, 0.0).unwrap()
}

fn id_near(core: &TrackingCore, cx: f64) -> u64 {
    core.objects()
        .values()
        .find(|o| (o.current_position().unwrap().cx - cx).abs() < 0.05)
        .map(|o| o.id)
        .unwrap()
}

#[test]
fn test_association_identity() {
    let mut tracker = AssociationTracker::new(AssociationConfig::default());

    // Frame 1: one boat.
    let tracks = tracker.update(&[pos(0.3, 0.5, 0.1, 0.9, 0.0)]);
    assert_eq!(tracks.len(), 1);
    let id = tracks[0].id;

    // Frame 2: moved slightly, same identity.
    let tracks = tracker.update(&[pos(0.305, 0.5, 0.1, 0.9, 0.1)]);
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].id, id);
    assert!(tracks[0].matched);

    // Frame 3: missed, track coasts with its metadata.
    let tracks = tracker.update(&[]);
    assert_eq!(tracks.len(), 1);
    assert!(!tracks[0].matched);
    assert_eq!(tracks[0].position.confidence, 0.9);

    // Frame 4: back again.
    let tracks = tracker.update(&[pos(0.31, 0.5, 0.1, 0.9, 0.3)]);
    assert_eq!(tracks[0].id, id);
    assert!(tracks[0].matched);
}

#[test]
fn test_centered_target_commands_no_pan_tilt() {
    let device = MockPtz::new();
    let mut core = core(TrackingConfig::default(), &device);

    let report = core.cycle(Some(&[pos(0.5, 0.5, 0.4, 0.9, 0.0)]), 0.0);
    assert_eq!(report.state, TrackingState::Tracking);
    let cmd = report.command.unwrap();
    assert!(cmd.pan_speed.abs() < 1e-9);
    assert!(cmd.tilt_speed.abs() < 1e-9);
    assert_eq!(device.moves(), 1);
}

#[test]
fn test_left_target_pans_left() {
    let device = MockPtz::new();
    let mut config = TrackingConfig::default();
    config.motion.max_pan_speed = 1.0;
    let mut core = core(config, &device);

    let report = core.cycle(Some(&[pos(0.1, 0.5, 0.2, 0.9, 0.0)]), 0.0);
    let cmd = report.command.unwrap();
    assert!(cmd.pan_speed < -0.75);
    assert!(cmd.pan_speed >= -1.0);
    let (pan, _, _) = device.last_continuous().unwrap();
    assert_eq!(pan, cmd.pan_speed);
}

#[test]
fn test_highest_priority_becomes_target() {
    let device = MockPtz::new();
    let mut core = core(TrackingConfig::default(), &device);

    // Large confident object at the center, small weak one in the corner.
    let report = core.cycle(
        Some(&[pos(0.5, 0.5, 0.4, 0.9, 0.0), pos(0.85, 0.85, 0.1, 0.65, 0.0)]),
        0.0,
    );
    let strong = id_near(&core, 0.5);
    let weak = id_near(&core, 0.85);
    assert!(core.objects()[&strong].priority_score > core.objects()[&weak].priority_score);
    assert_eq!(report.target, Some(strong));
    assert_eq!(report.change, Some(TargetChange::Acquired { to: strong }));
    assert!(core.objects()[&strong].is_primary_target);
    assert!(!core.objects()[&weak].is_primary_target);
}

#[test]
fn test_low_confidence_detection_ignored() {
    let device = MockPtz::new();
    let config = TrackingConfig::default();
    let raw = vec![
        DetectionBuilder::new()
            .xywh(0.5, 0.5, 0.2, 0.2)
            .confidence(0.1)
            .build(),
    ];
    let batch = filter_detections(&raw, &config, 0.0);
    assert!(batch.positions.is_empty());
    assert_eq!(batch.low_confidence, 1);

    let mut core = core(config, &device);
    let report = core.cycle(Some(&batch.positions), 0.0);
    assert!(core.objects().is_empty());
    assert_eq!(report.state, TrackingState::Idle);
    assert_eq!(device.moves(), 0);
}

#[test]
fn test_detection_just_above_threshold_is_tracked() {
    let device = MockPtz::new();
    let config = TrackingConfig::default();
    let raw = vec![
        DetectionBuilder::new()
            .xywh(0.5, 0.5, 0.2, 0.2)
            .confidence(0.55)
            .build(),
    ];
    let mut core = core(config.clone(), &device);

    for step in 0..5 {
        let t = step as f64 * 0.1;
        let batch = filter_detections(&raw, &config, t);
        assert_eq!(batch.positions.len(), 1);
        core.cycle(Some(&batch.positions), t);
    }
    assert_eq!(core.objects().len(), 1);
    assert!(core.current_target().is_some());
}

#[test]
fn test_unseen_object_expires() {
    let device = MockPtz::new();
    let mut core = core(TrackingConfig::default(), &device);

    core.cycle(Some(&[pos(0.5, 0.5, 0.3, 0.9, 0.0)]), 0.0);
    assert_eq!(core.objects().len(), 1);

    // Exactly at the lifetime it is still present.
    core.cycle(None, 3.0);
    assert_eq!(core.objects().len(), 1);

    let report = core.cycle(None, 3.1);
    assert!(core.objects().is_empty());
    assert_eq!(report.target, None);
    assert_eq!(report.state, TrackingState::Lost);
    assert_eq!(core.totals().target_losses, 1);
}

#[test]
fn test_lost_target_reselected_same_cycle() {
    let device = MockPtz::new();
    let mut config = TrackingConfig::default();
    config.alternating_enabled = false;
    let mut core = core(config, &device);

    let a = pos(0.5, 0.5, 0.4, 0.9, 0.0);
    let b = pos(0.8, 0.3, 0.15, 0.8, 0.0);
    core.cycle(Some(&[a, b.clone()]), 0.0);
    let first = core.current_target().unwrap();
    let other = id_near(&core, 0.8);
    assert_ne!(first, other);

    // Only the second object keeps being seen.
    let mut t = 0.0;
    let mut last = None;
    while t < 3.5 {
        t += 0.1;
        let report = core.cycle(Some(&[pos(0.8, 0.3, 0.15, 0.8, t)]), t);
        if core.current_target() != Some(first) {
            last = Some(report);
            break;
        }
    }

    let report = last.unwrap();
    assert!(t > 3.0);
    assert_eq!(report.target, Some(other));
    assert_eq!(report.state, TrackingState::Switching);
    assert_eq!(
        report.change,
        Some(TargetChange::Switched {
            from: Some(first),
            to: other,
            reason: SwitchReason::TargetLost,
        })
    );
    assert_eq!(core.totals().target_losses, 1);
}

#[test]
fn test_flipping_priorities_respect_min_switch_interval() {
    let device = MockPtz::new();
    let mut config = TrackingConfig::default();
    config.min_switch_interval = 1.5;
    config.alternating_enabled = false;
    let mut core = core(config, &device);

    // Two boats equidistant from the center whose sizes alternate each frame.
    let mut switches = Vec::new();
    for step in 0..100 {
        let t = step as f64 * 0.1;
        let (left, right) = if step % 2 == 0 { (0.3, 0.2) } else { (0.2, 0.3) };
        let report = core.cycle(
            Some(&[pos(0.3, 0.5, left, 0.9, t), pos(0.7, 0.5, right, 0.9, t)]),
            t,
        );
        if let Some(TargetChange::Switched { reason, .. }) = report.change {
            assert_ne!(reason, SwitchReason::TargetLost);
            switches.push(t);
        }
    }

    assert!(!switches.is_empty());
    for pair in switches.windows(2) {
        assert!(pair[1] - pair[0] >= 1.5 - 1e-9, "switches at {pair:?}");
    }
}

#[test]
fn test_over_capacity_evicts_lowest_priority() {
    let device = MockPtz::new();
    let mut config = TrackingConfig::default();
    config.max_objects_to_track = 2;
    let mut core = core(config, &device);

    let batch = [
        pos(0.5, 0.5, 0.4, 0.9, 0.0),
        pos(0.3, 0.3, 0.2, 0.85, 0.0),
        pos(0.9, 0.9, 0.1, 0.65, 0.0),
    ];
    core.cycle(Some(&batch), 0.0);
    assert_eq!(core.objects().len(), 2);
    assert!(
        core.objects()
            .values()
            .all(|o| o.current_position().unwrap().cx < 0.8)
    );
    assert_eq!(core.totals().objects_evicted, 1);

    // The evicted identity is not re-admitted while association still holds it.
    core.cycle(Some(&batch), 0.1);
    assert_eq!(core.objects().len(), 2);
}

#[test]
fn test_evicted_object_readmitted_when_room_frees() {
    let device = MockPtz::new();
    let mut config = TrackingConfig::default();
    config.max_objects_to_track = 2;
    let mut core = core(config, &device);

    let weak = |t: f64| pos(0.9, 0.9, 0.1, 0.65, t);
    let mut t = 0.0;
    for _ in 0..5 {
        core.cycle(
            Some(&[pos(0.5, 0.5, 0.4, 0.9, t), pos(0.3, 0.3, 0.2, 0.85, t), weak(t)]),
            t,
        );
        t += 0.1;
    }
    assert_eq!(core.totals().objects_evicted, 1);
    assert!(
        core.objects()
            .values()
            .all(|o| o.current_position().unwrap().cx < 0.8)
    );

    // The other two leave; the evicted boat stays in view.
    let mut last = None;
    while t < 6.5 {
        last = Some(core.cycle(Some(&[weak(t)]), t));
        t += 0.1;
    }
    let report = last.unwrap();
    assert_eq!(core.objects().len(), 1);
    let id = id_near(&core, 0.9);
    assert_eq!(report.target, Some(id));
    assert_eq!(report.state, TrackingState::Tracking);
}

#[test]
fn test_history_bounded_through_cycles() {
    let device = MockPtz::new();
    let mut config = TrackingConfig::default();
    config.object.history_window = 10;
    let mut core = core(config, &device);

    for step in 0..50 {
        let t = step as f64 * 0.1;
        core.cycle(Some(&[pos(0.5, 0.5, 0.3, 0.9, t)]), t);
        for object in core.objects().values() {
            assert!(object.history_len() <= 10);
        }
    }
}

#[test]
fn test_statistics_accumulate() {
    let device = MockPtz::new();
    let mut core = core(TrackingConfig::default(), &device);

    for step in 0..20 {
        let t = step as f64 * 0.1;
        core.cycle(Some(&[pos(0.6, 0.5, 0.1, 0.9, t)]), t);
    }
    let totals = core.totals();
    assert_eq!(totals.cycles, 20);
    assert_eq!(totals.successful_tracks, 20);
    assert_eq!(totals.failed_tracks, 0);
    assert_eq!(totals.objects_created, 1);
    // Small object: zoom keeps moving in.
    assert!(totals.zoom_changes > 0);
    assert!(core.motion().zoom().level() > 0.5);
}
