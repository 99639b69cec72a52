//! End-to-end pipeline test: two-point calibration capture through scan
//! execution against the simulated stage and camera.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use hardware::{Rounding, SimulatedCapture, SimulatedStage};
use microstage::{
    CalibrationParams, CalibrationPoint, CaptureCommand, MotionController, PointCapture,
    ReanchorPolicy, ScanConfig, ScanError, ScanSequencer, StageReading,
};
use nalgebra::{Vector2, Vector3};

fn reading(x: f64, y: f64, z: f64) -> StageReading {
    StageReading { x, y, r: 0.0, z }
}

fn test_config() -> ScanConfig {
    ScanConfig {
        settle: Duration::ZERO,
        output_dir: std::env::temp_dir(),
        file_prefix: "pipeline".to_string(),
        ..ScanConfig::default()
    }
}

/// Calibration where the stage frame is rotated and scaled relative to the
/// sample frame: reference points 10 sample units apart along v land on
/// stage points (5, 5) and (6, 15).
fn rotated_calibration() -> CalibrationParams {
    let p1 = CalibrationPoint {
        sample: Vector2::new(0.0, 0.0),
        stage: reading(5.0, 5.0, 12.0),
    };
    let p2 = CalibrationPoint {
        sample: Vector2::new(0.0, 10.0),
        stage: reading(6.0, 15.0, 12.4),
    };
    CalibrationParams::from_points(p1, p2, 10.0, false).unwrap()
}

#[test]
fn test_calibrate_then_scan_visits_mapped_stage_points() {
    let _ = env_logger::builder().is_test(true).try_init();

    // Capture the two reference points through the interactive workflow.
    let mut capture_flow = PointCapture::new();
    capture_flow
        .apply(CaptureCommand::MarkP1(reading(5.0, 5.0, 12.0)))
        .unwrap();
    capture_flow
        .apply(CaptureCommand::MarkP2(reading(6.0, 15.0, 12.4)))
        .unwrap();
    let record = capture_flow.apply(CaptureCommand::Finish).unwrap().unwrap();

    let p1 = CalibrationPoint {
        sample: Vector2::new(0.0, 0.0),
        stage: record.p1,
    };
    let p2 = CalibrationPoint {
        sample: Vector2::new(0.0, 10.0),
        stage: record.p2,
    };
    let calibration = CalibrationParams::from_points(p1, p2, 10.0, false).unwrap();

    // The derived transform must land the second reference point exactly.
    let mapped = calibration.sample_to_stage(Vector2::new(0.0, 10.0));
    assert_relative_eq!(mapped.x, 6.0, epsilon = 1e-9);
    assert_relative_eq!(mapped.y, 15.0, epsilon = 1e-9);
    assert_relative_eq!(calibration.focus_z(10.0), 12.4, epsilon = 1e-9);

    // Scan a short raster; the stage starts at the first reference point.
    let mut motion = MotionController::connect(SimulatedStage::new()).unwrap();
    let mut camera = SimulatedCapture::uniform(8, 8, 4096);
    let targets = [
        Vector2::new(1.0, 0.0),
        Vector2::new(1.0, 1.0),
        Vector2::new(0.0, 1.0),
    ];

    let report = ScanSequencer::new(&calibration, &mut motion, &mut camera, test_config())
        .run(Vector2::new(0.0, 0.0), &targets)
        .unwrap();

    assert_eq!(report.completed.len(), 3);
    assert_eq!(report.final_sample, Vector2::new(0.0, 1.0));

    // Frames are saved in visit order with plan-aligned indices.
    let paths = camera.saved_paths();
    assert_eq!(paths.len(), 3);
    for (i, path) in paths.iter().enumerate() {
        assert!(path.ends_with(format!("pipeline_{i}.png")));
    }

    // The net commanded displacement equals the stage-frame difference
    // between the last target and the starting point.
    let expected = calibration.sample_to_stage(Vector2::new(0.0, 1.0))
        - calibration.sample_to_stage(Vector2::new(0.0, 0.0));
    let position = motion.position();
    assert_relative_eq!(position.commanded.x, expected.x, epsilon = 1e-9);
    assert_relative_eq!(position.commanded.y, expected.y, epsilon = 1e-9);
    assert_relative_eq!(
        position.commanded.z,
        calibration.focus_z(1.0) - calibration.focus_z(0.0),
        epsilon = 1e-9
    );
}

#[test]
fn test_driver_failure_aborts_with_resume_context() {
    let _ = env_logger::builder().is_test(true).try_init();

    let calibration = rotated_calibration();
    let stage = SimulatedStage::new().with_failure_at_move(2);
    let mut motion = MotionController::connect(stage).unwrap();
    let mut camera = SimulatedCapture::uniform(8, 8, 0);

    let targets = [
        Vector2::new(0.5, 0.0),
        Vector2::new(1.0, 0.0),
        Vector2::new(1.5, 0.0),
        Vector2::new(2.0, 0.0),
    ];
    let err = ScanSequencer::new(&calibration, &mut motion, &mut camera, test_config())
        .run(Vector2::new(0.0, 0.0), &targets)
        .unwrap_err();

    match err {
        ScanError::Aborted {
            failed_index,
            completed,
            ..
        } => {
            assert_eq!(failed_index, 2);
            assert_eq!(completed, 2);
        }
        other => panic!("expected aborted scan, got {other:?}"),
    }
    assert_eq!(err.completed(), 2);

    // No capture after the failing move; targets past it never attempted.
    assert_eq!(camera.saved_paths().len(), 2);
    assert_eq!(motion.driver_ref().command_log().len(), 2);
}

#[test]
fn test_capture_failure_aborts_scan() {
    let _ = env_logger::builder().is_test(true).try_init();

    let calibration = rotated_calibration();
    let mut motion = MotionController::connect(SimulatedStage::new()).unwrap();
    let mut camera = SimulatedCapture::uniform(8, 8, 0);
    camera.fail_acquisitions();

    let err = ScanSequencer::new(&calibration, &mut motion, &mut camera, test_config())
        .run(Vector2::new(0.0, 0.0), &[Vector2::new(1.0, 0.0)])
        .unwrap_err();

    assert!(matches!(
        err,
        ScanError::CaptureFailed {
            failed_index: 0,
            completed: 0,
            ..
        }
    ));
}

#[test]
fn test_abort_flag_stops_between_targets() {
    let _ = env_logger::builder().is_test(true).try_init();

    let calibration = rotated_calibration();
    let mut motion = MotionController::connect(SimulatedStage::new()).unwrap();
    let mut camera = SimulatedCapture::uniform(8, 8, 0);
    let flag = Arc::new(AtomicBool::new(false));
    flag.store(true, Ordering::Relaxed);

    let err = ScanSequencer::new(&calibration, &mut motion, &mut camera, test_config())
        .with_abort_flag(flag)
        .run(Vector2::new(0.0, 0.0), &[Vector2::new(1.0, 0.0)])
        .unwrap_err();

    assert!(matches!(err, ScanError::Cancelled { completed: 0 }));
    assert!(motion.driver_ref().command_log().is_empty());
}

#[test]
fn test_reanchoring_compensates_cumulative_slip() {
    let _ = env_logger::builder().is_test(true).try_init();

    let calibration = rotated_calibration();
    // 5 um of missed travel per move in y.
    let slip = Vector3::new(0.0, -0.005, 0.0);

    let run = |reanchor: ReanchorPolicy| {
        let stage = SimulatedStage::new().with_encoder_slip(slip);
        let mut motion = MotionController::connect(stage).unwrap();
        let mut camera = SimulatedCapture::uniform(4, 4, 0);
        let config = ScanConfig {
            reanchor,
            ..test_config()
        };
        let targets: Vec<Vector2<f64>> =
            (1..=6).map(|i| Vector2::new(0.0, i as f64)).collect();
        ScanSequencer::new(&calibration, &mut motion, &mut camera, config)
            .run(Vector2::new(0.0, 0.0), &targets)
            .unwrap();
        motion.position().commanded
    };

    let dead_reckoned = run(ReanchorPolicy::Never);
    let reanchored = run(ReanchorPolicy::EveryN(2));

    // With re-anchoring the plan folds measured slip back into subsequent
    // displacements, so the total commanded travel exceeds the ideal plan by
    // the slip accumulated up to the last anchor.
    assert!(reanchored.y > dead_reckoned.y);
    // Anchors at targets 2 and 4 recover 2 moves' slip each; slip from the
    // final anchor onward remains uncorrected.
    assert_relative_eq!(reanchored.y - dead_reckoned.y, 0.02, epsilon = 1e-9);
}

#[test]
fn test_motion_bookkeeping_survives_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut motion = MotionController::connect(SimulatedStage::new()).unwrap();
    let out = Vector3::new(0.25, -0.5, 0.01);
    motion
        .move_relative(out, 0.01, Rounding::NearestFullStep)
        .unwrap();
    motion
        .move_relative(-out, 0.01, Rounding::NearestFullStep)
        .unwrap();

    let position = motion.position();
    assert_relative_eq!(position.commanded.norm(), 0.0, epsilon = 1e-12);
    assert_relative_eq!(position.encoder_corrected.norm(), 0.0, epsilon = 1e-12);
    assert_relative_eq!(position.drift().norm(), 0.0, epsilon = 1e-12);
}
