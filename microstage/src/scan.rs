//! Scan sequencer: walk an ordered list of sample-frame targets, capturing
//! a frame at each one.
//!
//! The sequencer plans in the stage frame. For each target the displacement
//! is the difference between the target's mapped stage coordinates and the
//! previous target's, so positioning error does not depend on where in the
//! list a target sits. The plan advances from the computed coordinates, not
//! from an encoder estimate, unless a re-anchor policy says otherwise.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use hardware::{CaptureDevice, StageDriver};
use nalgebra::{Vector2, Vector3};
use tracing::{info, warn};

use crate::calibration::CalibrationParams;
use crate::config::{ReanchorPolicy, ScanConfig};
use crate::error::ScanError;
use crate::motion::MotionController;

/// One completed scan target.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRow {
    /// Index of the target in the submitted list.
    pub index: usize,
    /// Target in sample coordinates, as submitted.
    pub sample: Vector2<f64>,
    /// Planned stage xy for this target, mm.
    pub stage: Vector2<f64>,
    /// Planned focus height for this target, mm.
    pub z: f64,
    /// Where the captured frame was written.
    pub image_path: std::path::PathBuf,
}

/// Result of a completed scan run.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Every target reached and captured, in visit order.
    pub completed: Vec<ScanRow>,
    /// Sample coordinates of the last visited target (the starting point if
    /// the list was empty).
    pub final_sample: Vector2<f64>,
}

/// Drives a scan over sample-frame targets.
pub struct ScanSequencer<'a, D: StageDriver, C: CaptureDevice> {
    calibration: &'a CalibrationParams,
    motion: &'a mut MotionController<D>,
    capture: &'a mut C,
    config: ScanConfig,
    abort: Option<Arc<AtomicBool>>,
}

impl<'a, D: StageDriver, C: CaptureDevice> ScanSequencer<'a, D, C> {
    pub fn new(
        calibration: &'a CalibrationParams,
        motion: &'a mut MotionController<D>,
        capture: &'a mut C,
        config: ScanConfig,
    ) -> Self {
        Self {
            calibration,
            motion,
            capture,
            config,
            abort: None,
        }
    }

    /// Install a cooperative cancellation flag, checked between targets.
    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    /// Visit every target in order, starting from `start_sample` (the sample
    /// coordinates the stage currently sits at).
    ///
    /// Fails fast: the first driver or capture failure ends the run, and the
    /// error reports which target failed and how many completed before it.
    pub fn run(
        &mut self,
        start_sample: Vector2<f64>,
        targets: &[Vector2<f64>],
    ) -> Result<ScanReport, ScanError> {
        let start_stage = self.calibration.sample_to_stage(start_sample);
        let start_z = self.calibration.focus_z(start_sample.y);

        // Encoder baseline for re-anchoring: measured displacement since the
        // run started maps onto stage-frame displacement from start_stage.
        let encoder_baseline = self.motion.position().encoder_corrected;

        let mut prev_stage = start_stage;
        let mut prev_z = start_z;
        let mut prev_sample = start_sample;
        let mut completed: Vec<ScanRow> = Vec::with_capacity(targets.len());

        info!(
            "scan start: {} targets from sample ({:.3}, {:.3})",
            targets.len(),
            start_sample.x,
            start_sample.y
        );

        for (index, &target) in targets.iter().enumerate() {
            if let Some(flag) = &self.abort {
                if flag.load(Ordering::Relaxed) {
                    warn!("scan cancelled before target {index}");
                    return Err(ScanError::Cancelled {
                        completed: completed.len(),
                    });
                }
            }

            let target_stage = self.calibration.sample_to_stage(target);
            let target_z = self.calibration.focus_z(target.y);

            let displacement = Vector3::new(
                target_stage.x - prev_stage.x,
                target_stage.y - prev_stage.y,
                target_z - prev_z,
            );

            self.motion
                .move_relative(displacement, self.config.velocity_mm_s, self.config.rounding)
                .map_err(|source| ScanError::Aborted {
                    failed_index: index,
                    completed: completed.len(),
                    source,
                })?;

            if !self.config.settle.is_zero() {
                thread::sleep(self.config.settle);
            }

            let frame = self
                .capture
                .acquire_frame()
                .map_err(|source| ScanError::CaptureFailed {
                    failed_index: index,
                    completed: completed.len(),
                    source,
                })?;
            let image_path = self.config.frame_path(index);
            self.capture
                .save(&frame, &image_path)
                .map_err(|source| ScanError::CaptureFailed {
                    failed_index: index,
                    completed: completed.len(),
                    source,
                })?;

            completed.push(ScanRow {
                index,
                sample: target,
                stage: target_stage,
                z: target_z,
                image_path,
            });
            prev_sample = target;

            match self.config.reanchor {
                ReanchorPolicy::EveryN(n) if n > 0 && (index + 1) % n == 0 => {
                    let measured = self.motion.position().encoder_corrected - encoder_baseline;
                    prev_stage = Vector2::new(start_stage.x + measured.x, start_stage.y + measured.y);
                    prev_z = start_z + measured.z;
                    info!(
                        "re-anchored at target {index}: plan ({:.4}, {:.4}), measured ({:.4}, {:.4})",
                        target_stage.x, target_stage.y, prev_stage.x, prev_stage.y
                    );
                }
                _ => {
                    prev_stage = target_stage;
                    prev_z = target_z;
                }
            }
        }

        info!("scan complete: {} targets captured", completed.len());
        Ok(ScanReport {
            completed,
            final_sample: prev_sample,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationParams, CalibrationPoint, StageReading};
    use approx::assert_relative_eq;
    use hardware::SimulatedCapture;
    use hardware::SimulatedStage;
    use std::time::Duration;

    // translation (10, 20), rotation 0, zoom 1, z0 100 with slope 0.
    fn identity_calibration() -> CalibrationParams {
        let p1 = CalibrationPoint {
            sample: Vector2::new(0.0, 0.0),
            stage: StageReading {
                x: 10.0,
                y: 20.0,
                r: 0.0,
                z: 100.0,
            },
        };
        let p2 = CalibrationPoint {
            sample: Vector2::new(0.0, 10.0),
            stage: StageReading {
                x: 10.0,
                y: 30.0,
                r: 0.0,
                z: 100.0,
            },
        };
        CalibrationParams::from_points(p1, p2, 10.0, false).unwrap()
    }

    fn capture_device() -> SimulatedCapture {
        SimulatedCapture::uniform(4, 4, 128)
    }

    fn fast_config() -> ScanConfig {
        ScanConfig {
            settle: Duration::ZERO,
            output_dir: std::env::temp_dir(),
            file_prefix: "scan_test".to_string(),
            ..ScanConfig::default()
        }
    }

    #[test]
    fn test_displacements_are_between_consecutive_targets() {
        let calibration = identity_calibration();
        let mut motion = MotionController::connect(SimulatedStage::new()).unwrap();
        let mut capture = capture_device();

        let targets = [
            Vector2::new(1.0, 0.0),
            Vector2::new(1.0, 2.0),
            Vector2::new(0.0, 2.0),
        ];
        let report = ScanSequencer::new(&calibration, &mut motion, &mut capture, fast_config())
            .run(Vector2::new(0.0, 0.0), &targets)
            .unwrap();

        assert_eq!(report.completed.len(), 3);
        assert_eq!(report.final_sample, Vector2::new(0.0, 2.0));

        // The net commanded displacement equals target[last] - start in
        // stage coordinates (zoom 1, rotation 0).
        let position = motion.position();
        assert_relative_eq!(position.commanded.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(position.commanded.y, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fail_fast_reports_index_and_completed_count() {
        let calibration = identity_calibration();
        let stage = SimulatedStage::new().with_failure_at_move(1);
        let mut motion = MotionController::connect(stage).unwrap();
        let mut capture = capture_device();

        let targets = [
            Vector2::new(1.0, 0.0),
            Vector2::new(2.0, 0.0),
            Vector2::new(3.0, 0.0),
        ];
        let result = ScanSequencer::new(&calibration, &mut motion, &mut capture, fast_config())
            .run(Vector2::new(0.0, 0.0), &targets);

        match result {
            Err(ScanError::Aborted {
                failed_index,
                completed,
                ..
            }) => {
                assert_eq!(failed_index, 1);
                assert_eq!(completed, 1);
            }
            other => panic!("expected abort, got {other:?}"),
        }
        // The third target was never attempted
        assert_eq!(capture.saved_paths().len(), 1);
    }

    #[test]
    fn test_cancellation_between_targets() {
        let calibration = identity_calibration();
        let mut motion = MotionController::connect(SimulatedStage::new()).unwrap();
        let mut capture = capture_device();
        let flag = Arc::new(AtomicBool::new(true));

        let targets = [Vector2::new(1.0, 0.0)];
        let result = ScanSequencer::new(&calibration, &mut motion, &mut capture, fast_config())
            .with_abort_flag(flag)
            .run(Vector2::new(0.0, 0.0), &targets);

        assert!(matches!(result, Err(ScanError::Cancelled { completed: 0 })));
        assert!(capture.saved_paths().is_empty());
    }

    #[test]
    fn test_reanchor_rebases_plan_onto_measured_position() {
        let calibration = identity_calibration();
        // Every move lands 10 um short of commanded in x.
        let stage = SimulatedStage::new().with_encoder_slip(Vector3::new(-0.01, 0.0, 0.0));
        let mut motion = MotionController::connect(stage).unwrap();
        let mut capture = capture_device();
        let config = ScanConfig {
            reanchor: ReanchorPolicy::EveryN(1),
            ..fast_config()
        };

        let targets = [Vector2::new(1.0, 0.0), Vector2::new(2.0, 0.0)];
        ScanSequencer::new(&calibration, &mut motion, &mut capture, config)
            .run(Vector2::new(0.0, 0.0), &targets)
            .unwrap();

        // Without re-anchoring the second commanded displacement would be
        // 1.0; with it, the 10 um shortfall from move 1 is folded back in.
        let log = motion_log(&motion);
        assert_relative_eq!(log[0].x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(log[1].x, 1.01, epsilon = 1e-12);
    }

    fn motion_log(motion: &MotionController<SimulatedStage>) -> Vec<Vector3<f64>> {
        motion
            .driver_ref()
            .command_log()
            .iter()
            .map(|c| c.displacement_mm)
            .collect()
    }

    #[test]
    fn test_empty_target_list_is_a_noop() {
        let calibration = identity_calibration();
        let mut motion = MotionController::connect(SimulatedStage::new()).unwrap();
        let mut capture = capture_device();

        let report = ScanSequencer::new(&calibration, &mut motion, &mut capture, fast_config())
            .run(Vector2::new(3.0, 4.0), &[])
            .unwrap();
        assert!(report.completed.is_empty());
        assert_eq!(report.final_sample, Vector2::new(3.0, 4.0));
        assert_eq!(motion.position().commanded, Vector3::zeros());
    }
}
