//! Transform engine between the sample frame and the stage frame.
//!
//! The sample frame (u, v) is the logical coordinate system of the device
//! layout; the stage frame (x, y) is the physical coordinate system of the
//! stage in millimetres. The mapping is a uniform scale, a rotation, and a
//! translation, derived from two reference point correspondences, plus a
//! one-dimensional linear model of stage height (focus) versus v.
//!
//! All functions here are pure. The rotation matrix is applied as
//! `[[cos, sin], [-sin, cos]]`, which is the negated-sine mirror of the
//! textbook counter-clockwise matrix; the derivation helpers below were
//! solved against this convention, so it must not be "corrected" in
//! isolation.

use nalgebra::Vector2;

use crate::error::CalibrationError;

/// Rotate a point around the origin by an angle in degrees.
pub fn rotate(point: Vector2<f64>, angle_deg: f64) -> Vector2<f64> {
    let rad = angle_deg.to_radians();
    let (sin, cos) = rad.sin_cos();
    Vector2::new(cos * point.x + sin * point.y, -sin * point.x + cos * point.y)
}

/// Translate a point by an offset.
pub fn translate(point: Vector2<f64>, offset: Vector2<f64>) -> Vector2<f64> {
    point + offset
}

/// Scale a point relative to the origin by a uniform factor.
pub fn scale(point: Vector2<f64>, factor: f64) -> Vector2<f64> {
    point * factor
}

/// Convert a sample-frame point (u, v) to stage-frame coordinates (x, y).
///
/// Applies scale by `zoom`, then rotation by `-angle_deg`, then translation.
/// The order is fixed; [`stage_to_sample`] undoes it step for step.
pub fn sample_to_stage(
    point: Vector2<f64>,
    translation: Vector2<f64>,
    angle_deg: f64,
    zoom: f64,
) -> Vector2<f64> {
    let p = scale(point, zoom);
    let p = rotate(p, -angle_deg);
    translate(p, translation)
}

/// Convert a stage-frame point (x, y) back to sample-frame coordinates (u, v).
///
/// Exact inverse of [`sample_to_stage`] for any `zoom != 0`.
pub fn stage_to_sample(
    point: Vector2<f64>,
    translation: Vector2<f64>,
    angle_deg: f64,
    zoom: f64,
) -> Vector2<f64> {
    let p = translate(point, -translation);
    let p = scale(p, 1.0 / zoom);
    rotate(p, angle_deg)
}

/// Stage height (focus) for a sample-frame v coordinate: `z0 + v * slope`.
pub fn focus_z(v: f64, z0: f64, slope: f64) -> f64 {
    z0 + v * slope
}

/// Derive the translation that maps a sample-frame point onto a stage-frame
/// point.
///
/// Exact when the reference sample point is the frame origin, which is how
/// the two-point calibration uses it (P1 at sample (0, 0)).
pub fn derive_translation(stage_point: Vector2<f64>, sample_point: Vector2<f64>) -> Vector2<f64> {
    stage_point - sample_point
}

/// Derive the stage rotation angle in degrees from two stage-frame points.
///
/// Computed as `-atan(dx/dy)`. When the two points share a y coordinate the
/// result is 0 rather than an error: a fallback specific to this fixture
/// geometry (reference points are picked along a stage column), not a general
/// arctangent. For stage axes aligned differently than assumed this silently
/// yields a wrong calibration.
pub fn derive_angle(stage_p1: Vector2<f64>, stage_p2: Vector2<f64>) -> f64 {
    let dy = stage_p2.y - stage_p1.y;
    if dy == 0.0 {
        return 0.0;
    }
    let dx = stage_p2.x - stage_p1.x;
    -(dx / dy).atan().to_degrees()
}

/// Derive the zoom factor from two stage-frame points and the known
/// sample-frame distance between them.
///
/// The factor is the ratio of the Euclidean stage distance to the sample
/// distance, negated when `inverted` is true (the sign encodes a mirrored
/// stage axis).
pub fn derive_zoom(
    stage_p1: Vector2<f64>,
    stage_p2: Vector2<f64>,
    sample_distance: f64,
    inverted: bool,
) -> Result<f64, CalibrationError> {
    if sample_distance == 0.0 {
        return Err(CalibrationError::Degenerate(
            "sample distance between reference points is zero".to_string(),
        ));
    }
    let stage_distance = (stage_p1 - stage_p2).norm();
    let zoom = stage_distance / sample_distance;
    Ok(if inverted { -zoom } else { zoom })
}
