//! Joint angle geometry
//!
//! Converts three 2D keypoints into a bend angle, and a profile's left/right
//! limb triples into one averaged angle signal.

use crate::profile::{ExerciseProfile, LimbTriple};
use crate::types::{Frame, Keypoint};

/// Angle in degrees (0-180) between the rays vertex→near and vertex→far
pub fn bend_angle(vertex: &Keypoint, near: &Keypoint, far: &Keypoint) -> f64 {
    let near_heading = (near.y - vertex.y).atan2(near.x - vertex.x);
    let far_heading = (far.y - vertex.y).atan2(far.x - vertex.x);

    let diff = (far_heading - near_heading).to_degrees().abs();
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Bend angle for one side, or `None` if any of its keypoints is undetected
fn side_angle(triple: &LimbTriple, frame: &Frame, min_confidence: f64) -> Option<f64> {
    let near = frame.detected(triple.near, min_confidence)?;
    let vertex = frame.detected(triple.vertex, min_confidence)?;
    let far = frame.detected(triple.far, min_confidence)?;
    Some(bend_angle(&vertex, &near, &far))
}

/// Mean of the left and right bend angles defined by `profile`.
///
/// Returns `None` when any of the six keypoints is missing; callers skip the
/// frame rather than feed a degenerate value into the counter.
pub fn limb_angle(profile: &ExerciseProfile, frame: &Frame, min_confidence: f64) -> Option<f64> {
    let left = side_angle(&profile.left, frame, min_confidence)?;
    let right = side_angle(&profile.right, frame, min_confidence)?;
    Some((left + right) / 2.0)
}
