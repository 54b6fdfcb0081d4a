//! Exercise profiles
//!
//! A profile names the three keypoints on each side of the body that form the
//! bend angle for an exercise, plus the `maintaining` (contracted) and `relaxing`
//! (extended) angle thresholds that drive the rep counter.

use serde::{Deserialize, Serialize};

use crate::error::RepError;
use crate::types::{ExerciseKind, KeypointIndex, KEYPOINT_COUNT};

/// Three keypoints forming a bend angle; the angle is measured at `vertex`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimbTriple {
    pub near: usize,
    pub vertex: usize,
    pub far: usize,
}

impl LimbTriple {
    pub const fn new(near: KeypointIndex, vertex: KeypointIndex, far: KeypointIndex) -> Self {
        Self {
            near: near as usize,
            vertex: vertex as usize,
            far: far as usize,
        }
    }

    fn indices(&self) -> [usize; 3] {
        [self.near, self.vertex, self.far]
    }
}

/// Static configuration for one exercise kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseProfile {
    pub kind: ExerciseKind,
    pub left: LimbTriple,
    pub right: LimbTriple,
    /// Angle (degrees) at the fully contracted position
    pub maintaining: f64,
    /// Angle (degrees) at the fully extended position
    pub relaxing: f64,
}

impl ExerciseProfile {
    /// Elbow angle: shoulder-elbow-wrist
    pub fn push_up() -> Self {
        use KeypointIndex::*;
        Self {
            kind: ExerciseKind::PushUp,
            left: LimbTriple::new(LeftShoulder, LeftElbow, LeftWrist),
            right: LimbTriple::new(RightShoulder, RightElbow, RightWrist),
            maintaining: 140.0,
            relaxing: 120.0,
        }
    }

    /// Knee angle: hip-knee-ankle
    pub fn squat() -> Self {
        use KeypointIndex::*;
        Self {
            kind: ExerciseKind::Squat,
            left: LimbTriple::new(LeftHip, LeftKnee, LeftAnkle),
            right: LimbTriple::new(RightHip, RightKnee, RightAnkle),
            maintaining: 150.0,
            relaxing: 120.0,
        }
    }

    /// Hip angle: shoulder-hip-knee
    pub fn sit_up() -> Self {
        use KeypointIndex::*;
        Self {
            kind: ExerciseKind::SitUp,
            left: LimbTriple::new(LeftShoulder, LeftHip, LeftKnee),
            right: LimbTriple::new(RightShoulder, RightHip, RightKnee),
            maintaining: 120.0,
            relaxing: 100.0,
        }
    }

    /// Built-in profile for a kind
    pub fn for_kind(kind: ExerciseKind) -> Self {
        match kind {
            ExerciseKind::PushUp => Self::push_up(),
            ExerciseKind::Squat => Self::squat(),
            ExerciseKind::SitUp => Self::sit_up(),
        }
    }

    /// Built-in profiles for every kind
    pub fn defaults() -> Vec<Self> {
        ExerciseKind::ALL.into_iter().map(Self::for_kind).collect()
    }

    /// Check keypoint indices and thresholds.
    ///
    /// The relative order of `maintaining` and `relaxing` is not checked; the
    /// tuned reference profiles place `maintaining` above `relaxing`.
    pub fn validate(&self) -> Result<(), RepError> {
        for (side, triple) in [("left", &self.left), ("right", &self.right)] {
            if let Some(bad) = triple.indices().into_iter().find(|&i| i >= KEYPOINT_COUNT) {
                return Err(RepError::InvalidProfile(format!(
                    "{} {} keypoint index {} is outside the {}-point layout",
                    self.kind, side, bad, KEYPOINT_COUNT
                )));
            }
            let [near, vertex, far] = triple.indices();
            if near == vertex || far == vertex {
                return Err(RepError::InvalidProfile(format!(
                    "{} {} vertex {} must differ from its adjacent keypoints",
                    self.kind, side, vertex
                )));
            }
        }

        for (name, value) in [("maintaining", self.maintaining), ("relaxing", self.relaxing)] {
            if !value.is_finite() || !(0.0..=180.0).contains(&value) {
                return Err(RepError::InvalidProfile(format!(
                    "{} {} threshold {} must be within 0-180 degrees",
                    self.kind, name, value
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profiles_are_valid() {
        for profile in ExerciseProfile::defaults() {
            assert!(profile.validate().is_ok(), "{:?}", profile.kind);
        }
    }

    #[test]
    fn test_out_of_range_keypoint_rejected() {
        let mut profile = ExerciseProfile::push_up();
        profile.right.far = 17;

        let err = profile.validate().unwrap_err();
        assert!(matches!(err, RepError::InvalidProfile(_)));
        assert!(err.to_string().contains("17"));
    }

    #[test]
    fn test_degenerate_triple_rejected() {
        let mut profile = ExerciseProfile::squat();
        profile.left.near = profile.left.vertex;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_non_finite_threshold_rejected() {
        let mut profile = ExerciseProfile::sit_up();
        profile.relaxing = f64::NAN;
        assert!(profile.validate().is_err());

        profile.relaxing = 200.0;
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_profile_json_shape() {
        let json = serde_json::to_value(ExerciseProfile::push_up()).unwrap();
        assert_eq!(json["kind"], "push_up");
        assert_eq!(json["left"]["vertex"], 7);
        assert_eq!(json["right"]["far"], 10);
    }
}
