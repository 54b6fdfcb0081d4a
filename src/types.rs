//! Core types for the repcount pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: per-frame keypoints, exercise kinds, rep events, and daily totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::RepError;

/// Number of keypoints in the COCO body layout produced by the pose estimator
pub const KEYPOINT_COUNT: usize = 17;

/// Exercise kinds that can be tracked.
///
/// Declaration order is the fixed field order of ledger lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    PushUp,
    Squat,
    SitUp,
}

impl ExerciseKind {
    /// Every kind, in ledger order
    pub const ALL: [ExerciseKind; 3] = [
        ExerciseKind::PushUp,
        ExerciseKind::Squat,
        ExerciseKind::SitUp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExerciseKind::PushUp => "push_up",
            ExerciseKind::Squat => "squat",
            ExerciseKind::SitUp => "sit_up",
        }
    }

    /// Plural label used in ledger lines ("5 push-ups")
    pub fn ledger_label(&self) -> &'static str {
        match self {
            ExerciseKind::PushUp => "push-ups",
            ExerciseKind::Squat => "squats",
            ExerciseKind::SitUp => "sit-ups",
        }
    }

    pub fn from_ledger_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.ledger_label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExerciseKind {
    type Err = RepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "push_up" | "push_ups" | "pushup" | "pushups" => Ok(ExerciseKind::PushUp),
            "squat" | "squats" => Ok(ExerciseKind::Squat),
            "sit_up" | "sit_ups" | "situp" | "situps" => Ok(ExerciseKind::SitUp),
            _ => Err(RepError::UnknownExercise(s.to_string())),
        }
    }
}

/// COCO keypoint indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A single 2D keypoint reported by the pose estimator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    /// Detection confidence (0-1), when the estimator reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Keypoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            confidence: None,
        }
    }

    /// Whether this keypoint can be used for geometry.
    ///
    /// A keypoint without a reported confidence counts as detected.
    pub fn is_detected(&self, min_confidence: f64) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.confidence.map_or(true, |c| c >= min_confidence)
    }
}

/// One video frame's worth of keypoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frame {
    /// Capture time, if the producer stamps frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Keypoints in COCO order; `null` marks an undetected joint
    #[serde(default)]
    pub keypoints: Vec<Option<Keypoint>>,
}

impl Frame {
    pub fn new(keypoints: Vec<Option<Keypoint>>) -> Self {
        Self {
            timestamp: None,
            keypoints,
        }
    }

    /// Look up a detected keypoint; out-of-range or undetected slots yield `None`
    pub fn detected(&self, index: usize, min_confidence: f64) -> Option<Keypoint> {
        self.keypoints
            .get(index)
            .copied()
            .flatten()
            .filter(|kp| kp.is_detected(min_confidence))
    }
}

/// Pre-computed angles for one frame, keyed by exercise kind.
///
/// `None` (or an absent key) means the angle could not be computed for that frame.
pub type AngleSample = HashMap<ExerciseKind, Option<f64>>;

/// Emitted whenever a tracked exercise completes a repetition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepEvent {
    pub kind: ExerciseKind,
    /// Repetitions counted in this session
    pub session_count: u32,
    /// Today's prior total plus the session count
    pub displayed_total: u32,
}

/// Per-kind totals; produced with every kind present
pub type DailyTotals = BTreeMap<ExerciseKind, u32>;

/// A totals map with every exercise kind set to zero
pub fn zero_totals() -> DailyTotals {
    ExerciseKind::ALL.into_iter().map(|kind| (kind, 0)).collect()
}

/// Optional per-kind daily targets
pub type DailyGoals = BTreeMap<ExerciseKind, u32>;

/// Running totals for one exercise kind within a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTotals {
    /// Sum of counts already recorded today when the session started
    pub prior_total: u32,
    /// Repetitions counted in this session
    pub session_count: u32,
}

impl SessionTotals {
    pub fn displayed_total(&self) -> u32 {
        self.prior_total.saturating_add(self.session_count)
    }
}

/// Progress of one kind against its daily goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalProgress {
    pub kind: ExerciseKind,
    pub displayed_total: u32,
    pub goal: Option<u32>,
}

impl GoalProgress {
    /// Repetitions still needed to hit the goal (zero once reached)
    pub fn remaining(&self) -> Option<u32> {
        self.goal.map(|g| g.saturating_sub(self.displayed_total))
    }

    pub fn is_met(&self) -> bool {
        self.remaining() == Some(0)
    }
}
