//! Counter configuration
//!
//! Hysteresis margin, keypoint confidence cutoff, exercise profiles, and daily
//! goals. Persisted as JSON alongside the ledger.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::RepError;
use crate::profile::ExerciseProfile;
use crate::types::{DailyGoals, ExerciseKind};

/// Hysteresis margin tuned for live camera input (degrees)
pub const LIVE_CAMERA_MARGIN: f64 = 48.7;

/// Hysteresis margin tuned for recorded video (degrees)
pub const RECORDED_VIDEO_MARGIN: f64 = 40.0;

/// Default minimum keypoint confidence
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

fn default_margin() -> f64 {
    LIVE_CAMERA_MARGIN
}

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_CONFIDENCE
}

fn default_profiles() -> Vec<ExerciseProfile> {
    ExerciseProfile::defaults()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterConfig {
    /// Dead-zone width applied around both thresholds (degrees)
    #[serde(default = "default_margin")]
    pub hysteresis_margin: f64,
    /// Keypoints reported below this confidence are treated as undetected
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_profiles")]
    pub profiles: Vec<ExerciseProfile>,
    #[serde(default)]
    pub goals: DailyGoals,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            hysteresis_margin: LIVE_CAMERA_MARGIN,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            profiles: ExerciseProfile::defaults(),
            goals: DailyGoals::new(),
        }
    }
}

impl CounterConfig {
    /// Defaults with the margin tuned for recorded video
    pub fn recorded_video() -> Self {
        Self {
            hysteresis_margin: RECORDED_VIDEO_MARGIN,
            ..Self::default()
        }
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.hysteresis_margin = margin;
        self
    }

    pub fn profile(&self, kind: ExerciseKind) -> Option<&ExerciseProfile> {
        self.profiles.iter().find(|p| p.kind == kind)
    }

    pub fn goal(&self, kind: ExerciseKind) -> Option<u32> {
        self.goals.get(&kind).copied()
    }

    /// Validate every profile and the shared parameters
    pub fn validate(&self) -> Result<(), RepError> {
        if !self.hysteresis_margin.is_finite() || self.hysteresis_margin < 0.0 {
            return Err(RepError::InvalidProfile(format!(
                "hysteresis margin {} must be a non-negative number of degrees",
                self.hysteresis_margin
            )));
        }

        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(RepError::InvalidProfile(format!(
                "min_confidence {} must be within 0-1",
                self.min_confidence
            )));
        }

        let mut seen = HashSet::new();
        for profile in &self.profiles {
            profile.validate()?;
            if !seen.insert(profile.kind) {
                return Err(RepError::InvalidProfile(format!(
                    "duplicate profile for {}",
                    profile.kind
                )));
            }
        }

        Ok(())
    }

    /// Load and validate a config from JSON
    pub fn from_json(json: &str) -> Result<Self, RepError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
