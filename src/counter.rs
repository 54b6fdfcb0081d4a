//! Repetition counting
//!
//! A hysteresis state machine turns a noisy joint-angle signal into discrete
//! repetitions. The limb flips to contracted only once the angle drops below
//! `maintaining - margin` and back to extended only once it rises above
//! `relaxing + margin`; anything in between leaves the state alone.
//!
//! A repetition is counted on the contracted → extended transition, and only if
//! the angle seen on the frame before the flip was already past the raw
//! `relaxing` threshold. The widened band decides *when* the state flips; the
//! raw threshold decides whether the release was a real one.

use serde::{Deserialize, Serialize};

use crate::profile::ExerciseProfile;
use crate::types::ExerciseKind;

/// Thresholds for one exercise kind with the hysteresis margin applied
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub maintaining: f64,
    pub relaxing: f64,
    pub margin: f64,
}

impl Thresholds {
    pub fn new(maintaining: f64, relaxing: f64, margin: f64) -> Self {
        Self {
            maintaining,
            relaxing,
            margin,
        }
    }

    pub fn from_profile(profile: &ExerciseProfile, margin: f64) -> Self {
        Self::new(profile.maintaining, profile.relaxing, margin)
    }

    /// Angles below this enter the contracted state
    pub fn contract_below(&self) -> f64 {
        self.maintaining - self.margin
    }

    /// Angles above this return to the extended state
    pub fn release_above(&self) -> f64 {
        self.relaxing + self.margin
    }
}

/// Counter state for one exercise kind within a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RepCounterState {
    pub is_contracted: bool,
    pub was_contracted_last: bool,
    /// Set when a contraction begins, cleared by the following release
    pub awaiting_release: bool,
    pub previous_angle: Option<f64>,
    pub rep_count: u32,
}

/// Result of feeding one angle into [`RepCounterState::advance`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub state: RepCounterState,
    pub counted: bool,
}

impl RepCounterState {
    /// Apply one evaluated angle and return the next state.
    ///
    /// Non-finite angles leave the state untouched, the same as a skipped frame.
    pub fn advance(self, angle: f64, thresholds: &Thresholds) -> Step {
        if !angle.is_finite() {
            return Step {
                state: self,
                counted: false,
            };
        }

        let mut next = self;

        if angle < thresholds.contract_below() {
            next.is_contracted = true;
        } else if angle > thresholds.release_above() {
            next.is_contracted = false;
        }

        let mut counted = false;
        if next.is_contracted != next.was_contracted_last {
            if next.is_contracted {
                next.awaiting_release = true;
            } else if next.awaiting_release {
                if next
                    .previous_angle
                    .is_some_and(|prev| prev > thresholds.relaxing)
                {
                    next.rep_count = next.rep_count.saturating_add(1);
                    counted = true;
                }
                next.awaiting_release = false;
            }
            next.was_contracted_last = next.is_contracted;
        }

        next.previous_angle = Some(angle);

        Step {
            state: next,
            counted,
        }
    }
}

/// Rep counter for a single exercise kind
#[derive(Debug, Clone)]
pub struct RepCounter {
    kind: ExerciseKind,
    thresholds: Thresholds,
    state: RepCounterState,
}

impl RepCounter {
    pub fn new(profile: &ExerciseProfile, margin: f64) -> Self {
        Self::with_thresholds(profile.kind, Thresholds::from_profile(profile, margin))
    }

    pub fn with_thresholds(kind: ExerciseKind, thresholds: Thresholds) -> Self {
        Self {
            kind,
            thresholds,
            state: RepCounterState::default(),
        }
    }

    /// Feed one angle; returns the new count when a repetition completes
    pub fn observe(&mut self, angle: f64) -> Option<u32> {
        let step = self.state.advance(angle, &self.thresholds);
        self.state = step.state;
        step.counted.then_some(self.state.rep_count)
    }

    pub fn kind(&self) -> ExerciseKind {
        self.kind
    }

    pub fn count(&self) -> u32 {
        self.state.rep_count
    }

    pub fn state(&self) -> &RepCounterState {
        &self.state
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }
}
