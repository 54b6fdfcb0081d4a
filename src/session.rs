//! Exercise sessions
//!
//! A session owns one [`RepCounter`] per tracked exercise, carries the totals
//! already recorded today, and turns into a [`LedgerRecord`] when it ends.

use chrono::{Local, NaiveDateTime};
use log::info;
use std::collections::BTreeMap;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::CounterConfig;
use crate::counter::RepCounter;
use crate::error::RepError;
use crate::geometry::limb_angle;
use crate::ledger::LedgerRecord;
use crate::profile::ExerciseProfile;
use crate::types::{
    AngleSample, DailyTotals, ExerciseKind, Frame, GoalProgress, RepEvent, SessionTotals,
};

/// Receives a call for every completed repetition.
///
/// Implementations must not block and cannot fail the count; any delivery
/// error stays inside the notifier.
pub trait RepNotifier: Send {
    fn notify(&self, event: &RepEvent);
}

/// Discards events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl RepNotifier for NoopNotifier {
    fn notify(&self, _event: &RepEvent) {}
}

/// Logs each event at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl RepNotifier for LogNotifier {
    fn notify(&self, event: &RepEvent) {
        info!(
            "{} rep {} (today: {})",
            event.kind, event.session_count, event.displayed_total
        );
    }
}

/// Forwards events to another thread; a hung-up receiver is ignored
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: Sender<RepEvent>,
}

impl ChannelNotifier {
    pub fn new(sender: Sender<RepEvent>) -> Self {
        Self { sender }
    }
}

impl RepNotifier for ChannelNotifier {
    fn notify(&self, event: &RepEvent) {
        let _ = self.sender.send(*event);
    }
}

struct TrackedExercise {
    profile: ExerciseProfile,
    counter: RepCounter,
    prior_total: u32,
    goal: Option<u32>,
}

impl TrackedExercise {
    fn totals(&self) -> SessionTotals {
        SessionTotals {
            prior_total: self.prior_total,
            session_count: self.counter.count(),
        }
    }
}

/// Counting session over one or more exercise kinds
pub struct ExerciseSession {
    tracked: BTreeMap<ExerciseKind, TrackedExercise>,
    min_confidence: f64,
    notifier: Box<dyn RepNotifier>,
}

impl ExerciseSession {
    /// Start a session for `tracked` kinds on top of today's `prior_totals`.
    ///
    /// Fails if the config is invalid or a tracked kind has no profile.
    pub fn start(
        config: &CounterConfig,
        tracked: &[ExerciseKind],
        prior_totals: &DailyTotals,
    ) -> Result<Self, RepError> {
        config.validate()?;

        let mut exercises = BTreeMap::new();
        for &kind in tracked {
            let profile = config
                .profile(kind)
                .ok_or_else(|| RepError::UntrackedProfile(kind.to_string()))?;

            exercises.insert(
                kind,
                TrackedExercise {
                    counter: RepCounter::new(profile, config.hysteresis_margin),
                    profile: profile.clone(),
                    prior_total: prior_totals.get(&kind).copied().unwrap_or(0),
                    goal: config.goal(kind),
                },
            );
        }

        Ok(Self {
            tracked: exercises,
            min_confidence: config.min_confidence,
            notifier: Box::new(NoopNotifier),
        })
    }

    pub fn with_notifier(mut self, notifier: impl RepNotifier + 'static) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn tracked_kinds(&self) -> Vec<ExerciseKind> {
        self.tracked.keys().copied().collect()
    }

    /// Feed one angle for `kind`; returns an event only when a rep completes.
    ///
    /// Angles for kinds that are not tracked are ignored.
    pub fn observe(&mut self, kind: ExerciseKind, angle: f64) -> Option<RepEvent> {
        let exercise = self.tracked.get_mut(&kind)?;
        let session_count = exercise.counter.observe(angle)?;

        let event = RepEvent {
            kind,
            session_count,
            displayed_total: exercise.prior_total.saturating_add(session_count),
        };
        self.notifier.notify(&event);
        Some(event)
    }

    /// Compute each tracked kind's angle from `frame` and feed it.
    ///
    /// Kinds whose keypoints are undetected in this frame are skipped.
    pub fn observe_frame(&mut self, frame: &Frame) -> Vec<RepEvent> {
        let angles: Vec<(ExerciseKind, f64)> = self
            .tracked
            .iter()
            .filter_map(|(kind, exercise)| {
                limb_angle(&exercise.profile, frame, self.min_confidence).map(|a| (*kind, a))
            })
            .collect();

        angles
            .into_iter()
            .filter_map(|(kind, angle)| self.observe(kind, angle))
            .collect()
    }

    /// Feed a frame of pre-computed angles; `None` entries are skipped
    pub fn observe_angles(&mut self, sample: &AngleSample) -> Vec<RepEvent> {
        ExerciseKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let angle = sample.get(&kind).copied().flatten()?;
                self.observe(kind, angle)
            })
            .collect()
    }

    pub fn totals(&self, kind: ExerciseKind) -> Option<SessionTotals> {
        self.tracked.get(&kind).map(TrackedExercise::totals)
    }

    /// Displayed total (prior + session) for every tracked kind
    pub fn snapshot(&self) -> BTreeMap<ExerciseKind, u32> {
        self.tracked
            .iter()
            .map(|(kind, exercise)| (*kind, exercise.totals().displayed_total()))
            .collect()
    }

    pub fn progress(&self) -> Vec<GoalProgress> {
        self.tracked
            .iter()
            .map(|(kind, exercise)| GoalProgress {
                kind: *kind,
                displayed_total: exercise.totals().displayed_total(),
                goal: exercise.goal,
            })
            .collect()
    }

    /// End the session, stamped with the local wall clock
    pub fn finish(self) -> LedgerRecord {
        self.finish_at(Local::now().naive_local())
    }

    /// End the session; the record holds session-local counts, not displayed totals
    pub fn finish_at(self, timestamp: NaiveDateTime) -> LedgerRecord {
        let counts = self
            .tracked
            .iter()
            .map(|(kind, exercise)| (*kind, exercise.counter.count()))
            .collect();
        LedgerRecord::new(timestamp, counts)
    }
}

/// A session shared between a capture thread and a display thread.
///
/// Each call takes the lock once, so a frame's counter updates are never
/// interleaved with a snapshot. `finish` hands the record out exactly once.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<Option<ExerciseSession>>>,
}

impl SharedSession {
    pub fn new(session: ExerciseSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(session))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ExerciseSession>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `None` once the session has finished
    pub fn observe(&self, kind: ExerciseKind, angle: f64) -> Option<RepEvent> {
        self.lock().as_mut()?.observe(kind, angle)
    }

    pub fn observe_frame(&self, frame: &Frame) -> Vec<RepEvent> {
        self.lock()
            .as_mut()
            .map(|session| session.observe_frame(frame))
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> Option<BTreeMap<ExerciseKind, u32>> {
        self.lock().as_ref().map(ExerciseSession::snapshot)
    }

    pub fn is_finished(&self) -> bool {
        self.lock().is_none()
    }

    pub fn finish(&self) -> Option<LedgerRecord> {
        self.lock().take().map(ExerciseSession::finish)
    }

    pub fn finish_at(&self, timestamp: NaiveDateTime) -> Option<LedgerRecord> {
        self.lock().take().map(|session| session.finish_at(timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{zero_totals, Keypoint, KeypointIndex, KEYPOINT_COUNT};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::sync::mpsc;
    use std::thread;

    /// Config with the reference thresholds: contract below 130, release above 130
    fn reference_config() -> CounterConfig {
        let mut config = CounterConfig::default().with_margin(10.0);
        for profile in &mut config.profiles {
            profile.maintaining = 140.0;
            profile.relaxing = 120.0;
        }
        config
    }

    fn rep(session: &mut ExerciseSession, kind: ExerciseKind) -> Option<RepEvent> {
        let mut last = None;
        for angle in [150.0, 100.0, 125.0, 150.0] {
            last = session.observe(kind, angle);
        }
        last
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_event_carries_prior_and_session_counts() {
        let mut prior = zero_totals();
        prior.insert(ExerciseKind::PushUp, 20);

        let mut session =
            ExerciseSession::start(&reference_config(), &[ExerciseKind::PushUp], &prior).unwrap();

        let event = rep(&mut session, ExerciseKind::PushUp).unwrap();
        assert_eq!(
            event,
            RepEvent {
                kind: ExerciseKind::PushUp,
                session_count: 1,
                displayed_total: 21,
            }
        );
        assert_eq!(session.snapshot()[&ExerciseKind::PushUp], 21);
    }

    #[test]
    fn test_finish_records_session_counts_not_displayed_totals() {
        let mut prior = zero_totals();
        prior.insert(ExerciseKind::Squat, 30);

        let mut session = ExerciseSession::start(
            &reference_config(),
            &[ExerciseKind::PushUp, ExerciseKind::Squat],
            &prior,
        )
        .unwrap();
        rep(&mut session, ExerciseKind::Squat);
        rep(&mut session, ExerciseKind::Squat);

        let record = session.finish_at(noon());
        assert_eq!(record.timestamp, noon());
        assert_eq!(record.count(ExerciseKind::Squat), 2);
        assert_eq!(record.count(ExerciseKind::PushUp), 0);
        assert_eq!(record.counts.len(), 2);
        assert!(!record.counts.contains_key(&ExerciseKind::SitUp));
    }

    #[test]
    fn test_interleaved_streams_do_not_cross_contaminate() {
        let mut session = ExerciseSession::start(
            &reference_config(),
            &[ExerciseKind::PushUp, ExerciseKind::Squat],
            &zero_totals(),
        )
        .unwrap();

        // Push-ups cycle fully while squats only hover in contraction
        let push_ups = [150.0, 100.0, 125.0, 150.0, 100.0, 125.0, 150.0];
        let squats = [150.0, 100.0, 110.0, 100.0, 125.0, 105.0, 100.0];

        let mut events = Vec::new();
        for (p, s) in push_ups.iter().zip(squats.iter()) {
            events.extend(session.observe(ExerciseKind::PushUp, *p));
            events.extend(session.observe(ExerciseKind::Squat, *s));
        }

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == ExerciseKind::PushUp));
        assert_eq!(session.totals(ExerciseKind::PushUp).unwrap().session_count, 2);
        assert_eq!(session.totals(ExerciseKind::Squat).unwrap().session_count, 0);
    }

    #[test]
    fn test_untracked_kind_is_ignored() {
        let mut session =
            ExerciseSession::start(&reference_config(), &[ExerciseKind::PushUp], &zero_totals())
                .unwrap();

        assert_eq!(rep(&mut session, ExerciseKind::SitUp), None);
        assert!(session.totals(ExerciseKind::SitUp).is_none());
        assert!(!session.snapshot().contains_key(&ExerciseKind::SitUp));
    }

    #[test]
    fn test_missing_profile_fails_start() {
        let mut config = reference_config();
        config.profiles.retain(|p| p.kind != ExerciseKind::SitUp);

        let err = ExerciseSession::start(&config, &[ExerciseKind::SitUp], &zero_totals())
            .err()
            .unwrap();
        assert!(matches!(err, RepError::UntrackedProfile(_)));
    }

    #[test]
    fn test_invalid_config_fails_start() {
        let mut config = reference_config();
        config.profiles[0].left.far = 99;

        let result = ExerciseSession::start(&config, &[ExerciseKind::PushUp], &zero_totals());
        assert!(matches!(result, Err(RepError::InvalidProfile(_))));
    }

    #[test]
    fn test_displayed_total_is_monotonic() {
        let mut prior = zero_totals();
        prior.insert(ExerciseKind::PushUp, 3);
        let mut session =
            ExerciseSession::start(&reference_config(), &[ExerciseKind::PushUp], &prior).unwrap();

        let mut last = session.snapshot()[&ExerciseKind::PushUp];
        for angle in [150.0, 90.0, 140.0, 125.0, 160.0, 100.0, 131.0, 129.0, 170.0, 95.0] {
            session.observe(ExerciseKind::PushUp, angle);
            let now = session.snapshot()[&ExerciseKind::PushUp];
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_notifier_called_once_per_rep() {
        let (tx, rx) = mpsc::channel();
        let mut session =
            ExerciseSession::start(&reference_config(), &[ExerciseKind::Squat], &zero_totals())
                .unwrap()
                .with_notifier(ChannelNotifier::new(tx));

        rep(&mut session, ExerciseKind::Squat);
        rep(&mut session, ExerciseKind::Squat);

        let received: Vec<RepEvent> = rx.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert_eq!(received[1].session_count, 2);
    }

    #[test]
    fn test_dropped_receiver_does_not_lose_counts() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut session =
            ExerciseSession::start(&reference_config(), &[ExerciseKind::Squat], &zero_totals())
                .unwrap()
                .with_notifier(ChannelNotifier::new(tx));

        assert!(rep(&mut session, ExerciseKind::Squat).is_some());
        assert_eq!(session.totals(ExerciseKind::Squat).unwrap().session_count, 1);
    }

    #[test]
    fn test_goal_progress() {
        let mut config = reference_config();
        config.goals.insert(ExerciseKind::PushUp, 2);
        let mut prior = zero_totals();
        prior.insert(ExerciseKind::PushUp, 1);

        let mut session =
            ExerciseSession::start(&config, &[ExerciseKind::PushUp, ExerciseKind::Squat], &prior)
                .unwrap();
        assert_eq!(session.progress()[0].remaining(), Some(1));

        rep(&mut session, ExerciseKind::PushUp);
        let progress = session.progress();
        assert!(progress[0].is_met());
        assert_eq!(progress[1].goal, None);
    }

    fn arm_frame(elbow_angle_deg: f64) -> Frame {
        let mut keypoints = vec![None; KEYPOINT_COUNT];
        let rad = elbow_angle_deg.to_radians();
        for (shoulder, elbow, wrist, x0) in [
            (
                KeypointIndex::LeftShoulder,
                KeypointIndex::LeftElbow,
                KeypointIndex::LeftWrist,
                0.0,
            ),
            (
                KeypointIndex::RightShoulder,
                KeypointIndex::RightElbow,
                KeypointIndex::RightWrist,
                10.0,
            ),
        ] {
            keypoints[shoulder.index()] = Some(Keypoint::new(x0 + 1.0, 0.0));
            keypoints[elbow.index()] = Some(Keypoint::new(x0, 0.0));
            keypoints[wrist.index()] = Some(Keypoint::new(x0 + rad.cos(), rad.sin()));
        }
        Frame::new(keypoints)
    }

    #[test]
    fn test_observe_frame_counts_from_keypoints() {
        let mut session = ExerciseSession::start(
            &reference_config(),
            &[ExerciseKind::PushUp, ExerciseKind::Squat],
            &zero_totals(),
        )
        .unwrap();

        let mut events = Vec::new();
        for angle in [150.0, 100.0, 125.0, 150.0] {
            events.extend(session.observe_frame(&arm_frame(angle)));
        }

        // Only the arms are visible, so squats never receive an angle
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ExerciseKind::PushUp);
        assert_eq!(session.totals(ExerciseKind::Squat).unwrap().session_count, 0);
    }

    #[test]
    fn test_frame_with_missing_keypoints_leaves_state_untouched() {
        let mut session =
            ExerciseSession::start(&reference_config(), &[ExerciseKind::PushUp], &zero_totals())
                .unwrap();

        session.observe_frame(&arm_frame(150.0));
        session.observe_frame(&arm_frame(100.0));
        session.observe_frame(&Frame::default());
        session.observe_frame(&arm_frame(125.0));
        let events = session.observe_frame(&arm_frame(150.0));

        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_shared_session_across_threads() {
        let session =
            ExerciseSession::start(&reference_config(), &[ExerciseKind::PushUp], &zero_totals())
                .unwrap();
        let shared = SharedSession::new(session);

        let capture = shared.clone();
        let handle = thread::spawn(move || {
            let mut events = 0;
            for _ in 0..5 {
                for angle in [150.0, 100.0, 125.0, 150.0] {
                    if capture.observe(ExerciseKind::PushUp, angle).is_some() {
                        events += 1;
                    }
                }
            }
            events
        });

        // Snapshots taken mid-stream never go backwards
        let mut last = 0;
        for _ in 0..50 {
            if let Some(snapshot) = shared.snapshot() {
                let now = snapshot[&ExerciseKind::PushUp];
                assert!(now >= last);
                last = now;
            }
        }

        assert_eq!(handle.join().unwrap(), 5);
        assert_eq!(shared.snapshot().unwrap()[&ExerciseKind::PushUp], 5);
    }

    #[test]
    fn test_shared_session_finishes_once() {
        let session =
            ExerciseSession::start(&reference_config(), &[ExerciseKind::Squat], &zero_totals())
                .unwrap();
        let shared = SharedSession::new(session);
        shared.observe(ExerciseKind::Squat, 150.0);

        let record = shared.finish_at(noon()).unwrap();
        assert_eq!(record.count(ExerciseKind::Squat), 0);

        assert!(shared.is_finished());
        assert!(shared.finish().is_none());
        assert!(shared.snapshot().is_none());
        assert_eq!(shared.observe(ExerciseKind::Squat, 100.0), None);
        assert!(shared.observe_frame(&Frame::default()).is_empty());
    }
}
