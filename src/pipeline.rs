//! Pipeline orchestration
//!
//! This module provides the public API for repcount. It wires the stages
//! together: input parsing → geometry → rep counters → session → ledger.

use chrono::{Local, NaiveDate, NaiveDateTime};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, BufRead};

use crate::config::CounterConfig;
use crate::error::RepError;
use crate::ledger::{DailyLedger, LedgerRecord};
use crate::session::{ExerciseSession, RepNotifier};
use crate::types::{AngleSample, DailyTotals, ExerciseKind, Frame, RepEvent};

/// Parser for newline-delimited frame and angle streams
pub struct FrameParser;

impl FrameParser {
    /// Parse NDJSON where each line is a [`Frame`]
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<Frame>, RepError> {
        parse_lines(ndjson)
    }

    /// Parse NDJSON where each line maps exercise kinds to angles,
    /// e.g. `{"push_up": 95.0, "squat": null}`
    pub fn parse_angle_ndjson(ndjson: &str) -> Result<Vec<AngleSample>, RepError> {
        parse_lines(ndjson)
    }
}

fn parse_lines<T: DeserializeOwned>(ndjson: &str) -> Result<Vec<T>, RepError> {
    let mut items = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(item) => items.push(item),
            Err(e) => {
                return Err(RepError::ParseError(format!(
                    "Failed to parse line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        }
    }
    Ok(items)
}

/// Line format of a live NDJSON input stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// One [`Frame`] per line
    Keypoints,
    /// One [`AngleSample`] per line
    Angles,
}

/// Line accounting for [`SessionRunner::observe_stream`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub lines: usize,
    pub skipped: usize,
}

/// A recorded stream, either raw keypoints or pre-computed angles
#[derive(Debug, Clone)]
pub enum SessionInput {
    Frames(Vec<Frame>),
    Angles(Vec<AngleSample>),
}

impl SessionInput {
    pub fn len(&self) -> usize {
        match self {
            SessionInput::Frames(frames) => frames.len(),
            SessionInput::Angles(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of replaying a recorded stream through a session
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub events: Vec<RepEvent>,
    pub snapshot: BTreeMap<ExerciseKind, u32>,
    pub record: LedgerRecord,
}

/// Run a recorded stream through a fresh session (stateless, one-shot).
///
/// Nothing is written; the returned record is what a live session would append.
pub fn replay(
    config: &CounterConfig,
    tracked: &[ExerciseKind],
    prior_totals: &DailyTotals,
    input: &SessionInput,
    finished_at: NaiveDateTime,
) -> Result<ReplaySummary, RepError> {
    let mut session = ExerciseSession::start(config, tracked, prior_totals)?;

    let events = match input {
        SessionInput::Frames(frames) => frames
            .iter()
            .flat_map(|frame| session.observe_frame(frame))
            .collect(),
        SessionInput::Angles(samples) => samples
            .iter()
            .flat_map(|sample| session.observe_angles(sample))
            .collect(),
    };

    let snapshot = session.snapshot();
    let record = session.finish_at(finished_at);

    Ok(ReplaySummary {
        events,
        snapshot,
        record,
    })
}

/// Live session bound to a ledger.
///
/// Opening loads today's totals; finishing appends the session's record.
pub struct SessionRunner {
    ledger: DailyLedger,
    session: ExerciseSession,
}

impl SessionRunner {
    /// Open a session for `tracked` kinds on top of the totals recorded on `today`
    pub fn open(
        ledger: DailyLedger,
        config: &CounterConfig,
        tracked: &[ExerciseKind],
        today: NaiveDate,
    ) -> Result<Self, RepError> {
        let prior = ledger.load_totals_for(today);
        debug!("Prior totals for {}: {:?}", today, prior);

        let session = ExerciseSession::start(config, tracked, &prior)?;
        Ok(Self { ledger, session })
    }

    /// Open a session against today's local date
    pub fn open_today(
        ledger: DailyLedger,
        config: &CounterConfig,
        tracked: &[ExerciseKind],
    ) -> Result<Self, RepError> {
        Self::open(ledger, config, tracked, Local::now().date_naive())
    }

    pub fn with_notifier(mut self, notifier: impl RepNotifier + 'static) -> Self {
        self.session = self.session.with_notifier(notifier);
        self
    }

    pub fn observe_frame(&mut self, frame: &Frame) -> Vec<RepEvent> {
        self.session.observe_frame(frame)
    }

    pub fn observe_angles(&mut self, sample: &AngleSample) -> Vec<RepEvent> {
        self.session.observe_angles(sample)
    }

    /// Parse one NDJSON line in `format` and feed it
    pub fn observe_line(
        &mut self,
        line: &str,
        format: StreamFormat,
    ) -> Result<Vec<RepEvent>, RepError> {
        let events = match format {
            StreamFormat::Keypoints => {
                let frame: Frame = serde_json::from_str(line)?;
                self.observe_frame(&frame)
            }
            StreamFormat::Angles => {
                let sample: AngleSample = serde_json::from_str(line)?;
                self.observe_angles(&sample)
            }
        };
        Ok(events)
    }

    /// Feed every line of `reader`, handing each rep event to `sink`.
    ///
    /// Malformed lines (bad JSON or invalid UTF-8) are skipped with a warning.
    /// A read error or a `sink` error ends the stream early; either way the
    /// session keeps every rep counted so far and can still be finished.
    pub fn observe_stream<R, F>(
        &mut self,
        mut reader: R,
        format: StreamFormat,
        mut sink: F,
    ) -> io::Result<StreamStats>
    where
        R: BufRead,
        F: FnMut(&RepEvent) -> io::Result<()>,
    {
        let mut stats = StreamStats::default();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            stats.lines += 1;

            let line = String::from_utf8_lossy(&buf);
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match self.observe_line(trimmed, format) {
                Ok(events) => {
                    for event in &events {
                        sink(event)?;
                    }
                }
                Err(e) => {
                    warn!("Skipping input line {}: {}", stats.lines, e);
                    stats.skipped += 1;
                }
            }
        }

        Ok(stats)
    }

    pub fn session(&self) -> &ExerciseSession {
        &self.session
    }

    pub fn ledger(&self) -> &DailyLedger {
        &self.ledger
    }

    /// End the session without writing to the ledger
    pub fn discard(self) -> LedgerRecord {
        self.session.finish()
    }

    /// End the session and append it to the ledger
    pub fn finish(self) -> Result<LedgerRecord, RepError> {
        self.finish_at(Local::now().naive_local())
    }

    pub fn finish_at(self, timestamp: NaiveDateTime) -> Result<LedgerRecord, RepError> {
        let record = self.session.finish_at(timestamp);
        self.ledger.append(&record)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::zero_totals;
    use pretty_assertions::assert_eq;
    use std::io::Read;
    use tempfile::TempDir;

    fn reference_config() -> CounterConfig {
        let mut config = CounterConfig::default().with_margin(10.0);
        for profile in &mut config.profiles {
            profile.maintaining = 140.0;
            profile.relaxing = 120.0;
        }
        config
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn at(hour: u32) -> NaiveDateTime {
        day().and_hms_opt(hour, 0, 0).unwrap()
    }

    fn sample_angles_ndjson() -> &'static str {
        r#"{"push_up": 150.0, "squat": 150.0}
{"push_up": 150.0, "squat": 100.0}
{"push_up": 125.0}

{"push_up": 95.0, "squat": null}
{"push_up": 95.0, "squat": 125.0}
{"push_up": 125.0, "squat": 150.0}
{"push_up": 150.0}"#
    }

    #[test]
    fn test_parse_angle_ndjson_skips_blank_lines() {
        let samples = FrameParser::parse_angle_ndjson(sample_angles_ndjson()).unwrap();
        assert_eq!(samples.len(), 7);
        assert_eq!(samples[3].get(&ExerciseKind::Squat), Some(&None));
        assert_eq!(samples[2].get(&ExerciseKind::Squat), None);
    }

    #[test]
    fn test_parse_error_reports_line_number() {
        let err = FrameParser::parse_ndjson("{\"keypoints\": []}\nnot json").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_frames() {
        let ndjson = concat!(
            r#"{"timestamp": "2026-10-16T12:00:00Z", "#,
            r#""keypoints": [null, {"x": 1.0, "y": 2.0, "confidence": 0.8}]}"#,
        );
        let frames = FrameParser::parse_ndjson(ndjson).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].timestamp.is_some());
        assert_eq!(frames[0].keypoints.len(), 2);
    }

    #[test]
    fn test_replay_angles() {
        let samples = FrameParser::parse_angle_ndjson(sample_angles_ndjson()).unwrap();
        let summary = replay(
            &reference_config(),
            &[ExerciseKind::PushUp, ExerciseKind::Squat],
            &zero_totals(),
            &SessionInput::Angles(samples),
            at(12),
        )
        .unwrap();

        let kinds: Vec<ExerciseKind> = summary.events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ExerciseKind::Squat, ExerciseKind::PushUp]);
        assert_eq!(summary.snapshot[&ExerciseKind::PushUp], 1);
        assert_eq!(summary.snapshot[&ExerciseKind::Squat], 1);
        assert_eq!(
            summary.record.to_line(),
            "Friday 10/16/26 12:00 PM, 1 push-ups, 1 squats"
        );
    }

    #[test]
    fn test_replay_ignores_angles_for_untracked_kinds() {
        let samples = FrameParser::parse_angle_ndjson(sample_angles_ndjson()).unwrap();
        let summary = replay(
            &reference_config(),
            &[ExerciseKind::Squat],
            &zero_totals(),
            &SessionInput::Angles(samples),
            at(12),
        )
        .unwrap();

        assert_eq!(summary.events.len(), 1);
        assert!(!summary.snapshot.contains_key(&ExerciseKind::PushUp));
    }

    #[test]
    fn test_runner_loads_prior_totals_and_appends() {
        let dir = TempDir::new().unwrap();
        let ledger = DailyLedger::new(dir.path().join("exercise_count.txt"));
        let config = reference_config();
        let samples = FrameParser::parse_angle_ndjson(sample_angles_ndjson()).unwrap();

        // First session of the day
        let mut runner =
            SessionRunner::open(ledger.clone(), &config, &[ExerciseKind::PushUp], day()).unwrap();
        for sample in &samples {
            runner.observe_angles(sample);
        }
        let first = runner.finish_at(at(8)).unwrap();
        assert_eq!(first.count(ExerciseKind::PushUp), 1);

        // Second session starts from the first session's total
        let mut runner =
            SessionRunner::open(ledger.clone(), &config, &[ExerciseKind::PushUp], day()).unwrap();
        let mut events = Vec::new();
        for sample in &samples {
            events.extend(runner.observe_angles(sample));
        }
        assert_eq!(events[0].session_count, 1);
        assert_eq!(events[0].displayed_total, 2);

        let second = runner.finish_at(at(18)).unwrap();
        // The ledger stores session counts, so the day's sum is still exact
        assert_eq!(second.count(ExerciseKind::PushUp), 1);
        assert_eq!(ledger.load_totals_for(day())[&ExerciseKind::PushUp], 2);
    }

    #[test]
    fn test_runner_discard_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let ledger = DailyLedger::new(dir.path().join("exercise_count.txt"));

        let runner =
            SessionRunner::open(ledger.clone(), &reference_config(), &[ExerciseKind::SitUp], day())
                .unwrap();
        runner.discard();

        assert!(ledger.records().unwrap().is_empty());
    }

    #[test]
    fn test_runner_surfaces_write_failure() {
        let dir = TempDir::new().unwrap();
        let ledger = DailyLedger::new(dir.path());

        let runner = SessionRunner::open(ledger, &reference_config(), &[ExerciseKind::Squat], day())
            .unwrap();
        assert!(matches!(runner.finish_at(at(9)), Err(RepError::LedgerWrite(_))));
    }

    /// Reader that yields its bytes, then fails
    struct FailingReader(io::Cursor<&'static [u8]>);

    impl io::Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::BrokenPipe, "camera disconnected")),
                n => Ok(n),
            }
        }
    }

    fn push_up_runner(ledger: &DailyLedger) -> SessionRunner {
        SessionRunner::open(ledger.clone(), &reference_config(), &[ExerciseKind::PushUp], day())
            .unwrap()
    }

    #[test]
    fn test_stream_skips_bad_line_and_session_is_recorded() {
        let dir = TempDir::new().unwrap();
        let ledger = DailyLedger::new(dir.path().join("exercise_count.txt"));
        let mut runner = push_up_runner(&ledger);

        let input = "{\"push_up\": 150.0}\n{\"push_up\": 100.0}\n{\"push_up\": 125.0}\n\
                     {\"push_up\": 150.0}\n{\"push_up\": 100.0}\n{\"push_up\": 125.0}\n\
                     {\"push_up\": 150.0}\nnot json\n";
        let mut printed = Vec::new();
        let stats = runner
            .observe_stream(input.as_bytes(), StreamFormat::Angles, |event| {
                printed.push(*event);
                Ok(())
            })
            .unwrap();

        assert_eq!(stats, StreamStats { lines: 8, skipped: 1 });
        assert_eq!(printed.len(), 2);
        assert_eq!(printed[1].session_count, 2);

        runner.finish_at(at(10)).unwrap();
        assert_eq!(ledger.load_totals_for(day())[&ExerciseKind::PushUp], 2);
    }

    #[test]
    fn test_stream_continues_past_bad_lines() {
        let dir = TempDir::new().unwrap();
        let ledger = DailyLedger::new(dir.path().join("exercise_count.txt"));
        let mut runner = push_up_runner(&ledger);

        let mut input = b"{\"push_up\": 150.0}\n{\"push_up\": 100.0}\n".to_vec();
        input.extend_from_slice(b"{\"push_up\": \xff}\n");
        input.extend_from_slice(b"{\"push_up\": \"wide\"}\n");
        input.extend_from_slice(b"{\"push_up\": 125.0}\n{\"push_up\": 150.0}");

        let mut count = 0;
        let stats = runner
            .observe_stream(&input[..], StreamFormat::Angles, |_| {
                count += 1;
                Ok(())
            })
            .unwrap();

        assert_eq!(stats.skipped, 2);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_stream_read_error_keeps_counted_reps() {
        let dir = TempDir::new().unwrap();
        let ledger = DailyLedger::new(dir.path().join("exercise_count.txt"));
        let mut runner = push_up_runner(&ledger);

        let data = concat!(
            "{\"push_up\": 150.0}\n{\"push_up\": 100.0}\n",
            "{\"push_up\": 125.0}\n{\"push_up\": 150.0}\n",
        )
        .as_bytes();
        let reader = io::BufReader::new(FailingReader(io::Cursor::new(data)));

        let result = runner.observe_stream(reader, StreamFormat::Angles, |_| Ok(()));
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);

        let record = runner.finish_at(at(11)).unwrap();
        assert_eq!(record.count(ExerciseKind::PushUp), 1);
        assert_eq!(ledger.records().unwrap(), vec![record]);
    }

    #[test]
    fn test_stream_sink_error_stops_early_without_losing_count() {
        let dir = TempDir::new().unwrap();
        let ledger = DailyLedger::new(dir.path().join("exercise_count.txt"));
        let mut runner = push_up_runner(&ledger);

        let input = "{\"push_up\": 150.0}\n{\"push_up\": 100.0}\n{\"push_up\": 125.0}\n\
                     {\"push_up\": 150.0}\n{\"push_up\": 100.0}\n";
        let result = runner.observe_stream(input.as_bytes(), StreamFormat::Angles, |_| {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"))
        });
        assert!(result.is_err());

        assert_eq!(runner.session().totals(ExerciseKind::PushUp).unwrap().session_count, 1);
        let record = runner.finish_at(at(12)).unwrap();
        assert_eq!(record.count(ExerciseKind::PushUp), 1);
    }

    #[test]
    fn test_observe_line_keypoints() {
        let dir = TempDir::new().unwrap();
        let ledger = DailyLedger::new(dir.path().join("exercise_count.txt"));
        let mut runner = push_up_runner(&ledger);

        let events = runner
            .observe_line(r#"{"keypoints": []}"#, StreamFormat::Keypoints)
            .unwrap();
        assert!(events.is_empty());
        assert!(matches!(
            runner.observe_line("not json", StreamFormat::Keypoints),
            Err(RepError::JsonError(_))
        ));
    }
}
