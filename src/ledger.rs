//! Daily ledger
//!
//! An append-only text log with one line per finished session:
//!
//! ```text
//! Friday 10/16/26 03:45 PM, 5 push-ups, 3 squats, 0 sit-ups
//! ```
//!
//! Only the exercises tracked in a session appear on its line, always in
//! push-ups, squats, sit-ups order. A day's total for an exercise is the sum
//! over every line stamped with that calendar date.

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::RepError;
use crate::types::{zero_totals, DailyTotals, ExerciseKind};

/// Timestamp layout of ledger lines
pub const LEDGER_TIME_FORMAT: &str = "%A %m/%d/%y %I:%M %p";

/// One finished session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// Local wall-clock time the session ended
    pub timestamp: NaiveDateTime,
    pub counts: BTreeMap<ExerciseKind, u32>,
}

impl LedgerRecord {
    pub fn new(timestamp: NaiveDateTime, counts: BTreeMap<ExerciseKind, u32>) -> Self {
        Self { timestamp, counts }
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn count(&self, kind: ExerciseKind) -> u32 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Render as a single ledger line (no trailing newline)
    pub fn to_line(&self) -> String {
        let mut line = self.timestamp.format(LEDGER_TIME_FORMAT).to_string();
        for (kind, count) in &self.counts {
            line.push_str(&format!(", {} {}", count, kind.ledger_label()));
        }
        line
    }

    /// Parse a single ledger line
    pub fn parse_line(line: &str) -> Result<Self, RepError> {
        let mut fields = line.trim().split(',');

        let stamp = fields.next().map(str::trim).unwrap_or_default();
        let timestamp = NaiveDateTime::parse_from_str(stamp, LEDGER_TIME_FORMAT)
            .map_err(|e| RepError::DateParseError(format!("{:?}: {}", stamp, e)))?;

        let mut counts = BTreeMap::new();
        for field in fields {
            let field = field.trim();
            let (number, label) = field
                .split_once(char::is_whitespace)
                .ok_or_else(|| RepError::LedgerParse(format!("field {:?} has no label", field)))?;

            let count: u32 = number
                .parse()
                .map_err(|_| RepError::LedgerParse(format!("field {:?} has no count", field)))?;
            let kind = ExerciseKind::from_ledger_label(label.trim()).ok_or_else(|| {
                RepError::LedgerParse(format!("unknown exercise {:?}", label.trim()))
            })?;

            let entry = counts.entry(kind).or_insert(0u32);
            *entry = entry.saturating_add(count);
        }

        Ok(Self { timestamp, counts })
    }
}

impl fmt::Display for LedgerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Sum per-kind counts over a set of records; every kind is present
pub fn sum_totals<'a>(records: impl IntoIterator<Item = &'a LedgerRecord>) -> DailyTotals {
    let mut totals = zero_totals();
    for record in records {
        for (kind, count) in &record.counts {
            let entry = totals.entry(*kind).or_insert(0);
            *entry = entry.saturating_add(*count);
        }
    }
    totals
}

/// File-backed ledger of finished sessions
#[derive(Debug, Clone)]
pub struct DailyLedger {
    path: PathBuf,
}

impl DailyLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sum of counts recorded on `date`, per exercise kind.
    ///
    /// A missing or unreadable ledger yields all-zero totals and a warning.
    pub fn load_totals_for(&self, date: NaiveDate) -> DailyTotals {
        match self.read_records() {
            Ok(records) => sum_totals(records.iter().filter(|r| r.date() == date)),
            Err(e) => {
                warn!(
                    "Could not read ledger {}: {}; starting from zero",
                    self.path.display(),
                    e
                );
                zero_totals()
            }
        }
    }

    /// Append one record as a new line and sync it to disk.
    ///
    /// If the file does not end in a newline (a torn earlier write), a newline
    /// is written first so the new record never merges into the previous line.
    pub fn append(&self, record: &LedgerRecord) -> Result<(), RepError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(RepError::LedgerWrite)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(RepError::LedgerWrite)?;

        let mut line = String::new();
        if !ends_with_newline(&mut file).map_err(RepError::LedgerWrite)? {
            line.push('\n');
        }
        line.push_str(&record.to_line());
        line.push('\n');

        file.write_all(line.as_bytes()).map_err(RepError::LedgerWrite)?;
        file.sync_all().map_err(RepError::LedgerWrite)?;

        debug!("Appended ledger record: {}", record);
        Ok(())
    }

    /// Every parseable record, oldest first. A missing ledger is empty.
    pub fn records(&self) -> Result<Vec<LedgerRecord>, RepError> {
        match self.read_records() {
            Ok(records) => Ok(records),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(RepError::LedgerRead(e)),
        }
    }

    /// The `n` most recent records, oldest first
    pub fn latest(&self, n: usize) -> Result<Vec<LedgerRecord>, RepError> {
        let mut records = self.records()?;
        let skip = records.len().saturating_sub(n);
        Ok(records.split_off(skip))
    }

    fn read_records(&self) -> io::Result<Vec<LedgerRecord>> {
        // Invalid UTF-8 stays confined to its own line, which then fails to parse
        let bytes = fs::read(&self.path)?;
        Ok(parse_lines(&String::from_utf8_lossy(&bytes)))
    }
}

/// Parse ledger content, skipping (and logging) malformed lines
fn parse_lines(content: &str) -> Vec<LedgerRecord> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(idx, line)| match LedgerRecord::parse_line(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping ledger line {}: {}", idx + 1, e);
                None
            }
        })
        .collect()
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
