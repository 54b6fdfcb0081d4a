//! History reports
//!
//! Buckets ledger records by interval for charts and summaries: a single day,
//! each Monday-to-Sunday week of a month, or each month of a year.

use chrono::{Datelike, Duration, Month, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::RepError;
use crate::ledger::{sum_totals, LedgerRecord};
use crate::types::DailyTotals;

/// Reporting interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interval {
    /// The anchor date only
    Today,
    /// Every week (starting on each Monday) of the anchor's month
    WeeksOfMonth,
    /// Every month of the anchor's year
    MonthsOfYear,
}

impl FromStr for Interval {
    type Err = RepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" | "day" => Ok(Interval::Today),
            "weeks" | "week" | "weeks_of_month" => Ok(Interval::WeeksOfMonth),
            "months" | "month" | "months_of_year" => Ok(Interval::MonthsOfYear),
            other => Err(RepError::ParseError(format!("unknown interval: {}", other))),
        }
    }
}

/// Totals for one labelled span of days
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportBucket {
    pub label: String,
    pub start: NaiveDate,
    /// Inclusive
    pub end: NaiveDate,
    pub totals: DailyTotals,
}

/// Bucket `records` by `interval` around `anchor`
pub fn build_report(
    records: &[LedgerRecord],
    interval: Interval,
    anchor: NaiveDate,
) -> Vec<ReportBucket> {
    let spans = match interval {
        Interval::Today => vec![(anchor.format("%Y-%m-%d").to_string(), anchor, anchor)],
        Interval::WeeksOfMonth => week_spans(anchor),
        Interval::MonthsOfYear => month_spans(anchor.year()),
    };

    spans
        .into_iter()
        .map(|(label, start, end)| ReportBucket {
            totals: sum_totals(
                records
                    .iter()
                    .filter(|r| (start..=end).contains(&r.date())),
            ),
            label,
            start,
            end,
        })
        .collect()
}

fn week_spans(anchor: NaiveDate) -> Vec<(String, NaiveDate, NaiveDate)> {
    let mut spans = Vec::new();
    let Some(first) = anchor.with_day(1) else {
        return spans;
    };

    let mut day = first;
    while day.month() == first.month() {
        if day.weekday() == Weekday::Mon {
            let end = day + Duration::days(6);
            spans.push((
                format!("{} to {}", day.format("%Y-%m-%d"), end.format("%Y-%m-%d")),
                day,
                end,
            ));
        }
        day += Duration::days(1);
    }
    spans
}

fn month_spans(year: i32) -> Vec<(String, NaiveDate, NaiveDate)> {
    (1..=12u32)
        .filter_map(|m| {
            let start = NaiveDate::from_ymd_opt(year, m, 1)?;
            let next = if m == 12 {
                NaiveDate::from_ymd_opt(year + 1, 1, 1)?
            } else {
                NaiveDate::from_ymd_opt(year, m + 1, 1)?
            };
            let name = Month::try_from(m as u8).ok()?.name().to_string();
            Some((name, start, next - Duration::days(1)))
        })
        .collect()
}
