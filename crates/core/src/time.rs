//! Calendar helpers: date parsing and fixed month windows

use crate::error::{Error, Result};
use chrono::{DateTime, Datelike, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Parse a `YYYY-MM-DD` date string
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| Error::InvalidDate {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Parse an RFC 3339 timestamp, or a bare date taken as midnight UTC
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value.trim()) {
        return Ok(ts.with_timezone(&Utc));
    }
    parse_date(value).map(start_of_day)
}

/// Midnight UTC at the start of `date`
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// A half-open time interval `[start, end)` covering one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthWindow {
    /// 1-based position of the window in its sequence
    pub index: usize,
    /// First instant of the month (inclusive)
    pub start: DateTime<Utc>,
    /// First instant of the following month (exclusive)
    pub end: DateTime<Utc>,
}

impl MonthWindow {
    /// Whether `ts` falls inside `[start, end)`
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start && *ts < self.end
    }

    /// Short label such as `2024-03`
    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.start.year(), self.start.month())
    }
}

/// `count` consecutive month windows starting on the first day of
/// `start_month` in `year`.
///
/// Windows advance in calendar-month steps and cross year boundaries when
/// `start_month + count - 1 > 12`; they never wrap back into `year`.
pub fn month_windows(year: i32, start_month: u32, count: usize) -> Result<Vec<MonthWindow>> {
    if !(1..=12).contains(&start_month) {
        return Err(Error::InvalidParameter {
            name: "start_month",
            value: start_month.to_string(),
            reason: "must be in 1..=12".into(),
        });
    }

    let first = NaiveDate::from_ymd_opt(year, start_month, 1).ok_or_else(|| Error::InvalidDate {
        value: format!("{year}-{start_month:02}-01"),
        reason: "out of range".into(),
    })?;

    let month_start = |offset: usize| -> Result<NaiveDate> {
        u32::try_from(offset)
            .ok()
            .and_then(|m| first.checked_add_months(Months::new(m)))
            .ok_or_else(|| Error::InvalidParameter {
                name: "month_count",
                value: count.to_string(),
                reason: "window extends past the supported calendar".into(),
            })
    };

    (0..count)
        .map(|i| {
            Ok(MonthWindow {
                index: i + 1,
                start: start_of_day(month_start(i)?),
                end: start_of_day(month_start(i + 1)?),
            })
        })
        .collect()
}
