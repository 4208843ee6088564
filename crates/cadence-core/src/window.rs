//! Query windows for occurrence expansion.
//!
//! This module provides [`DateWindow`], the caller-supplied calendar-date
//! range over which occurrences and instances are produced. Unlike a
//! datetime interval, a window is inclusive on both ends: a query for
//! January asks for January 1 through January 31.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// An inclusive calendar-date range `[start, end]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateWindow {
    /// First date of the window (inclusive).
    pub start: NaiveDate,
    /// Last date of the window (inclusive).
    pub end: NaiveDate,
}

impl DateWindow {
    /// Creates a new window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        assert!(start <= end, "DateWindow start must be <= end");
        Self { start, end }
    }

    /// Creates a window covering a single day.
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// Creates a window covering one whole month.
    ///
    /// Returns `None` for an invalid year/month combination.
    pub fn for_month(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self {
            start,
            end: next.pred_opt()?,
        })
    }

    /// Creates a window covering the month containing `date` plus the months
    /// immediately before and after, as a month-grid UI queries it.
    pub fn surrounding_months(date: NaiveDate) -> Option<Self> {
        let (py, pm) = if date.month() == 1 {
            (date.year() - 1, 12)
        } else {
            (date.year(), date.month() - 1)
        };
        let (ny, nm) = if date.month() == 12 {
            (date.year() + 1, 1)
        } else {
            (date.year(), date.month() + 1)
        };
        Some(Self {
            start: Self::for_month(py, pm)?.start,
            end: Self::for_month(ny, nm)?.end,
        })
    }

    /// Checks if a date falls within this window (both ends inclusive).
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Returns the number of days covered, counting both endpoints.
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Extends the window by the given number of days on both ends.
    pub fn extend_days(&self, days: u64) -> Self {
        Self {
            start: self
                .start
                .checked_sub_days(Days::new(days))
                .unwrap_or(self.start),
            end: self.end.checked_add_days(Days::new(days)).unwrap_or(self.end),
        }
    }

    /// Returns the window start as a UTC timestamp at midnight.
    pub fn start_datetime(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Returns the first timestamp strictly after the window, i.e. midnight
    /// of the day following `end`. Useful for half-open interval checks.
    pub fn end_datetime_exclusive(&self) -> Option<DateTime<Utc>> {
        Some(self.end.succ_opt()?.and_time(NaiveTime::MIN).and_utc())
    }

    /// Returns a month-granularity bucket label for cache keying.
    ///
    /// Two windows that span the same months share a bucket; the format is
    /// `YYYY-MM..YYYY-MM`.
    pub fn month_bucket(&self) -> String {
        format!(
            "{:04}-{:02}..{:04}-{:02}",
            self.start.year(),
            self.start.month(),
            self.end.year(),
            self.end.month()
        )
    }
}
