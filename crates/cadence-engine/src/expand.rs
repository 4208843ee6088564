//! Occurrence expansion for recurrence rules.
//!
//! Given an anchor timestamp, a validated [`RecurrenceRule`], and a
//! [`DateWindow`], this module produces the ordered raw occurrence dates that
//! intersect the window. Exceptions and overrides are applied later, by the
//! resolver; this layer deals in calendar dates only.
//!
//! Candidate dates are generated in non-decreasing order by construction, so
//! no de-duplication pass is needed. Candidates that fall between the anchor
//! and the window's lower bound are still counted against a `count` end
//! condition, but not yielded; candidates before the anchor are not
//! occurrences at all.

use cadence_core::DateWindow;
use cadence_core::rule::{Frequency, RecurrenceRule, days_from_week_start};
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc, Weekday};

use crate::cancel::CancelToken;
use crate::error::{EngineError, EngineResult};

/// Knobs for occurrence expansion.
#[derive(Debug, Clone, Copy)]
pub struct ExpandOptions {
    /// First day of the week, used to align weekly stepping. Monday by
    /// default; calendars configured for Sunday-start weeks pass Sunday.
    pub week_start: Weekday,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            week_start: Weekday::Mon,
        }
    }
}

/// Expands a rule over a window with default options and no cancellation.
///
/// See [`expand_with`].
pub fn expand(
    anchor: DateTime<Utc>,
    rule: &RecurrenceRule,
    window: &DateWindow,
) -> EngineResult<Vec<NaiveDate>> {
    expand_with(anchor, rule, window, &ExpandOptions::default(), &CancelToken::new())
}

/// Expands a rule over a window.
///
/// Returns the ordered occurrence dates inside `[window.start, window.end]`,
/// both boundaries inclusive. Generation stops at the rule's end condition
/// (`count` exhausted or `until` passed) or at the window's upper bound,
/// whichever comes first.
///
/// # Errors
///
/// Returns [`EngineError::InvalidRule`] when the rule fails structural
/// validation and [`EngineError::Cancelled`] when the token fires between
/// candidate dates.
pub fn expand_with(
    anchor: DateTime<Utc>,
    rule: &RecurrenceRule,
    window: &DateWindow,
    options: &ExpandOptions,
    cancel: &CancelToken,
) -> EngineResult<Vec<NaiveDate>> {
    rule.validate_structure().map_err(EngineError::InvalidRule)?;

    let anchor_date = anchor.date_naive();
    let horizon = match rule.until.map(|u| u.date_naive()) {
        Some(until) if until < window.end => until,
        _ => window.end,
    };

    let mut emitter = Emitter {
        window,
        anchor_date,
        horizon,
        remaining: rule.count,
        cancel,
        dates: Vec::new(),
    };

    match rule.frequency {
        Frequency::Daily => step_days(anchor_date, u64::from(rule.interval), &mut emitter)?,
        Frequency::Weekly => match rule.weekdays {
            Some(ref weekdays) if !weekdays.is_empty() => step_weeks(
                anchor_date,
                rule.interval,
                weekdays,
                options.week_start,
                &mut emitter,
            )?,
            _ => step_days(anchor_date, u64::from(rule.interval) * 7, &mut emitter)?,
        },
        Frequency::Monthly => {
            // Ordinal+weekday positioning takes precedence over an explicit
            // day-of-month set when a rule carries both.
            if rule.is_by_position() {
                let ordinals = rule.ordinals.as_deref().unwrap_or_default();
                let weekdays = rule.weekdays.as_deref().unwrap_or_default();
                step_months_by_position(anchor_date, rule.interval, ordinals, weekdays, &mut emitter)?;
            } else {
                step_months_by_day(anchor_date, rule.interval, rule.month_days.as_deref(), &mut emitter)?;
            }
        }
        Frequency::Yearly => {
            step_years(anchor_date, rule.interval, rule.months.as_deref(), &mut emitter)?;
        }
    }

    Ok(emitter.dates)
}

/// Shared candidate bookkeeping: anchor skipping, count accounting, window
/// filtering, horizon stop, and cancellation.
struct Emitter<'a> {
    window: &'a DateWindow,
    anchor_date: NaiveDate,
    horizon: NaiveDate,
    remaining: Option<u32>,
    cancel: &'a CancelToken,
    dates: Vec<NaiveDate>,
}

impl Emitter<'_> {
    /// Feeds the next candidate date. Returns `Ok(false)` once generation is
    /// finished (horizon passed or count exhausted).
    fn emit(&mut self, date: NaiveDate) -> EngineResult<bool> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        // Dates before the anchor are not occurrences and do not count.
        if date < self.anchor_date {
            return Ok(true);
        }
        if date > self.horizon {
            return Ok(false);
        }
        if let Some(ref mut remaining) = self.remaining {
            if *remaining == 0 {
                return Ok(false);
            }
            *remaining -= 1;
        }
        if self.window.contains(date) {
            self.dates.push(date);
        }
        Ok(true)
    }
}

fn step_days(start: NaiveDate, step_days: u64, emitter: &mut Emitter<'_>) -> EngineResult<()> {
    let mut date = start;
    loop {
        if !emitter.emit(date)? {
            return Ok(());
        }
        date = match date.checked_add_days(Days::new(step_days)) {
            Some(next) => next,
            None => return Ok(()),
        };
    }
}

fn step_weeks(
    anchor: NaiveDate,
    interval: u32,
    weekdays: &[Weekday],
    week_start: Weekday,
    emitter: &mut Emitter<'_>,
) -> EngineResult<()> {
    let mut offsets: Vec<u64> = weekdays
        .iter()
        .map(|&weekday| u64::from(days_from_week_start(weekday, week_start)))
        .collect();
    offsets.sort_unstable();
    offsets.dedup();

    let anchor_offset = u64::from(days_from_week_start(anchor.weekday(), week_start));
    let mut week = match anchor.checked_sub_days(Days::new(anchor_offset)) {
        Some(start) => start,
        None => return Ok(()),
    };

    loop {
        for &offset in &offsets {
            let Some(date) = week.checked_add_days(Days::new(offset)) else {
                return Ok(());
            };
            if !emitter.emit(date)? {
                return Ok(());
            }
        }
        week = match week.checked_add_days(Days::new(7 * u64::from(interval))) {
            Some(next) => next,
            None => return Ok(()),
        };
    }
}

fn step_months_by_day(
    anchor: NaiveDate,
    interval: u32,
    month_days: Option<&[u32]>,
    emitter: &mut Emitter<'_>,
) -> EngineResult<()> {
    let mut days: Vec<u32> = match month_days {
        Some(days) if !days.is_empty() => days.to_vec(),
        _ => vec![anchor.day()],
    };
    days.sort_unstable();
    days.dedup();

    let mut index = month_index(anchor);
    loop {
        let (year, month) = index_to_year_month(index);
        let Some(month_first) = NaiveDate::from_ymd_opt(year, month, 1) else {
            return Ok(());
        };
        if month_first > emitter.horizon {
            return Ok(());
        }
        for &day in &days {
            // Months without this day (e.g. day 31 in April) are skipped,
            // not rolled over, and do not consume the count.
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                if !emitter.emit(date)? {
                    return Ok(());
                }
            }
        }
        index += i64::from(interval);
    }
}

fn step_months_by_position(
    anchor: NaiveDate,
    interval: u32,
    ordinals: &[i32],
    weekdays: &[Weekday],
    emitter: &mut Emitter<'_>,
) -> EngineResult<()> {
    let mut index = month_index(anchor);
    loop {
        let (year, month) = index_to_year_month(index);
        let Some(month_first) = NaiveDate::from_ymd_opt(year, month, 1) else {
            return Ok(());
        };
        if month_first > emitter.horizon {
            return Ok(());
        }

        let mut candidates = Vec::with_capacity(ordinals.len() * weekdays.len());
        for &ordinal in ordinals {
            for &weekday in weekdays {
                if let Some(date) = nth_weekday_of_month(year, month, weekday, ordinal) {
                    candidates.push(date);
                }
            }
        }
        candidates.sort_unstable();
        candidates.dedup();

        for date in candidates {
            if !emitter.emit(date)? {
                return Ok(());
            }
        }
        index += i64::from(interval);
    }
}

fn step_years(
    anchor: NaiveDate,
    interval: u32,
    months: Option<&[u32]>,
    emitter: &mut Emitter<'_>,
) -> EngineResult<()> {
    let mut months: Vec<u32> = match months {
        Some(months) if !months.is_empty() => months.to_vec(),
        _ => vec![anchor.month()],
    };
    months.sort_unstable();
    months.dedup();

    let day = anchor.day();
    let mut year = anchor.year();
    loop {
        let Some(year_first) = NaiveDate::from_ymd_opt(year, 1, 1) else {
            return Ok(());
        };
        if year_first > emitter.horizon {
            return Ok(());
        }
        for &month in &months {
            // Feb 29 in a non-leap year simply does not occur.
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                if !emitter.emit(date)? {
                    return Ok(());
                }
            }
        }
        year = match year.checked_add(interval as i32) {
            Some(next) => next,
            None => return Ok(()),
        };
    }
}

/// Computes the Nth given weekday of a month; `ordinal` -1 means the
/// chronologically last, -2 the one before it, and so on.
pub(crate) fn nth_weekday_of_month(
    year: i32,
    month: u32,
    weekday: Weekday,
    ordinal: i32,
) -> Option<NaiveDate> {
    if ordinal == 0 {
        return None;
    }
    if ordinal > 0 {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let offset = days_from_week_start(weekday, first.weekday());
        let day = 1 + offset + 7 * (ordinal as u32 - 1);
        NaiveDate::from_ymd_opt(year, month, day)
    } else {
        let last = last_day_of_month(year, month)?;
        let back = days_from_week_start(last.weekday(), weekday);
        let day = last.day().checked_sub(back + 7 * (ordinal.unsigned_abs() - 1))?;
        if day == 0 {
            return None;
        }
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    next_first.pred_opt()
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn index_to_year_month(index: i64) -> (i32, u32) {
    #[allow(clippy::cast_possible_truncation)]
    let year = index.div_euclid(12) as i32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let month = index.rem_euclid(12) as u32 + 1;
    (year, month)
}
