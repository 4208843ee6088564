//! Recurrence rule types and validation.
//!
//! This module provides the core types for describing how a schedule repeats:
//! - [`Frequency`]: The base repetition unit (daily, weekly, monthly, yearly)
//! - [`RecurrenceRule`]: A complete recurrence definition with interval,
//!   day selectors, and an optional end condition
//! - [`RuleViolation`]: A structural problem found during validation
//!
//! Validation reports *every* violation it finds, not just the first, so a
//! form UI can highlight all bad fields in one pass.

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum allowed value for [`RecurrenceRule::interval`].
pub const MAX_INTERVAL: u32 = 999;

/// Maximum allowed value for [`RecurrenceRule::count`].
pub const MAX_COUNT: u32 = 999;

/// The base repetition unit of a recurrence rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// Repeats every `interval` days.
    Daily,
    /// Repeats every `interval` weeks, optionally on a fixed set of weekdays.
    Weekly,
    /// Repeats every `interval` months, by day-of-month or by ordinal weekday.
    Monthly,
    /// Repeats every `interval` years, optionally restricted to given months.
    Yearly,
}

impl Frequency {
    /// Returns a lowercase name for this frequency.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

/// A structural problem in a [`RecurrenceRule`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    /// The interval is zero or above [`MAX_INTERVAL`].
    #[error("interval must be between 1 and {MAX_INTERVAL}, got {0}")]
    IntervalOutOfRange(u32),

    /// A weekday set was supplied but is empty.
    #[error("weekday set must contain at least one weekday when present")]
    EmptyWeekdaySet,

    /// A day-of-month value is outside 1..=31.
    #[error("day of month must be between 1 and 31, got {0}")]
    DayOfMonthOutOfRange(u32),

    /// An ordinal position is outside -5..=-1 and 1..=5 (zero is invalid).
    #[error("ordinal position must be in -5..=-1 or 1..=5, got {0}")]
    OrdinalOutOfRange(i32),

    /// A month value is outside 1..=12.
    #[error("month must be between 1 and 12, got {0}")]
    MonthOutOfRange(u32),

    /// Both `count` and `until` end conditions are set.
    #[error("count and until end conditions are mutually exclusive")]
    ConflictingEndConditions,

    /// The count is zero or above [`MAX_COUNT`].
    #[error("count must be between 1 and {MAX_COUNT}, got {0}")]
    CountOutOfRange(u32),

    /// The until timestamp is not in the future.
    #[error("until timestamp must be in the future, got {0}")]
    UntilInPast(DateTime<Utc>),
}

/// A complete recurrence definition.
///
/// The rule describes *how* a schedule repeats; the anchor timestamp that
/// defines *when* lives on the owning schedule. `count` and `until` are both
/// optional but mutually exclusive; a rule with neither repeats forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    /// The base repetition unit.
    pub frequency: Frequency,
    /// Step multiplier: "every N days/weeks/months/years". Must be in
    /// `1..=MAX_INTERVAL`.
    pub interval: u32,
    /// Total number of occurrences, counted from the anchor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Last admissible occurrence timestamp (inclusive, by calendar date).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    /// Selected weekdays, for weekly rules and monthly-by-position rules.
    ///
    /// A weekly rule without a weekday set repeats on the anchor's weekday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekdays: Option<Vec<Weekday>>,
    /// Selected days of the month (1..=31), for monthly rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month_days: Option<Vec<u32>>,
    /// Ordinal positions within a month (1 = first, -1 = last), combined with
    /// `weekdays` for monthly-by-position rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinals: Option<Vec<i32>>,
    /// Selected months (1..=12), for yearly rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months: Option<Vec<u32>>,
}

impl RecurrenceRule {
    /// Creates a rule with the given frequency and an interval of 1.
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            count: None,
            until: None,
            weekdays: None,
            month_days: None,
            ordinals: None,
            months: None,
        }
    }

    /// Creates a daily rule.
    pub fn daily() -> Self {
        Self::new(Frequency::Daily)
    }

    /// Creates a rule for a single, non-repeating occurrence.
    ///
    /// A single event is a one-instance series: it expands to exactly its
    /// anchor date, which lets the conflict detector treat recurring and
    /// single schedules uniformly.
    pub fn once() -> Self {
        Self::new(Frequency::Daily).with_count(1)
    }

    /// Creates a weekly rule on the given weekdays.
    ///
    /// Pass an empty slice to repeat on the anchor's weekday only.
    pub fn weekly(weekdays: &[Weekday]) -> Self {
        let mut rule = Self::new(Frequency::Weekly);
        if !weekdays.is_empty() {
            rule.weekdays = Some(weekdays.to_vec());
        }
        rule
    }

    /// Creates a weekly rule for Monday through Friday.
    pub fn weekdays_only() -> Self {
        Self::weekly(&[
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ])
    }

    /// Creates a monthly rule on the given day of the month.
    pub fn monthly_on_day(day: u32) -> Self {
        let mut rule = Self::new(Frequency::Monthly);
        rule.month_days = Some(vec![day]);
        rule
    }

    /// Creates a monthly rule on the Nth (or, for -1, last) given weekday.
    pub fn monthly_by_position(ordinal: i32, weekday: Weekday) -> Self {
        let mut rule = Self::new(Frequency::Monthly);
        rule.ordinals = Some(vec![ordinal]);
        rule.weekdays = Some(vec![weekday]);
        rule
    }

    /// Creates a yearly rule on the anchor's month and day.
    pub fn yearly() -> Self {
        Self::new(Frequency::Yearly)
    }

    /// Builder method to set the interval.
    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    /// Builder method to end after a fixed number of occurrences.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Builder method to end at a fixed timestamp.
    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Builder method to restrict a yearly rule to the given months.
    pub fn with_months(mut self, months: Vec<u32>) -> Self {
        self.months = Some(months);
        self
    }

    /// Returns true if the rule has no end condition.
    pub fn is_unbounded(&self) -> bool {
        self.count.is_none() && self.until.is_none()
    }

    /// Returns true if this is a monthly rule positioned by ordinal weekday.
    ///
    /// When a monthly rule carries both a day-of-month set and an
    /// ordinal+weekday pair, the ordinal+weekday pair takes precedence and
    /// the day-of-month set is ignored.
    pub fn is_by_position(&self) -> bool {
        self.frequency == Frequency::Monthly
            && self.ordinals.as_ref().is_some_and(|o| !o.is_empty())
            && self.weekdays.as_ref().is_some_and(|w| !w.is_empty())
    }

    /// Validates the rule's structure, reporting all violations found.
    ///
    /// This covers every check except the until-in-the-future one, which
    /// only applies when accepting new user input; an old schedule whose
    /// `until` has passed is still structurally sound and must keep
    /// expanding for history views. The check is pure: no clock is read and
    /// nothing is logged or mutated.
    pub fn validate_structure(&self) -> Result<(), Vec<RuleViolation>> {
        let mut violations = Vec::new();

        if self.interval == 0 || self.interval > MAX_INTERVAL {
            violations.push(RuleViolation::IntervalOutOfRange(self.interval));
        }

        if let Some(ref weekdays) = self.weekdays {
            if weekdays.is_empty() {
                violations.push(RuleViolation::EmptyWeekdaySet);
            }
        }

        if let Some(ref days) = self.month_days {
            for &day in days {
                if day == 0 || day > 31 {
                    violations.push(RuleViolation::DayOfMonthOutOfRange(day));
                }
            }
        }

        if let Some(ref ordinals) = self.ordinals {
            for &ordinal in ordinals {
                if ordinal == 0 || !(-5..=5).contains(&ordinal) {
                    violations.push(RuleViolation::OrdinalOutOfRange(ordinal));
                }
            }
        }

        if let Some(ref months) = self.months {
            for &month in months {
                if month == 0 || month > 12 {
                    violations.push(RuleViolation::MonthOutOfRange(month));
                }
            }
        }

        if self.count.is_some() && self.until.is_some() {
            violations.push(RuleViolation::ConflictingEndConditions);
        }

        if let Some(count) = self.count {
            if count == 0 || count > MAX_COUNT {
                violations.push(RuleViolation::CountOutOfRange(count));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Validates the rule fully, including the until-in-the-future check.
    ///
    /// `now` is the reference point for that check; pass `Utc::now()`
    /// outside of tests. All violations are reported, not just the first.
    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<(), Vec<RuleViolation>> {
        let mut violations = self.validate_structure().err().unwrap_or_default();

        if let Some(until) = self.until {
            if until <= now {
                violations.push(RuleViolation::UntilInPast(until));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Validates the rule against the current wall clock.
    ///
    /// See [`RecurrenceRule::validate_at`].
    pub fn validate(&self) -> Result<(), Vec<RuleViolation>> {
        self.validate_at(Utc::now())
    }
}

/// Returns the offset of `weekday` from `week_start`, in days (0..=6).
pub fn days_from_week_start(weekday: Weekday, week_start: Weekday) -> u32 {
    (weekday.num_days_from_monday() + 7 - week_start.num_days_from_monday()) % 7
}
