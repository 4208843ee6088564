//! Schedule types for recurring events.
//!
//! This module provides the value types the engine operates on:
//! - [`RecurringSchedule`]: An event series with an anchor, a rule, and edits
//! - [`ScheduleException`]: A suppression marker for one occurrence date
//! - [`InstanceOverride`]: A field-level edit for one occurrence date
//! - [`ScheduleInstance`]: A concrete, fully resolved occurrence
//!
//! Schedules are immutable values: every edit produces a new schedule with a
//! bumped version, which is what lets the instance cache detect staleness.
//! Instances are ephemeral; they are rebuilt on every expansion (or pulled
//! from cache) and never mutated in place.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::rule::RecurrenceRule;

/// The kind of a schedule exception.
///
/// Only cancellation is currently load-bearing; the enum leaves room for
/// other kinds (e.g. tentative skips) without a wire-format break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    /// The occurrence on this date is suppressed entirely.
    Cancelled,
}

/// A suppression marker for a single occurrence date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleException {
    /// The calendar date of the suppressed occurrence.
    pub date: NaiveDate,
    /// What kind of exception this is.
    pub kind: ExceptionKind,
}

impl ScheduleException {
    /// Creates a cancellation exception for the given date.
    pub fn cancelled(date: NaiveDate) -> Self {
        Self {
            date,
            kind: ExceptionKind::Cancelled,
        }
    }
}

/// A partial field override for a single occurrence date.
///
/// When present, the generated instance keeps its identity (id and original
/// date) but its fields are overlaid with the values set here. Timestamps not
/// set here are recomputed from the anchor's time-of-day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceOverride {
    /// The occurrence date this override applies to.
    pub original_date: NaiveDate,
    /// Replacement title, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Replacement start timestamp, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    /// Replacement end timestamp, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Replacement location, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Replacement description, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When the override was recorded.
    pub modified_at: DateTime<Utc>,
}

impl InstanceOverride {
    /// Creates an empty override for the given occurrence date.
    pub fn new(original_date: NaiveDate, modified_at: DateTime<Utc>) -> Self {
        Self {
            original_date,
            title: None,
            start: None,
            end: None,
            location: None,
            description: None,
            modified_at,
        }
    }

    /// Builder method to replace the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Builder method to replace the time bounds.
    pub fn with_times(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Builder method to replace the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Builder method to replace the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A recurring event series.
///
/// The anchor `start`/`end` pair defines the first occurrence's wall-clock
/// time-of-day and duration; every later occurrence inherits both. The
/// engine never mutates a schedule: edits go through the `cancel_occurrence`
/// and `override_occurrence` helpers, which return a new value with a bumped
/// version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringSchedule {
    /// Unique identifier for the series.
    pub id: String,
    /// The calendar or project this series belongs to.
    pub calendar_id: String,
    /// The series title.
    pub title: String,
    /// Anchor start timestamp (first occurrence).
    pub start: DateTime<Utc>,
    /// Anchor end timestamp (first occurrence).
    pub end: DateTime<Utc>,
    /// How the series repeats.
    pub rule: RecurrenceRule,
    /// Monotonically increasing edit counter.
    pub version: u64,
    /// When the schedule was last persisted.
    pub updated_at: DateTime<Utc>,
    /// The series location, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// The series description, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Suppressed occurrence dates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exceptions: Vec<ScheduleException>,
    /// Per-occurrence field edits.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<InstanceOverride>,
}

impl RecurringSchedule {
    /// Creates a new schedule at version 1 with no exceptions or overrides.
    pub fn new(
        id: impl Into<String>,
        calendar_id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        rule: RecurrenceRule,
    ) -> Self {
        Self {
            id: id.into(),
            calendar_id: calendar_id.into(),
            title: title.into(),
            start,
            end,
            rule,
            version: 1,
            updated_at: start,
            location: None,
            description: None,
            exceptions: Vec::new(),
            overrides: Vec::new(),
        }
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the anchor duration.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Returns the anchor duration in minutes.
    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    /// Returns true if the occurrence on `date` is cancelled.
    pub fn is_cancelled_on(&self, date: NaiveDate) -> bool {
        self.exceptions
            .iter()
            .any(|e| e.date == date && e.kind == ExceptionKind::Cancelled)
    }

    /// Returns the override for `date`, if one exists.
    ///
    /// When several overrides target the same date, the most recently
    /// modified one wins.
    pub fn override_for(&self, date: NaiveDate) -> Option<&InstanceOverride> {
        self.overrides
            .iter()
            .filter(|o| o.original_date == date)
            .max_by_key(|o| o.modified_at)
    }

    /// Returns a copy of this schedule with the occurrence on `date`
    /// cancelled and the version bumped.
    pub fn cancel_occurrence(&self, date: NaiveDate, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.exceptions.push(ScheduleException::cancelled(date));
        next.version += 1;
        next.updated_at = now;
        next
    }

    /// Returns a copy of this schedule with the given override recorded and
    /// the version bumped.
    pub fn override_occurrence(&self, ovr: InstanceOverride, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.overrides.push(ovr);
        next.version += 1;
        next.updated_at = now;
        next
    }
}

/// Derives the stable instance identifier for a schedule occurrence.
///
/// The id is deterministic in (schedule id, occurrence date) so repeated
/// expansions and cache round-trips always agree, and so UI diffing keys
/// stay stable across edits to other occurrences.
pub fn instance_id(schedule_id: &str, original_date: NaiveDate) -> String {
    format!("{schedule_id}-{}", original_date.format("%Y-%m-%d"))
}

/// A concrete, fully resolved occurrence of a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInstance {
    /// Stable identifier, `{schedule_id}-{YYYY-MM-DD}`.
    pub id: String,
    /// The parent series.
    pub schedule_id: String,
    /// The occurrence date this instance was generated from.
    pub original_date: NaiveDate,
    /// Resolved start timestamp.
    pub start: DateTime<Utc>,
    /// Resolved end timestamp.
    pub end: DateTime<Utc>,
    /// Resolved title.
    pub title: String,
    /// Resolved location, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Resolved description, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// True if an override shaped this instance.
    pub is_override: bool,
}

impl ScheduleInstance {
    /// Returns the instance duration in minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Checks if this instance overlaps another in time.
    ///
    /// Uses half-open interval semantics: back-to-back instances do not
    /// overlap.
    pub fn overlaps(&self, other: &ScheduleInstance) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns the overlap with another instance in minutes, or zero if the
    /// two do not overlap.
    pub fn overlap_minutes(&self, other: &ScheduleInstance) -> i64 {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (end - start).num_minutes().max(0)
    }
}
