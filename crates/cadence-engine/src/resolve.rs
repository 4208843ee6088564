//! Instance resolution: from raw occurrence dates to concrete instances.
//!
//! The resolver expands a schedule's rule, drops cancelled dates, overlays
//! per-occurrence overrides, and transplants the anchor's time-of-day and
//! duration onto every remaining date. Output is deterministic: the same
//! schedule version and window always produce byte-identical instance lists,
//! which the cache and UI diffing both rely on.
//!
//! Time-of-day is transplanted naively in UTC; occurrences that cross a DST
//! boundary in the schedule's display zone keep their UTC wall time. Known
//! limitation, inherited from the product's fixed-offset model.

use cadence_core::schedule::{RecurringSchedule, ScheduleInstance, instance_id};
use cadence_core::{DateWindow, InstanceOverride};
use chrono::NaiveDate;
use tracing::error;

use crate::cancel::CancelToken;
use crate::error::EngineResult;
use crate::expand::{ExpandOptions, expand_with};

/// Resolves a schedule's concrete instances inside a window.
///
/// On any expansion failure the whole call degrades to an empty list with
/// the cause logged; partial results are never returned, so callers can
/// trust that what they got is everything the window holds.
pub fn resolve(schedule: &RecurringSchedule, window: &DateWindow) -> Vec<ScheduleInstance> {
    match try_resolve(schedule, window, &ExpandOptions::default(), &CancelToken::new()) {
        Ok(instances) => instances,
        Err(err) => {
            error!(
                schedule_id = %schedule.id,
                error = %err,
                "failed to expand schedule; returning no instances"
            );
            Vec::new()
        }
    }
}

/// Fallible resolution, for callers that need the per-schedule error (batch
/// expansion, cancellation-aware hosts).
pub fn try_resolve(
    schedule: &RecurringSchedule,
    window: &DateWindow,
    options: &ExpandOptions,
    cancel: &CancelToken,
) -> EngineResult<Vec<ScheduleInstance>> {
    let dates = expand_with(schedule.start, &schedule.rule, window, options, cancel)?;

    let mut instances = Vec::with_capacity(dates.len());
    for date in dates {
        if schedule.is_cancelled_on(date) {
            continue;
        }
        instances.push(build_instance(schedule, date));
    }
    Ok(instances)
}

fn build_instance(schedule: &RecurringSchedule, date: NaiveDate) -> ScheduleInstance {
    // Anchor time-of-day transplanted onto the occurrence date, anchor
    // duration preserved.
    let default_start = date.and_time(schedule.start.time()).and_utc();
    let default_end = default_start + schedule.duration();

    match schedule.override_for(date) {
        Some(ovr) => {
            let (start, end) = override_times(ovr, default_start, schedule);
            ScheduleInstance {
                id: instance_id(&schedule.id, date),
                schedule_id: schedule.id.clone(),
                original_date: date,
                start,
                end,
                title: ovr.title.clone().unwrap_or_else(|| schedule.title.clone()),
                location: ovr.location.clone().or_else(|| schedule.location.clone()),
                description: ovr
                    .description
                    .clone()
                    .or_else(|| schedule.description.clone()),
                is_override: true,
            }
        }
        None => ScheduleInstance {
            id: instance_id(&schedule.id, date),
            schedule_id: schedule.id.clone(),
            original_date: date,
            start: default_start,
            end: default_end,
            title: schedule.title.clone(),
            location: schedule.location.clone(),
            description: schedule.description.clone(),
            is_override: false,
        },
    }
}

/// Resolved time bounds for an overridden instance: explicit override
/// timestamps win; a lone start keeps the anchor duration; a lone end keeps
/// the transplanted start.
fn override_times(
    ovr: &InstanceOverride,
    default_start: chrono::DateTime<chrono::Utc>,
    schedule: &RecurringSchedule,
) -> (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>) {
    match (ovr.start, ovr.end) {
        (Some(start), Some(end)) => (start, end),
        (Some(start), None) => (start, start + schedule.duration()),
        (None, Some(end)) => (default_start, end),
        (None, None) => (default_start, default_start + schedule.duration()),
    }
}
