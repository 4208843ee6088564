//! Conflict detection between a candidate schedule and existing schedules.
//!
//! All parties are expanded over the query window (existing schedules via
//! the cache, the candidate directly, since it may be unsaved), then every
//! candidate/existing instance pair is checked for overlap. Severity is a
//! coarse tier derived from how much of the instances' average duration the
//! overlap consumes.
//!
//! Detection fails open: if anything goes wrong the caller gets a clean
//! "no conflicts" report and the cause is logged. A save is never blocked
//! on a detector failure.

use cadence_core::schedule::{RecurringSchedule, ScheduleInstance};
use cadence_core::{DateWindow, Frequency, RecurrenceRule};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::cache::InstanceCache;
use crate::cancel::CancelToken;
use crate::error::{EngineError, EngineResult};
use crate::resolve::resolve;

/// Overlap-to-average-duration ratio at or above which a conflict is high
/// severity.
const HIGH_SEVERITY_RATIO: f64 = 0.8;

/// Ratio at or above which a conflict is medium severity.
const MEDIUM_SEVERITY_RATIO: f64 = 0.5;

/// Fixed menu of start-time shifts offered as suggestions, in minutes.
/// Smaller magnitudes come first so ranking ties favour the gentler move.
const SHIFT_MENU_MINUTES: [i64; 6] = [-30, 30, -60, 60, -120, 120];

/// At most this many cancellation dates are suggested.
const MAX_EXCEPTION_DATES: usize = 3;

/// At most this many suggestions are returned, best first.
const MAX_SUGGESTIONS: usize = 5;

/// How much two instances overlap, relative to their durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    /// Overlap below half the average duration.
    Low,
    /// Overlap of at least half the average duration.
    Medium,
    /// Overlap of at least 80% of the average duration.
    High,
}

impl ConflictSeverity {
    /// Classifies an overlap/average-duration ratio.
    pub fn from_overlap_ratio(ratio: f64) -> Self {
        if ratio >= HIGH_SEVERITY_RATIO {
            Self::High
        } else if ratio >= MEDIUM_SEVERITY_RATIO {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// One reported overlap between a candidate instance and an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInstance {
    /// The calendar date the overlap occurs on (candidate side).
    pub date: NaiveDate,
    /// The candidate's instance id.
    pub candidate_instance_id: String,
    /// The existing schedule's instance id.
    pub existing_instance_id: String,
    /// The existing schedule's id.
    pub existing_schedule_id: String,
    /// How severe the overlap is.
    pub severity: ConflictSeverity,
    /// Overlap duration in minutes.
    pub overlap_minutes: i64,
}

/// What a suggestion proposes to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuggestionKind {
    /// Shift the candidate's start (and end) by the given minutes.
    ShiftTime {
        /// Signed shift in minutes.
        minutes: i64,
    },
    /// Restrict a daily candidate to weekdays.
    SwitchToWeekdays,
    /// Double the candidate's interval.
    WidenInterval {
        /// The proposed new interval.
        interval: u32,
    },
    /// Cancel the candidate's occurrences on the worst conflicting dates.
    CancelOccurrences {
        /// Dates to add cancellation exceptions for.
        dates: Vec<NaiveDate>,
    },
}

/// A remediation suggestion with its estimated payoff.
///
/// `estimated_reduction` is a rough proportional estimate, not a re-run of
/// detection; callers must treat it as a ranking hint, not a promise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictSuggestion {
    /// The proposed change.
    pub kind: SuggestionKind,
    /// Human-readable summary for display.
    pub description: String,
    /// Estimated number of conflicts the change would remove.
    pub estimated_reduction: usize,
}

/// The outcome of a detection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    /// True if any overlap was found.
    pub has_conflicts: bool,
    /// Every pairwise overlap, in candidate-instance order.
    pub conflicts: Vec<ConflictInstance>,
    /// Up to five remediation suggestions, best estimated payoff first.
    pub suggestions: Vec<ConflictSuggestion>,
}

impl ConflictReport {
    /// An empty, conflict-free report.
    pub fn no_conflicts() -> Self {
        Self {
            has_conflicts: false,
            conflicts: Vec::new(),
            suggestions: Vec::new(),
        }
    }
}

/// Detects conflicts between `candidate` and `existing` over `window`.
///
/// Any internal failure yields a "no conflicts" report with the cause
/// logged (fail-open).
pub fn detect(
    candidate: &RecurringSchedule,
    existing: &[RecurringSchedule],
    window: &DateWindow,
    cache: &mut InstanceCache,
) -> ConflictReport {
    match try_detect(candidate, existing, window, cache, &CancelToken::new()) {
        Ok(report) => report,
        Err(err) => {
            error!(
                candidate_id = %candidate.id,
                error = %err,
                "conflict detection failed; reporting no conflicts"
            );
            ConflictReport::no_conflicts()
        }
    }
}

/// Fallible detection, for cancellation-aware hosts.
pub fn try_detect(
    candidate: &RecurringSchedule,
    existing: &[RecurringSchedule],
    window: &DateWindow,
    cache: &mut InstanceCache,
    cancel: &CancelToken,
) -> EngineResult<ConflictReport> {
    // The candidate may be unsaved or edited, so it bypasses the cache.
    let candidate_instances = resolve(candidate, window);

    let mut conflicts = Vec::new();
    for other in existing {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        // A series does not conflict with its own persisted version.
        if other.id == candidate.id {
            continue;
        }
        let other_instances = cache.get_or_compute(other, window);
        collect_pairwise(&candidate_instances, &other_instances, &mut conflicts);
    }

    conflicts.sort_by(|a, b| a.date.cmp(&b.date).then(a.overlap_minutes.cmp(&b.overlap_minutes)));

    let suggestions = if conflicts.is_empty() {
        Vec::new()
    } else {
        suggest(&candidate.rule, &conflicts)
    };

    Ok(ConflictReport {
        has_conflicts: !conflicts.is_empty(),
        conflicts,
        suggestions,
    })
}

fn collect_pairwise(
    candidates: &[ScheduleInstance],
    others: &[ScheduleInstance],
    out: &mut Vec<ConflictInstance>,
) {
    for candidate in candidates {
        for other in others {
            if !candidate.overlaps(other) {
                continue;
            }
            let overlap_minutes = candidate.overlap_minutes(other);
            out.push(ConflictInstance {
                date: candidate.original_date,
                candidate_instance_id: candidate.id.clone(),
                existing_instance_id: other.id.clone(),
                existing_schedule_id: other.schedule_id.clone(),
                severity: severity_for(candidate, other, overlap_minutes),
                overlap_minutes,
            });
        }
    }
}

fn severity_for(a: &ScheduleInstance, b: &ScheduleInstance, overlap_minutes: i64) -> ConflictSeverity {
    let average = (a.duration_minutes() + b.duration_minutes()) as f64 / 2.0;
    if average <= 0.0 {
        return ConflictSeverity::Low;
    }
    ConflictSeverity::from_overlap_ratio(overlap_minutes as f64 / average)
}

/// Builds the suggestion list for a conflicting candidate.
///
/// Reduction numbers are heuristic estimates: a shift is credited with the
/// conflicts it could clear outright, a frequency change with a
/// proportional share. Nothing here re-runs detection.
fn suggest(rule: &RecurrenceRule, conflicts: &[ConflictInstance]) -> Vec<ConflictSuggestion> {
    let mut suggestions = Vec::new();

    // Every menu entry is offered with its own estimate; the rank-and-cap
    // step below prunes the list.
    for shift in SHIFT_MENU_MINUTES {
        // A shift at least as large as an overlap would clear it, assuming
        // nothing else occupies the target slot.
        let estimated = conflicts
            .iter()
            .filter(|c| c.overlap_minutes <= shift.abs())
            .count();
        let direction = if shift < 0 { "earlier" } else { "later" };
        suggestions.push(ConflictSuggestion {
            kind: SuggestionKind::ShiftTime { minutes: shift },
            description: format!("Move the event {} minutes {direction}", shift.abs()),
            estimated_reduction: estimated,
        });
    }

    if rule.frequency == Frequency::Daily && rule.interval == 1 {
        let weekend_conflicts = conflicts
            .iter()
            .filter(|c| is_weekend(c.date))
            .count();
        if weekend_conflicts > 0 {
            suggestions.push(ConflictSuggestion {
                kind: SuggestionKind::SwitchToWeekdays,
                description: "Repeat on weekdays only".to_string(),
                estimated_reduction: weekend_conflicts,
            });
        }
    }
    if rule.interval < u32::MAX / 2 && conflicts.len() >= 2 {
        let interval = rule.interval * 2;
        suggestions.push(ConflictSuggestion {
            kind: SuggestionKind::WidenInterval { interval },
            description: format!(
                "Repeat every {interval} {} instead",
                frequency_unit(rule.frequency)
            ),
            estimated_reduction: conflicts.len() / 2,
        });
    }

    let dates = worst_conflict_dates(conflicts);
    if !dates.is_empty() {
        let estimated = conflicts.iter().filter(|c| dates.contains(&c.date)).count();
        suggestions.push(ConflictSuggestion {
            kind: SuggestionKind::CancelOccurrences { dates: dates.clone() },
            description: format!("Skip the {} most conflicted occurrence(s)", dates.len()),
            estimated_reduction: estimated,
        });
    }

    suggestions.sort_by(|a, b| b.estimated_reduction.cmp(&a.estimated_reduction));
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

/// Picks the dates of the highest-severity conflicts, worst first, capped.
fn worst_conflict_dates(conflicts: &[ConflictInstance]) -> Vec<NaiveDate> {
    let mut ranked: Vec<&ConflictInstance> = conflicts.iter().collect();
    ranked.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(b.overlap_minutes.cmp(&a.overlap_minutes))
    });

    let mut dates = Vec::new();
    for conflict in ranked {
        if !dates.contains(&conflict.date) {
            dates.push(conflict.date);
        }
        if dates.len() == MAX_EXCEPTION_DATES {
            break;
        }
    }
    dates
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn frequency_unit(frequency: Frequency) -> &'static str {
    match frequency {
        Frequency::Daily => "days",
        Frequency::Weekly => "weeks",
        Frequency::Monthly => "months",
        Frequency::Yearly => "years",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn single(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> RecurringSchedule {
        RecurringSchedule::new(id, "team", id, start, end, RecurrenceRule::once())
    }

    fn february() -> DateWindow {
        DateWindow::for_month(2024, 2).unwrap()
    }

    mod severity {
        use super::*;

        #[test]
        fn tier_thresholds() {
            assert_eq!(ConflictSeverity::from_overlap_ratio(1.0), ConflictSeverity::High);
            assert_eq!(ConflictSeverity::from_overlap_ratio(0.8), ConflictSeverity::High);
            assert_eq!(ConflictSeverity::from_overlap_ratio(0.79), ConflictSeverity::Medium);
            assert_eq!(ConflictSeverity::from_overlap_ratio(0.5), ConflictSeverity::Medium);
            assert_eq!(ConflictSeverity::from_overlap_ratio(0.49), ConflictSeverity::Low);
            assert_eq!(ConflictSeverity::from_overlap_ratio(0.0), ConflictSeverity::Low);
        }
    }

    mod detection {
        use super::*;

        #[test]
        fn half_hour_overlap_is_medium() {
            // 10:00-11:00 vs 10:30-11:30: overlap 30, average duration 60.
            let candidate = single("new", utc(2024, 2, 1, 10, 0, 0), utc(2024, 2, 1, 11, 0, 0));
            let existing = single("old", utc(2024, 2, 1, 10, 30, 0), utc(2024, 2, 1, 11, 30, 0));

            let mut cache = InstanceCache::default();
            let report = detect(&candidate, &[existing], &february(), &mut cache);

            assert!(report.has_conflicts);
            assert_eq!(report.conflicts.len(), 1);
            let conflict = &report.conflicts[0];
            assert_eq!(conflict.overlap_minutes, 30);
            assert_eq!(conflict.severity, ConflictSeverity::Medium);
            assert_eq!(conflict.date, date(2024, 2, 1));
            assert_eq!(conflict.existing_schedule_id, "old");
        }

        #[test]
        fn identical_times_are_high_severity() {
            let candidate = single("new", utc(2024, 2, 1, 10, 0, 0), utc(2024, 2, 1, 11, 0, 0));
            let existing = single("old", utc(2024, 2, 1, 10, 0, 0), utc(2024, 2, 1, 11, 0, 0));

            let mut cache = InstanceCache::default();
            let report = detect(&candidate, &[existing], &february(), &mut cache);
            assert_eq!(report.conflicts[0].severity, ConflictSeverity::High);
        }

        #[test]
        fn disjoint_times_do_not_conflict() {
            let candidate = single("new", utc(2024, 2, 1, 8, 0, 0), utc(2024, 2, 1, 9, 0, 0));
            let existing = single("old", utc(2024, 2, 1, 9, 0, 0), utc(2024, 2, 1, 10, 0, 0));

            let mut cache = InstanceCache::default();
            let report = detect(&candidate, &[existing], &february(), &mut cache);
            assert!(!report.has_conflicts);
            assert!(report.conflicts.is_empty());
            assert!(report.suggestions.is_empty());
        }

        #[test]
        fn symmetric_roles_agree() {
            let a = single("a", utc(2024, 2, 1, 10, 0, 0), utc(2024, 2, 1, 11, 0, 0));
            let b = single("b", utc(2024, 2, 1, 10, 30, 0), utc(2024, 2, 1, 11, 30, 0));

            let mut cache = InstanceCache::default();
            let ab = detect(&a, &[b.clone()], &february(), &mut cache);
            let ba = detect(&b, &[a], &february(), &mut cache);

            assert_eq!(ab.conflicts[0].overlap_minutes, ba.conflicts[0].overlap_minutes);
            assert_eq!(ab.conflicts[0].severity, ba.conflicts[0].severity);
        }

        #[test]
        fn candidate_does_not_conflict_with_itself() {
            let candidate = single("same", utc(2024, 2, 1, 10, 0, 0), utc(2024, 2, 1, 11, 0, 0));
            let persisted = candidate.clone();

            let mut cache = InstanceCache::default();
            let report = detect(&candidate, &[persisted], &february(), &mut cache);
            assert!(!report.has_conflicts);
        }

        #[test]
        fn recurring_candidate_conflicts_on_each_shared_day() {
            let candidate = RecurringSchedule::new(
                "new",
                "team",
                "Sync",
                utc(2024, 2, 1, 10, 0, 0),
                utc(2024, 2, 1, 11, 0, 0),
                RecurrenceRule::daily().with_count(5),
            );
            let existing = RecurringSchedule::new(
                "old",
                "team",
                "Focus",
                utc(2024, 2, 1, 10, 30, 0),
                utc(2024, 2, 1, 11, 30, 0),
                RecurrenceRule::daily().with_count(3),
            );

            let mut cache = InstanceCache::default();
            let report = detect(&candidate, &[existing], &february(), &mut cache);
            assert_eq!(report.conflicts.len(), 3);
            assert!(report.conflicts.windows(2).all(|w| w[0].date <= w[1].date));
        }

        #[test]
        fn cancellation_fails_open_via_detect() {
            let candidate = single("new", utc(2024, 2, 1, 10, 0, 0), utc(2024, 2, 1, 11, 0, 0));
            let existing = single("old", utc(2024, 2, 1, 10, 0, 0), utc(2024, 2, 1, 11, 0, 0));

            let mut cache = InstanceCache::default();
            let cancel = CancelToken::new();
            cancel.cancel();
            let err = try_detect(&candidate, &[existing], &february(), &mut cache, &cancel);
            assert_eq!(err.unwrap_err(), EngineError::Cancelled);
        }
    }

    mod suggestions {
        use super::*;

        fn conflicting_daily_report() -> ConflictReport {
            let candidate = RecurringSchedule::new(
                "new",
                "team",
                "Sync",
                utc(2024, 2, 1, 10, 0, 0),
                utc(2024, 2, 1, 11, 0, 0),
                RecurrenceRule::daily().with_count(7),
            );
            let existing = RecurringSchedule::new(
                "old",
                "team",
                "Focus",
                utc(2024, 2, 1, 10, 30, 0),
                utc(2024, 2, 1, 11, 30, 0),
                RecurrenceRule::daily().with_count(7),
            );
            let mut cache = InstanceCache::default();
            detect(&candidate, &[existing], &february(), &mut cache)
        }

        #[test]
        fn capped_at_five_and_sorted() {
            let report = conflicting_daily_report();
            assert!(!report.suggestions.is_empty());
            assert!(report.suggestions.len() <= 5);
            assert!(
                report
                    .suggestions
                    .windows(2)
                    .all(|w| w[0].estimated_reduction >= w[1].estimated_reduction)
            );
        }

        fn fully_overlapping_daily_report() -> ConflictReport {
            // Three-hour meetings on identical times: no shift from the menu
            // can clear the overlap.
            let candidate = RecurringSchedule::new(
                "new",
                "team",
                "Workshop",
                utc(2024, 2, 1, 10, 0, 0),
                utc(2024, 2, 1, 13, 0, 0),
                RecurrenceRule::daily().with_count(7),
            );
            let existing = RecurringSchedule::new(
                "old",
                "team",
                "Training",
                utc(2024, 2, 1, 10, 0, 0),
                utc(2024, 2, 1, 13, 0, 0),
                RecurrenceRule::daily().with_count(7),
            );
            let mut cache = InstanceCache::default();
            detect(&candidate, &[existing], &february(), &mut cache)
        }

        #[test]
        fn menu_offers_multiple_shift_magnitudes() {
            let report = conflicting_daily_report();
            let magnitudes: std::collections::HashSet<i64> = report
                .suggestions
                .iter()
                .filter_map(|s| match s.kind {
                    SuggestionKind::ShiftTime { minutes } => Some(minutes.abs()),
                    _ => None,
                })
                .collect();
            assert!(magnitudes.len() >= 2, "expected several magnitudes: {magnitudes:?}");
            assert!(magnitudes.contains(&30));
        }

        #[test]
        fn includes_weekday_switch_for_daily_rules_hitting_weekends() {
            // 2024-02-03 and 02-04 are a weekend.
            let report = fully_overlapping_daily_report();
            let weekday_switch = report
                .suggestions
                .iter()
                .find(|s| s.kind == SuggestionKind::SwitchToWeekdays);
            assert!(weekday_switch.is_some());
            assert_eq!(weekday_switch.unwrap().estimated_reduction, 2);
        }

        #[test]
        fn exception_dates_capped_at_three() {
            let report = fully_overlapping_daily_report();
            let cancel = report.suggestions.iter().find_map(|s| match &s.kind {
                SuggestionKind::CancelOccurrences { dates } => Some(dates),
                _ => None,
            });
            let dates = cancel.expect("cancellation suggestion missing");
            assert_eq!(dates.len(), 3);
        }

        #[test]
        fn no_suggestions_without_conflicts() {
            assert!(suggest(&RecurrenceRule::daily(), &[]).is_empty());
        }
    }

    mod wire_format {
        use super::*;

        #[test]
        fn report_serializes_with_camel_case_keys() {
            let candidate = single("new", utc(2024, 2, 1, 10, 0, 0), utc(2024, 2, 1, 11, 0, 0));
            let existing = single("old", utc(2024, 2, 1, 10, 30, 0), utc(2024, 2, 1, 11, 30, 0));

            let mut cache = InstanceCache::default();
            let report = detect(&candidate, &[existing], &february(), &mut cache);

            let json = serde_json::to_value(&report).unwrap();
            assert_eq!(json["hasConflicts"], true);
            assert_eq!(json["conflicts"][0]["severity"], "medium");
            assert_eq!(json["conflicts"][0]["overlapMinutes"], 30);
            assert_eq!(json["conflicts"][0]["existingScheduleId"], "old");

            let round_trip: ConflictReport = serde_json::from_value(json).unwrap();
            assert_eq!(round_trip, report);
        }
    }
}
