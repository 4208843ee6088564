//! The engine facade: one handle over expansion, caching, and conflict
//! detection.
//!
//! [`ScheduleEngine`] owns the instance cache behind a mutex, so a single
//! engine can be shared across threads (wrapped in an `Arc`) by hosts that
//! resolve month views and run conflict checks concurrently. There is no
//! global instance; hosts construct an engine, hand it around, and drop it
//! when done, which releases the cache with it.

use std::sync::{Mutex, PoisonError};

use cadence_core::DateWindow;
use cadence_core::schedule::{RecurringSchedule, ScheduleInstance};
use chrono::Weekday;

use crate::batch::{BatchOutcome, expand_batch};
use crate::cache::{CacheConfig, CacheStats, InstanceCache};
use crate::cancel::CancelToken;
use crate::conflict::{ConflictReport, detect};
use crate::expand::ExpandOptions;

/// A thread-safe recurrence engine with a built-in instance cache.
#[derive(Debug)]
pub struct ScheduleEngine {
    cache: Mutex<InstanceCache>,
    options: ExpandOptions,
}

impl Default for ScheduleEngine {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ScheduleEngine {
    /// Creates an engine with the given cache configuration.
    pub fn new(cache_config: CacheConfig) -> Self {
        Self {
            cache: Mutex::new(InstanceCache::new(cache_config)),
            options: ExpandOptions::default(),
        }
    }

    /// Sets the first day of the week used for weekly expansion.
    pub fn with_week_start(mut self, week_start: Weekday) -> Self {
        self.options.week_start = week_start;
        self
    }

    /// Resolves a schedule's instances in `window`, served from the cache
    /// when a fresh entry exists.
    pub fn expand(
        &self,
        schedule: &RecurringSchedule,
        window: &DateWindow,
    ) -> Vec<ScheduleInstance> {
        self.lock_cache().get_or_compute(schedule, window)
    }

    /// Resolves many schedules over one window, each with its own outcome.
    ///
    /// Batch expansion bypasses the cache: month views typically arrive
    /// right after edits, when most entries would be stale anyway.
    pub fn expand_batch(
        &self,
        schedules: &[RecurringSchedule],
        window: &DateWindow,
        cancel: &CancelToken,
    ) -> BatchOutcome {
        expand_batch(schedules, window, &self.options, cancel)
    }

    /// Checks `candidate` against `existing` for overlapping instances.
    pub fn detect_conflicts(
        &self,
        candidate: &RecurringSchedule,
        existing: &[RecurringSchedule],
        window: &DateWindow,
    ) -> ConflictReport {
        detect(candidate, existing, window, &mut self.lock_cache())
    }

    /// Drops cached instances for one schedule, or for all schedules.
    pub fn invalidate(&self, schedule_id: Option<&str>) {
        self.lock_cache().invalidate(schedule_id);
    }

    /// Sweeps expired cache entries; returns how many were removed.
    pub fn cleanup(&self) -> usize {
        self.lock_cache().cleanup()
    }

    /// A snapshot of cache occupancy and hit-rate counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, InstanceCache> {
        // The cache holds no invariants a panic could break mid-update that
        // a recompute would not repair, so a poisoned lock is still usable.
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::RecurrenceRule;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use std::sync::Arc;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn standup() -> RecurringSchedule {
        RecurringSchedule::new(
            "standup",
            "team",
            "Standup",
            utc(2024, 1, 1, 10, 0, 0),
            utc(2024, 1, 1, 10, 30, 0),
            RecurrenceRule::weekdays_only(),
        )
    }

    fn january() -> DateWindow {
        DateWindow::for_month(2024, 1).unwrap()
    }

    #[test]
    fn expand_uses_the_cache() {
        let engine = ScheduleEngine::default();
        let schedule = standup();

        let first = engine.expand(&schedule, &january());
        let second = engine.expand(&schedule, &january());

        assert_eq!(first, second);
        let stats = engine.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn narrow_window_after_month_query_stays_in_bounds() {
        let engine = ScheduleEngine::default();
        let schedule = standup();

        engine.expand(&schedule, &january());

        let narrow = DateWindow::new(date(2024, 1, 10), date(2024, 1, 15));
        let instances = engine.expand(&schedule, &narrow);

        // Jan 10-12 and Jan 15 are the weekdays in that range.
        assert_eq!(instances.len(), 4);
        assert!(instances.iter().all(|i| narrow.contains(i.original_date)));
        assert_eq!(engine.cache_stats().hits, 1);
    }

    #[test]
    fn invalidate_forces_a_recompute() {
        let engine = ScheduleEngine::default();
        let schedule = standup();

        engine.expand(&schedule, &january());
        engine.invalidate(Some("standup"));
        engine.expand(&schedule, &january());

        assert_eq!(engine.cache_stats().misses, 2);
    }

    #[test]
    fn shared_across_threads() {
        let engine = Arc::new(ScheduleEngine::default());
        let schedule = standup();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let schedule = schedule.clone();
                std::thread::spawn(move || engine.expand(&schedule, &january()).len())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 23);
        }
        let stats = engine.cache_stats();
        assert_eq!(stats.hits + stats.misses, 4);
    }

    #[test]
    fn detect_conflicts_round_trips_through_the_facade() {
        let engine = ScheduleEngine::default();
        let candidate = RecurringSchedule::new(
            "review",
            "team",
            "Review",
            utc(2024, 1, 1, 10, 0, 0),
            utc(2024, 1, 1, 11, 0, 0),
            RecurrenceRule::daily().with_count(1),
        );

        let report = engine.detect_conflicts(&candidate, &[standup()], &january());
        assert!(report.has_conflicts);
    }

    #[test]
    fn batch_goes_through_the_facade() {
        let engine = ScheduleEngine::default();
        let outcome = engine.expand_batch(&[standup()], &january(), &CancelToken::new());
        assert_eq!(outcome["standup"].as_ref().unwrap().len(), 23);
    }
}
