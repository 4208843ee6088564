//! Instance cache with TTL, version staleness, and a memory budget.
//!
//! Expansion is cheap but not free, and an interactive month grid asks for
//! the same windows over and over. This cache memoizes resolver output keyed
//! by (schedule id, month-bucketed window). Because every window spanning
//! the same months shares one key, entries are resolved over the bucket's
//! full month span and each lookup clips the result to the window actually
//! requested. An entry is served only while all three of these hold:
//!
//! - its TTL has not elapsed,
//! - its recorded schedule version matches the schedule being queried,
//! - its generation timestamp is not older than the schedule's `updated_at`.
//!
//! Memory is bounded by an estimated byte budget; inserting past the budget
//! evicts entries oldest-generation-first until the new entry fits. The
//! owning collaborator must call [`InstanceCache::invalidate`] after every
//! persisted schedule change.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use cadence_core::schedule::{RecurringSchedule, ScheduleInstance};
use cadence_core::DateWindow;
use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, trace, warn};

use crate::resolve::resolve;

/// Rough per-instance heap cost used for the memory budget. Precision is not
/// the point; stable accounting is.
const ESTIMATED_INSTANCE_BYTES: usize = 256;

/// Fixed per-entry overhead (key, metadata, map slot).
const ENTRY_OVERHEAD_BYTES: usize = 64;

fn estimate_entry_bytes(instance_count: usize) -> usize {
    ENTRY_OVERHEAD_BYTES + instance_count * ESTIMATED_INSTANCE_BYTES
}

/// The full month span covered by a window's bucket.
///
/// Entries hold instances for this span, so every window sharing the bucket
/// can be served from the same entry after clipping.
fn bucket_span(window: &DateWindow) -> DateWindow {
    let start = window.start.with_day(1).unwrap_or(window.start);
    let end = DateWindow::for_month(window.end.year(), window.end.month())
        .map_or(window.end, |month| month.end);
    DateWindow::new(start, end)
}

fn clip_to_window(instances: &[ScheduleInstance], window: &DateWindow) -> Vec<ScheduleInstance> {
    instances
        .iter()
        .filter(|instance| window.contains(instance.original_date))
        .cloned()
        .collect()
}

/// Cache configuration.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// How long an entry may be served before it must be recomputed.
    pub ttl: Duration,
    /// Upper bound on the summed estimated entry sizes.
    pub max_memory_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_memory_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Cache key: one schedule over one month-bucketed window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    schedule_id: String,
    bucket: String,
}

/// A cached expansion result with its validity metadata.
#[derive(Debug, Clone)]
struct CacheEntry {
    instances: Vec<ScheduleInstance>,
    /// Schedule version the instances were generated from.
    schedule_version: u64,
    /// When the instances were generated (wall clock, for staleness checks).
    generated_at: DateTime<Utc>,
    /// When the entry expires (monotonic clock).
    expires_at: Instant,
    /// Estimated size charged against the memory budget.
    estimated_bytes: usize,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Size/TTL invariant check; a failing entry is treated as corrupt.
    fn is_coherent(&self) -> bool {
        self.estimated_bytes == estimate_entry_bytes(self.instances.len())
    }
}

/// Cache observability counters.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of live entries.
    pub entry_count: usize,
    /// Summed estimated entry sizes.
    pub estimated_memory_bytes: usize,
    /// Lookups served from cache.
    pub hits: u64,
    /// Lookups that recomputed.
    pub misses: u64,
    /// `hits / (hits + misses)`, or zero before any lookup.
    pub hit_rate: f64,
}

/// Memoizes resolver output per (schedule, window bucket).
///
/// The cache is an explicitly constructed, owned service: hosts create one,
/// hand it to the engine, and drop it when done. There is no global
/// instance, and no coherence with caches in other processes.
#[derive(Debug)]
pub struct InstanceCache {
    config: CacheConfig,
    entries: HashMap<CacheKey, CacheEntry>,
    total_bytes: usize,
    hits: u64,
    misses: u64,
}

impl Default for InstanceCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl InstanceCache {
    /// Creates an empty cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            total_bytes: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Returns the cached instances for (schedule, window), recomputing on
    /// miss, expiry, or staleness. Output is always clipped to `window`,
    /// regardless of the span the underlying entry was resolved over.
    pub fn get_or_compute(
        &mut self,
        schedule: &RecurringSchedule,
        window: &DateWindow,
    ) -> Vec<ScheduleInstance> {
        let key = CacheKey {
            schedule_id: schedule.id.clone(),
            bucket: window.month_bucket(),
        };

        if let Some(entry) = self.entries.get(&key) {
            if !entry.is_coherent() {
                warn!(
                    schedule_id = %key.schedule_id,
                    bucket = %key.bucket,
                    "cache entry failed its size invariant; evicting"
                );
                self.remove_entry(&key);
            } else if entry.is_expired() {
                trace!(schedule_id = %key.schedule_id, bucket = %key.bucket, "cache entry expired");
                self.remove_entry(&key);
            } else if entry.schedule_version != schedule.version
                || entry.generated_at < schedule.updated_at
            {
                trace!(
                    schedule_id = %key.schedule_id,
                    cached_version = entry.schedule_version,
                    current_version = schedule.version,
                    "cache entry is stale"
                );
                self.remove_entry(&key);
            } else {
                self.hits += 1;
                return clip_to_window(&entry.instances, window);
            }
        }

        self.misses += 1;
        let instances = resolve(schedule, &bucket_span(window));
        let clipped = clip_to_window(&instances, window);
        self.insert(key, schedule.version, instances);
        clipped
    }

    /// Removes all entries for one schedule, or every entry when `None`.
    pub fn invalidate(&mut self, schedule_id: Option<&str>) {
        match schedule_id {
            Some(id) => {
                let keys: Vec<CacheKey> = self
                    .entries
                    .keys()
                    .filter(|key| key.schedule_id == id)
                    .cloned()
                    .collect();
                for key in &keys {
                    self.remove_entry(key);
                }
                debug!(schedule_id = %id, removed = keys.len(), "Invalidated cache entries");
            }
            None => {
                let count = self.entries.len();
                self.entries.clear();
                self.total_bytes = 0;
                debug!(count = count, "Cleared all cache entries");
            }
        }
    }

    /// Removes all TTL-expired entries. Intended to run on a periodic timer.
    pub fn cleanup(&mut self) -> usize {
        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            trace!(schedule_id = %key.schedule_id, bucket = %key.bucket, "Evicting expired cache entry");
            self.remove_entry(key);
        }
        if !expired.is_empty() {
            debug!(evicted = expired.len(), "Evicted expired cache entries");
        }
        expired.len()
    }

    /// Returns current counters.
    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        };
        CacheStats {
            entry_count: self.entries.len(),
            estimated_memory_bytes: self.total_bytes,
            hits: self.hits,
            misses: self.misses,
            hit_rate,
        }
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, key: CacheKey, schedule_version: u64, instances: Vec<ScheduleInstance>) {
        let cost = estimate_entry_bytes(instances.len());
        if cost > self.config.max_memory_bytes {
            debug!(
                schedule_id = %key.schedule_id,
                cost = cost,
                budget = self.config.max_memory_bytes,
                "expansion larger than the whole cache budget; not caching"
            );
            return;
        }

        // Replacing an existing entry releases its charge first.
        self.remove_entry(&key);

        while self.total_bytes + cost > self.config.max_memory_bytes {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.generated_at)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            trace!(schedule_id = %oldest.schedule_id, bucket = %oldest.bucket, "Evicting for memory budget");
            self.remove_entry(&oldest);
        }

        self.entries.insert(
            key,
            CacheEntry {
                instances,
                schedule_version,
                generated_at: Utc::now(),
                expires_at: Instant::now() + self.config.ttl,
                estimated_bytes: cost,
            },
        );
        self.total_bytes += cost;
    }

    fn remove_entry(&mut self, key: &CacheKey) {
        if let Some(entry) = self.entries.remove(key) {
            self.total_bytes = self.total_bytes.saturating_sub(entry.estimated_bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::RecurrenceRule;
    use chrono::{NaiveDate, TimeZone};
    use std::thread;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn schedule(id: &str, count: u32) -> RecurringSchedule {
        RecurringSchedule::new(
            id,
            "team",
            "Standup",
            utc(2024, 1, 1, 10, 0, 0),
            utc(2024, 1, 1, 10, 30, 0),
            RecurrenceRule::daily().with_count(count),
        )
    }

    fn january() -> DateWindow {
        DateWindow::for_month(2024, 1).unwrap()
    }

    #[test]
    fn miss_then_hit() {
        let mut cache = InstanceCache::default();
        let sched = schedule("s1", 5);

        let first = cache.get_or_compute(&sched, &january());
        assert_eq!(first.len(), 5);
        let second = cache.get_or_compute(&sched, &january());
        assert_eq!(first, second);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn different_windows_use_different_entries() {
        let mut cache = InstanceCache::default();
        let sched = schedule("s1", 90);

        cache.get_or_compute(&sched, &january());
        cache.get_or_compute(&sched, &DateWindow::for_month(2024, 2).unwrap());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn narrow_window_after_full_month_is_clipped() {
        let mut cache = InstanceCache::default();
        let sched = schedule("s1", 31);

        assert_eq!(cache.get_or_compute(&sched, &january()).len(), 31);

        // Same month bucket, tighter bounds: served from the cached entry
        // but clipped to the requested window.
        let narrow = DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        );
        let instances = cache.get_or_compute(&sched, &narrow);

        assert_eq!(instances.len(), 6);
        assert!(instances.iter().all(|i| narrow.contains(i.original_date)));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn full_month_after_narrow_window_is_complete() {
        let mut cache = InstanceCache::default();
        let sched = schedule("s1", 31);

        let narrow = DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        );
        assert_eq!(cache.get_or_compute(&sched, &narrow).len(), 6);

        // The entry spans the whole bucket, so widening back to the full
        // month must not lose the occurrences outside the first window.
        let full = cache.get_or_compute(&sched, &january());
        assert_eq!(full.len(), 31);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn version_bump_invalidates_transparently() {
        let mut cache = InstanceCache::default();
        let sched = schedule("s1", 5);

        let before = cache.get_or_compute(&sched, &january());
        assert_eq!(before.len(), 5);

        let edited = sched.cancel_occurrence(
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
            utc(2024, 1, 2, 0, 0, 0),
        );
        let after = cache.get_or_compute(&edited, &january());
        assert_eq!(after.len(), 4);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn explicit_invalidation_by_id() {
        let mut cache = InstanceCache::default();
        cache.get_or_compute(&schedule("s1", 5), &january());
        cache.get_or_compute(&schedule("s2", 5), &january());

        cache.invalidate(Some("s1"));
        assert_eq!(cache.len(), 1);

        cache.invalidate(None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().estimated_memory_bytes, 0);
    }

    #[test]
    fn ttl_expiry_forces_recompute() {
        let mut cache = InstanceCache::new(CacheConfig {
            ttl: Duration::from_millis(50),
            ..CacheConfig::default()
        });
        let sched = schedule("s1", 5);

        cache.get_or_compute(&sched, &january());
        thread::sleep(Duration::from_millis(60));
        cache.get_or_compute(&sched, &january());

        assert_eq!(cache.stats().misses, 2);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn cleanup_sweeps_expired_entries() {
        let mut cache = InstanceCache::new(CacheConfig {
            ttl: Duration::from_millis(50),
            ..CacheConfig::default()
        });
        cache.get_or_compute(&schedule("s1", 5), &january());
        cache.get_or_compute(&schedule("s2", 5), &january());

        thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.cleanup(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn memory_budget_is_never_exceeded() {
        // Room for roughly two 31-instance entries.
        let budget = 2 * estimate_entry_bytes(31) + 10;
        let mut cache = InstanceCache::new(CacheConfig {
            ttl: Duration::from_secs(300),
            max_memory_bytes: budget,
        });

        for n in 0..6 {
            let sched = schedule(&format!("s{n}"), 31);
            cache.get_or_compute(&sched, &january());
            assert!(cache.stats().estimated_memory_bytes <= budget);
        }
        assert!(cache.len() <= 2);
    }

    #[test]
    fn oversized_result_is_returned_but_not_cached() {
        let mut cache = InstanceCache::new(CacheConfig {
            ttl: Duration::from_secs(300),
            max_memory_bytes: estimate_entry_bytes(2),
        });
        let sched = schedule("s1", 31);

        let instances = cache.get_or_compute(&sched, &january());
        assert_eq!(instances.len(), 31);
        assert!(cache.is_empty());
    }

    #[test]
    fn stats_start_at_zero() {
        let cache = InstanceCache::default();
        let stats = cache.stats();
        assert_eq!(stats.entry_count, 0);
        assert_eq!(stats.estimated_memory_bytes, 0);
        assert!((stats.hit_rate - 0.0).abs() < f64::EPSILON);
    }
}
