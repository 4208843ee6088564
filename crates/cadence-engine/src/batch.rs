//! Batch expansion across many schedules.
//!
//! Month views resolve every schedule on a calendar at once. The batch API
//! keeps per-schedule outcomes independent: one degenerate rule must not
//! empty the whole view, so each schedule gets its own `Result` in the
//! returned map. Cancellation is honoured between schedules and inside
//! each expansion; schedules not yet started when the token flips are
//! recorded as cancelled rather than silently missing.

use std::collections::HashMap;

use cadence_core::DateWindow;
use cadence_core::schedule::{RecurringSchedule, ScheduleInstance};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::{EngineError, EngineResult};
use crate::expand::ExpandOptions;
use crate::resolve::try_resolve;

/// Per-schedule results of a batch expansion, keyed by schedule id.
pub type BatchOutcome = HashMap<String, EngineResult<Vec<ScheduleInstance>>>;

/// Resolves every schedule in `schedules` over `window`, independently.
///
/// Failures are recorded per schedule and never abort the batch. When
/// `cancel` fires, schedules already resolved keep their results and every
/// remaining schedule is marked [`EngineError::Cancelled`].
pub fn expand_batch(
    schedules: &[RecurringSchedule],
    window: &DateWindow,
    options: &ExpandOptions,
    cancel: &CancelToken,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::with_capacity(schedules.len());

    for (index, schedule) in schedules.iter().enumerate() {
        if cancel.is_cancelled() {
            debug!(
                resolved = index,
                remaining = schedules.len() - index,
                "batch expansion cancelled"
            );
            for unprocessed in &schedules[index..] {
                outcome.insert(unprocessed.id.clone(), Err(EngineError::Cancelled));
            }
            break;
        }
        outcome.insert(
            schedule.id.clone(),
            try_resolve(schedule, window, options, cancel),
        );
    }

    outcome
}
