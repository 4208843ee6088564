//! Core types: recurrence rules, schedules, query windows, rule descriptions

pub mod describe;
pub mod rule;
pub mod schedule;
pub mod tracing;
pub mod window;

pub use describe::{RuleDescription, describe, parse_known_phrase};
pub use rule::{Frequency, MAX_COUNT, MAX_INTERVAL, RecurrenceRule, RuleViolation};
pub use schedule::{
    ExceptionKind, InstanceOverride, RecurringSchedule, ScheduleException, ScheduleInstance,
    instance_id,
};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use window::DateWindow;
