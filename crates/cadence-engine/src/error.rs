//! Engine error types.

use cadence_core::RuleViolation;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while expanding or detecting.
///
/// Public entry points swallow these at the boundary: expansion degrades to
/// an empty instance list and conflict detection fails open to "no
/// conflicts", each with a logged cause. The typed variants exist for the
/// `try_` functions and the batch success/failure map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The recurrence rule failed structural validation.
    #[error("recurrence rule is invalid: {}", summarize(.0))]
    InvalidRule(Vec<RuleViolation>),

    /// The operation was cancelled via its [`crate::CancelToken`].
    #[error("operation cancelled")]
    Cancelled,
}

fn summarize(violations: &[RuleViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
