//! Recurrence engine: occurrence expansion, instance resolution, caching,
//! and conflict detection over [`cadence_core`] schedules.

pub mod batch;
pub mod cache;
pub mod cancel;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod expand;
pub mod resolve;

pub use batch::{BatchOutcome, expand_batch};
pub use cache::{CacheConfig, CacheStats, InstanceCache};
pub use cancel::CancelToken;
pub use conflict::{
    ConflictInstance, ConflictReport, ConflictSeverity, ConflictSuggestion, SuggestionKind, detect,
    try_detect,
};
pub use engine::ScheduleEngine;
pub use error::{EngineError, EngineResult};
pub use expand::{ExpandOptions, expand, expand_with};
pub use resolve::{resolve, try_resolve};
