//! Refresh coordination: debouncing, single-flight dispatch, bounded
//! concurrency and convergence retries.

mod convergence;
mod refresh_model;
mod scheduler;
mod timers;
mod worker_pool;


pub use convergence::{ConvergenceController, ConvergenceDecision};
pub use refresh_model::{
    AttemptResult, ConvergenceState, PendingRetryInfo, QueueStats, RefreshConfig, RefreshOptions,
    RefreshOutcome, RefreshStatus,
};
pub use scheduler::{RefreshDeps, RefreshHandle, RefreshScheduler};
pub use timers::KeyedTimers;
pub use worker_pool::WorkerPool;
