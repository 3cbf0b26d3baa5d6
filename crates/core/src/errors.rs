//! Core error types for the Walletfolio balance cache.
//!
//! This module defines storage-agnostic error types. Backing-store errors
//! are converted to [`CacheError`] by the store implementation, and upstream
//! failures are reported as [`ProviderError`].

use thiserror::Error;

pub use crate::providers::ProviderError;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the balance cache and refresh engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Portfolio provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Cache operation failed: {0}")]
    Cache(#[from] CacheError),

    #[error("Transaction detection failed: {0}")]
    Detector(String),

    #[error("Refresh scheduling failed: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Errors raised by a [`CacheStore`](crate::cache::CacheStore) backend.
///
/// Uses `String` details so that concrete stores can convert their own
/// error types without leaking them into the core.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The entry could not be written. Never swallowed by callers.
    #[error("Failed to write cache entry for {wallet}: {message}")]
    WriteFailed { wallet: String, message: String },

    /// The entry could not be read.
    #[error("Failed to read cache entry for {wallet}: {message}")]
    ReadFailed { wallet: String, message: String },

    /// The backing store is not reachable at all.
    #[error("Cache store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by the refresh scheduler and its worker pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Work was submitted after the worker pool was shut down.
    #[error("Worker pool is closed")]
    PoolClosed,

    /// A dispatched unit of work panicked or was dropped before completing.
    #[error("Refresh task aborted: {0}")]
    TaskAborted(String),

    /// A refresh a caller waited on did not produce a portfolio.
    #[error("Refresh for {wallet} failed: {message}")]
    RefreshFailed { wallet: String, message: String },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Unexpected(err.to_string())
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}
