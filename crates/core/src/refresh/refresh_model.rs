use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{
    DEFAULT_CACHE_TTL, DEFAULT_DEBOUNCE_DELAY, DEFAULT_EVENT_CHANNEL_CAPACITY,
    DEFAULT_IMMEDIATE_DELAY, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY,
    FIAT_EPSILON, NATIVE_EPSILON,
};
use crate::errors::{Error, Result};
use crate::events::UpdateReason;
use crate::portfolio::{ChangeBasis, ChangeDetector, PortfolioTotals};

/// Tunables for the refresh engine.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshConfig {
    /// Delay before a debounced (non-immediate) request is dispatched.
    pub debounce_delay: Duration,
    /// Delay before an immediate request is dispatched. Longer than the
    /// debounce so the upstream view can catch up with a fresh transaction.
    pub immediate_delay: Duration,
    /// Delay between retries of one logical refresh.
    pub retry_delay: Duration,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Upstream fetches allowed to run at once across all wallets.
    pub max_concurrency: usize,
    /// Cache validity window.
    pub cache_ttl: Duration,
    pub native_epsilon: Decimal,
    pub fiat_epsilon: Decimal,
    pub change_basis: ChangeBasis,
    pub event_channel_capacity: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            debounce_delay: DEFAULT_DEBOUNCE_DELAY,
            immediate_delay: DEFAULT_IMMEDIATE_DELAY,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cache_ttl: DEFAULT_CACHE_TTL,
            native_epsilon: NATIVE_EPSILON,
            fiat_epsilon: FIAT_EPSILON,
            change_basis: ChangeBasis::default(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl RefreshConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(Error::InvalidConfigValue(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.native_epsilon.is_sign_negative() || self.fiat_epsilon.is_sign_negative() {
            return Err(Error::InvalidConfigValue(
                "change epsilons must not be negative".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::InvalidConfigValue(
                "event_channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn change_detector(&self) -> ChangeDetector {
        ChangeDetector::new(self.change_basis, self.native_epsilon, self.fiat_epsilon)
    }

    /// Cache TTL as a chrono duration, saturating on overflow.
    pub fn cache_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.cache_ttl).unwrap_or(chrono::Duration::MAX)
    }
}

/// Per-request flags accepted by the scheduler.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOptions {
    /// Use the longer post-transaction delay instead of the debounce window.
    pub immediate: bool,
    /// The caller expects the balance to change; retry until it does.
    pub expect_change: bool,
    /// Reason carried by the resulting update events.
    pub reason: UpdateReason,
}

impl RefreshOptions {
    pub fn new(immediate: bool, expect_change: bool) -> Self {
        Self {
            immediate,
            expect_change,
            reason: UpdateReason::CacheUpdate,
        }
    }

    pub fn with_reason(mut self, reason: UpdateReason) -> Self {
        self.reason = reason;
        self
    }

    /// Folds a newer request into this one.
    ///
    /// Timing follows the newer request. An expected change is never
    /// forgotten and a specific reason is never downgraded to a routine one.
    pub fn merge(self, newer: RefreshOptions) -> RefreshOptions {
        RefreshOptions {
            immediate: newer.immediate,
            expect_change: self.expect_change || newer.expect_change,
            reason: if newer.reason.is_specific() || !self.reason.is_specific() {
                newer.reason
            } else {
                self.reason
            },
        }
    }
}

/// Convergence status of one logical refresh operation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceState {
    /// Another attempt is scheduled.
    Fetching,
    /// The expected change was observed.
    Converged,
    /// Retry budget spent without observing the expected change.
    Exhausted,
    /// No change was expected; single attempt.
    NotExpected,
}

impl ConvergenceState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Fetching)
    }
}

/// Introspection for a single wallet.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RefreshStatus {
    /// A debounce timer is waiting to fire.
    pub has_pending_refresh: bool,
    /// An attempt is dispatched or running.
    pub is_refreshing: bool,
    /// Attempt number of a scheduled retry, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_retry: Option<u32>,
}

/// Worker pool counters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    /// Queued plus running.
    pub pending: usize,
    /// Waiting for a free slot.
    pub queued: usize,
    /// Currently executing.
    pub running: usize,
}

/// A scheduled retry as seen from outside the scheduler.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingRetryInfo {
    pub wallet: String,
    pub attempt: u32,
    pub expect_change: bool,
    pub due_in: Duration,
}

/// What a single attempt did.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptResult {
    /// The cache was written.
    Updated {
        totals: PortfolioTotals,
        changed: bool,
        convergence: ConvergenceState,
    },
    /// Fetch or cache write failed.
    Failed {
        message: String,
        retry_scheduled: bool,
    },
}

/// Result of one refresh attempt, shared by every caller joined to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    pub wallet: String,
    /// 0 for the first attempt, n for the n-th retry.
    pub attempt: u32,
    pub result: AttemptResult,
}

impl RefreshOutcome {
    pub fn failed(wallet: impl Into<String>, attempt: u32, message: impl Into<String>) -> Self {
        Self {
            wallet: wallet.into(),
            attempt,
            result: AttemptResult::Failed {
                message: message.into(),
                retry_scheduled: false,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, AttemptResult::Updated { .. })
    }

    pub fn convergence(&self) -> Option<ConvergenceState> {
        match self.result {
            AttemptResult::Updated { convergence, .. } => Some(convergence),
            AttemptResult::Failed { .. } => None,
        }
    }
}
