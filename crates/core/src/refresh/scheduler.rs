//! Refresh scheduler.
//!
//! Turns refresh requests into upstream fetches:
//!
//! 1. Requests for a wallet are debounced. A new request replaces the
//!    pending timer and folds its options into the pending ones.
//! 2. When a timer fires the wallet is dispatched to the worker pool. A
//!    wallet already in flight is joined instead of fetched twice.
//! 3. Each attempt reads the previous cache entry, fetches, writes the
//!    cache, compares, emits one event and asks the convergence controller
//!    whether to retry.
//!
//! All per-wallet bookkeeping (debounce timers, retries, in-flight markers)
//! lives behind one mutex so that a timer firing and the wallet being marked
//! in flight are a single step.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::convergence::{ConvergenceController, ConvergenceDecision};
use super::refresh_model::{
    AttemptResult, PendingRetryInfo, QueueStats, RefreshConfig, RefreshOptions, RefreshOutcome,
    RefreshStatus,
};
use super::timers::KeyedTimers;
use super::worker_pool::WorkerPool;
use crate::cache::{CacheEntry, CacheStore};
use crate::errors::{Result, SchedulerError};
use crate::events::{EventBus, UpdateReason, WalletUpdated};
use crate::portfolio::ChangeDetector;
use crate::providers::{
    ExternalTransactionDetector, NoOpTransactionDetector, PortfolioDataProvider,
};

/// Collaborators the scheduler drives.
pub struct RefreshDeps {
    pub provider: Arc<dyn PortfolioDataProvider>,
    pub cache: Arc<dyn CacheStore>,
    pub event_bus: EventBus,
    pub detector: Arc<dyn ExternalTransactionDetector>,
}

impl RefreshDeps {
    /// Dependencies without deposit detection.
    pub fn new(
        provider: Arc<dyn PortfolioDataProvider>,
        cache: Arc<dyn CacheStore>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            provider,
            cache,
            event_bus,
            detector: Arc::new(NoOpTransactionDetector),
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn ExternalTransactionDetector>) -> Self {
        self.detector = detector;
        self
    }
}

/// Awaitable result of one dispatched attempt.
///
/// Clones share the same attempt; every caller joined to an in-flight
/// refresh observes the same [`RefreshOutcome`].
#[derive(Clone)]
pub struct RefreshHandle {
    id: u64,
    attempt: u32,
    outcome: Shared<BoxFuture<'static, RefreshOutcome>>,
}

impl RefreshHandle {
    fn from_receiver(
        id: u64,
        wallet: String,
        attempt: u32,
        receiver: oneshot::Receiver<RefreshOutcome>,
    ) -> Self {
        let outcome = async move {
            receiver.await.unwrap_or_else(|_| {
                let err = SchedulerError::TaskAborted(format!("attempt {} for {}", attempt, wallet));
                RefreshOutcome::failed(wallet, attempt, err.to_string())
            })
        }
        .boxed()
        .shared();
        Self {
            id,
            attempt,
            outcome,
        }
    }

    fn ready(id: u64, outcome: RefreshOutcome) -> Self {
        Self {
            id,
            attempt: outcome.attempt,
            outcome: futures::future::ready(outcome).boxed().shared(),
        }
    }

    /// 0 for a first attempt, n for the n-th retry.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// True when both handles refer to the same attempt.
    pub fn same_attempt(&self, other: &RefreshHandle) -> bool {
        self.id == other.id
    }

    pub async fn wait(&self) -> RefreshOutcome {
        self.outcome.clone().await
    }
}

impl std::fmt::Debug for RefreshHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshHandle")
            .field("id", &self.id)
            .field("attempt", &self.attempt)
            .finish()
    }
}

#[derive(Clone, Copy, Debug)]
struct PendingRetry {
    attempt: u32,
    options: RefreshOptions,
}

struct InFlight {
    id: u64,
    handle: RefreshHandle,
    /// Upgradable while the attempt's future exists, whether or not it has
    /// started. A queued job dropped by the pool leaves this dead.
    alive: Weak<()>,
}

impl InFlight {
    fn is_alive(&self) -> bool {
        self.alive.strong_count() > 0
    }
}

#[derive(Default)]
struct SchedulerState {
    debounce: KeyedTimers<RefreshOptions>,
    retries: KeyedTimers<PendingRetry>,
    in_flight: HashMap<String, InFlight>,
}

impl SchedulerState {
    /// The wallet's in-flight attempt, dropping a marker whose attempt went
    /// away without completing.
    fn live_in_flight(&mut self, wallet: &str) -> Option<&InFlight> {
        if self.in_flight.get(wallet).is_some_and(|f| !f.is_alive()) {
            debug!("Discarding stale in-flight marker for {}", wallet);
            self.in_flight.remove(wallet);
        }
        self.in_flight.get(wallet)
    }
}

struct SchedulerInner {
    config: RefreshConfig,
    provider: Arc<dyn PortfolioDataProvider>,
    cache: Arc<dyn CacheStore>,
    event_bus: EventBus,
    detector: Arc<dyn ExternalTransactionDetector>,
    pool: WorkerPool,
    convergence: ConvergenceController,
    change_detector: ChangeDetector,
    state: Mutex<SchedulerState>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// Debounced, single-flight refresh coordinator.
///
/// Cheap to clone; clones share state. Must be created inside a tokio
/// runtime.
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
}

impl RefreshScheduler {
    pub fn new(config: RefreshConfig, deps: RefreshDeps) -> Result<Self> {
        config.validate()?;

        info!(
            "Starting refresh scheduler (concurrency {}, debounce {:?}, retries {} x {:?})",
            config.max_concurrency, config.debounce_delay, config.max_retries, config.retry_delay
        );

        let inner = SchedulerInner {
            pool: WorkerPool::new(config.max_concurrency),
            convergence: ConvergenceController::new(config.max_retries, config.retry_delay),
            change_detector: config.change_detector(),
            provider: deps.provider,
            cache: deps.cache,
            event_bus: deps.event_bus,
            detector: deps.detector,
            state: Mutex::new(SchedulerState::default()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            config,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.inner.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    /// Debounced refresh with a routine reason.
    pub fn request_refresh(&self, wallet: &str, immediate: bool, expect_change: bool) {
        self.request_refresh_with(wallet, RefreshOptions::new(immediate, expect_change));
    }

    /// Debounced refresh.
    ///
    /// Replaces any pending timer for the wallet. The delay follows this
    /// request; `expect_change` and a specific reason carry over from the
    /// replaced one.
    pub fn request_refresh_with(&self, wallet: &str, options: RefreshOptions) {
        if self.inner.is_closed() {
            debug!("Ignoring refresh request for {} after shutdown", wallet);
            return;
        }

        let mut state = self.inner.lock_state();
        let options = match state.debounce.get(wallet) {
            Some(pending) => pending.merge(options),
            None => options,
        };
        let delay = if options.immediate {
            self.inner.config.immediate_delay
        } else {
            self.inner.config.debounce_delay
        };

        let id = self.inner.next_id();
        let inner = Arc::clone(&self.inner);
        let key = wallet.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.on_debounce_elapsed(&key, id);
        });

        let replaced = state.debounce.insert(
            wallet,
            id,
            Instant::now() + delay,
            options,
            task.abort_handle(),
        );
        debug!(
            "Refresh for {} scheduled in {:?} (expect_change: {}, replaced: {})",
            wallet,
            delay,
            options.expect_change,
            replaced.is_some()
        );
    }

    /// Dispatches a first attempt right away, bypassing the debounce.
    ///
    /// Joins the in-flight attempt if there is one. A scheduled retry for
    /// the wallet is superseded: this attempt takes over its attempt number
    /// and options.
    pub fn refresh_now(&self, wallet: &str, options: RefreshOptions) -> RefreshHandle {
        self.inner.dispatch_first(wallet, options)
    }

    /// Cancels the pending debounce timer. In-flight work is unaffected.
    pub fn cancel_refresh(&self, wallet: &str) -> bool {
        let cancelled = self.inner.lock_state().debounce.cancel(wallet).is_some();
        if cancelled {
            debug!("Cancelled pending refresh for {}", wallet);
        }
        cancelled
    }

    /// Cancels a scheduled retry, ending that refresh's convergence chain.
    pub fn cancel_retry(&self, wallet: &str) -> bool {
        let cancelled = self.inner.lock_state().retries.cancel(wallet).is_some();
        if cancelled {
            debug!("Cancelled pending retry for {}", wallet);
        }
        cancelled
    }

    pub fn get_status(&self, wallet: &str) -> RefreshStatus {
        let mut state = self.inner.lock_state();
        RefreshStatus {
            has_pending_refresh: state.debounce.contains(wallet),
            is_refreshing: state.live_in_flight(wallet).is_some(),
            pending_retry: state.retries.get(wallet).map(|retry| retry.attempt),
        }
    }

    /// Cancels every debounce timer and scheduled retry. In-flight work is
    /// unaffected. Returns how many timers were cancelled.
    pub fn clear_all_pending_refreshes(&self) -> usize {
        let mut state = self.inner.lock_state();
        let cleared = state.debounce.cancel_all() + state.retries.cancel_all();
        if cleared > 0 {
            info!("Cleared {} pending refresh timer(s)", cleared);
        }
        cleared
    }

    pub fn pending_retries(&self) -> Vec<PendingRetryInfo> {
        let state = self.inner.lock_state();
        let mut retries: Vec<PendingRetryInfo> = state
            .retries
            .iter()
            .map(|(wallet, retry)| PendingRetryInfo {
                wallet: wallet.to_string(),
                attempt: retry.attempt,
                expect_change: retry.options.expect_change,
                due_in: state.retries.remaining(wallet).unwrap_or(Duration::ZERO),
            })
            .collect();
        retries.sort_by(|a, b| a.wallet.cmp(&b.wallet));
        retries
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.inner.pool.stats()
    }

    /// Stops accepting requests, cancels timers and closes the pool.
    /// Attempts already running finish but schedule no retries.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let cleared = self.clear_all_pending_refreshes();
        self.inner.pool.shutdown();
        info!(
            "Refresh scheduler shut down ({} pending timer(s) dropped)",
            cleared
        );
    }
}

impl SchedulerInner {
    /// Lock scheduler state, recovering from poison if necessary.
    ///
    /// Nothing that can panic runs while the lock is held, so the maps are
    /// consistent even after a poisoning panic elsewhere.
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Refresh scheduler mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn on_debounce_elapsed(self: &Arc<Self>, wallet: &str, id: u64) {
        let options = self.lock_state().debounce.take_if_current(wallet, id);
        if let Some(options) = options {
            debug!("Debounce elapsed for {}", wallet);
            // Nobody waits on a debounced refresh; the outcome goes out as events.
            let _ = self.dispatch_first(wallet, options);
        }
    }

    fn on_retry_elapsed(self: &Arc<Self>, wallet: &str, id: u64) {
        let mut state = self.lock_state();
        // A fresh attempt cancels the retry before it starts, so the wallet is
        // never in flight here.
        let Some(retry) = state.retries.take_if_current(wallet, id) else {
            return;
        };
        debug!("Retry {} elapsed for {}", retry.attempt, wallet);
        let _ = self.start_attempt(&mut state, wallet, retry.attempt, retry.options);
    }

    fn dispatch_first(self: &Arc<Self>, wallet: &str, options: RefreshOptions) -> RefreshHandle {
        let mut state = self.lock_state();

        if let Some(existing) = state.live_in_flight(wallet) {
            debug!("Joining in-flight refresh for {}", wallet);
            return existing.handle.clone();
        }

        match state.retries.cancel(wallet) {
            Some(pending) => {
                debug!(
                    "Fresh refresh for {} supersedes scheduled retry {}",
                    wallet, pending.attempt
                );
                let options = pending.options.merge(options);
                self.start_attempt(&mut state, wallet, pending.attempt, options)
            }
            None => self.start_attempt(&mut state, wallet, 0, options),
        }
    }

    /// Submits one attempt and marks the wallet in flight.
    ///
    /// Runs under the state lock, so the attempt cannot complete (and clear
    /// its marker) before the marker exists.
    fn start_attempt(
        self: &Arc<Self>,
        state: &mut SchedulerState,
        wallet: &str,
        attempt: u32,
        options: RefreshOptions,
    ) -> RefreshHandle {
        let id = self.next_id();
        let inner = Arc::clone(self);
        let key = wallet.to_string();
        let token = Arc::new(());
        let alive = Arc::downgrade(&token);

        let work = async move {
            let _token = token;
            let run = AssertUnwindSafe(inner.run_attempt(&key, attempt, options))
                .catch_unwind()
                .await;
            let (mut result, decision) = match run {
                Ok(finished) => finished,
                Err(_) => {
                    let decision = inner.convergence.after_failure(attempt);
                    error!("Refresh attempt {} for {} panicked", attempt, key);
                    let err = SchedulerError::TaskAborted(format!(
                        "attempt {} for {} panicked",
                        attempt, key
                    ));
                    (
                        AttemptResult::Failed {
                            message: err.to_string(),
                            retry_scheduled: false,
                        },
                        decision,
                    )
                }
            };
            let scheduled = inner.complete_attempt(&key, id, options, decision);
            if let AttemptResult::Failed {
                retry_scheduled, ..
            } = &mut result
            {
                *retry_scheduled = scheduled;
            }
            RefreshOutcome {
                wallet: key,
                attempt,
                result,
            }
        };

        match self.pool.submit(work) {
            Ok(receiver) => {
                let handle = RefreshHandle::from_receiver(id, wallet.to_string(), attempt, receiver);
                state.in_flight.insert(
                    wallet.to_string(),
                    InFlight {
                        id,
                        handle: handle.clone(),
                        alive,
                    },
                );
                handle
            }
            Err(err) => {
                warn!("Could not dispatch refresh for {}: {}", wallet, err);
                RefreshHandle::ready(id, RefreshOutcome::failed(wallet, attempt, err.to_string()))
            }
        }
    }

    async fn run_attempt(
        &self,
        wallet: &str,
        attempt: u32,
        options: RefreshOptions,
    ) -> (AttemptResult, ConvergenceDecision) {
        debug!(
            "Refreshing {} (attempt {}, expect_change: {})",
            wallet, attempt, options.expect_change
        );

        match self.fetch_and_store(wallet).await {
            Ok((entry, changed)) => {
                let decision =
                    self.convergence
                        .after_success(options.expect_change, changed, attempt);
                let convergence = decision.state();
                let totals = entry.portfolio.totals();

                match decision {
                    ConvergenceDecision::Converged => {
                        info!("Balance change for {} visible after attempt {}", wallet, attempt)
                    }
                    ConvergenceDecision::Exhausted => warn!(
                        "Expected balance change for {} not visible after {} attempt(s)",
                        wallet,
                        attempt + 1
                    ),
                    _ => {}
                }

                self.event_bus.emit(
                    WalletUpdated::new(wallet, options.reason)
                        .with_totals(totals)
                        .with_convergence(convergence),
                );
                self.surface_deposits(wallet).await;

                (
                    AttemptResult::Updated {
                        totals,
                        changed,
                        convergence,
                    },
                    decision,
                )
            }
            Err(err) => {
                let decision = self.convergence.after_failure(attempt);
                match decision {
                    ConvergenceDecision::Exhausted => error!(
                        "Refresh for {} failed on attempt {}, giving up: {}",
                        wallet, attempt, err
                    ),
                    _ => warn!(
                        "Refresh for {} failed on attempt {}: {}",
                        wallet, attempt, err
                    ),
                }
                (
                    AttemptResult::Failed {
                        message: err.to_string(),
                        retry_scheduled: false,
                    },
                    decision,
                )
            }
        }
    }

    /// Reads the previous entry, fetches, writes. Returns the written entry
    /// and whether it differs from the previous one.
    async fn fetch_and_store(&self, wallet: &str) -> Result<(CacheEntry, bool)> {
        let previous = self.cache.get(wallet).await?;
        let portfolio = self.provider.fetch(wallet).await?;
        let entry = self.cache.put(wallet, portfolio).await?;
        let changed = self
            .change_detector
            .has_changed(previous.as_ref().map(|p| &p.portfolio), &entry.portfolio);
        Ok((entry, changed))
    }

    async fn surface_deposits(&self, wallet: &str) {
        match self.detector.check_for_deposits(wallet).await {
            Ok(transfers) => {
                for transfer in transfers {
                    debug!(
                        "Deposit {} of {} {} detected for {}",
                        transfer.tx_hash, transfer.amount, transfer.mint, wallet
                    );
                    self.event_bus.emit(
                        WalletUpdated::new(wallet, UpdateReason::ExternalTransaction)
                            .with_tx_hash(transfer.tx_hash),
                    );
                }
            }
            Err(err) => warn!("Deposit check for {} failed: {}", wallet, err),
        }
    }

    /// Clears the in-flight marker and schedules the retry, if any, in one
    /// step. Returns whether a retry was scheduled.
    fn complete_attempt(
        self: &Arc<Self>,
        wallet: &str,
        id: u64,
        options: RefreshOptions,
        decision: ConvergenceDecision,
    ) -> bool {
        let mut state = self.lock_state();

        if state.in_flight.get(wallet).map(|f| f.id) == Some(id) {
            state.in_flight.remove(wallet);
        }

        let ConvergenceDecision::Retry {
            next_attempt,
            delay,
        } = decision
        else {
            return false;
        };
        if self.is_closed() {
            debug!("Not retrying {} after shutdown", wallet);
            return false;
        }

        let retry_id = self.next_id();
        let inner = Arc::clone(self);
        let key = wallet.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.on_retry_elapsed(&key, retry_id);
        });
        state.retries.insert(
            wallet,
            retry_id,
            Instant::now() + delay,
            PendingRetry {
                attempt: next_attempt,
                options,
            },
            task.abort_handle(),
        );
        debug!(
            "Retry {} for {} scheduled in {:?}",
            next_attempt, wallet, delay
        );
        true
    }
}
