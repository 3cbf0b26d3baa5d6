//! Service trait for wallet balances.

use async_trait::async_trait;

use crate::errors::Result;
use crate::events::EventBus;
use crate::portfolio::Portfolio;
use crate::refresh::{QueueStats, RefreshOptions, RefreshStatus};

/// Entry point for callers that read balances and trigger refreshes.
#[async_trait]
pub trait BalanceServiceTrait: Send + Sync {
    /// Schedules a debounced background refresh. Returns immediately.
    fn request_refresh(&self, wallet: &str, immediate: bool, expect_change: bool);

    /// Like [`request_refresh`](Self::request_refresh) with an explicit reason.
    fn request_refresh_with(&self, wallet: &str, options: RefreshOptions);

    /// Cached portfolio if present and within the configured TTL. Never fetches.
    async fn get_from_cache(&self, wallet: &str) -> Result<Option<Portfolio>>;

    /// Cached portfolio when valid, otherwise refresh now and return what
    /// was stored. `force_refresh` skips the cache. Joins a refresh already
    /// in flight for the wallet. A failed attempt is returned as an error.
    async fn get_portfolio(&self, wallet: &str, force_refresh: bool) -> Result<Portfolio>;

    fn cancel_refresh(&self, wallet: &str) -> bool;

    fn get_wallet_refresh_status(&self, wallet: &str) -> RefreshStatus;

    fn clear_all_pending_refreshes(&self) -> usize;

    fn get_queue_stats(&self) -> QueueStats;

    /// Bus carrying `WalletUpdated` events.
    fn event_bus(&self) -> &EventBus;

    /// Drops the cache entry so the next read misses.
    async fn invalidate(&self, wallet: &str) -> Result<()>;

    /// Drops every cache entry. Returns how many were removed.
    async fn clear_cache(&self) -> Result<usize>;

    fn shutdown(&self);
}
