use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use std::sync::Arc;

use super::BalanceServiceTrait;
use crate::cache::CacheStore;
use crate::errors::{Error, Result, SchedulerError};
use crate::events::{EventBus, UpdateReason};
use crate::portfolio::Portfolio;
use crate::refresh::{
    AttemptResult, QueueStats, RefreshConfig, RefreshDeps, RefreshOptions, RefreshScheduler,
    RefreshStatus,
};

/// Balance cache facade over the refresh scheduler.
///
/// Reads come from the cache and are judged against the configured TTL.
/// Every fetch, including the one behind `get_portfolio`, goes through the
/// scheduler so that one wallet never has two writes racing.
pub struct BalanceService {
    cache: Arc<dyn CacheStore>,
    cache_ttl: chrono::Duration,
    scheduler: RefreshScheduler,
}

impl BalanceService {
    pub fn new(config: RefreshConfig, deps: RefreshDeps) -> Result<Self> {
        let cache = deps.cache.clone();
        let cache_ttl = config.cache_ttl_chrono();
        let scheduler = RefreshScheduler::new(config, deps)?;
        Ok(Self {
            cache,
            cache_ttl,
            scheduler,
        })
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }
}

#[async_trait]
impl BalanceServiceTrait for BalanceService {
    fn request_refresh(&self, wallet: &str, immediate: bool, expect_change: bool) {
        self.scheduler
            .request_refresh(wallet, immediate, expect_change);
    }

    fn request_refresh_with(&self, wallet: &str, options: RefreshOptions) {
        self.scheduler.request_refresh_with(wallet, options);
    }

    async fn get_from_cache(&self, wallet: &str) -> Result<Option<Portfolio>> {
        Ok(self
            .cache
            .get(wallet)
            .await?
            .filter(|entry| entry.is_valid_at(self.cache_ttl, Utc::now()))
            .map(|entry| entry.portfolio))
    }

    async fn get_portfolio(&self, wallet: &str, force_refresh: bool) -> Result<Portfolio> {
        if !force_refresh {
            if let Some(portfolio) = self.get_from_cache(wallet).await? {
                return Ok(portfolio);
            }
        }

        let reason = if force_refresh {
            UpdateReason::ManualRefresh
        } else {
            UpdateReason::CacheUpdate
        };
        debug!(
            "Refreshing {} for a read (forced: {})",
            wallet, force_refresh
        );
        let outcome = self
            .scheduler
            .refresh_now(wallet, RefreshOptions::default().with_reason(reason))
            .wait()
            .await;

        match outcome.result {
            AttemptResult::Updated { .. } => self
                .cache
                .get(wallet)
                .await?
                .map(|entry| entry.portfolio)
                .ok_or_else(|| {
                    Error::Unexpected(format!("Cache entry for {} missing after refresh", wallet))
                }),
            AttemptResult::Failed { message, .. } => Err(SchedulerError::RefreshFailed {
                wallet: wallet.to_string(),
                message,
            }
            .into()),
        }
    }

    fn cancel_refresh(&self, wallet: &str) -> bool {
        self.scheduler.cancel_refresh(wallet)
    }

    fn get_wallet_refresh_status(&self, wallet: &str) -> RefreshStatus {
        self.scheduler.get_status(wallet)
    }

    fn clear_all_pending_refreshes(&self) -> usize {
        self.scheduler.clear_all_pending_refreshes()
    }

    fn get_queue_stats(&self) -> QueueStats {
        self.scheduler.queue_stats()
    }

    fn event_bus(&self) -> &EventBus {
        self.scheduler.event_bus()
    }

    async fn invalidate(&self, wallet: &str) -> Result<()> {
        self.cache.invalidate(wallet).await
    }

    async fn clear_cache(&self) -> Result<usize> {
        let cleared = self.cache.clear().await?;
        info!("Cleared {} cached portfolio(s)", cleared);
        Ok(cleared)
    }

    fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
