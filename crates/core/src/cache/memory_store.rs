//! In-memory cache store.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use log::debug;

use super::cache_model::CacheEntry;
use super::cache_traits::CacheStore;
use crate::errors::Result;
use crate::portfolio::Portfolio;

/// Process-local [`CacheStore`] backed by a concurrent map.
///
/// Entries live until invalidated or cleared; staleness is decided by the
/// reader's TTL, never by eviction.
pub struct InMemoryCacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, wallet: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(wallet).map(|e| e.value().clone()))
    }

    async fn put(&self, wallet: &str, portfolio: Portfolio) -> Result<CacheEntry> {
        let mut slot = self
            .entries
            .entry(wallet.to_string())
            .or_insert_with(|| CacheEntry::new(wallet, Portfolio::empty(), Utc::now()));

        // last_updated never moves backwards, even if the wall clock does
        let now = Utc::now().max(slot.last_updated);
        slot.portfolio = portfolio;
        slot.last_updated = now;

        debug!("Cached portfolio for {} at {}", wallet, now);
        Ok(slot.value().clone())
    }

    async fn invalidate(&self, wallet: &str) -> Result<()> {
        if self.entries.remove(wallet).is_some() {
            debug!("Invalidated cache entry for {}", wallet);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<usize> {
        let count = self.entries.len();
        self.entries.clear();
        debug!("Cleared {} cache entries", count);
        Ok(count)
    }

    async fn wallets(&self) -> Result<Vec<String>> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }
}
