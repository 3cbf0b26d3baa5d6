//! Cache store trait.
//!
//! The store is a plain key-value map from wallet to [`CacheEntry`]. It does
//! not serialize writes for the same wallet; the refresh scheduler does. It
//! does not judge staleness either: readers apply their own TTL through
//! [`CacheEntry::is_valid_at`].

use async_trait::async_trait;

use super::cache_model::CacheEntry;
use crate::errors::Result;
use crate::portfolio::Portfolio;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads the entry for a wallet. Never triggers a fetch.
    async fn get(&self, wallet: &str) -> Result<Option<CacheEntry>>;

    /// Upserts the entry for a wallet, stamping `last_updated` with the
    /// current time, and returns the stored entry.
    ///
    /// Must be safe to call concurrently for different wallets. Backing-store
    /// failures are returned, never swallowed.
    async fn put(&self, wallet: &str, portfolio: Portfolio) -> Result<CacheEntry>;

    /// Removes the entry so the next read is a miss.
    async fn invalidate(&self, wallet: &str) -> Result<()>;

    /// Removes every entry. Returns the number removed.
    async fn clear(&self) -> Result<usize>;

    /// Wallets that currently have an entry.
    async fn wallets(&self) -> Result<Vec<String>>;
}
