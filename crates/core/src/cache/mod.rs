//! Wallet portfolio cache: entries, the store trait and an in-memory store.

mod cache_model;
mod cache_traits;
mod memory_store;

pub use cache_model::CacheEntry;
pub use cache_traits::CacheStore;
pub use memory_store::InMemoryCacheStore;
