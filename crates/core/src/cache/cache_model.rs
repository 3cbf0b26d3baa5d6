use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::portfolio::Portfolio;

/// Cached snapshot for one wallet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub wallet: String,
    pub portfolio: Portfolio,
    pub last_updated: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(wallet: impl Into<String>, portfolio: Portfolio, last_updated: DateTime<Utc>) -> Self {
        Self {
            wallet: wallet.into(),
            portfolio,
            last_updated,
        }
    }

    /// Time elapsed since the entry was written, as seen at `now`.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_updated
    }

    /// An entry is valid while `now - last_updated < ttl`.
    pub fn is_valid_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age_at(now) < ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_at(last_updated: DateTime<Utc>) -> CacheEntry {
        CacheEntry::new("W1", Portfolio::empty(), last_updated)
    }

    #[test]
    fn test_entry_valid_inside_window() {
        let now = Utc::now();
        let entry = entry_at(now - Duration::seconds(299));
        assert!(entry.is_valid_at(Duration::minutes(5), now));
    }

    #[test]
    fn test_entry_invalid_at_exact_boundary() {
        let now = Utc::now();
        let entry = entry_at(now - Duration::minutes(5));
        assert!(!entry.is_valid_at(Duration::minutes(5), now));
    }

    #[test]
    fn test_entry_stamped_in_future_is_valid() {
        let now = Utc::now();
        let entry = entry_at(now + Duration::seconds(2));
        assert!(entry.is_valid_at(Duration::minutes(5), now));
    }
}
