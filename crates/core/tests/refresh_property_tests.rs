//! Property-based integration tests for the balance cache and refresh engine.
//!
//! Scheduler properties run each case on a fresh current-thread runtime with
//! a paused clock, so timing is virtual and deterministic.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use walletfolio_core::cache::{CacheEntry, InMemoryCacheStore};
use walletfolio_core::events::EventBus;
use walletfolio_core::providers::{PortfolioDataProvider, ProviderError};
use walletfolio_core::refresh::{RefreshConfig, RefreshDeps, RefreshOptions, RefreshScheduler};
use walletfolio_core::{ChangeBasis, ChangeDetector, Portfolio, TokenBalance};

// =============================================================================
// Generators
// =============================================================================

/// Decimal with up to 9 fractional digits.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (0i64..5_000_000_000_000, 0u32..=9).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

/// Mints share their decimals across snapshots, as on chain.
fn arb_tokens() -> impl Strategy<Value = Vec<TokenBalance>> {
    proptest::collection::btree_map(0usize..6, arb_amount(), 0..4).prop_map(|amounts| {
        amounts
            .into_iter()
            .map(|(i, amount)| TokenBalance {
                mint: format!("mint{}", i),
                symbol: format!("TK{}", i),
                amount,
                price: Decimal::ONE,
                native_value: Decimal::ZERO,
                fiat_value: amount,
                image: None,
                link: None,
                decimals: (i as u8) + 3,
            })
            .collect()
    })
}

fn arb_portfolio() -> impl Strategy<Value = Portfolio> {
    (arb_amount(), arb_amount(), arb_tokens())
        .prop_map(|(native, fiat, tokens)| Portfolio::new(native, fiat, tokens))
}

fn arb_basis() -> impl Strategy<Value = ChangeBasis> {
    prop_oneof![Just(ChangeBasis::Totals), Just(ChangeBasis::Holdings)]
}

// =============================================================================
// Helpers
// =============================================================================

#[derive(Default)]
struct CountingProvider {
    calls: Mutex<HashMap<String, usize>>,
    active: AtomicUsize,
    peak: AtomicUsize,
    latency: Duration,
}

#[async_trait]
impl PortfolioDataProvider for CountingProvider {
    async fn fetch(&self, wallet: &str) -> Result<Portfolio, ProviderError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(wallet.to_string())
            .or_default() += 1;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(Portfolio::empty())
    }
}

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

fn scheduler(config: RefreshConfig, provider: Arc<CountingProvider>) -> RefreshScheduler {
    let deps = RefreshDeps::new(provider, Arc::new(InMemoryCacheStore::new()), EventBus::new());
    RefreshScheduler::new(config, deps).unwrap()
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// An entry is valid exactly while its age is below the TTL.
    #[test]
    fn prop_cache_validity_matches_ttl(age_ms in 0i64..900_000, ttl_ms in 1i64..900_000) {
        let written = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let entry = CacheEntry::new("W", Portfolio::empty(), written);
        let now = written + ChronoDuration::milliseconds(age_ms);

        prop_assert_eq!(
            entry.is_valid_at(ChronoDuration::milliseconds(ttl_ms), now),
            age_ms < ttl_ms
        );
    }

    /// Whether two snapshots differ does not depend on which came first.
    #[test]
    fn prop_change_detection_is_symmetric(
        a in arb_portfolio(),
        b in arb_portfolio(),
        basis in arb_basis(),
    ) {
        let detector = ChangeDetector::new(basis, Decimal::new(1, 5), Decimal::new(1, 2));
        prop_assert_eq!(
            detector.has_changed(Some(&a), &b),
            detector.has_changed(Some(&b), &a)
        );
    }

    /// A snapshot never differs from itself.
    #[test]
    fn prop_identical_snapshots_never_change(a in arb_portfolio(), basis in arb_basis()) {
        let detector = ChangeDetector::new(basis, Decimal::new(1, 5), Decimal::new(1, 2));
        prop_assert!(!detector.has_changed(Some(&a), &a));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any burst whose gaps stay inside the debounce window costs one fetch.
    #[test]
    fn prop_debounced_burst_fetches_once(
        gaps in proptest::collection::vec(0u64..800, 1..25),
        immediate_last in any::<bool>(),
    ) {
        let rt = paused_runtime();
        let calls = rt.block_on(async move {
            let provider = Arc::new(CountingProvider::default());
            let scheduler = scheduler(RefreshConfig::default(), provider.clone());

            let last = gaps.len() - 1;
            for (i, gap) in gaps.iter().enumerate() {
                let immediate = immediate_last && i == last;
                scheduler.request_refresh("W", immediate, false);
                if i != last {
                    tokio::time::sleep(Duration::from_millis(*gap)).await;
                }
            }
            tokio::time::sleep(Duration::from_secs(10)).await;

            let count = provider.calls.lock().unwrap().get("W").copied().unwrap_or(0);
            count
        });
        prop_assert_eq!(calls, 1);
    }

    /// Concurrent fetches never exceed the ceiling and every wallet is served.
    #[test]
    fn prop_fetch_concurrency_is_bounded(
        wallet_count in 1usize..30,
        max_concurrency in 1usize..8,
        latency_ms in 1u64..500,
    ) {
        let rt = paused_runtime();
        let (peak, calls) = rt.block_on(async move {
            let provider = Arc::new(CountingProvider {
                latency: Duration::from_millis(latency_ms),
                ..Default::default()
            });
            let config = RefreshConfig {
                max_concurrency,
                ..Default::default()
            };
            let scheduler = scheduler(config, provider.clone());

            let handles: Vec<_> = (0..wallet_count)
                .map(|i| scheduler.refresh_now(&format!("W{}", i), RefreshOptions::default()))
                .collect();
            for handle in handles {
                handle.wait().await;
            }

            let calls = provider.calls.lock().unwrap().clone();
            (provider.peak.load(Ordering::SeqCst), calls)
        });

        prop_assert!(peak <= max_concurrency);
        prop_assert_eq!(peak, max_concurrency.min(wallet_count));
        prop_assert_eq!(calls.len(), wallet_count);
        prop_assert!(calls.values().all(|&n| n == 1));
    }
}
