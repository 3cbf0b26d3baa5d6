//! Background scheduler for periodic balance refreshes.
//!
//! Requests a debounced refresh for every watched wallet on a fixed
//! interval. Requests go through the scheduler like any other, so a tick
//! that lands during a user-triggered refresh costs nothing extra.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};
use walletfolio_core::BalanceServiceTrait;

/// Initial delay before the first tick, to let the process settle.
const INITIAL_DELAY_SECS: u64 = 5;

pub fn start_refresh_scheduler(
    service: Arc<dyn BalanceServiceTrait>,
    wallets: Vec<String>,
    every: Duration,
) -> Option<JoinHandle<()>> {
    if wallets.is_empty() {
        info!("No wallets to watch, periodic refresh disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        info!(
            "Refresh scheduler started for {} wallet(s) ({:?} interval)",
            wallets.len(),
            every
        );

        tokio::time::sleep(Duration::from_secs(INITIAL_DELAY_SECS)).await;

        // First tick is immediate, later ticks are `every` apart
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            run_scheduled_refresh(service.as_ref(), &wallets);
        }
    }))
}

fn run_scheduled_refresh(service: &dyn BalanceServiceTrait, wallets: &[String]) {
    debug!("Requesting scheduled refresh for {} wallet(s)", wallets.len());
    for wallet in wallets {
        service.request_refresh(wallet, false, false);
    }
    let stats = service.get_queue_stats();
    debug!(
        "Refresh queue: {} running, {} queued",
        stats.running, stats.queued
    );
}
