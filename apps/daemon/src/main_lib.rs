use std::sync::Arc;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use walletfolio_core::cache::InMemoryCacheStore;
use walletfolio_core::events::{EventBus, Subscription};
use walletfolio_core::providers::HttpPortfolioProvider;
use walletfolio_core::refresh::RefreshDeps;
use walletfolio_core::{BalanceService, BalanceServiceTrait};

use crate::config::Config;

pub fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Wires the HTTP provider, the in-memory cache and the refresh engine.
pub fn build_service(config: &Config) -> anyhow::Result<Arc<BalanceService>> {
    let provider = Arc::new(HttpPortfolioProvider::with_timeout(
        config.provider_url.clone(),
        config.provider_timeout,
    ));
    let cache = Arc::new(InMemoryCacheStore::new());
    let event_bus = EventBus::with_capacity(config.refresh.event_channel_capacity);

    let deps = RefreshDeps::new(provider, cache, event_bus);
    let service = BalanceService::new(config.refresh.clone(), deps)?;
    tracing::info!(
        "Balance service ready (provider {}, cache TTL {:?})",
        config.provider_url,
        config.refresh.cache_ttl
    );
    Ok(Arc::new(service))
}

/// Logs every wallet update as one structured line.
pub fn log_wallet_updates(service: &BalanceService) -> Subscription {
    service.event_bus().on_wallet_updated(|event| {
        match serde_json::to_string(event) {
            Ok(json) => tracing::info!(wallet = %event.wallet, "wallet updated: {}", json),
            Err(e) => tracing::warn!("Could not serialize wallet update: {}", e),
        }
    })
}
