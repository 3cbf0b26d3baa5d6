use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use walletfolio_core::refresh::RefreshConfig;

pub struct Config {
    pub provider_url: String,
    pub provider_timeout: Duration,
    pub watch_wallets: Vec<String>,
    pub refresh_interval: Duration,
    pub log_format: String,
    pub refresh: RefreshConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let provider_url = lookup("WLF_PROVIDER_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| anyhow!("WLF_PROVIDER_URL must be set"))?;
        let watch_wallets = lookup("WLF_WATCH_WALLETS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let defaults = RefreshConfig::default();
        let refresh = RefreshConfig {
            debounce_delay: Duration::from_millis(parse_or(
                &lookup,
                "WLF_DEBOUNCE_MS",
                defaults.debounce_delay.as_millis() as u64,
            )?),
            immediate_delay: Duration::from_millis(parse_or(
                &lookup,
                "WLF_IMMEDIATE_DELAY_MS",
                defaults.immediate_delay.as_millis() as u64,
            )?),
            retry_delay: Duration::from_millis(parse_or(
                &lookup,
                "WLF_RETRY_DELAY_MS",
                defaults.retry_delay.as_millis() as u64,
            )?),
            max_retries: parse_or(&lookup, "WLF_MAX_RETRIES", defaults.max_retries)?,
            max_concurrency: parse_or(&lookup, "WLF_MAX_CONCURRENCY", defaults.max_concurrency)?,
            cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "WLF_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )?),
            ..defaults
        };
        refresh.validate()?;

        let refresh_interval =
            Duration::from_secs(parse_or(&lookup, "WLF_REFRESH_INTERVAL_SECS", 300u64)?);
        if refresh_interval.is_zero() {
            return Err(anyhow!("WLF_REFRESH_INTERVAL_SECS must be at least 1"));
        }

        Ok(Self {
            provider_url,
            provider_timeout: Duration::from_millis(parse_or(
                &lookup,
                "WLF_PROVIDER_TIMEOUT_MS",
                30_000u64,
            )?),
            watch_wallets,
            refresh_interval,
            log_format: lookup("WLF_LOG_FORMAT").unwrap_or_else(|| "text".to_string()),
            refresh,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_only_provider_url() {
        let config = Config::from_lookup(lookup(&[("WLF_PROVIDER_URL", "http://localhost:3000")]))
            .unwrap();

        assert_eq!(config.provider_url, "http://localhost:3000");
        assert!(config.watch_wallets.is_empty());
        assert_eq!(config.refresh_interval, Duration::from_secs(300));
        assert_eq!(config.log_format, "text");
        assert_eq!(config.refresh, RefreshConfig::default());
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = Config::from_lookup(lookup(&[
            ("WLF_PROVIDER_URL", "http://localhost:3000"),
            ("WLF_WATCH_WALLETS", " W1, W2 ,,W3"),
            ("WLF_MAX_CONCURRENCY", "3"),
            ("WLF_DEBOUNCE_MS", "250"),
            ("WLF_MAX_RETRIES", "2"),
            ("WLF_CACHE_TTL_SECS", "60"),
        ]))
        .unwrap();

        assert_eq!(config.watch_wallets, vec!["W1", "W2", "W3"]);
        assert_eq!(config.refresh.max_concurrency, 3);
        assert_eq!(config.refresh.debounce_delay, Duration::from_millis(250));
        assert_eq!(config.refresh.max_retries, 2);
        assert_eq!(config.refresh.cache_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_missing_provider_url_is_an_error() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn test_malformed_number_names_the_variable() {
        let err = Config::from_lookup(lookup(&[
            ("WLF_PROVIDER_URL", "http://localhost:3000"),
            ("WLF_MAX_RETRIES", "five"),
        ]))
        .err()
        .unwrap();
        assert!(err.to_string().contains("WLF_MAX_RETRIES"));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let result = Config::from_lookup(lookup(&[
            ("WLF_PROVIDER_URL", "http://localhost:3000"),
            ("WLF_MAX_CONCURRENCY", "0"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_refresh_interval_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("WLF_PROVIDER_URL", "http://localhost:3000"),
            ("WLF_REFRESH_INTERVAL_SECS", "0"),
        ]))
        .err()
        .unwrap();
        assert!(err.to_string().contains("WLF_REFRESH_INTERVAL_SECS"));
    }
}
