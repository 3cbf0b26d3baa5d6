//! HTTP-backed portfolio provider.
//!
//! Fetches wallet snapshots from an upstream portfolio API that serves
//! `GET {base_url}/wallets/{wallet}/portfolio` with a JSON body in the
//! [`Portfolio`] shape.

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::provider_errors::ProviderError;
use super::provider_traits::PortfolioDataProvider;
use crate::portfolio::Portfolio;

/// Provider ID constant
const PROVIDER_ID: &str = "HTTP_PORTFOLIO";

/// Default HTTP request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body echoed into an error message
const MAX_ERROR_BODY: usize = 200;

pub struct HttpPortfolioProvider {
    client: Client,
    base_url: String,
}

impl HttpPortfolioProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn portfolio_url(&self, wallet: &str) -> String {
        format!(
            "{}/wallets/{}/portfolio",
            self.base_url,
            urlencoding::encode(wallet)
        )
    }

    fn status_error(status: StatusCode, wallet: &str, body: &str) -> ProviderError {
        match status {
            StatusCode::NOT_FOUND => ProviderError::WalletNotFound(wallet.to_string()),
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            },
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::Timeout {
                provider: PROVIDER_ID.to_string(),
            },
            _ => ProviderError::Http {
                provider: PROVIDER_ID.to_string(),
                status: status.as_u16(),
                message: body.chars().take(MAX_ERROR_BODY).collect(),
            },
        }
    }
}

#[async_trait]
impl PortfolioDataProvider for HttpPortfolioProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch(&self, wallet: &str) -> Result<Portfolio, ProviderError> {
        let url = self.portfolio_url(wallet);
        debug!("Fetching portfolio for {} from {}", wallet, url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    provider: PROVIDER_ID.to_string(),
                }
            } else {
                ProviderError::Network(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status, wallet, &body));
        }

        response
            .json::<Portfolio>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                provider: PROVIDER_ID.to_string(),
                message: e.to_string(),
            })
    }
}
