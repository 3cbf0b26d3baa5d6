use thiserror::Error;

/// Errors returned by a [`PortfolioDataProvider`](super::PortfolioDataProvider).
///
/// A wallet that holds nothing is not an error: providers return an empty
/// [`Portfolio`](crate::portfolio::Portfolio) for it.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider does not know this wallet.
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    /// The provider rate limited the request (HTTP 429).
    #[error("Rate limited: {provider}")]
    RateLimited { provider: String },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout { provider: String },

    /// The provider answered with an unexpected HTTP status.
    #[error("Provider error: {provider} - HTTP {status}: {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    /// The provider answered, but the body could not be interpreted.
    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// The provider is not reachable or not configured.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// A network error occurred while communicating with the provider.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ProviderError {
    /// Whether another attempt later could plausibly succeed.
    ///
    /// The refresh engine retries every failure within its budget; this is
    /// informational for callers of the synchronous read path.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::WalletNotFound(_) | Self::InvalidResponse { .. } => false,
            Self::RateLimited { .. }
            | Self::Timeout { .. }
            | Self::Unavailable(_)
            | Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_not_found_is_terminal() {
        let error = ProviderError::WalletNotFound("W1".to_string());
        assert!(!error.is_transient());
    }

    #[test]
    fn test_rate_limit_and_timeout_are_transient() {
        let error = ProviderError::RateLimited {
            provider: "HTTP".to_string(),
        };
        assert!(error.is_transient());

        let error = ProviderError::Timeout {
            provider: "HTTP".to_string(),
        };
        assert!(error.is_transient());
    }

    #[test]
    fn test_http_status_classification() {
        let server = ProviderError::Http {
            provider: "HTTP".to_string(),
            status: 503,
            message: "busy".to_string(),
        };
        let client = ProviderError::Http {
            provider: "HTTP".to_string(),
            status: 400,
            message: "bad wallet".to_string(),
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
    }

    #[test]
    fn test_error_display() {
        let error = ProviderError::Http {
            provider: "HTTP".to_string(),
            status: 502,
            message: "bad gateway".to_string(),
        };
        assert_eq!(
            format!("{}", error),
            "Provider error: HTTP - HTTP 502: bad gateway"
        );
    }
}
