//! Upstream collaborators: the portfolio data provider and the external
//! transaction detector.

mod http_provider;
mod provider_errors;
mod provider_traits;

pub use http_provider::HttpPortfolioProvider;
pub use provider_errors::ProviderError;
pub use provider_traits::{
    DetectedTransfer, ExternalTransactionDetector, NoOpTransactionDetector,
    PortfolioDataProvider,
};
