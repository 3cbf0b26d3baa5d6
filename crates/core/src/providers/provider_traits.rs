//! Collaborator traits consumed by the refresh engine.
//!
//! Both collaborators are implemented outside the core: the engine only
//! decides *when* to call them and what to do with their answers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::provider_errors::ProviderError;
use crate::errors::Result;
use crate::portfolio::Portfolio;

/// Source of wallet snapshots.
///
/// Calls may be slow or rate limited. Implementations must return an empty
/// portfolio for a wallet with zero balance and reserve `Err` for failures.
#[async_trait]
pub trait PortfolioDataProvider: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> &'static str {
        "PORTFOLIO_PROVIDER"
    }

    /// Fetches the current snapshot for a wallet.
    async fn fetch(&self, wallet: &str) -> std::result::Result<Portfolio, ProviderError>;
}

/// An inbound transfer observed on chain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectedTransfer {
    pub tx_hash: String,
    pub mint: String,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// Surfaces newly observed inbound transfers for a wallet.
///
/// Consulted as a best-effort side step of every successful refresh; an
/// error here never fails the refresh itself.
#[async_trait]
pub trait ExternalTransactionDetector: Send + Sync {
    /// Returns transfers that were not reported by a previous call.
    async fn check_for_deposits(&self, wallet: &str) -> Result<Vec<DetectedTransfer>>;
}

/// Detector that never reports anything.
#[derive(Clone, Default)]
pub struct NoOpTransactionDetector;

#[async_trait]
impl ExternalTransactionDetector for NoOpTransactionDetector {
    async fn check_for_deposits(&self, _wallet: &str) -> Result<Vec<DetectedTransfer>> {
        Ok(Vec::new())
    }
}
