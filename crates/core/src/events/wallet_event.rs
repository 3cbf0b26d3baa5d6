//! Wallet update event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::portfolio::PortfolioTotals;
use crate::refresh::ConvergenceState;

/// Why a wallet's cached view changed or was re-checked.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum UpdateReason {
    /// A user or operator explicitly asked for fresh data.
    ManualRefresh,
    /// Routine refresh of the cache.
    #[default]
    CacheUpdate,
    /// An inbound transfer was observed on chain.
    ExternalTransaction,
    /// The wallet sent funds through the application.
    Send,
}

impl UpdateReason {
    /// Whether this reason carries more information than a routine refresh.
    pub fn is_specific(&self) -> bool {
        !matches!(self, Self::CacheUpdate)
    }
}

/// Emitted after a refresh attempt wrote the cache, or when a deposit is
/// surfaced.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WalletUpdated {
    pub wallet: String,
    pub updated_at: DateTime<Utc>,
    pub reason: UpdateReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totals: Option<PortfolioTotals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Convergence status of the refresh operation that produced the event.
    /// `None` for events not produced by a refresh attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convergence: Option<ConvergenceState>,
}

impl WalletUpdated {
    pub fn new(wallet: impl Into<String>, reason: UpdateReason) -> Self {
        Self {
            wallet: wallet.into(),
            updated_at: Utc::now(),
            reason,
            totals: None,
            tx_hash: None,
            convergence: None,
        }
    }

    pub fn with_totals(mut self, totals: PortfolioTotals) -> Self {
        self.totals = Some(totals);
        self
    }

    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    pub fn with_convergence(mut self, convergence: ConvergenceState) -> Self {
        self.convergence = Some(convergence);
        self
    }

    /// True when this event confirms that an expected change became visible.
    pub fn is_confirmed_change(&self) -> bool {
        self.convergence == Some(ConvergenceState::Converged)
    }
}
