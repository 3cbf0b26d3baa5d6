//! Portfolio snapshots and balance change detection.

mod change_detector;
mod portfolio_model;

pub use change_detector::{ChangeBasis, ChangeDetector};
pub use portfolio_model::{Portfolio, PortfolioTotals, TokenBalance};
