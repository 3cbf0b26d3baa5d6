//! Walletfolio Core - balance cache and refresh coordination.
//!
//! This crate owns the wallet portfolio cache and decides when to refresh
//! it. Upstream data, deposit detection and cache backends are plugged in
//! through traits; the `walletfolio-daemon` app wires concrete ones.

pub mod balances;
pub mod cache;
pub mod constants;
pub mod errors;
pub mod events;
pub mod portfolio;
pub mod providers;
pub mod refresh;

pub use balances::{BalanceService, BalanceServiceTrait};
pub use portfolio::*;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
