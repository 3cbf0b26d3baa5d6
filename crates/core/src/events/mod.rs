//! Wallet update events.
//!
//! The refresh engine emits a [`WalletUpdated`] after every cache write and
//! for every surfaced deposit. Consumers subscribe through the [`EventBus`];
//! emission is best-effort and never fails a refresh.

mod event_bus;
mod wallet_event;

pub use event_bus::{EventBus, Subscription};
pub use wallet_event::{UpdateReason, WalletUpdated};
