use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Debounce window for non-immediate refresh requests
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(800);

/// Delay for immediate requests, giving the upstream view time to catch up
/// with a just-submitted transaction
pub const DEFAULT_IMMEDIATE_DELAY: Duration = Duration::from_secs(5);

/// Delay between convergence or failure retries
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Retry budget shared by convergence and upstream failures
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Simultaneous upstream fetches across all wallets
pub const DEFAULT_MAX_CONCURRENCY: usize = 6;

/// Cache validity window
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Native-currency delta below which totals are considered unchanged
pub const NATIVE_EPSILON: Decimal = dec!(0.00001);

/// Fiat delta below which totals are considered unchanged
pub const FIAT_EPSILON: Decimal = dec!(0.01);

/// Buffered events per broadcast receiver before it starts lagging
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
