pub mod config;
pub mod main_lib;
pub mod scheduler;

pub use main_lib::{build_service, init_tracing, log_wallet_updates};
