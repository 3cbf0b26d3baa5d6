use walletfolio_core::BalanceServiceTrait;
use walletfolio_daemon::config::Config;
use walletfolio_daemon::{build_service, init_tracing, log_wallet_updates, scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log_format);
    let service = build_service(&config)?;
    let _updates = log_wallet_updates(&service);

    let _ticker = scheduler::start_refresh_scheduler(
        service.clone(),
        config.watch_wallets.clone(),
        config.refresh_interval,
    );

    tracing::info!("Walletfolio daemon running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    service.shutdown();
    Ok(())
}
