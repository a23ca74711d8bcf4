//! Standalone sync process: live rates, prefetch and market cap, without
//! the HTTP surface.

use countervalue_server::config::Config;
use countervalue_server::scheduler;
use countervalue_server::state::{build_state, init_tracing, install_panic_exit_hook};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing();
    install_panic_exit_hook();
    let state = build_state(&config).await?;

    scheduler::start_sync_tasks(&state);
    tracing::info!("sync process running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}
