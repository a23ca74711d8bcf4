use countervalue_server::api::app_router;
use countervalue_server::config::Config;
use countervalue_server::scheduler;
use countervalue_server::state::{build_state, init_tracing, install_panic_exit_hook};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_tracing();
    install_panic_exit_hook();
    let state = build_state(&config).await?;

    if state.engine_config.hack_sync_in_server {
        scheduler::start_sync_tasks(&state);
    }

    let router = app_router(state);
    let addr = config.listen_addr();
    tracing::info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
