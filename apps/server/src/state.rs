//! Service wiring and process-level initialisation.

use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use countervalue_core::{
    EngineConfig, MarketCapService, MemoryStore, RatesService, RefreshService, Store,
};
use countervalue_market_data::{provider_from_env, CoinMarketCapSource, MarketDataProvider};
use countervalue_storage_mongo::MongoStore;

use crate::config::Config;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub provider: Arc<dyn MarketDataProvider>,
    pub refresh_service: Arc<RefreshService>,
    pub marketcap_service: Arc<MarketCapService>,
    pub rates_service: Arc<RatesService>,
    pub engine_config: EngineConfig,
}

pub fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

/// Terminates the process on any uncaught panic, including ones raised
/// on background tasks, after logging it.
pub fn install_panic_exit_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        tracing::error!("uncaught panic, terminating");
        std::process::exit(1);
    }));
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let store: Arc<dyn Store> = match config.database.as_str() {
        "mongodb" => Arc::new(MongoStore::connect(&config.mongodb_uri).await?),
        "memory" => Arc::new(MemoryStore::new()),
        other => anyhow::bail!("unknown DATABASE '{other}'"),
    };

    let provider = provider_from_env()?;
    provider.init().await?;
    tracing::info!("market data provider '{}' is ready", provider.id());

    let engine_config = EngineConfig::from_env();
    let refresh_service = Arc::new(RefreshService::new(
        provider.clone(),
        store.clone(),
        engine_config.clone(),
    ));
    let marketcap_service = Arc::new(MarketCapService::new(
        Arc::new(CoinMarketCapSource::from_env()),
        store.clone(),
    ));
    let rates_service = Arc::new(RatesService::new(
        store.clone(),
        refresh_service.clone(),
        marketcap_service.clone(),
        engine_config.clone(),
    ));

    Ok(Arc::new(AppState {
        store,
        provider,
        refresh_service,
        marketcap_service,
        rates_service,
        engine_config,
    }))
}
