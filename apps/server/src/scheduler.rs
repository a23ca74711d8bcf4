//! Background sync tasks: live pipeline supervision, recurrent prefetch
//! and the market-cap snapshot.

use std::sync::Arc;

use tokio::time::interval;
use tracing::{info, warn};

use countervalue_core::constants::PREFETCH_PERIOD;
use countervalue_core::{live, prefetch, LivePricePipeline};

use crate::state::AppState;

/// Market-cap recurrence; the daily store gate makes extra ticks cheap.
const MARKETCAP_PERIOD: std::time::Duration = std::time::Duration::from_secs(60 * 60);

/// Batch re-derivation of per-pair stats from persisted history.
const STATS_PERIOD: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

pub fn start_sync_tasks(state: &Arc<AppState>) {
    let pipeline = Arc::new(LivePricePipeline::new(
        state.provider.clone(),
        state.store.clone(),
        state.refresh_service.clone(),
        state.engine_config.debug_live_rates,
    ));
    tokio::spawn(live::supervise(pipeline));
    info!("live price supervision started");

    if state.engine_config.disable_prefetch {
        info!("prefetch disabled by configuration");
    } else {
        let store = state.store.clone();
        let refresh = state.refresh_service.clone();
        tokio::spawn(async move {
            let mut tick = interval(PREFETCH_PERIOD);
            loop {
                tick.tick().await;
                if let Err(e) = prefetch::run_prefetch_cycle(&store, &refresh).await {
                    warn!("prefetch cycle failed: {e}");
                }
            }
        });
        info!(
            "prefetch scheduler started ({}h period)",
            PREFETCH_PERIOD.as_secs() / 3600
        );
    }

    let marketcap = state.marketcap_service.clone();
    tokio::spawn(async move {
        let mut tick = interval(MARKETCAP_PERIOD);
        loop {
            tick.tick().await;
            if let Err(e) = marketcap.refresh_daily().await {
                warn!("market cap refresh failed: {e}");
            }
        }
    });

    let refresh = state.refresh_service.clone();
    tokio::spawn(async move {
        let mut tick = interval(STATS_PERIOD);
        loop {
            tick.tick().await;
            match refresh.update_all_stats().await {
                Ok(updated) => info!("stats batch updated {updated} pair exchanges"),
                Err(e) => warn!("stats batch failed: {e}"),
            }
        }
    });
}
