//! Background warming of all known pair-exchange histories.
//!
//! One cycle walks every pair, most recently live-active first, and runs
//! the throttled daily then hourly histo refresh. The inter-pair pause
//! spreads the cycle over roughly one histo throttle window so provider
//! load stays flat.

use std::sync::Arc;

use log::{debug, info, warn};

use countervalue_market_data::{Granularity, PairExchange};

use crate::constants::HISTO_REFRESH_WINDOW;
use crate::errors::Result;
use crate::refresh::RefreshService;
use crate::store::Store;

pub async fn run_prefetch_cycle(
    store: &Arc<dyn Store>,
    refresh: &Arc<RefreshService>,
) -> Result<()> {
    let ids = store.query_prefetch_candidates().await?;
    if ids.is_empty() {
        debug!("no pair exchanges to prefetch");
        return Ok(());
    }
    let pause = HISTO_REFRESH_WINDOW / ids.len() as u32;
    info!(
        "prefetching {} pair exchanges, pausing {:?} between pairs",
        ids.len(),
        pause
    );
    for id in ids {
        let pair_exchange = match PairExchange::parse(&id) {
            Ok(pair_exchange) => pair_exchange,
            Err(e) => {
                debug!("skipping prefetch of '{id}': {e}");
                continue;
            }
        };
        for granularity in Granularity::ALL {
            if let Err(e) = refresh.refresh_histo(&pair_exchange, granularity).await {
                warn!("prefetch of {id} ({granularity}) failed: {e}");
            }
        }
        tokio::time::sleep(pause).await;
    }
    Ok(())
}
