//! Throttled refresh of pairs, exchanges and historical series.
//!
//! Every operation here is fronted by a [`ThrottledAction`] so that
//! concurrent callers and repeated polls coalesce into one provider
//! round-trip per window. Histo refresh additionally keeps a fast path
//! on the persisted `historyLoadedAt` bucket so a series is fetched at
//! most once per bucket even across process restarts.

pub mod stats;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};

use countervalue_market_data::{
    currencies, Granularity, MarketDataProvider, OhlcvPoint, PairExchange,
};

use crate::config::EngineConfig;
use crate::constants::{
    AVAILABLE_PAIRS_REFRESH_WINDOW, EXCHANGES_REFRESH_WINDOW, HISTO_REFRESH_WINDOW,
};
use crate::errors::Result;
use crate::store::{
    ExchangeRecord, Histo, PairExchangeRecord, PairExchangeStats, Store, LATEST_KEY,
};
use crate::throttle::{ThrottleMap, ThrottledAction};

pub use stats::{derive as derive_stats, DerivedStats};

pub struct RefreshService {
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<dyn Store>,
    config: EngineConfig,
    available_pairs: ThrottledAction<usize>,
    exchanges: ThrottledAction<Vec<ExchangeRecord>>,
    histo: ThrottleMap<(String, Granularity), Histo>,
}

impl RefreshService {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn Store>,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
            available_pairs: ThrottledAction::new(AVAILABLE_PAIRS_REFRESH_WINDOW),
            exchanges: ThrottledAction::new(EXCHANGES_REFRESH_WINDOW),
            histo: ThrottleMap::new(HISTO_REFRESH_WINDOW),
        }
    }

    /// Fetches the provider's spot pair catalogue and inserts a default
    /// record for every pair seen for the first time. Returns the
    /// catalogue size.
    pub async fn refresh_available_pair_exchanges(&self) -> Result<usize> {
        let provider = self.provider.clone();
        let store = self.store.clone();
        self.available_pairs
            .run(move || async move {
                let pairs = provider.fetch_available_pair_exchanges().await?;
                let records: Vec<PairExchangeRecord> = pairs
                    .iter()
                    .map(PairExchangeRecord::from_pair_exchange)
                    .collect();
                store.insert_pair_exchange_data(&records).await?;
                debug!("refreshed {} available pair exchanges", records.len());
                Ok(records.len())
            })
            .await
    }

    /// Fetches and upserts the exchange list, returning it.
    pub async fn refresh_exchanges(&self) -> Result<Vec<ExchangeRecord>> {
        let provider = self.provider.clone();
        let store = self.store.clone();
        self.exchanges
            .run(move || async move {
                let exchanges: Vec<ExchangeRecord> = provider
                    .fetch_exchanges()
                    .await?
                    .into_iter()
                    .map(ExchangeRecord::from)
                    .collect();
                store.update_exchanges(&exchanges).await?;
                debug!("refreshed {} exchanges", exchanges.len());
                Ok(exchanges)
            })
            .await
    }

    /// Refreshes one granularity of one pair's history and re-derives
    /// its stats. Returns the (possibly cached) histo.
    pub async fn refresh_histo(
        &self,
        pair_exchange: &PairExchange,
        granularity: Granularity,
    ) -> Result<Histo> {
        let key = (pair_exchange.id(), granularity);
        let throttle = self.histo.entry(&key);
        let provider = self.provider.clone();
        let store = self.store.clone();
        let pair_exchange = pair_exchange.clone();
        let min_days = self.config.minimal_days;
        throttle
            .run(move || async move {
                refresh_histo_once(provider, store, pair_exchange, granularity, min_days).await
            })
            .await
    }

    /// Batch re-derivation of the history statistics of every known
    /// pair from its persisted daily histo. Returns the number of
    /// records updated.
    pub async fn update_all_stats(&self) -> Result<usize> {
        let ids = self.store.query_pair_exchange_ids().await?;
        let now = Utc::now();
        let mut updated = 0;
        for id in &ids {
            let Some(record) = self.store.query_pair_exchange_by_id(id).await? else {
                continue;
            };
            let Some(derived) = stats::derive(&record.histo_daily, now, self.config.minimal_days)
            else {
                continue;
            };
            let mut update = PairExchangeStats::default();
            apply_derived(&mut update, derived);
            self.store.update_pair_exchange_stats(id, &update).await?;
            updated += 1;
        }
        info!("re-derived stats for {updated} of {} pair exchanges", ids.len());
        Ok(updated)
    }
}

async fn refresh_histo_once(
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<dyn Store>,
    pair_exchange: PairExchange,
    granularity: Granularity,
    min_days: u32,
) -> Result<Histo> {
    let now = Utc::now();
    let id = pair_exchange.id();
    let record = store.query_pair_exchange_by_id(&id).await?;
    let current_key = granularity.format_key(now);

    if let Some(record) = &record {
        if record.history_loaded_at(granularity) == Some(current_key.as_str()) {
            debug!("{granularity} histo of {id} already loaded at {current_key}");
            return Ok(record.histo(granularity).clone());
        }
    }

    let mut points = match provider
        .fetch_histo_series(&pair_exchange, granularity, None)
        .await
    {
        Ok(points) => points,
        Err(e) => {
            warn!("failed to fetch {granularity} history for {id}: {e}");
            return Ok(record
                .as_ref()
                .map(|r| r.histo(granularity).clone())
                .unwrap_or_default());
        }
    };
    points.sort_by(|a, b| b.time.cmp(&a.time));

    let open_threshold = now - Duration::milliseconds(granularity.bucket_ms());
    let mut histo = Histo::with_capacity(points.len());
    for point in &points {
        let rate = match currencies::to_cent_sat_rate(&pair_exchange.from, &pair_exchange.to, point.close)
        {
            Ok(rate) => rate,
            Err(e) => {
                debug!("skipping point of {id}: {e}");
                continue;
            }
        };
        let key = if point.time > open_threshold {
            LATEST_KEY.to_string()
        } else {
            granularity.format_key(point.time)
        };
        // Points are sorted most recent first; the first write per
        // bucket wins.
        histo.entry(key).or_insert(rate);
    }
    store.update_histo(&id, granularity, &histo).await?;

    let mut update = PairExchangeStats {
        latest_date: Some(now.timestamp_millis()),
        ..Default::default()
    };
    match granularity {
        Granularity::Daily => {
            update.history_loaded_at_daily = Some(current_key);
            update.yesterday_volume = Some(yesterday_volume(&points, now));
            if let Some(derived) = stats::derive(&histo, now, min_days) {
                apply_derived(&mut update, derived);
            }
        }
        Granularity::Hourly => {
            update.history_loaded_at_hourly = Some(current_key);
            if let Some(record) = &record {
                if let Some(derived) = stats::derive(&record.histo_daily, now, min_days) {
                    apply_derived(&mut update, derived);
                }
            }
        }
    }
    store.update_pair_exchange_stats(&id, &update).await?;
    Ok(histo)
}

fn apply_derived(update: &mut PairExchangeStats, derived: DerivedStats) {
    update.oldest_day_ago = Some(derived.oldest_day_ago);
    update.has_history_for_1_year = Some(derived.has_history_for_1_year);
    update.has_history_for_30_last_days = Some(derived.has_history_for_30_last_days);
}

/// Volume of the day bucket immediately preceding today: the second most
/// recent point, when it falls within the last two days.
fn yesterday_volume(points: &[OhlcvPoint], now: DateTime<Utc>) -> f64 {
    match points.get(1) {
        Some(point) if point.time > now - Duration::days(2) && point.time <= now => point.volume,
        _ => 0.0,
    }
}
