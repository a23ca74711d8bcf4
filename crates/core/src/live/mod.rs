//! Live price pipeline: subscribe, normalise, buffer, coalesce, store.
//!
//! The pipeline consumes the provider's bounded stream and flushes one
//! batched `updateLiveRates` per buffer window. Within a batch the last
//! rate per pair wins; an empty window writes nothing. Supervision wraps
//! the pipeline with delayed restarts and a coarse uptime recycle.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::time::{interval, sleep, MissedTickBehavior};

use countervalue_market_data::{currencies, MarketDataProvider, PriceUpdate};

use crate::constants::{
    AUTO_REBOOT_AFTER, LIVE_RATES_BUFFER, REBOOT_PAUSE, RESTART_AFTER_COMPLETE,
    RESTART_AFTER_ERROR,
};
use crate::errors::Result;
use crate::refresh::RefreshService;
use crate::store::{LiveRateUpdate, Store};

pub struct LivePricePipeline {
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<dyn Store>,
    refresh: Arc<RefreshService>,
    debug_batches: bool,
}

impl LivePricePipeline {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn Store>,
        refresh: Arc<RefreshService>,
        debug_batches: bool,
    ) -> Self {
        Self {
            provider,
            store,
            refresh,
            debug_batches,
        }
    }

    /// Runs one subscription to completion. Returns `Ok` when the stream
    /// ends naturally; dropping the future unsubscribes.
    pub async fn run_once(&self) -> Result<()> {
        // The pair set must exist before subscribing; some providers
        // derive their subscription list from it.
        self.refresh.refresh_available_pair_exchanges().await?;

        let mut stream = self.provider.subscribe_price_updates().await?;
        info!("live price subscription opened");

        let mut flush_tick = interval(LIVE_RATES_BUFFER);
        flush_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut batch: HashMap<String, f64> = HashMap::new();

        loop {
            tokio::select! {
                update = stream.recv() => match update {
                    Some(update) => self.absorb(&mut batch, update),
                    None => {
                        self.flush(&mut batch).await?;
                        info!("live price stream completed");
                        return Ok(());
                    }
                },
                _ = flush_tick.tick() => self.flush(&mut batch).await?,
            }
        }
    }

    fn absorb(&self, batch: &mut HashMap<String, f64>, update: PriceUpdate) {
        let pair_exchange = &update.pair_exchange;
        match currencies::to_cent_sat_rate(&pair_exchange.from, &pair_exchange.to, update.price) {
            Ok(rate) => {
                batch.insert(pair_exchange.id(), rate);
            }
            Err(e) => debug!("dropping live update for {pair_exchange}: {e}"),
        }
    }

    async fn flush(&self, batch: &mut HashMap<String, f64>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let updates: Vec<LiveRateUpdate> = batch
            .drain()
            .map(|(id, rate)| LiveRateUpdate { id, rate })
            .collect();
        if self.debug_batches {
            debug!("flushing {} coalesced live rates", updates.len());
        }
        self.store.update_live_rates(&updates).await
    }
}

/// Keeps the pipeline alive: delayed restart after errors and natural
/// completions, plus a forced recycle of long-lived subscriptions.
pub async fn supervise(pipeline: Arc<LivePricePipeline>) {
    loop {
        tokio::select! {
            result = pipeline.run_once() => match result {
                Ok(()) => {
                    info!(
                        "live pipeline completed, restarting in {}s",
                        RESTART_AFTER_COMPLETE.as_secs()
                    );
                    sleep(RESTART_AFTER_COMPLETE).await;
                }
                Err(e) => {
                    error!(
                        "live pipeline failed: {e}; restarting in {}s",
                        RESTART_AFTER_ERROR.as_secs()
                    );
                    sleep(RESTART_AFTER_ERROR).await;
                }
            },
            _ = sleep(AUTO_REBOOT_AFTER) => {
                // Dropping the in-flight run unsubscribes and closes the
                // transport before the relaunch pause.
                warn!(
                    "recycling live subscription after {}h uptime",
                    AUTO_REBOOT_AFTER.as_secs() / 3600
                );
                sleep(REBOOT_PAUSE).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    use countervalue_market_data::{
        ExchangeInfo, Granularity, MarketDataError, OhlcvPoint, PairExchange, PriceStream,
        SubscriptionGuard,
    };

    use crate::config::EngineConfig;
    use crate::errors::{Error, Result};
    use crate::store::{
        ExchangeRecord, Histo, Meta, PairExchangeRecord, PairExchangeStats,
    };
    use countervalue_market_data::Pair;

    // A provider whose subscription hands out a pre-built channel.
    struct StubProvider {
        pending_rx: Mutex<Option<mpsc::Receiver<PriceUpdate>>>,
    }

    impl StubProvider {
        fn new() -> (Arc<Self>, mpsc::Sender<PriceUpdate>) {
            let (tx, rx) = mpsc::channel(64);
            (
                Arc::new(Self {
                    pending_rx: Mutex::new(Some(rx)),
                }),
                tx,
            )
        }
    }

    #[async_trait]
    impl MarketDataProvider for StubProvider {
        fn id(&self) -> &'static str {
            "stub"
        }

        async fn fetch_available_pair_exchanges(
            &self,
        ) -> std::result::Result<Vec<PairExchange>, MarketDataError> {
            Ok(vec![PairExchange::new("KRAKEN", "BTC", "USD")])
        }

        async fn fetch_exchanges(&self) -> std::result::Result<Vec<ExchangeInfo>, MarketDataError> {
            Ok(vec![])
        }

        async fn fetch_histo_series(
            &self,
            _pair_exchange: &PairExchange,
            _granularity: Granularity,
            _limit: Option<u32>,
        ) -> std::result::Result<Vec<OhlcvPoint>, MarketDataError> {
            Ok(vec![])
        }

        async fn subscribe_price_updates(
            &self,
        ) -> std::result::Result<PriceStream, MarketDataError> {
            let rx = self
                .pending_rx
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| MarketDataError::Provider("already subscribed".to_string()))?;
            let task = tokio::spawn(async {});
            Ok(PriceStream::new(rx, SubscriptionGuard::untracked(task)))
        }
    }

    /// Store recording every live batch it receives.
    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<Vec<LiveRateUpdate>>>,
        inserts: AtomicUsize,
    }

    #[async_trait]
    impl Store for RecordingStore {
        async fn insert_pair_exchange_data(&self, _records: &[PairExchangeRecord]) -> Result<()> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn update_live_rates(&self, updates: &[LiveRateUpdate]) -> Result<()> {
            self.batches.lock().unwrap().push(updates.to_vec());
            Ok(())
        }

        async fn update_histo(
            &self,
            _id: &str,
            _granularity: Granularity,
            _histo: &Histo,
        ) -> Result<()> {
            Ok(())
        }

        async fn update_pair_exchange_stats(
            &self,
            _id: &str,
            _stats: &PairExchangeStats,
        ) -> Result<()> {
            Ok(())
        }

        async fn update_exchanges(&self, _exchanges: &[ExchangeRecord]) -> Result<()> {
            Ok(())
        }

        async fn update_market_cap_coins(&self, _day: &str, _coins: &[String]) -> Result<()> {
            Ok(())
        }

        async fn query_pair_exchanges_by_pairs(
            &self,
            _pairs: &[Pair],
            _filter_with_history: bool,
        ) -> Result<Vec<PairExchangeRecord>> {
            Ok(vec![])
        }

        async fn query_pair_exchange_by_id(
            &self,
            _id: &str,
        ) -> Result<Option<PairExchangeRecord>> {
            Ok(None)
        }

        async fn query_pair_exchange_ids(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }

        async fn query_prefetch_candidates(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }

        async fn query_exchanges(&self) -> Result<Vec<ExchangeRecord>> {
            Ok(vec![])
        }

        async fn query_market_cap_coins_for_day(
            &self,
            _day: &str,
        ) -> Result<Option<Vec<String>>> {
            Ok(None)
        }

        async fn status(&self) -> Result<()> {
            Ok(())
        }

        async fn get_meta(&self) -> Result<Meta> {
            Ok(Meta::default())
        }
    }

    fn update(exchange: &str, from: &str, to: &str, price: f64) -> PriceUpdate {
        PriceUpdate {
            pair_exchange: PairExchange::new(exchange, from, to),
            price,
        }
    }

    fn pipeline(
        provider: Arc<StubProvider>,
        store: Arc<RecordingStore>,
    ) -> Arc<LivePricePipeline> {
        let refresh = Arc::new(RefreshService::new(
            provider.clone(),
            store.clone(),
            EngineConfig::default(),
        ));
        Arc::new(LivePricePipeline::new(provider, store, refresh, false))
    }

    #[tokio::test(start_paused = true)]
    async fn batches_coalesce_to_the_last_rate_per_pair() {
        let (provider, tx) = StubProvider::new();
        let store = Arc::new(RecordingStore::default());
        let pipeline = pipeline(provider, store.clone());

        let run = tokio::spawn(async move { pipeline.run_once().await });
        // A appears three times and B once within one buffer window.
        tx.send(update("A", "BTC", "USD", 10.0)).await.unwrap();
        tx.send(update("B", "ETH", "USD", 20.0)).await.unwrap();
        tx.send(update("A", "BTC", "USD", 11.0)).await.unwrap();
        tx.send(update("A", "BTC", "USD", 12.0)).await.unwrap();
        drop(tx);
        run.await.unwrap().unwrap();

        let batches = store.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let mut batch = batches[0].clone();
        batch.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, "A_BTC_USD");
        assert!((batch[0].rate - 12.0e-6).abs() < 1e-15);
        assert_eq!(batch[1].id, "B_ETH_USD");
        // ETH (mag 18) -> USD (mag 2).
        assert!((batch[1].rate - 20.0 * 1e-16).abs() < 1e-28);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_updates_write_once() {
        let (provider, tx) = StubProvider::new();
        let store = Arc::new(RecordingStore::default());
        let pipeline = pipeline(provider, store.clone());

        let run = tokio::spawn(async move { pipeline.run_once().await });
        for _ in 0..5 {
            tx.send(update("A", "BTC", "USD", 10.0)).await.unwrap();
        }
        drop(tx);
        run.await.unwrap().unwrap();

        let batches = store.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
        assert_eq!(batches[0][0].id, "A_BTC_USD");
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_updates_are_dropped_and_empty_windows_skipped() {
        let (provider, tx) = StubProvider::new();
        let store = Arc::new(RecordingStore::default());
        let pipeline = pipeline(provider, store.clone());

        let run = tokio::spawn(async move { pipeline.run_once().await });
        tx.send(update("A", "XXXX", "USD", 10.0)).await.unwrap();
        tokio::time::advance(LIVE_RATES_BUFFER * 3).await;
        drop(tx);
        run.await.unwrap().unwrap();

        assert!(store.batches.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn the_pair_set_is_ensured_before_subscribing() {
        let (provider, tx) = StubProvider::new();
        let store = Arc::new(RecordingStore::default());
        let pipeline = pipeline(provider, store.clone());
        drop(tx);
        pipeline.run_once().await.unwrap();
        assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_second_subscription_reports_an_error() {
        let (provider, _tx) = StubProvider::new();
        let store = Arc::new(RecordingStore::default());
        let refresh = Arc::new(RefreshService::new(
            provider.clone(),
            store.clone(),
            EngineConfig::default(),
        ));
        let pipeline = LivePricePipeline::new(provider.clone(), store, refresh, false);

        let _stream = provider.subscribe_price_updates().await.unwrap();
        let second = pipeline.run_once().await;
        assert!(matches!(second, Err(Error::MarketData(_))));
    }
}
