//! In-memory store backend.
//!
//! Implements the full store contract over process-local maps. Used by
//! the test suites and selectable as `DATABASE=memory` for local runs.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use countervalue_market_data::{Granularity, Pair};

use super::model::{
    ExchangeRecord, Histo, LiveRateUpdate, Meta, PairExchangeRecord, PairExchangeStats,
};
use super::traits::Store;
use crate::errors::{DatabaseError, Result};

#[derive(Default)]
pub struct MemoryStore {
    pair_exchanges: RwLock<HashMap<String, PairExchangeRecord>>,
    exchanges: RwLock<HashMap<String, ExchangeRecord>>,
    marketcap: RwLock<HashMap<String, Vec<String>>>,
    meta: RwLock<Meta>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_pair_exchanges(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, PairExchangeRecord>> {
        self.pair_exchanges.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_pair_exchanges(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, PairExchangeRecord>> {
        self.pair_exchanges.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn sort_by_quality(records: &mut [PairExchangeRecord]) {
    records.sort_by(|a, b| {
        b.has_history_for_1_year
            .cmp(&a.has_history_for_1_year)
            .then_with(|| {
                b.yesterday_volume
                    .partial_cmp(&a.yesterday_volume)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_pair_exchange_data(&self, records: &[PairExchangeRecord]) -> Result<()> {
        let mut map = self.write_pair_exchanges();
        for record in records {
            map.entry(record.id.clone()).or_insert_with(|| record.clone());
        }
        Ok(())
    }

    async fn update_live_rates(&self, updates: &[LiveRateUpdate]) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        {
            let mut map = self.write_pair_exchanges();
            for update in updates {
                if let Some(record) = map.get_mut(&update.id) {
                    record.latest = update.rate;
                    record.latest_date = Some(now);
                }
            }
        }
        self.meta.write().unwrap_or_else(|e| e.into_inner()).last_live_rates_sync = now;
        Ok(())
    }

    async fn update_histo(&self, id: &str, granularity: Granularity, histo: &Histo) -> Result<()> {
        let mut map = self.write_pair_exchanges();
        if let Some(record) = map.get_mut(id) {
            match granularity {
                Granularity::Daily => record.histo_daily = histo.clone(),
                Granularity::Hourly => record.histo_hourly = histo.clone(),
            }
        }
        Ok(())
    }

    async fn update_pair_exchange_stats(&self, id: &str, stats: &PairExchangeStats) -> Result<()> {
        if stats.is_empty() {
            return Ok(());
        }
        let mut map = self.write_pair_exchanges();
        if let Some(record) = map.get_mut(id) {
            stats.apply(record);
        }
        Ok(())
    }

    async fn update_exchanges(&self, exchanges: &[ExchangeRecord]) -> Result<()> {
        let mut map = self.exchanges.write().unwrap_or_else(|e| e.into_inner());
        for exchange in exchanges {
            map.insert(exchange.id.clone(), exchange.clone());
        }
        Ok(())
    }

    async fn update_market_cap_coins(&self, day: &str, coins: &[String]) -> Result<()> {
        self.marketcap
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(day.to_string(), coins.to_vec());
        self.meta.write().unwrap_or_else(|e| e.into_inner()).last_market_cap_sync =
            Utc::now().timestamp_millis();
        Ok(())
    }

    async fn query_pair_exchanges_by_pairs(
        &self,
        pairs: &[Pair],
        filter_with_history: bool,
    ) -> Result<Vec<PairExchangeRecord>> {
        let keys: Vec<String> = pairs.iter().map(Pair::key).collect();
        let mut records: Vec<PairExchangeRecord> = self
            .read_pair_exchanges()
            .values()
            .filter(|r| keys.iter().any(|k| *k == r.from_to))
            .filter(|r| !filter_with_history || r.has_history_for_30_last_days)
            .cloned()
            .collect();
        sort_by_quality(&mut records);
        Ok(records)
    }

    async fn query_pair_exchange_by_id(&self, id: &str) -> Result<Option<PairExchangeRecord>> {
        Ok(self.read_pair_exchanges().get(id).cloned())
    }

    async fn query_pair_exchange_ids(&self) -> Result<Vec<String>> {
        Ok(self.read_pair_exchanges().keys().cloned().collect())
    }

    async fn query_prefetch_candidates(&self) -> Result<Vec<String>> {
        let map = self.read_pair_exchanges();
        let mut entries: Vec<(Option<i64>, String)> = map
            .values()
            .map(|r| (r.latest_date, r.id.clone()))
            .collect();
        // None sorts below Some, so descending order puts idle pairs last.
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries.into_iter().map(|(_, id)| id).collect())
    }

    async fn query_exchanges(&self) -> Result<Vec<ExchangeRecord>> {
        Ok(self
            .exchanges
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect())
    }

    async fn query_market_cap_coins_for_day(&self, day: &str) -> Result<Option<Vec<String>>> {
        Ok(self
            .marketcap
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(day)
            .cloned())
    }

    async fn status(&self) -> Result<()> {
        if self.read_pair_exchanges().is_empty() {
            return Err(DatabaseError::NotFound(
                "pairExchanges collection is empty".to_string(),
            )
            .into());
        }
        Ok(())
    }

    async fn get_meta(&self) -> Result<Meta> {
        Ok(*self.meta.read().unwrap_or_else(|e| e.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use countervalue_market_data::PairExchange;

    fn record(exchange: &str) -> PairExchangeRecord {
        PairExchangeRecord::from_pair_exchange(&PairExchange::new(exchange, "BTC", "USD"))
    }

    #[tokio::test]
    async fn insert_never_overwrites_existing_records() {
        let store = MemoryStore::new();
        let mut first = record("KRAKEN");
        first.latest = 42.0;
        store.insert_pair_exchange_data(&[first]).await.unwrap();
        store
            .insert_pair_exchange_data(&[record("KRAKEN")])
            .await
            .unwrap();
        let kept = store
            .query_pair_exchange_by_id("KRAKEN_BTC_USD")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kept.latest, 42.0);
    }

    #[tokio::test]
    async fn live_rate_updates_touch_latest_and_meta() {
        let store = MemoryStore::new();
        store
            .insert_pair_exchange_data(&[record("KRAKEN")])
            .await
            .unwrap();
        store
            .update_live_rates(&[LiveRateUpdate {
                id: "KRAKEN_BTC_USD".to_string(),
                rate: 0.021,
            }])
            .await
            .unwrap();
        let updated = store
            .query_pair_exchange_by_id("KRAKEN_BTC_USD")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.latest, 0.021);
        assert!(updated.latest_date.is_some());
        assert!(store.get_meta().await.unwrap().last_live_rates_sync > 0);
    }

    #[tokio::test]
    async fn pair_queries_sort_by_quality() {
        let store = MemoryStore::new();
        let mut good = record("KRAKEN");
        good.has_history_for_1_year = true;
        good.yesterday_volume = 10.0;
        let mut busy = record("BINANCE");
        busy.has_history_for_1_year = false;
        busy.yesterday_volume = 1000.0;
        store.insert_pair_exchange_data(&[busy, good]).await.unwrap();

        let records = store
            .query_pair_exchanges_by_pairs(&[Pair::new("BTC", "USD")], false)
            .await
            .unwrap();
        assert_eq!(records[0].exchange, "KRAKEN");
        assert_eq!(records[1].exchange, "BINANCE");
    }

    #[tokio::test]
    async fn prefetch_candidates_put_idle_pairs_last() {
        let store = MemoryStore::new();
        let mut active = record("KRAKEN");
        active.latest_date = Some(2_000);
        let mut stale = record("BINANCE");
        stale.latest_date = Some(1_000);
        let idle = record("GEMINI");
        store
            .insert_pair_exchange_data(&[idle, stale, active])
            .await
            .unwrap();

        let ids = store.query_prefetch_candidates().await.unwrap();
        assert_eq!(
            ids,
            vec!["KRAKEN_BTC_USD", "BINANCE_BTC_USD", "GEMINI_BTC_USD"]
        );
    }

    #[tokio::test]
    async fn status_fails_on_empty_collection() {
        let store = MemoryStore::new();
        assert!(store.status().await.is_err());
        store
            .insert_pair_exchange_data(&[record("KRAKEN")])
            .await
            .unwrap();
        assert!(store.status().await.is_ok());
    }
}
