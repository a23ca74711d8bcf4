//! Read facade used by the HTTP layer.
//!
//! Every operation refreshes best-effort and falls back to the persisted
//! view; staleness is preferable to an error. Blacklisted exchanges are
//! invisible to all reads.

use std::collections::HashMap;
use std::sync::Arc;

use log::warn;

use countervalue_market_data::{currencies, Granularity, Pair, PairExchange};

use crate::config::EngineConfig;
use crate::errors::Result;
use crate::marketcap::MarketCapService;
use crate::refresh::RefreshService;
use crate::store::{ExchangeRecord, PairExchangeRecord, Store, LATEST_KEY};

/// One requested pair with its optional filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateRequestPair {
    pub from: String,
    pub to: String,
    pub exchange: Option<String>,
    /// Keep only bucket keys strictly greater than this one.
    pub after: Option<String>,
    /// Keep only these bucket keys; takes precedence over `after`.
    pub at: Option<Vec<String>>,
}

/// Bucket keys plus the reserved `latest` entry.
pub type PairData = HashMap<String, f64>;

/// Nested response map: to -> from -> exchange -> data.
pub type HistoResponse = HashMap<String, HashMap<String, HashMap<String, PairData>>>;

pub struct RatesService {
    store: Arc<dyn Store>,
    refresh: Arc<RefreshService>,
    marketcap: Arc<MarketCapService>,
    config: EngineConfig,
}

impl RatesService {
    pub fn new(
        store: Arc<dyn Store>,
        refresh: Arc<RefreshService>,
        marketcap: Arc<MarketCapService>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            refresh,
            marketcap,
            config,
        }
    }

    /// Historical and live rates for the requested pairs, one exchange
    /// per pair: the explicitly requested one, or the best candidate by
    /// (year of history, yesterday volume).
    pub async fn get_histo(
        &self,
        request: &[RateRequestPair],
        granularity: Granularity,
    ) -> Result<HistoResponse> {
        if let Err(e) = self.refresh.refresh_available_pair_exchanges().await {
            warn!("available pair refresh failed, serving persisted view: {e}");
        }

        let mut pairs: Vec<Pair> = Vec::new();
        for requested in request {
            let pair = Pair::new(requested.from.clone(), requested.to.clone());
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
        let records = self
            .store
            .query_pair_exchanges_by_pairs(&pairs, false)
            .await?;
        let candidates: Vec<&PairExchangeRecord> = records
            .iter()
            .filter(|r| !self.config.is_blacklisted(&r.exchange))
            .collect();

        let mut response = HistoResponse::new();
        for requested in request {
            let from_to = format!("{}_{}", requested.from, requested.to);
            let record = candidates.iter().find(|r| {
                r.from_to == from_to
                    && r.has_history_for_30_last_days
                    && match &requested.exchange {
                        Some(exchange) => r.exchange.eq_ignore_ascii_case(exchange),
                        None => true,
                    }
            });
            let Some(record) = record else { continue };

            let pair_exchange =
                PairExchange::new(record.exchange.clone(), record.from.clone(), record.to.clone());
            let histo = match self.refresh.refresh_histo(&pair_exchange, granularity).await {
                Ok(histo) => histo,
                Err(e) => {
                    warn!("histo refresh of {} failed, serving persisted view: {e}", record.id);
                    record.histo(granularity).clone()
                }
            };

            let mut data: PairData = histo
                .into_iter()
                .filter(|(key, _)| key != LATEST_KEY)
                .filter(|(key, _)| match (&requested.at, &requested.after) {
                    (Some(at), _) => at.iter().any(|wanted| wanted == key),
                    (None, Some(after)) => key.as_str() > after.as_str(),
                    (None, None) => true,
                })
                .collect();
            data.insert(LATEST_KEY.to_string(), record.latest);

            response
                .entry(requested.to.clone())
                .or_default()
                .entry(requested.from.clone())
                .or_default()
                .insert(record.exchange.clone(), data);
        }
        Ok(response)
    }

    /// Exchanges trading the pair with usable recent history, enriched
    /// with provider metadata when known.
    pub async fn get_exchanges(&self, from: &str, to: &str) -> Result<Vec<ExchangeRecord>> {
        let known = match self.refresh.refresh_exchanges().await {
            Ok(exchanges) => exchanges,
            Err(e) => {
                warn!("exchange refresh failed, serving persisted view: {e}");
                self.store.query_exchanges().await.unwrap_or_default()
            }
        };
        let by_id: HashMap<&str, &ExchangeRecord> =
            known.iter().map(|e| (e.id.as_str(), e)).collect();

        let candidates = self
            .store
            .query_pair_exchanges_by_pairs(&[Pair::new(from, to)], true)
            .await?;
        Ok(candidates
            .iter()
            .filter(|r| !self.config.is_blacklisted(&r.exchange))
            .map(|r| match by_id.get(r.exchange.as_str()) {
                Some(exchange) => (*exchange).clone(),
                None => ExchangeRecord {
                    id: r.exchange.clone(),
                    name: r.exchange.clone(),
                    website: None,
                },
            })
            .collect())
    }

    /// Known crypto tickers, in registry rank order.
    pub fn get_tickers(&self) -> Vec<String> {
        currencies::crypto_tickers()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub async fn get_daily_market_cap_coins(&self) -> Result<Vec<String>> {
        self.marketcap.refresh_daily().await
    }
}
