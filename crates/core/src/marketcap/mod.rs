//! Daily cached ranking of crypto tickers by market capitalisation.

use std::sync::Arc;

use chrono::Utc;
use log::info;

use countervalue_market_data::{currencies, Granularity, MarketCapSource};

use crate::constants::MARKETCAP_REFRESH_WINDOW;
use crate::errors::Result;
use crate::store::Store;
use crate::throttle::ThrottledAction;

pub struct MarketCapService {
    source: Arc<dyn MarketCapSource>,
    store: Arc<dyn Store>,
    throttle: ThrottledAction<Vec<String>>,
}

impl MarketCapService {
    pub fn new(source: Arc<dyn MarketCapSource>, store: Arc<dyn Store>) -> Self {
        Self {
            source,
            store,
            throttle: ThrottledAction::new(MARKETCAP_REFRESH_WINDOW),
        }
    }

    /// Today's ranking. The store snapshot gates the external call to
    /// once per day; the short throttle window only bounds store reads.
    pub async fn refresh_daily(&self) -> Result<Vec<String>> {
        let source = self.source.clone();
        let store = self.store.clone();
        self.throttle
            .run(move || async move {
                let day = Granularity::Daily.format_key(Utc::now());
                if let Some(coins) = store.query_market_cap_coins_for_day(&day).await? {
                    return Ok(coins);
                }
                let tickers = source.fetch_top_tickers().await?;
                let coins: Vec<String> = tickers
                    .into_iter()
                    .filter(|ticker| currencies::is_crypto(ticker))
                    .collect();
                store.update_market_cap_coins(&day, &coins).await?;
                info!("cached market cap ranking for {day} ({} coins)", coins.len());
                Ok(coins)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use countervalue_market_data::MarketDataError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::store::MemoryStore;

    struct RankedSource {
        calls: AtomicUsize,
        tickers: Vec<String>,
    }

    #[async_trait]
    impl MarketCapSource for RankedSource {
        async fn fetch_top_tickers(&self) -> std::result::Result<Vec<String>, MarketDataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tickers.clone())
        }
    }

    #[tokio::test]
    async fn ranking_is_filtered_and_cached_per_day() {
        let source = Arc::new(RankedSource {
            calls: AtomicUsize::new(0),
            tickers: vec![
                "BTC".to_string(),
                "WEIRDCOIN".to_string(),
                "ETH".to_string(),
                "USD".to_string(),
            ],
        });
        let store = Arc::new(MemoryStore::new());
        let service = MarketCapService::new(source.clone(), store.clone());

        let coins = service.refresh_daily().await.unwrap();
        assert_eq!(coins, vec!["BTC".to_string(), "ETH".to_string()]);
        assert!(store.get_meta().await.unwrap().last_market_cap_sync > 0);

        // The stored snapshot satisfies later calls without a fetch.
        let again = MarketCapService::new(source.clone(), store.clone())
            .refresh_daily()
            .await
            .unwrap();
        assert_eq!(again, coins);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
