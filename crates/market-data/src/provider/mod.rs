//! Market data provider contract and adapter selection.
//!
//! A provider is anything that can enumerate spot pairs, describe
//! exchanges, serve historical OHLCV series, and stream live prices.
//! Adapters are selected by the `PROVIDER` environment variable.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{ExchangeInfo, Granularity, OhlcvPoint, PairExchange};
use crate::subscription::PriceStream;

pub mod coinapi;
pub mod cryptocompare;
pub mod kaiko;

pub use coinapi::CoinApiProvider;
pub use cryptocompare::CryptoCompareProvider;
pub use kaiko::KaikoProvider;

/// Hard cap on internal pagination loops. Reaching it is logged, never
/// fatal; the adapter returns what it has.
pub const MAX_PAGES: usize = 100;

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Adapter identifier, used in logs.
    fn id(&self) -> &'static str;

    /// One-time readiness check, e.g. verifying credentials. Called once
    /// at startup; a failure is fatal.
    async fn init(&self) -> Result<(), MarketDataError> {
        Ok(())
    }

    /// Enumerates all spot pairs, filtered so both tickers are supported
    /// by the currency registry.
    async fn fetch_available_pair_exchanges(&self) -> Result<Vec<PairExchange>, MarketDataError>;

    /// Lists the exchanges the provider knows about.
    async fn fetch_exchanges(&self) -> Result<Vec<ExchangeInfo>, MarketDataError>;

    /// Fetches an OHLCV series for one pair exchange. Point order is
    /// adapter-defined; callers must sort.
    async fn fetch_histo_series(
        &self,
        pair_exchange: &PairExchange,
        granularity: Granularity,
        limit: Option<u32>,
    ) -> Result<Vec<OhlcvPoint>, MarketDataError>;

    /// Opens a cold stream of live price updates, already filtered to
    /// supported tickers. Dropping the stream closes the transport.
    async fn subscribe_price_updates(&self) -> Result<PriceStream, MarketDataError>;
}

/// Builds the adapter named by the `PROVIDER` environment variable,
/// checking that its credentials are present.
pub fn provider_from_env() -> Result<Arc<dyn MarketDataProvider>, MarketDataError> {
    let name = std::env::var("PROVIDER").unwrap_or_else(|_| "cryptocompare".to_string());
    match name.as_str() {
        "coinapi" => {
            let api_key = require_env("COINAPI_KEY")?;
            Ok(Arc::new(CoinApiProvider::new(api_key)))
        }
        "cryptocompare" => Ok(Arc::new(CryptoCompareProvider::new(
            std::env::var("CRYPTOCOMPARE_API_KEY").ok(),
        ))),
        "kaiko" => Ok(Arc::new(KaikoProvider::from_env()?)),
        other => Err(MarketDataError::Config(format!(
            "unknown PROVIDER '{other}'"
        ))),
    }
}

pub(crate) fn require_env(key: &str) -> Result<String, MarketDataError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(MarketDataError::Config(format!("{key} is not set"))),
    }
}
