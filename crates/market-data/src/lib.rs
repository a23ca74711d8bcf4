//! Countervalue market data crate.
//!
//! Provider-agnostic market data access for the countervalue service:
//!
//! - the registry of supported tickers and their decimal magnitudes,
//! - the canonical pair-exchange identifier and time-bucket codecs,
//! - the [`MarketDataProvider`] contract with CoinAPI, CryptoCompare and
//!   Kaiko adapters,
//! - streaming subscription plumbing with a process-wide connection cap,
//! - the CoinMarketCap ranking source.
//!
//! The cache engine in `countervalue-core` consumes this crate through
//! the provider traits only; adapters stay swappable behind the
//! `PROVIDER` environment variable.

pub mod currencies;
pub mod errors;
pub mod marketcap;
pub mod models;
pub mod provider;
pub mod subscription;

pub use errors::MarketDataError;
pub use marketcap::{CoinMarketCapSource, MarketCapSource};
pub use models::{ExchangeInfo, Granularity, OhlcvPoint, Pair, PairExchange, PriceUpdate};
pub use provider::{
    provider_from_env, CoinApiProvider, CryptoCompareProvider, KaikoProvider, MarketDataProvider,
    MAX_PAGES,
};
pub use subscription::{PriceStream, SubscriptionGuard, SubscriptionToken, MAX_WEBSOCKET};
