//! Countervalue core crate.
//!
//! The ingestion and cache engine: throttled refresh of pairs, exchanges
//! and historical series, derived per-pair statistics, the live price
//! pipeline with its supervisor, background prefetch, the daily
//! market-cap ranking, and the read facade consumed by the HTTP layer.
//!
//! Providers and the persistent store stay behind the
//! [`countervalue_market_data::MarketDataProvider`] and [`store::Store`]
//! contracts; everything here is backend-agnostic.

pub mod config;
pub mod constants;
pub mod errors;
pub mod live;
pub mod marketcap;
pub mod prefetch;
pub mod rates;
pub mod refresh;
pub mod store;
pub mod throttle;

pub use config::EngineConfig;
pub use errors::{DatabaseError, Error, Result, ValidationError};
pub use live::{supervise, LivePricePipeline};
pub use marketcap::MarketCapService;
pub use rates::{HistoResponse, PairData, RateRequestPair, RatesService};
pub use refresh::RefreshService;
pub use store::{MemoryStore, Store};
pub use throttle::{ThrottleMap, ThrottledAction};
