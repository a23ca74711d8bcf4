use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PairExchange;

/// A single OHLCV point as produced by a provider. The close is the raw
/// observed price; unit normalisation happens in the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvPoint {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A streaming price event. Providers emit these already filtered to
/// supported tickers; the live pipeline converts the raw price into a
/// centSat rate.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub pair_exchange: PairExchange,
    pub price: f64,
}

/// Exchange metadata as advertised by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeInfo {
    pub id: String,
    pub name: String,
    pub website: Option<String>,
}
