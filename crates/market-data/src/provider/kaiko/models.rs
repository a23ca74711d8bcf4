//! Response models for the Kaiko reference-data and market APIs.
//!
//! Kaiko serialises most numeric fields as strings; conversion helpers
//! live in the adapter.

use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct InstrumentsResponse {
    #[serde(default)]
    pub data: Vec<InstrumentEntry>,
    #[serde(default)]
    pub next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InstrumentEntry {
    #[serde(default)]
    pub exchange_code: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub base_asset: String,
    #[serde(default)]
    pub quote_asset: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ExchangesResponse {
    #[serde(default)]
    pub data: Vec<ExchangeEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ExchangeEntry {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct OhlcvResponse {
    #[serde(default)]
    pub data: Vec<OhlcvEntry>,
    #[serde(default)]
    pub next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OhlcvEntry {
    /// Bucket open, unix milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub open: Option<String>,
    #[serde(default)]
    pub high: Option<String>,
    #[serde(default)]
    pub low: Option<String>,
    #[serde(default)]
    pub close: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
}

/// One frame of the Kaiko trade stream.
#[derive(Debug, Deserialize)]
pub struct StreamMessage {
    #[serde(default)]
    pub exchange: Option<String>,
    /// Instrument code, e.g. `btc-usd`.
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
}
