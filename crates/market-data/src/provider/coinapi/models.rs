//! Response models for the CoinAPI REST and websocket endpoints.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SymbolEntry {
    #[serde(default)]
    pub symbol_id: String,
    #[serde(default)]
    pub symbol_type: String,
    #[serde(default)]
    pub exchange_id: String,
    #[serde(default)]
    pub asset_id_base: Option<String>,
    #[serde(default)]
    pub asset_id_quote: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExchangeEntry {
    #[serde(default)]
    pub exchange_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OhlcvEntry {
    #[serde(default)]
    pub time_period_start: String,
    #[serde(default)]
    pub price_open: f64,
    #[serde(default)]
    pub price_high: f64,
    #[serde(default)]
    pub price_low: f64,
    #[serde(default)]
    pub price_close: f64,
    #[serde(default)]
    pub volume_traded: f64,
}

/// One websocket frame. Only `trade` frames carry a price.
#[derive(Debug, Deserialize)]
pub struct StreamMessage {
    #[serde(rename = "type", default)]
    pub message_type: String,
    #[serde(default)]
    pub symbol_id: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
}
