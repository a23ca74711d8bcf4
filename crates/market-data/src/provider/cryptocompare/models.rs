//! Response models for the CryptoCompare min-api and streamer.

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct AllExchangesResponse {
    #[serde(rename = "Data", default)]
    pub data: AllExchangesData,
}

#[derive(Debug, Deserialize, Default)]
pub struct AllExchangesData {
    #[serde(default)]
    pub exchanges: HashMap<String, ExchangeEntry>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ExchangeEntry {
    #[serde(rename = "isActive", default)]
    pub is_active: bool,
    #[serde(default)]
    pub pairs: HashMap<String, PairEntry>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PairEntry {
    /// Destination tickers, keyed by symbol. Values carry listing
    /// details this adapter does not use.
    #[serde(default)]
    pub tsyms: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
pub struct GeneralExchangesResponse {
    #[serde(rename = "Data", default)]
    pub data: HashMap<String, GeneralExchangeEntry>,
}

#[derive(Debug, Deserialize, Default)]
pub struct GeneralExchangeEntry {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "InternalName", default)]
    pub internal_name: String,
    #[serde(rename = "Url", default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct HistoResponse {
    #[serde(rename = "Response", default)]
    pub response: String,
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "Data", default)]
    pub data: HistoData,
}

#[derive(Debug, Deserialize, Default)]
pub struct HistoData {
    #[serde(rename = "Data", default)]
    pub data: Vec<HistoPoint>,
}

#[derive(Debug, Deserialize)]
pub struct HistoPoint {
    /// Unix seconds of the bucket open.
    pub time: i64,
    #[serde(default)]
    pub open: f64,
    #[serde(default)]
    pub high: f64,
    #[serde(default)]
    pub low: f64,
    #[serde(default)]
    pub close: f64,
    #[serde(rename = "volumefrom", default)]
    pub volume_from: f64,
}

/// One frame of the streamer. Type 2 frames carry per-exchange trade
/// prices; everything else (heartbeats, welcome, subscription acks) is
/// ignored.
#[derive(Debug, Deserialize)]
pub struct StreamMessage {
    #[serde(rename = "TYPE", default)]
    pub message_type: String,
    #[serde(rename = "MARKET", default)]
    pub market: Option<String>,
    #[serde(rename = "FROMSYMBOL", default)]
    pub from_symbol: Option<String>,
    #[serde(rename = "TOSYMBOL", default)]
    pub to_symbol: Option<String>,
    #[serde(rename = "PRICE", default)]
    pub price: Option<f64>,
}
