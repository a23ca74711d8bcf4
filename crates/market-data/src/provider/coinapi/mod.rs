//! CoinAPI adapter.
//!
//! REST data comes from `rest.coinapi.io` with `X-CoinAPI-Key`
//! authentication; live trades from `ws.coinapi.io`. Historical series
//! page backwards through `time_end` until the series is exhausted or
//! the pagination cap is hit.

mod models;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::currencies;
use crate::errors::MarketDataError;
use crate::models::{ExchangeInfo, Granularity, OhlcvPoint, PairExchange, PriceUpdate};
use crate::subscription::{self, PriceStream, SubscriptionGuard, LIVE_CHANNEL_CAPACITY};

use self::models::{ExchangeEntry, OhlcvEntry, StreamMessage, SymbolEntry};

use super::{MarketDataProvider, MAX_PAGES};

const PROVIDER_ID: &str = "coinapi";
const BASE_URL: &str = "https://rest.coinapi.io/v1";
const STREAM_URL: &str = "wss://ws.coinapi.io/v1/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const PAGE_SIZE: u32 = 1000;

pub struct CoinApiProvider {
    client: Client,
    api_key: String,
}

impl CoinApiProvider {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, api_key }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, MarketDataError> {
        let response = self
            .client
            .get(format!("{BASE_URL}{path}"))
            .header("X-CoinAPI-Key", &self.api_key)
            .query(query)
            .send()
            .await?;
        if response.status().as_u16() == 401 {
            return Err(MarketDataError::Config(
                "COINAPI_KEY was rejected by the provider".to_string(),
            ));
        }
        Ok(response.error_for_status()?.json::<T>().await?)
    }

    fn symbol_id(pair_exchange: &PairExchange) -> String {
        format!(
            "{}_SPOT_{}_{}",
            pair_exchange.exchange, pair_exchange.from, pair_exchange.to
        )
    }
}

#[async_trait]
impl MarketDataProvider for CoinApiProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn init(&self) -> Result<(), MarketDataError> {
        let _: serde_json::Value = self.get("/assets/BTC", &[]).await?;
        Ok(())
    }

    async fn fetch_available_pair_exchanges(&self) -> Result<Vec<PairExchange>, MarketDataError> {
        let symbols: Vec<SymbolEntry> = self
            .get("/symbols", &[("filter_symbol_id", "SPOT".to_string())])
            .await?;
        let mut pairs = Vec::new();
        for symbol in symbols {
            if symbol.symbol_type != "SPOT" {
                continue;
            }
            let (Some(from), Some(to)) = (symbol.asset_id_base, symbol.asset_id_quote) else {
                continue;
            };
            if currencies::is_supported(&from) && currencies::is_supported(&to) {
                pairs.push(PairExchange::new(symbol.exchange_id, from, to));
            }
        }
        debug!("coinapi advertised {} supported pairs", pairs.len());
        Ok(pairs)
    }

    async fn fetch_exchanges(&self) -> Result<Vec<ExchangeInfo>, MarketDataError> {
        let exchanges: Vec<ExchangeEntry> = self.get("/exchanges", &[]).await?;
        Ok(exchanges
            .into_iter()
            .filter(|e| !e.exchange_id.is_empty())
            .map(|e| ExchangeInfo {
                name: e.name.unwrap_or_else(|| e.exchange_id.clone()),
                website: e.website.filter(|w| !w.is_empty()),
                id: e.exchange_id,
            })
            .collect())
    }

    async fn fetch_histo_series(
        &self,
        pair_exchange: &PairExchange,
        granularity: Granularity,
        limit: Option<u32>,
    ) -> Result<Vec<OhlcvPoint>, MarketDataError> {
        let period_id = match granularity {
            Granularity::Daily => "1DAY",
            Granularity::Hourly => "1HRS",
        };
        let path = format!("/ohlcv/{}/history", Self::symbol_id(pair_exchange));
        let per_page = limit.map(|l| l.min(PAGE_SIZE)).unwrap_or(PAGE_SIZE);

        let mut points: Vec<OhlcvPoint> = Vec::new();
        let mut time_end: Option<String> = None;
        for page in 0..MAX_PAGES {
            let mut query = vec![
                ("period_id", period_id.to_string()),
                ("limit", per_page.to_string()),
            ];
            if let Some(end) = &time_end {
                query.push(("time_end", end.clone()));
            }
            let batch: Vec<OhlcvEntry> = self.get(&path, &query).await?;
            let batch_len = batch.len();

            let mut oldest: Option<String> = None;
            for entry in batch {
                let time = match DateTime::parse_from_rfc3339(&entry.time_period_start) {
                    Ok(t) => t.with_timezone(&Utc),
                    Err(e) => {
                        warn!(
                            "coinapi returned unparseable period start '{}': {e}",
                            entry.time_period_start
                        );
                        continue;
                    }
                };
                match &oldest {
                    Some(o) if *o <= entry.time_period_start => {}
                    _ => oldest = Some(entry.time_period_start.clone()),
                }
                points.push(OhlcvPoint {
                    time,
                    open: entry.price_open,
                    high: entry.price_high,
                    low: entry.price_low,
                    close: entry.price_close,
                    volume: entry.volume_traded,
                });
            }

            if let Some(wanted) = limit {
                if points.len() >= wanted as usize {
                    points.truncate(wanted as usize);
                    break;
                }
            }
            if batch_len < per_page as usize {
                break;
            }
            time_end = oldest;
            if page + 1 == MAX_PAGES {
                warn!(
                    "coinapi pagination cap reached for {}, returning {} points",
                    pair_exchange,
                    points.len()
                );
            }
        }
        Ok(points)
    }

    async fn subscribe_price_updates(&self) -> Result<PriceStream, MarketDataError> {
        let (websocket, _) = connect_async(STREAM_URL).await?;
        let token = subscription::register(PROVIDER_ID);
        let (tx, rx) = mpsc::channel(LIVE_CHANNEL_CAPACITY);
        let api_key = self.api_key.clone();
        let task = tokio::spawn(run_stream(websocket, api_key, tx));
        Ok(PriceStream::new(rx, SubscriptionGuard::new(token, task)))
    }
}

async fn run_stream(
    websocket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    api_key: String,
    tx: mpsc::Sender<PriceUpdate>,
) {
    let (mut sink, mut stream) = websocket.split();

    let hello = serde_json::json!({
        "type": "hello",
        "apikey": api_key,
        "heartbeat": false,
        "subscribe_data_type": ["trade"],
        "subscribe_filter_symbol_id": ["SPOT"],
    });
    if sink.send(Message::Text(hello.to_string())).await.is_err() {
        warn!("coinapi websocket closed during hello");
        return;
    }

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Some(update) = parse_stream_message(&text) {
                    if tx.send(update).await.is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                debug!("coinapi websocket sent close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("coinapi websocket error: {e}");
                break;
            }
        }
    }
}

fn parse_stream_message(text: &str) -> Option<PriceUpdate> {
    let message: StreamMessage = serde_json::from_str(text).ok()?;
    if message.message_type != "trade" {
        return None;
    }
    let price = message.price?;
    let pair_exchange = parse_symbol_id(&message.symbol_id?)?;
    Some(PriceUpdate {
        pair_exchange,
        price,
    })
}

/// CoinAPI spot symbol ids look like `KRAKEN_SPOT_BTC_USD`; the exchange
/// part may itself contain underscores.
fn parse_symbol_id(symbol_id: &str) -> Option<PairExchange> {
    let (exchange, rest) = symbol_id.split_once("_SPOT_")?;
    let (from, to) = rest.split_once('_')?;
    if exchange.is_empty() || !currencies::is_supported(from) || !currencies::is_supported(to) {
        return None;
    }
    Some(PairExchange::new(exchange, from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_symbol_ids_parse() {
        let pair = parse_symbol_id("KRAKEN_SPOT_BTC_USD").unwrap();
        assert_eq!(pair.id(), "KRAKEN_BTC_USD");

        let pair = parse_symbol_id("BINANCE_US_SPOT_ETH_EUR").unwrap();
        assert_eq!(pair.exchange, "BINANCE_US");
    }

    #[test]
    fn derivative_and_unsupported_symbols_are_dropped() {
        assert!(parse_symbol_id("KRAKEN_PERP_BTC_USD").is_none());
        assert!(parse_symbol_id("KRAKEN_SPOT_XXXX_USD").is_none());
    }

    #[test]
    fn only_trade_frames_produce_updates() {
        assert!(parse_stream_message(
            r#"{"type":"trade","symbol_id":"KRAKEN_SPOT_BTC_USD","price":42000.5}"#
        )
        .is_some());
        assert!(parse_stream_message(r#"{"type":"hearbeat"}"#).is_none());
    }
}
