//! CryptoCompare adapter.
//!
//! REST catalogue and history come from `min-api.cryptocompare.com`;
//! live prices from the v2 streamer. An API key is optional for the
//! public endpoints and passed as an `Apikey` authorization header when
//! present.

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

use self::models::{
    AllExchangesResponse, GeneralExchangesResponse, HistoResponse, StreamMessage,
};

use super::MarketDataProvider;

const PROVIDER_ID: &str = "cryptocompare";
const BASE_URL: &str = "https://min-api.cryptocompare.com/data";
const STREAM_URL: &str = "wss://streamer.cryptocompare.com/v2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Subscriptions are sent in chunks to keep individual frames small.
const SUBSCRIBE_BATCH: usize = 50;

pub struct CryptoCompareProvider {
    client: Client,
    api_key: Option<String>,
}

impl CryptoCompareProvider {
    pub fn new(api_key: Option<String>) -> Self {
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
        let mut request = self.client.get(format!("{BASE_URL}{path}")).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("authorization", format!("Apikey {key}"));
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl MarketDataProvider for CryptoCompareProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn init(&self) -> Result<(), MarketDataError> {
        // Cheap readiness probe; also validates the key when one is set.
        let _: serde_json::Value = self
            .get("/price", &[("fsym", "BTC".into()), ("tsyms", "USD".into())])
            .await?;
        Ok(())
    }

    async fn fetch_available_pair_exchanges(&self) -> Result<Vec<PairExchange>, MarketDataError> {
        let response: AllExchangesResponse = self.get("/v4/all/exchanges", &[]).await?;
        let mut pairs = Vec::new();
        for (exchange, entry) in response.data.exchanges {
            if !entry.is_active {
                continue;
            }
            for (from, pair) in entry.pairs {
                if !currencies::is_supported(&from) {
                    continue;
                }
                for to in pair.tsyms.keys() {
                    if currencies::is_supported(to) {
                        pairs.push(PairExchange::new(exchange.clone(), from.clone(), to.clone()));
                    }
                }
            }
        }
        debug!("cryptocompare advertised {} supported pairs", pairs.len());
        Ok(pairs)
    }

    async fn fetch_exchanges(&self) -> Result<Vec<ExchangeInfo>, MarketDataError> {
        let response: GeneralExchangesResponse = self.get("/exchanges/general", &[]).await?;
        Ok(response
            .data
            .into_iter()
            .map(|(key, entry)| {
                let id = if entry.internal_name.is_empty() {
                    key
                } else {
                    entry.internal_name
                };
                let name = if entry.name.is_empty() {
                    id.clone()
                } else {
                    entry.name
                };
                ExchangeInfo {
                    id,
                    name,
                    website: entry.url.filter(|u| !u.is_empty()),
                }
            })
            .collect())
    }

    async fn fetch_histo_series(
        &self,
        pair_exchange: &PairExchange,
        granularity: Granularity,
        limit: Option<u32>,
    ) -> Result<Vec<OhlcvPoint>, MarketDataError> {
        let (path, default_limit) = match granularity {
            Granularity::Daily => ("/v2/histoday", 365),
            Granularity::Hourly => ("/v2/histohour", 168),
        };
        let response: HistoResponse = self
            .get(
                path,
                &[
                    ("fsym", pair_exchange.from.clone()),
                    ("tsym", pair_exchange.to.clone()),
                    ("e", pair_exchange.exchange.clone()),
                    ("limit", limit.unwrap_or(default_limit).to_string()),
                ],
            )
            .await?;
        if response.response == "Error" {
            return Err(MarketDataError::Provider(response.message));
        }
        let mut points = Vec::with_capacity(response.data.data.len());
        for raw in response.data.data {
            let Some(time) = DateTime::<Utc>::from_timestamp(raw.time, 0) else {
                warn!(
                    "cryptocompare returned out-of-range timestamp {} for {}",
                    raw.time, pair_exchange
                );
                continue;
            };
            points.push(OhlcvPoint {
                time,
                open: raw.open,
                high: raw.high,
                low: raw.low,
                close: raw.close,
                volume: raw.volume_from,
            });
        }
        Ok(points)
    }

    async fn subscribe_price_updates(&self) -> Result<PriceStream, MarketDataError> {
        let pairs = self.fetch_available_pair_exchanges().await?;
        let url = match &self.api_key {
            Some(key) => format!("{STREAM_URL}?api_key={key}"),
            None => STREAM_URL.to_string(),
        };
        let (websocket, _) = connect_async(url.as_str()).await?;
        let token = subscription::register(PROVIDER_ID);
        let (tx, rx) = mpsc::channel(LIVE_CHANNEL_CAPACITY);
        let task = tokio::spawn(run_stream(websocket, pairs, tx));
        Ok(PriceStream::new(rx, SubscriptionGuard::new(token, task)))
    }
}

async fn run_stream(
    websocket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    pairs: Vec<PairExchange>,
    tx: mpsc::Sender<PriceUpdate>,
) {
    let (mut sink, mut stream) = websocket.split();

    let subs: Vec<String> = pairs
        .iter()
        .map(|p| format!("2~{}~{}~{}", p.exchange, p.from, p.to))
        .collect();
    for chunk in subs.chunks(SUBSCRIBE_BATCH) {
        let message = serde_json::json!({ "action": "SubAdd", "subs": chunk });
        if sink.send(Message::Text(message.to_string())).await.is_err() {
            warn!("cryptocompare streamer closed during subscription");
            return;
        }
    }

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Some(update) = parse_stream_message(&text) {
                    if tx.send(update).await.is_err() {
                        // Consumer went away; unsubscribe by closing.
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                debug!("cryptocompare streamer sent close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("cryptocompare streamer error: {e}");
                break;
            }
        }
    }
}

fn parse_stream_message(text: &str) -> Option<PriceUpdate> {
    let message: StreamMessage = serde_json::from_str(text).ok()?;
    if message.message_type != "2" {
        return None;
    }
    let price = message.price?;
    let market = message.market?;
    let from = message.from_symbol?;
    let to = message.to_symbol?;
    if !currencies::is_supported(&from) || !currencies::is_supported(&to) {
        return None;
    }
    Some(PriceUpdate {
        pair_exchange: PairExchange::new(market, from, to),
        price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_frames_become_price_updates() {
        let update = parse_stream_message(
            r#"{"TYPE":"2","MARKET":"Kraken","FROMSYMBOL":"BTC","TOSYMBOL":"USD","PRICE":23456.7}"#,
        )
        .unwrap();
        assert_eq!(update.pair_exchange.id(), "Kraken_BTC_USD");
        assert!((update.price - 23456.7).abs() < 1e-9);
    }

    #[test]
    fn non_trade_and_unsupported_frames_are_dropped() {
        assert!(parse_stream_message(r#"{"TYPE":"20","MESSAGE":"STREAMERWELCOME"}"#).is_none());
        assert!(parse_stream_message(
            r#"{"TYPE":"2","MARKET":"Kraken","FROMSYMBOL":"XXXX","TOSYMBOL":"USD","PRICE":1.0}"#
        )
        .is_none());
        // Frames without a price (e.g. volume-only deltas) are skipped.
        assert!(parse_stream_message(
            r#"{"TYPE":"2","MARKET":"Kraken","FROMSYMBOL":"BTC","TOSYMBOL":"USD"}"#
        )
        .is_none());
    }
}
