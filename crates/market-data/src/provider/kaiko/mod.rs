//! Kaiko adapter.
//!
//! Reference data (instruments, exchanges) comes from
//! `reference-data-api.kaiko.io`; OHLCV aggregations from the regioned
//! market API. Both paginate through `next_url` links. The trade stream
//! is gated behind `USE_KAIKO_WSS` and a dedicated websocket key.

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

use self::models::{ExchangesResponse, InstrumentsResponse, OhlcvResponse, StreamMessage};

use super::{require_env, MarketDataProvider, MAX_PAGES};

const PROVIDER_ID: &str = "kaiko";
const REFERENCE_BASE_URL: &str = "https://reference-data-api.kaiko.io/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const PAGE_SIZE: u32 = 1000;

pub struct KaikoProvider {
    client: Client,
    api_key: String,
    wss_key: Option<String>,
    region: String,
    api_version: String,
    use_wss: bool,
}

impl KaikoProvider {
    pub fn from_env() -> Result<Self, MarketDataError> {
        let api_key = require_env("KAIKO_KEY")?;
        let wss_key = std::env::var("KAIKO_KEY_WSS").ok().filter(|k| !k.is_empty());
        let region = std::env::var("KAIKO_REGION").unwrap_or_else(|_| "eu".to_string());
        let api_version = std::env::var("KAIKO_API_VERSION").unwrap_or_else(|_| "v1".to_string());
        let use_wss = std::env::var("USE_KAIKO_WSS")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);
        Ok(Self::new(api_key, wss_key, region, api_version, use_wss))
    }

    pub fn new(
        api_key: String,
        wss_key: Option<String>,
        region: String,
        api_version: String,
        use_wss: bool,
    ) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key,
            wss_key,
            region,
            api_version,
            use_wss,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, MarketDataError> {
        let response = self
            .client
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .query(query)
            .send()
            .await?;
        if response.status().as_u16() == 401 {
            return Err(MarketDataError::Config(
                "KAIKO_KEY was rejected by the provider".to_string(),
            ));
        }
        Ok(response.error_for_status()?.json::<T>().await?)
    }

    fn ohlcv_url(&self, pair_exchange: &PairExchange) -> String {
        format!(
            "https://{}.market-api.kaiko.io/v2/data/trades.{}/exchanges/{}/spot/{}-{}/aggregations/ohlcv",
            self.region,
            self.api_version,
            pair_exchange.exchange.to_lowercase(),
            pair_exchange.from.to_lowercase(),
            pair_exchange.to.to_lowercase(),
        )
    }
}

fn parse_price(value: Option<&String>) -> f64 {
    value.and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0)
}

#[async_trait]
impl MarketDataProvider for KaikoProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn init(&self) -> Result<(), MarketDataError> {
        let url = format!("{REFERENCE_BASE_URL}/exchanges");
        let _: ExchangesResponse = self.get(&url, &[]).await?;
        Ok(())
    }

    async fn fetch_available_pair_exchanges(&self) -> Result<Vec<PairExchange>, MarketDataError> {
        let mut pairs = Vec::new();
        let mut url = format!("{REFERENCE_BASE_URL}/instruments");
        for page in 0..MAX_PAGES {
            let response: InstrumentsResponse = self.get(&url, &[]).await?;
            for instrument in response.data {
                if instrument.class != "spot" {
                    continue;
                }
                let from = instrument.base_asset.to_uppercase();
                let to = instrument.quote_asset.to_uppercase();
                if currencies::is_supported(&from) && currencies::is_supported(&to) {
                    pairs.push(PairExchange::new(instrument.exchange_code, from, to));
                }
            }
            match response.next_url {
                Some(next) if !next.is_empty() => {
                    url = next;
                    if page + 1 == MAX_PAGES {
                        warn!(
                            "kaiko instrument pagination cap reached, keeping {} pairs",
                            pairs.len()
                        );
                    }
                }
                _ => break,
            }
        }
        debug!("kaiko advertised {} supported pairs", pairs.len());
        Ok(pairs)
    }

    async fn fetch_exchanges(&self) -> Result<Vec<ExchangeInfo>, MarketDataError> {
        let url = format!("{REFERENCE_BASE_URL}/exchanges");
        let response: ExchangesResponse = self.get(&url, &[]).await?;
        Ok(response
            .data
            .into_iter()
            .filter(|e| !e.code.is_empty())
            .map(|e| ExchangeInfo {
                name: e.name.unwrap_or_else(|| e.code.clone()),
                website: None,
                id: e.code,
            })
            .collect())
    }

    async fn fetch_histo_series(
        &self,
        pair_exchange: &PairExchange,
        granularity: Granularity,
        limit: Option<u32>,
    ) -> Result<Vec<OhlcvPoint>, MarketDataError> {
        let interval = match granularity {
            Granularity::Daily => "1d",
            Granularity::Hourly => "1h",
        };
        let mut url = self.ohlcv_url(pair_exchange);
        let mut query = vec![
            ("interval", interval.to_string()),
            ("page_size", PAGE_SIZE.to_string()),
        ];
        let mut points: Vec<OhlcvPoint> = Vec::new();
        for page in 0..MAX_PAGES {
            let response: OhlcvResponse = self.get(&url, &query).await?;
            for entry in response.data {
                let Some(time) = DateTime::<Utc>::from_timestamp_millis(entry.timestamp) else {
                    warn!(
                        "kaiko returned out-of-range timestamp {} for {}",
                        entry.timestamp, pair_exchange
                    );
                    continue;
                };
                points.push(OhlcvPoint {
                    time,
                    open: parse_price(entry.open.as_ref()),
                    high: parse_price(entry.high.as_ref()),
                    low: parse_price(entry.low.as_ref()),
                    close: parse_price(entry.close.as_ref()),
                    volume: parse_price(entry.volume.as_ref()),
                });
            }
            if let Some(wanted) = limit {
                if points.len() >= wanted as usize {
                    points.truncate(wanted as usize);
                    break;
                }
            }
            match response.next_url {
                Some(next) if !next.is_empty() => {
                    // next_url already embeds the query parameters.
                    url = next;
                    query.clear();
                    if page + 1 == MAX_PAGES {
                        warn!(
                            "kaiko ohlcv pagination cap reached for {}, returning {} points",
                            pair_exchange,
                            points.len()
                        );
                    }
                }
                _ => break,
            }
        }
        Ok(points)
    }

    async fn subscribe_price_updates(&self) -> Result<PriceStream, MarketDataError> {
        if !self.use_wss {
            return Err(MarketDataError::NotSupported {
                operation: "subscribe_price_updates".to_string(),
                provider: PROVIDER_ID.to_string(),
            });
        }
        let Some(wss_key) = self.wss_key.clone() else {
            return Err(MarketDataError::Config("KAIKO_KEY_WSS is not set".to_string()));
        };
        let url = format!(
            "wss://{}.market-ws.kaiko.io/v2/update?api_key={}",
            self.region, wss_key
        );
        let (websocket, _) = connect_async(url.as_str()).await?;
        let token = subscription::register(PROVIDER_ID);
        let (tx, rx) = mpsc::channel(LIVE_CHANNEL_CAPACITY);
        let task = tokio::spawn(run_stream(websocket, tx));
        Ok(PriceStream::new(rx, SubscriptionGuard::new(token, task)))
    }
}

async fn run_stream(
    websocket: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    tx: mpsc::Sender<PriceUpdate>,
) {
    let (mut sink, mut stream) = websocket.split();

    let subscribe = serde_json::json!({
        "type": "subscribe",
        "topics": ["trades"],
        "pattern": "*:spot:*",
    });
    if sink.send(Message::Text(subscribe.to_string())).await.is_err() {
        warn!("kaiko websocket closed during subscription");
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
                debug!("kaiko websocket sent close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("kaiko websocket error: {e}");
                break;
            }
        }
    }
}

fn parse_stream_message(text: &str) -> Option<PriceUpdate> {
    let message: StreamMessage = serde_json::from_str(text).ok()?;
    let exchange = message.exchange?;
    let instrument = message.instrument?;
    let price = message.price?.parse::<f64>().ok()?;
    let (base, quote) = instrument.split_once('-')?;
    let from = base.to_uppercase();
    let to = quote.to_uppercase();
    if !currencies::is_supported(&from) || !currencies::is_supported(&to) {
        return None;
    }
    Some(PriceUpdate {
        pair_exchange: PairExchange::new(exchange, from, to),
        price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_frames_become_price_updates() {
        let update = parse_stream_message(
            r#"{"exchange":"krkn","instrument":"btc-usd","price":"23456.7"}"#,
        )
        .unwrap();
        assert_eq!(update.pair_exchange.id(), "krkn_BTC_USD");
        assert!((update.price - 23456.7).abs() < 1e-9);
    }

    #[test]
    fn unsupported_instruments_are_dropped() {
        assert!(
            parse_stream_message(r#"{"exchange":"krkn","instrument":"xxxx-usd","price":"1"}"#)
                .is_none()
        );
    }

    #[test]
    fn string_prices_parse_with_zero_fallback() {
        assert_eq!(parse_price(Some(&"12.5".to_string())), 12.5);
        assert_eq!(parse_price(Some(&"garbage".to_string())), 0.0);
        assert_eq!(parse_price(None), 0.0);
    }
}
