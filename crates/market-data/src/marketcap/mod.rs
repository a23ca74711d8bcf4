//! Market-capitalisation ranking source.
//!
//! Independent from the price providers: whichever adapter serves rates,
//! the daily crypto ranking comes from CoinMarketCap.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;

use crate::errors::MarketDataError;

const BASE_URL: &str = "https://pro-api.coinmarketcap.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LISTING_LIMIT: u32 = 200;

#[async_trait]
pub trait MarketCapSource: Send + Sync {
    /// Crypto tickers ordered by market capitalisation, best first.
    async fn fetch_top_tickers(&self) -> Result<Vec<String>, MarketDataError>;
}

#[derive(Debug, Deserialize)]
struct ListingsResponse {
    #[serde(default)]
    data: Vec<Listing>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default)]
    symbol: String,
    #[serde(default)]
    cmc_rank: Option<u32>,
}

pub struct CoinMarketCapSource {
    client: Client,
    api_key: Option<String>,
}

impl CoinMarketCapSource {
    pub fn from_env() -> Self {
        Self::new(std::env::var("CMC_API_KEY").ok().filter(|k| !k.is_empty()))
    }

    pub fn new(api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, api_key }
    }
}

#[async_trait]
impl MarketCapSource for CoinMarketCapSource {
    async fn fetch_top_tickers(&self) -> Result<Vec<String>, MarketDataError> {
        let Some(api_key) = &self.api_key else {
            return Err(MarketDataError::Config("CMC_API_KEY is not set".to_string()));
        };
        let response = self
            .client
            .get(format!("{BASE_URL}/cryptocurrency/listings/latest"))
            .header("X-CMC_PRO_API_KEY", api_key)
            .query(&[
                ("limit", LISTING_LIMIT.to_string()),
                ("convert", "USD".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<ListingsResponse>()
            .await?;

        let mut listings = response.data;
        listings.sort_by_key(|l| l.cmc_rank.unwrap_or(u32::MAX));
        let tickers: Vec<String> = listings
            .into_iter()
            .filter(|l| !l.symbol.is_empty())
            .map(|l| l.symbol)
            .collect();
        debug!("coinmarketcap returned {} ranked tickers", tickers.len());
        Ok(tickers)
    }
}
