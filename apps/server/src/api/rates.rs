//! POST /rates/:granularity

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use countervalue_core::rates::{HistoResponse, RateRequestPair};
use countervalue_market_data::{currencies, Granularity};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_PAIRS: usize = 100;

#[derive(Debug, Deserialize)]
pub struct RatesRequest {
    pub pairs: Vec<RequestPair>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPair {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
    /// Deprecated alias for `after`, daily granularity only.
    #[serde(default)]
    pub after_day: Option<String>,
    #[serde(default)]
    pub at: Option<AtFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AtFilter {
    One(String),
    Many(Vec<String>),
}

pub async fn post_rates(
    State(state): State<Arc<AppState>>,
    Path(granularity): Path<String>,
    payload: Result<Json<RatesRequest>, JsonRejection>,
) -> ApiResult<Json<HistoResponse>> {
    let granularity: Granularity = granularity
        .parse()
        .map_err(|_| ApiError::bad_request("granularity must be 'daily' or 'hourly'"))?;
    let Json(body) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let pairs = validate_pairs(body.pairs, granularity)?;
    let response = state.rates_service.get_histo(&pairs, granularity).await?;
    Ok(Json(response))
}

pub fn validate_pairs(
    pairs: Vec<RequestPair>,
    granularity: Granularity,
) -> Result<Vec<RateRequestPair>, ApiError> {
    if pairs.is_empty() {
        return Err(ApiError::bad_request("pairs must not be empty"));
    }
    if pairs.len() > MAX_PAIRS {
        return Err(ApiError::bad_request(format!(
            "pairs must contain at most {MAX_PAIRS} items"
        )));
    }

    let mut seen: HashSet<(String, String, Option<String>)> = HashSet::new();
    let mut validated = Vec::with_capacity(pairs.len());
    for pair in pairs {
        for ticker in [&pair.from, &pair.to] {
            if !currencies::is_supported(ticker) {
                return Err(ApiError::bad_request(format!(
                    "unsupported ticker '{ticker}'"
                )));
            }
        }
        if pair.after_day.is_some() && granularity != Granularity::Daily {
            return Err(ApiError::bad_request(
                "afterDay is only accepted for daily granularity",
            ));
        }
        let key = (
            pair.from.clone(),
            pair.to.clone(),
            pair.exchange.as_ref().map(|e| e.to_lowercase()),
        );
        if !seen.insert(key) {
            return Err(ApiError::bad_request("pairs must not contain duplicates"));
        }
        validated.push(RateRequestPair {
            from: pair.from,
            to: pair.to,
            exchange: pair.exchange,
            after: pair.after.or(pair.after_day),
            at: pair.at.map(|at| match at {
                AtFilter::One(key) => vec![key],
                AtFilter::Many(keys) => keys,
            }),
        });
    }
    Ok(validated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(from: &str, to: &str, exchange: Option<&str>) -> RequestPair {
        RequestPair {
            from: from.to_string(),
            to: to.to_string(),
            exchange: exchange.map(str::to_string),
            after: None,
            after_day: None,
            at: None,
        }
    }

    fn message(error: ApiError) -> String {
        match error {
            ApiError::BadRequest(message) => message,
            other => panic!("expected a 400, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_pairs_are_rejected() {
        let error = validate_pairs(
            vec![pair("BTC", "USD", None), pair("BTC", "USD", None)],
            Granularity::Daily,
        )
        .unwrap_err();
        assert_eq!(message(error), "pairs must not contain duplicates");
    }

    #[test]
    fn duplicate_detection_is_exchange_case_insensitive() {
        let error = validate_pairs(
            vec![
                pair("BTC", "USD", Some("Kraken")),
                pair("BTC", "USD", Some("KRAKEN")),
            ],
            Granularity::Daily,
        )
        .unwrap_err();
        assert_eq!(message(error), "pairs must not contain duplicates");

        // Distinct exchanges for the same pair are fine.
        assert!(validate_pairs(
            vec![
                pair("BTC", "USD", Some("Kraken")),
                pair("BTC", "USD", Some("Binance")),
            ],
            Granularity::Daily,
        )
        .is_ok());
    }

    #[test]
    fn the_pair_count_is_capped() {
        let pairs: Vec<RequestPair> = (0..101).map(|_| pair("BTC", "USD", None)).collect();
        let error = validate_pairs(pairs, Granularity::Daily).unwrap_err();
        assert!(message(error).contains("at most 100"));
    }

    #[test]
    fn unknown_tickers_are_rejected() {
        let error =
            validate_pairs(vec![pair("NOPE", "USD", None)], Granularity::Daily).unwrap_err();
        assert!(message(error).contains("unsupported ticker"));
    }

    #[test]
    fn after_day_is_daily_only() {
        let mut hourly = pair("BTC", "USD", None);
        hourly.after_day = Some("2024-01-01".to_string());
        let error = validate_pairs(vec![hourly], Granularity::Hourly).unwrap_err();
        assert!(message(error).contains("afterDay"));

        let mut daily = pair("BTC", "USD", None);
        daily.after_day = Some("2024-01-01".to_string());
        let validated = validate_pairs(vec![daily], Granularity::Daily).unwrap();
        assert_eq!(validated[0].after.as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn at_accepts_a_string_or_a_list() {
        let mut single = pair("BTC", "USD", None);
        single.at = Some(AtFilter::One("2024-01-01".to_string()));
        let mut many = pair("ETH", "USD", None);
        many.at = Some(AtFilter::Many(vec![
            "2024-01-01".to_string(),
            "2024-01-02".to_string(),
        ]));
        let validated = validate_pairs(vec![single, many], Granularity::Daily).unwrap();
        assert_eq!(validated[0].at.as_ref().unwrap().len(), 1);
        assert_eq!(validated[1].at.as_ref().unwrap().len(), 2);
    }
}
