//! End-to-end tests of the HTTP layer over the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use countervalue_core::store::PairExchangeRecord;
use countervalue_core::{
    EngineConfig, MarketCapService, MemoryStore, RatesService, RefreshService, Store,
};
use countervalue_market_data::{
    CoinMarketCapSource, ExchangeInfo, Granularity, MarketDataError, MarketDataProvider,
    OhlcvPoint, PairExchange, PriceStream,
};
use countervalue_server::api::app_router;
use countervalue_server::state::AppState;

struct OfflineProvider;

#[async_trait]
impl MarketDataProvider for OfflineProvider {
    fn id(&self) -> &'static str {
        "offline"
    }

    async fn fetch_available_pair_exchanges(&self) -> Result<Vec<PairExchange>, MarketDataError> {
        Ok(vec![])
    }

    async fn fetch_exchanges(&self) -> Result<Vec<ExchangeInfo>, MarketDataError> {
        Ok(vec![])
    }

    async fn fetch_histo_series(
        &self,
        _pair_exchange: &PairExchange,
        _granularity: Granularity,
        _limit: Option<u32>,
    ) -> Result<Vec<OhlcvPoint>, MarketDataError> {
        Ok(vec![])
    }

    async fn subscribe_price_updates(&self) -> Result<PriceStream, MarketDataError> {
        Err(MarketDataError::NotSupported {
            operation: "subscribe_price_updates".to_string(),
            provider: "offline".to_string(),
        })
    }
}

async fn test_state(records: Vec<PairExchangeRecord>) -> Arc<AppState> {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    store.insert_pair_exchange_data(&records).await.unwrap();
    let provider: Arc<dyn MarketDataProvider> = Arc::new(OfflineProvider);
    let engine_config = EngineConfig::default();
    let refresh_service = Arc::new(RefreshService::new(
        provider.clone(),
        store.clone(),
        engine_config.clone(),
    ));
    let marketcap_service = Arc::new(MarketCapService::new(
        Arc::new(CoinMarketCapSource::new(None)),
        store.clone(),
    ));
    let rates_service = Arc::new(RatesService::new(
        store.clone(),
        refresh_service.clone(),
        marketcap_service.clone(),
        engine_config.clone(),
    ));
    Arc::new(AppState {
        store,
        provider,
        refresh_service,
        marketcap_service,
        rates_service,
        engine_config,
    })
}

fn seasoned_record() -> PairExchangeRecord {
    let mut record =
        PairExchangeRecord::from_pair_exchange(&PairExchange::new("KRAKEN", "BTC", "USD"));
    record.has_history_for_1_year = true;
    record.latest = 0.021;
    // Mark today's bucket as loaded so the refresh serves the stored histo.
    record.history_loaded_at_daily = Some(Granularity::Daily.format_key(chrono::Utc::now()));
    record
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_rates(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/rates/daily")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn duplicate_pairs_yield_a_400() {
    let router = app_router(test_state(vec![]).await);
    let body = json!({ "pairs": [
        { "from": "BTC", "to": "USD" },
        { "from": "BTC", "to": "USD" },
    ]});
    let response = router.oneshot(post_rates(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "pairs must not contain duplicates");
}

#[tokio::test]
async fn rates_serve_the_selected_candidate() {
    let router = app_router(test_state(vec![seasoned_record()]).await);
    let body = json!({ "pairs": [{ "from": "BTC", "to": "USD" }] });
    let response = router.oneshot(post_rates(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["USD"]["BTC"]["KRAKEN"]["latest"], 0.021);
}

#[tokio::test]
async fn malformed_bodies_yield_a_400() {
    let router = app_router(test_state(vec![]).await);
    // Missing `from` field.
    let response = router
        .oneshot(post_rates(json!({ "pairs": [{ "to": "USD" }] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_granularities_yield_a_400() {
    let router = app_router(test_state(vec![]).await);
    let request = Request::builder()
        .method("POST")
        .uri("/rates/weekly")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "pairs": [{ "from": "BTC", "to": "USD" }] }).to_string(),
        ))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn exchanges_reject_unsupported_tickers() {
    let router = app_router(test_state(vec![]).await);
    let request = Request::builder()
        .uri("/exchanges/NOPE/USD")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn tickers_list_the_registry() {
    let router = app_router(test_state(vec![]).await);
    let request = Request::builder().uri("/tickers").body(Body::empty()).unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json[0], "BTC");
}

#[tokio::test]
async fn health_tracks_the_store() {
    let empty = app_router(test_state(vec![]).await);
    let request = Request::builder().uri("/_health").body(Body::empty()).unwrap();
    let response = empty.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let populated = app_router(test_state(vec![seasoned_record()]).await);
    let request = Request::builder().uri("/_health").body(Body::empty()).unwrap();
    let response = populated.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "OK");
    assert_eq!(json["service"], "database");
}

#[tokio::test]
async fn health_noop_always_answers() {
    let router = app_router(test_state(vec![]).await);
    let request = Request::builder()
        .uri("/_health/noop")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_detail_reports_stale_sync_services() {
    let router = app_router(test_state(vec![seasoned_record()]).await);
    let request = Request::builder()
        .uri("/_health/detail")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    // The store answers but no sync has ever run: live-rates and
    // marketcap are both KO.
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    let statuses: Vec<(String, String)> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|s| {
            (
                s["service"].as_str().unwrap().to_string(),
                s["status"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert!(statuses.contains(&("database".to_string(), "OK".to_string())));
    assert!(statuses.contains(&("live-rates".to_string(), "KO".to_string())));
    assert!(statuses.contains(&("marketcap".to_string(), "KO".to_string())));
}
