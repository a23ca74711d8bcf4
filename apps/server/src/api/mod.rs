//! HTTP routes: thin validation and dispatch over the read service.

mod exchanges;
mod health;
mod rates;
mod tickers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use rates::{validate_pairs, RatesRequest, RequestPair};

pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/rates/:granularity", post(rates::post_rates))
        .route("/exchanges/:from/:to", get(exchanges::get_exchanges))
        .route("/tickers", get(tickers::get_tickers))
        .route("/_health", get(health::health))
        .route("/_health/noop", get(health::noop))
        .route("/_health/detail", get(health::detail))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
