//! GET /tickers

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::state::AppState;

pub async fn get_tickers(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.rates_service.get_tickers())
}
