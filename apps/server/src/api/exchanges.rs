//! GET /exchanges/:from/:to

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use countervalue_core::store::ExchangeRecord;
use countervalue_market_data::currencies;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn get_exchanges(
    State(state): State<Arc<AppState>>,
    Path((from, to)): Path<(String, String)>,
) -> ApiResult<Json<Vec<ExchangeRecord>>> {
    for ticker in [&from, &to] {
        if !currencies::is_supported(ticker) {
            return Err(ApiError::bad_request(format!(
                "unsupported ticker '{ticker}'"
            )));
        }
    }
    let exchanges = state.rates_service.get_exchanges(&from, &to).await?;
    Ok(Json(exchanges))
}
