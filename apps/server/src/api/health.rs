//! Health endpoints.
//!
//! `/_health` answers for the store alone; `/_health/detail` adds
//! staleness checks on the sync bookkeeping and turns 500 as soon as one
//! service is KO. Store failures are always a 503.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use countervalue_core::constants::{LIVE_RATES_STALENESS, MARKETCAP_STALENESS};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const STATUS_OK: &str = "OK";
const STATUS_KO: &str = "KO";

#[derive(Serialize)]
pub struct HealthBody {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
pub struct ServiceStatus {
    service: &'static str,
    status: &'static str,
}

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<Json<HealthBody>> {
    state
        .store
        .status()
        .await
        .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))?;
    Ok(Json(HealthBody {
        status: STATUS_OK,
        service: "database",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn noop() -> StatusCode {
    StatusCode::OK
}

pub async fn detail(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    state
        .store
        .status()
        .await
        .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))?;
    let meta = state
        .store
        .get_meta()
        .await
        .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))?;

    let now_ms = Utc::now().timestamp_millis();
    let statuses = vec![
        ServiceStatus {
            service: "database",
            status: STATUS_OK,
        },
        ServiceStatus {
            service: "live-rates",
            status: staleness_status(now_ms, meta.last_live_rates_sync, LIVE_RATES_STALENESS),
        },
        ServiceStatus {
            service: "marketcap",
            status: staleness_status(now_ms, meta.last_market_cap_sync, MARKETCAP_STALENESS),
        },
    ];
    let all_ok = statuses.iter().all(|s| s.status == STATUS_OK);
    let code = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((code, Json(statuses)))
}

fn staleness_status(now_ms: i64, last_sync_ms: i64, budget: std::time::Duration) -> &'static str {
    if now_ms - last_sync_ms > budget.as_millis() as i64 {
        STATUS_KO
    } else {
        STATUS_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_flips_past_the_budget() {
        let budget = std::time::Duration::from_secs(300);
        assert_eq!(staleness_status(1_000_000, 900_000, budget), STATUS_OK);
        assert_eq!(staleness_status(1_000_000, 699_999, budget), STATUS_KO);
        // Never-synced meta reads as epoch and is immediately KO.
        assert_eq!(staleness_status(1_000_000_000, 0, budget), STATUS_KO);
    }
}
