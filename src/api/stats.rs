// src/api/stats.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::time::{Duration, Instant};

use super::{ApiError, AppState};
use crate::{metrics, usage::VolumeUsageReport};

type Reports = Result<Vec<VolumeUsageReport>, ApiError>;

pub async fn all_stats(
    State(state): State<AppState>,
) -> Result<Json<Vec<VolumeUsageReport>>, ApiError> {
    let started = Instant::now();
    finish("/stats", started, collect_all(&state).await)
}

pub async fn container_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<VolumeUsageReport>>, ApiError> {
    let started = Instant::now();
    finish("/stats/{id}", started, collect_one(&state, id.trim()).await)
}

/// `/stats/` with nothing after the slash.
pub async fn missing_id() -> ApiError {
    metrics::record_request("/stats/{id}", StatusCode::BAD_REQUEST, Duration::ZERO);
    ApiError::MissingId
}

// Each request gets its own daemon connection, dropped with the session.
async fn collect_all(state: &AppState) -> Reports {
    let session = state.connector.connect().await?;
    Ok(crate::usage::collect_all(&session, state.settings.measure_timeout).await?)
}

async fn collect_one(state: &AppState, id: &str) -> Reports {
    if id.is_empty() {
        return Err(ApiError::MissingId);
    }
    let session = state.connector.connect().await?;
    Ok(crate::usage::collect_one(&session, id, state.settings.measure_timeout).await?)
}

fn finish(
    route: &str,
    started: Instant,
    result: Reports,
) -> Result<Json<Vec<VolumeUsageReport>>, ApiError> {
    let elapsed = started.elapsed();
    let log = slog_scope::logger();
    match result {
        Ok(reports) => {
            metrics::record_request(route, StatusCode::OK, elapsed);
            slog::debug!(log, "Served usage report";
                "route" => route,
                "entries" => reports.len(),
                "elapsed_ms" => elapsed.as_millis() as u64
            );
            Ok(Json(reports))
        }
        Err(e) => {
            let status = e.status();
            metrics::record_request(route, status, elapsed);
            slog::error!(log, "Usage report failed";
                "route" => route,
                "status" => status.as_u16(),
                "error" => e.to_string()
            );
            Err(e)
        }
    }
}
