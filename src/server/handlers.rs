use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::datasets::{Hospital, Plan, ResultList};
use crate::error::FinderError;
use crate::location::{Identifier, Region};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

#[derive(Debug)]
pub(super) struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

impl From<FinderError> for ApiError {
    fn from(e: FinderError) -> Self {
        let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        ApiError(status, e.to_string())
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

/// Query pairs in request order, blank values dropped.
fn identifier_from(params: Vec<(String, String)>) -> Identifier {
    params
        .into_iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .collect()
}

// ─── GET /api/hospitals ──────────────────────────────────────────

pub async fn hospitals(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<ResultList<Hospital>>, ApiError> {
    let start = Instant::now();
    let identifier = identifier_from(params);
    let finder = &state.finder;

    let list = finder
        .hospitals
        .fetch_hospitals_with_measures(&identifier, finder.measures_timeout())
        .await?;

    info!(
        count = list.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "GET /api/hospitals"
    );
    Ok(Json(list))
}

// ─── GET /api/plans ──────────────────────────────────────────────

pub async fn plans(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<ResultList<Plan>>, ApiError> {
    let start = Instant::now();
    let identifier = identifier_from(params);

    let list = state.finder.plans.fetch_plans(&identifier).await?;

    info!(
        count = list.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "GET /api/plans"
    );
    Ok(Json(list))
}

// ─── GET /api/region ─────────────────────────────────────────────

pub async fn region(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Region>, ApiError> {
    let identifier = identifier_from(params);
    let region = state.finder.regions.resolve_region(&identifier).await?;
    if !region.is_resolved() {
        return Err(api_error(StatusCode::NOT_FOUND, "No county found for this location"));
    }
    Ok(Json(region))
}

// ─── POST /api/callbacks/{key} ───────────────────────────────────

pub async fn deliver_callback(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(payload): Json<Value>,
) -> Result<StatusCode, ApiError> {
    if state.finder.callbacks.fulfill(&key, payload) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        warn!(%key, "callback delivery for unknown key");
        Err(api_error(StatusCode::NOT_FOUND, format!("No pending callback '{}'", key)))
    }
}
