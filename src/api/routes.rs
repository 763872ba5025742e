use std::sync::Arc;

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::api::latency::{LatencySnapshot, LatencyStats};
use crate::config::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use crate::error::AppError;
use crate::store::RoundStore;
use crate::types::{LottoRound, UpdateRequest, UpdateStatus};
use crate::updater::Updater;

#[derive(Clone)]
pub struct ApiState {
    pub updater: Arc<Updater>,
    pub store: Arc<dyn RoundStore>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

impl ApiState {
    /// Shares the updater's store and stats handles.
    pub fn new(updater: Arc<Updater>) -> Self {
        Self {
            store: Arc::clone(updater.store()),
            health: Arc::clone(updater.health()),
            latency: Arc::clone(updater.latency()),
            updater,
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/lotto/update", get(trigger_update))
        .route("/api/lotto/rounds", get(get_rounds))
        .route("/api/lotto/rounds/:round", get(get_round))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct UpdateQuery {
    pub start: Option<u32>,
    pub count: Option<u32>,
}

#[derive(Deserialize)]
pub struct RoundsQuery {
    pub limit: Option<u32>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub update_in_progress: bool,
    pub last_update_at_ns: u64,
    pub last_processed_round: u64,
    pub consecutive_failures: u64,
    /// Highest round in the store right now.
    pub frontier: Option<u32>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn trigger_update(
    State(state): State<ApiState>,
    query: Result<Query<UpdateQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(params) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let report = state
        .updater
        .run_update(UpdateRequest {
            start: params.start,
            count: params.count,
        })
        .await;

    let code = match report.status {
        UpdateStatus::Error => StatusCode::INTERNAL_SERVER_ERROR,
        UpdateStatus::Success | UpdateStatus::Done => StatusCode::OK,
    };
    Ok((code, Json(report)).into_response())
}

async fn get_rounds(
    State(state): State<ApiState>,
    query: Result<Query<RoundsQuery>, QueryRejection>,
) -> Result<Json<Vec<LottoRound>>, AppError> {
    let Query(params) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    Ok(Json(state.store.latest(limit).await?))
}

async fn get_round(
    State(state): State<ApiState>,
    round: Result<Path<u32>, PathRejection>,
) -> Result<Json<LottoRound>, AppError> {
    let Path(round) = round.map_err(|e| AppError::BadRequest(e.body_text()))?;

    state
        .store
        .get(round)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("round {round} is not stored")))
}

async fn get_health(State(state): State<ApiState>) -> Result<Json<HealthResponse>, AppError> {
    let frontier = state.store.max_round().await?;
    let failures = state.health.consecutive_failures();

    Ok(Json(HealthResponse {
        status: if failures == 0 { "ok" } else { "degraded" },
        update_in_progress: state.health.update_in_progress(),
        last_update_at_ns: state.health.last_update_at_ns(),
        last_processed_round: state.health.last_processed_round(),
        consecutive_failures: failures,
        frontier,
    }))
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySnapshot> {
    Json(state.latency.snapshot())
}
