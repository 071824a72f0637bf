//! Bias-detection endpoints
//!
//! POST starts a run (at most one per dataset), GET reads the state and
//! DELETE discards a finished report.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use super::parse_dataset_id;
use crate::db::debias::DebiasState;
use crate::error::ApiResult;
use crate::models::DatasetId;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DebiasStartResponse {
    pub dataset_id: DatasetId,
    /// True only for the request that launched the run
    pub started: bool,
    pub state: DebiasState,
}

#[derive(Debug, Serialize)]
pub struct DebiasStateResponse {
    pub dataset_id: DatasetId,
    pub state: DebiasState,
}

#[derive(Debug, Serialize)]
pub struct DebiasResetResponse {
    pub dataset_id: DatasetId,
    pub reset: bool,
    pub state: DebiasState,
}

/// POST /datasets/:id/debias
pub async fn start_debias(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<DebiasStartResponse>> {
    let dataset_id = parse_dataset_id(&raw_id)?;
    let started = state.debias.start(dataset_id).await?;
    let current = state.debias.state(dataset_id).await?;

    Ok(Json(DebiasStartResponse {
        dataset_id,
        started,
        state: current,
    }))
}

/// GET /datasets/:id/debias
pub async fn get_debias_state(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<DebiasStateResponse>> {
    let dataset_id = parse_dataset_id(&raw_id)?;
    let current = state.debias.state(dataset_id).await?;
    Ok(Json(DebiasStateResponse {
        dataset_id,
        state: current,
    }))
}

/// DELETE /datasets/:id/debias
pub async fn reset_debias(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<DebiasResetResponse>> {
    let dataset_id = parse_dataset_id(&raw_id)?;
    let reset = state.debias.reset(dataset_id).await?;
    let current = state.debias.state(dataset_id).await?;

    Ok(Json(DebiasResetResponse {
        dataset_id,
        reset,
        state: current,
    }))
}

pub fn debias_routes() -> Router<AppState> {
    Router::new().route(
        "/datasets/:id/debias",
        get(get_debias_state).post(start_debias).delete(reset_debias),
    )
}
