//! Progress and tier read endpoints
//!
//! GET /datasets/:id/progress, GET /datasets/:id/records-tiers

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use super::parse_dataset_id;
use crate::db::{datasets, tiers};
use crate::error::{ApiResult, TrackerError};
use crate::models::{DatasetId, ProgressSnapshot, RecordTiers};
use crate::AppState;

/// GET /datasets/:id/records-tiers response
#[derive(Debug, Serialize)]
pub struct RecordTiersResponse {
    pub dataset_id: DatasetId,
    pub records: Vec<RecordTiers>,
}

/// GET /datasets/:id/progress
///
/// 400 for an unknown dataset, 503 when the ledger cannot be read.
pub async fn get_progress(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<ProgressSnapshot>> {
    let dataset_id = parse_dataset_id(&raw_id)?;
    let snapshot = state.aggregator.get_progress(dataset_id).await?;
    Ok(Json(snapshot))
}

/// GET /datasets/:id/records-tiers
pub async fn get_record_tiers(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<RecordTiersResponse>> {
    let dataset_id = parse_dataset_id(&raw_id)?;

    if datasets::load_dataset(&state.db, dataset_id).await?.is_none() {
        return Err(TrackerError::DatasetNotFound(dataset_id).into());
    }
    let records = tiers::list_record_tiers(&state.db, dataset_id).await?;

    Ok(Json(RecordTiersResponse {
        dataset_id,
        records,
    }))
}

pub fn progress_routes() -> Router<AppState> {
    Router::new()
        .route("/datasets/:id/progress", get(get_progress))
        .route("/datasets/:id/records-tiers", get(get_record_tiers))
}
