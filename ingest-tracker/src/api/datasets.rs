//! Dataset submission endpoints
//!
//! POST /datasets is the ingestion entry point; POST
//! /datasets/:id/harvest-complete is called by the harvester once it has
//! counted the source identifiers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::parse_dataset_id;
use crate::db::datasets;
use crate::error::{ApiError, ApiResult};
use crate::models::{Dataset, DatasetId, NewDataset};
use crate::AppState;

/// POST /datasets/:id/harvest-complete request
#[derive(Debug, Deserialize)]
pub struct HarvestCompleteRequest {
    pub expected_record_count: u64,
    #[serde(default)]
    pub record_limit_exceeded: bool,
}

#[derive(Debug, Serialize)]
pub struct HarvestCompleteResponse {
    pub dataset_id: DatasetId,
    /// False when a count had already been stored; the first count wins
    pub count_recorded: bool,
}

/// POST /datasets
pub async fn create_dataset(
    State(state): State<AppState>,
    Json(request): Json<NewDataset>,
) -> ApiResult<(StatusCode, Json<Dataset>)> {
    let dataset = datasets::create_dataset(&state.db, &request).await?;
    Ok((StatusCode::CREATED, Json(dataset)))
}

/// POST /datasets/:id/harvest-complete
pub async fn harvest_complete(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(request): Json<HarvestCompleteRequest>,
) -> ApiResult<Json<HarvestCompleteResponse>> {
    let dataset_id = parse_dataset_id(&raw_id)?;

    let count_recorded = datasets::finish_harvest(
        &state.db,
        dataset_id,
        request.expected_record_count,
        request.record_limit_exceeded,
    )
    .await
    .map_err(|e| match e {
        ingest_common::Error::NotFound(_) => {
            ApiError::BadRequest(format!("Dataset {} does not exist", dataset_id))
        }
        other => other.into(),
    })?;

    Ok(Json(HarvestCompleteResponse {
        dataset_id,
        count_recorded,
    }))
}

pub fn dataset_routes() -> Router<AppState> {
    Router::new()
        .route("/datasets", post(create_dataset))
        .route("/datasets/:id/harvest-complete", post(harvest_complete))
}
