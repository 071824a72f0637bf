//! ingest-tracker library interface
//!
//! Execution tracking and progress aggregation for the metadata ingestion
//! pipeline. Exposed as a library so step-executor processes can embed the
//! ledger, publisher and workers, and so integration tests can drive the
//! router directly.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, TrackerError, TrackerResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::services::{DebiasGuard, ProgressAggregator, RateGate};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub aggregator: ProgressAggregator,
    pub debias: Arc<DebiasGuard>,
    /// None when rate limiting is disabled
    pub rate_gate: Option<Arc<RateGate>>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        aggregator: ProgressAggregator,
        debias: DebiasGuard,
        rate_gate: Option<RateGate>,
    ) -> Self {
        Self {
            db,
            aggregator,
            debias: Arc::new(debias),
            rate_gate: rate_gate.map(Arc::new),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    let limited = Router::new()
        .merge(api::dataset_routes())
        .merge(api::progress_routes())
        .merge(api::debias_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::rate_limit_middleware,
        ));

    Router::new()
        .merge(limited)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
