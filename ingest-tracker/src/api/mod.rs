//! HTTP API handlers for ingest-tracker
//!
//! Dataset routes sit behind the rate gate; `/health` does not.

pub mod datasets;
pub mod debias;
pub mod health;
pub mod progress;
pub mod rate_limit;

pub use datasets::dataset_routes;
pub use debias::debias_routes;
pub use health::health_routes;
pub use progress::progress_routes;
pub use rate_limit::rate_limit_middleware;

use crate::error::ApiError;
use crate::models::DatasetId;

/// Parse a dataset id path segment, answering 400 for anything but a positive integer
pub(crate) fn parse_dataset_id(raw: &str) -> Result<DatasetId, ApiError> {
    raw.parse().map_err(ApiError::BadRequest)
}
