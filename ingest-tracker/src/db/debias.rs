//! Bias-detection side workflow state per dataset
//!
//! No row means READY. Callers hold the dataset's distributed lock around
//! any read-decide-write sequence on this table.

use ingest_common::time::now;
use ingest_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;

use crate::db::MAX_LOCK_WAIT_MS;
use crate::models::DatasetId;
use crate::utils::retry_on_lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebiasState {
    Ready,
    InProgress,
    Completed,
}

impl DebiasState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebiasState::Ready => "READY",
            DebiasState::InProgress => "IN_PROGRESS",
            DebiasState::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for DebiasState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DebiasState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "READY" => Ok(DebiasState::Ready),
            "IN_PROGRESS" => Ok(DebiasState::InProgress),
            "COMPLETED" => Ok(DebiasState::Completed),
            other => Err(format!("Unknown debias state: {}", other)),
        }
    }
}

pub async fn load_state(pool: &SqlitePool, dataset_id: DatasetId) -> Result<DebiasState> {
    let state: Option<String> =
        sqlx::query_scalar("SELECT state FROM debias_state WHERE dataset_id = ?")
            .bind(dataset_id.0)
            .fetch_optional(pool)
            .await?;

    match state {
        Some(state) => state.parse().map_err(Error::Internal),
        None => Ok(DebiasState::Ready),
    }
}

pub async fn save_state(pool: &SqlitePool, dataset_id: DatasetId, state: DebiasState) -> Result<()> {
    let updated_at = now().to_rfc3339();

    retry_on_lock("save_debias_state", MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO debias_state (dataset_id, state, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(dataset_id) DO UPDATE SET
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(dataset_id.0)
        .bind(state.as_str())
        .bind(&updated_at)
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(Error::Database)
    })
    .await
}
