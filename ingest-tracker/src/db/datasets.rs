//! Dataset configuration store
//!
//! Read-only after submission except for two write-once columns:
//! `expected_record_count` (learned when harvesting finishes) and
//! `record_limit_exceeded`.

use chrono::Utc;
use ingest_common::{Error, Result};
use sqlx::{Row, SqlitePool};

use crate::db::MAX_LOCK_WAIT_MS;
use crate::models::{Dataset, DatasetId, HarvestParameters, NewDataset, WorkflowKind};
use crate::utils::retry_on_lock;

/// Persist a submitted dataset and return the stored row
pub async fn create_dataset(pool: &SqlitePool, request: &NewDataset) -> Result<Dataset> {
    request.validate().map_err(Error::InvalidInput)?;

    let kind = request.workflow_kind();
    if kind == WorkflowKind::Debias {
        return Err(Error::InvalidInput(
            "Bias detection runs on an existing dataset, it cannot be submitted".to_string(),
        ));
    }

    let harvest_parameters = serde_json::to_string(&request.harvest_parameters)?;
    let created_at = ingest_common::time::now();
    let created_at_text = created_at.to_rfc3339();

    let dataset_id: i64 = retry_on_lock("create_dataset", MAX_LOCK_WAIT_MS, || async {
        sqlx::query_scalar(
            r#"
            INSERT INTO datasets (
                dataset_name, workflow_kind, harvest_parameters,
                country, language, custom_transform, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING dataset_id
            "#,
        )
        .bind(&request.dataset_name)
        .bind(kind.as_str())
        .bind(&harvest_parameters)
        .bind(&request.country)
        .bind(&request.language)
        .bind(&request.custom_transform)
        .bind(&created_at_text)
        .fetch_one(pool)
        .await
        .map_err(Error::Database)
    })
    .await?;

    tracing::info!(
        dataset_id,
        dataset_name = %request.dataset_name,
        workflow_kind = %kind,
        custom_transform = request.custom_transform.is_some(),
        "Dataset created"
    );

    Ok(Dataset {
        dataset_id: DatasetId(dataset_id),
        dataset_name: request.dataset_name.clone(),
        workflow_kind: kind,
        harvest_parameters: request.harvest_parameters.clone(),
        country: request.country.clone(),
        language: request.language.clone(),
        custom_transform: request.custom_transform.clone(),
        expected_record_count: None,
        record_limit_exceeded: false,
        created_at,
    })
}

/// Load a dataset; `Ok(None)` when the id is unknown
pub async fn load_dataset(pool: &SqlitePool, dataset_id: DatasetId) -> Result<Option<Dataset>> {
    let row = sqlx::query(
        r#"
        SELECT dataset_id, dataset_name, workflow_kind, harvest_parameters,
               country, language, custom_transform, expected_record_count,
               record_limit_exceeded, created_at
        FROM datasets
        WHERE dataset_id = ?
        "#,
    )
    .bind(dataset_id.0)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let kind: String = row.get("workflow_kind");
    // A kind this build does not know means the row was written by something
    // else; refuse to guess a step graph for it.
    let workflow_kind: WorkflowKind = kind.parse().map_err(Error::Internal)?;

    let harvest_parameters: String = row.get("harvest_parameters");
    let harvest_parameters: HarvestParameters = serde_json::from_str(&harvest_parameters)?;

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&Utc);

    let expected: Option<i64> = row.get("expected_record_count");

    Ok(Some(Dataset {
        dataset_id: DatasetId(row.get("dataset_id")),
        dataset_name: row.get("dataset_name"),
        workflow_kind,
        harvest_parameters,
        country: row.get("country"),
        language: row.get("language"),
        custom_transform: row.get("custom_transform"),
        expected_record_count: expected.map(|n| n.max(0) as u64),
        record_limit_exceeded: row.get::<i64, _>("record_limit_exceeded") != 0,
        created_at,
    }))
}

/// Record the outcome of identifier counting once harvesting is done.
///
/// Both columns are write-once: a later call never overwrites a count that
/// is already known, and the limit flag can only go from false to true.
/// Returns whether the expected count was written by this call.
pub async fn finish_harvest(
    pool: &SqlitePool,
    dataset_id: DatasetId,
    expected_record_count: u64,
    record_limit_exceeded: bool,
) -> Result<bool> {
    let expected = i64::try_from(expected_record_count)
        .map_err(|_| Error::InvalidInput(format!("Record count too large: {}", expected_record_count)))?;

    let (count_rows, _) = retry_on_lock("finish_harvest", MAX_LOCK_WAIT_MS, || async {
        let mut tx = pool.begin().await?;

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT dataset_id FROM datasets WHERE dataset_id = ?")
                .bind(dataset_id.0)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("Dataset {}", dataset_id)));
        }

        let count_rows = sqlx::query(
            "UPDATE datasets SET expected_record_count = ?
             WHERE dataset_id = ? AND expected_record_count IS NULL",
        )
        .bind(expected)
        .bind(dataset_id.0)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let flag_rows = if record_limit_exceeded {
            sqlx::query(
                "UPDATE datasets SET record_limit_exceeded = 1
                 WHERE dataset_id = ? AND record_limit_exceeded = 0",
            )
            .bind(dataset_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected()
        } else {
            0
        };

        tx.commit().await?;
        Ok((count_rows, flag_rows))
    })
    .await?;

    if count_rows == 0 {
        tracing::warn!(
            dataset_id = %dataset_id,
            expected_record_count,
            "Expected record count already set; keeping the first value"
        );
    } else {
        tracing::info!(
            dataset_id = %dataset_id,
            expected_record_count,
            record_limit_exceeded,
            "Harvest finished counting identifiers"
        );
    }

    Ok(count_rows == 1)
}
