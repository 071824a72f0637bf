//! Execution ledger
//!
//! Append-only, per-record, per-step outcomes. Writes are partitioned by
//! (dataset, record, step) so workers never coordinate; reads aggregate in
//! SQL so a dataset at the record limit is never loaded row by row just to
//! be counted.

use ingest_common::time::now;
use ingest_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::db::MAX_LOCK_WAIT_MS;
use crate::models::{
    DatasetId, ExecutionRecordKey, Outcome, OutcomeKind, RecordResult, Step, StepCounts,
};
use crate::utils::retry_on_lock;

/// Write one outcome for `key`.
///
/// SUCCESS and FAILURE are write-once per key: a second write of either kind
/// is a caller bug, so it is logged and ignored and the stored row is left
/// untouched. WARNING rows accumulate.
pub async fn record(pool: &SqlitePool, key: &ExecutionRecordKey, outcome: &Outcome) -> Result<RecordResult> {
    let (kind, payload, message, exception) = match outcome {
        Outcome::Warning { message, exception } => {
            record_warning(pool, key, message, exception.as_deref()).await?;
            return Ok(RecordResult::Written);
        }
        Outcome::Success { payload } => (OutcomeKind::Success, Some(payload.as_str()), None, None),
        Outcome::Failure { message, exception } => (
            OutcomeKind::Failure,
            None,
            Some(message.as_str()),
            exception.as_deref(),
        ),
    };
    let recorded_at = now().to_rfc3339();

    let inserted = retry_on_lock("ledger record", MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO execution_records (
                dataset_id, record_id, step, source_record_id,
                outcome, payload, message, exception, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(dataset_id, record_id, step) DO NOTHING
            "#,
        )
        .bind(key.dataset_id.0)
        .bind(&key.record_id)
        .bind(key.step.as_str())
        .bind(&key.source_record_id)
        .bind(kind.as_str())
        .bind(payload)
        .bind(message)
        .bind(exception)
        .bind(&recorded_at)
        .execute(pool)
        .await
        .map(|done| done.rows_affected())
        .map_err(Error::Database)
    })
    .await?;

    if inserted == 0 {
        tracing::warn!(
            dataset_id = %key.dataset_id,
            record_id = %key.record_id,
            step = %key.step,
            outcome = kind.as_str(),
            "Duplicate ledger write ignored; keeping the existing row"
        );
        return Ok(RecordResult::Duplicate);
    }

    Ok(RecordResult::Written)
}

async fn record_warning(
    pool: &SqlitePool,
    key: &ExecutionRecordKey,
    message: &str,
    exception: Option<&str>,
) -> Result<()> {
    let recorded_at = now().to_rfc3339();

    retry_on_lock("ledger warning", MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO execution_record_warnings (
                dataset_id, record_id, step, source_record_id,
                message, exception, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key.dataset_id.0)
        .bind(&key.record_id)
        .bind(key.step.as_str())
        .bind(&key.source_record_id)
        .bind(message)
        .bind(exception)
        .bind(&recorded_at)
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(Error::Database)
    })
    .await
}

/// Count rows of one outcome kind at one step.
///
/// Warnings are counted per record: several warnings on one record count once.
pub async fn count_by_step(
    pool: &SqlitePool,
    dataset_id: DatasetId,
    step: Step,
    kind: OutcomeKind,
) -> Result<u64> {
    let count: i64 = match kind {
        OutcomeKind::Warning => {
            sqlx::query_scalar(
                "SELECT COUNT(DISTINCT record_id) FROM execution_record_warnings
                 WHERE dataset_id = ? AND step = ?",
            )
            .bind(dataset_id.0)
            .bind(step.as_str())
            .fetch_one(pool)
            .await?
        }
        OutcomeKind::Success | OutcomeKind::Failure => {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM execution_records
                 WHERE dataset_id = ? AND step = ? AND outcome = ?",
            )
            .bind(dataset_id.0)
            .bind(step.as_str())
            .bind(kind.as_str())
            .fetch_one(pool)
            .await?
        }
    };

    Ok(count.max(0) as u64)
}

/// All per-step tallies of a dataset in two grouped queries
pub async fn counts_by_step(pool: &SqlitePool, dataset_id: DatasetId) -> Result<HashMap<Step, StepCounts>> {
    let outcome_rows: Vec<(String, i64, i64)> = sqlx::query_as(
        r#"
        SELECT step,
               SUM(CASE WHEN outcome = 'SUCCESS' THEN 1 ELSE 0 END),
               SUM(CASE WHEN outcome = 'FAILURE' THEN 1 ELSE 0 END)
        FROM execution_records
        WHERE dataset_id = ?
        GROUP BY step
        "#,
    )
    .bind(dataset_id.0)
    .fetch_all(pool)
    .await?;

    let warning_rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT step, COUNT(DISTINCT record_id)
        FROM execution_record_warnings
        WHERE dataset_id = ?
        GROUP BY step
        "#,
    )
    .bind(dataset_id.0)
    .fetch_all(pool)
    .await?;

    let mut counts: HashMap<Step, StepCounts> = HashMap::new();
    for (step, success, fail) in outcome_rows {
        let entry = counts.entry(parse_step(&step)?).or_default();
        entry.success = success.max(0) as u64;
        entry.fail = fail.max(0) as u64;
    }
    for (step, warn) in warning_rows {
        counts.entry(parse_step(&step)?).or_default().warn = warn.max(0) as u64;
    }

    Ok(counts)
}

/// FAILURE rows of one step as (record id, message), ordered by message then record id
pub async fn list_errors(pool: &SqlitePool, dataset_id: DatasetId, step: Step) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT record_id, COALESCE(message, '')
        FROM execution_records
        WHERE dataset_id = ? AND step = ? AND outcome = 'FAILURE'
        ORDER BY message, record_id
        "#,
    )
    .bind(dataset_id.0)
    .bind(step.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// WARNING rows of one step as (record id, message), ordered by message then record id
pub async fn list_warnings(pool: &SqlitePool, dataset_id: DatasetId, step: Step) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT record_id, message
        FROM execution_record_warnings
        WHERE dataset_id = ? AND step = ?
        ORDER BY message, record_id, warning_id
        "#,
    )
    .bind(dataset_id.0)
    .bind(step.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Payload retained by a SUCCESS row, for replaying a record stuck after that step
pub async fn load_success_payload(pool: &SqlitePool, key: &ExecutionRecordKey) -> Result<Option<String>> {
    let payload: Option<Option<String>> = sqlx::query_scalar(
        "SELECT payload FROM execution_records
         WHERE dataset_id = ? AND record_id = ? AND step = ? AND outcome = 'SUCCESS'",
    )
    .bind(key.dataset_id.0)
    .bind(&key.record_id)
    .bind(key.step.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(payload.flatten())
}

fn parse_step(step: &str) -> Result<Step> {
    step.parse()
        .map_err(|e: String| Error::Internal(format!("Ledger row with {}", e)))
}
