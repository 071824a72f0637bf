//! Tier context rows (one per indexed record)

use ingest_common::time::now;
use ingest_common::{Error, Result};
use sqlx::SqlitePool;

use crate::db::MAX_LOCK_WAIT_MS;
use crate::models::{
    ContentTier, DatasetId, MetadataTier, RecordResult, RecordTiers, TierContext,
    TierStatistics, TierZeroInfo,
};
use crate::utils::retry_on_lock;

/// Store a record's tiers; a second write for the same record is ignored
pub async fn record_tier_context(
    pool: &SqlitePool,
    dataset_id: DatasetId,
    record_id: &str,
    tiers: TierContext,
) -> Result<RecordResult> {
    let recorded_at = now().to_rfc3339();

    let inserted = retry_on_lock("tier context", MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO execution_record_tier_context (
                dataset_id, record_id, content_tier, metadata_tier, recorded_at
            ) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(dataset_id, record_id) DO NOTHING
            "#,
        )
        .bind(dataset_id.0)
        .bind(record_id)
        .bind(tiers.content_tier.as_str())
        .bind(tiers.metadata_tier.as_str())
        .bind(&recorded_at)
        .execute(pool)
        .await
        .map(|done| done.rows_affected())
        .map_err(Error::Database)
    })
    .await?;

    if inserted == 0 {
        tracing::warn!(
            dataset_id = %dataset_id,
            record_id,
            "Tier context already recorded; keeping the existing tiers"
        );
        return Ok(RecordResult::Duplicate);
    }
    Ok(RecordResult::Written)
}

/// Lowest-tier counts with at most `sample_limit` record ids each
pub async fn tier_zero_info(
    pool: &SqlitePool,
    dataset_id: DatasetId,
    sample_limit: u32,
) -> Result<TierZeroInfo> {
    let content_tier = lowest_tier_statistics(
        pool,
        dataset_id,
        "content_tier",
        ContentTier::LOWEST.as_str(),
        sample_limit,
    )
    .await?;
    let metadata_tier = lowest_tier_statistics(
        pool,
        dataset_id,
        "metadata_tier",
        MetadataTier::LOWEST.as_str(),
        sample_limit,
    )
    .await?;

    Ok(TierZeroInfo {
        content_tier,
        metadata_tier,
    })
}

async fn lowest_tier_statistics(
    pool: &SqlitePool,
    dataset_id: DatasetId,
    column: &'static str,
    lowest: &str,
    sample_limit: u32,
) -> Result<TierStatistics> {
    let count_sql = format!(
        "SELECT COUNT(*) FROM execution_record_tier_context WHERE dataset_id = ? AND {} = ?",
        column
    );
    let total: i64 = sqlx::query_scalar(&count_sql)
        .bind(dataset_id.0)
        .bind(lowest)
        .fetch_one(pool)
        .await?;

    let samples = if total > 0 && sample_limit > 0 {
        let sample_sql = format!(
            "SELECT record_id FROM execution_record_tier_context
             WHERE dataset_id = ? AND {} = ?
             ORDER BY record_id
             LIMIT ?",
            column
        );
        sqlx::query_scalar(&sample_sql)
            .bind(dataset_id.0)
            .bind(lowest)
            .bind(i64::from(sample_limit))
            .fetch_all(pool)
            .await?
    } else {
        Vec::new()
    };

    Ok(TierStatistics {
        total_num_of_records: total.max(0) as u64,
        samples,
    })
}

/// Every record's tiers for one dataset, ordered by record id
pub async fn list_record_tiers(pool: &SqlitePool, dataset_id: DatasetId) -> Result<Vec<RecordTiers>> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        r#"
        SELECT record_id, content_tier, metadata_tier
        FROM execution_record_tier_context
        WHERE dataset_id = ?
        ORDER BY record_id
        "#,
    )
    .bind(dataset_id.0)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(record_id, content, metadata)| {
            Ok(RecordTiers {
                record_id,
                content_tier: content.parse().map_err(Error::Internal)?,
                metadata_tier: metadata.parse().map_err(Error::Internal)?,
            })
        })
        .collect()
}
