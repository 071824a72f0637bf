//! Database access for ingest-tracker
//!
//! Ledger rows are keyed by (dataset, record, step) and written once; no
//! write ever needs to coordinate with another record's write.

pub mod datasets;
pub mod debias;
pub mod ledger;
pub mod tiers;

use ingest_common::db::PoolSettings;
use ingest_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Ceiling for retrying a write that keeps hitting "database is locked"
pub const MAX_LOCK_WAIT_MS: u64 = 5000;

/// Open the shared database and make sure every tracker table exists
pub async fn init_database_pool(db_path: &Path, settings: PoolSettings) -> Result<SqlitePool> {
    let pool = ingest_common::db::init_database_pool(db_path, settings).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create tracker tables and indexes (idempotent)
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS datasets (
            dataset_id INTEGER PRIMARY KEY AUTOINCREMENT,
            dataset_name TEXT NOT NULL,
            workflow_kind TEXT NOT NULL,
            harvest_parameters TEXT NOT NULL,
            country TEXT NOT NULL,
            language TEXT NOT NULL,
            custom_transform TEXT,
            expected_record_count INTEGER,
            record_limit_exceeded INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // SUCCESS and FAILURE share one table so the primary key alone keeps a
    // key from ever holding both.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS execution_records (
            dataset_id INTEGER NOT NULL,
            record_id TEXT NOT NULL,
            step TEXT NOT NULL,
            source_record_id TEXT NOT NULL,
            outcome TEXT NOT NULL CHECK (outcome IN ('SUCCESS', 'FAILURE')),
            payload TEXT,
            message TEXT,
            exception TEXT,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (dataset_id, record_id, step)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_execution_records_step
         ON execution_records (dataset_id, step, outcome)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS execution_record_warnings (
            warning_id INTEGER PRIMARY KEY AUTOINCREMENT,
            dataset_id INTEGER NOT NULL,
            record_id TEXT NOT NULL,
            step TEXT NOT NULL,
            source_record_id TEXT NOT NULL,
            message TEXT NOT NULL,
            exception TEXT,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_execution_record_warnings_step
         ON execution_record_warnings (dataset_id, step)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS execution_record_tier_context (
            dataset_id INTEGER NOT NULL,
            record_id TEXT NOT NULL,
            content_tier TEXT NOT NULL,
            metadata_tier TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (dataset_id, record_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tier_context_content
         ON execution_record_tier_context (dataset_id, content_tier)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_tier_context_metadata
         ON execution_record_tier_context (dataset_id, metadata_tier)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS debias_state (
            dataset_id INTEGER PRIMARY KEY,
            state TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS distributed_locks (
            lock_key TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            acquired_at_ms INTEGER NOT NULL,
            expires_at_ms INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rate_buckets (
            identity TEXT PRIMARY KEY,
            tokens INTEGER NOT NULL,
            refilled_at_ms INTEGER NOT NULL,
            consumed INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!(
        "Database tables initialized (datasets, execution ledger, tier context, debias state, locks, rate buckets)"
    );

    Ok(())
}
