//! Test helper utilities
//!
//! Shared fixtures for ingest-tracker integration tests. Each test binary
//! uses a subset, hence the dead_code allowance.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use ingest_common::db::PoolSettings;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

use ingest_tracker::config::PortalConfig;
use ingest_tracker::db::{datasets, ledger};
use ingest_tracker::models::{
    Dataset, DatasetId, ExecutionRecordKey, FileType, HarvestParameters, NewDataset, Outcome,
    Step,
};
use ingest_tracker::services::{
    DebiasGuard, LockService, ProgressAggregator, SideWorkflow, SideWorkflowError,
    SqliteLockService,
};

pub const PORTAL_PREFIX: &str = "https://portal.test/search?query=edm_datasetName:";

/// Temporary database with every tracker table created
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for the test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_ingest.db");
    let pool = ingest_tracker::db::init_database_pool(&db_path, PoolSettings::default()).await?;
    Ok((temp_dir, pool))
}

pub fn portal_config() -> PortalConfig {
    PortalConfig {
        publish_dataset_url: PORTAL_PREFIX.to_string(),
        tier_zero_sample_size: 10,
    }
}

pub fn aggregator(pool: &SqlitePool) -> ProgressAggregator {
    ProgressAggregator::new(pool.clone(), portal_config())
}

pub fn new_file_dataset(name: &str, custom_transform: Option<&str>) -> NewDataset {
    NewDataset {
        dataset_name: name.to_string(),
        workflow_kind: None,
        harvest_parameters: HarvestParameters::File {
            file_name: format!("{}.zip", name),
            file_type: FileType::Zip,
        },
        country: "Greece".to_string(),
        language: "el".to_string(),
        custom_transform: custom_transform.map(str::to_string),
    }
}

/// File-harvest dataset without a custom transform
pub async fn seed_dataset(pool: &SqlitePool, name: &str) -> Result<Dataset> {
    Ok(datasets::create_dataset(pool, &new_file_dataset(name, None)).await?)
}

pub fn key(dataset_id: DatasetId, record: usize, step: Step) -> ExecutionRecordKey {
    ExecutionRecordKey::new(
        dataset_id,
        format!("rec-{:04}", record),
        step,
        format!("src-{:04}", record),
    )
}

pub async fn succeed(pool: &SqlitePool, dataset_id: DatasetId, record: usize, step: Step) -> Result<()> {
    let outcome = Outcome::Success {
        payload: format!("<record id=\"{}\"/>", record),
    };
    ledger::record(pool, &key(dataset_id, record, step), &outcome).await?;
    Ok(())
}

pub async fn fail(
    pool: &SqlitePool,
    dataset_id: DatasetId,
    record: usize,
    step: Step,
    message: &str,
) -> Result<()> {
    let outcome = Outcome::Failure {
        message: message.to_string(),
        exception: Some(format!("{} at line 1", message)),
    };
    ledger::record(pool, &key(dataset_id, record, step), &outcome).await?;
    Ok(())
}

/// Walk `records` through every step in `steps` with SUCCESS
pub async fn succeed_through(
    pool: &SqlitePool,
    dataset_id: DatasetId,
    records: std::ops::Range<usize>,
    steps: &[Step],
) -> Result<()> {
    for record in records {
        for step in steps {
            succeed(pool, dataset_id, record, *step).await?;
        }
    }
    Ok(())
}

/// Side workflow that blocks until released, counting its runs
#[derive(Default)]
pub struct GatedWorkflow {
    pub runs: AtomicUsize,
    pub release: Notify,
    pub fail: bool,
}

impl GatedWorkflow {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SideWorkflow for GatedWorkflow {
    async fn run(&self, _dataset_id: DatasetId) -> Result<(), SideWorkflowError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        if self.fail {
            Err(SideWorkflowError::Rejected(500))
        } else {
            Ok(())
        }
    }
}

pub fn debias_guard(pool: &SqlitePool, workflow: Option<Arc<dyn SideWorkflow>>) -> DebiasGuard {
    let locks: Arc<dyn LockService> =
        Arc::new(SqliteLockService::new(pool.clone(), Duration::from_secs(30)));
    DebiasGuard::new(
        pool.clone(),
        aggregator(pool),
        locks,
        workflow,
        Duration::from_secs(2),
    )
}

/// Poll `check` every 10ms for up to two seconds
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
