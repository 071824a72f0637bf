//! Dataset-scoped singleton guard for the bias-detection side workflow
//!
//! At most one bias-detection run per dataset, across every instance that
//! shares the database. The READY → IN_PROGRESS transition happens inside
//! the dataset's distributed lock; the run itself happens outside it.

use async_trait::async_trait;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::aggregator::ProgressAggregator;
use super::lock::{acquire, LockHandle, LockService};
use crate::db::datasets;
use crate::db::debias::{self, DebiasState};
use crate::error::{TrackerError, TrackerResult};
use crate::models::{DatasetId, DatasetStatus};

#[derive(Debug, Error)]
pub enum SideWorkflowError {
    #[error("Bias detection request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bias detection service answered {0}")]
    Rejected(u16),
}

/// The long-running side workflow started by the guard
#[async_trait]
pub trait SideWorkflow: Send + Sync {
    async fn run(&self, dataset_id: DatasetId) -> Result<(), SideWorkflowError>;
}

/// Calls the external bias-detection service and waits for its answer
pub struct HttpSideWorkflow {
    client: reqwest::Client,
    service_url: String,
}

impl HttpSideWorkflow {
    pub fn new(service_url: impl Into<String>, timeout: Duration) -> Result<Self, SideWorkflowError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            service_url: service_url.into(),
        })
    }
}

#[async_trait]
impl SideWorkflow for HttpSideWorkflow {
    async fn run(&self, dataset_id: DatasetId) -> Result<(), SideWorkflowError> {
        let response = self
            .client
            .post(&self.service_url)
            .json(&json!({ "dataset_id": dataset_id }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SideWorkflowError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

pub fn lock_key(dataset_id: DatasetId) -> String {
    format!("debias:{}", dataset_id)
}

#[derive(Clone)]
pub struct DebiasGuard {
    pool: SqlitePool,
    aggregator: ProgressAggregator,
    locks: Arc<dyn LockService>,
    /// None when no bias-detection service is configured
    workflow: Option<Arc<dyn SideWorkflow>>,
    lock_wait: Duration,
}

impl DebiasGuard {
    pub fn new(
        pool: SqlitePool,
        aggregator: ProgressAggregator,
        locks: Arc<dyn LockService>,
        workflow: Option<Arc<dyn SideWorkflow>>,
        lock_wait: Duration,
    ) -> Self {
        Self {
            pool,
            aggregator,
            locks,
            workflow,
            lock_wait,
        }
    }

    /// Request a bias-detection run.
    ///
    /// Returns true only for the caller that moved the dataset from READY to
    /// IN_PROGRESS; that caller's request launches the run. Every other
    /// caller (dataset not completed, run already started or finished, lock
    /// not obtained in time) gets false.
    pub async fn start(&self, dataset_id: DatasetId) -> TrackerResult<bool> {
        let snapshot = self.aggregator.get_progress(dataset_id).await?;
        if snapshot.status != DatasetStatus::Completed {
            tracing::debug!(
                dataset_id = %dataset_id,
                status = ?snapshot.status,
                "Bias detection refused, dataset not completed"
            );
            return Ok(false);
        }

        let Some(workflow) = self.workflow.clone() else {
            tracing::warn!(
                dataset_id = %dataset_id,
                "Bias detection refused, no detection service configured"
            );
            return Ok(false);
        };

        let Some(handle) = self.lock(dataset_id).await? else {
            return Ok(false);
        };

        let transition = self.claim(dataset_id).await;
        self.release(handle).await;
        if !transition? {
            return Ok(false);
        }

        tracing::info!(dataset_id = %dataset_id, "Bias detection started");

        let pool = self.pool.clone();
        tokio::spawn(async move {
            let next = match workflow.run(dataset_id).await {
                Ok(()) => {
                    tracing::info!(dataset_id = %dataset_id, "Bias detection completed");
                    DebiasState::Completed
                }
                Err(e) => {
                    tracing::error!(
                        dataset_id = %dataset_id,
                        error = %e,
                        "Bias detection failed; dataset is READY again"
                    );
                    DebiasState::Ready
                }
            };
            if let Err(e) = debias::save_state(&pool, dataset_id, next).await {
                tracing::error!(
                    dataset_id = %dataset_id,
                    state = %next,
                    error = %e,
                    "Failed to store bias detection outcome; dataset stays IN_PROGRESS"
                );
            }
        });

        Ok(true)
    }

    pub async fn state(&self, dataset_id: DatasetId) -> TrackerResult<DebiasState> {
        self.ensure_exists(dataset_id).await?;
        Ok(debias::load_state(&self.pool, dataset_id).await?)
    }

    /// Discard a finished report so detection can be requested again.
    ///
    /// Only COMPLETED goes back to READY; a running detection is never reset.
    pub async fn reset(&self, dataset_id: DatasetId) -> TrackerResult<bool> {
        self.ensure_exists(dataset_id).await?;

        let Some(handle) = self.lock(dataset_id).await? else {
            return Ok(false);
        };

        let outcome = async {
            let current = debias::load_state(&self.pool, dataset_id).await?;
            if current != DebiasState::Completed {
                return Ok::<bool, TrackerError>(false);
            }
            debias::save_state(&self.pool, dataset_id, DebiasState::Ready).await?;
            Ok(true)
        }
        .await;
        self.release(handle).await;

        let reset = outcome?;
        if reset {
            tracing::info!(dataset_id = %dataset_id, "Bias detection report discarded");
        }
        Ok(reset)
    }

    async fn ensure_exists(&self, dataset_id: DatasetId) -> TrackerResult<()> {
        datasets::load_dataset(&self.pool, dataset_id)
            .await?
            .map(|_| ())
            .ok_or(TrackerError::DatasetNotFound(dataset_id))
    }

    async fn lock(&self, dataset_id: DatasetId) -> TrackerResult<Option<LockHandle>> {
        let handle = acquire(self.locks.as_ref(), &lock_key(dataset_id), self.lock_wait).await?;
        if handle.is_none() {
            tracing::warn!(dataset_id = %dataset_id, "Bias detection lock busy, request refused");
        }
        Ok(handle)
    }

    /// READY → IN_PROGRESS; caller holds the dataset lock
    async fn claim(&self, dataset_id: DatasetId) -> TrackerResult<bool> {
        let current = debias::load_state(&self.pool, dataset_id).await?;
        if current != DebiasState::Ready {
            tracing::debug!(
                dataset_id = %dataset_id,
                state = %current,
                "Bias detection already requested"
            );
            return Ok(false);
        }
        debias::save_state(&self.pool, dataset_id, DebiasState::InProgress).await?;
        Ok(true)
    }

    async fn release(&self, handle: LockHandle) {
        let key = handle.key.clone();
        if let Err(e) = self.locks.unlock(handle).await {
            // The lease frees the key eventually
            tracing::error!(lock_key = %key, error = %e, "Failed to release lock");
        }
    }
}
