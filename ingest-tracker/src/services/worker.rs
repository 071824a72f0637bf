//! Step workers
//!
//! One worker per step queue, no central scheduler. A worker hands each
//! message to its executor, writes the outcome to the ledger and only then
//! fans out, so a record is never seen at step N+1 before step N's row
//! exists.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::publisher::StepPublisher;
use crate::db::{ledger, tiers};
use crate::error::TrackerResult;
use crate::models::{ExecutionRecordKey, Outcome, RecordMessage, RecordResult, Step, TierContext};

/// Terminal outcome of one execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success { payload: String },
    Failure {
        message: String,
        exception: Option<String>,
    },
}

/// Non-fatal issue raised while executing a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepWarning {
    pub message: String,
    pub exception: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub outcome: StepOutcome,
    pub warnings: Vec<StepWarning>,
    /// Set by the indexing step
    pub tier_context: Option<TierContext>,
}

impl StepResult {
    pub fn success(payload: impl Into<String>) -> Self {
        Self {
            outcome: StepOutcome::Success {
                payload: payload.into(),
            },
            warnings: Vec::new(),
            tier_context: None,
        }
    }

    pub fn failure(message: impl Into<String>, exception: Option<String>) -> Self {
        Self {
            outcome: StepOutcome::Failure {
                message: message.into(),
                exception,
            },
            warnings: Vec::new(),
            tier_context: None,
        }
    }

    pub fn with_warning(mut self, message: impl Into<String>) -> Self {
        self.warnings.push(StepWarning {
            message: message.into(),
            exception: None,
        });
        self
    }

    pub fn with_tiers(mut self, tiers: TierContext) -> Self {
        self.tier_context = Some(tiers);
        self
    }
}

/// The content operation behind one step (validation, enrichment, ...)
#[async_trait]
pub trait StepExecutor: Send + Sync {
    fn step(&self) -> Step;

    /// Record-level problems come back as a FAILURE result, never as a panic
    async fn execute(&self, message: &RecordMessage) -> StepResult;
}

pub struct StepWorker {
    pool: SqlitePool,
    publisher: StepPublisher,
    executor: Arc<dyn StepExecutor>,
}

impl StepWorker {
    pub fn new(pool: SqlitePool, publisher: StepPublisher, executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            pool,
            publisher,
            executor,
        }
    }

    pub fn step(&self) -> Step {
        self.executor.step()
    }

    /// Execute, record and forward one message.
    ///
    /// Returns the ledger's verdict on the outcome row. A duplicate delivery
    /// is forwarded again only when the stored row is SUCCESS; downstream
    /// writes are idempotent. A stored FAILURE stays terminal.
    pub async fn handle(&self, message: RecordMessage) -> TrackerResult<RecordResult> {
        let step = self.executor.step();
        let result = self.executor.execute(&message).await;
        let key = ExecutionRecordKey::new(
            message.dataset_id,
            message.record_id.clone(),
            step,
            message.source_record_id.clone(),
        );

        for warning in &result.warnings {
            let outcome = Outcome::Warning {
                message: warning.message.clone(),
                exception: warning.exception.clone(),
            };
            ledger::record(&self.pool, &key, &outcome).await?;
        }

        match result.outcome {
            StepOutcome::Failure { message: reason, exception } => {
                tracing::debug!(
                    dataset_id = %key.dataset_id,
                    record_id = %key.record_id,
                    step = %step,
                    reason = %reason,
                    "Record failed"
                );
                let outcome = Outcome::Failure {
                    message: reason,
                    exception,
                };
                Ok(ledger::record(&self.pool, &key, &outcome).await?)
            }
            StepOutcome::Success { payload } => {
                let written = ledger::record(
                    &self.pool,
                    &key,
                    &Outcome::Success {
                        payload: payload.clone(),
                    },
                )
                .await?;

                // A redelivered record only moves on if its stored row is SUCCESS,
                // and then with the payload the ledger kept
                let payload = match written {
                    RecordResult::Written => payload,
                    RecordResult::Duplicate => {
                        match ledger::load_success_payload(&self.pool, &key).await? {
                            Some(stored) => stored,
                            None => {
                                tracing::warn!(
                                    dataset_id = %key.dataset_id,
                                    record_id = %key.record_id,
                                    step = %step,
                                    "Redelivered record already failed at this step, not forwarded"
                                );
                                return Ok(written);
                            }
                        }
                    }
                };

                if let Some(tier_context) = result.tier_context {
                    tiers::record_tier_context(
                        &self.pool,
                        key.dataset_id,
                        &key.record_id,
                        tier_context,
                    )
                    .await?;
                }

                // Fan-out strictly after the ledger write
                self.publisher.publish(step, message.with_payload(payload));
                Ok(written)
            }
        }
    }

    /// Consume the queue until it closes; a failing message never stops the worker
    pub async fn run(self, mut queue: mpsc::Receiver<RecordMessage>) {
        let step = self.executor.step();
        tracing::info!(step = %step, "Step worker started");

        while let Some(message) = queue.recv().await {
            let dataset_id = message.dataset_id;
            let record_id = message.record_id.clone();
            if let Err(e) = self.handle(message).await {
                tracing::error!(
                    dataset_id = %dataset_id,
                    record_id = %record_id,
                    step = %step,
                    error = %e,
                    "Failed to record step outcome"
                );
            }
        }

        tracing::info!(step = %step, "Step queue closed, worker stopped");
    }
}
