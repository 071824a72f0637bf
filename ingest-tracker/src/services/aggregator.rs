//! Progress aggregation
//!
//! Turns the write-mostly ledger into a per-dataset progress snapshot. Runs
//! on demand from polling clients and never from inside the pipeline, so
//! query frequency has no effect on pipeline throughput.
//!
//! The snapshot is not a point-in-time view across steps: a record moving
//! between two steps may be missing from both. Counts only grow between
//! calls because the pipeline never deletes ledger rows.

use sqlx::SqlitePool;

use super::step_graph::resolve_steps;
use crate::config::PortalConfig;
use crate::db::{datasets, ledger, tiers};
use crate::error::{TrackerError, TrackerResult};
use crate::models::{
    Dataset, DatasetId, DatasetInfo, DatasetStatus, MessageGroup, PortalLink, ProgressSnapshot,
    StepCounts, StepProgress,
};

pub const PLACEHOLDER_COUNTING: &str =
    "Harvesting is still counting identifiers; a portal link will follow once processing completes";
pub const PLACEHOLDER_IN_PROGRESS: &str =
    "Processing in progress; a portal link will be available when every record has been processed";
pub const PLACEHOLDER_EMPTY: &str = "The dataset is empty; there is nothing to review in the portal";
pub const PLACEHOLDER_ALL_FAILED: &str =
    "All records failed; see the per-step errors for the reasons";

#[derive(Clone)]
pub struct ProgressAggregator {
    pool: SqlitePool,
    portal: PortalConfig,
}

impl ProgressAggregator {
    pub fn new(pool: SqlitePool, portal: PortalConfig) -> Self {
        Self { pool, portal }
    }

    pub async fn get_progress(&self, dataset_id: DatasetId) -> TrackerResult<ProgressSnapshot> {
        let dataset = datasets::load_dataset(&self.pool, dataset_id)
            .await?
            .ok_or(TrackerError::DatasetNotFound(dataset_id))?;

        // Stored configuration, never the current defaults
        let steps = resolve_steps(dataset.workflow_kind, &dataset.config());

        let (counts, tier_zero_info) = futures::try_join!(
            ledger::counts_by_step(&self.pool, dataset_id),
            tiers::tier_zero_info(&self.pool, dataset_id, self.portal.tier_zero_sample_size),
        )?;

        let mut progress_by_step = Vec::with_capacity(steps.len());
        for step in &steps {
            let step_counts = counts.get(step).copied().unwrap_or_default();

            let errors = if step_counts.fail > 0 {
                group_by_message(ledger::list_errors(&self.pool, dataset_id, *step).await?)
            } else {
                Vec::new()
            };
            let warnings = if step_counts.warn > 0 {
                group_by_message(ledger::list_warnings(&self.pool, dataset_id, *step).await?)
            } else {
                Vec::new()
            };

            progress_by_step.push(StepProgress {
                step: *step,
                label: step.label().to_string(),
                total: step_counts.total(),
                success: step_counts.success,
                fail: step_counts.fail,
                warn: step_counts.warn,
                errors,
                warnings,
            });
        }

        let step_counts: Vec<StepCounts> = progress_by_step
            .iter()
            .map(|p| StepCounts {
                success: p.success,
                fail: p.fail,
                warn: p.warn,
            })
            .collect();
        let total_processed = processed_records(&step_counts);
        let failed_records: u64 = step_counts.iter().map(|c| c.fail).sum();
        let status = derive_status(dataset.expected_record_count, total_processed, failed_records);
        let portal_link = self.portal_link(&dataset, status);

        tracing::debug!(
            dataset_id = %dataset_id,
            status = ?status,
            total_processed,
            total_expected = ?dataset.expected_record_count,
            "Progress snapshot computed"
        );

        Ok(ProgressSnapshot {
            dataset_id,
            status,
            total_expected: dataset.expected_record_count,
            total_processed,
            record_limit_exceeded: dataset.record_limit_exceeded,
            progress_by_step,
            tier_zero_info,
            portal_link,
            dataset_info: dataset_info(&dataset),
        })
    }

    fn portal_link(&self, dataset: &Dataset, status: DatasetStatus) -> PortalLink {
        match status {
            DatasetStatus::Completed => PortalLink::Url(format!(
                "{}{}_{}*",
                self.portal.publish_dataset_url, dataset.dataset_id, dataset.dataset_name
            )),
            DatasetStatus::Empty => PortalLink::Placeholder(PLACEHOLDER_EMPTY.to_string()),
            DatasetStatus::AllFailed => PortalLink::Placeholder(PLACEHOLDER_ALL_FAILED.to_string()),
            DatasetStatus::InProgress if dataset.expected_record_count.is_none() => {
                PortalLink::Placeholder(PLACEHOLDER_COUNTING.to_string())
            }
            DatasetStatus::InProgress => {
                PortalLink::Placeholder(PLACEHOLDER_IN_PROGRESS.to_string())
            }
        }
    }
}

/// Records whose journey has ended, given per-step counts in graph order.
///
/// Everything that reached the terminal step counts, whatever its outcome.
/// A FAILURE at an earlier step also ends that record's journey, so those
/// are added too; without them a dataset with any early failure could never
/// reach its expected count.
pub fn processed_records(counts_in_order: &[StepCounts]) -> u64 {
    let Some((terminal, earlier)) = counts_in_order.split_last() else {
        return 0;
    };
    terminal.total() + earlier.iter().map(|c| c.fail).sum::<u64>()
}

/// Dataset status from the expected count (None while harvesting is still
/// counting), processed records and records stopped on a FAILURE
pub fn derive_status(expected: Option<u64>, processed: u64, failed: u64) -> DatasetStatus {
    match expected {
        None => DatasetStatus::InProgress,
        Some(0) => DatasetStatus::Empty,
        Some(expected) if processed >= expected && failed >= expected => DatasetStatus::AllFailed,
        Some(expected) if processed >= expected => DatasetStatus::Completed,
        Some(_) => DatasetStatus::InProgress,
    }
}

/// Bundle (record id, message) rows sharing an identical message.
///
/// Input is ordered by message (as the ledger returns it); output keeps that
/// order. Record ids are listed once per group even when a record carries
/// the same warning twice.
pub fn group_by_message(rows: Vec<(String, String)>) -> Vec<MessageGroup> {
    let mut groups: Vec<MessageGroup> = Vec::new();
    for (record_id, message) in rows {
        match groups.last_mut() {
            Some(group) if group.message == message => {
                if group.record_ids.last() != Some(&record_id) {
                    group.record_ids.push(record_id);
                    group.count += 1;
                }
            }
            _ => groups.push(MessageGroup {
                message,
                count: 1,
                record_ids: vec![record_id],
            }),
        }
    }
    groups
}

fn dataset_info(dataset: &Dataset) -> DatasetInfo {
    DatasetInfo {
        dataset_id: dataset.dataset_id,
        dataset_name: dataset.dataset_name.clone(),
        workflow_kind: dataset.workflow_kind,
        created_at: dataset.created_at,
        country: dataset.country.clone(),
        language: dataset.language.clone(),
        harvesting_parameters: dataset.harvest_parameters.descriptor(),
        transformed_to_edm_external: dataset.config().has_custom_transform,
    }
}
