//! Progress snapshot returned to polling clients
//!
//! Snapshots are eventually consistent: they reflect whatever the ledger held
//! at query time and may undercount a record that is between two steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dataset::{DatasetId, HarvestDescriptor, WorkflowKind};
use super::step::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetStatus {
    InProgress,
    Completed,
    /// Every expected record stopped on a FAILURE
    AllFailed,
    /// Harvesting finished and found no records
    Empty,
}

/// Records sharing one identical message at one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageGroup {
    pub message: String,
    pub count: u64,
    pub record_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProgress {
    pub step: Step,
    pub label: String,
    /// success + fail
    pub total: u64,
    pub success: u64,
    pub fail: u64,
    pub warn: u64,
    pub errors: Vec<MessageGroup>,
    pub warnings: Vec<MessageGroup>,
}

/// Count of lowest-tier records plus a bounded sample of their ids
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TierStatistics {
    pub total_num_of_records: u64,
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TierZeroInfo {
    pub content_tier: TierStatistics,
    pub metadata_tier: TierStatistics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub dataset_id: DatasetId,
    pub dataset_name: String,
    pub workflow_kind: WorkflowKind,
    pub created_at: DateTime<Utc>,
    pub country: String,
    pub language: String,
    pub harvesting_parameters: HarvestDescriptor,
    pub transformed_to_edm_external: bool,
}

/// Either a usable portal link or the reason there is none yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PortalLink {
    Url(String),
    Placeholder(String),
}

impl PortalLink {
    pub fn url(&self) -> Option<&str> {
        match self {
            PortalLink::Url(url) => Some(url),
            PortalLink::Placeholder(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub dataset_id: DatasetId,
    pub status: DatasetStatus,
    /// None while harvesting is still counting identifiers
    pub total_expected: Option<u64>,
    pub total_processed: u64,
    pub record_limit_exceeded: bool,
    pub progress_by_step: Vec<StepProgress>,
    pub tier_zero_info: TierZeroInfo,
    pub portal_link: PortalLink,
    pub dataset_info: DatasetInfo,
}

impl ProgressSnapshot {
    pub fn step(&self, step: Step) -> Option<&StepProgress> {
        self.progress_by_step.iter().find(|p| p.step == step)
    }
}
