//! Ledger keys and per-record outcomes

use serde::{Deserialize, Serialize};
use std::fmt;

use super::dataset::DatasetId;
use super::step::Step;

/// Identifies one record's outcome at one step. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionRecordKey {
    pub dataset_id: DatasetId,
    pub record_id: String,
    pub step: Step,
    /// Identifier the record carried in the harvested source
    pub source_record_id: String,
}

impl ExecutionRecordKey {
    pub fn new(
        dataset_id: DatasetId,
        record_id: impl Into<String>,
        step: Step,
        source_record_id: impl Into<String>,
    ) -> Self {
        Self {
            dataset_id,
            record_id: record_id.into(),
            step,
            source_record_id: source_record_id.into(),
        }
    }
}

impl fmt::Display for ExecutionRecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.dataset_id, self.record_id, self.step)
    }
}

/// Result of one step for one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Record advances; payload is retained for downstream steps
    Success { payload: String },
    /// Terminal for this record at this step
    Failure {
        message: String,
        exception: Option<String>,
    },
    /// Record advances but is flagged; several may exist per key
    Warning {
        message: String,
        exception: Option<String>,
    },
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Success { .. } => OutcomeKind::Success,
            Outcome::Failure { .. } => OutcomeKind::Failure,
            Outcome::Warning { .. } => OutcomeKind::Warning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
    Warning,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Success => "SUCCESS",
            OutcomeKind::Failure => "FAILURE",
            OutcomeKind::Warning => "WARNING",
        }
    }
}

/// What a ledger write did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordResult {
    Written,
    /// A SUCCESS or FAILURE row already existed for the key; nothing changed
    Duplicate,
}

/// Per-step tallies read back from the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepCounts {
    pub success: u64,
    pub fail: u64,
    /// Distinct records carrying at least one warning
    pub warn: u64,
}

impl StepCounts {
    /// Records that reached this step with either terminal outcome
    pub fn total(&self) -> u64 {
        self.success + self.fail
    }
}
