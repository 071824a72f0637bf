//! Step-advance message carried between queues

use serde::{Deserialize, Serialize};

use super::dataset::{DatasetConfig, DatasetId, WorkflowKind};

/// A record travelling from one step's queue to the next
///
/// The workflow kind and the custom-transform flag are stamped on the
/// message when the record is harvested, so routing never re-reads the
/// dataset row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMessage {
    pub dataset_id: DatasetId,
    pub record_id: String,
    pub source_record_id: String,
    pub workflow_kind: WorkflowKind,
    pub has_custom_transform: bool,
    pub payload: String,
}

impl RecordMessage {
    pub fn config(&self) -> DatasetConfig {
        DatasetConfig {
            has_custom_transform: self.has_custom_transform,
            harvest_step: None,
        }
    }

    /// Same record, carrying the payload produced by the step just completed
    pub fn with_payload(&self, payload: String) -> Self {
        Self {
            payload,
            ..self.clone()
        }
    }
}
