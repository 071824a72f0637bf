//! Data models for ingest-tracker

pub mod dataset;
pub mod message;
pub mod outcome;
pub mod progress;
pub mod step;
pub mod tier;

pub use dataset::{
    Dataset, DatasetConfig, DatasetId, FileType, HarvestDescriptor, HarvestParameters,
    NewDataset, WorkflowKind,
};
pub use message::RecordMessage;
pub use outcome::{ExecutionRecordKey, Outcome, OutcomeKind, RecordResult, StepCounts};
pub use progress::{
    DatasetInfo, DatasetStatus, MessageGroup, PortalLink, ProgressSnapshot, StepProgress,
    TierStatistics, TierZeroInfo,
};
pub use step::Step;
pub use tier::{ContentTier, MetadataTier, RecordTiers, TierContext};
