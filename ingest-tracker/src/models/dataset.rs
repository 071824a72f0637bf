//! Dataset configuration model
//!
//! A dataset row is created once at submission. After that only the expected
//! record count and the record-limit flag are ever written, both write-once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::step::Step;

/// Dataset identifier (store-assigned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub i64);

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .map(DatasetId)
            .ok_or_else(|| format!("Invalid dataset id: {}", s))
    }
}

/// Category of ingestion, fixes the step graph for the dataset's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowKind {
    FileHarvest,
    HttpHarvest,
    OaiPmhHarvest,
    ValidationOnly,
    Debias,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::FileHarvest => "FILE_HARVEST",
            WorkflowKind::HttpHarvest => "HTTP_HARVEST",
            WorkflowKind::OaiPmhHarvest => "OAI_PMH_HARVEST",
            WorkflowKind::ValidationOnly => "VALIDATION_ONLY",
            WorkflowKind::Debias => "DEBIAS",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FILE_HARVEST" => Ok(WorkflowKind::FileHarvest),
            "HTTP_HARVEST" => Ok(WorkflowKind::HttpHarvest),
            "OAI_PMH_HARVEST" => Ok(WorkflowKind::OaiPmhHarvest),
            "VALIDATION_ONLY" => Ok(WorkflowKind::ValidationOnly),
            "DEBIAS" => Ok(WorkflowKind::Debias),
            other => Err(format!("Unknown workflow kind: {}", other)),
        }
    }
}

/// Compressed upload formats accepted for file and URL harvesting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Zip,
    Tar,
    Gz,
}

/// How the dataset's records were obtained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HarvestParameters {
    File {
        file_name: String,
        file_type: FileType,
    },
    Http {
        url: String,
        file_type: FileType,
    },
    OaiPmh {
        url: String,
        set_spec: Option<String>,
        metadata_format: String,
    },
}

/// Flat description of the harvest source for dataset info reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestDescriptor {
    pub protocol: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_spec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_format: Option<String>,
}

impl HarvestParameters {
    /// Harvest-backed workflow kind for these parameters
    pub fn workflow_kind(&self) -> WorkflowKind {
        match self {
            HarvestParameters::File { .. } => WorkflowKind::FileHarvest,
            HarvestParameters::Http { .. } => WorkflowKind::HttpHarvest,
            HarvestParameters::OaiPmh { .. } => WorkflowKind::OaiPmhHarvest,
        }
    }

    /// Step under which harvested records are written to the ledger
    pub fn harvest_step(&self) -> Step {
        match self {
            HarvestParameters::File { .. } => Step::HarvestFile,
            HarvestParameters::Http { .. } => Step::HarvestHttp,
            HarvestParameters::OaiPmh { .. } => Step::HarvestOaiPmh,
        }
    }

    pub fn descriptor(&self) -> HarvestDescriptor {
        match self {
            HarvestParameters::File { file_name, .. } => HarvestDescriptor {
                protocol: "FILE".to_string(),
                source: file_name.clone(),
                set_spec: None,
                metadata_format: None,
            },
            HarvestParameters::Http { url, .. } => HarvestDescriptor {
                protocol: "HTTP".to_string(),
                source: url.clone(),
                set_spec: None,
                metadata_format: None,
            },
            HarvestParameters::OaiPmh {
                url,
                set_spec,
                metadata_format,
            } => HarvestDescriptor {
                protocol: "OAI_PMH".to_string(),
                source: url.clone(),
                set_spec: set_spec.clone(),
                metadata_format: Some(metadata_format.clone()),
            },
        }
    }
}

/// The part of a dataset's configuration that shapes its step graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub has_custom_transform: bool,
    /// Where records are harvested from; a validation-only graph starts here.
    /// Harvest kinds imply their own step, so this only matters for
    /// validation-only datasets and defaults to the file harvest.
    #[serde(default)]
    pub harvest_step: Option<Step>,
}

/// Stored dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub dataset_id: DatasetId,
    pub dataset_name: String,
    pub workflow_kind: WorkflowKind,
    pub harvest_parameters: HarvestParameters,
    pub country: String,
    pub language: String,
    pub custom_transform: Option<String>,
    /// Unknown until harvesting has finished counting identifiers
    pub expected_record_count: Option<u64>,
    pub record_limit_exceeded: bool,
    pub created_at: DateTime<Utc>,
}

impl Dataset {
    pub fn config(&self) -> DatasetConfig {
        DatasetConfig {
            has_custom_transform: self.custom_transform.is_some(),
            harvest_step: Some(self.harvest_parameters.harvest_step()),
        }
    }
}

/// Submission request for a new dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDataset {
    pub dataset_name: String,
    /// Overrides the kind implied by the harvest parameters (validation-only uploads)
    #[serde(default)]
    pub workflow_kind: Option<WorkflowKind>,
    pub harvest_parameters: HarvestParameters,
    pub country: String,
    pub language: String,
    #[serde(default)]
    pub custom_transform: Option<String>,
}

impl NewDataset {
    pub fn workflow_kind(&self) -> WorkflowKind {
        self.workflow_kind
            .unwrap_or_else(|| self.harvest_parameters.workflow_kind())
    }

    /// An explicit harvest kind must agree with the harvest parameters;
    /// only validation-only may stand in for any of them.
    fn check_kind(&self) -> Result<(), String> {
        match self.workflow_kind {
            Some(kind @ (WorkflowKind::FileHarvest
            | WorkflowKind::HttpHarvest
            | WorkflowKind::OaiPmhHarvest))
                if kind != self.harvest_parameters.workflow_kind() =>
            {
                Err(format!(
                    "Workflow kind {} contradicts {} harvest parameters",
                    kind,
                    self.harvest_parameters.descriptor().protocol
                ))
            }
            _ => Ok(()),
        }
    }

    /// Dataset names end up inside portal search URLs, so they are restricted
    /// to ASCII letters, digits and underscores.
    pub fn validate(&self) -> Result<(), String> {
        if self.dataset_name.is_empty() {
            return Err("Dataset name must not be empty".to_string());
        }
        if !self
            .dataset_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(format!(
                "Dataset name '{}' may only contain letters, digits and underscores",
                self.dataset_name
            ));
        }
        if matches!(self.custom_transform.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err("Custom transform must not be blank".to_string());
        }
        self.check_kind()
    }
}
