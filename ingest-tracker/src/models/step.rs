//! Pipeline steps
//!
//! Wire and storage form is SCREAMING_SNAKE_CASE (`VALIDATE_EXTERNAL`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One named stage of a dataset's processing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    HarvestFile,
    HarvestHttp,
    HarvestOaiPmh,
    /// Custom transformation supplied with the dataset, applied before external validation
    TransformToEdmExternal,
    ValidateExternal,
    Transform,
    ValidateInternal,
    Normalize,
    Enrich,
    MediaProcess,
    Index,
    Debias,
}

impl Step {
    pub const ALL: [Step; 12] = [
        Step::HarvestFile,
        Step::HarvestHttp,
        Step::HarvestOaiPmh,
        Step::TransformToEdmExternal,
        Step::ValidateExternal,
        Step::Transform,
        Step::ValidateInternal,
        Step::Normalize,
        Step::Enrich,
        Step::MediaProcess,
        Step::Index,
        Step::Debias,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::HarvestFile => "HARVEST_FILE",
            Step::HarvestHttp => "HARVEST_HTTP",
            Step::HarvestOaiPmh => "HARVEST_OAI_PMH",
            Step::TransformToEdmExternal => "TRANSFORM_TO_EDM_EXTERNAL",
            Step::ValidateExternal => "VALIDATE_EXTERNAL",
            Step::Transform => "TRANSFORM",
            Step::ValidateInternal => "VALIDATE_INTERNAL",
            Step::Normalize => "NORMALIZE",
            Step::Enrich => "ENRICH",
            Step::MediaProcess => "MEDIA_PROCESS",
            Step::Index => "INDEX",
            Step::Debias => "DEBIAS",
        }
    }

    /// Label shown in progress reports
    pub fn label(&self) -> &'static str {
        match self {
            Step::HarvestFile => "harvest from file",
            Step::HarvestHttp => "harvest from url",
            Step::HarvestOaiPmh => "harvest from OAI-PMH",
            Step::TransformToEdmExternal => "transform to EDM external",
            Step::ValidateExternal => "validate (edm external)",
            Step::Transform => "transform",
            Step::ValidateInternal => "validate (edm internal)",
            Step::Normalize => "normalise",
            Step::Enrich => "enrich",
            Step::MediaProcess => "process media",
            Step::Index => "index",
            Step::Debias => "detect bias",
        }
    }

    /// Name of the queue whose consumers execute this step
    pub fn queue_name(&self) -> &'static str {
        match self {
            Step::HarvestFile => "ingest.harvest.file",
            Step::HarvestHttp => "ingest.harvest.http",
            Step::HarvestOaiPmh => "ingest.harvest.oai",
            Step::TransformToEdmExternal => "ingest.transform.external",
            Step::ValidateExternal => "ingest.validate.external",
            Step::Transform => "ingest.transform",
            Step::ValidateInternal => "ingest.validate.internal",
            Step::Normalize => "ingest.normalize",
            Step::Enrich => "ingest.enrich",
            Step::MediaProcess => "ingest.media",
            Step::Index => "ingest.index",
            Step::Debias => "ingest.debias",
        }
    }

    pub fn is_harvest(&self) -> bool {
        matches!(self, Step::HarvestFile | Step::HarvestHttp | Step::HarvestOaiPmh)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| format!("Unknown step: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_names_parse_back() {
        for step in Step::ALL {
            assert_eq!(step.as_str().parse::<Step>().unwrap(), step);
        }
    }

    #[test]
    fn serde_uses_storage_names() {
        let json = serde_json::to_string(&Step::TransformToEdmExternal).unwrap();
        assert_eq!(json, "\"TRANSFORM_TO_EDM_EXTERNAL\"");
        let parsed: Step = serde_json::from_str("\"MEDIA_PROCESS\"").unwrap();
        assert_eq!(parsed, Step::MediaProcess);
    }

    #[test]
    fn unknown_step_rejected() {
        assert!("PUBLISH".parse::<Step>().is_err());
    }

    #[test]
    fn only_harvest_steps_are_harvest() {
        let harvest: Vec<Step> = Step::ALL.into_iter().filter(Step::is_harvest).collect();
        assert_eq!(harvest, vec![Step::HarvestFile, Step::HarvestHttp, Step::HarvestOaiPmh]);
    }
}
