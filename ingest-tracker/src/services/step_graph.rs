//! Step graph resolution
//!
//! Pure and deterministic: the aggregator lays steps out left to right in
//! the order returned here, and the publisher routes by the same list.

use crate::models::{DatasetConfig, Step, WorkflowKind};

/// Steps after harvesting, in pipeline order
const PROCESSING_TEMPLATE: [Step; 8] = [
    Step::TransformToEdmExternal,
    Step::ValidateExternal,
    Step::Transform,
    Step::ValidateInternal,
    Step::Normalize,
    Step::Enrich,
    Step::MediaProcess,
    Step::Index,
];

/// Ordered steps a dataset of `kind` with `config` passes through
pub fn resolve_steps(kind: WorkflowKind, config: &DatasetConfig) -> Vec<Step> {
    let harvest = match kind {
        WorkflowKind::FileHarvest => Step::HarvestFile,
        WorkflowKind::ValidationOnly => config.harvest_step.unwrap_or(Step::HarvestFile),
        WorkflowKind::HttpHarvest => Step::HarvestHttp,
        WorkflowKind::OaiPmhHarvest => Step::HarvestOaiPmh,
        WorkflowKind::Debias => return vec![Step::Debias],
    };

    let mut steps = Vec::with_capacity(PROCESSING_TEMPLATE.len() + 1);
    steps.push(harvest);
    steps.extend(
        PROCESSING_TEMPLATE
            .iter()
            .copied()
            .filter(|step| config.has_custom_transform || *step != Step::TransformToEdmExternal),
    );

    if kind == WorkflowKind::ValidationOnly {
        if let Some(end) = steps.iter().position(|s| *s == Step::ValidateInternal) {
            steps.truncate(end + 1);
        }
    }

    steps
}

/// Step following `step`, or None when `step` is terminal or not in the graph
pub fn next_step(kind: WorkflowKind, config: &DatasetConfig, step: Step) -> Option<Step> {
    let steps = resolve_steps(kind, config);
    let position = steps.iter().position(|s| *s == step)?;
    steps.get(position + 1).copied()
}

/// Last step of the graph; reaching it with any outcome completes a record
pub fn terminal_step(kind: WorkflowKind, config: &DatasetConfig) -> Step {
    // Every template has at least its harvest (or debias) step
    resolve_steps(kind, config)
        .last()
        .copied()
        .unwrap_or(Step::Debias)
}
