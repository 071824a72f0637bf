//! Asynchronous fan-out between steps
//!
//! `publish` never blocks and never fails from the caller's point of view.
//! The send runs on the publisher's own runtime handle; a transport error is
//! logged with enough context to replay the record by hand and is otherwise
//! dropped. A lost message leaves the record parked at its last successful
//! step, which shows up in the progress report as a step with fewer
//! completions than the one before it.

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use super::step_graph::next_step;
use super::transport::{HttpTransport, StepTransport, TransportError};
use crate::config::FanoutConfig;
use crate::models::{RecordMessage, Step};

/// Where a record goes after a step completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Next step of the regular pipeline
    ContinuePipeline(Step),
    /// Harvested record of a dataset with a custom transform
    ExternalTransform,
}

impl Route {
    pub fn destination(&self) -> Step {
        match self {
            Route::ContinuePipeline(step) => *step,
            Route::ExternalTransform => Step::TransformToEdmExternal,
        }
    }

    /// Route out of `completed` for this message; None after the terminal step.
    ///
    /// The harvest step is the only place the custom-transform choice is made;
    /// later steps follow the graph the message already committed to.
    pub fn after(completed: Step, message: &RecordMessage) -> Option<Route> {
        if completed.is_harvest() && message.has_custom_transform {
            return Some(Route::ExternalTransform);
        }
        let mut config = message.config();
        if completed.is_harvest() {
            config.harvest_step = Some(completed);
        }
        next_step(message.workflow_kind, &config, completed).map(Route::ContinuePipeline)
    }
}

#[derive(Clone)]
pub struct StepPublisher {
    transport: Arc<dyn StepTransport>,
    runtime: Handle,
    in_flight: Arc<Semaphore>,
}

impl StepPublisher {
    /// `runtime` is where sends execute; pass a dedicated runtime's handle to
    /// keep fan-out traffic off the step executors' threads.
    pub fn new(transport: Arc<dyn StepTransport>, runtime: Handle, max_in_flight: usize) -> Self {
        Self {
            transport,
            runtime,
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Publisher over the HTTP queue gateway, or None when no gateway is configured
    pub fn from_config(config: &FanoutConfig, runtime: Handle) -> Result<Option<Self>, TransportError> {
        let Some(base_url) = config.queue_base_url.as_deref() else {
            return Ok(None);
        };
        let transport = HttpTransport::new(
            base_url,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Some(Self::new(Arc::new(transport), runtime, config.max_in_flight)))
    }

    /// Fire-and-forget hand-off of `message` to the step after `completed`.
    ///
    /// The returned handle is only useful for tests and shutdown draining;
    /// dropping it detaches the send.
    pub fn publish(&self, completed: Step, message: RecordMessage) -> JoinHandle<()> {
        let transport = Arc::clone(&self.transport);
        let in_flight = Arc::clone(&self.in_flight);

        self.runtime.spawn(async move {
            let Some(route) = Route::after(completed, &message) else {
                tracing::debug!(
                    dataset_id = %message.dataset_id,
                    record_id = %message.record_id,
                    step = %completed,
                    "Terminal step reached, nothing to publish"
                );
                return;
            };
            let destination = route.destination();

            // Bounded concurrency; waiting here happens off the caller's task
            let _permit = match in_flight.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::error!(
                        dataset_id = %message.dataset_id,
                        record_id = %message.record_id,
                        step = %completed,
                        "Publisher shut down, record not forwarded"
                    );
                    return;
                }
            };

            match transport.send(destination, &message).await {
                Ok(()) => tracing::trace!(
                    dataset_id = %message.dataset_id,
                    record_id = %message.record_id,
                    step = %completed,
                    destination = destination.queue_name(),
                    "Record forwarded"
                ),
                Err(e) => tracing::error!(
                    dataset_id = %message.dataset_id,
                    record_id = %message.record_id,
                    source_record_id = %message.source_record_id,
                    step = %completed,
                    destination = destination.queue_name(),
                    error = %e,
                    "Failed to forward record; replay from the ledger payload of this step"
                ),
            }
        })
    }

    /// Stop accepting new sends; already-queued sends finish or log
    pub fn close(&self) {
        self.in_flight.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DatasetId, WorkflowKind};

    fn message(kind: WorkflowKind, has_custom_transform: bool) -> RecordMessage {
        RecordMessage {
            dataset_id: DatasetId(3),
            record_id: "r".to_string(),
            source_record_id: "s".to_string(),
            workflow_kind: kind,
            has_custom_transform,
            payload: String::new(),
        }
    }

    #[test]
    fn harvest_with_custom_transform_routes_to_external_transform() {
        let route = Route::after(Step::HarvestOaiPmh, &message(WorkflowKind::OaiPmhHarvest, true));
        assert_eq!(route, Some(Route::ExternalTransform));
        assert_eq!(route.unwrap().destination(), Step::TransformToEdmExternal);
    }

    #[test]
    fn harvest_without_transform_continues_to_validation() {
        let route = Route::after(Step::HarvestFile, &message(WorkflowKind::FileHarvest, false));
        assert_eq!(route, Some(Route::ContinuePipeline(Step::ValidateExternal)));
    }

    #[test]
    fn external_transform_continues_to_validation() {
        let route = Route::after(
            Step::TransformToEdmExternal,
            &message(WorkflowKind::HttpHarvest, true),
        );
        assert_eq!(route, Some(Route::ContinuePipeline(Step::ValidateExternal)));
    }

    #[test]
    fn validation_only_http_harvest_continues_to_validation() {
        let route = Route::after(Step::HarvestHttp, &message(WorkflowKind::ValidationOnly, false));
        assert_eq!(route, Some(Route::ContinuePipeline(Step::ValidateExternal)));
    }

    #[tokio::test]
    async fn no_gateway_means_no_http_publisher() {
        let config = FanoutConfig::default();
        let publisher = StepPublisher::from_config(&config, Handle::current()).unwrap();
        assert!(publisher.is_none());

        let config = FanoutConfig {
            queue_base_url: Some("http://queues.local".to_string()),
            ..FanoutConfig::default()
        };
        assert!(StepPublisher::from_config(&config, Handle::current()).unwrap().is_some());
    }

    #[test]
    fn terminal_steps_have_no_route() {
        assert_eq!(Route::after(Step::Index, &message(WorkflowKind::FileHarvest, false)), None);
        assert_eq!(
            Route::after(Step::ValidateInternal, &message(WorkflowKind::ValidationOnly, false)),
            None
        );
        assert_eq!(Route::after(Step::Debias, &message(WorkflowKind::Debias, false)), None);
    }
}
