//! Step queue transports
//!
//! A transport delivers one message to the queue of a destination step.
//! Retrying is the transport's own business; the publisher calls `send`
//! once per message.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{RecordMessage, Step};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No queue bound for step {0}")]
    UnboundQueue(Step),

    #[error("Queue {0} is closed")]
    Closed(&'static str),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Queue endpoint {queue} answered {status}")]
    Rejected { queue: &'static str, status: u16 },
}

#[async_trait]
pub trait StepTransport: Send + Sync {
    async fn send(&self, destination: Step, message: &RecordMessage) -> Result<(), TransportError>;
}

/// In-process queues, one bounded tokio channel per bound step
#[derive(Debug, Default)]
pub struct ChannelTransport {
    queues: HashMap<Step, mpsc::Sender<RecordMessage>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the queue for `step` and return its consuming end
    pub fn bind(&mut self, step: Step, capacity: usize) -> mpsc::Receiver<RecordMessage> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.queues.insert(step, tx);
        rx
    }
}

#[async_trait]
impl StepTransport for ChannelTransport {
    async fn send(&self, destination: Step, message: &RecordMessage) -> Result<(), TransportError> {
        let queue = self
            .queues
            .get(&destination)
            .ok_or(TransportError::UnboundQueue(destination))?;
        queue
            .send(message.clone())
            .await
            .map_err(|_| TransportError::Closed(destination.queue_name()))
    }
}

/// Posts messages as JSON to `{base_url}/queues/{queue name}`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn queue_url(&self, destination: Step) -> String {
        format!("{}/queues/{}", self.base_url, destination.queue_name())
    }
}

#[async_trait]
impl StepTransport for HttpTransport {
    async fn send(&self, destination: Step, message: &RecordMessage) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.queue_url(destination))
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected {
                queue: destination.queue_name(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
