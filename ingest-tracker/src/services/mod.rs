//! Execution-tracking services

pub mod aggregator;
pub mod debias_guard;
pub mod lock;
pub mod publisher;
pub mod rate_gate;
pub mod step_graph;
pub mod transport;
pub mod worker;

pub use aggregator::ProgressAggregator;
pub use debias_guard::{DebiasGuard, HttpSideWorkflow, SideWorkflow, SideWorkflowError};
pub use lock::{LockHandle, LockService, SqliteLockService};
pub use publisher::{Route, StepPublisher};
pub use rate_gate::{Admission, RateGate};
pub use step_graph::{next_step, resolve_steps, terminal_step};
pub use transport::{ChannelTransport, HttpTransport, StepTransport, TransportError};
pub use worker::{StepExecutor, StepOutcome, StepResult, StepWarning, StepWorker};
