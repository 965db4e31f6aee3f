//! The two interchangeable execution strategies over the same stages: leased polling
//! workers and queued workflow instances.

pub mod context;
pub mod polling;
pub mod units;
pub mod workflow;

use std::{future::Future, time::Duration};

use crate::application::error::PipelineError;

pub use context::{PipelineContext, PipelineOptions};
pub use polling::{CycleOutcome, PollingWorkers, run_unit};
pub use workflow::{
    DocumentWorkflowPayload, WorkflowReport, WorkflowUnit, enqueue_document_workflow, job_failed,
    process_document_workflow, run_workflow,
};

/// Bound `unit` by `deadline`; pending futures are dropped on expiry.
pub async fn with_deadline<T>(
    deadline: Duration,
    unit: impl Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    tokio::time::timeout(deadline, unit)
        .await
        .unwrap_or_else(|_| {
            Err(PipelineError::DeadlineExceeded {
                seconds: deadline.as_secs(),
            })
        })
}
