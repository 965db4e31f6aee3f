//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::{
    entities::{
        GenerationJobRecord, InvoiceRecord, JobInput, LeaseRecord, OutboundEmailRecord,
        SourceRowRecord, TemplateRecord, WorkflowStepRecord,
    },
    types::{ExecutionStrategy, JobType},
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// The job and outbound email created together with a claim.
#[derive(Debug, Clone)]
pub struct NewJobParams {
    pub job_id: String,
    pub template_id: String,
    pub input: JobInput,
    pub strategy: ExecutionStrategy,
    pub to_address: String,
    pub cc: Option<String>,
    pub subject: String,
    pub attachment_name: String,
    pub body_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClaimRowParams {
    pub content_hash: String,
    pub row_offset: i64,
    pub row_created_at: Option<OffsetDateTime>,
    pub job: NewJobParams,
}

/// Result of a claim attempt that raced on a uniqueness guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    Claimed { job_id: String },
    /// Another attempt already owns this unit; carries the owning job id when known.
    AlreadyClaimed { job_id: Option<String> },
}

#[derive(Debug, Clone)]
pub struct FinishJobParams {
    pub id: String,
    pub successful: bool,
    pub artifact_path: Option<String>,
    pub processed_at: OffsetDateTime,
}

/// A queue job to push onto the workflow queue.
#[derive(Debug, Clone)]
pub struct NewQueueJob {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub run_at: OffsetDateTime,
    pub max_attempts: i32,
    pub priority: i32,
}

#[async_trait]
pub trait TemplatesRepo: Send + Sync {
    async fn find_template(&self, id: &str) -> Result<Option<TemplateRecord>, RepoError>;

    /// Templates backed by a spreadsheet, ordered by id.
    async fn list_sheet_templates(&self) -> Result<Vec<TemplateRecord>, RepoError>;
}

#[async_trait]
pub trait SourceRowsRepo: Send + Sync {
    async fn find_source_row(
        &self,
        template_id: &str,
        content_hash: &str,
    ) -> Result<Option<SourceRowRecord>, RepoError>;

    /// Insert the deduplication record, its job and its outbound email atomically.
    /// Losing the race on (template id, hash) yields [`ClaimResult::AlreadyClaimed`].
    async fn claim_row(&self, params: ClaimRowParams) -> Result<ClaimResult, RepoError>;

    async fn mark_row_processed(
        &self,
        job_id: &str,
        processed_at: OffsetDateTime,
    ) -> Result<(), RepoError>;
}

#[async_trait]
pub trait GenerationJobsRepo: Send + Sync {
    async fn find_job(&self, id: &str) -> Result<Option<GenerationJobRecord>, RepoError>;

    /// Oldest unprocessed job owned by `strategy`.
    async fn oldest_unprocessed_job(
        &self,
        strategy: ExecutionStrategy,
    ) -> Result<Option<GenerationJobRecord>, RepoError>;

    /// Stamp the terminal state. Returns `false` when the job was already processed.
    async fn finish_job(&self, params: FinishJobParams) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait OutboundEmailsRepo: Send + Sync {
    async fn find_email(&self, id: &str) -> Result<Option<OutboundEmailRecord>, RepoError>;

    /// Oldest unprocessed email whose generation job has been processed and is owned by
    /// `strategy`.
    async fn oldest_deliverable_email(
        &self,
        strategy: ExecutionStrategy,
    ) -> Result<Option<OutboundEmailRecord>, RepoError>;

    /// Returns `false` when the email was already processed.
    async fn mark_email_processed(
        &self,
        id: &str,
        processed_at: OffsetDateTime,
    ) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait InvoicesRepo: Send + Sync {
    async fn find_invoice(&self, id: Uuid) -> Result<Option<InvoiceRecord>, RepoError>;

    async fn oldest_ready_invoice(&self) -> Result<Option<InvoiceRecord>, RepoError>;

    /// Stamp `processed_at`/`job_id` guarded by `processed_at IS NULL` and create the job
    /// and its email in the same transaction.
    async fn claim_invoice(
        &self,
        invoice_id: Uuid,
        job: NewJobParams,
        claimed_at: OffsetDateTime,
    ) -> Result<ClaimResult, RepoError>;
}

#[async_trait]
pub trait IngestCursorsRepo: Send + Sync {
    async fn next_offset(&self, template_id: &str) -> Result<u64, RepoError>;

    /// Move the cursor forward to `offset + 1` unless another instance already did.
    async fn advance_past(&self, template_id: &str, offset: u64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait WorkflowStepsRepo: Send + Sync {
    async fn find_step(
        &self,
        instance_id: &str,
        step: &str,
    ) -> Result<Option<WorkflowStepRecord>, RepoError>;

    /// Record completion; an existing record for the step is left untouched.
    async fn record_step(
        &self,
        instance_id: &str,
        step: &str,
        output: serde_json::Value,
    ) -> Result<(), RepoError>;
}

#[async_trait]
pub trait LeasesRepo: Send + Sync {
    /// Read the lease row, creating it with an epoch timestamp when missing.
    async fn load_lease(&self, worker_name: &str) -> Result<LeaseRecord, RepoError>;

    /// Conditionally move `last_executed_at` from `expected` to `now`.
    /// Returns `true` only for the single caller whose update matched.
    async fn try_advance_lease(
        &self,
        worker_name: &str,
        expected: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<bool, RepoError>;

    async fn record_execution(&self, worker_name: &str) -> Result<(), RepoError>;
}

#[async_trait]
pub trait QueueRepo: Send + Sync {
    /// Push a job onto the queue, returning its queue id.
    async fn enqueue_job(&self, job: NewQueueJob) -> Result<String, RepoError>;
}
